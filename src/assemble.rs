//! Final artifact assembly.
//!
//! Concatenates the record declaration, the restated struct catalogue, every
//! capture routine, the registration table, and the decode routine into one
//! generated Rust source unit. The BPF program rides inside the unit as a
//! string constant; the decoder is compilable Rust. The pieces are also
//! returned individually so callers can reach the instrumentation text and
//! the registration table without reparsing the unit.

use log::{debug, warn};

use crate::backend::ProbeInventory;
use crate::capture::{build_tracer, record_decl, tracer_name};
use crate::config::GenConfig;
use crate::decode::build_decoder;
use crate::error::{GenError, Result};
use crate::idl::ProviderDecl;
use crate::schema::SchemaRegistry;
use crate::slots::{build_metadata, GlobalLayout};

/// One generated attach point: which probe, which capture routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub provider: String,
    pub probe: String,
    pub tracer: String,
}

/// Everything one generation run produces.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// The complete generated source unit.
    pub source: String,
    /// The BPF C program alone.
    pub bpf_text: String,
    /// Attach points for every generated tracer, in generation order.
    pub registrations: Vec<Registration>,
    /// The decode routine and its helpers alone.
    pub decode_text: String,
    pub layout: GlobalLayout,
}

const HEADER: &str = "// Generated by probegen. Do not edit.\n\n#![allow(dead_code)]\n\n";

/// Run the whole pipeline over parsed inputs.
pub fn generate(
    provider: &ProviderDecl,
    registry: &SchemaRegistry,
    cfg: &GenConfig,
    inventory: &dyn ProbeInventory,
) -> Result<Artifact> {
    let (metas, layout) = build_metadata(provider, registry, cfg)?;
    let enumerated = inventory.enumerate(&provider.name)?;

    let mut bpf = record_decl(&layout);
    bpf.push_str("\nBPF_PERF_OUTPUT(events);\n");
    bpf.push_str(registry.source());

    let mut registrations = Vec::new();
    for probe in &enumerated {
        let meta = metas
            .iter()
            .find(|m| m.name == probe.name)
            .ok_or_else(|| GenError::UndeclaredProbe(probe.name.clone()))?;
        if probe.args.len() != meta.args.len() {
            return Err(GenError::ArgumentCountMismatch {
                probe: meta.name.clone(),
                declared: meta.args.len(),
                reported: probe.args.len(),
            });
        }
        if cfg.is_probe_suppressed(&meta.full_name) {
            debug!("suppressing probe `{}`", meta.full_name);
            continue;
        }
        bpf.push('\n');
        bpf.push_str(&build_tracer(&provider.name, meta, &probe.args));
        registrations.push(Registration {
            provider: provider.name.clone(),
            probe: meta.name.clone(),
            tracer: tracer_name(&provider.name, &meta.name),
        });
    }

    for meta in &metas {
        if !enumerated.iter().any(|p| p.name == meta.name)
            && !cfg.is_probe_suppressed(&meta.full_name)
        {
            warn!(
                "probe `{}` is declared but absent from the target; no tracer generated",
                meta.full_name
            );
        }
    }

    let decode_text = build_decoder(&metas, &layout, cfg)?;

    let mut source = String::from(HEADER);
    source.push_str("pub const BPF_TEXT: &str = r##\"\n");
    source.push_str(&bpf);
    source.push_str("\"##;\n\n");
    source.push_str(&registration_table(&registrations));
    source.push('\n');
    source.push_str(&decode_text);

    debug!(
        "generated {} tracers, {} byte record",
        registrations.len(),
        layout.record_size()
    );

    Ok(Artifact {
        source,
        bpf_text: bpf,
        registrations,
        decode_text,
        layout,
    })
}

fn registration_table(regs: &[Registration]) -> String {
    let mut r = String::from(
        "/// One USDT attach point paired with its capture routine.\n\
         pub struct UsdtProbe {\n\
         \x20   pub provider: &'static str,\n\
         \x20   pub probe: &'static str,\n\
         \x20   pub tracer: &'static str,\n\
         }\n\n\
         pub static USDT_PROBES: &[UsdtProbe] = &[\n",
    );
    for reg in regs {
        r.push_str(&format!(
            "    UsdtProbe {{ provider: \"{}\", probe: \"{}\", tracer: \"{}\" }},\n",
            reg.provider, reg.probe, reg.tracer
        ));
    }
    r.push_str("];\n");
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ArgMeta, DeclaredSizes, EnumeratedProbe};
    use crate::idl::parse_provider;
    use crate::schema::DEFAULT_CATALOGUE;

    struct FixedInventory(Vec<EnumeratedProbe>);

    impl ProbeInventory for FixedInventory {
        fn enumerate(&self, _provider: &str) -> anyhow::Result<Vec<EnumeratedProbe>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_undeclared_backend_probe_is_fatal() {
        let provider = parse_provider("provider t { probe a(int64_t x); };").unwrap();
        let registry = SchemaRegistry::parse(DEFAULT_CATALOGUE);
        let inventory = FixedInventory(vec![EnumeratedProbe {
            name: "ghost".to_string(),
            args: Vec::new(),
        }]);
        let err = generate(&provider, &registry, &GenConfig::default(), &inventory).unwrap_err();
        assert!(matches!(err, GenError::UndeclaredProbe(ref name) if name == "ghost"));
    }

    #[test]
    fn test_argument_count_mismatch_is_fatal() {
        let provider = parse_provider("provider t { probe a(int64_t x, int64_t y); };").unwrap();
        let registry = SchemaRegistry::parse(DEFAULT_CATALOGUE);
        let inventory = FixedInventory(vec![EnumeratedProbe {
            name: "a".to_string(),
            args: vec![ArgMeta {
                size: 8,
                signed: true,
            }],
        }]);
        let err = generate(&provider, &registry, &GenConfig::default(), &inventory).unwrap_err();
        assert!(matches!(
            err,
            GenError::ArgumentCountMismatch {
                declared: 2,
                reported: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_unenumerated_probe_gets_no_tracer_but_keeps_decode_case() {
        let provider = parse_provider(
            "provider t {
                probe present(int64_t x);
                probe absent(int64_t x);
            };",
        )
        .unwrap();
        let registry = SchemaRegistry::parse(DEFAULT_CATALOGUE);
        let inventory = FixedInventory(vec![EnumeratedProbe {
            name: "present".to_string(),
            args: vec![ArgMeta {
                size: 8,
                signed: true,
            }],
        }]);
        let artifact =
            generate(&provider, &registry, &GenConfig::default(), &inventory).unwrap();
        assert_eq!(artifact.registrations.len(), 1);
        assert!(artifact.bpf_text.contains("trace_t__present"));
        assert!(!artifact.bpf_text.contains("trace_t__absent"));
        // ids stay dense: `absent` keeps id 2 and its decode case
        assert!(artifact.decode_text.contains("2 => { // absent"));
    }

    #[test]
    fn test_generated_unit_concatenation() {
        let provider =
            parse_provider("provider t { probe a(int64_t x, const char *s); };").unwrap();
        let registry = SchemaRegistry::parse(DEFAULT_CATALOGUE);
        let inventory = DeclaredSizes::new(&provider);
        let artifact =
            generate(&provider, &registry, &GenConfig::default(), &inventory).unwrap();

        assert!(artifact.source.starts_with("// Generated by probegen."));
        assert!(artifact.source.contains("pub const BPF_TEXT: &str = r##\""));
        assert!(artifact
            .source
            .contains(r#"UsdtProbe { provider: "t", probe: "a", tracer: "trace_t__a" },"#));
        assert!(artifact.source.contains("pub fn decode_event"));
        // the struct catalogue is restated inside the BPF program
        assert!(artifact.bpf_text.contains("struct st_quicly_conn_t"));
        assert!(artifact.bpf_text.contains("BPF_PERF_OUTPUT(events);"));
    }
}
