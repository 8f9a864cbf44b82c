use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use probegen::backend::DeclaredSizes;
use probegen::schema::{SchemaRegistry, DEFAULT_CATALOGUE};
use probegen::{assemble, idl, GenConfig};

/// Compile a USDT provider definition into BPF capture code and a JSON
/// decoder, bundled as one generated source unit.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Opts {
    /// Provider definition file (DTrace-style provider block)
    probes: PathBuf,

    /// Path the generated unit is written to
    output: PathBuf,

    /// Struct layout catalogue; the built-in quicly/h2o catalogue is used
    /// when omitted
    #[arg(long)]
    structs: Option<PathBuf>,

    /// Generate without the default quicly redaction/rename policy
    #[arg(long)]
    no_default_policy: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let idl_text = fs::read_to_string(&opts.probes)
        .with_context(|| format!("reading {}", opts.probes.display()))?;
    let catalogue = match &opts.structs {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => DEFAULT_CATALOGUE.to_string(),
    };

    let provider = idl::parse_provider(&idl_text)?;
    let registry = SchemaRegistry::parse(&catalogue);
    let cfg = if opts.no_default_policy {
        GenConfig::default()
    } else {
        GenConfig::quicly_defaults()
    };
    let inventory = DeclaredSizes::new(&provider);
    let artifact = assemble::generate(&provider, &registry, &cfg, &inventory)?;

    fs::write(&opts.output, &artifact.source)
        .with_context(|| format!("writing {}", opts.output.display()))?;
    println!(
        "{}: {} tracers, {} byte record",
        opts.output.display(),
        artifact.registrations.len(),
        artifact.layout.record_size()
    );
    Ok(())
}
