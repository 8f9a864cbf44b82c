//! BPF capture code generation.
//!
//! One C routine per probe. Each invocation builds its own record on the
//! stack — probes fire concurrently on every core, so there is nothing
//! shared to lock — stamps the probe id, performs one positional argument
//! read per declared argument, and submits the record to the perf channel.
//! A full channel drops the record: the observed process is never stalled or
//! failed by its tracer.

use crate::backend::ArgMeta;
use crate::classify::{classify, TypeClass};
use crate::config::STR_SLOT_SIZE;
use crate::slots::{GlobalLayout, ProbeMetadata};

/// Name of the generated BPF routine for a probe.
pub fn tracer_name(provider: &str, probe: &str) -> String {
    format!("trace_{}__{}", provider, probe)
}

/// C declaration of the shared record: 1-byte discriminant, the maximum
/// integer slots, then the maximum string slots.
pub fn record_decl(layout: &GlobalLayout) -> String {
    let mut c = String::from("struct event_t {\n    uint8_t id;\n\n");
    for k in 0..layout.max_ints {
        c.push_str(&format!("    uint64_t i{};\n", k));
    }
    for j in 0..layout.max_strs {
        c.push_str(&format!("    char s{}[{}];\n", j, STR_SLOT_SIZE));
    }
    c.push_str("};\n");
    c
}

/// Emit the capture routine for one probe.
///
/// `arg_meta` comes from the instrumentation backend, one entry per declared
/// argument; sizes feed the annotation comments, while the copies themselves
/// are driven by the probe's slot map.
pub fn build_tracer(provider: &str, meta: &ProbeMetadata, arg_meta: &[ArgMeta]) -> String {
    let mut c = format!(
        "int {}(struct pt_regs *ctx) {{\n    void *buf = NULL;\n    struct event_t event = {{ .id = {} }};\n\n",
        tracer_name(provider, &meta.name),
        meta.id
    );

    for (i, arg) in meta.args.iter().enumerate() {
        let size = arg_meta.get(i).map_or(0, |m| m.size);
        c.push_str(&format!("    // {} {}: {}\n", arg.type_text, arg.name, size));
        if meta.blocked.contains(&arg.name) {
            c.push_str("    // (blocked field, slot left zeroed)\n");
            continue;
        }

        let entries: Vec<_> = meta.slots.entries_for_arg(i).collect();
        match classify(&arg.type_text) {
            TypeClass::Str | TypeClass::Bin => {
                for e in &entries {
                    c.push_str(&format!("    bpf_usdt_readarg({}, ctx, &buf);\n", i + 1));
                    // Fixed-length read: older kernels reject a variable
                    // length for bpf_probe_read.
                    c.push_str(&format!(
                        "    bpf_probe_read(&event.{}, sizeof(event.{}), buf);\n",
                        e.key, e.key
                    ));
                }
            }
            TypeClass::StructPtr => {
                let pointee = arg.type_text.replace('*', "");
                let pointee = pointee.trim_end();
                c.push_str(&format!("    {} {} = {{}};\n", pointee, arg.name));
                c.push_str(&format!("    bpf_usdt_readarg({}, ctx, &buf);\n", i + 1));
                c.push_str(&format!(
                    "    bpf_probe_read(&{}, sizeof({}), buf);\n",
                    arg.name, arg.name
                ));
                for e in &entries {
                    if meta.blocked.contains(&e.field) {
                        continue;
                    }
                    c.push_str(&format!(
                        "    event.{} = {}.{}; /* {} */\n",
                        e.key, arg.name, e.field, e.type_text
                    ));
                }
            }
            TypeClass::Scalar => {
                for e in &entries {
                    c.push_str(&format!(
                        "    bpf_usdt_readarg({}, ctx, &event.{});\n",
                        i + 1,
                        e.key
                    ));
                }
            }
        }
    }

    c.push_str(&format!(
        "\n    if (events.perf_submit(ctx, &event, sizeof(event)) != 0)\n        bpf_trace_printk(\"{}: perf_submit failed\\n\");\n\n    return 0;\n}}\n",
        meta.name
    ));
    c
}
