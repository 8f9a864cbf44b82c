//! Decode code generation.
//!
//! Emits one Rust routine, dispatched on the record's discriminant byte,
//! that renders a captured record as a single JSON object per line. The
//! routine and its helpers are self-contained source text needing nothing
//! beyond std, so the generated unit compiles wherever it is included.
//!
//! Slot offsets are baked in at generation time from the same layout the
//! capture side declares in C; the decoder never re-derives them.

use crate::classify::TypeClass;
use crate::config::{GenConfig, STR_SLOT_SIZE};
use crate::error::{GenError, Result};
use crate::slots::{GlobalLayout, ProbeMetadata, SlotKey, SlotMap};

/// Map a declared C scalar type onto the Rust cast applied before rendering,
/// so a 32-bit signed slot value prints as its declared type rather than as
/// the raw 64-bit slot.
fn rust_cast(type_text: &str) -> &'static str {
    let t = type_text.trim();
    if t.contains("uint8") {
        "u8"
    } else if t.contains("uint16") {
        "u16"
    } else if t.contains("uint32") || t == "unsigned" || t.contains("unsigned int") {
        "u32"
    } else if t.contains("uint64")
        || (t.contains("size_t") && !t.contains("ssize_t"))
        || t.contains("unsigned long")
    {
        "u64"
    } else if t.contains("int8") {
        "i8"
    } else if t.contains("int16") || t.contains("short") {
        "i16"
    } else if t.contains("int32") || t == "int" {
        "i32"
    } else if t.contains("int64") || t.contains("ssize_t") || t.contains("long") {
        "i64"
    } else {
        "u64"
    }
}

/// Quote a string as a Rust/JSON literal for embedding in generated source.
fn json_quote(s: &str) -> String {
    // Keys and probe names are identifier-shaped by construction; renames
    // are caller-supplied, so escape through the serializer anyway.
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

/// Locate the sibling length slot for a binary field: `<field>_len`
/// preferred, then the literal `len`. Integer slots only.
fn length_sibling(slots: &SlotMap, field: &str) -> Option<usize> {
    let find = |name: &str| {
        slots.entries.iter().find_map(|e| match e.key {
            SlotKey::Int(k) if e.field == name => Some(k),
            _ => None,
        })
    };
    find(&format!("{}_len", field)).or_else(|| find("len"))
}

/// Emit the decode entry point plus its helpers for every declared probe.
///
/// Suppressed probes keep their dispatch case — a record carrying their id
/// is still decodable. Only an id nobody generates is a layout mismatch,
/// and that aborts rather than guessing.
pub fn build_decoder(
    metas: &[ProbeMetadata],
    layout: &GlobalLayout,
    cfg: &GenConfig,
) -> Result<String> {
    let mut r = String::new();
    r.push_str(&format!(
        "/// Byte size of the shared capture record.\npub const RECORD_SIZE: usize = {};\n\n",
        layout.record_size()
    ));
    r.push_str(
        r#"/// Render one captured record as a JSON object terminated by a newline.
///
/// Aborts on a discriminant no capture routine stamps: the record would
/// otherwise be decoded under the wrong layout, and there is no safe
/// recovery from that.
pub fn decode_event(data: &[u8], out: &mut dyn std::io::Write) -> std::io::Result<()> {
    if data.len() < RECORD_SIZE {
        eprintln!("record too short: {} bytes", data.len());
        std::process::abort();
    }
    out.write_all(b"{")?;
    match data[0] {
"#,
    );

    for meta in metas {
        r.push_str(&format!("        {} => {{ // {}\n", meta.id, meta.name));
        r.push_str(&format!(
            "            json_first(out, \"type\", {})?;\n",
            json_quote(&meta.name)
        ));
        for e in &meta.slots.entries {
            if meta.blocked.contains(&e.field) {
                continue;
            }
            let key = json_quote(cfg.output_key(&e.field));
            match e.key {
                SlotKey::Int(k) => {
                    r.push_str(&format!(
                        "            json_num(out, {}, read_u64(data, {}) as {})?;\n",
                        key,
                        layout.int_offset(k),
                        rust_cast(&e.type_text)
                    ));
                }
                SlotKey::Str(j) => {
                    let off = layout.str_offset(j);
                    if e.class == TypeClass::Bin {
                        let len_slot = length_sibling(&meta.slots, &e.field).ok_or_else(|| {
                            GenError::MissingLengthField {
                                probe: meta.name.clone(),
                                field: e.field.clone(),
                            }
                        })?;
                        r.push_str(&format!(
                            "            json_hex(out, {}, &data[{}..{}], read_u64(data, {}) as usize)?;\n",
                            key,
                            off,
                            off + STR_SLOT_SIZE,
                            layout.int_offset(len_slot)
                        ));
                    } else {
                        r.push_str(&format!(
                            "            json_text(out, {}, &data[{}..{}])?;\n",
                            key,
                            off,
                            off + STR_SLOT_SIZE
                        ));
                    }
                }
            }
        }
        r.push_str("        }\n");
    }

    r.push_str(
        r#"        id => {
            eprintln!("no decoder for probe id {}", id);
            std::process::abort();
        }
    }
    out.write_all(b"}\n")?;
    Ok(())
}
"#,
    );
    r.push_str(DECODE_HELPERS);
    Ok(r)
}

/// Runtime support emitted verbatim alongside the dispatcher.
const DECODE_HELPERS: &str = r#"
fn read_u64(data: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[off..off + 8]);
    u64::from_ne_bytes(raw)
}

fn json_escape(out: &mut dyn std::io::Write, bytes: &[u8]) -> std::io::Result<()> {
    for &b in bytes {
        match b {
            b'"' => out.write_all(b"\\\"")?,
            b'\\' => out.write_all(b"\\\\")?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            b'\t' => out.write_all(b"\\t")?,
            0x00..=0x1f => write!(out, "\\u{:04x}", b)?,
            _ => out.write_all(&[b])?,
        }
    }
    Ok(())
}

fn json_first(out: &mut dyn std::io::Write, key: &str, val: &str) -> std::io::Result<()> {
    write!(out, "\"{}\":\"{}\"", key, val)
}

fn json_num(
    out: &mut dyn std::io::Write,
    key: &str,
    val: impl std::fmt::Display,
) -> std::io::Result<()> {
    write!(out, ",\"{}\":{}", key, val)
}

fn json_text(out: &mut dyn std::io::Write, key: &str, bytes: &[u8]) -> std::io::Result<()> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    write!(out, ",\"{}\":\"", key)?;
    json_escape(out, &bytes[..end])?;
    out.write_all(b"\"")
}

fn json_hex(
    out: &mut dyn std::io::Write,
    key: &str,
    bytes: &[u8],
    len: usize,
) -> std::io::Result<()> {
    write!(out, ",\"{}\":\"", key)?;
    for b in &bytes[..len.min(bytes.len())] {
        write!(out, "{:02x}", b)?;
    }
    out.write_all(b"\"")
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::parse_provider;
    use crate::schema::{SchemaRegistry, DEFAULT_CATALOGUE};
    use crate::slots::build_metadata;

    fn decoder_for(idl: &str, cfg: &GenConfig) -> Result<String> {
        let provider = parse_provider(idl).unwrap();
        let registry = SchemaRegistry::parse(DEFAULT_CATALOGUE);
        let (metas, layout) = build_metadata(&provider, &registry, cfg)?;
        build_decoder(&metas, &layout, cfg)
    }

    #[test]
    fn test_send_case() {
        let text = decoder_for(
            "provider quicly { probe send(int64_t stream_id, const char *data, size_t len); };",
            &GenConfig::default(),
        )
        .unwrap();
        // two int slots, one string slot: strings start at 8 + 16
        assert!(text.contains("pub const RECORD_SIZE: usize = 56;"));
        assert!(text.contains("1 => { // send"));
        assert!(text.contains(r#"json_first(out, "type", "send")?;"#));
        assert!(text.contains(r#"json_num(out, "stream_id", read_u64(data, 8) as i64)?;"#));
        assert!(text.contains(r#"json_text(out, "data", &data[24..56])?;"#));
        assert!(text.contains(r#"json_num(out, "len", read_u64(data, 16) as u64)?;"#));
    }

    #[test]
    fn test_rename_changes_key_not_slot() {
        let text = decoder_for(
            "provider quicly { probe accept(struct st_quicly_conn_t *conn, int64_t at); };",
            &GenConfig::quicly_defaults(),
        )
        .unwrap();
        assert!(text.contains(r#"json_num(out, "master_conn_id", read_u64(data, 8) as u32)?;"#));
        assert!(text.contains(r#"json_num(out, "time", read_u64(data, 16) as i64)?;"#));
        assert!(!text.contains(r#""master_id""#));
        assert!(!text.contains(r#""at""#));
    }

    #[test]
    fn test_binary_finds_suffixed_length_sibling() {
        let text = decoder_for(
            "provider t { probe dgram(const uint8_t *payload, size_t payload_len); };",
            &GenConfig::default(),
        )
        .unwrap();
        assert!(text
            .contains(r#"json_hex(out, "payload", &data[16..48], read_u64(data, 8) as usize)?;"#));
    }

    #[test]
    fn test_binary_falls_back_to_literal_len() {
        let text = decoder_for(
            "provider t { probe blob(const void *data, size_t len); };",
            &GenConfig::default(),
        )
        .unwrap();
        assert!(text.contains(r#"json_hex(out, "data", &data[16..48], read_u64(data, 8) as usize)?;"#));
    }

    #[test]
    fn test_binary_without_length_is_fatal() {
        let err = decoder_for(
            "provider t { probe dgram(const uint8_t *payload, int64_t at); };",
            &GenConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GenError::MissingLengthField { ref field, .. } if field == "payload"
        ));
    }

    #[test]
    fn test_blocked_binary_field_skips_length_lookup() {
        // `bytes` has no length sibling, but it is redacted for this probe,
        // so no pairing is attempted and no key is emitted
        let text = decoder_for(
            "provider quicly {
                probe receive(struct st_quicly_conn_t *conn, int64_t at, const uint8_t *bytes, size_t num_bytes);
            };",
            &GenConfig::quicly_defaults(),
        )
        .unwrap();
        assert!(!text.contains(r#""bytes""#));
        assert!(text.contains(r#"json_num(out, "num_bytes""#));
    }

    #[test]
    fn test_unknown_id_aborts() {
        let text = decoder_for(
            "provider t { probe only(int64_t x); };",
            &GenConfig::default(),
        )
        .unwrap();
        assert!(text.contains("no decoder for probe id"));
        assert!(text.contains("std::process::abort();"));
    }

    #[test]
    fn test_rust_cast_widths() {
        assert_eq!(rust_cast("int64_t"), "i64");
        assert_eq!(rust_cast("uint32_t"), "u32");
        assert_eq!(rust_cast("size_t"), "u64");
        assert_eq!(rust_cast("ssize_t"), "i64");
        assert_eq!(rust_cast("int"), "i32");
        assert_eq!(rust_cast("uint8_t"), "u8");
    }
}
