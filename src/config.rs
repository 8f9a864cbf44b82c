//! Generation policy: redactions, probe suppression, output key renames.
//!
//! These are compile-time constants of a generation run, threaded through the
//! generator entry points as a value rather than read from ambient globals,
//! so tests can build their own policy without touching process state.

use std::collections::{HashMap, HashSet};

/// Byte capacity of one string slot in the shared record.
pub const STR_SLOT_SIZE: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct GenConfig {
    /// Fully-qualified probe name (`provider:probe`) to the field names
    /// redacted from capture and decode. A blocked field keeps its slot; the
    /// slot is just never written or printed.
    pub block_fields: HashMap<String, HashSet<String>>,

    /// Fully-qualified probe names excluded from capture generation and the
    /// registration table entirely.
    pub block_probes: HashSet<String>,

    /// Field name to output key override, applied only when emitting decode
    /// keys. Never changes which slot supplies the value.
    pub rename: HashMap<String, String>,
}

impl GenConfig {
    pub fn is_blocked(&self, full_name: &str, field: &str) -> bool {
        self.block_fields
            .get(full_name)
            .is_some_and(|set| set.contains(field))
    }

    pub fn is_probe_suppressed(&self, full_name: &str) -> bool {
        self.block_probes.contains(full_name)
    }

    /// The key a field is emitted under at decode time.
    pub fn output_key<'a>(&'a self, field: &'a str) -> &'a str {
        self.rename.get(field).map_or(field, String::as_str)
    }

    /// Default policy for the quicly provider: crypto secrets and raw packet
    /// payloads are redacted, the chatty debug probes are dropped, and two
    /// fields are renamed to the keys the quic-trace tooling expects.
    pub fn quicly_defaults() -> Self {
        let mut block_fields: HashMap<String, HashSet<String>> = HashMap::new();
        for (probe, field) in [
            ("quicly:crypto_decrypt", "decrypted"),
            ("quicly:receive", "bytes"),
            ("quicly:crypto_update_secret", "secret"),
            ("quicly:crypto_send_key_update", "secret"),
            ("quicly:crypto_receive_key_update", "secret"),
            ("quicly:crypto_receive_key_update_prepare", "secret"),
        ] {
            block_fields
                .entry(probe.to_string())
                .or_default()
                .insert(field.to_string());
        }

        let block_probes = ["quicly:debug_message", "quicly:free"]
            .into_iter()
            .map(String::from)
            .collect();

        let rename = [("at", "time"), ("master_id", "master_conn_id")]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();

        GenConfig {
            block_fields,
            block_probes,
            rename,
        }
    }
}
