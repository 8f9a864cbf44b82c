//! Struct layout catalogue.
//!
//! Probe arguments that point at structs are flattened field-by-field into
//! record slots, so the generator has to know each struct's field order.
//! Layouts come from a small hand-maintained catalogue text rather than from
//! debug info. Fields whose name contains `dummy` mark skipped regions: they
//! stay in the table so field order survives, but never produce slots.

use std::collections::HashMap;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

/// Struct layouts for the quicly/h2o providers, mirrored by hand from the
/// target sources. Used when the caller supplies no catalogue of its own.
pub const DEFAULT_CATALOGUE: &str = r#"
// Layouts mirrored by hand from the traced sources; keep in sync.
// Fields whose name contains "dummy" are skipped regions, not data.

struct st_quicly_stream_t {
    uint64_t dummy;
    int64_t stream_id;
};

struct st_quicly_conn_t {
    uint32_t dummy[4];
    uint32_t master_id;
};

struct st_h2o_conn_t {
    void *dummy_ctx;
    void **dummy_hosts;
    uint64_t dummy_connected_at[2];
    uint64_t h2o_conn_id;
};

struct quicly_rtt_t {
    uint32_t minimum;
    uint32_t smoothed;
    uint32_t variance;
    uint32_t latest;
};

struct st_quicly_address_token_plaintext_t {
    int dummy;
};
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    /// Declared type text, array suffix included (`uint32_t[4]`).
    pub type_text: String,
    pub padding: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructSchema {
    pub name: String,
    pub fields: Vec<StructField>,
}

impl StructSchema {
    /// Fields that produce record slots, in declaration order.
    pub fn slot_fields(&self) -> impl Iterator<Item = &StructField> {
        self.fields.iter().filter(|f| !f.padding)
    }
}

/// Parsed catalogue: struct name to ordered field table, plus the raw text
/// for restating inside the generated unit.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    structs: HashMap<String, StructSchema>,
    source: String,
}

static STRUCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"struct\s+([A-Za-z0-9_]+)\s*\{([^}]*)\}").unwrap());
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w[^;{}]*[\w*])\s*\b([A-Za-z0-9_]+)\s*(\[\d+\])?\s*;").unwrap()
});

impl SchemaRegistry {
    pub fn parse(text: &str) -> Self {
        let mut structs = HashMap::new();
        for caps in STRUCT_RE.captures_iter(text) {
            let name = caps[1].to_string();
            let mut fields = Vec::new();
            for f in FIELD_RE.captures_iter(&caps[2]) {
                let fname = f[2].to_string();
                let mut type_text = f[1].trim().to_string();
                if let Some(arr) = f.get(3) {
                    type_text.push_str(arr.as_str());
                }
                fields.push(StructField {
                    padding: fname.contains("dummy"),
                    name: fname,
                    type_text,
                });
            }
            debug!("registered struct `{}` ({} fields)", name, fields.len());
            structs.insert(name.clone(), StructSchema { name, fields });
        }
        SchemaRegistry {
            structs,
            source: text.to_string(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StructSchema> {
        self.structs.get(name)
    }

    /// The catalogue text as given, for restating in generated output.
    pub fn source(&self) -> &str {
        &self.source
    }
}
