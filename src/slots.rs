//! Slot allocation: flattening probe arguments onto the shared record.
//!
//! Every probe's capture writes into one fixed-shape record discriminated
//! only by probe id, so capture and decode must agree byte-for-byte on where
//! each argument lands. [`allocate`] is that single source of truth: both
//! generators consume the slot map it returns, never their own walk of the
//! argument list.

use std::collections::HashSet;
use std::fmt;

use log::debug;

use crate::classify::{classify, strip_type_name, TypeClass};
use crate::config::{GenConfig, STR_SLOT_SIZE};
use crate::error::{GenError, Result};
use crate::idl::{ArgDecl, ProbeDecl, ProviderDecl};
use crate::schema::SchemaRegistry;

/// Address of one record slot: `i<k>` or `s<k>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKey {
    Int(usize),
    Str(usize),
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Int(k) => write!(f, "i{}", k),
            SlotKey::Str(k) => write!(f, "s{}", k),
        }
    }
}

/// One allocated slot with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub key: SlotKey,
    /// Index of the declared argument this slot came from.
    pub arg_index: usize,
    /// Output-facing name: the argument's own name, or the schema field's
    /// name for expanded struct pointers.
    pub field: String,
    pub type_text: String,
    pub class: TypeClass,
}

/// Ordered slots of one probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotMap {
    pub entries: Vec<SlotEntry>,
    pub n_ints: usize,
    pub n_strs: usize,
}

impl SlotMap {
    /// Entries originating from declared argument `i`, in slot order.
    pub fn entries_for_arg(&self, i: usize) -> impl Iterator<Item = &SlotEntry> {
        self.entries.iter().filter(move |e| e.arg_index == i)
    }
}

/// Flatten one probe's arguments into slots, in declaration order.
pub fn allocate(probe: &ProbeDecl, registry: &SchemaRegistry) -> Result<SlotMap> {
    let mut map = SlotMap::default();
    for (i, arg) in probe.args.iter().enumerate() {
        match classify(&arg.type_text) {
            class @ (TypeClass::Str | TypeClass::Bin) => {
                map.entries.push(SlotEntry {
                    key: SlotKey::Str(map.n_strs),
                    arg_index: i,
                    field: arg.name.clone(),
                    type_text: arg.type_text.clone(),
                    class,
                });
                map.n_strs += 1;
            }
            TypeClass::StructPtr => {
                let schema_name = strip_type_name(&arg.type_text);
                let schema =
                    registry
                        .get(&schema_name)
                        .ok_or_else(|| GenError::UnresolvedSchema {
                            probe: probe.name.clone(),
                            arg: arg.name.clone(),
                            schema: schema_name.clone(),
                        })?;
                // No slot for the pointer itself; each non-padding field gets
                // an integer slot labeled with the field's own name.
                for field in schema.slot_fields() {
                    map.entries.push(SlotEntry {
                        key: SlotKey::Int(map.n_ints),
                        arg_index: i,
                        field: field.name.clone(),
                        type_text: field.type_text.clone(),
                        class: TypeClass::Scalar,
                    });
                    map.n_ints += 1;
                }
            }
            TypeClass::Scalar => {
                map.entries.push(SlotEntry {
                    key: SlotKey::Int(map.n_ints),
                    arg_index: i,
                    field: arg.name.clone(),
                    type_text: arg.type_text.clone(),
                    class: TypeClass::Scalar,
                });
                map.n_ints += 1;
            }
        }
    }
    Ok(map)
}

/// One probe, fully resolved: id, names, slots, redactions.
#[derive(Debug, Clone)]
pub struct ProbeMetadata {
    /// Dense 1-based id in declaration order; the record discriminant.
    pub id: u8,
    pub name: String,
    /// `provider:probe`, the key block lists are scoped by.
    pub full_name: String,
    pub args: Vec<ArgDecl>,
    pub slots: SlotMap,
    pub blocked: HashSet<String>,
}

/// The one record shape shared by every probe.
///
/// Capacities dominate every probe's slot counts; smaller probes never touch
/// their trailing slots. Offsets mirror the C layout of the generated record
/// declaration (1-byte discriminant, 8-byte aligned integer slots, string
/// slots after), so the decoder can address slots without a parallel C
/// compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalLayout {
    pub max_ints: usize,
    pub max_strs: usize,
}

impl GlobalLayout {
    pub fn int_offset(&self, k: usize) -> usize {
        8 + 8 * k
    }

    pub fn str_offset(&self, j: usize) -> usize {
        // With no integer slots the record has byte alignment and strings
        // start right after the discriminant.
        if self.max_ints == 0 {
            1 + STR_SLOT_SIZE * j
        } else {
            8 + 8 * self.max_ints + STR_SLOT_SIZE * j
        }
    }

    pub fn record_size(&self) -> usize {
        self.str_offset(self.max_strs)
    }
}

/// Resolve every declared probe: assign ids, allocate slots, attach blocked
/// fields, and compute the global maxima.
pub fn build_metadata(
    provider: &ProviderDecl,
    registry: &SchemaRegistry,
    cfg: &GenConfig,
) -> Result<(Vec<ProbeMetadata>, GlobalLayout)> {
    if provider.probes.len() > u8::MAX as usize {
        return Err(GenError::TooManyProbes(provider.probes.len()));
    }

    let mut metas = Vec::with_capacity(provider.probes.len());
    let mut layout = GlobalLayout::default();
    for (i, probe) in provider.probes.iter().enumerate() {
        let slots = allocate(probe, registry)?;
        layout.max_ints = layout.max_ints.max(slots.n_ints);
        layout.max_strs = layout.max_strs.max(slots.n_strs);

        let full_name = format!("{}:{}", provider.name, probe.name);
        let blocked = cfg
            .block_fields
            .get(&full_name)
            .cloned()
            .unwrap_or_default();
        metas.push(ProbeMetadata {
            id: (i + 1) as u8,
            name: probe.name.clone(),
            full_name,
            args: probe.args.clone(),
            slots,
            blocked,
        });
    }

    debug!(
        "allocated {} probes, {} int / {} string slots",
        metas.len(),
        layout.max_ints,
        layout.max_strs
    );
    Ok((metas, layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::parse_provider;
    use crate::schema::DEFAULT_CATALOGUE;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::parse(DEFAULT_CATALOGUE)
    }

    fn probe(decl: &str) -> ProbeDecl {
        let text = format!("provider t {{ {} }};", decl);
        parse_provider(&text).unwrap().probes.remove(0)
    }

    #[test]
    fn test_send_example() {
        let map = allocate(
            &probe("probe send(int64_t stream_id, const char *data, size_t len);"),
            &registry(),
        )
        .unwrap();
        let rendered: Vec<_> = map
            .entries
            .iter()
            .map(|e| format!("{}={}", e.key, e.field))
            .collect();
        assert_eq!(rendered, ["i0=stream_id", "s0=data", "i1=len"]);
        assert_eq!(map.n_ints, 2);
        assert_eq!(map.n_strs, 1);
    }

    #[test]
    fn test_struct_expansion_uses_field_names() {
        let map = allocate(
            &probe("probe accept(struct st_quicly_conn_t *conn);"),
            &registry(),
        )
        .unwrap();
        assert_eq!(map.entries.len(), 1);
        assert_eq!(map.entries[0].key, SlotKey::Int(0));
        assert_eq!(map.entries[0].field, "master_id");
        assert_eq!(map.entries[0].type_text, "uint32_t");
        assert_eq!(map.n_ints, 1);
    }

    #[test]
    fn test_struct_expansion_order_and_arity() {
        // one integer slot per non-padding field, in schema order
        let map = allocate(
            &probe("probe rtt(struct quicly_rtt_t *rtt, int64_t at);"),
            &registry(),
        )
        .unwrap();
        let fields: Vec<_> = map.entries.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["minimum", "smoothed", "variance", "latest", "at"]);
        assert_eq!(map.n_ints, 5);
    }

    #[test]
    fn test_unresolved_schema_is_fatal() {
        let err = allocate(
            &probe("probe bad(struct st_unknown_t *x);"),
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, GenError::UnresolvedSchema { .. }));
    }

    #[test]
    fn test_global_layout_dominates_every_probe() {
        let provider = parse_provider(
            "provider t {
                probe a(int64_t x, int64_t y, int64_t z);
                probe b(const char *s, const char *u);
                probe c(int64_t x);
            };",
        )
        .unwrap();
        let (metas, layout) = build_metadata(&provider, &registry(), &GenConfig::default()).unwrap();
        assert_eq!(layout.max_ints, 3);
        assert_eq!(layout.max_strs, 2);
        for meta in &metas {
            assert!(meta.slots.n_ints <= layout.max_ints);
            assert!(meta.slots.n_strs <= layout.max_strs);
        }
    }

    #[test]
    fn test_ids_dense_in_declaration_order() {
        let provider = parse_provider(
            "provider t {
                probe first(int64_t x);
                probe second(int64_t x);
                probe third(int64_t x);
            };",
        )
        .unwrap();
        let (metas, _) = build_metadata(&provider, &registry(), &GenConfig::default()).unwrap();
        let ids: Vec<_> = metas.iter().map(|m| (m.id, m.name.as_str())).collect();
        assert_eq!(ids, [(1, "first"), (2, "second"), (3, "third")]);
        assert_eq!(metas[0].full_name, "t:first");
    }

    #[test]
    fn test_allocation_deterministic() {
        let provider = parse_provider(
            "provider t {
                probe a(struct st_quicly_conn_t *conn, const char *s, int64_t x);
            };",
        )
        .unwrap();
        let reg = registry();
        let cfg = GenConfig::default();
        let (m1, l1) = build_metadata(&provider, &reg, &cfg).unwrap();
        let (m2, l2) = build_metadata(&provider, &reg, &cfg).unwrap();
        assert_eq!(l1, l2);
        assert_eq!(m1[0].slots, m2[0].slots);
    }

    #[test]
    fn test_record_offsets_mirror_c_layout() {
        let layout = GlobalLayout {
            max_ints: 3,
            max_strs: 1,
        };
        assert_eq!(layout.int_offset(0), 8);
        assert_eq!(layout.int_offset(2), 24);
        assert_eq!(layout.str_offset(0), 32);
        assert_eq!(layout.record_size(), 64);

        // no integer slots: byte alignment, strings right after the id
        let layout = GlobalLayout {
            max_ints: 0,
            max_strs: 2,
        };
        assert_eq!(layout.str_offset(0), 1);
        assert_eq!(layout.record_size(), 65);
    }
}
