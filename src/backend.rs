//! Narrow contract onto the live instrumentation backend.
//!
//! The platform service that knows which probes a target binary actually
//! carries, and the byte size and signedness of each argument at its call
//! sites, lives outside this crate. Generation consumes it only through
//! [`ProbeInventory`]; the positional value-read half of the contract is
//! exercised inside the generated BPF text (`bpf_usdt_readarg`).

use anyhow::Result;

use crate::idl::ProviderDecl;

/// Byte size and signedness of one argument at its call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgMeta {
    pub size: u8,
    pub signed: bool,
}

/// One probe the backend found in the target binary.
#[derive(Debug, Clone)]
pub struct EnumeratedProbe {
    pub name: String,
    pub args: Vec<ArgMeta>,
}

/// Enumerates a provider's probes with per-argument metadata.
pub trait ProbeInventory {
    fn enumerate(&self, provider: &str) -> Result<Vec<EnumeratedProbe>>;
}

/// Inventory derived from the declarations themselves: every declared probe
/// is reported, with metadata computed from the declared type text. Used
/// when generating without inspecting a live binary, and by tests.
pub struct DeclaredSizes<'a> {
    provider: &'a ProviderDecl,
}

impl<'a> DeclaredSizes<'a> {
    pub fn new(provider: &'a ProviderDecl) -> Self {
        DeclaredSizes { provider }
    }
}

impl ProbeInventory for DeclaredSizes<'_> {
    fn enumerate(&self, provider: &str) -> Result<Vec<EnumeratedProbe>> {
        if provider != self.provider.name {
            return Ok(Vec::new());
        }
        Ok(self
            .provider
            .probes
            .iter()
            .map(|p| EnumeratedProbe {
                name: p.name.clone(),
                args: p.args.iter().map(|a| declared_meta(&a.type_text)).collect(),
            })
            .collect())
    }
}

/// Size and signedness a C ABI gives the declared type.
pub fn declared_meta(type_text: &str) -> ArgMeta {
    if type_text.contains('*') {
        return ArgMeta {
            size: 8,
            signed: false,
        };
    }
    let bare = type_text.trim();
    let size = if bare.contains("int8") || bare.contains("char") || bare == "bool" {
        1
    } else if bare.contains("int16") || bare.contains("short") {
        2
    } else if bare.contains("int32") || bare == "int" || bare == "unsigned" || bare == "unsigned int"
    {
        4
    } else {
        8
    };
    let signed = !(bare.contains("uint")
        || bare.contains("unsigned")
        || (bare.contains("size_t") && !bare.contains("ssize_t"))
        || bare == "bool");
    ArgMeta { size, signed }
}
