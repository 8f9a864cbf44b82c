//! Lexical argument type classification.
//!
//! There is no real type checker here: the catalogue is small and
//! hand-curated, so classification looks only at the type text, never at
//! runtime values. Classification and schema resolution stay separate stages
//! so a richer layout source can replace the catalogue without touching slot
//! allocation or code generation.

use std::sync::LazyLock;

use regex::Regex;

/// How an argument's value travels into the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// `char *`: NUL-terminated text, one string slot.
    Str,
    /// `uint8_t *` / `void *`: length-qualified buffer. Captured like [`Str`],
    /// rendered as hex alongside a sibling length slot at decode time.
    ///
    /// [`Str`]: TypeClass::Str
    Bin,
    /// Any other pointer: no slot for the pointer itself, one integer slot
    /// per field of the referenced struct layout.
    StructPtr,
    /// Copied by value into one integer slot.
    Scalar,
}

static BIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:u?int8_t|void)\s*\*").unwrap());
static STR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:char|u?int8_t|void)\s*\*").unwrap());

/// Classify a declared type. Deterministic on the type text alone.
pub fn classify(type_text: &str) -> TypeClass {
    if BIN_RE.is_match(type_text) {
        TypeClass::Bin
    } else if STR_RE.is_match(type_text) {
        TypeClass::Str
    } else if type_text.contains('*') {
        TypeClass::StructPtr
    } else {
        TypeClass::Scalar
    }
}

/// Reduce a pointer type to the bare struct name used for catalogue lookup.
pub fn strip_type_name(type_text: &str) -> String {
    type_text
        .replace('*', "")
        .replace("struct", "")
        .replace("const", "")
        .trim()
        .to_string()
}
