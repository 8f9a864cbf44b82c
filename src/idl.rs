//! Provider definition parser.
//!
//! Extracts probe declarations from a DTrace-style provider block:
//!
//! ```text
//! provider quicly {
//!     probe accept(struct st_quicly_conn_t *conn, int64_t at);
//!     probe send(int64_t stream_id, const char *data, size_t len);
//! };
//! ```
//!
//! `/* ... */` comments and whitespace are insignificant. Declaration order
//! is load-bearing: it fixes probe ids and slot order downstream, which is
//! why a declaration that fails to tokenize aborts parsing instead of being
//! dropped — a silently missing probe would shift every later id.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::error::{GenError, Result};

/// One declared argument, exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgDecl {
    pub type_text: String,
    pub name: String,
}

/// One probe declaration: name plus ordered typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDecl {
    pub name: String,
    pub args: Vec<ArgDecl>,
}

/// A parsed provider block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDecl {
    pub name: String,
    pub probes: Vec<ProbeDecl>,
}

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static PROVIDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\bprovider\s+([A-Za-z0-9_]+)\s*\{([^}]*)\}").unwrap());
static PROBE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^probe\s+([A-Za-z0-9_]+)\s*\(([^)]*)\)$").unwrap());
static ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w[^;,]*[^;,\s])\s*\b([A-Za-z0-9_]+)$").unwrap());

/// Parse the first provider block out of `text`.
pub fn parse_provider(text: &str) -> Result<ProviderDecl> {
    let text = COMMENT_RE.replace_all(text, " ");
    let caps = PROVIDER_RE
        .captures(&text)
        .ok_or(GenError::MissingProvider)?;
    let name = caps[1].to_string();
    let body = caps.get(2).map_or("", |m| m.as_str());

    let mut probes = Vec::new();
    for decl in body.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let caps = PROBE_RE
            .captures(decl)
            .ok_or_else(|| GenError::MalformedDeclaration(squeeze(decl)))?;
        let probe_name = caps[1].to_string();
        let args = parse_args(caps.get(2).map_or("", |m| m.as_str()), decl)?;
        probes.push(ProbeDecl {
            name: probe_name,
            args,
        });
    }

    debug!("parsed provider `{}`: {} probes", name, probes.len());
    Ok(ProviderDecl { name, probes })
}

fn parse_args(list: &str, decl: &str) -> Result<Vec<ArgDecl>> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    for piece in list.split(',') {
        let piece = squeeze(piece);
        let caps = ARG_RE
            .captures(&piece)
            .ok_or_else(|| GenError::MalformedDeclaration(squeeze(decl)))?;
        args.push(ArgDecl {
            type_text: caps[1].trim().to_string(),
            name: caps[2].to_string(),
        });
    }
    Ok(args)
}

/// Collapse whitespace runs so multi-line declarations read as one line in
/// error messages and generated comments.
fn squeeze(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
