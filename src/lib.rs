//! probegen — compiles USDT provider definitions into cooperating capture
//! and decode code.
//!
//! The pipeline runs strictly forward: [`idl`] parses the provider block and
//! [`schema`] the struct catalogue; [`classify`] categorizes argument types,
//! [`slots`] flattens them onto the one record shape shared by every probe,
//! and [`capture`]/[`decode`] emit the two generated sides from that single
//! slot map. [`assemble`] packages everything into one source unit.
//!
//! # Example
//!
//! ```
//! use probegen::backend::DeclaredSizes;
//! use probegen::schema::SchemaRegistry;
//! use probegen::{assemble, idl, GenConfig};
//!
//! let provider = idl::parse_provider(
//!     "provider demo { probe send(int64_t stream_id, const char *data, size_t len); };",
//! )
//! .unwrap();
//! let registry = SchemaRegistry::parse("");
//! let artifact = assemble::generate(
//!     &provider,
//!     &registry,
//!     &GenConfig::default(),
//!     &DeclaredSizes::new(&provider),
//! )
//! .unwrap();
//! assert!(artifact.bpf_text.contains("trace_demo__send"));
//! ```

pub mod assemble;
pub mod backend;
pub mod capture;
pub mod classify;
pub mod config;
pub mod decode;
pub mod error;
pub mod idl;
pub mod schema;
pub mod slots;

pub use assemble::{generate, Artifact, Registration};
pub use config::GenConfig;
pub use error::GenError;
