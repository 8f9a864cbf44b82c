use thiserror::Error;

/// Errors that abort code generation outright; no artifact is produced when
/// any of these fire. Redaction and probe suppression are configuration, not
/// errors, and never surface here.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("no provider block found in probe definitions")]
    MissingProvider,

    #[error("malformed probe declaration: `{0}`")]
    MalformedDeclaration(String),

    #[error("probe `{probe}` argument `{arg}`: no struct layout registered for `{schema}`")]
    UnresolvedSchema {
        probe: String,
        arg: String,
        schema: String,
    },

    #[error("probe `{probe}` binary field `{field}`: no `{field}_len` or `len` slot to pair with")]
    MissingLengthField { probe: String, field: String },

    #[error("backend enumerated probe `{0}` which is not declared by the provider")]
    UndeclaredProbe(String),

    #[error("probe `{probe}`: backend reports {reported} arguments, declaration has {declared}")]
    ArgumentCountMismatch {
        probe: String,
        declared: usize,
        reported: usize,
    },

    #[error("{0} probes declared, but the record discriminant holds at most 255")]
    TooManyProbes(usize),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GenError>;
