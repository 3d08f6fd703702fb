use std::path::PathBuf;

use crate::context::MutationIdentifier;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing configuration: {0} is not set")]
    MissingConfig(&'static str),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode class artifact {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode class {class}: {source}")]
    Encode {
        class: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("coverage data rejected: {0}")]
    Coverage(#[from] CoverageError),
    #[error("mutation {0} was not found in class")]
    MutationNotFound(MutationIdentifier),
    #[error("engine invariant violated: {0}")]
    InvariantViolation(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact directory {0} is in use by another session")]
    Locked(PathBuf),
    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoverageError {
    #[error("output is not a valid coverage file (magic {0:02x?})")]
    BadMagic(Vec<u8>),
    #[error("unsupported execution data version {0:#06x}")]
    UnsupportedVersion(u16),
    #[error("truncated execution data at offset {0}")]
    Truncated(usize),
    #[error("unknown block type {kind:#04x} at offset {offset}")]
    UnknownBlock { kind: u8, offset: usize },
    #[error("malformed string at offset {0}")]
    BadString(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
