use std::path::PathBuf;
use thiserror::Error;

/// Why a line of a manifest could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("line is not valid UTF-8")]
    NotUtf8,
    #[error("missing `=` separator")]
    MissingSeparator,
    #[error("empty key")]
    EmptyKey,
    #[error("duplicate key `{0}`")]
    DuplicateKey(String),
    #[error("`{key}`: bad unsigned integer {value:?}")]
    BadInteger { key: &'static str, value: String },
    #[error("`radio_version`: {0}")]
    BadRadioVersion(String),
    #[error("`{key}`: bad hex string")]
    BadHex { key: &'static str },
    #[error("`{key}`: expected {expected} bytes, got {got}")]
    OptionByteWidth { key: &'static str, expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest too large: {len} bytes (max {max})")]
    TooLarge { len: u64, max: usize },
    #[error("line {line}: {kind}")]
    Parse { line: usize, kind: ParseErrorKind },
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),
    #[error("manifest names no artifact to update")]
    MissingMandatoryField,
    #[error("radio image without {0}")]
    RadioIncomplete(&'static str),
    #[error("option bytes only partially specified (missing `{0}`)")]
    IncompleteOptionByteSpec(&'static str),
}

impl ManifestError {
    pub(crate) fn parse(line: usize, kind: ParseErrorKind) -> Self {
        ManifestError::Parse { line, kind }
    }
}
