//! Error taxonomy shared by descriptors, the document codec, and node operations.
//!
//! Three kinds of failure reach callers:
//! - `InvalidArgument`: malformed or out-of-range option values, raised before any I/O.
//! - `Runtime` / `Connection`: topology state that is unavailable, handshake fallback
//!   failures, comparisons against vanished nodes, and wire-layer failures.
//! - `Decode`: document conversion failures surfaced by the codec.

use thiserror::Error;

/// Failures raised while converting between host values and BSON documents.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("maximum document nesting depth of {max_depth} exceeded")]
    DepthExceeded { max_depth: usize },
    #[error("expected a document or array at the top level, {found} given")]
    NotADocument { found: &'static str },
    #[error("invalid document key {key:?}: keys must not contain null bytes")]
    InvalidKey { key: String },
    #[error("malformed document: {0}")]
    Malformed(#[from] bson::raw::Error),
    #[error("could not serialize value: {0}")]
    Serialize(#[from] bson::ser::Error),
    #[error("could not deserialize value: {0}")]
    Deserialize(#[from] bson::de::Error),
}

/// Errors returned by every fallible operation in this workspace.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Runtime(String),
    /// Socket or network level failure reported by a wire executor.
    #[error("{0}")]
    Connection(String),
    #[error(transparent)]
    Decode(#[from] CodecError),
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Returns `true` for runtime failures, including connection failures.
    #[must_use]
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_) | Self::Connection(_))
    }

    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

impl From<bson::raw::Error> for Error {
    fn from(err: bson::raw::Error) -> Self {
        Self::Decode(CodecError::Malformed(err))
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Self::Decode(CodecError::Serialize(err))
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Self::Decode(CodecError::Deserialize(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
