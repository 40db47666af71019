use thiserror::Error;

/// Errors produced while parsing or constructing object model values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("unknown reference type: {0}")]
    UnknownReferenceType(String),

    #[error("invalid reference name: {name}: {reason}")]
    InvalidReferenceName { name: String, reason: String },
}
