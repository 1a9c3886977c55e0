//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum EnvkitError {
    /// A wrapper or spec was constructed with invalid parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A spec does not satisfy a precondition of the requested transformation.
    #[error("Incompatible spec: {0}")]
    IncompatibleSpec(String),

    /// Two structured trees do not share the same structure.
    #[error("Structure mismatch at `{path}`: expected {expected}, got {got}")]
    StructureMismatch {
        /// Slash-joined path of the mismatching node.
        path: String,
        /// Description of the expected node.
        expected: String,
        /// Description of the node actually found.
        got: String,
    },

    /// A value does not conform to its spec.
    #[error("Validation failed at `{path}`: {reason}")]
    ValidationFailed {
        /// Slash-joined path of the offending leaf.
        path: String,
        /// The violated constraint, including the offending value.
        reason: String,
    },
}
