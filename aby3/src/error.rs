//! ABY3 bridge error types.

/// Error reported by a primitive engine.
///
/// The dispatch layer never inspects or recovers from these; they are wrapped
/// in [`Error::PrimitiveFailure`] together with the operation context.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    #[error("Shape mismatch, {lhs:?} vs {rhs:?}")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("Unsupported operand: {0}")]
    Unsupported(String),

    #[error("Kernel error: {0}")]
    KernelError(String),
}

pub type PrimitiveResult<T> = std::result::Result<T, PrimitiveError>;

/// Common error type used throughout.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Operation '{op}' expected a leading share dimension of 2, found shape {shape:?}")]
    LayoutViolation { op: &'static str, shape: Vec<usize> },

    #[error("Operation '{op}' failed in primitive layer on operands {shapes}: {source}")]
    PrimitiveFailure {
        op: &'static str,
        shapes: String,
        #[source]
        source: PrimitiveError,
    },

    #[error("Operation '{op}' cannot encode {value} at {precision} fractional bits")]
    EncodingOverflow {
        op: &'static str,
        value: f64,
        precision: u32,
    },

    #[error("Operation '{op}' revealed {value}, expected a boolean 0 or 1")]
    NonBooleanReveal { op: &'static str, value: i64 },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
