//! Error types for dice construction and roll setup.
//!
//! Only setup problems are errors. Anomalies inside a running simulation
//! (timeouts, edge balances) are recovered internally and reported as
//! [`crate::sim::SettleEvent`]s instead.

use crate::dice::DieType;

/// Errors raised before any body is created.
#[derive(Debug, thiserror::Error)]
pub enum DiceError {
    /// Unsupported face count, unknown die name, or a non-positive radius.
    #[error("invalid die spec: {0}")]
    InvalidDieSpec(String),

    /// Geometry construction produced the wrong number of faces or a bad normal.
    #[error("degenerate geometry for {die}: {reason}")]
    DegenerateGeometry { die: DieType, reason: String },

    /// An expected value that the die cannot show.
    #[error("expected value {value} is not a face of a {die}")]
    InvalidExpectedValue { die: DieType, value: u32 },

    /// A roll request without dice.
    #[error("roll request contains no dice")]
    EmptyRoll,

    /// A settings value outside its allowed range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Settings could not be parsed or serialized.
    #[error("config serialization failed: {0}")]
    Config(#[from] serde_json::Error),
}

/// Convenience result type for dice operations.
pub type DiceResult<T> = Result<T, DiceError>;
