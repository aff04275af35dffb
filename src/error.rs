//! Error types for clustering.

use std::fmt;

/// Errors that can occur during clustering or history queries.
#[derive(Debug, Clone)]
pub enum ClusterError {
    /// An input four-momentum had a NaN or infinite component.
    /// Inputs are validated when first admitted, before any clustering runs.
    NonFiniteMomentum { index: usize },

    /// The configuration cannot produce a correct run (bad radius, or a
    /// strategy that is invalid for the chosen distance measure).
    /// Raised before the recombination loop starts.
    InvalidConfig(String),

    /// More exclusive jets were requested than there were input particles.
    TooFewInputs { requested: usize, available: usize },

    /// A query was made through a handle whose clustering run has already
    /// been dropped.
    StaleSequence,

    /// Internal bookkeeping inconsistency (history/point count mismatch).
    /// This should not happen with valid input and indicates a bug.
    Internal(String),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::NonFiniteMomentum { index } => {
                write!(f, "non-finite momentum component in input {}", index)
            }
            ClusterError::InvalidConfig(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            ClusterError::TooFewInputs {
                requested,
                available,
            } => {
                write!(
                    f,
                    "requested {} exclusive jets, but there were only {} input particles",
                    requested, available
                )
            }
            ClusterError::StaleSequence => {
                write!(f, "cluster sequence no longer exists")
            }
            ClusterError::Internal(msg) => {
                write!(f, "internal inconsistency: {}", msg)
            }
        }
    }
}

impl std::error::Error for ClusterError {}
