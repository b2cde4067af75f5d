//! Error types for generation-transaction and block-template construction.

use thiserror::Error;

/// Errors raised while building a job from a daemon block template.
///
/// All variants are detected synchronously during construction, before a job
/// is published to miners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The configured hashing algorithm does not map to a supported family.
    ///
    /// Startup-fatal: raised while loading configuration.
    #[error("the {0} hashing algorithm is not supported")]
    UnsupportedAlgorithm(String),

    /// A template field is missing or malformed.
    #[error("invalid template field `{field}`: {reason}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// An address or script could not be compiled into an output script.
    #[error("cannot compile output script for {address}: {reason}")]
    ScriptCompilation {
        /// The address or raw script that failed.
        address: String,
        /// Description of the failure.
        reason: String,
    },

    /// An output amount would be negative or the outputs do not add up.
    #[error("reward accounting error: {0}")]
    RewardAccounting(String),

    /// The supplied extranonce bytes do not fill the reserved placeholder.
    #[error("extranonce size mismatch: expected {expected} bytes, got {got}")]
    ExtraNonceSizeMismatch {
        /// Reserved placeholder size in bytes.
        expected: usize,
        /// Supplied size in bytes.
        got: usize,
    },

    /// The pool configuration is inconsistent.
    #[error("invalid pool configuration: {0}")]
    Config(String),
}

impl PoolError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        PoolError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn script(address: impl Into<String>, reason: impl Into<String>) -> Self {
        PoolError::ScriptCompilation {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error should stop the pool from starting at all.
    ///
    /// Every other error only drops the offending template; the previous job
    /// keeps being served.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PoolError::UnsupportedAlgorithm(_) | PoolError::Config(_)
        )
    }
}
