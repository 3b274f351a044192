//! Centralized error types for the staking lifecycle core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{OptionId, TxKind};

/// Result alias used across the crate.
pub type StakingResult<T> = Result<T, StakingError>;

/// Main error type of the staking lifecycle core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StakingError {
    /// Local validation refused the input; nothing was submitted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A write is already outstanding for this session.
    #[error("a {0} transaction is already in flight")]
    TransactionInFlight(TxKind),

    /// The requested option is not part of the mirrored pool data.
    #[error("Unknown staking option {0}")]
    UnknownOption(OptionId),

    /// A submission was requested without an amount.
    #[error("Enter an amount to continue")]
    AmountMissing,

    /// The raw amount input could not be parsed.
    #[error("Invalid amount \"{0}\"")]
    InvalidAmount(String),

    /// Nothing has been released from the freeze window yet.
    #[error("No frozen tokens are ready for withdrawal")]
    NothingToWithdraw,

    /// `confirm_frozen_unstake` was called without a raised prompt.
    #[error("no early-unstake confirmation is pending")]
    PromptNotRaised,

    /// The tracker has no submitted transaction to observe.
    #[error("no transaction is currently being tracked")]
    NothingInFlight,

    /// The chain rejected or failed the call; already classified.
    #[error(transparent)]
    Chain(#[from] ClassifiedError),

    /// Configuration could not be read or failed validation.
    #[error("Config error: {0}")]
    Config(String),
}

/// Pre-submission validation failures, recomputed whenever an amount or
/// selection changes. The passing case is simply `Ok(())`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Amount exceeds available balance")]
    ExceedsBalance,
    #[error("Amount exceeds staked amount")]
    ExceedsStakedAmount,
    #[error("Pool cannot cover the potential reward for this amount")]
    ExceedsPoolLiquidityForReward,
}

/// Closed set of user-facing categories derived from raw chain failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    UserRejected,
    InsufficientBalance,
    InsufficientAllowance,
    StakeLocked,
    InvalidOption,
    ContractRevertOther,
    Unknown,
}

/// A classified chain failure: the category plus the message shown to the
/// user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// User rejection is a benign cancellation, not an actionable failure.
    pub fn is_benign(&self) -> bool {
        self.category == ErrorCategory::UserRejected
    }
}
