//! Kelp Staking Lifecycle Library
//!
//! Dialog-session core for a staking dApp: pre-submission validation,
//! chain-failure classification, single-slot transaction tracking and the
//! coordinator that sequences approval, stake, unstake, freeze and
//! withdrawal intents against a chain client.
//!
//! The crate owns no transport of its own. Embedders supply the
//! [`ChainClient`] and [`NotificationSink`] ports and drive the
//! [`StakingCoordinator`] from their UI events.

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod testing;
pub mod tracker;
pub mod validate;

// Re-export commonly used types
pub use crate::config::StakingConfig;
pub use crate::coordinator::{
    ChainSnapshot, DialogMode, EarlyUnstakePrompt, FlowOutcome, PrimaryAction, SessionView,
    StakingCoordinator,
};
pub use crate::core::error::{
    ClassifiedError, ErrorCategory, StakingError, StakingResult, ValidationError,
};
pub use crate::core::traits::{ChainClient, ChainFailure, NotificationSink, Severity, TxStatus};
pub use crate::core::types::{
    parse_amount, Address, FrozenBalances, OptionId, PendingTransaction, StakeRecord,
    StakingOption, TxId, TxKind, SECONDS_PER_YEAR,
};
pub use crate::tracker::{TrackerEvent, TransactionTracker, TxOutcome};
