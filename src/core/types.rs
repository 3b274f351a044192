//! Domain types shared across the staking lifecycle core.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::error::{StakingError, StakingResult};

/// Seconds in a 365.25-day year, the constant the staking contract uses when
/// quoting rewards. Reward validation must reproduce it for numeric parity.
pub const SECONDS_PER_YEAR: u64 = 31_557_600;

/// APY figures are stored as integer basis points (1/100th of a percent).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Account or contract address in whatever text form the chain client uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Opaque transaction identifier returned by the chain client on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a staking option within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub u64);

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pool-level staking offer.
///
/// Immutable once read: the pool owner may deactivate an option, but its
/// duration and APY never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingOption {
    pub id: OptionId,
    pub duration_seconds: u64,
    pub apy_basis_points: u64,
    pub is_active: bool,
}

/// A user position against one staking option, mirrored from chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub option_id: OptionId,
    /// Amount in the smallest token unit.
    pub amount: u128,
    pub start_time_seconds: i64,
}

impl StakeRecord {
    /// Whether the position is still inside its lock window at `now`.
    pub fn is_locked(&self, duration_seconds: u64, now: i64) -> bool {
        now < self.unlock_time(duration_seconds)
    }

    /// Unix timestamp at which the lock expires. Durations beyond the
    /// representable range saturate instead of wrapping into the past.
    pub fn unlock_time(&self, duration_seconds: u64) -> i64 {
        let duration = i64::try_from(duration_seconds).unwrap_or(i64::MAX);
        self.start_time_seconds.saturating_add(duration)
    }
}

/// Frozen-balance figures reported by the staking contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenBalances {
    /// Still inside the cooldown window after an early unstake.
    pub freezing: u128,
    /// Released from the cooldown and withdrawable now.
    pub available_for_withdrawal: u128,
}

/// The write kinds the tracker can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Approve,
    Stake,
    Unstake,
    UnstakeFreeze,
    WithdrawFrozen,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Approve => "approve",
            TxKind::Stake => "stake",
            TxKind::Unstake => "unstake",
            TxKind::UnstakeFreeze => "unstake_freeze",
            TxKind::WithdrawFrozen => "withdraw_frozen",
        }
    }

    /// Human-readable label used in notification messages.
    pub fn label(&self) -> &'static str {
        match self {
            TxKind::Approve => "Approval",
            TxKind::Stake => "Stake",
            TxKind::Unstake => "Unstake",
            TxKind::UnstakeFreeze => "Frozen unstake",
            TxKind::WithdrawFrozen => "Withdrawal",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single in-flight write of a dialog session.
///
/// `tx` is `None` between slot reservation and the chain returning an
/// identifier; the wallet prompt lives inside that window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub kind: TxKind,
    pub tx: Option<TxId>,
    pub submitted_at: i64,
}

impl PendingTransaction {
    pub fn reserve(kind: TxKind) -> Self {
        Self {
            kind,
            tx: None,
            submitted_at: Utc::now().timestamp(),
        }
    }
}

/// Parse a raw amount string from the dialog input into smallest-unit tokens.
///
/// Empty and zero inputs are valid-pending (`Ok(None)`): nothing will be
/// submitted and nothing is flagged. Non-numeric input is a hard error.
pub fn parse_amount(input: &str) -> StakingResult<Option<u128>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: u128 = trimmed
        .parse()
        .map_err(|_| StakingError::InvalidAmount(trimmed.to_string()))?;
    Ok(if value == 0 { None } else { Some(value) })
}
