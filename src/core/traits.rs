//! Ports the staking core requires from the embedding application.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::types::{Address, FrozenBalances, OptionId, StakeRecord, StakingOption, TxId};

/// Raw failure payload surfaced by a chain client.
///
/// Wallets and RPC transports return wildly different shapes (bare strings,
/// `{ message }`, nested `{ data: { message } }`). The payload stays opaque
/// here; only the classifier digs the text out.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainFailure(Value);

impl ChainFailure {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self(Value::String(message.into()))
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    /// Every human-readable string in the payload, outermost first.
    ///
    /// Wallet stacks bury the useful revert reason at different depths (an
    /// outer "Internal JSON-RPC error." often wraps the real reason under
    /// `data.message`), so failure classification tries each candidate in
    /// order instead of trusting the first one.
    pub fn candidate_messages(&self) -> Vec<String> {
        fn collect(value: &Value, out: &mut Vec<String>) {
            match value {
                Value::String(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() && !out.iter().any(|seen| seen == trimmed) {
                        out.push(trimmed.to_string());
                    }
                }
                Value::Object(map) => {
                    for key in ["message", "data", "error", "reason"] {
                        if let Some(inner) = map.get(key) {
                            collect(inner, out);
                        }
                    }
                }
                _ => {}
            }
        }
        let mut out = Vec::new();
        collect(&self.0, &mut out);
        out
    }

    /// Best-effort extraction of the primary human-readable message.
    pub fn message(&self) -> Option<String> {
        self.candidate_messages().into_iter().next()
    }
}

impl fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => f.write_str(&message),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Terminal state of a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TxStatus {
    Confirmed,
    Failed(ChainFailure),
}

/// Chain access the lifecycle core requires.
///
/// Reads return current chain state. Writes submit a transaction and return
/// its identifier without waiting for inclusion; `await_confirmation` is the
/// single confirmation-observation capability, and implementations fold
/// transport problems into [`TxStatus::Failed`].
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn allowance(&self, owner: &Address, spender: &Address) -> Result<u128, ChainFailure>;

    async fn balance(&self, owner: &Address, token: &Address) -> Result<u128, ChainFailure>;

    async fn stake_records(&self, owner: &Address) -> Result<Vec<StakeRecord>, ChainFailure>;

    async fn staking_options(&self, pool: &Address) -> Result<Vec<StakingOption>, ChainFailure>;

    async fn pool_liquidity(&self, token: &Address) -> Result<u128, ChainFailure>;

    async fn frozen_balances(
        &self,
        owner: &Address,
        token: &Address,
    ) -> Result<FrozenBalances, ChainFailure>;

    async fn approve(&self, spender: &Address, amount: u128) -> Result<TxId, ChainFailure>;

    async fn stake(
        &self,
        pool: &Address,
        option: OptionId,
        amount: u128,
    ) -> Result<TxId, ChainFailure>;

    async fn unstake(
        &self,
        pool: &Address,
        option: OptionId,
        amount: u128,
    ) -> Result<TxId, ChainFailure>;

    async fn unstake_freeze(
        &self,
        pool: &Address,
        option: OptionId,
        amount: u128,
    ) -> Result<TxId, ChainFailure>;

    async fn withdraw_frozen(&self, pool: &Address) -> Result<TxId, ChainFailure>;

    async fn await_confirmation(&self, tx: &TxId) -> TxStatus;
}

/// Severity channel for user-facing notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Sink for user-facing messages. Toast, snackbar or log, the coordinator
/// does not care.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}
