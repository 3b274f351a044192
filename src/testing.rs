//! In-memory doubles for the chain and notification ports.
//!
//! Used by the crate's own tests and available to embedders for wiring
//! tests of their dialog code without a chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

use crate::core::traits::{ChainClient, ChainFailure, NotificationSink, Severity, TxStatus};
use crate::core::types::{Address, FrozenBalances, OptionId, StakeRecord, StakingOption, TxId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("mock state poisoned")
}

/// One write submitted through the mock, recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Approve { amount: u128 },
    Stake { option: OptionId, amount: u128 },
    Unstake { option: OptionId, amount: u128 },
    UnstakeFreeze { option: OptionId, amount: u128 },
    WithdrawFrozen,
}

#[derive(Debug, Default)]
struct ChainState {
    balance: u128,
    allowance: u128,
    stakes: Vec<StakeRecord>,
    options: Vec<StakingOption>,
    pool_liquidity: u128,
    frozen: FrozenBalances,
}

/// Deterministic in-memory chain. Writes apply their effects immediately;
/// confirmation can be held open to exercise in-flight behavior.
pub struct MockChainClient {
    state: Mutex<ChainState>,
    writes: Mutex<Vec<WriteCall>>,
    next_submission_failure: Mutex<Option<ChainFailure>>,
    next_read_failure: Mutex<Option<ChainFailure>>,
    next_confirmation_failure: Mutex<Option<ChainFailure>>,
    confirmations_open: watch::Sender<bool>,
    next_tx: AtomicU64,
}

impl MockChainClient {
    pub fn new() -> Self {
        let (confirmations_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(ChainState::default()),
            writes: Mutex::new(Vec::new()),
            next_submission_failure: Mutex::new(None),
            next_read_failure: Mutex::new(None),
            next_confirmation_failure: Mutex::new(None),
            confirmations_open,
            next_tx: AtomicU64::new(1),
        }
    }

    pub fn set_balance(&self, balance: u128) {
        lock(&self.state).balance = balance;
    }

    pub fn set_allowance(&self, allowance: u128) {
        lock(&self.state).allowance = allowance;
    }

    pub fn set_options(&self, options: Vec<StakingOption>) {
        lock(&self.state).options = options;
    }

    pub fn set_stakes(&self, stakes: Vec<StakeRecord>) {
        lock(&self.state).stakes = stakes;
    }

    pub fn set_pool_liquidity(&self, liquidity: u128) {
        lock(&self.state).pool_liquidity = liquidity;
    }

    pub fn set_frozen(&self, frozen: FrozenBalances) {
        lock(&self.state).frozen = frozen;
    }

    pub fn current_balance(&self) -> u128 {
        lock(&self.state).balance
    }

    pub fn current_allowance(&self) -> u128 {
        lock(&self.state).allowance
    }

    pub fn current_stakes(&self) -> Vec<StakeRecord> {
        lock(&self.state).stakes.clone()
    }

    pub fn current_frozen(&self) -> FrozenBalances {
        lock(&self.state).frozen
    }

    /// Fail the next write call at submission time, before any identifier
    /// is returned.
    pub fn fail_next_submission(&self, payload: Value) {
        *lock(&self.next_submission_failure) = Some(ChainFailure::new(payload));
    }

    /// Fail the next read call.
    pub fn fail_next_read(&self, payload: Value) {
        *lock(&self.next_read_failure) = Some(ChainFailure::new(payload));
    }

    /// Resolve the next confirmation as failed with the given payload.
    pub fn fail_next_confirmation(&self, payload: Value) {
        *lock(&self.next_confirmation_failure) = Some(ChainFailure::new(payload));
    }

    /// Park every confirmation wait until [`release_confirmations`] is
    /// called. Lets a test observe the in-flight window.
    ///
    /// [`release_confirmations`]: MockChainClient::release_confirmations
    pub fn hold_confirmations(&self) {
        self.confirmations_open.send_replace(false);
    }

    pub fn release_confirmations(&self) {
        self.confirmations_open.send_replace(true);
    }

    /// Every write submitted so far, in order.
    pub fn write_calls(&self) -> Vec<WriteCall> {
        lock(&self.writes).clone()
    }

    fn begin_read(&self) -> Result<(), ChainFailure> {
        match lock(&self.next_read_failure).take() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn begin_write(&self, call: WriteCall) -> Result<TxId, ChainFailure> {
        if let Some(failure) = lock(&self.next_submission_failure).take() {
            return Err(failure);
        }
        lock(&self.writes).push(call);
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        Ok(TxId::new(format!("0xmock{id:04x}")))
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn allowance(&self, _owner: &Address, _spender: &Address) -> Result<u128, ChainFailure> {
        self.begin_read()?;
        Ok(lock(&self.state).allowance)
    }

    async fn balance(&self, _owner: &Address, _token: &Address) -> Result<u128, ChainFailure> {
        self.begin_read()?;
        Ok(lock(&self.state).balance)
    }

    async fn stake_records(&self, _owner: &Address) -> Result<Vec<StakeRecord>, ChainFailure> {
        self.begin_read()?;
        Ok(lock(&self.state).stakes.clone())
    }

    async fn staking_options(&self, _pool: &Address) -> Result<Vec<StakingOption>, ChainFailure> {
        self.begin_read()?;
        Ok(lock(&self.state).options.clone())
    }

    async fn pool_liquidity(&self, _token: &Address) -> Result<u128, ChainFailure> {
        self.begin_read()?;
        Ok(lock(&self.state).pool_liquidity)
    }

    async fn frozen_balances(
        &self,
        _owner: &Address,
        _token: &Address,
    ) -> Result<FrozenBalances, ChainFailure> {
        self.begin_read()?;
        Ok(lock(&self.state).frozen)
    }

    async fn approve(&self, _spender: &Address, amount: u128) -> Result<TxId, ChainFailure> {
        let tx = self.begin_write(WriteCall::Approve { amount })?;
        lock(&self.state).allowance = amount;
        Ok(tx)
    }

    async fn stake(
        &self,
        _pool: &Address,
        option: OptionId,
        amount: u128,
    ) -> Result<TxId, ChainFailure> {
        let tx = self.begin_write(WriteCall::Stake { option, amount })?;
        let mut state = lock(&self.state);
        state.balance = state.balance.saturating_sub(amount);
        state.allowance = state.allowance.saturating_sub(amount);
        match state.stakes.iter_mut().find(|s| s.option_id == option) {
            Some(stake) => stake.amount += amount,
            None => state.stakes.push(StakeRecord {
                option_id: option,
                amount,
                start_time_seconds: Utc::now().timestamp(),
            }),
        }
        Ok(tx)
    }

    async fn unstake(
        &self,
        _pool: &Address,
        option: OptionId,
        amount: u128,
    ) -> Result<TxId, ChainFailure> {
        let tx = self.begin_write(WriteCall::Unstake { option, amount })?;
        let mut state = lock(&self.state);
        state.balance += amount;
        if let Some(stake) = state.stakes.iter_mut().find(|s| s.option_id == option) {
            stake.amount = stake.amount.saturating_sub(amount);
        }
        state.stakes.retain(|s| s.amount > 0);
        Ok(tx)
    }

    async fn unstake_freeze(
        &self,
        _pool: &Address,
        option: OptionId,
        amount: u128,
    ) -> Result<TxId, ChainFailure> {
        let tx = self.begin_write(WriteCall::UnstakeFreeze { option, amount })?;
        let mut state = lock(&self.state);
        if let Some(stake) = state.stakes.iter_mut().find(|s| s.option_id == option) {
            stake.amount = stake.amount.saturating_sub(amount);
        }
        state.stakes.retain(|s| s.amount > 0);
        state.frozen.freezing += amount;
        Ok(tx)
    }

    async fn withdraw_frozen(&self, _pool: &Address) -> Result<TxId, ChainFailure> {
        let tx = self.begin_write(WriteCall::WithdrawFrozen)?;
        let mut state = lock(&self.state);
        state.balance += state.frozen.available_for_withdrawal;
        state.frozen.available_for_withdrawal = 0;
        Ok(tx)
    }

    async fn await_confirmation(&self, _tx: &TxId) -> TxStatus {
        let mut gate = self.confirmations_open.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        match lock(&self.next_confirmation_failure).take() {
            Some(failure) => TxStatus::Failed(failure),
            None => TxStatus::Confirmed,
        }
    }
}

/// One notification delivered to the [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

/// Notification sink that stores everything it is told.
#[derive(Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }

    pub fn messages_with(&self, severity: Severity) -> Vec<String> {
        lock(&self.notices)
            .iter()
            .filter(|notice| notice.severity == severity)
            .map(|notice| notice.message.clone())
            .collect()
    }

    pub fn contains(&self, fragment: &str) -> bool {
        lock(&self.notices)
            .iter()
            .any(|notice| notice.message.contains(fragment))
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, message: &str, severity: Severity) {
        lock(&self.notices).push(Notice {
            message: message.to_string(),
            severity,
        });
    }
}
