//! Dialog-session orchestration for the staking lifecycle.
//!
//! The coordinator owns all transient session state (mode, raw amount input,
//! selected option, validation result, the early-unstake prompt) plus a
//! read-only mirror of the chain data the dialog depends on. Every write
//! intent runs the validation gates, reserves the single transaction slot,
//! submits through the chain port and follows the transaction to its
//! terminal outcome, refreshing the dependent mirrors on confirmation.
//!
//! Locks are held only to read or update in-memory state, never across a
//! chain call.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::classify;
use crate::config::StakingConfig;
use crate::core::error::{ClassifiedError, StakingError, StakingResult, ValidationError};
use crate::core::traits::{ChainClient, ChainFailure, NotificationSink, Severity};
use crate::core::types::{
    parse_amount, Address, FrozenBalances, OptionId, PendingTransaction, StakeRecord,
    StakingOption, TxId, TxKind,
};
use crate::tracker::{TrackerEvent, TransactionTracker, TxOutcome};
use crate::validate;

/// Which dialog tab the session is in. Switching resets transient input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogMode {
    #[default]
    Stake,
    Unstake,
    Frozen,
}

/// The affordance the dialog's primary button should route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Approve,
    Stake,
}

/// Read-only mirror of the chain state this session depends on. Refreshed
/// by the coordinator after confirmed mutations, never mutated directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainSnapshot {
    pub balance: u128,
    pub allowance: u128,
    pub options: Vec<StakingOption>,
    pub stakes: Vec<StakeRecord>,
    pub pool_liquidity: u128,
    pub frozen: FrozenBalances,
}

impl ChainSnapshot {
    pub fn option(&self, id: OptionId) -> Option<&StakingOption> {
        self.options.iter().find(|option| option.id == id)
    }

    /// Options currently offered for new stakes.
    pub fn active_options(&self) -> impl Iterator<Item = &StakingOption> {
        self.options.iter().filter(|option| option.is_active)
    }

    pub fn stake_for(&self, id: OptionId) -> Option<&StakeRecord> {
        self.stakes.iter().find(|stake| stake.option_id == id)
    }

    pub fn staked_amount(&self, id: OptionId) -> u128 {
        self.stake_for(id).map(|stake| stake.amount).unwrap_or(0)
    }
}

/// Early-unstake acknowledgment captured when the lock check trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarlyUnstakePrompt {
    pub option_id: OptionId,
    pub amount: u128,
    /// When the lock would expire on its own.
    pub unlock_time: i64,
}

#[derive(Debug, Default)]
struct SessionState {
    mode: DialogMode,
    amount_input: String,
    selected_option: Option<OptionId>,
    validation: Option<ValidationError>,
    prompt: Option<EarlyUnstakePrompt>,
    snapshot: ChainSnapshot,
}

/// Snapshot of everything a dialog needs to render.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub mode: DialogMode,
    pub amount_input: String,
    pub selected_option: Option<OptionId>,
    pub validation: Option<ValidationError>,
    /// True while an approval is the in-flight transaction.
    pub approving: bool,
    pub prompt: Option<EarlyUnstakePrompt>,
    pub pending: Option<PendingTransaction>,
    pub snapshot: ChainSnapshot,
}

/// Outcome of a request operation that got past local validation.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// The write confirmed on chain.
    Confirmed { kind: TxKind, tx: TxId },
    /// The stake is still inside its lock window: nothing was submitted and
    /// the early-unstake prompt is now raised.
    EarlyUnstakeConfirmationRequired,
}

/// Orchestrates approval, stake, unstake, freeze and withdrawal intents for
/// one dialog session.
pub struct StakingCoordinator {
    chain: Arc<dyn ChainClient>,
    notifier: Arc<dyn NotificationSink>,
    config: StakingConfig,
    owner: Address,
    tracker: TransactionTracker,
    session: RwLock<SessionState>,
}

impl StakingCoordinator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        notifier: Arc<dyn NotificationSink>,
        config: StakingConfig,
        owner: Address,
    ) -> StakingResult<Self> {
        config.validate()?;
        let tracker = TransactionTracker::new(chain.clone());
        Ok(Self {
            chain,
            notifier,
            config,
            owner,
            tracker,
            session: RwLock::new(SessionState::default()),
        })
    }

    /// Channel binding for transaction lifecycle events, for callers that do
    /// not await the request methods directly.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<TrackerEvent> {
        self.tracker.subscribe().await
    }

    /// Snapshot of the full session for rendering.
    pub async fn view(&self) -> SessionView {
        let pending = self.tracker.pending().await;
        let session = self.session.read().await;
        SessionView {
            mode: session.mode,
            amount_input: session.amount_input.clone(),
            selected_option: session.selected_option,
            validation: session.validation,
            approving: matches!(&pending, Some(p) if p.kind == TxKind::Approve),
            prompt: session.prompt.clone(),
            pending,
            snapshot: session.snapshot.clone(),
        }
    }

    /// Whether a write is outstanding. Primary actions stay disabled while
    /// this is true.
    pub async fn is_busy(&self) -> bool {
        !self.tracker.is_idle().await
    }

    pub async fn pending_kind(&self) -> Option<TxKind> {
        self.tracker.pending_kind().await
    }

    pub async fn validation_error(&self) -> Option<ValidationError> {
        self.session.read().await.validation
    }

    // ---- reactive session input -------------------------------------------

    /// Switch the dialog tab. Transient input never carries over; mirrored
    /// chain data and any in-flight transaction are untouched.
    pub async fn set_mode(&self, mode: DialogMode) {
        let mut session = self.session.write().await;
        if session.mode != mode {
            debug!(?mode, "dialog mode switched");
            session.mode = mode;
            session.amount_input.clear();
            session.selected_option = None;
            session.validation = None;
            session.prompt = None;
        }
    }

    /// Record raw amount input and re-run the gates for the current mode.
    pub async fn set_amount(&self, input: &str) -> StakingResult<()> {
        let amount = parse_amount(input)?;
        let mut session = self.session.write().await;
        session.amount_input = input.to_string();
        let validation = Self::gate(&session, amount);
        session.validation = validation;
        Ok(())
    }

    /// Select a staking option and re-run the gates against it.
    pub async fn select_option(&self, option_id: OptionId) -> StakingResult<()> {
        let mut session = self.session.write().await;
        if session.snapshot.option(option_id).is_none() {
            return Err(StakingError::UnknownOption(option_id));
        }
        session.selected_option = Some(option_id);
        Self::revalidate(&mut session);
        Ok(())
    }

    /// Whether the current amount requires a token approval before staking.
    pub async fn needs_approval(&self) -> bool {
        let session = self.session.read().await;
        match parse_amount(&session.amount_input) {
            Ok(Some(amount)) => amount > session.snapshot.allowance,
            _ => false,
        }
    }

    /// Which intent the primary button should route to in stake mode.
    pub async fn primary_action(&self) -> PrimaryAction {
        if self.needs_approval().await {
            PrimaryAction::Approve
        } else {
            PrimaryAction::Stake
        }
    }

    /// Reward the contract would quote for the current amount input against
    /// the given option, `None` while no amount is entered.
    pub async fn reward_quote(&self, option_id: OptionId) -> StakingResult<Option<u128>> {
        let session = self.session.read().await;
        let option = session
            .snapshot
            .option(option_id)
            .ok_or(StakingError::UnknownOption(option_id))?;
        let amount = parse_amount(&session.amount_input)?;
        Ok(amount.and_then(|amount| validate::potential_reward(option, amount)))
    }

    // ---- mirrored chain data ----------------------------------------------

    /// Load every read-only mirror this session depends on. Idempotent.
    pub async fn refresh_all(&self) -> StakingResult<()> {
        self.refresh_balance().await?;
        self.refresh_allowance().await?;
        self.refresh_options().await?;
        self.refresh_stakes().await?;
        self.refresh_pool_liquidity().await?;
        self.refresh_frozen().await?;
        Ok(())
    }

    pub async fn refresh_balance(&self) -> StakingResult<()> {
        let balance = self
            .chain
            .balance(&self.owner, &self.config.stake_token)
            .await
            .map_err(Self::read_failure)?;
        let mut session = self.session.write().await;
        session.snapshot.balance = balance;
        Self::revalidate(&mut session);
        Ok(())
    }

    pub async fn refresh_allowance(&self) -> StakingResult<()> {
        let allowance = self
            .chain
            .allowance(&self.owner, &self.config.pool)
            .await
            .map_err(Self::read_failure)?;
        self.session.write().await.snapshot.allowance = allowance;
        Ok(())
    }

    pub async fn refresh_options(&self) -> StakingResult<()> {
        let options = self
            .chain
            .staking_options(&self.config.pool)
            .await
            .map_err(Self::read_failure)?;
        let mut session = self.session.write().await;
        if let Some(selected) = session.selected_option {
            if !options.iter().any(|option| option.id == selected) {
                session.selected_option = None;
            }
        }
        session.snapshot.options = options;
        Self::revalidate(&mut session);
        Ok(())
    }

    pub async fn refresh_stakes(&self) -> StakingResult<()> {
        let stakes = self
            .chain
            .stake_records(&self.owner)
            .await
            .map_err(Self::read_failure)?;
        let mut session = self.session.write().await;
        session.snapshot.stakes = stakes;
        Self::revalidate(&mut session);
        Ok(())
    }

    pub async fn refresh_pool_liquidity(&self) -> StakingResult<()> {
        let liquidity = self
            .chain
            .pool_liquidity(&self.config.stake_token)
            .await
            .map_err(Self::read_failure)?;
        let mut session = self.session.write().await;
        session.snapshot.pool_liquidity = liquidity;
        Self::revalidate(&mut session);
        Ok(())
    }

    pub async fn refresh_frozen(&self) -> StakingResult<()> {
        let frozen = self
            .chain
            .frozen_balances(&self.owner, &self.config.stake_token)
            .await
            .map_err(Self::read_failure)?;
        self.session.write().await.snapshot.frozen = frozen;
        Ok(())
    }

    // ---- write intents ----------------------------------------------------

    /// Approve the pool to spend `amount_input` tokens.
    pub async fn request_approval(&self, amount_input: &str) -> StakingResult<FlowOutcome> {
        let amount = self.required_amount(amount_input)?;
        let balance = self.session.read().await.snapshot.balance;
        if let Err(validation) = validate::validate_stake_amount(Some(amount), balance) {
            return Err(self.notify_validation(validation).await);
        }
        info!(amount, "approval requested");
        self.execute(TxKind::Approve, self.chain.approve(&self.config.pool, amount))
            .await
    }

    /// Stake `amount_input` tokens into the given option.
    pub async fn request_stake(
        &self,
        option_id: OptionId,
        amount_input: &str,
    ) -> StakingResult<FlowOutcome> {
        let amount = self.required_amount(amount_input)?;
        let (option, balance, liquidity) = {
            let session = self.session.read().await;
            let option = session
                .snapshot
                .option(option_id)
                .cloned()
                .ok_or_else(|| self.refuse(StakingError::UnknownOption(option_id)))?;
            (option, session.snapshot.balance, session.snapshot.pool_liquidity)
        };
        if let Err(validation) = validate::validate_stake_amount(Some(amount), balance) {
            return Err(self.notify_validation(validation).await);
        }
        if let Err(validation) = validate::validate_reward_affordability(&option, amount, liquidity)
        {
            return Err(self.notify_validation(validation).await);
        }
        info!(option = %option_id, amount, "stake requested");
        self.execute(
            TxKind::Stake,
            self.chain.stake(&self.config.pool, option_id, amount),
        )
        .await
    }

    /// Unstake `amount_input` tokens from the given option.
    ///
    /// If the stake is still inside its lock window nothing is submitted;
    /// the early-unstake prompt is raised instead and the caller must route
    /// the user through [`confirm_frozen_unstake`] or
    /// [`cancel_frozen_unstake_prompt`].
    ///
    /// [`confirm_frozen_unstake`]: StakingCoordinator::confirm_frozen_unstake
    /// [`cancel_frozen_unstake_prompt`]: StakingCoordinator::cancel_frozen_unstake_prompt
    pub async fn request_unstake(
        &self,
        option_id: OptionId,
        amount_input: &str,
    ) -> StakingResult<FlowOutcome> {
        let amount = self.required_amount(amount_input)?;
        let (option, stake) = {
            let session = self.session.read().await;
            let option = session
                .snapshot
                .option(option_id)
                .cloned()
                .ok_or_else(|| self.refuse(StakingError::UnknownOption(option_id)))?;
            (option, session.snapshot.stake_for(option_id).cloned())
        };
        let staked = stake.as_ref().map(|stake| stake.amount).unwrap_or(0);
        if let Err(validation) = validate::validate_unstake_amount(Some(amount), staked) {
            return Err(self.notify_validation(validation).await);
        }

        if let Some(stake) = stake {
            let now = Utc::now().timestamp();
            if stake.is_locked(option.duration_seconds, now) {
                let prompt = EarlyUnstakePrompt {
                    option_id,
                    amount,
                    unlock_time: stake.unlock_time(option.duration_seconds),
                };
                self.session.write().await.prompt = Some(prompt);
                info!(option = %option_id, "stake still locked, early-unstake confirmation required");
                return Ok(FlowOutcome::EarlyUnstakeConfirmationRequired);
            }
        }

        info!(option = %option_id, amount, "unstake requested");
        self.execute(
            TxKind::Unstake,
            self.chain.unstake(&self.config.pool, option_id, amount),
        )
        .await
    }

    /// Proceed with the early-unstake path the user just acknowledged.
    ///
    /// Uses the exact option and amount captured when the prompt was raised.
    /// The prompt closes whether the write succeeds or fails, but survives a
    /// busy-slot refusal, which submits nothing.
    pub async fn confirm_frozen_unstake(&self) -> StakingResult<FlowOutcome> {
        let prompt = self
            .session
            .write()
            .await
            .prompt
            .take()
            .ok_or(StakingError::PromptNotRaised)?;
        // The staked quantity may have moved since the prompt was raised.
        let staked = self.session.read().await.snapshot.staked_amount(prompt.option_id);
        if let Err(validation) = validate::validate_unstake_amount(Some(prompt.amount), staked) {
            return Err(self.notify_validation(validation).await);
        }
        info!(option = %prompt.option_id, amount = prompt.amount, "early unstake confirmed");
        match self
            .execute(
                TxKind::UnstakeFreeze,
                self.chain
                    .unstake_freeze(&self.config.pool, prompt.option_id, prompt.amount),
            )
            .await
        {
            Err(error @ StakingError::TransactionInFlight(_)) => {
                // Nothing was submitted; the acknowledgment stays usable
                // unless a newer prompt replaced it meanwhile.
                let mut session = self.session.write().await;
                if session.prompt.is_none() {
                    session.prompt = Some(prompt);
                }
                Err(error)
            }
            outcome => outcome,
        }
    }

    /// Dismiss the early-unstake prompt without submitting anything.
    pub async fn cancel_frozen_unstake_prompt(&self) {
        if self.session.write().await.prompt.take().is_some() {
            debug!("early-unstake prompt dismissed");
        }
    }

    /// Withdraw everything released from the freeze window.
    pub async fn request_withdraw_frozen(&self) -> StakingResult<FlowOutcome> {
        let available = {
            let session = self.session.read().await;
            session.snapshot.frozen.available_for_withdrawal
        };
        if available == 0 {
            return Err(self.refuse(StakingError::NothingToWithdraw));
        }
        info!(available, "frozen withdrawal requested");
        self.execute(
            TxKind::WithdrawFrozen,
            self.chain.withdraw_frozen(&self.config.pool),
        )
        .await
    }

    // ---- internals --------------------------------------------------------

    /// Reserve the slot, submit the write, follow it to its terminal
    /// outcome. Exactly one notification is sent for a failed write.
    async fn execute(
        &self,
        kind: TxKind,
        submit: impl Future<Output = Result<TxId, ChainFailure>> + Send,
    ) -> StakingResult<FlowOutcome> {
        self.tracker.try_reserve(kind).await?;
        let tx = match submit.await {
            Ok(tx) => tx,
            Err(failure) => {
                self.tracker.abort_reservation().await;
                return Err(self.notify_failure(kind, classify::classify(&failure)));
            }
        };
        self.tracker.record_submission(&tx).await;
        if self.config.notify_submissions {
            self.notifier.notify(
                &format!("{} submitted. Waiting for confirmation", kind.label()),
                Severity::Info,
            );
        }
        match self.tracker.track_to_completion().await? {
            TxOutcome::Confirmed { kind, tx } => {
                self.notifier
                    .notify(Self::success_message(kind), Severity::Success);
                self.react_confirmed(kind).await;
                Ok(FlowOutcome::Confirmed { kind, tx })
            }
            TxOutcome::Failed { kind, error, .. } => Err(self.notify_failure(kind, error)),
        }
    }

    /// Kind-specific reactions once a write confirms: reset the consumed
    /// input and selection, refresh the mirrors the write invalidated.
    /// Approvals keep the form intact, they are a step inside the stake flow.
    async fn react_confirmed(&self, kind: TxKind) {
        let refreshed = match kind {
            TxKind::Approve => self.refresh_allowance().await,
            TxKind::Stake => {
                self.reset_input().await;
                let balance = self.refresh_balance().await;
                let stakes = self.refresh_stakes().await;
                let allowance = self.refresh_allowance().await;
                balance.and(stakes).and(allowance)
            }
            TxKind::Unstake => {
                self.reset_input().await;
                let balance = self.refresh_balance().await;
                let stakes = self.refresh_stakes().await;
                balance.and(stakes)
            }
            TxKind::UnstakeFreeze => {
                self.reset_input().await;
                let stakes = self.refresh_stakes().await;
                let frozen = self.refresh_frozen().await;
                stakes.and(frozen)
            }
            TxKind::WithdrawFrozen => {
                let balance = self.refresh_balance().await;
                let stakes = self.refresh_stakes().await;
                let frozen = self.refresh_frozen().await;
                balance.and(stakes).and(frozen)
            }
        };
        if let Err(error) = refreshed {
            // The write itself confirmed; stale mirrors repair on the next
            // refresh.
            warn!(kind = %kind, %error, "post-confirmation refresh failed");
        }
    }

    async fn reset_input(&self) {
        let mut session = self.session.write().await;
        session.amount_input.clear();
        session.selected_option = None;
        session.validation = None;
    }

    fn required_amount(&self, input: &str) -> StakingResult<u128> {
        parse_amount(input)
            .map_err(|error| self.refuse(error))?
            .ok_or_else(|| self.refuse(StakingError::AmountMissing))
    }

    /// Local refusal: surfaced as a warning, nothing was submitted.
    fn refuse(&self, error: StakingError) -> StakingError {
        self.notifier.notify(&error.to_string(), Severity::Warning);
        debug!(%error, "request refused before submission");
        error
    }

    /// Store and surface a failed validation gate.
    async fn notify_validation(&self, validation: ValidationError) -> StakingError {
        self.session.write().await.validation = Some(validation);
        self.notifier
            .notify(&validation.to_string(), Severity::Warning);
        debug!(%validation, "validation gate refused the request");
        StakingError::Validation(validation)
    }

    /// Route one classified failure to the sink and wrap it for the caller.
    fn notify_failure(&self, kind: TxKind, error: ClassifiedError) -> StakingError {
        if error.is_benign() {
            debug!(kind = %kind, "user rejected the wallet prompt");
            self.notifier.notify(&error.message, Severity::Info);
        } else {
            warn!(
                kind = %kind,
                category = ?error.category,
                message = %error.message,
                "write failed"
            );
            self.notifier.notify(&error.message, Severity::Error);
        }
        StakingError::Chain(error)
    }

    fn read_failure(failure: ChainFailure) -> StakingError {
        StakingError::Chain(classify::classify(&failure))
    }

    fn success_message(kind: TxKind) -> &'static str {
        match kind {
            TxKind::Approve => "Approval confirmed. You can stake now",
            TxKind::Stake => "Tokens staked successfully",
            TxKind::Unstake => "Tokens unstaked successfully",
            TxKind::UnstakeFreeze => "Unstake started. Tokens are now freezing",
            TxKind::WithdrawFrozen => "Frozen tokens withdrawn",
        }
    }

    /// Validation for the current mode, given a parsed amount. Pure.
    fn gate(session: &SessionState, amount: Option<u128>) -> Option<ValidationError> {
        let amount = amount?;
        match session.mode {
            DialogMode::Stake => {
                if let Err(validation) =
                    validate::validate_stake_amount(Some(amount), session.snapshot.balance)
                {
                    return Some(validation);
                }
                let option = session
                    .selected_option
                    .and_then(|id| session.snapshot.option(id));
                if let Some(option) = option {
                    validate::validate_reward_affordability(
                        option,
                        amount,
                        session.snapshot.pool_liquidity,
                    )
                    .err()
                } else {
                    None
                }
            }
            DialogMode::Unstake => session.selected_option.map(|id| {
                validate::validate_unstake_amount(Some(amount), session.snapshot.staked_amount(id))
                    .err()
            })?,
            DialogMode::Frozen => None,
        }
    }

    /// Recompute the stored validation after a snapshot or selection change.
    fn revalidate(session: &mut SessionState) {
        let amount = parse_amount(&session.amount_input).ok().flatten();
        let validation = Self::gate(session, amount);
        session.validation = validation;
    }
}
