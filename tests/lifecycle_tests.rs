//! End-to-end dialog flows against the in-memory chain double.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::sleep;

use kelp_staking::testing::{MockChainClient, RecordingSink, WriteCall};
use kelp_staking::{
    ClassifiedError, DialogMode, ErrorCategory, FlowOutcome, FrozenBalances, OptionId,
    PrimaryAction, Severity, StakeRecord, StakingConfig, StakingCoordinator, StakingError,
    StakingOption, TrackerEvent, TxKind, ValidationError, SECONDS_PER_YEAR,
};

fn config() -> StakingConfig {
    StakingConfig {
        pool: "0xpool".into(),
        stake_token: "0xtoken".into(),
        notify_submissions: true,
    }
}

fn wiring() -> (Arc<StakingCoordinator>, Arc<MockChainClient>, Arc<RecordingSink>) {
    wiring_with(config())
}

fn wiring_with(
    config: StakingConfig,
) -> (Arc<StakingCoordinator>, Arc<MockChainClient>, Arc<RecordingSink>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,kelp_staking=debug")
        .try_init();
    let chain = Arc::new(MockChainClient::new());
    let sink = Arc::new(RecordingSink::new());
    let coordinator =
        StakingCoordinator::new(chain.clone(), sink.clone(), config, "0xalice".into())
            .expect("valid config");
    (Arc::new(coordinator), chain, sink)
}

fn short_option(id: u64) -> StakingOption {
    StakingOption {
        id: OptionId(id),
        duration_seconds: 600,
        apy_basis_points: 1_000,
        is_active: true,
    }
}

/// Funded session: 1000 tokens, nothing approved, one 600-second option.
async fn funded() -> (Arc<StakingCoordinator>, Arc<MockChainClient>, Arc<RecordingSink>) {
    let (coordinator, chain, sink) = wiring();
    chain.set_balance(1_000);
    chain.set_options(vec![short_option(1)]);
    chain.set_pool_liquidity(1_000_000);
    coordinator.refresh_all().await.unwrap();
    (coordinator, chain, sink)
}

async fn wait_until_busy(coordinator: &StakingCoordinator) {
    for _ in 0..200 {
        if coordinator.is_busy().await {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("coordinator never became busy");
}

#[tokio::test]
async fn full_dialog_lifecycle_round_trip() {
    let (coordinator, chain, sink) = funded().await;

    // Nothing is approved yet, so the primary action routes to approval.
    coordinator.set_amount("250").await.unwrap();
    assert!(coordinator.needs_approval().await);
    assert_eq!(coordinator.primary_action().await, PrimaryAction::Approve);

    let approved = coordinator.request_approval("250").await.unwrap();
    assert!(matches!(
        approved,
        FlowOutcome::Confirmed {
            kind: TxKind::Approve,
            ..
        }
    ));
    // The allowance mirror refreshed and the entered amount survived.
    assert_eq!(coordinator.view().await.snapshot.allowance, 250);
    assert_eq!(coordinator.view().await.amount_input, "250");
    assert_eq!(coordinator.primary_action().await, PrimaryAction::Stake);

    let staked = coordinator.request_stake(OptionId(1), "250").await.unwrap();
    assert!(matches!(
        staked,
        FlowOutcome::Confirmed {
            kind: TxKind::Stake,
            ..
        }
    ));
    let view = coordinator.view().await;
    assert_eq!(view.snapshot.balance, 750);
    assert_eq!(view.snapshot.staked_amount(OptionId(1)), 250);
    assert_eq!(view.amount_input, "");

    // Unstaking right away trips the lock and raises the prompt.
    let outcome = coordinator.request_unstake(OptionId(1), "100").await.unwrap();
    assert_eq!(outcome, FlowOutcome::EarlyUnstakeConfirmationRequired);

    let frozen = coordinator.confirm_frozen_unstake().await.unwrap();
    assert!(matches!(
        frozen,
        FlowOutcome::Confirmed {
            kind: TxKind::UnstakeFreeze,
            ..
        }
    ));
    let view = coordinator.view().await;
    assert_eq!(view.snapshot.frozen.freezing, 100);
    assert_eq!(view.snapshot.staked_amount(OptionId(1)), 150);
    assert_eq!(view.prompt, None);

    // Once the freeze window releases the tokens they can be withdrawn.
    chain.set_frozen(FrozenBalances {
        freezing: 0,
        available_for_withdrawal: 100,
    });
    coordinator.refresh_frozen().await.unwrap();
    let withdrawn = coordinator.request_withdraw_frozen().await.unwrap();
    assert!(matches!(
        withdrawn,
        FlowOutcome::Confirmed {
            kind: TxKind::WithdrawFrozen,
            ..
        }
    ));
    assert_eq!(coordinator.view().await.snapshot.balance, 850);

    assert_eq!(
        chain.write_calls(),
        vec![
            WriteCall::Approve { amount: 250 },
            WriteCall::Stake {
                option: OptionId(1),
                amount: 250
            },
            WriteCall::UnstakeFreeze {
                option: OptionId(1),
                amount: 100
            },
            WriteCall::WithdrawFrozen,
        ]
    );
    assert_eq!(sink.messages_with(Severity::Success).len(), 4);
    assert!(sink.messages_with(Severity::Error).is_empty());
}

#[tokio::test]
async fn stake_exceeding_balance_is_refused_locally() {
    let (coordinator, chain, sink) = wiring();
    chain.set_balance(30);
    chain.set_options(vec![short_option(1)]);
    chain.set_pool_liquidity(1_000_000);
    coordinator.refresh_all().await.unwrap();

    let refused = coordinator.request_stake(OptionId(1), "50").await;
    assert_eq!(
        refused,
        Err(StakingError::Validation(ValidationError::ExceedsBalance))
    );
    assert!(chain.write_calls().is_empty());
    assert_eq!(
        coordinator.validation_error().await,
        Some(ValidationError::ExceedsBalance)
    );
    assert!(sink.contains("exceeds available balance"));
    assert_eq!(sink.messages_with(Severity::Warning).len(), 1);
}

#[tokio::test]
async fn absent_amounts_never_reach_the_chain() {
    let (coordinator, chain, sink) = funded().await;

    for input in ["", "0", "   "] {
        assert_eq!(
            coordinator.request_stake(OptionId(1), input).await,
            Err(StakingError::AmountMissing)
        );
        assert_eq!(
            coordinator.request_approval(input).await,
            Err(StakingError::AmountMissing)
        );
    }

    assert!(chain.write_calls().is_empty());
    assert!(sink.contains("Enter an amount to continue"));
    // One warning per refusal, and nothing stored as a validation failure.
    assert_eq!(sink.messages_with(Severity::Warning).len(), 6);
    assert_eq!(coordinator.validation_error().await, None);
}

#[tokio::test]
async fn unaffordable_reward_blocks_the_stake() {
    let (coordinator, chain, _sink) = wiring();
    chain.set_balance(1_000);
    chain.set_options(vec![StakingOption {
        id: OptionId(7),
        duration_seconds: SECONDS_PER_YEAR,
        apy_basis_points: 1_000,
        is_active: true,
    }]);
    // A 10% single-year reward on 100 tokens is 10, more than the pool holds.
    chain.set_pool_liquidity(5);
    coordinator.refresh_all().await.unwrap();

    let refused = coordinator.request_stake(OptionId(7), "100").await;
    assert_eq!(
        refused,
        Err(StakingError::Validation(
            ValidationError::ExceedsPoolLiquidityForReward
        ))
    );
    assert!(chain.write_calls().is_empty());

    chain.set_pool_liquidity(10);
    coordinator.refresh_pool_liquidity().await.unwrap();
    assert!(coordinator.request_stake(OptionId(7), "100").await.is_ok());
}

#[tokio::test]
async fn second_write_is_refused_while_one_is_in_flight() {
    let (coordinator, chain, sink) = funded().await;
    chain.set_allowance(1_000);
    coordinator.refresh_allowance().await.unwrap();
    chain.hold_confirmations();

    let background = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_stake(OptionId(1), "50").await })
    };
    wait_until_busy(&coordinator).await;
    assert_eq!(coordinator.pending_kind().await, Some(TxKind::Stake));

    let notices_before = sink.notices().len();
    let refused = coordinator.request_stake(OptionId(1), "25").await;
    assert_eq!(
        refused,
        Err(StakingError::TransactionInFlight(TxKind::Stake))
    );
    // The refusal is an error return, not another notification.
    assert_eq!(sink.notices().len(), notices_before);

    chain.release_confirmations();
    let outcome = background.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        FlowOutcome::Confirmed {
            kind: TxKind::Stake,
            ..
        }
    ));
    assert!(!coordinator.is_busy().await);
    assert_eq!(chain.write_calls().len(), 1);
}

#[tokio::test]
async fn locked_stake_raises_the_prompt_instead_of_submitting() {
    let (coordinator, chain, _sink) = funded().await;
    let start = Utc::now().timestamp() - 100;
    chain.set_stakes(vec![StakeRecord {
        option_id: OptionId(1),
        amount: 500,
        start_time_seconds: start,
    }]);
    coordinator.refresh_stakes().await.unwrap();

    let outcome = coordinator.request_unstake(OptionId(1), "200").await.unwrap();
    assert_eq!(outcome, FlowOutcome::EarlyUnstakeConfirmationRequired);
    assert!(chain.write_calls().is_empty());

    let prompt = coordinator.view().await.prompt.expect("prompt raised");
    assert_eq!(prompt.option_id, OptionId(1));
    assert_eq!(prompt.amount, 200);
    assert_eq!(prompt.unlock_time, start + 600);
}

#[tokio::test]
async fn expired_lock_unstakes_directly() {
    let (coordinator, chain, _sink) = funded().await;
    chain.set_stakes(vec![StakeRecord {
        option_id: OptionId(1),
        amount: 500,
        start_time_seconds: Utc::now().timestamp() - 700,
    }]);
    coordinator.refresh_stakes().await.unwrap();

    let outcome = coordinator.request_unstake(OptionId(1), "200").await.unwrap();
    assert!(matches!(
        outcome,
        FlowOutcome::Confirmed {
            kind: TxKind::Unstake,
            ..
        }
    ));
    assert_eq!(
        chain.write_calls(),
        vec![WriteCall::Unstake {
            option: OptionId(1),
            amount: 200
        }]
    );
    let view = coordinator.view().await;
    assert_eq!(view.prompt, None);
    assert_eq!(view.snapshot.staked_amount(OptionId(1)), 300);
    assert_eq!(view.snapshot.balance, 1_200);
}

#[tokio::test]
async fn unstaking_more_than_staked_is_refused_before_the_lock_check() {
    let (coordinator, chain, _sink) = funded().await;
    chain.set_stakes(vec![StakeRecord {
        option_id: OptionId(1),
        amount: 100,
        start_time_seconds: Utc::now().timestamp() - 100,
    }]);
    coordinator.refresh_stakes().await.unwrap();

    let refused = coordinator.request_unstake(OptionId(1), "150").await;
    assert_eq!(
        refused,
        Err(StakingError::Validation(ValidationError::ExceedsStakedAmount))
    );
    // The lock check never ran: no prompt, no submission.
    assert_eq!(coordinator.view().await.prompt, None);
    assert!(chain.write_calls().is_empty());
}

#[tokio::test]
async fn cancelled_prompt_submits_nothing() {
    let (coordinator, chain, _sink) = funded().await;
    chain.set_stakes(vec![StakeRecord {
        option_id: OptionId(1),
        amount: 500,
        start_time_seconds: Utc::now().timestamp(),
    }]);
    coordinator.refresh_stakes().await.unwrap();

    coordinator.request_unstake(OptionId(1), "200").await.unwrap();
    coordinator.cancel_frozen_unstake_prompt().await;

    assert_eq!(coordinator.view().await.prompt, None);
    assert!(chain.write_calls().is_empty());
    assert_eq!(
        coordinator.confirm_frozen_unstake().await,
        Err(StakingError::PromptNotRaised)
    );
}

#[tokio::test]
async fn busy_slot_refusal_keeps_the_acknowledged_prompt() {
    let (coordinator, chain, _sink) = funded().await;
    chain.set_stakes(vec![StakeRecord {
        option_id: OptionId(1),
        amount: 500,
        start_time_seconds: Utc::now().timestamp(),
    }]);
    coordinator.refresh_stakes().await.unwrap();
    coordinator.request_unstake(OptionId(1), "200").await.unwrap();

    chain.hold_confirmations();
    let background = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_approval("10").await })
    };
    wait_until_busy(&coordinator).await;

    let refused = coordinator.confirm_frozen_unstake().await;
    assert_eq!(
        refused,
        Err(StakingError::TransactionInFlight(TxKind::Approve))
    );
    // Nothing was submitted, so the acknowledgment survives for a retry.
    let prompt = coordinator.view().await.prompt.expect("prompt still raised");
    assert_eq!(prompt.option_id, OptionId(1));
    assert_eq!(prompt.amount, 200);

    chain.release_confirmations();
    background.await.unwrap().unwrap();
    let outcome = coordinator.confirm_frozen_unstake().await.unwrap();
    assert!(matches!(
        outcome,
        FlowOutcome::Confirmed {
            kind: TxKind::UnstakeFreeze,
            ..
        }
    ));
    assert_eq!(coordinator.view().await.prompt, None);
}

#[tokio::test]
async fn withdrawal_requires_released_frozen_tokens() {
    let (coordinator, chain, sink) = funded().await;

    let refused = coordinator.request_withdraw_frozen().await;
    assert_eq!(refused, Err(StakingError::NothingToWithdraw));
    assert!(sink.contains("No frozen tokens are ready"));
    assert!(chain.write_calls().is_empty());

    chain.set_frozen(FrozenBalances {
        freezing: 50,
        available_for_withdrawal: 100,
    });
    coordinator.refresh_frozen().await.unwrap();

    let outcome = coordinator.request_withdraw_frozen().await.unwrap();
    assert!(matches!(
        outcome,
        FlowOutcome::Confirmed {
            kind: TxKind::WithdrawFrozen,
            ..
        }
    ));
    let view = coordinator.view().await;
    assert_eq!(view.snapshot.balance, 1_100);
    assert_eq!(view.snapshot.frozen.available_for_withdrawal, 0);
    assert_eq!(view.snapshot.frozen.freezing, 50);
}

#[tokio::test]
async fn user_rejection_is_benign_and_leaves_the_session_usable() {
    let (coordinator, chain, sink) = funded().await;
    chain.set_allowance(1_000);
    coordinator.refresh_allowance().await.unwrap();
    chain.fail_next_submission(json!({
        "code": 4001,
        "message": "User rejected the request"
    }));

    let rejected = coordinator.request_stake(OptionId(1), "50").await;
    match rejected {
        Err(StakingError::Chain(error)) => {
            assert_eq!(error.category, ErrorCategory::UserRejected);
        }
        other => panic!("expected a classified rejection, got {other:?}"),
    }
    assert_eq!(
        sink.messages_with(Severity::Info),
        vec!["Transaction was rejected by user".to_string()]
    );
    assert!(sink.messages_with(Severity::Error).is_empty());
    assert!(!coordinator.is_busy().await);

    // The slot was released, so retrying works immediately.
    let retried = coordinator.request_stake(OptionId(1), "50").await.unwrap();
    assert!(matches!(retried, FlowOutcome::Confirmed { .. }));
}

#[tokio::test]
async fn failed_confirmation_is_classified_and_notified_once() {
    let (coordinator, chain, sink) = funded().await;
    chain.set_stakes(vec![StakeRecord {
        option_id: OptionId(1),
        amount: 500,
        start_time_seconds: Utc::now().timestamp() - 700,
    }]);
    coordinator.refresh_stakes().await.unwrap();
    coordinator.set_amount("200").await.unwrap();
    chain.fail_next_confirmation(json!({
        "code": -32603,
        "message": "Internal JSON-RPC error.",
        "data": { "message": "execution reverted: Stake is locked" }
    }));

    let failed = coordinator.request_unstake(OptionId(1), "200").await;
    assert_eq!(
        failed,
        Err(StakingError::Chain(ClassifiedError::new(
            ErrorCategory::StakeLocked,
            "Stake is still locked. Please use frozen unstake or wait until lock period ends"
        )))
    );
    let errors = sink.messages_with(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("frozen unstake"));

    // The form stays populated for a retry and the slot is free again.
    let view = coordinator.view().await;
    assert_eq!(view.amount_input, "200");
    assert!(!coordinator.is_busy().await);
}

#[tokio::test]
async fn submission_acks_follow_the_config_flag() {
    // The default wiring acknowledges every submission.
    let (coordinator, chain, sink) = funded().await;
    chain.set_allowance(1_000);
    coordinator.refresh_allowance().await.unwrap();
    coordinator.request_stake(OptionId(1), "50").await.unwrap();
    assert_eq!(
        sink.messages_with(Severity::Info),
        vec!["Stake submitted. Waiting for confirmation".to_string()]
    );

    // Disabling the flag silences the acknowledgment but not the outcome.
    let quiet = StakingConfig {
        notify_submissions: false,
        ..config()
    };
    let (coordinator, chain, sink) = wiring_with(quiet);
    chain.set_balance(1_000);
    chain.set_allowance(1_000);
    chain.set_options(vec![short_option(1)]);
    chain.set_pool_liquidity(1_000_000);
    coordinator.refresh_all().await.unwrap();

    coordinator.request_stake(OptionId(1), "50").await.unwrap();
    assert!(sink.messages_with(Severity::Info).is_empty());
    assert_eq!(
        sink.messages_with(Severity::Success),
        vec!["Tokens staked successfully".to_string()]
    );
}

#[tokio::test]
async fn mode_switch_resets_transient_input() {
    let (coordinator, chain, _sink) = funded().await;
    chain.set_stakes(vec![StakeRecord {
        option_id: OptionId(1),
        amount: 500,
        start_time_seconds: Utc::now().timestamp(),
    }]);
    coordinator.refresh_stakes().await.unwrap();

    coordinator.set_amount("5000").await.unwrap();
    coordinator.select_option(OptionId(1)).await.unwrap();
    coordinator.request_unstake(OptionId(1), "200").await.unwrap();
    assert!(coordinator.view().await.prompt.is_some());

    coordinator.set_mode(DialogMode::Unstake).await;
    let view = coordinator.view().await;
    assert_eq!(view.mode, DialogMode::Unstake);
    assert_eq!(view.amount_input, "");
    assert_eq!(view.selected_option, None);
    assert_eq!(view.validation, None);
    assert_eq!(view.prompt, None);
    // Mirrored chain data is untouched by a tab switch.
    assert_eq!(view.snapshot.staked_amount(OptionId(1)), 500);
}

#[tokio::test]
async fn confirmed_stake_clears_selection_and_amount() {
    let (coordinator, chain, _sink) = funded().await;
    coordinator.select_option(OptionId(1)).await.unwrap();
    coordinator.set_amount("100").await.unwrap();

    // An approval is a step inside the stake flow, so the form survives it.
    coordinator.request_approval("100").await.unwrap();
    let view = coordinator.view().await;
    assert_eq!(view.amount_input, "100");
    assert_eq!(view.selected_option, Some(OptionId(1)));

    // The confirmed stake consumes both the amount and the selection.
    coordinator.request_stake(OptionId(1), "100").await.unwrap();
    let view = coordinator.view().await;
    assert_eq!(view.amount_input, "");
    assert_eq!(view.selected_option, None);
    assert_eq!(view.validation, None);
    assert_eq!(chain.write_calls().len(), 2);
}

#[tokio::test]
async fn validation_reacts_to_every_input_change() {
    let (coordinator, chain, _sink) = funded().await;
    chain.set_balance(30);
    coordinator.refresh_balance().await.unwrap();

    coordinator.set_amount("50").await.unwrap();
    assert_eq!(
        coordinator.validation_error().await,
        Some(ValidationError::ExceedsBalance)
    );

    coordinator.set_amount("20").await.unwrap();
    assert_eq!(coordinator.validation_error().await, None);

    // A balance refresh re-runs the gates against the stored input.
    chain.set_balance(10);
    coordinator.refresh_balance().await.unwrap();
    assert_eq!(
        coordinator.validation_error().await,
        Some(ValidationError::ExceedsBalance)
    );

    coordinator.set_amount("").await.unwrap();
    assert_eq!(coordinator.validation_error().await, None);
}

#[tokio::test]
async fn invalid_amount_input_keeps_the_previous_entry() {
    let (coordinator, _chain, sink) = funded().await;
    coordinator.set_amount("20").await.unwrap();

    let rejected = coordinator.set_amount("2x0").await;
    assert!(matches!(rejected, Err(StakingError::InvalidAmount(_))));

    // The stored entry and its validation are untouched by the typo.
    let view = coordinator.view().await;
    assert_eq!(view.amount_input, "20");
    assert_eq!(view.validation, None);
    // Reactive input errors return to the caller without a notification.
    assert!(sink.notices().is_empty());
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let (coordinator, chain, _sink) = funded().await;

    coordinator.refresh_all().await.unwrap();
    let first = coordinator.view().await;
    coordinator.refresh_all().await.unwrap();
    let second = coordinator.view().await;

    assert_eq!(first.snapshot, second.snapshot);
    assert!(chain.write_calls().is_empty());
}

#[tokio::test]
async fn read_failures_surface_as_classified_errors() {
    let (coordinator, chain, _sink) = funded().await;
    chain.fail_next_read(json!("rpc timeout"));

    let failed = coordinator.refresh_balance().await;
    assert_eq!(
        failed,
        Err(StakingError::Chain(ClassifiedError::new(
            ErrorCategory::Unknown,
            "rpc timeout"
        )))
    );
}

#[tokio::test]
async fn channel_binding_sees_the_transaction_lifecycle() {
    let (coordinator, chain, _sink) = funded().await;
    chain.set_allowance(1_000);
    coordinator.refresh_allowance().await.unwrap();
    let mut events = coordinator.subscribe().await;

    coordinator.request_stake(OptionId(1), "50").await.unwrap();

    match events.recv().await.unwrap() {
        TrackerEvent::Submitted { kind, .. } => assert_eq!(kind, TxKind::Stake),
        other => panic!("expected a submission event, got {other:?}"),
    }
    match events.recv().await.unwrap() {
        TrackerEvent::Confirmed { kind, .. } => assert_eq!(kind, TxKind::Stake),
        other => panic!("expected a confirmation event, got {other:?}"),
    }
}

#[tokio::test]
async fn reward_quote_follows_the_amount_input() {
    let (coordinator, chain, _sink) = wiring();
    chain.set_balance(10_000);
    chain.set_options(vec![StakingOption {
        id: OptionId(3),
        duration_seconds: SECONDS_PER_YEAR / 2,
        apy_basis_points: 1_000,
        is_active: true,
    }]);
    chain.set_pool_liquidity(1_000_000);
    coordinator.refresh_all().await.unwrap();

    assert_eq!(coordinator.reward_quote(OptionId(3)).await.unwrap(), None);

    coordinator.set_amount("1000").await.unwrap();
    assert_eq!(
        coordinator.reward_quote(OptionId(3)).await.unwrap(),
        Some(50)
    );

    assert_eq!(
        coordinator.reward_quote(OptionId(9)).await,
        Err(StakingError::UnknownOption(OptionId(9)))
    );
}
