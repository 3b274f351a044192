//! Pre-submission validation gates.
//!
//! Every function here is a pure function of its arguments. The coordinator
//! re-invokes them whenever an amount or selection changes and refuses to
//! submit while any of them fails. An absent amount is valid-pending: no
//! submission will be attempted, so nothing is flagged.

use crate::core::error::ValidationError;
use crate::core::types::{StakingOption, BPS_DENOMINATOR, SECONDS_PER_YEAR};

/// Gate for stake and approval amounts against the user's token balance.
pub fn validate_stake_amount(
    amount: Option<u128>,
    available_balance: u128,
) -> Result<(), ValidationError> {
    match amount {
        Some(amount) if amount > available_balance => Err(ValidationError::ExceedsBalance),
        _ => Ok(()),
    }
}

/// Gate for unstake amounts against the quantity staked in the option.
pub fn validate_unstake_amount(
    amount: Option<u128>,
    staked_for_option: u128,
) -> Result<(), ValidationError> {
    match amount {
        Some(amount) if amount > staked_for_option => Err(ValidationError::ExceedsStakedAmount),
        _ => Ok(()),
    }
}

/// Reward the contract would quote for staking `amount` over the option's
/// full duration: `amount * apy_bps / 10_000 * duration / SECONDS_PER_YEAR`
/// in integer arithmetic, with the division applied last.
///
/// Returns `None` when the intermediate product overflows; callers treat that
/// as unaffordable rather than quoting a wrong number.
pub fn potential_reward(option: &StakingOption, amount: u128) -> Option<u128> {
    amount
        .checked_mul(option.apy_basis_points as u128)?
        .checked_mul(option.duration_seconds as u128)?
        .checked_div(BPS_DENOMINATOR * SECONDS_PER_YEAR as u128)
}

/// Gate protecting against pools that cannot pay the promised reward.
pub fn validate_reward_affordability(
    option: &StakingOption,
    amount: u128,
    pool_liquidity: u128,
) -> Result<(), ValidationError> {
    match potential_reward(option, amount) {
        Some(reward) if reward <= pool_liquidity => Ok(()),
        _ => Err(ValidationError::ExceedsPoolLiquidityForReward),
    }
}
