//! Reward accounting checks.
//!
//! A Bitcoin-like generation transaction must distribute exactly the template
//! reward. An Equihash generation may leave part of it unclaimed, but never
//! claims more. No output may go negative. Violations are reported, never
//! clamped.

use bitcoin::{Amount, TxOut};

use crate::error::PoolError;

/// Subtract a mandatory payout from the running reward.
///
/// # Errors
///
/// Returns [`PoolError::RewardAccounting`] if the payout exceeds what is left.
pub fn deduct(remaining: u64, amount: u64, payee: &str) -> Result<u64, PoolError> {
    remaining.checked_sub(amount).ok_or_else(|| {
        PoolError::RewardAccounting(format!(
            "{} payout of {} exceeds the remaining reward of {}",
            payee, amount, remaining
        ))
    })
}

/// How the output total must relate to the reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Exact,
    AtMost,
}

/// Validate that `outputs` distribute exactly `reward`.
///
/// Returns a list of all problems found, mirroring how structural checks are
/// reported elsewhere.
pub fn validate_outputs(outputs: &[TxOut], reward: u64) -> Result<(), Vec<PoolError>> {
    check(outputs, reward, Bound::Exact)
}

/// Validate that `outputs` claim no more than `reward`.
pub fn validate_outputs_within(outputs: &[TxOut], reward: u64) -> Result<(), Vec<PoolError>> {
    check(outputs, reward, Bound::AtMost)
}

/// Like [`validate_outputs`], collapsing multiple problems into one error.
pub fn ensure_outputs(outputs: &[TxOut], reward: u64) -> Result<(), PoolError> {
    validate_outputs(outputs, reward).map_err(collapse)
}

/// Like [`validate_outputs_within`], collapsing multiple problems into one error.
pub fn ensure_outputs_within(outputs: &[TxOut], reward: u64) -> Result<(), PoolError> {
    validate_outputs_within(outputs, reward).map_err(collapse)
}

fn check(outputs: &[TxOut], reward: u64, bound: Bound) -> Result<(), Vec<PoolError>> {
    let mut errors = Vec::new();

    if outputs.is_empty() {
        errors.push(PoolError::RewardAccounting(
            "generation transaction has no outputs".into(),
        ));
    }

    let total = outputs
        .iter()
        .map(|o| o.value)
        .try_fold(Amount::ZERO, |acc, v| acc.checked_add(v));
    let reward = Amount::from_sat(reward);

    match total {
        None => errors.push(PoolError::RewardAccounting("output total overflows".into())),
        Some(total) if total > reward || (bound == Bound::Exact && total != reward) => {
            errors.push(PoolError::RewardAccounting(format!(
                "outputs total {} sat but the reward is {} sat",
                total.to_sat(),
                reward.to_sat()
            )))
        }
        Some(_) => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn collapse(mut errors: Vec<PoolError>) -> PoolError {
    if errors.len() == 1 {
        errors.remove(0)
    } else {
        PoolError::RewardAccounting(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
