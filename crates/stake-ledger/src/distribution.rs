//! Weighted reward distribution for validator groups
//!
//! ## Design:
//!
//! One kernel splits every amount a group hands out: block rewards weighted
//! by each member's total stake and current-position interest weighted by the
//! member's current amount. Callers only supply the weight and accumulate
//! closures.
//!
//! ```text
//! amount = 900, node_rate = 10%
//!   node cut  = floor(900 * 1000 / 10000)      = 90
//!   remainder = 810
//!   weights   = owner: stake * owner_rate
//!               other: stake * rate of the highest level with threshold <= stake
//!   share_i   = floor(810 * w_i / Σw)
//!   owner    += node cut + (810 - Σ share_i)
//! ```
//!
//! With an owner member the whole amount is always accounted for. Without one
//! the node cut and rounding leftover are reported as `dropped` and stay with
//! the caller. With zero total weight nothing moves.

use crate::error::{LedgerError, Result};
use crate::types::{add, apply_bps, mul, mul_div, sub, sum, Address, RateBps, BPS_DENOMINATOR, U256};
use serde::{Deserialize, Serialize};

/// Split `amount` proportionally to `weights`, flooring every share.
///
/// Returns the shares and the rounding leftover, or `None` when every weight
/// is zero.
pub fn pro_rata(amount: U256, weights: &[U256]) -> Result<Option<(Vec<U256>, U256)>> {
    let total = sum(weights.iter().copied())?;
    if total.is_zero() {
        return Ok(None);
    }
    let shares = weights
        .iter()
        .map(|w| mul_div(amount, *w, total))
        .collect::<Result<Vec<_>>>()?;
    let leftover = sub(amount, sum(shares.iter().copied())?)?;
    Ok(Some((shares, leftover)))
}

/// Member weighting rate above a stake threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRate {
    pub threshold: U256,
    pub rate: RateBps,
}

/// Split configuration of one validator group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRate {
    /// Weighting rate of the owner's own stake
    pub owner_rate: RateBps,

    /// Flat cut taken for the owner before weighting (≤ 10_000)
    pub node_rate: RateBps,

    /// Ascending by threshold
    pub level_rates: Vec<LevelRate>,
}

impl RewardRate {
    /// Pair `rates` with the configured level thresholds
    pub fn new(owner_rate: RateBps, node_rate: RateBps, rates: &[RateBps], thresholds: &[U256]) -> Result<Self> {
        if node_rate > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidArguments("node rate above 1"));
        }
        if rates.len() != thresholds.len() {
            return Err(LedgerError::InvalidArguments("one level rate per threshold"));
        }
        let level_rates = thresholds
            .iter()
            .zip(rates)
            .map(|(threshold, rate)| LevelRate {
                threshold: *threshold,
                rate: *rate,
            })
            .collect();
        Ok(Self {
            owner_rate,
            node_rate,
            level_rates,
        })
    }

    /// Rate a non-owner member with `stake` is weighted at
    pub fn level_rate(&self, stake: U256) -> RateBps {
        self.level_rates
            .iter()
            .rev()
            .find(|level| level.threshold <= stake)
            .map(|level| level.rate)
            .unwrap_or(0)
    }

    /// Distribution weight of `stake`
    pub fn deposit_weight(&self, is_owner: bool, stake: U256) -> Result<U256> {
        let rate = if is_owner {
            self.owner_rate
        } else {
            self.level_rate(stake)
        };
        mul(stake, U256::from(rate))
    }
}

/// Anything the kernel can pay
pub trait PoolMember {
    fn member_address(&self) -> &Address;
}

/// Outcome of one [`distribute_amount`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distribution {
    pub node_amount: U256,

    /// Rounding remainder of the weighted split
    pub leftover: U256,

    /// Total handed to the accumulate closure
    pub distributed: U256,

    /// Credited to nobody
    pub dropped: U256,
}

/// Split `amount` across `members`.
///
/// `weight_fn` gives the stake a member is weighted by; `accumulate_fn`
/// credits a share. `distributed + dropped == amount` always holds.
pub fn distribute_amount<T, W, A>(
    rate: &RewardRate,
    owner: &Address,
    members: &mut [T],
    amount: U256,
    weight_fn: W,
    mut accumulate_fn: A,
) -> Result<Distribution>
where
    T: PoolMember,
    W: Fn(&T) -> U256,
    A: FnMut(&mut T, U256) -> Result<()>,
{
    let node_amount = apply_bps(amount, rate.node_rate)?;
    let remainder = sub(amount, node_amount)?;

    let weights = members
        .iter()
        .map(|m| rate.deposit_weight(m.member_address() == owner, weight_fn(m)))
        .collect::<Result<Vec<_>>>()?;

    let Some((shares, leftover)) = pro_rata(remainder, &weights)? else {
        tracing::debug!("distribute {}: zero total weight, nothing paid", amount);
        return Ok(Distribution {
            node_amount,
            dropped: amount,
            ..Default::default()
        });
    };

    let mut distributed = U256::zero();
    for (member, share) in members.iter_mut().zip(shares) {
        if share.is_zero() {
            continue;
        }
        accumulate_fn(member, share)?;
        distributed = add(distributed, share)?;
    }

    let owner_amount = add(node_amount, leftover)?;
    let mut dropped = U256::zero();
    match members.iter_mut().find(|m| m.member_address() == owner) {
        Some(member) => {
            if !owner_amount.is_zero() {
                accumulate_fn(member, owner_amount)?;
                distributed = add(distributed, owner_amount)?;
            }
        }
        None => {
            tracing::warn!(
                "owner {} not a member, node cut {} and leftover {} dropped",
                owner,
                node_amount,
                leftover
            );
            dropped = owner_amount;
        }
    }

    tracing::debug!(
        "distribute {}: node {} leftover {} to {} members",
        amount,
        node_amount,
        leftover,
        members.len()
    );
    Ok(Distribution {
        node_amount,
        leftover,
        distributed,
        dropped,
    })
}
