//! Position policies: the rules that differ per deposit type
//!
//! ## Design:
//!
//! - **Current** (type 0): always liquid, withdrawn in any number of partial
//!   requests, each payable after a fixed delay
//! - **Regular** (type = tier id): locked for N months, withdrawn once and in
//!   full, payable after the term boundary that follows the request
//!
//! Tiers are data, not types. A [`PolicyTable`] lists the terms for one
//! version of the rules and [`PositionPolicy`] is the closed enum every ledger
//! operation matches on.
//!
//! ## Fixed term end:
//!
//! ```text
//! begin = day 0, term = 1 month (30 days), request at day 45
//!   k   = (45 - 0) / 30 + 1 = 2
//!   end = 0 + 2 * 30 = day 60   (not day 30: that boundary already passed)
//!   payable from day 60 + refund delay
//! ```

use crate::error::{LedgerError, Result};
use crate::record::{DepositBase, DepositMsg, WithdrawInfo, CURRENT_POSITION, CURRENT_TYPE};
use crate::types::{sub, sum, RateBps, Timestamp, DAY_SECS, MONTH_SECS, U256};
use serde::{Deserialize, Serialize};

/// Terms for the current (type 0) position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTerms {
    /// Smallest non-zero deposit
    pub min_deposit: U256,
    /// Smallest single withdrawal request
    pub min_withdraw: U256,
    /// Delay between request and payability
    pub withdraw_delay: Timestamp,
    /// Interest weight multiplier (bps)
    pub rate: RateBps,
}

/// Terms for one fixed-term tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegularTerms {
    /// Tier id stored in `DepositMsg::deposit_type`
    pub deposit_type: u32,
    /// Term length in 30-day months
    pub months: u32,
    pub min_deposit: U256,
    /// Interest weight multiplier (bps)
    pub rate: RateBps,
    /// Extra delay after the term boundary before refund
    pub refund_delay: Timestamp,
}

impl RegularTerms {
    pub fn duration(&self) -> Timestamp {
        self.months as Timestamp * MONTH_SECS
    }

    /// First term boundary strictly after `now`
    pub fn term_end(&self, begin: Timestamp, now: Timestamp) -> Timestamp {
        let duration = self.duration();
        if duration == 0 {
            return now;
        }
        let elapsed = now.saturating_sub(begin);
        let periods = elapsed / duration + 1;
        begin.saturating_add(periods.saturating_mul(duration))
    }
}

/// One version of the deposit rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    pub version: u32,
    pub current: CurrentTerms,
    pub regular: Vec<RegularTerms>,
}

impl PolicyTable {
    /// Genesis rule set: current plus 1/3/6/12 month tiers
    pub fn v1() -> Self {
        let tier = |deposit_type: u32, months: u32, rate: RateBps| RegularTerms {
            deposit_type,
            months,
            min_deposit: U256::from(2_000u64),
            rate,
            refund_delay: DAY_SECS,
        };

        Self {
            version: 1,
            current: CurrentTerms {
                min_deposit: U256::from(100u64),
                min_withdraw: U256::from(100u64),
                withdraw_delay: 7 * DAY_SECS,
                rate: 10_000,
            },
            regular: vec![
                tier(1, 1, 20_000),
                tier(2, 3, 30_000),
                tier(3, 6, 40_000),
                tier(4, 12, 60_000),
            ],
        }
    }

    /// Resolve the policy for a stored or requested deposit type
    pub fn policy(&self, deposit_type: u32) -> Result<PositionPolicy<'_>> {
        if deposit_type == CURRENT_TYPE {
            return Ok(PositionPolicy::Current(&self.current));
        }
        self.regular
            .iter()
            .find(|t| t.deposit_type == deposit_type)
            .map(PositionPolicy::Regular)
            .ok_or(LedgerError::InvalidArguments("unknown deposit type"))
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids: Vec<u32> = self.regular.iter().map(|t| t.deposit_type).collect();
        ids.sort_unstable();
        let len = ids.len();
        ids.dedup();
        if ids.len() != len {
            return Err(LedgerError::Config(format!(
                "policy v{} has duplicate tier ids",
                self.version
            )));
        }
        if ids.first() == Some(&CURRENT_TYPE) {
            return Err(LedgerError::Config(format!(
                "policy v{} reuses the current type id for a tier",
                self.version
            )));
        }
        if self.regular.iter().any(|t| t.months == 0) {
            return Err(LedgerError::Config(format!(
                "policy v{} has a zero-length tier",
                self.version
            )));
        }
        Ok(())
    }
}

/// Rules for one deposit type
#[derive(Debug, Clone, Copy)]
pub enum PositionPolicy<'a> {
    Current(&'a CurrentTerms),
    Regular(&'a RegularTerms),
}

impl<'a> PositionPolicy<'a> {
    pub fn deposit_type(&self) -> u32 {
        match self {
            PositionPolicy::Current(_) => CURRENT_TYPE,
            PositionPolicy::Regular(terms) => terms.deposit_type,
        }
    }

    /// Interest weight multiplier (bps)
    pub fn rate(&self) -> RateBps {
        match self {
            PositionPolicy::Current(terms) => terms.rate,
            PositionPolicy::Regular(terms) => terms.rate,
        }
    }

    fn ensure_type(&self, msg: &DepositMsg) -> Result<()> {
        if msg.deposit_type != self.deposit_type() {
            return Err(LedgerError::PositionMismatch {
                stored: msg.deposit_type,
                expected: self.deposit_type(),
            });
        }
        Ok(())
    }

    /// Amount check before a deposit mutates anything.
    ///
    /// A zero current deposit is only a sign-address rebind and needs an
    /// existing record.
    pub fn check_amount_deposit(&self, record: Option<&DepositBase>, amount: U256) -> Result<()> {
        match self {
            PositionPolicy::Current(terms) => {
                if amount.is_zero() {
                    return match record {
                        Some(_) => Ok(()),
                        None => Err(LedgerError::DepositTooSmall),
                    };
                }
                if amount < terms.min_deposit {
                    return Err(LedgerError::DepositTooSmall);
                }
                Ok(())
            }
            PositionPolicy::Regular(terms) => {
                if amount.is_zero() {
                    return Err(LedgerError::InvalidArguments("zero fixed deposit"));
                }
                if amount < terms.min_deposit {
                    return Err(LedgerError::DepositTooSmall);
                }
                Ok(())
            }
        }
    }

    /// Whether `msg` may take a withdrawal request of `amount`.
    /// Regular positions ignore `amount`: they always leave in full.
    pub fn check_withdraw(&self, msg: &DepositMsg, amount: U256) -> Result<()> {
        self.ensure_type(msg)?;
        match self {
            PositionPolicy::Current(terms) => {
                if amount > msg.amount {
                    return Err(LedgerError::InsufficientCurrentBalance);
                }
                if amount.is_zero() || amount < terms.min_withdraw {
                    return Err(LedgerError::InvalidArguments("withdrawal below minimum"));
                }
                Ok(())
            }
            PositionPolicy::Regular(_) => {
                if msg.end_time != 0 || !msg.withdrawals.is_empty() {
                    return Err(LedgerError::AlreadyWithdrawn);
                }
                Ok(())
            }
        }
    }

    /// Record the withdrawal request on `msg` and return the queued entry.
    ///
    /// Current: the amount leaves the active balance now and is payable after
    /// the delay. Regular: the amount stays on the position until refund; the
    /// queued entry carries zero and only marks maturity.
    pub fn calc_deposit_time(
        &self,
        msg: &mut DepositMsg,
        amount: U256,
        now: Timestamp,
    ) -> Result<WithdrawInfo> {
        self.ensure_type(msg)?;
        let entry = match self {
            PositionPolicy::Current(terms) => {
                msg.amount = sub(msg.amount, amount)?;
                WithdrawInfo {
                    amount,
                    mature_time: now.saturating_add(terms.withdraw_delay),
                }
            }
            PositionPolicy::Regular(terms) => {
                let end = terms.term_end(msg.begin_time, now);
                msg.end_time = end;
                WithdrawInfo {
                    amount: U256::zero(),
                    mature_time: end.saturating_add(terms.refund_delay),
                }
            }
        };
        msg.withdrawals.push(entry.clone());
        Ok(entry)
    }

    /// Release what has matured at `now` and return the payout.
    ///
    /// Current sweeps every matured queue entry and leaves the rest queued.
    /// Regular needs its single entry matured and removes the whole position.
    pub fn check_and_calc_refund(
        &self,
        record: &mut DepositBase,
        position: u64,
        now: Timestamp,
    ) -> Result<U256> {
        let index = record
            .find(position)
            .ok_or(LedgerError::PositionNotFound(position))?;
        self.ensure_type(&record.positions[index])?;

        match self {
            PositionPolicy::Current(_) => {
                if position != CURRENT_POSITION {
                    return Err(LedgerError::PositionNotFound(position));
                }
                let msg = &mut record.positions[index];
                let (matured, pending): (Vec<_>, Vec<_>) = msg
                    .withdrawals
                    .drain(..)
                    .partition(|w| w.mature_time <= now);
                msg.withdrawals = pending;

                let payout = sum(matured.iter().map(|w| w.amount))?;
                if payout.is_zero() {
                    return Err(LedgerError::NotYetMatured);
                }
                Ok(payout)
            }
            PositionPolicy::Regular(_) => {
                let msg = &record.positions[index];
                if !msg.withdrawals.iter().any(|w| w.mature_time <= now) {
                    return Err(LedgerError::NotYetMatured);
                }
                let removed = record.positions.remove(index);
                Ok(removed.amount)
            }
        }
    }
}
