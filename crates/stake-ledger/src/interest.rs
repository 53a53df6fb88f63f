//! Periodic interest payout
//!
//! ## How it works:
//!
//! ```text
//! every interval_blocks:
//!   1. accrue:  weight = amount * rate(type) for every live position
//!               interest += floor(amount_per_interval * weight / Σweight)
//!   2. settle:  per account, payable = interest - slash per position
//!               reward pool ──payable──► account
//!               groups: payouts split onto members
//! ```
//!
//! A run is atomic. It executes inside a store snapshot and an unfunded
//! payout reverts everything it wrote. Anything wrong with a single account
//! only skips that account.

use crate::config::LedgerConfig;
use crate::deposit::DepositLedger;
use crate::distribution::pro_rata;
use crate::error::{LedgerError, Result};
use crate::group::ValidatorGroupLedger;
use crate::record::DepositBase;
use crate::state::{load, store, tags, StateStore};
use crate::types::{add, mul, sub, Address, BlockNumber, Timestamp, U256};

/// Interest credited to one position by [`InterestEngine::accrue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionAccrual {
    pub account: Address,
    pub position: u64,
    pub amount: U256,
}

/// Summary of one settled run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestReport {
    pub height: BlockNumber,
    /// Interest credited to positions this run
    pub accrued: U256,
    /// Paid out of the reward pool
    pub paid: U256,
    pub accounts_paid: usize,
    /// Accounts left unpaid this run
    pub skipped: Vec<Address>,
}

#[derive(Debug, Clone, Copy)]
pub struct InterestEngine<'c> {
    config: &'c LedgerConfig,
    groups: ValidatorGroupLedger<'c>,
}

impl<'c> InterestEngine<'c> {
    pub fn new(config: &'c LedgerConfig) -> Self {
        Self {
            config,
            groups: ValidatorGroupLedger::new(config),
        }
    }

    fn deposits(&self) -> &DepositLedger<'c> {
        self.groups.deposits()
    }

    /// Height of the last completed run
    pub fn last_height<S: StateStore>(&self, state: &S) -> Result<Option<BlockNumber>> {
        let contract = self.config.deposit_contract;
        load(state, &contract, &contract, tags::INTEREST_HEIGHT)
    }

    pub fn is_due<S: StateStore>(&self, state: &S, height: BlockNumber) -> Result<bool> {
        Ok(match self.last_height(state)? {
            None => true,
            Some(last) => height >= last.saturating_add(self.config.interest.interval_blocks),
        })
    }

    /// Accrue and settle one interval if it is due. `Ok(None)` when not due.
    pub fn run<S: StateStore>(
        &self,
        state: &mut S,
        height: BlockNumber,
        now: Timestamp,
    ) -> Result<Option<InterestReport>> {
        if !self.is_due(state, height)? {
            tracing::debug!("interest not due at height {}", height);
            return Ok(None);
        }

        tracing::info!("interest run at height {}", height);
        let snapshot = state.snapshot();
        match self.process(state, height, now) {
            Ok(report) => {
                state.discard_snapshot(snapshot);
                tracing::info!(
                    "interest run at height {} done: accrued {} paid {} to {} accounts, {} skipped",
                    height,
                    report.accrued,
                    report.paid,
                    report.accounts_paid,
                    report.skipped.len()
                );
                Ok(Some(report))
            }
            Err(e) => {
                state.revert_to_snapshot(snapshot);
                tracing::error!("interest run at height {} reverted: {}", height, e);
                Err(e)
            }
        }
    }

    fn process<S: StateStore>(&self, state: &mut S, height: BlockNumber, now: Timestamp) -> Result<InterestReport> {
        let accruals = self.accrue(state, now)?;
        let mut report = self.settle(state, &accruals)?;
        report.height = height;

        let contract = self.config.deposit_contract;
        store(state, &contract, &contract, tags::INTEREST_HEIGHT, &height)?;
        Ok(report)
    }

    /// Split the interval amount over every position live at `now`, weighted
    /// by amount times the type's rate. The rounding leftover is not credited.
    pub fn accrue<S: StateStore>(&self, state: &mut S, now: Timestamp) -> Result<Vec<PositionAccrual>> {
        let mut records: Vec<DepositBase> = Vec::new();
        let mut slots: Vec<(usize, u64)> = Vec::new();
        let mut weights: Vec<U256> = Vec::new();

        for account in self.deposits().get_deposit_list(state)? {
            let record = match self.deposits().get_deposit(state, &account) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("interest accrual skip {}: {}", account, e);
                    continue;
                }
            };
            for msg in &record.positions {
                if msg.amount.is_zero() || !msg.is_live_at(now) {
                    continue;
                }
                let rate = match self.config.policy(msg.deposit_type) {
                    Ok(policy) => policy.rate(),
                    Err(e) => {
                        tracing::warn!("account {} position {}: {}", account, msg.position, e);
                        continue;
                    }
                };
                weights.push(mul(msg.amount, U256::from(rate))?);
                slots.push((records.len(), msg.position));
            }
            records.push(record);
        }

        let amount = self.config.interest.amount_per_interval;
        let Some((shares, leftover)) = pro_rata(amount, &weights)? else {
            tracing::debug!("no weighted positions, nothing accrued");
            return Ok(Vec::new());
        };

        let mut accruals = Vec::new();
        for ((index, position), share) in slots.into_iter().zip(shares) {
            if share.is_zero() {
                continue;
            }
            let record = &mut records[index];
            if let Some(i) = record.find(position) {
                record.positions[i].interest = add(record.positions[i].interest, share)?;
            }
            accruals.push(PositionAccrual {
                account: record.address_a0,
                position,
                amount: share,
            });
        }
        for record in &records {
            self.deposits().save_record(state, record)?;
        }

        tracing::debug!("accrued {} over {} positions, {} unassigned", amount, accruals.len(), leftover);
        Ok(accruals)
    }

    /// Pay every account named in `accruals` its netted interest from the
    /// reward pool. Only an unfunded payout fails; any other error skips
    /// the account.
    pub fn settle<S: StateStore>(&self, state: &mut S, accruals: &[PositionAccrual]) -> Result<InterestReport> {
        let mut report = InterestReport {
            accrued: accruals.iter().try_fold(U256::zero(), |acc, a| add(acc, a.amount))?,
            ..Default::default()
        };

        let mut accounts: Vec<Address> = accruals.iter().map(|a| a.account).collect();
        accounts.sort();
        accounts.dedup();

        for account in accounts {
            match self.settle_account(state, &account, accruals) {
                Ok(Some(paid)) => {
                    report.paid = add(report.paid, paid)?;
                    report.accounts_paid += 1;
                }
                Ok(None) => report.skipped.push(account),
                Err(LedgerError::InsufficientBalance) => return Err(LedgerError::InsufficientBalance),
                Err(e) => {
                    tracing::warn!("interest skip {}: {}", account, e);
                    report.skipped.push(account);
                }
            }
        }
        Ok(report)
    }

    /// `Ok(None)` when the account is skipped
    fn settle_account<S: StateStore>(
        &self,
        state: &mut S,
        account: &Address,
        accruals: &[PositionAccrual],
    ) -> Result<Option<U256>> {
        let Some(mut record) = self.deposits().get_deposit(state, account)? else {
            tracing::warn!("interest skip {}: record gone", account);
            return Ok(None);
        };
        if let Some(missing) = accruals
            .iter()
            .filter(|a| a.account == *account)
            .find(|a| record.find(a.position).is_none())
        {
            tracing::warn!("interest skip {}: position {} gone", account, missing.position);
            return Ok(None);
        }

        let mut payouts: Vec<(u64, U256)> = Vec::new();
        for msg in &record.positions {
            if msg.interest.is_zero() && msg.slash.is_zero() {
                continue;
            }
            if msg.slash > msg.interest {
                tracing::warn!(
                    "interest skip {}: position {} slash {} exceeds interest {}",
                    account,
                    msg.position,
                    msg.slash,
                    msg.interest
                );
                return Ok(None);
            }
            payouts.push((msg.position, sub(msg.interest, msg.slash)?));
        }

        let total = payouts.iter().try_fold(U256::zero(), |acc, (_, p)| add(acc, *p))?;
        for msg in &mut record.positions {
            msg.interest = U256::zero();
            msg.slash = U256::zero();
        }
        record.prune();
        self.deposits().save_record(state, &record)?;

        let pool = self.config.interest.reward_pool;
        state.transfer(&pool, account, total).map_err(|e| {
            tracing::error!("reward pool {} cannot fund {} for {}: {}", pool, total, account, e);
            e
        })?;

        match self.groups.is_group(state, account) {
            Ok(true) => {
                if let Err(e) = self.groups.distribute_interest(state, account, &payouts) {
                    tracing::warn!("group {} interest not split: {}", account, e);
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("group check {} failed, interest not split: {}", account, e),
        }

        tracing::debug!("interest paid {} to {}", total, account);
        Ok(Some(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::record::Role;
    use crate::state::{storage_key, MemoryState};
    use crate::types::DAY_SECS;

    fn addr(v: u64) -> Address {
        Address::from_low_u64(v)
    }

    /// A: 1_000 current (weight 1x), B: 2_000 one-month fixed (weight 2x)
    fn setup(config: &LedgerConfig, pool_balance: u64) -> MemoryState {
        let mut state = MemoryState::new().with_balance(config.interest.reward_pool, U256::from(pool_balance));
        let ledger = DepositLedger::new(config);
        for (caller, value, deposit_type) in [(1u64, 1_000u64, 0u32), (2, 2_000, 1)] {
            let value = U256::from(value);
            state.add_balance(&config.deposit_contract, value).unwrap();
            let ctx = CallContext::new(config.deposit_contract, addr(caller), value, 0, 1);
            ledger
                .deposit(&mut state, &ctx, addr(caller + 10), deposit_type, Role::None)
                .unwrap();
        }
        state
    }

    #[test]
    fn test_run_pays_by_weight_once_per_interval() {
        let config = LedgerConfig::default();
        let engine = InterestEngine::new(&config);
        let mut state = setup(&config, 100_000);

        let report = engine.run(&mut state, 100, DAY_SECS).unwrap().unwrap();
        assert_eq!(report.paid, U256::from(10_000));
        assert_eq!(report.accounts_paid, 2);
        // 1_000 * 1x : 2_000 * 2x = 1 : 4
        assert_eq!(state.balance(&addr(1)), U256::from(2_000));
        assert_eq!(state.balance(&addr(2)), U256::from(8_000));
        assert_eq!(engine.deposits().get_interest(&state, &addr(1)).unwrap(), U256::zero());

        assert_eq!(state.snapshot_depth(), 0);
        assert!(engine.run(&mut state, 101, DAY_SECS).unwrap().is_none());
        let next = 100 + config.interest.interval_blocks;
        assert!(engine.is_due(&state, next).unwrap());
    }

    #[test]
    fn test_unfunded_pool_reverts_whole_run() {
        let config = LedgerConfig::default();
        let engine = InterestEngine::new(&config);
        let mut state = setup(&config, 5_000);

        assert_eq!(engine.run(&mut state, 100, DAY_SECS), Err(LedgerError::InsufficientBalance));
        assert_eq!(state.balance(&addr(1)), U256::zero());
        assert_eq!(state.balance(&config.interest.reward_pool), U256::from(5_000));
        assert_eq!(engine.deposits().get_interest(&state, &addr(1)).unwrap(), U256::zero());
        assert_eq!(engine.last_height(&state).unwrap(), None);
    }

    #[test]
    fn test_slash_netted_or_account_skipped() {
        let config = LedgerConfig::default();
        let engine = InterestEngine::new(&config);
        let mut state = setup(&config, 100_000);
        engine.deposits().add_slash(&mut state, &addr(1), U256::from(500)).unwrap();
        engine.deposits().add_slash(&mut state, &addr(2), U256::from(9_000)).unwrap();

        let report = engine.run(&mut state, 100, DAY_SECS).unwrap().unwrap();
        assert_eq!(state.balance(&addr(1)), U256::from(1_500));
        assert_eq!(state.balance(&addr(2)), U256::zero());
        assert_eq!(report.skipped, vec![addr(2)]);
        assert_eq!(engine.deposits().get_interest(&state, &addr(2)).unwrap(), U256::from(8_000));
    }

    #[test]
    fn test_stale_accrual_skips_account() {
        let config = LedgerConfig::default();
        let engine = InterestEngine::new(&config);
        let mut state = setup(&config, 100_000);

        let mut accruals = engine.accrue(&mut state, DAY_SECS).unwrap();
        accruals.push(PositionAccrual {
            account: addr(1),
            position: 9,
            amount: U256::one(),
        });
        let report = engine.settle(&mut state, &accruals).unwrap();
        assert_eq!(report.skipped, vec![addr(1)]);
        assert_eq!(state.balance(&addr(2)), U256::from(8_000));
    }

    #[test]
    fn test_ended_terms_do_not_accrue() {
        let config = LedgerConfig::default();
        let engine = InterestEngine::new(&config);
        let mut state = setup(&config, 100_000);
        let ctx = CallContext::new(config.deposit_contract, addr(2), U256::zero(), DAY_SECS, 1);
        engine.deposits().withdraw(&mut state, &ctx, 1, U256::zero()).unwrap();

        // term ends at day 30; past it only the current position earns
        let accruals = engine.accrue(&mut state, 31 * DAY_SECS).unwrap();
        assert_eq!(accruals.len(), 1);
        assert_eq!(accruals[0].account, addr(1));
        assert_eq!(accruals[0].amount, U256::from(10_000));
    }

    fn corrupt_record(state: &mut MemoryState, config: &LedgerConfig, account: u64) {
        let key = storage_key(&addr(account), tags::DEPOSIT);
        state.set_state_bytes(&config.deposit_contract, &key, vec![0xff]);
    }

    #[test]
    fn test_unreadable_record_skipped_at_accrual() {
        let config = LedgerConfig::default();
        let engine = InterestEngine::new(&config);
        let ledger = DepositLedger::new(&config);
        let mut state = MemoryState::new().with_balance(config.interest.reward_pool, U256::from(100_000));
        for caller in [1u64, 2] {
            let value = U256::from(5_000);
            state.add_balance(&config.deposit_contract, value).unwrap();
            let ctx = CallContext::new(config.deposit_contract, addr(caller), value, 0, 1);
            ledger
                .deposit(&mut state, &ctx, addr(caller + 10), 0, Role::None)
                .unwrap();
        }
        corrupt_record(&mut state, &config, 1);

        let report = engine.run(&mut state, 100, DAY_SECS).unwrap().unwrap();
        assert_eq!(report.accounts_paid, 1);
        assert_eq!(state.balance(&addr(2)), U256::from(10_000));
        assert_eq!(engine.last_height(&state).unwrap(), Some(100));
    }

    #[test]
    fn test_unreadable_record_skipped_at_settlement() {
        let config = LedgerConfig::default();
        let engine = InterestEngine::new(&config);
        let mut state = setup(&config, 100_000);

        let accruals = engine.accrue(&mut state, DAY_SECS).unwrap();
        corrupt_record(&mut state, &config, 1);

        let report = engine.settle(&mut state, &accruals).unwrap();
        assert_eq!(report.skipped, vec![addr(1)]);
        assert_eq!(report.accounts_paid, 1);
        assert_eq!(state.balance(&addr(2)), U256::from(8_000));
    }
}
