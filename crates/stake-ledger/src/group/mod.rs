//! Validator groups: many depositors behind one signing identity
//!
//! ## Design:
//!
//! A group is a contract address `G`. Its pooled stake is an ordinary
//! [`DepositBase`](crate::record::DepositBase) with `A0 = G` in the deposit
//! ledger; the group contract itself only keeps who owns which share.
//!
//! ```text
//!  member ──value──► G ──value──► deposit contract
//!                    │                 │
//!          Owner / Reward / ValiMap    └── DepositBase(A0 = G)
//!          (per-member shares)             current + fixed positions
//! ```
//!
//! - **Current**: members share the pool's single current position; each
//!   member tracks its own amount and withdrawal queue
//! - **Fixed**: every fixed deposit is its own pool position, held by exactly
//!   one member and referenced by nonce
//! - **Rewards**: split by [`distribute_amount`](crate::distribution::distribute_amount),
//!   credited to `reward` and paid on `get_reward`
//!
//! Cached positions are reconciled against the pool record on every load and
//! before every save, and members holding nothing are pruned.

mod ledger;
mod types;

pub use ledger::ValidatorGroupLedger;
pub use types::{CurrentData, DepositPos, GroupState, OwnerInfo, ValidatorInfo};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::context::CallContext;
    use crate::error::LedgerError;
    use crate::record::Role;
    use crate::state::{MemoryState, StateStore};
    use crate::types::{Address, Timestamp, DAY_SECS, U256};

    const GROUP: u64 = 0x2000;
    const SIGN: u64 = 0x50;

    fn addr(v: u64) -> Address {
        Address::from_low_u64(v)
    }

    fn call(state: &mut MemoryState, caller: u64, value: u64, now: Timestamp) -> CallContext {
        let value = U256::from(value);
        state.add_balance(&addr(GROUP), value).unwrap();
        CallContext::new(addr(GROUP), addr(caller), value, now, 1)
    }

    fn create(ledger: &ValidatorGroupLedger, state: &mut MemoryState, value: u64, deposit_type: u32) {
        let ctx = call(state, 1, value, 0);
        ledger
            .create(state, &ctx, addr(SIGN), deposit_type, 0, 0, &[0, 0, 0])
            .unwrap();
    }

    #[test]
    fn test_create_validates_rates() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();

        let ctx = call(&mut state, 1, 100_000, 0);
        assert!(matches!(
            ledger.create(&mut state, &ctx, addr(SIGN), 0, 0, 10_001, &[0, 0, 0]),
            Err(LedgerError::InvalidArguments(_))
        ));
        assert!(matches!(
            ledger.create(&mut state, &ctx, addr(SIGN), 0, 0, 0, &[0, 0]),
            Err(LedgerError::InvalidArguments(_))
        ));

        ledger
            .create(&mut state, &ctx, addr(SIGN), 1, 0, 0, &[0, 0, 0])
            .unwrap();
        assert!(matches!(
            ledger.create(&mut state, &ctx, addr(SIGN), 1, 0, 0, &[0, 0, 0]),
            Err(LedgerError::InvalidArguments(_))
        ));

        let pool = ledger.deposits().get_deposit(&state, &addr(GROUP)).unwrap().unwrap();
        assert_eq!(pool.role, Role::Validator);
        assert_eq!(pool.address_a1, addr(SIGN));
        assert_eq!(state.balance(&config.deposit_contract), U256::from(100_000));

        let group = ledger.group_snapshot(&state, &addr(GROUP)).unwrap();
        let owner = group.members.find(&addr(1)).unwrap();
        assert_eq!(owner.positions[0].position, 1);
        assert_eq!(owner.all_amount, U256::from(100_000));
    }

    #[test]
    fn test_create_needs_validator_stake() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();
        let ctx = call(&mut state, 1, 50_000, 0);
        assert_eq!(
            ledger.create(&mut state, &ctx, addr(SIGN), 0, 0, 0, &[0, 0, 0]),
            Err(LedgerError::InsufficientStake)
        );
    }

    #[test]
    fn test_owner_cannot_drain_pool_below_threshold() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();
        create(&ledger, &mut state, 100_000, 0);

        let ctx = call(&mut state, 1, 0, 10);
        assert_eq!(
            ledger.withdraw(&mut state, &ctx, U256::from(1_000), 0),
            Err(LedgerError::OwnerInsufficient)
        );

        let ctx = call(&mut state, 2, 0, 10);
        assert_eq!(
            ledger.withdraw(&mut state, &ctx, U256::from(1_000), 0),
            Err(LedgerError::NotFound("group member"))
        );
    }

    #[test]
    fn test_owner_only_calls() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();
        create(&ledger, &mut state, 100_000, 0);

        let ctx = call(&mut state, 2, 0, 10);
        assert_eq!(ledger.set_sign_account(&mut state, &ctx, addr(0x51)), Err(LedgerError::NotOwner));
        assert_eq!(ledger.transfer_ownership(&mut state, &ctx, addr(2)), Err(LedgerError::NotOwner));

        let ctx = call(&mut state, 1, 0, 10);
        ledger.set_sign_account(&mut state, &ctx, addr(0x51)).unwrap();
        assert_eq!(
            ledger.deposits().get_a0_for_sign(&state, &addr(0x51)).unwrap(),
            Some(addr(GROUP))
        );
        ledger.transfer_ownership(&mut state, &ctx, addr(2)).unwrap();
        assert!(ledger.group_snapshot(&state, &addr(GROUP)).unwrap().is_owner(&addr(2)));
    }

    #[test]
    fn test_current_refund_credits_other_members() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();
        create(&ledger, &mut state, 150_000, 0);

        let ctx = call(&mut state, 2, 50_000, 0);
        assert_eq!(ledger.add_deposit(&mut state, &ctx, 0).unwrap(), 0);
        let ctx = call(&mut state, 2, 0, 0);
        ledger.withdraw(&mut state, &ctx, U256::from(20_000), 0).unwrap();
        let ctx = call(&mut state, 1, 0, 0);
        ledger.withdraw(&mut state, &ctx, U256::from(30_000), 0).unwrap();

        let ctx = call(&mut state, 1, 0, DAY_SECS);
        assert_eq!(ledger.refund(&mut state, &ctx, 0), Err(LedgerError::NotYetMatured));

        let ctx = call(&mut state, 1, 0, 7 * DAY_SECS);
        assert_eq!(ledger.refund(&mut state, &ctx, 0).unwrap(), U256::from(30_000));
        assert_eq!(state.balance(&addr(1)), U256::from(30_000));

        let group = ledger.group_snapshot(&state, &addr(GROUP)).unwrap();
        let member = group.members.find(&addr(2)).unwrap();
        assert_eq!(member.reward, U256::from(20_000));
        assert!(member.current.withdrawals.is_empty());

        let ctx = call(&mut state, 2, 0, 7 * DAY_SECS);
        assert_eq!(ledger.get_reward(&mut state, &ctx).unwrap(), U256::from(20_000));
        assert_eq!(state.balance(&addr(2)), U256::from(20_000));
    }

    #[test]
    fn test_withdraw_all_is_one_shot() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();
        create(&ledger, &mut state, 100_000, 1);
        let ctx = call(&mut state, 2, 5_000, 0);
        ledger.add_deposit(&mut state, &ctx, 0).unwrap();

        let ctx = call(&mut state, 1, 0, 10);
        ledger.withdraw_all(&mut state, &ctx).unwrap();
        assert_eq!(ledger.withdraw_all(&mut state, &ctx), Err(LedgerError::GroupExpired));

        let ctx = call(&mut state, 2, 5_000, 10);
        assert_eq!(ledger.add_deposit(&mut state, &ctx, 0), Err(LedgerError::GroupExpired));

        let pool = ledger.deposits().get_deposit(&state, &addr(GROUP)).unwrap().unwrap();
        assert_eq!(pool.role, Role::None);
        assert!(pool.active_stake().unwrap().is_zero());
        let group = ledger.group_snapshot(&state, &addr(GROUP)).unwrap();
        assert_eq!(group.members.find(&addr(1)).unwrap().positions[0].end_time, 30 * DAY_SECS);
    }

    #[test]
    fn test_empty_group_swept_and_destroyed() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();
        create(&ledger, &mut state, 100_000, 0);

        // zero weights everywhere: the reward stays in the group balance
        let ctx = call(&mut state, 9, 900, 0);
        let result = ledger.distribute_reward(&mut state, &ctx).unwrap();
        assert_eq!(result.dropped, U256::from(900));

        let ctx = call(&mut state, 1, 0, 0);
        ledger.withdraw_all(&mut state, &ctx).unwrap();
        let ctx = call(&mut state, 1, 0, 7 * DAY_SECS);
        assert_eq!(ledger.refund(&mut state, &ctx, 0).unwrap(), U256::from(100_000));
        assert!(ledger.deposits().get_deposit(&state, &addr(GROUP)).unwrap().is_none());

        assert_eq!(ledger.get_reward(&mut state, &ctx).unwrap(), U256::from(900));
        assert_eq!(state.balance(&addr(1)), U256::from(100_900));
        assert!(!ledger.is_group(&state, &addr(GROUP)).unwrap());
        assert_eq!(state.storage_len(&addr(GROUP)), 0);
    }

    #[test]
    fn test_withdraw_all_dust_counts_interest() {
        let config = LedgerConfig::default();
        let ledger = ValidatorGroupLedger::new(&config);
        let mut state = MemoryState::new();
        let ctx = call(&mut state, 1, 100_000, 0);
        ledger
            .create(&mut state, &ctx, addr(SIGN), 0, 10_000, 0, &[10_000, 10_000, 10_000])
            .unwrap();

        // leave member 2 with 50 in current, below the minimum withdrawal
        let ctx = call(&mut state, 2, 150, 0);
        ledger.add_deposit(&mut state, &ctx, 0).unwrap();
        let ctx = call(&mut state, 2, 0, 0);
        ledger.withdraw(&mut state, &ctx, U256::from(100), 0).unwrap();

        // weights 100_000 : 50, member 2 is credited 100
        let credited = ledger
            .distribute_interest(&mut state, &addr(GROUP), &[(0, U256::from(200_100))])
            .unwrap();
        assert_eq!(credited, U256::from(200_100));

        let ctx = call(&mut state, 3, 150, 0);
        ledger.add_deposit(&mut state, &ctx, 0).unwrap();
        let ctx = call(&mut state, 3, 0, 0);
        ledger.withdraw(&mut state, &ctx, U256::from(100), 0).unwrap();

        let ctx = call(&mut state, 1, 0, 10);
        ledger.withdraw_all(&mut state, &ctx).unwrap();

        let group = ledger.group_snapshot(&state, &addr(GROUP)).unwrap();
        let with_interest = group.members.find(&addr(2)).unwrap();
        assert!(with_interest.current.amount.is_zero());
        assert_eq!(with_interest.current.interest, U256::from(100));
        assert_eq!(with_interest.current.withdrawals.last().unwrap().amount, U256::from(50));

        // 50 with no interest is dust and stays pooled
        let dust = group.members.find(&addr(3)).unwrap();
        assert_eq!(dust.current.amount, U256::from(50));
        let pool = ledger.deposits().get_deposit(&state, &addr(GROUP)).unwrap().unwrap();
        assert_eq!(pool.current().unwrap().amount, U256::from(50));
        assert_eq!(pool.role, Role::None);
    }
}
