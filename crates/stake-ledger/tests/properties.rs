//! Property tests: value conservation and no-leak distribution

mod common;

use common::*;
use proptest::prelude::*;
use stake_ledger::types::DAY_SECS;
use stake_ledger::{
    distribute_amount, Address, DepositCall, DepositLedger, Executor, LedgerConfig, PoolMember, RewardRate, StateStore,
    U256,
};

#[derive(Debug, Clone)]
enum Op {
    Deposit { deposit_type: u32, amount: u64 },
    Withdraw { position: u64, amount: u64 },
    Refund { position: u64 },
    Advance { days: u64 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..=4, 0u64..50_000).prop_map(|(deposit_type, amount)| Op::Deposit { deposit_type, amount }),
        (0u64..4, 0u64..20_000).prop_map(|(position, amount)| Op::Withdraw { position, amount }),
        (0u64..4).prop_map(|position| Op::Refund { position }),
        (1u64..120).prop_map(|days| Op::Advance { days }),
    ]
}

#[derive(Debug)]
struct Member {
    address: Address,
    stake: U256,
    paid: U256,
}

impl PoolMember for Member {
    fn member_address(&self) -> &Address {
        &self.address
    }
}

prop_compose! {
    fn arb_members()
        (stakes in prop::collection::vec(0u64..2_000_000, 1..10), with_owner in any::<bool>()) -> Vec<Member> {
        let first = if with_owner { 1 } else { 2 };
        stakes
            .into_iter()
            .enumerate()
            .map(|(i, stake)| Member {
                address: addr(first + i as u64),
                stake: U256::from(stake),
                paid: U256::zero(),
            })
            .collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_deposit_value_conserved(ops in prop::collection::vec(arb_op(), 1..40)) {
        let config = LedgerConfig::default();
        let executor = Executor::new(&config);
        let ledger = DepositLedger::new(&config);
        let mut state = funded(&[1], 10_000_000);

        let mut now = 0u64;
        let mut deposited = U256::zero();
        let mut refunded = U256::zero();

        for op in ops {
            match op {
                Op::Deposit { deposit_type, amount } => {
                    let call = DepositCall::MinerDeposit { sign_address: addr(11), deposit_type };
                    if send_deposit(&executor, &mut state, &config, 1, amount, now, call).is_ok() {
                        deposited += U256::from(amount);
                    }
                }
                Op::Withdraw { position, amount } => {
                    let call = DepositCall::Withdraw { position, amount: U256::from(amount) };
                    let _ = send_deposit(&executor, &mut state, &config, 1, 0, now, call);
                }
                Op::Refund { position } => {
                    let before = state.balance(&addr(1));
                    let call = DepositCall::Refund { position };
                    if send_deposit(&executor, &mut state, &config, 1, 0, now, call).is_ok() {
                        refunded += state.balance(&addr(1)) - before;
                    }
                }
                Op::Advance { days } => now += days * DAY_SECS,
            }

            let owned = match ledger.get_deposit(&state, &addr(1)).unwrap() {
                Some(record) => record.total_owned().unwrap(),
                None => U256::zero(),
            };
            prop_assert_eq!(owned + refunded, deposited);
            prop_assert_eq!(state.balance(&config.deposit_contract), owned);
            prop_assert_eq!(state.total_balance().unwrap(), U256::from(10_000_000u64));
            prop_assert_eq!(state.snapshot_depth(), 0);
        }
    }

    #[test]
    fn prop_distribution_never_leaks(
        mut members in arb_members(),
        amount in 0u64..1_000_000_000_000,
        owner_rate in 0u64..60_000,
        node_rate in 0u64..=10_000,
        levels in prop::collection::vec(0u64..60_000, 3),
    ) {
        let thresholds = LedgerConfig::default().level_thresholds;
        let rate = RewardRate::new(owner_rate, node_rate, &levels, &thresholds).unwrap();
        let owner = addr(1);
        let owner_present = members.iter().any(|m| m.address == owner);

        let result = distribute_amount(
            &rate,
            &owner,
            &mut members,
            U256::from(amount),
            |m| m.stake,
            |m, share| {
                m.paid += share;
                Ok(())
            },
        )
        .unwrap();

        let paid = members.iter().fold(U256::zero(), |acc, m| acc + m.paid);
        prop_assert_eq!(paid, result.distributed);
        prop_assert_eq!(result.distributed + result.dropped, U256::from(amount));

        let total_weight = members
            .iter()
            .map(|m| rate.deposit_weight(m.address == owner, m.stake).unwrap())
            .fold(U256::zero(), |acc, w| acc + w);
        if owner_present && !total_weight.is_zero() {
            prop_assert_eq!(result.dropped, U256::zero());
            prop_assert_eq!(paid, U256::from(amount));
        }
    }
}
