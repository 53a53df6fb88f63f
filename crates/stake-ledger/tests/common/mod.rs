//! Shared helpers for integration tests

#![allow(dead_code)]

use stake_ledger::{
    Address, CallContext, DepositCall, Executor, GroupCall, LedgerConfig, MemoryState, Result, Timestamp, U256,
};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the test subscriber once; `RUST_LOG` picks the level
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const GROUP: u64 = 0x2000;

pub fn addr(v: u64) -> Address {
    Address::from_low_u64(v)
}

/// State with every listed account holding `amount`
pub fn funded(accounts: &[u64], amount: u64) -> MemoryState {
    accounts
        .iter()
        .fold(MemoryState::new(), |state, a| state.with_balance(addr(*a), U256::from(amount)))
}

pub fn send_deposit(
    executor: &Executor,
    state: &mut MemoryState,
    config: &LedgerConfig,
    caller: u64,
    value: u64,
    now: Timestamp,
    call: DepositCall,
) -> Result<Vec<u8>> {
    let ctx = CallContext::new(config.deposit_contract, addr(caller), U256::from(value), now, 1);
    executor.call_deposit(state, &ctx, &call.encode()?)
}

pub fn send_group(
    executor: &Executor,
    state: &mut MemoryState,
    caller: u64,
    value: u64,
    now: Timestamp,
    call: GroupCall,
) -> Result<Vec<u8>> {
    let ctx = CallContext::new(addr(GROUP), addr(caller), U256::from(value), now, 1);
    executor.call_group(state, &ctx, &call.encode()?)
}

pub fn create_call(deposit_type: u32, owner_rate: u64, node_rate: u64, level_rates: Vec<u64>) -> GroupCall {
    GroupCall::CreateValidatorGroup {
        sign_address: addr(0x50),
        deposit_type,
        owner_rate,
        node_rate,
        level_rates,
    }
}
