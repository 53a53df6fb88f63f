//! Call surface of the deposit and validator group contracts
//!
//! Call data is a bincode-encoded [`DepositCall`] or [`GroupCall`]. Every
//! call runs inside a store snapshot:
//!
//! ```text
//! decode ─► payable check ─► snapshot ─► caller ──value──► contract ─► dispatch
//!                                 ▲                                     │
//!                                 └──────── revert on any error ◄───────┘
//! ```
//!
//! Mutations answer [`SUCCESS`]; views answer bincode-encoded data.

use crate::config::LedgerConfig;
use crate::context::CallContext;
use crate::error::{LedgerError, Result};
use crate::group::ValidatorGroupLedger;
use crate::record::Role;
use crate::state::StateStore;
use crate::types::{Address, RateBps, U256};
use serde::{Deserialize, Serialize};

/// Single-byte success marker returned by every mutating call
pub const SUCCESS: [u8; 1] = [0x01];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositCall {
    ValiDeposit { sign_address: Address, deposit_type: u32 },
    MinerDeposit { sign_address: Address, deposit_type: u32 },
    Withdraw { position: u64, amount: U256 },
    Refund { position: u64 },
    ModifyDepositType { deposit_type: u32, amount: U256 },
    GetDepositList,
    GetInterest { address: Address },
}

impl DepositCall {
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            DepositCall::ValiDeposit { .. }
                | DepositCall::MinerDeposit { .. }
                | DepositCall::ModifyDepositType { .. }
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupCall {
    CreateValidatorGroup {
        sign_address: Address,
        deposit_type: u32,
        owner_rate: RateBps,
        node_rate: RateBps,
        level_rates: Vec<RateBps>,
    },
    AddDeposit { deposit_type: u32 },
    Withdraw { amount: U256, position: u64 },
    Refund { position: u64 },
    WithdrawAll,
    GetReward,
    SetSignAccount { sign_address: Address },
    TransferOwnership { new_owner: Address },
    DistributeReward,
}

impl GroupCall {
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            GroupCall::CreateValidatorGroup { .. } | GroupCall::AddDeposit { .. } | GroupCall::DistributeReward
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Dispatches decoded calls onto the ledgers
#[derive(Debug, Clone, Copy)]
pub struct Executor<'c> {
    config: &'c LedgerConfig,
    groups: ValidatorGroupLedger<'c>,
}

impl<'c> Executor<'c> {
    pub fn new(config: &'c LedgerConfig) -> Self {
        Self {
            config,
            groups: ValidatorGroupLedger::new(config),
        }
    }

    /// Execute call data against the deposit contract
    pub fn call_deposit<S: StateStore>(&self, state: &mut S, ctx: &CallContext, data: &[u8]) -> Result<Vec<u8>> {
        if ctx.contract != self.config.deposit_contract {
            return Err(LedgerError::InvalidArguments("not the deposit contract"));
        }
        let call: DepositCall = bincode::deserialize(data)?;
        tracing::debug!("deposit call {:?} from {}", call, ctx.caller);

        let deposits = self.groups.deposits();
        self.execute(state, ctx, call.is_payable(), |state| match call {
            DepositCall::ValiDeposit {
                sign_address,
                deposit_type,
            } => {
                deposits.deposit(state, ctx, sign_address, deposit_type, Role::Validator)?;
                Ok(SUCCESS.to_vec())
            }
            DepositCall::MinerDeposit {
                sign_address,
                deposit_type,
            } => {
                deposits.deposit(state, ctx, sign_address, deposit_type, Role::Miner)?;
                Ok(SUCCESS.to_vec())
            }
            DepositCall::Withdraw { position, amount } => {
                deposits.withdraw(state, ctx, position, amount)?;
                Ok(SUCCESS.to_vec())
            }
            DepositCall::Refund { position } => {
                deposits.refund(state, ctx, position)?;
                Ok(SUCCESS.to_vec())
            }
            DepositCall::ModifyDepositType { deposit_type, amount } => {
                deposits.modify_deposit_type(state, ctx, deposit_type, amount)?;
                Ok(SUCCESS.to_vec())
            }
            DepositCall::GetDepositList => Ok(bincode::serialize(&deposits.get_deposit_list(state)?)?),
            DepositCall::GetInterest { address } => Ok(bincode::serialize(&deposits.get_interest(state, &address)?)?),
        })
    }

    /// Execute call data against the group contract at `ctx.contract`
    pub fn call_group<S: StateStore>(&self, state: &mut S, ctx: &CallContext, data: &[u8]) -> Result<Vec<u8>> {
        if ctx.contract == self.config.deposit_contract {
            return Err(LedgerError::InvalidArguments("deposit contract is not a group"));
        }
        let call: GroupCall = bincode::deserialize(data)?;
        tracing::debug!("group {} call {:?} from {}", ctx.contract, call, ctx.caller);

        let groups = &self.groups;
        self.execute(state, ctx, call.is_payable(), |state| {
            match call {
                GroupCall::CreateValidatorGroup {
                    sign_address,
                    deposit_type,
                    owner_rate,
                    node_rate,
                    level_rates,
                } => {
                    groups.create(state, ctx, sign_address, deposit_type, owner_rate, node_rate, &level_rates)?;
                }
                GroupCall::AddDeposit { deposit_type } => {
                    groups.add_deposit(state, ctx, deposit_type)?;
                }
                GroupCall::Withdraw { amount, position } => {
                    groups.withdraw(state, ctx, amount, position)?;
                }
                GroupCall::Refund { position } => {
                    groups.refund(state, ctx, position)?;
                }
                GroupCall::WithdrawAll => groups.withdraw_all(state, ctx)?,
                GroupCall::GetReward => {
                    groups.get_reward(state, ctx)?;
                }
                GroupCall::SetSignAccount { sign_address } => groups.set_sign_account(state, ctx, sign_address)?,
                GroupCall::TransferOwnership { new_owner } => groups.transfer_ownership(state, ctx, new_owner)?,
                GroupCall::DistributeReward => {
                    groups.distribute_reward(state, ctx)?;
                }
            }
            Ok(SUCCESS.to_vec())
        })
    }

    fn execute<S, F>(&self, state: &mut S, ctx: &CallContext, payable: bool, dispatch: F) -> Result<Vec<u8>>
    where
        S: StateStore,
        F: FnOnce(&mut S) -> Result<Vec<u8>>,
    {
        if !payable && !ctx.value.is_zero() {
            return Err(LedgerError::InvalidArguments("value sent to non-payable call"));
        }

        let snapshot = state.snapshot();
        let result = state
            .transfer(&ctx.caller, &ctx.contract, ctx.value)
            .and_then(|_| dispatch(state));

        match &result {
            Ok(_) => state.discard_snapshot(snapshot),
            Err(e) => {
                state.revert_to_snapshot(snapshot);
                if e.is_fatal() {
                    tracing::error!("call on {} from {} reverted: {}", ctx.contract, ctx.caller, e);
                } else {
                    tracing::warn!("call on {} from {} reverted: {}", ctx.contract, ctx.caller, e);
                }
            }
        }
        result
    }
}
