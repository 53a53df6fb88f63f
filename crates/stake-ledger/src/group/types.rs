//! Validator group records

use crate::distribution::{PoolMember, RewardRate};
use crate::error::{LedgerError, Result};
use crate::record::{DepositBase, WithdrawInfo};
use crate::sorted::{SortKey, SortedVec};
use crate::state::{erase, load, store, tags, StateStore};
use crate::types::{add, sum, Address, Timestamp, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub owner: Address,

    /// Block time of the one-shot withdraw-all, 0 while the group is active
    pub withdraw_all_time: Timestamp,

    /// Signing account bound to the group's pooled record
    pub sign_address: Address,
}

impl OwnerInfo {
    pub fn is_expired(&self) -> bool {
        self.withdraw_all_time != 0
    }
}

/// A member's share of the pool's current position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentData {
    pub amount: U256,

    /// `amount` as of the last interest payout
    pub pre_amount: U256,

    /// Interest credited to the member, paid by `get_reward`
    pub interest: U256,

    /// The member's own queued withdrawals
    pub withdrawals: Vec<WithdrawInfo>,
}

/// A pool fixed position held by one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPos {
    pub deposit_type: u32,
    /// Nonce of the position in the pool's record
    pub position: u64,
    pub amount: U256,
    pub end_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: Address,
    pub reward: U256,

    /// Derived: current amount plus every held fixed position
    pub all_amount: U256,

    pub current: CurrentData,
    pub positions: Vec<DepositPos>,
}

impl ValidatorInfo {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reward: U256::zero(),
            all_amount: U256::zero(),
            current: CurrentData::default(),
            positions: Vec::new(),
        }
    }

    pub fn find_position(&self, position: u64) -> Option<usize> {
        self.positions.iter().position(|p| p.position == position)
    }

    pub fn pending_amount(&self) -> Result<U256> {
        sum(self.current.withdrawals.iter().map(|w| w.amount))
    }

    pub fn refresh_all_amount(&mut self) -> Result<()> {
        let fixed = sum(self.positions.iter().map(|p| p.amount))?;
        self.all_amount = add(self.current.amount, fixed)?;
        Ok(())
    }

    /// Holds nothing and is owed nothing
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
            && self.reward.is_zero()
            && self.current.amount.is_zero()
            && self.current.interest.is_zero()
            && self.current.withdrawals.is_empty()
            && self.all_amount.is_zero()
    }
}

impl SortKey for ValidatorInfo {
    type Key = Address;

    fn sort_key(&self) -> Address {
        self.address
    }
}

impl PoolMember for ValidatorInfo {
    fn member_address(&self) -> &Address {
        &self.address
    }
}

/// Everything stored under one group contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupState {
    pub address: Address,
    pub owner: OwnerInfo,
    pub rate: RewardRate,
    pub members: SortedVec<ValidatorInfo>,
}

impl GroupState {
    pub fn load<S: StateStore>(state: &S, group: &Address) -> Result<Option<Self>> {
        let Some(owner) = load::<_, OwnerInfo>(state, group, group, tags::OWNER)? else {
            return Ok(None);
        };
        let rate = load(state, group, group, tags::REWARD_RATE)?
            .ok_or_else(|| LedgerError::Invariant(format!("group {} has no reward rate", group)))?;
        let members = load(state, group, group, tags::MEMBERS)?.unwrap_or_default();
        Ok(Some(Self {
            address: *group,
            owner,
            rate,
            members,
        }))
    }

    pub fn save<S: StateStore>(&self, state: &mut S) -> Result<()> {
        let group = &self.address;
        store(state, group, group, tags::OWNER, &self.owner)?;
        store(state, group, group, tags::REWARD_RATE, &self.rate)?;
        if self.members.is_empty() {
            erase(state, group, group, tags::MEMBERS);
            Ok(())
        } else {
            store(state, group, group, tags::MEMBERS, &self.members)
        }
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.owner.owner == *address
    }

    /// Align cached fixed positions with the pool's record.
    ///
    /// Positions whose nonce is gone from the pool are dropped; the rest take
    /// the pool's term end.
    pub fn reconcile(&mut self, pool: Option<&DepositBase>) -> Result<()> {
        for member in self.members.iter_mut() {
            let before = member.positions.len();
            member.positions.retain(|p| pool.and_then(|r| r.get(p.position)).is_some());
            if member.positions.len() != before {
                tracing::debug!(
                    "group {} member {}: dropped {} stale positions",
                    self.address,
                    member.address,
                    before - member.positions.len()
                );
            }
            if let Some(record) = pool {
                for pos in &mut member.positions {
                    if let Some(msg) = record.get(pos.position) {
                        pos.end_time = msg.end_time;
                    }
                }
            }
            member.refresh_all_amount()?;
        }
        Ok(())
    }

    /// Drop members holding nothing; returns how many were removed
    pub fn check_validator_info(&mut self) -> usize {
        let before = self.members.len();
        self.members.retain(|m| !m.is_empty());
        let removed = before - self.members.len();
        if removed > 0 {
            tracing::debug!("group {}: pruned {} empty members", self.address, removed);
        }
        removed
    }
}
