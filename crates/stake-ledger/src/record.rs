//! Per-account deposit records
//!
//! One [`DepositBase`] per depositing account (A0). Its positions are kept in
//! a small Vec: index 0 is the current position when present, fixed positions
//! follow in creation order. Positions are addressed by their nonce, never by
//! index, and lookups are a linear scan. Records hold a handful of positions,
//! and a Vec keeps the serialized layout stable.

use crate::error::Result;
use crate::types::{add, sum, Address, Timestamp, U256};
use serde::{Deserialize, Serialize};

/// `deposit_type` of the current position
pub const CURRENT_TYPE: u32 = 0;

/// Nonce of the current position
pub const CURRENT_POSITION: u64 = 0;

/// Network role backed by a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    None,
    Miner,
    Validator,
}

/// A queued withdrawal, payable once block time reaches `mature_time`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawInfo {
    pub amount: U256,
    pub mature_time: Timestamp,
}

/// One deposit lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMsg {
    /// 0 = current, otherwise the tier id
    pub deposit_type: u32,

    /// Active amount (current: excludes queued withdrawals)
    pub amount: U256,

    /// Accrued, unpaid interest
    pub interest: U256,

    /// Accrued slash, netted against interest at payout
    pub slash: U256,

    pub begin_time: Timestamp,

    /// Term end once withdrawal was requested, 0 before
    pub end_time: Timestamp,

    /// Stable identity, independent of the Vec index
    pub position: u64,

    /// Pending withdrawals
    pub withdrawals: Vec<WithdrawInfo>,
}

impl DepositMsg {
    pub fn new_current(now: Timestamp) -> Self {
        Self {
            deposit_type: CURRENT_TYPE,
            amount: U256::zero(),
            interest: U256::zero(),
            slash: U256::zero(),
            begin_time: now,
            end_time: 0,
            position: CURRENT_POSITION,
            withdrawals: Vec::new(),
        }
    }

    pub fn new_regular(deposit_type: u32, amount: U256, position: u64, now: Timestamp) -> Self {
        Self {
            deposit_type,
            amount,
            interest: U256::zero(),
            slash: U256::zero(),
            begin_time: now,
            end_time: 0,
            position,
            withdrawals: Vec::new(),
        }
    }

    pub fn is_current(&self) -> bool {
        self.deposit_type == CURRENT_TYPE
    }

    /// Sum of queued withdrawal amounts
    pub fn pending_amount(&self) -> Result<U256> {
        sum(self.withdrawals.iter().map(|w| w.amount))
    }

    /// Counts toward role eligibility: current always, fixed until withdrawal is requested
    pub fn is_role_eligible(&self) -> bool {
        self.is_current() || self.end_time == 0
    }

    /// Still earning at `head`: current always, fixed until its term end
    pub fn is_live_at(&self, head: Timestamp) -> bool {
        self.is_current() || self.end_time == 0 || self.end_time > head
    }

    /// Nothing left to pay or account for
    pub fn is_spent(&self) -> bool {
        self.amount.is_zero()
            && self.withdrawals.is_empty()
            && self.interest.is_zero()
            && self.slash.is_zero()
    }
}

/// Deposit record of one A0 account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositBase {
    pub address_a0: Address,

    /// Signing/operating account bound to A0
    pub address_a1: Address,

    /// Block time the current role was gained, 0 without role
    pub online_time: Timestamp,

    pub role: Role,

    /// Last fixed-position nonce handed out
    pub position_nonce: u64,

    pub positions: Vec<DepositMsg>,
}

impl DepositBase {
    pub fn new(address_a0: Address, address_a1: Address) -> Self {
        Self {
            address_a0,
            address_a1,
            online_time: 0,
            role: Role::None,
            position_nonce: 0,
            positions: Vec::new(),
        }
    }

    /// Index of the position with nonce `position`
    pub fn find(&self, position: u64) -> Option<usize> {
        self.positions.iter().position(|p| p.position == position)
    }

    pub fn get(&self, position: u64) -> Option<&DepositMsg> {
        self.find(position).map(|i| &self.positions[i])
    }

    pub fn current(&self) -> Option<&DepositMsg> {
        self.positions.first().filter(|p| p.is_current())
    }

    /// Current position, created at index 0 when absent
    pub fn current_or_insert(&mut self, now: Timestamp) -> &mut DepositMsg {
        if self.current().is_none() {
            self.positions.insert(0, DepositMsg::new_current(now));
        }
        &mut self.positions[0]
    }

    /// Hand out the next fixed-position nonce
    pub fn next_position(&mut self) -> u64 {
        self.position_nonce += 1;
        self.position_nonce
    }

    /// Stake that counts for role thresholds
    pub fn active_stake(&self) -> Result<U256> {
        sum(self
            .positions
            .iter()
            .filter(|p| p.is_role_eligible())
            .map(|p| p.amount))
    }

    /// Stake still live at `head`
    pub fn stake_at(&self, head: Timestamp) -> Result<U256> {
        sum(self
            .positions
            .iter()
            .filter(|p| p.is_live_at(head))
            .map(|p| p.amount))
    }

    /// Everything the account still owns: active amounts plus queued withdrawals
    pub fn total_owned(&self) -> Result<U256> {
        self.positions.iter().try_fold(U256::zero(), |acc, p| {
            add(add(acc, p.amount)?, p.pending_amount()?)
        })
    }

    pub fn total_interest(&self) -> Result<U256> {
        sum(self.positions.iter().map(|p| p.interest))
    }

    pub fn total_slash(&self) -> Result<U256> {
        sum(self.positions.iter().map(|p| p.slash))
    }

    /// Drop accrued interest and slash on every position
    pub fn reset_accruals(&mut self) {
        for p in &mut self.positions {
            p.interest = U256::zero();
            p.slash = U256::zero();
        }
    }

    /// Remove spent positions; returns how many were removed
    pub fn prune(&mut self) -> usize {
        let before = self.positions.len();
        self.positions.retain(|p| !p.is_spent());
        before - self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
