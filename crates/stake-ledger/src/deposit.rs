//! Deposit ledger: per-account positions, withdrawal queues and roles
//!
//! ## How it works:
//!
//! 1. **Deposit**: value sent with the call lands on the current position
//!    (type 0) or opens a new fixed position with a fresh nonce
//! 2. **Withdraw**: queues a withdrawal. Current funds leave the active
//!    balance at once; a fixed position is marked with its term end
//! 3. **Refund**: pays out whatever has matured and prunes empty positions;
//!    an account that owns nothing any more is removed from every index
//!
//! ## Roles:
//!
//! ```text
//! role-eligible stake = current.amount + Σ fixed.amount (no withdrawal requested)
//!
//! deposit:  stake >= threshold(role)        -> role set, online_time = now
//! withdraw: stake <  threshold(stored role) -> role cleared, accruals reset
//! refund:   stake <  threshold(stored role) -> accruals reset
//!           nothing owned                   -> account pruned
//! ```
//!
//! ## Storage (under the deposit contract):
//!
//! - `A0 ++ "A0"`: the account's [`DepositBase`]
//! - `A1 ++ "A1"`: A0 bound to signing account A1
//! - `contract ++ "DepositA0list"`: sorted A0 index
//! - `contract ++ "DepositRole"`: sorted addresses per role

use crate::config::LedgerConfig;
use crate::context::CallContext;
use crate::distribution::pro_rata;
use crate::error::{LedgerError, Result};
use crate::policy::PositionPolicy;
use crate::record::{DepositBase, DepositMsg, Role, WithdrawInfo, CURRENT_POSITION, CURRENT_TYPE};
use crate::sorted::SortedVec;
use crate::state::{erase, load, store, tags, StateStore};
use crate::types::{add, sub, Address, Timestamp, U256};
use serde::{Deserialize, Serialize};

/// Addresses holding each role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleIndex {
    pub miners: SortedVec<Address>,
    pub validators: SortedVec<Address>,
}

impl RoleIndex {
    fn list_mut(&mut self, role: Role) -> Option<&mut SortedVec<Address>> {
        match role {
            Role::None => None,
            Role::Miner => Some(&mut self.miners),
            Role::Validator => Some(&mut self.validators),
        }
    }

    pub fn members(&self, role: Role) -> &[Address] {
        match role {
            Role::None => &[],
            Role::Miner => self.miners.as_slice(),
            Role::Validator => self.validators.as_slice(),
        }
    }
}

/// Single-account deposit state machine
#[derive(Debug, Clone, Copy)]
pub struct DepositLedger<'c> {
    config: &'c LedgerConfig,
}

impl<'c> DepositLedger<'c> {
    pub fn new(config: &'c LedgerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'c LedgerConfig {
        self.config
    }

    /// Contract that holds deposits and ledger storage
    pub fn contract(&self) -> Address {
        self.config.deposit_contract
    }

    pub fn get_deposit<S: StateStore>(&self, state: &S, account: &Address) -> Result<Option<DepositBase>> {
        load(state, &self.contract(), account, tags::DEPOSIT)
    }

    pub(crate) fn save_record<S: StateStore>(&self, state: &mut S, record: &DepositBase) -> Result<()> {
        store(state, &self.contract(), &record.address_a0, tags::DEPOSIT, record)
    }

    fn load_accounts<S: StateStore>(&self, state: &S) -> Result<SortedVec<Address>> {
        let contract = self.contract();
        Ok(load(state, &contract, &contract, tags::A0_LIST)?.unwrap_or_default())
    }

    fn save_accounts<S: StateStore>(&self, state: &mut S, accounts: &SortedVec<Address>) -> Result<()> {
        let contract = self.contract();
        store(state, &contract, &contract, tags::A0_LIST, accounts)
    }

    pub fn load_roles<S: StateStore>(&self, state: &S) -> Result<RoleIndex> {
        let contract = self.contract();
        Ok(load(state, &contract, &contract, tags::ROLE_INDEX)?.unwrap_or_default())
    }

    fn save_roles<S: StateStore>(&self, state: &mut S, roles: &RoleIndex) -> Result<()> {
        let contract = self.contract();
        store(state, &contract, &contract, tags::ROLE_INDEX, roles)
    }

    /// A0 bound to signing account `sign`
    pub fn get_a0_for_sign<S: StateStore>(&self, state: &S, sign: &Address) -> Result<Option<Address>> {
        load(state, &self.contract(), sign, tags::SIGN)
    }

    /// Policy for a stored position: nonce 0 is always the current policy
    fn position_policy(&self, position: u64, msg: &DepositMsg) -> Result<PositionPolicy<'c>> {
        if position == CURRENT_POSITION {
            self.config.policy(CURRENT_TYPE)
        } else {
            self.config.policy(msg.deposit_type)
        }
    }

    fn set_role<S: StateStore>(
        &self,
        state: &mut S,
        record: &mut DepositBase,
        role: Role,
        now: Timestamp,
    ) -> Result<()> {
        let mut roles = self.load_roles(state)?;
        if let Some(list) = roles.list_mut(record.role) {
            list.remove(&record.address_a0);
        }
        if let Some(list) = roles.list_mut(role) {
            list.insert(record.address_a0);
        }
        self.save_roles(state, &roles)?;

        if record.role == Role::None {
            record.online_time = now;
        }
        tracing::info!("account {} role {:?} -> {:?}", record.address_a0, record.role, role);
        record.role = role;
        Ok(())
    }

    fn clear_role<S: StateStore>(&self, state: &mut S, record: &mut DepositBase) -> Result<()> {
        if record.role == Role::None {
            return Ok(());
        }
        let mut roles = self.load_roles(state)?;
        if let Some(list) = roles.list_mut(record.role) {
            list.remove(&record.address_a0);
        }
        self.save_roles(state, &roles)?;
        tracing::info!("account {} lost role {:?}", record.address_a0, record.role);
        record.role = Role::None;
        Ok(())
    }

    /// Bind `sign` to `record`; any previous A1 of the record is released
    fn bind_sign<S: StateStore>(&self, state: &mut S, record: &mut DepositBase, sign: Address) -> Result<()> {
        let contract = self.contract();
        if record.address_a1 != sign {
            erase(state, &contract, &record.address_a1, tags::SIGN);
            record.address_a1 = sign;
        }
        store(state, &contract, &sign, tags::SIGN, &record.address_a0)
    }

    /// Deposit `ctx.value` from `ctx.caller`; returns the position nonce
    /// (0 for the current position).
    ///
    /// A zero-value current deposit on an existing account only rebinds the
    /// signing address.
    pub fn deposit<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        sign: Address,
        deposit_type: u32,
        role: Role,
    ) -> Result<u64> {
        let account = ctx.caller;
        let amount = ctx.value;
        let policy = self.config.policy(deposit_type)?;
        let existing = self.get_deposit(state, &account)?;

        if amount.is_zero() && existing.is_none() {
            return Err(LedgerError::DepositTooSmall);
        }
        policy.check_amount_deposit(existing.as_ref(), amount)?;

        if sign.is_zero() {
            return Err(LedgerError::InvalidArguments("zero sign address"));
        }
        if let Some(bound) = self.get_a0_for_sign(state, &sign)? {
            if bound != account {
                return Err(LedgerError::InvalidArguments("sign address bound to another account"));
            }
        }

        let is_new = existing.is_none();
        let mut record = existing.unwrap_or_else(|| DepositBase::new(account, sign));
        self.bind_sign(state, &mut record, sign)?;

        let position = match policy {
            PositionPolicy::Current(_) => {
                if !amount.is_zero() {
                    let current = record.current_or_insert(ctx.now);
                    current.amount = add(current.amount, amount)?;
                }
                CURRENT_POSITION
            }
            PositionPolicy::Regular(terms) => {
                let nonce = record.next_position();
                record
                    .positions
                    .push(DepositMsg::new_regular(terms.deposit_type, amount, nonce, ctx.now));
                nonce
            }
        };

        // a deposit only ever raises the role; a qualified higher role is kept
        if role > record.role && record.active_stake()? >= self.config.threshold(role) {
            self.set_role(state, &mut record, role, ctx.now)?;
        }

        if is_new {
            let mut accounts = self.load_accounts(state)?;
            accounts.insert(account);
            self.save_accounts(state, &accounts)?;
        }
        self.save_record(state, &record)?;

        tracing::info!(
            "deposit {} type {} amount {} position {} (sign {})",
            account,
            deposit_type,
            amount,
            position,
            sign
        );
        Ok(position)
    }

    /// Queue a withdrawal on `position`. `amount` is ignored for fixed positions.
    pub fn withdraw<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        position: u64,
        amount: U256,
    ) -> Result<WithdrawInfo> {
        self.queue_withdrawal(state, ctx, position, amount, true)
    }

    /// Queue `amount` of the current position without the per-request
    /// minimum. Used by a group's withdraw-all to empty small shares.
    pub(crate) fn force_withdraw_current<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        amount: U256,
    ) -> Result<WithdrawInfo> {
        self.queue_withdrawal(state, ctx, CURRENT_POSITION, amount, false)
    }

    fn queue_withdrawal<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        position: u64,
        amount: U256,
        enforce_minimum: bool,
    ) -> Result<WithdrawInfo> {
        let mut record = self
            .get_deposit(state, &ctx.caller)?
            .ok_or(LedgerError::PositionNotFound(position))?;
        let index = record
            .find(position)
            .ok_or(LedgerError::PositionNotFound(position))?;

        let policy = self.position_policy(position, &record.positions[index])?;
        match policy {
            PositionPolicy::Current(_) if !enforce_minimum => {
                if amount > record.positions[index].amount {
                    return Err(LedgerError::InsufficientCurrentBalance);
                }
                if amount.is_zero() {
                    return Err(LedgerError::InvalidArguments("zero withdrawal"));
                }
            }
            _ => policy.check_withdraw(&record.positions[index], amount)?,
        }
        let entry = policy.calc_deposit_time(&mut record.positions[index], amount, ctx.now)?;

        if record.role != Role::None && record.active_stake()? < self.config.threshold(record.role) {
            self.clear_role(state, &mut record)?;
            record.reset_accruals();
            record.online_time = 0;
        }
        record.prune();
        self.save_record(state, &record)?;

        tracing::info!(
            "withdraw {} position {} amount {} matures at {}",
            ctx.caller,
            position,
            entry.amount,
            entry.mature_time
        );
        Ok(entry)
    }

    /// Pay out what has matured on `position` to the caller.
    pub fn refund<S: StateStore>(&self, state: &mut S, ctx: &CallContext, position: u64) -> Result<U256> {
        let account = ctx.caller;
        let mut record = self
            .get_deposit(state, &account)?
            .ok_or(LedgerError::PositionNotFound(position))?;
        let index = record
            .find(position)
            .ok_or(LedgerError::PositionNotFound(position))?;

        let policy = self.position_policy(position, &record.positions[index])?;
        let payout = policy.check_and_calc_refund(&mut record, position, ctx.now)?;
        record.prune();

        if record.role != Role::None && record.active_stake()? < self.config.threshold(record.role) {
            record.reset_accruals();
            record.online_time = 0;
            record.prune();
        }

        if record.total_owned()?.is_zero() {
            self.remove_account(state, record)?;
        } else {
            self.save_record(state, &record)?;
        }

        state.transfer(&self.contract(), &account, payout).map_err(|e| {
            tracing::error!("refund {} of {} unfunded: {}", account, payout, e);
            e
        })?;

        tracing::info!("refund {} position {} paid {}", account, position, payout);
        Ok(payout)
    }

    /// Drop an account that owns nothing from every index
    fn remove_account<S: StateStore>(&self, state: &mut S, mut record: DepositBase) -> Result<()> {
        let contract = self.contract();
        self.clear_role(state, &mut record)?;
        erase(state, &contract, &record.address_a1, tags::SIGN);
        erase(state, &contract, &record.address_a0, tags::DEPOSIT);

        let mut accounts = self.load_accounts(state)?;
        accounts.remove(&record.address_a0);
        self.save_accounts(state, &accounts)?;

        tracing::info!("account {} fully refunded and pruned", record.address_a0);
        Ok(())
    }

    /// Move `amount` from the current position into a new fixed position.
    /// Value sent with the call is credited to the current position first.
    pub fn modify_deposit_type<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        deposit_type: u32,
        amount: U256,
    ) -> Result<u64> {
        if deposit_type == CURRENT_TYPE {
            return Err(LedgerError::InvalidArguments("target type must be fixed"));
        }
        let target = self.config.policy(deposit_type)?;
        let mut record = self
            .get_deposit(state, &ctx.caller)?
            .ok_or(LedgerError::InsufficientCurrentBalance)?;

        if !ctx.value.is_zero() {
            self.config
                .policy(CURRENT_TYPE)?
                .check_amount_deposit(Some(&record), ctx.value)?;
            let current = record.current_or_insert(ctx.now);
            current.amount = add(current.amount, ctx.value)?;
        }

        let available = record.current().map(|c| c.amount).unwrap_or_default();
        if available < amount {
            return Err(LedgerError::InsufficientCurrentBalance);
        }
        target.check_amount_deposit(Some(&record), amount)?;

        let current = record.current_or_insert(ctx.now);
        current.amount = sub(current.amount, amount)?;
        let nonce = record.next_position();
        record
            .positions
            .push(DepositMsg::new_regular(deposit_type, amount, nonce, ctx.now));
        record.prune();
        self.save_record(state, &record)?;

        tracing::info!(
            "modify {} moved {} from current to type {} position {}",
            ctx.caller,
            amount,
            deposit_type,
            nonce
        );
        Ok(nonce)
    }

    /// Accrue a slash on `account`, spread over its positions by amount.
    /// Rounding remainder lands on the first position.
    pub fn add_slash<S: StateStore>(&self, state: &mut S, account: &Address, amount: U256) -> Result<()> {
        let mut record = self
            .get_deposit(state, account)?
            .ok_or(LedgerError::NotFound("deposit record"))?;
        if record.positions.is_empty() {
            return Err(LedgerError::NotFound("position to slash"));
        }

        let weights: Vec<U256> = record.positions.iter().map(|p| p.amount).collect();
        let (shares, leftover) = match pro_rata(amount, &weights)? {
            Some(split) => split,
            None => (vec![U256::zero(); weights.len()], amount),
        };
        for (position, share) in record.positions.iter_mut().zip(shares) {
            position.slash = add(position.slash, share)?;
        }
        record.positions[0].slash = add(record.positions[0].slash, leftover)?;
        self.save_record(state, &record)?;

        tracing::warn!("slash {} accrued on {}", amount, account);
        Ok(())
    }

    /// Every A0 in index order
    pub fn get_deposit_list<S: StateStore>(&self, state: &S) -> Result<Vec<Address>> {
        Ok(self.load_accounts(state)?.as_slice().to_vec())
    }

    /// Every record in index order. Unless `include_withdrawn`, accounts
    /// whose stake still live at `head_time` is under their role threshold
    /// (miner threshold without role) are left out.
    pub fn get_all_deposit_list<S: StateStore>(
        &self,
        state: &S,
        include_withdrawn: bool,
        head_time: Timestamp,
    ) -> Result<Vec<DepositBase>> {
        let mut out = Vec::new();
        for account in self.load_accounts(state)?.iter() {
            let Some(record) = self.get_deposit(state, account)? else {
                tracing::warn!("indexed account {} has no record", account);
                continue;
            };
            if !include_withdrawn {
                let threshold = match record.role {
                    Role::None => self.config.miner_threshold,
                    role => self.config.threshold(role),
                };
                if record.stake_at(head_time)? < threshold {
                    continue;
                }
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Accrued, unpaid interest of `account`
    pub fn get_interest<S: StateStore>(&self, state: &S, account: &Address) -> Result<U256> {
        match self.get_deposit(state, account)? {
            Some(record) => record.total_interest(),
            None => Ok(U256::zero()),
        }
    }

    pub fn role_members<S: StateStore>(&self, state: &S, role: Role) -> Result<Vec<Address>> {
        Ok(self.load_roles(state)?.members(role).to_vec())
    }
}
