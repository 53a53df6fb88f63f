use super::types::{DepositPos, GroupState, OwnerInfo, ValidatorInfo};
use crate::config::LedgerConfig;
use crate::context::CallContext;
use crate::deposit::DepositLedger;
use crate::distribution::{distribute_amount, Distribution, RewardRate};
use crate::error::{LedgerError, Result};
use crate::policy::PositionPolicy;
use crate::record::{Role, WithdrawInfo, CURRENT_POSITION, CURRENT_TYPE};
use crate::state::StateStore;
use crate::types::{add, sub, sum, Address, RateBps, Timestamp, U256};

/// Pooled deposits behind one validator identity
#[derive(Debug, Clone, Copy)]
pub struct ValidatorGroupLedger<'c> {
    deposits: DepositLedger<'c>,
}

impl<'c> ValidatorGroupLedger<'c> {
    pub fn new(config: &'c LedgerConfig) -> Self {
        Self {
            deposits: DepositLedger::new(config),
        }
    }

    pub fn deposits(&self) -> &DepositLedger<'c> {
        &self.deposits
    }

    fn config(&self) -> &'c LedgerConfig {
        self.deposits.config()
    }

    /// Load a group and align it with its pooled record
    fn load<S: StateStore>(&self, state: &S, group: &Address) -> Result<GroupState> {
        let mut loaded = GroupState::load(state, group)?.ok_or(LedgerError::NotFound("validator group"))?;
        let pool = self.deposits.get_deposit(state, group)?;
        loaded.reconcile(pool.as_ref())?;
        Ok(loaded)
    }

    fn commit<S: StateStore>(&self, state: &mut S, group: &mut GroupState) -> Result<()> {
        let pool = self.deposits.get_deposit(state, &group.address)?;
        group.reconcile(pool.as_ref())?;
        group.check_validator_info();
        group.save(state)
    }

    /// Deposit `ctx.value` held by the group into its pooled record
    fn pool_deposit<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        sign: Address,
        deposit_type: u32,
    ) -> Result<u64> {
        let contract = self.deposits.contract();
        state.transfer(&ctx.contract, &contract, ctx.value)?;
        let inner = ctx.internal(contract, ctx.value);
        self.deposits.deposit(state, &inner, sign, deposit_type, Role::Validator)
    }

    fn credit_position(member: &mut ValidatorInfo, deposit_type: u32, position: u64, amount: U256) -> Result<()> {
        if deposit_type == CURRENT_TYPE {
            member.current.amount = add(member.current.amount, amount)?;
        } else {
            member.positions.push(DepositPos {
                deposit_type,
                position,
                amount,
                end_time: 0,
            });
        }
        member.refresh_all_amount()
    }

    fn owner_only(group: &GroupState, caller: &Address) -> Result<()> {
        if !group.is_owner(caller) {
            return Err(LedgerError::NotOwner);
        }
        if group.owner.is_expired() {
            return Err(LedgerError::GroupExpired);
        }
        Ok(())
    }

    /// Create the group at `ctx.contract`, depositing the call value for
    /// the owner. The deposit alone must qualify the pool as a validator.
    #[allow(clippy::too_many_arguments)]
    pub fn create<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        sign: Address,
        deposit_type: u32,
        owner_rate: RateBps,
        node_rate: RateBps,
        level_rates: &[RateBps],
    ) -> Result<u64> {
        if GroupState::load(state, &ctx.contract)?.is_some() {
            return Err(LedgerError::InvalidArguments("validator group exists"));
        }
        let rate = RewardRate::new(owner_rate, node_rate, level_rates, &self.config().level_thresholds)?;
        let position = self.pool_deposit(state, ctx, sign, deposit_type)?;
        let pool = self.deposits.get_deposit(state, &ctx.contract)?;
        if pool.map(|r| r.role) != Some(Role::Validator) {
            return Err(LedgerError::InsufficientStake);
        }

        let mut owner = ValidatorInfo::new(ctx.caller);
        Self::credit_position(&mut owner, deposit_type, position, ctx.value)?;

        let mut group = GroupState {
            address: ctx.contract,
            owner: OwnerInfo {
                owner: ctx.caller,
                withdraw_all_time: 0,
                sign_address: sign,
            },
            rate,
            members: std::iter::once(owner).collect(),
        };
        self.commit(state, &mut group)?;

        tracing::info!(
            "group {} created by {} with {} (type {}, sign {})",
            ctx.contract,
            ctx.caller,
            ctx.value,
            deposit_type,
            sign
        );
        Ok(position)
    }

    pub fn set_sign_account<S: StateStore>(&self, state: &mut S, ctx: &CallContext, sign: Address) -> Result<()> {
        let mut group = self.load(state, &ctx.contract)?;
        Self::owner_only(&group, &ctx.caller)?;

        let inner = ctx.internal(self.deposits.contract(), U256::zero());
        self.deposits
            .deposit(state, &inner, sign, CURRENT_TYPE, Role::Validator)?;
        group.owner.sign_address = sign;
        self.commit(state, &mut group)?;

        tracing::info!("group {} sign account -> {}", ctx.contract, sign);
        Ok(())
    }

    pub fn transfer_ownership<S: StateStore>(&self, state: &mut S, ctx: &CallContext, new_owner: Address) -> Result<()> {
        if new_owner.is_zero() {
            return Err(LedgerError::InvalidArguments("zero owner"));
        }
        let mut group = self.load(state, &ctx.contract)?;
        Self::owner_only(&group, &ctx.caller)?;
        group.owner.owner = new_owner;
        self.commit(state, &mut group)?;

        tracing::info!("group {} ownership {} -> {}", ctx.contract, ctx.caller, new_owner);
        Ok(())
    }

    /// Add `ctx.value` for the caller; returns the pool position nonce
    pub fn add_deposit<S: StateStore>(&self, state: &mut S, ctx: &CallContext, deposit_type: u32) -> Result<u64> {
        let mut group = self.load(state, &ctx.contract)?;
        if group.owner.is_expired() {
            return Err(LedgerError::GroupExpired);
        }
        let position = self.pool_deposit(state, ctx, group.owner.sign_address, deposit_type)?;

        if !group.members.contains(&ctx.caller) {
            group.members.insert(ValidatorInfo::new(ctx.caller));
        }
        let member = group
            .members
            .find_mut(&ctx.caller)
            .ok_or(LedgerError::NotFound("group member"))?;
        Self::credit_position(member, deposit_type, position, ctx.value)?;
        self.commit(state, &mut group)?;

        tracing::info!(
            "group {} deposit {} from {} type {} position {}",
            ctx.contract,
            ctx.value,
            ctx.caller,
            deposit_type,
            position
        );
        Ok(position)
    }

    /// Queue a withdrawal of the caller's share.
    ///
    /// The owner may not take the pooled stake under the validator threshold.
    pub fn withdraw<S: StateStore>(
        &self,
        state: &mut S,
        ctx: &CallContext,
        amount: U256,
        position: u64,
    ) -> Result<WithdrawInfo> {
        let mut group = self.load(state, &ctx.contract)?;
        let member = group
            .members
            .find(&ctx.caller)
            .ok_or(LedgerError::NotFound("group member"))?;

        let removed = if position == CURRENT_POSITION {
            if member.current.amount < amount {
                return Err(LedgerError::InsufficientCurrentBalance);
            }
            amount
        } else {
            let index = member
                .find_position(position)
                .ok_or(LedgerError::PositionNotFound(position))?;
            let held = &member.positions[index];
            if held.end_time == 0 {
                held.amount
            } else {
                U256::zero()
            }
        };

        if group.is_owner(&ctx.caller) {
            let pool_stake = match self.deposits.get_deposit(state, &ctx.contract)? {
                Some(record) => record.active_stake()?,
                None => U256::zero(),
            };
            let remaining = pool_stake.saturating_sub(removed);
            if remaining < self.config().validator_threshold {
                tracing::warn!(
                    "group {} owner withdrawal of {} would leave {}",
                    ctx.contract,
                    removed,
                    remaining
                );
                return Err(LedgerError::OwnerInsufficient);
            }
        }

        let inner = ctx.internal(self.deposits.contract(), U256::zero());
        let entry = self.deposits.withdraw(state, &inner, position, amount)?;

        if position == CURRENT_POSITION {
            let member = group
                .members
                .find_mut(&ctx.caller)
                .ok_or(LedgerError::NotFound("group member"))?;
            member.current.amount = sub(member.current.amount, amount)?;
            member.current.withdrawals.push(entry.clone());
        }
        self.commit(state, &mut group)?;

        tracing::info!(
            "group {} member {} withdraw position {} matures at {}",
            ctx.contract,
            ctx.caller,
            position,
            entry.mature_time
        );
        Ok(entry)
    }

    /// Owner-only, once: queue every member's stake for withdrawal and
    /// freeze the group.
    ///
    /// A current share is queued in full, below the per-request minimum too,
    /// when `amount + interest` reaches the current policy's minimum
    /// withdrawal. A share under that dust stays in the pool: its holder
    /// remains a member, can still collect interest and rewards, and the
    /// frozen group is never destroyed.
    pub fn withdraw_all<S: StateStore>(&self, state: &mut S, ctx: &CallContext) -> Result<()> {
        let mut group = self.load(state, &ctx.contract)?;
        Self::owner_only(&group, &ctx.caller)?;
        group.owner.withdraw_all_time = ctx.now;

        let dust = match self.config().policy(CURRENT_TYPE)? {
            PositionPolicy::Current(terms) => terms.min_withdraw,
            PositionPolicy::Regular(_) => U256::zero(),
        };
        let inner = ctx.internal(self.deposits.contract(), U256::zero());

        let mut queued = 0usize;
        for member in group.members.iter_mut() {
            let amount = member.current.amount;
            let held = add(amount, member.current.interest)?;
            if !amount.is_zero() && held >= dust {
                let entry = self.deposits.force_withdraw_current(state, &inner, amount)?;
                member.current.amount = U256::zero();
                member.current.withdrawals.push(entry);
                queued += 1;
            } else if !amount.is_zero() {
                tracing::warn!("group {} member {}: current {} is dust and stays pooled", ctx.contract, member.address, amount);
            }

            for pos in member.positions.iter().filter(|p| p.end_time == 0) {
                self.deposits.withdraw(state, &inner, pos.position, U256::zero())?;
                queued += 1;
            }
        }
        self.commit(state, &mut group)?;

        tracing::info!("group {} withdraw-all: {} withdrawals queued", ctx.contract, queued);
        Ok(())
    }

    /// Refund a matured position to the caller.
    ///
    /// A current refund releases every member's matured entries at once:
    /// the caller is paid directly, everyone else is credited to `reward`.
    pub fn refund<S: StateStore>(&self, state: &mut S, ctx: &CallContext, position: u64) -> Result<U256> {
        let mut group = self.load(state, &ctx.contract)?;
        let member = group
            .members
            .find(&ctx.caller)
            .ok_or(LedgerError::NotFound("group member"))?;
        if position != CURRENT_POSITION && member.find_position(position).is_none() {
            return Err(LedgerError::PositionNotFound(position));
        }

        let inner = ctx.internal(self.deposits.contract(), U256::zero());
        let released = self.deposits.refund(state, &inner, position)?;

        let payout = if position == CURRENT_POSITION {
            self.settle_current_refund(&mut group, &ctx.caller, released, ctx.now)?
        } else {
            let member = group
                .members
                .find_mut(&ctx.caller)
                .ok_or(LedgerError::NotFound("group member"))?;
            if let Some(index) = member.find_position(position) {
                member.positions.remove(index);
            }
            released
        };

        state.transfer(&ctx.contract, &ctx.caller, payout)?;
        self.commit(state, &mut group)?;

        tracing::info!(
            "group {} refund position {} to {}: {}",
            ctx.contract,
            position,
            ctx.caller,
            payout
        );
        Ok(payout)
    }

    /// Split an aggregate current refund back onto members' own queues
    fn settle_current_refund(
        &self,
        group: &mut GroupState,
        caller: &Address,
        released: U256,
        cutoff: Timestamp,
    ) -> Result<U256> {
        let mut direct = U256::zero();
        let mut matched = U256::zero();
        for member in group.members.iter_mut() {
            let (matured, pending): (Vec<_>, Vec<_>) = member
                .current
                .withdrawals
                .drain(..)
                .partition(|w| w.mature_time <= cutoff);
            member.current.withdrawals = pending;

            let amount = sum(matured.iter().map(|w| w.amount))?;
            if amount.is_zero() {
                continue;
            }
            matched = add(matched, amount)?;
            if member.address == *caller {
                direct = add(direct, amount)?;
            } else {
                member.reward = add(member.reward, amount)?;
                tracing::debug!("group {} member {}: {} matured to reward", group.address, member.address, amount);
            }
        }

        if matched != released {
            return Err(LedgerError::Invariant(format!(
                "group {} current refund released {} but members matured {}",
                group.address, released, matched
            )));
        }
        Ok(direct)
    }

    /// Pay the caller's reward and interest. The owner of a group with no
    /// members and no pooled deposit also sweeps the residual balance and
    /// destroys the group.
    pub fn get_reward<S: StateStore>(&self, state: &mut S, ctx: &CallContext) -> Result<U256> {
        let mut group = self.load(state, &ctx.contract)?;
        let is_owner = group.is_owner(&ctx.caller);

        let mut paid = U256::zero();
        match group.members.find_mut(&ctx.caller) {
            Some(member) => {
                paid = add(member.reward, member.current.interest)?;
                member.reward = U256::zero();
                member.current.interest = U256::zero();
            }
            None if is_owner => {}
            None => return Err(LedgerError::NotFound("group member")),
        }
        state.transfer(&ctx.contract, &ctx.caller, paid)?;

        group.check_validator_info();
        let pool_empty = self.deposits.get_deposit(state, &ctx.contract)?.is_none();
        if is_owner && group.members.is_empty() && pool_empty {
            let residual = state.balance(&ctx.contract);
            state.transfer(&ctx.contract, &ctx.caller, residual)?;
            paid = add(paid, residual)?;
            state.suicide(&ctx.contract);
            tracing::info!("group {} destroyed, {} swept to owner {}", ctx.contract, residual, ctx.caller);
            return Ok(paid);
        }

        self.commit(state, &mut group)?;
        tracing::info!("group {} reward {} to {}", ctx.contract, paid, ctx.caller);
        Ok(paid)
    }

    /// Split a block reward sent with the call by members' total stake
    pub fn distribute_reward<S: StateStore>(&self, state: &mut S, ctx: &CallContext) -> Result<Distribution> {
        let mut group = self.load(state, &ctx.contract)?;
        let owner = group.owner.owner;
        let result = distribute_amount(
            &group.rate,
            &owner,
            group.members.as_mut_slice(),
            ctx.value,
            |m| m.all_amount,
            |m, share| {
                m.reward = add(m.reward, share)?;
                Ok(())
            },
        )?;
        self.commit(state, &mut group)?;

        tracing::info!(
            "group {} reward {} distributed {} dropped {}",
            ctx.contract,
            ctx.value,
            result.distributed,
            result.dropped
        );
        Ok(result)
    }

    /// Credit interest the pool was paid. `payouts` holds `(position, amount)`
    /// pairs: position 0 is split by current amount, a fixed position goes to
    /// the member holding it.
    pub fn distribute_interest<S: StateStore>(
        &self,
        state: &mut S,
        group: &Address,
        payouts: &[(u64, U256)],
    ) -> Result<U256> {
        let mut loaded = self.load(state, group)?;
        let owner = loaded.owner.owner;
        let mut credited = U256::zero();

        for (position, amount) in payouts {
            if amount.is_zero() {
                continue;
            }
            if *position == CURRENT_POSITION {
                let result = distribute_amount(
                    &loaded.rate,
                    &owner,
                    loaded.members.as_mut_slice(),
                    *amount,
                    |m| m.current.amount,
                    |m, share| {
                        m.current.interest = add(m.current.interest, share)?;
                        Ok(())
                    },
                )?;
                credited = add(credited, result.distributed)?;
                for member in loaded.members.iter_mut() {
                    member.current.pre_amount = member.current.amount;
                }
                continue;
            }

            match loaded
                .members
                .iter_mut()
                .find(|m| m.find_position(*position).is_some())
            {
                Some(member) => {
                    member.current.interest = add(member.current.interest, *amount)?;
                    credited = add(credited, *amount)?;
                }
                None => tracing::warn!("group {}: interest for unheld position {}", group, position),
            }
        }
        self.commit(state, &mut loaded)?;

        tracing::debug!("group {} interest credited {}", group, credited);
        Ok(credited)
    }

    /// Reconciled, read-only view of a group
    pub fn group_snapshot<S: StateStore>(&self, state: &S, group: &Address) -> Result<GroupState> {
        self.load(state, group)
    }

    /// Whether `address` is a validator group
    pub fn is_group<S: StateStore>(&self, state: &S, address: &Address) -> Result<bool> {
        Ok(GroupState::load(state, address)?.is_some())
    }
}
