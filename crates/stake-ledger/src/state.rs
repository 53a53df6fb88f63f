//! State store interface and record codec
//!
//! The ledger never owns state. Every call loads whole records from a
//! [`StateStore`], mutates copies and writes them back as bincode blobs keyed
//! by `address ++ tag` inside the owning contract's storage.

use crate::error::{LedgerError, Result};
use crate::types::{add, sub, Address, U256};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

/// Storage tags appended to an address to form a key
pub mod tags {
    /// A0 -> DepositBase
    pub const DEPOSIT: &[u8] = b"A0";
    /// A1 -> A0
    pub const SIGN: &[u8] = b"A1";
    /// Sorted list of every A0
    pub const A0_LIST: &[u8] = b"DepositA0list";
    /// Role -> sorted addresses
    pub const ROLE_INDEX: &[u8] = b"DepositRole";
    /// Last processed interest height
    pub const INTEREST_HEIGHT: &[u8] = b"InterestHeight";
    /// Group -> OwnerInfo
    pub const OWNER: &[u8] = b"Owner";
    /// Group -> RewardRate
    pub const REWARD_RATE: &[u8] = b"Reward";
    /// Group -> sorted ValidatorInfo
    pub const MEMBERS: &[u8] = b"ValiMap";
}

/// Key `address ++ tag`
pub fn storage_key(address: &Address, tag: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(20 + tag.len());
    key.extend_from_slice(address.as_bytes());
    key.extend_from_slice(tag);
    key
}

pub type SnapshotId = usize;

/// Host state: per-contract byte storage, balances and revert points
pub trait StateStore {
    fn get_state_bytes(&self, contract: &Address, key: &[u8]) -> Option<Vec<u8>>;

    /// Empty `value` deletes the key
    fn set_state_bytes(&mut self, contract: &Address, key: &[u8], value: Vec<u8>);

    fn balance(&self, address: &Address) -> U256;

    fn add_balance(&mut self, address: &Address, amount: U256) -> Result<()>;

    /// Fails with `InsufficientBalance` without touching state
    fn sub_balance(&mut self, address: &Address, amount: U256) -> Result<()>;

    fn snapshot(&mut self) -> SnapshotId;

    fn revert_to_snapshot(&mut self, id: SnapshotId);

    /// Keep every write since `id` and release the revert point
    fn discard_snapshot(&mut self, id: SnapshotId);

    /// Delete a contract's storage and balance
    fn suicide(&mut self, contract: &Address);

    /// Move `amount` between accounts
    fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount)
    }
}

/// Decode the record at `address ++ tag`
pub fn load<S: StateStore + ?Sized, T: DeserializeOwned>(
    state: &S,
    contract: &Address,
    address: &Address,
    tag: &[u8],
) -> Result<Option<T>> {
    match state.get_state_bytes(contract, &storage_key(address, tag)) {
        Some(bytes) if !bytes.is_empty() => Ok(Some(bincode::deserialize(&bytes)?)),
        _ => Ok(None),
    }
}

/// Encode `value` as one blob at `address ++ tag`
pub fn store<S: StateStore + ?Sized, T: Serialize>(
    state: &mut S,
    contract: &Address,
    address: &Address,
    tag: &[u8],
    value: &T,
) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    state.set_state_bytes(contract, &storage_key(address, tag), bytes);
    Ok(())
}

pub fn erase<S: StateStore + ?Sized>(state: &mut S, contract: &Address, address: &Address, tag: &[u8]) {
    state.set_state_bytes(contract, &storage_key(address, tag), Vec::new());
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Layer {
    storage: BTreeMap<(Address, Vec<u8>), Vec<u8>>,
    balances: BTreeMap<Address, U256>,
}

/// In-memory store with copy-on-snapshot revert points
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    live: Layer,
    snapshots: Vec<Layer>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a balance (genesis / tests)
    pub fn with_balance(mut self, address: Address, amount: U256) -> Self {
        self.live.balances.insert(address, amount);
        self
    }

    /// Sum of every balance, used to check value conservation
    pub fn total_balance(&self) -> Result<U256> {
        self.live.balances.values().try_fold(U256::zero(), |acc, b| add(acc, *b))
    }

    /// Revert points still held
    pub fn snapshot_depth(&self) -> usize {
        self.snapshots.len()
    }

    /// Number of storage keys held for `contract`
    pub fn storage_len(&self, contract: &Address) -> usize {
        self.live.storage.keys().filter(|(c, _)| c == contract).count()
    }
}

impl StateStore for MemoryState {
    fn get_state_bytes(&self, contract: &Address, key: &[u8]) -> Option<Vec<u8>> {
        self.live.storage.get(&(*contract, key.to_vec())).cloned()
    }

    fn set_state_bytes(&mut self, contract: &Address, key: &[u8], value: Vec<u8>) {
        let slot = (*contract, key.to_vec());
        if value.is_empty() {
            self.live.storage.remove(&slot);
        } else {
            self.live.storage.insert(slot, value);
        }
    }

    fn balance(&self, address: &Address) -> U256 {
        self.live.balances.get(address).copied().unwrap_or_default()
    }

    fn add_balance(&mut self, address: &Address, amount: U256) -> Result<()> {
        let next = add(self.balance(address), amount)?;
        self.live.balances.insert(*address, next);
        Ok(())
    }

    fn sub_balance(&mut self, address: &Address, amount: U256) -> Result<()> {
        let next = sub(self.balance(address), amount).map_err(|_| LedgerError::InsufficientBalance)?;
        self.live.balances.insert(*address, next);
        Ok(())
    }

    fn snapshot(&mut self) -> SnapshotId {
        self.snapshots.push(self.live.clone());
        self.snapshots.len() - 1
    }

    fn revert_to_snapshot(&mut self, id: SnapshotId) {
        if id < self.snapshots.len() {
            self.snapshots.truncate(id + 1);
            if let Some(layer) = self.snapshots.pop() {
                self.live = layer;
            }
        }
    }

    fn discard_snapshot(&mut self, id: SnapshotId) {
        self.snapshots.truncate(id);
    }

    fn suicide(&mut self, contract: &Address) {
        self.live.storage.retain(|(c, _), _| c != contract);
        self.live.balances.remove(contract);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_revert_restores_storage_and_balances() {
        let contract = Address::from_low_u64(9);
        let user = Address::from_low_u64(1);
        let mut state = MemoryState::new().with_balance(user, U256::from(100));

        let snap = state.snapshot();
        state.transfer(&user, &contract, U256::from(40)).unwrap();
        store(&mut state, &contract, &user, tags::DEPOSIT, &7u64).unwrap();
        state.revert_to_snapshot(snap);

        assert_eq!(state.balance(&user), U256::from(100));
        assert_eq!(state.balance(&contract), U256::zero());
        let loaded: Option<u64> = load(&state, &contract, &user, tags::DEPOSIT).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn test_failed_transfer_leaves_state() {
        let a = Address::from_low_u64(1);
        let b = Address::from_low_u64(2);
        let mut state = MemoryState::new().with_balance(a, U256::from(5));
        assert_eq!(
            state.transfer(&a, &b, U256::from(6)),
            Err(LedgerError::InsufficientBalance)
        );
        assert_eq!(state.balance(&a), U256::from(5));
        assert_eq!(state.balance(&b), U256::zero());
    }

    #[test]
    fn test_erase_and_suicide() {
        let contract = Address::from_low_u64(3);
        let user = Address::from_low_u64(4);
        let mut state = MemoryState::new().with_balance(contract, U256::one());
        store(&mut state, &contract, &user, tags::OWNER, &1u8).unwrap();
        store(&mut state, &contract, &user, tags::MEMBERS, &2u8).unwrap();
        erase(&mut state, &contract, &user, tags::OWNER);
        assert_eq!(state.storage_len(&contract), 1);
        state.suicide(&contract);
        assert_eq!(state.storage_len(&contract), 0);
        assert_eq!(state.balance(&contract), U256::zero());
    }

    #[test]
    fn test_discard_keeps_writes_and_releases_snapshot() {
        let contract = Address::from_low_u64(9);
        let user = Address::from_low_u64(1);
        let mut state = MemoryState::new().with_balance(user, U256::from(100));

        let outer = state.snapshot();
        state.transfer(&user, &contract, U256::from(10)).unwrap();
        let inner = state.snapshot();
        state.transfer(&user, &contract, U256::from(20)).unwrap();
        state.discard_snapshot(inner);
        assert_eq!(state.snapshot_depth(), 1);
        assert_eq!(state.balance(&contract), U256::from(30));

        state.revert_to_snapshot(outer);
        assert_eq!(state.snapshot_depth(), 0);
        assert_eq!(state.balance(&user), U256::from(100));
    }
}
