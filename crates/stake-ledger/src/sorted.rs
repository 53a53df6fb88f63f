//! Ordered container with binary-search insert/remove
//!
//! Every "list all" view in the ledger iterates one of these, so output order
//! only depends on the key bytes and never on hash-map iteration order.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key extraction for [`SortedVec`]
pub trait SortKey {
    type Key: Ord + Copy;

    fn sort_key(&self) -> Self::Key;
}

impl SortKey for crate::types::Address {
    type Key = crate::types::Address;

    fn sort_key(&self) -> Self::Key {
        *self
    }
}

/// Vec kept sorted and unique by [`SortKey`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedVec<T> {
    items: Vec<T>,
}

impl<T> Default for SortedVec<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: SortKey> SortedVec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &T::Key) -> Result<usize, usize> {
        self.items.binary_search_by(|item| item.sort_key().cmp(key))
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.position(key).is_ok()
    }

    pub fn find(&self, key: &T::Key) -> Option<&T> {
        self.position(key).ok().map(|i| &self.items[i])
    }

    pub fn find_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        match self.position(key) {
            Ok(i) => Some(&mut self.items[i]),
            Err(_) => None,
        }
    }

    /// Insert at the sorted slot. Returns false (and drops `item`) when the key exists.
    pub fn insert(&mut self, item: T) -> bool {
        match self.position(&item.sort_key()) {
            Ok(_) => false,
            Err(i) => {
                self.items.insert(i, item);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        self.position(key).ok().map(|i| self.items.remove(i))
    }

    /// Keep items matching `keep`; order is preserved
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, keep: F) {
        self.items.retain(keep);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Mutable slice view; callers must not change keys through it
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn from_unsorted(mut items: Vec<T>) -> Self {
        items.sort_by_key(|item| item.sort_key());
        items.dedup_by_key(|item| item.sort_key());
        Self { items }
    }
}

impl<T: SortKey> FromIterator<T> for SortedVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a SortedVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for SortedVec<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: SortKey + Deserialize<'de>> Deserialize<'de> for SortedVec<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer).map(Self::from_unsorted)
    }
}
