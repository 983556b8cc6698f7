//! Collection diffing and deduplication.

use std::collections::HashSet;
use std::hash::Hash;

/// Items present only on one side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Diff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Diff two collections by key. Returns `None` when nothing was added or removed.
pub fn diff_by_key<T, K, F>(old: &[T], new: &[T], key: F) -> Option<Diff<T>>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let old_keys: HashSet<K> = old.iter().map(&key).collect();
    let new_keys: HashSet<K> = new.iter().map(&key).collect();

    let added: Vec<T> = new
        .iter()
        .filter(|item| !old_keys.contains(&key(item)))
        .cloned()
        .collect();
    let removed: Vec<T> = old
        .iter()
        .filter(|item| !new_keys.contains(&key(item)))
        .cloned()
        .collect();

    let diff = Diff { added, removed };
    (!diff.is_empty()).then_some(diff)
}

/// Keep the first item for every key, preserving order.
pub fn unique_by_key<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

/// Order-insensitive set equality.
pub fn same_members<T: Eq + Hash>(left: &[T], right: &[T]) -> bool {
    let left: HashSet<&T> = left.iter().collect();
    let right: HashSet<&T> = right.iter().collect();
    left.symmetric_difference(&right).next().is_none()
}
