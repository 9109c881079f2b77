//! Ordered index: a sorted map from a comparable key to values.
//!
//! Unique indices reject a second value for an equal key. Indices that
//! allow duplicates keep equal keys in insertion order. Range lookups are
//! inclusive on both ends and logarithmic to start; iteration is linear in
//! the size of the result.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::CoreError;

/// Iteration order for range lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Text key compared case-insensitively, codepoint by codepoint of its
/// lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextKey(String);

impl TextKey {
    pub fn new(text: &str) -> Self {
        Self(text.chars().flat_map(char::to_lowercase).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn contains(&self, needle: &TextKey) -> bool {
        self.0.contains(needle.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OrderedIndex<K, V> {
    entries: BTreeMap<K, Vec<V>>,
    unique: bool,
    len: usize,
}

impl<K: Ord, V> OrderedIndex<K, V> {
    /// Index where every key maps to at most one value.
    pub fn unique() -> Self {
        Self {
            entries: BTreeMap::new(),
            unique: true,
            len: 0,
        }
    }

    /// Index where equal keys are kept in insertion order.
    pub fn with_duplicates() -> Self {
        Self {
            entries: BTreeMap::new(),
            unique: false,
            len: 0,
        }
    }

    pub fn insert(&mut self, key: K, value: V) -> Result<(), CoreError> {
        let bucket = self.entries.entry(key).or_default();
        if self.unique && !bucket.is_empty() {
            return Err(CoreError::DuplicateKey);
        }
        bucket.push(value);
        self.len += 1;
        Ok(())
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|bucket| bucket.first())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all(&self, key: &K) -> &[V] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Values with `lower <= key <= upper`. A missing bound leaves that side
    /// open. An inverted range is empty.
    pub fn range(&self, lower: Option<&K>, upper: Option<&K>, order: Order) -> Vec<&V> {
        if let (Some(lower), Some(upper)) = (lower, upper) {
            if lower > upper {
                return Vec::new();
            }
        }

        let bounds = (
            lower.map_or(Bound::Unbounded, Bound::Included),
            upper.map_or(Bound::Unbounded, Bound::Included),
        );
        let values = self
            .entries
            .range::<K, _>(bounds)
            .flat_map(|(_, bucket)| bucket.iter());

        match order {
            Order::Ascending => values.collect(),
            Order::Descending => values.rev().collect(),
        }
    }

    /// Every value in key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .flat_map(|(key, bucket)| bucket.iter().map(move |value| (key, value)))
    }

    /// Smallest key's first value.
    pub fn first(&self) -> Option<&V> {
        self.entries
            .first_key_value()
            .and_then(|(_, bucket)| bucket.first())
    }

    /// Largest key's last value.
    pub fn last(&self) -> Option<&V> {
        self.entries
            .last_key_value()
            .and_then(|(_, bucket)| bucket.last())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<K: Ord, V: PartialEq> OrderedIndex<K, V> {
    /// Remove one occurrence of `value` under `key`. Returns whether it was
    /// present.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some(bucket) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|v| v == value) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.entries.remove(key);
        }
        self.len -= 1;
        true
    }
}
