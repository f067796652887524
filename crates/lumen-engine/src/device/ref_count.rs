use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Outcome of [`RefCountCache::release`].
#[derive(Debug, PartialEq, Eq)]
pub enum Release<V> {
    /// Other holders remain; carries the remaining count.
    Retained(usize),
    /// That was the last reference. The entry is gone and the value is handed
    /// back for destruction.
    Last(V),
    /// No entry under that key.
    Missing,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    refs: usize,
}

/// Keyed values with explicit acquire/release reference counting.
#[derive(Debug)]
pub struct RefCountCache<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> Default for RefCountCache<K, V> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<K: Eq + Hash, V> RefCountCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` holding one reference. Replaces any previous entry.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, Entry { value, refs: 1 });
    }

    /// Adds a reference to an existing entry.
    pub fn acquire<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let entry = self.entries.get_mut(key)?;
        entry.refs += 1;
        Some(&entry.value)
    }

    pub fn release<Q>(&mut self, key: &Q) -> Release<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let Some(entry) = self.entries.get_mut(key) else {
            return Release::Missing;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return Release::Retained(entry.refs);
        }
        match self.entries.remove(key) {
            Some(entry) => Release::Last(entry.value),
            None => Release::Missing,
        }
    }

    pub fn refs<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).map_or(0, |e| e.refs)
    }

    #[inline]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the cache, yielding every value regardless of its count.
    pub fn drain(&mut self) -> impl Iterator<Item = V> + '_ {
        self.entries.drain().map(|(_, e)| e.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_release_hands_back_value_once() {
        let mut cache: RefCountCache<String, u32> = RefCountCache::new();
        cache.insert("vs".to_owned(), 7);
        assert_eq!(cache.acquire("vs"), Some(&7));
        assert_eq!(cache.acquire("vs"), Some(&7));
        assert_eq!(cache.refs("vs"), 3);

        assert_eq!(cache.release("vs"), Release::Retained(2));
        assert_eq!(cache.release("vs"), Release::Retained(1));
        assert_eq!(cache.release("vs"), Release::Last(7));
        assert!(!cache.contains("vs"));
        assert_eq!(cache.release("vs"), Release::Missing);
    }

    #[test]
    fn acquire_missing_is_none() {
        let mut cache: RefCountCache<String, u32> = RefCountCache::new();
        assert_eq!(cache.acquire("nope"), None);
        assert!(cache.is_empty());
    }
}
