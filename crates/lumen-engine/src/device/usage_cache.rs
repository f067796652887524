use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::hash::Hash;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    used: bool,
}

/// Keyed values kept alive while they are used, frame to frame.
///
/// Typical per-frame cycle:
/// 1) [`mark_all_unused`](Self::mark_all_unused)
/// 2) [`get_or_insert_with`](Self::get_or_insert_with) for everything the
///    frame needs (hits are reused, misses are created)
/// 3) [`remove_unused`](Self::remove_unused) to destroy what was not asked for
///
/// Fresh entries start out used.
#[derive(Debug)]
pub struct UsageCache<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> Default for UsageCache<K, V> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<K: Eq + Hash, V> UsageCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value under `key`, creating it on a miss. Marks it used.
    pub fn get_or_insert_with(&mut self, key: K, create: impl FnOnce(&K) -> V) -> &mut V {
        match self.try_get_or_insert_with(key, |k| Ok::<_, core::convert::Infallible>(create(k))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with) for fallible
    /// creation. Nothing is stored when `create` fails.
    pub fn try_get_or_insert_with<E>(
        &mut self,
        key: K,
        create: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<&mut V, E> {
        let entry = match self.entries.entry(key) {
            MapEntry::Occupied(o) => o.into_mut(),
            MapEntry::Vacant(v) => {
                let value = create(v.key())?;
                v.insert(Entry { value, used: true })
            }
        };
        entry.used = true;
        Ok(&mut entry.value)
    }

    /// Looks up without touching the used flag.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn is_used<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).is_some_and(|e| e.used)
    }

    /// `false` if there is no entry under `key`.
    pub fn mark_unused<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        match self.entries.get_mut(key) {
            Some(e) => {
                e.used = false;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_unused(&mut self) {
        for e in self.entries.values_mut() {
            e.used = false;
        }
    }

    /// Removes one entry and hands its value back.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Removes every entry not marked used since the last
    /// [`mark_all_unused`](Self::mark_all_unused), passing each to
    /// `on_remove`. Returns how many were removed.
    pub fn remove_unused(&mut self, mut on_remove: impl FnMut(K, V)) -> usize {
        let before = self.entries.len();
        let kept = HashMap::with_capacity(before);
        for (key, e) in std::mem::replace(&mut self.entries, kept) {
            if e.used {
                self.entries.insert(key, e);
            } else {
                on_remove(key, e.value);
            }
        }
        before - self.entries.len()
    }

    /// Removes everything, passing each entry to `on_remove`.
    pub fn remove_all(&mut self, mut on_remove: impl FnMut(K, V)) {
        for (key, e) in self.entries.drain() {
            on_remove(key, e.value);
        }
    }

    pub fn for_each_used(&self, mut visit: impl FnMut(&K, &V)) {
        for (key, e) in self.entries.iter().filter(|(_, e)| e.used) {
            visit(key, &e.value);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
