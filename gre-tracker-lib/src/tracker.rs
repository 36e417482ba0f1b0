use ahash::RandomState;
use hashlink::LinkedHashMap;

pub mod session;

/// Trait for types that have an intrinsic timestamp
pub trait Trackable {
    type Timestamp: PartialOrd + Clone;

    fn timestamp(&self) -> Self::Timestamp;
    fn set_timestamp(&mut self, ts: Self::Timestamp);
}

/// Recency-ordered tracker for types that have an intrinsic timestamp.
///
/// Entries are kept in touch order: the front is the entry touched least
/// recently, the back the one touched last. As long as callers touch with
/// non-decreasing timestamps, the order is also the timestamp order.
pub struct Tracker<K, V: Trackable> {
    lru: LinkedHashMap<K, V, RandomState>,
}

impl<K, V> Default for Tracker<K, V>
where
    K: Eq + std::hash::Hash + Clone,
    V: Trackable,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Tracker<K, V>
where
    K: Eq + std::hash::Hash + Clone,
    V: Trackable,
{
    #[inline]
    pub fn new() -> Self {
        Tracker {
            lru: LinkedHashMap::with_hasher(RandomState::new()),
        }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Tracker {
            lru: LinkedHashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Insert-or-touch.
    ///
    /// An existing entry is moved to the back and gets `ts`; otherwise a new
    /// entry is created at the back with `create`. The flag is `true` when
    /// the entry was created by this call.
    #[inline]
    pub fn touch_or_insert_with<F>(&mut self, key: &K, ts: V::Timestamp, create: F) -> (&mut V, bool)
    where
        F: FnOnce() -> V,
    {
        let created = !self.lru.contains_key(key);
        let v = if created {
            self.lru.entry(key.clone()).or_insert_with(create)
        } else {
            self.lru.to_back(key).unwrap()
        };
        v.set_timestamp(ts);
        (v, created)
    }

    /// Remove every entry matching `evict`, returning them in lru order.
    ///
    /// The whole map is visited, so the result does not depend on the
    /// timestamps having been touched in order.
    pub fn evict_where<F>(&mut self, mut evict: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let keys: Vec<K> = self
            .lru
            .iter()
            .filter(|(k, v)| evict(k, v))
            .map(|(k, _)| k.clone())
            .collect();

        keys.into_iter()
            .filter_map(|k| self.lru.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Remove a specific entry by key
    #[inline]
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.lru.remove(key)
    }

    /// Get a reference to the value
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.lru.get(key)
    }

    /// Iterator over entries (from least to most recently touched)
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.lru.iter()
    }

    /// Remove every entry, returning them in lru order
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.lru.len());
        while let Some(kv) = self.lru.pop_front() {
            out.push(kv);
        }
        out
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.lru.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }
}
