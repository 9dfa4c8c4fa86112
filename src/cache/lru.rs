//! Fixed-capacity key/value cache with least-recently-used eviction.
//!
//! Entries live in a dense slot vector and are chained newest-to-oldest by
//! slot index, so promotion and eviction are O(1) without reference cycles.
//! A `HashMap` maps keys to their slot.
//!
//! Each entry has a cost (1 by default, or the result of a caller-supplied
//! cost function such as the byte length of a blob). The capacity bounds the
//! sum of all costs, so the same cache can be limited by entry count or by
//! memory.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::CacheError;

/// Computes the cost of a value against the cache capacity.
pub type CostFn<V> = Box<dyn Fn(&V) -> usize + Send + Sync>;

/// Called once for every entry evicted by capacity pressure.
pub type EvictionHook<K, V> = Box<dyn FnMut(K, V) + Send>;

struct Entry<K, V> {
    key: K,
    value: V,
    cost: usize,
    /// Slot of the next entry towards the oldest end
    older: Option<usize>,
    /// Slot of the next entry towards the newest end
    newer: Option<usize>,
}

/// LRU cache bounded by the total cost of its entries.
///
/// The cache itself is not synchronized; wrap it in a lock to share it
/// between tasks (see [`TileTreeCache`](super::TileTreeCache)).
///
/// # Example
///
/// ```
/// use geodata_tiles::cache::EvictionCache;
///
/// let mut cache = EvictionCache::new(2);
/// cache.set("a", 1).unwrap();
/// cache.set("b", 2).unwrap();
/// cache.get(&"a");
/// cache.set("c", 3).unwrap();
///
/// // "b" was the least recently used entry
/// assert!(!cache.contains(&"b"));
/// assert_eq!(cache.newest(), Some((&"c", &3)));
/// ```
pub struct EvictionCache<K, V> {
    slots: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    newest: Option<usize>,
    oldest: Option<usize>,
    capacity: usize,
    current_size: usize,
    cost_fn: Option<CostFn<V>>,
    on_evict: Option<EvictionHook<K, V>>,
}

impl<K: Hash + Eq + Clone, V> EvictionCache<K, V> {
    /// Create a cache where every entry costs 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            newest: None,
            oldest: None,
            capacity,
            current_size: 0,
            cost_fn: None,
            on_evict: None,
        }
    }

    /// Create a cache whose entries cost `cost_fn(value)`.
    pub fn with_cost_fn(
        capacity: usize,
        cost_fn: impl Fn(&V) -> usize + Send + Sync + 'static,
    ) -> Self {
        let mut cache = Self::new(capacity);
        cache.cost_fn = Some(Box::new(cost_fn));
        cache
    }

    /// Install the hook called for each entry evicted by capacity pressure.
    ///
    /// The hook is not called for entries replaced in place, removed
    /// explicitly, or dropped by [`clear`](Self::clear).
    pub fn set_eviction_hook(&mut self, hook: impl FnMut(K, V) + Send + 'static) {
        self.on_evict = Some(Box::new(hook));
    }

    /// Insert or replace a value and mark it as the newest entry.
    ///
    /// Fails without touching the cache if the value alone costs more than
    /// the capacity. Otherwise evicts from the oldest end until the total
    /// cost fits.
    pub fn set(&mut self, key: K, value: V) -> Result<(), CacheError> {
        let cost = self.cost_of(&value);
        if cost > self.capacity {
            return Err(CacheError::Capacity {
                cost,
                capacity: self.capacity,
            });
        }

        if let Some(&slot) = self.index.get(&key) {
            let entry = self.entry_mut(slot);
            let old_cost = entry.cost;
            entry.value = value;
            entry.cost = cost;
            self.current_size = self.current_size - old_cost + cost;
            self.promote(slot);
        } else {
            let slot = self.alloc(Entry {
                key: key.clone(),
                value,
                cost,
                older: None,
                newer: None,
            });
            self.push_newest(slot);
            self.index.insert(key, slot);
            self.current_size += cost;
        }

        self.evict_to_capacity();
        Ok(())
    }

    /// Get a value and mark it as the newest entry.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.promote(slot);
        Some(&self.entry(slot).value)
    }

    /// Get a value without changing its position.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        Some(&self.entry(slot).value)
    }

    /// Membership test without promotion.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Remove an entry without calling the eviction hook.
    ///
    /// Returns the removed value, or `None` if the key was absent.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.index.remove(key)?;
        let entry = self.take(slot);
        Some(entry.value)
    }

    /// The least recently used entry, without promotion.
    pub fn oldest(&self) -> Option<(&K, &V)> {
        self.oldest.map(|slot| {
            let entry = self.entry(slot);
            (&entry.key, &entry.value)
        })
    }

    /// The most recently used entry, without promotion.
    pub fn newest(&self) -> Option<(&K, &V)> {
        self.newest.map(|slot| {
            let entry = self.entry(slot);
            (&entry.key, &entry.value)
        })
    }

    /// Change the capacity, evicting down to it if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict_to_capacity();
    }

    /// Drop every entry. The eviction hook is not called.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.newest = None;
        self.oldest = None;
        self.current_size = 0;
    }

    /// Iterate newest to oldest. Each call starts a fresh walk.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            next: self.newest,
            remaining: self.index.len(),
        }
    }

    /// Keys from newest to oldest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Call `f` for every entry, newest first.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for (k, v) in self.iter() {
            f(k, v);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum total cost.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of the costs of all present entries.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    fn cost_of(&self, value: &V) -> usize {
        self.cost_fn.as_ref().map_or(1, |f| f(value))
    }

    fn evict_to_capacity(&mut self) {
        while self.current_size > self.capacity {
            let Some(slot) = self.oldest else {
                break;
            };
            let entry = self.take(slot);
            self.index.remove(&entry.key);
            if let Some(hook) = self.on_evict.as_mut() {
                hook(entry.key, entry.value);
            }
        }
    }

    fn entry(&self, slot: usize) -> &Entry<K, V> {
        self.slots[slot]
            .as_ref()
            .unwrap_or_else(|| unreachable!("slot {slot} is linked but empty"))
    }

    fn entry_mut(&mut self, slot: usize) -> &mut Entry<K, V> {
        self.slots[slot]
            .as_mut()
            .unwrap_or_else(|| unreachable!("slot {slot} is linked but empty"))
    }

    fn alloc(&mut self, entry: Entry<K, V>) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(entry);
            slot
        } else {
            self.slots.push(Some(entry));
            self.slots.len() - 1
        }
    }

    /// Unlink a slot, free it and return its entry. Does not touch `index`.
    fn take(&mut self, slot: usize) -> Entry<K, V> {
        self.unlink(slot);
        let entry = self.slots[slot]
            .take()
            .unwrap_or_else(|| unreachable!("slot {slot} is linked but empty"));
        self.free.push(slot);
        self.current_size -= entry.cost;
        entry
    }

    fn unlink(&mut self, slot: usize) {
        let (older, newer) = {
            let entry = self.entry(slot);
            (entry.older, entry.newer)
        };

        match newer {
            Some(n) => self.entry_mut(n).older = older,
            None => self.newest = older,
        }
        match older {
            Some(o) => self.entry_mut(o).newer = newer,
            None => self.oldest = newer,
        }

        let entry = self.entry_mut(slot);
        entry.older = None;
        entry.newer = None;
    }

    fn push_newest(&mut self, slot: usize) {
        let previous = self.newest;
        {
            let entry = self.entry_mut(slot);
            entry.older = previous;
            entry.newer = None;
        }
        match previous {
            Some(p) => self.entry_mut(p).newer = Some(slot),
            None => self.oldest = Some(slot),
        }
        self.newest = Some(slot);
    }

    fn promote(&mut self, slot: usize) {
        if self.newest == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_newest(slot);
    }
}

impl<K, V> fmt::Debug for EvictionCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictionCache")
            .field("len", &self.index.len())
            .field("capacity", &self.capacity)
            .field("current_size", &self.current_size)
            .field("has_cost_fn", &self.cost_fn.is_some())
            .field("has_eviction_hook", &self.on_evict.is_some())
            .finish()
    }
}

/// Newest-to-oldest iterator over an [`EvictionCache`].
pub struct Iter<'a, K, V> {
    cache: &'a EvictionCache<K, V>,
    next: Option<usize>,
    remaining: usize,
}

impl<'a, K: Hash + Eq + Clone, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        let entry = self.cache.entry(slot);
        self.next = entry.older;
        self.remaining = self.remaining.saturating_sub(1);
        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K: Hash + Eq + Clone, V> IntoIterator for &'a EvictionCache<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
