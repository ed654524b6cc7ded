//! A [CostBasedLru] is an Lru cache which uses the cost of the items in the cache to decide when to evict.
//!
//! This is implemented as a vec-backed doubly linked list of slots, plus an auxiliary hash-based index from keys to
//! slots.  Values live behind `Arc` so that a reader can keep using a value after it has been evicted.
//!
//! This type is not synchronized; [crate::MetadataCache] puts one behind a mutex per mapping.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;

struct Occupied<K, V> {
    key: K,
    value: Arc<V>,
    /// Towards the most recently used end.
    newer: Option<usize>,
    /// Towards the least recently used end.
    older: Option<usize>,
    cost: u64,
}

enum Slot<K, V> {
    /// Free, possibly pointing at the next free slot.
    Free { next_free: Option<usize> },
    Occupied(Occupied<K, V>),
}

impl<K, V> Slot<K, V> {
    fn occupied(&self) -> &Occupied<K, V> {
        match self {
            Slot::Occupied(x) => x,
            Slot::Free { .. } => panic!("Slot should be occupied"),
        }
    }

    fn occupied_mut(&mut self) -> &mut Occupied<K, V> {
        match self {
            Slot::Occupied(x) => x,
            Slot::Free { .. } => panic!("Slot should be occupied"),
        }
    }
}

/// What happened during an [CostBasedLru::insert].
#[derive(Debug)]
pub struct InsertOutcome<V> {
    /// The value previously stored under the same key, if any.
    pub replaced: Option<Arc<V>>,
    /// How many other entries were evicted to get back under budget.
    pub evicted: usize,
    /// Whether the inserted value itself survived.  It does not when its cost alone exceeds the budget.
    pub retained: bool,
}

pub struct CostBasedLru<K, V> {
    slots: Vec<Slot<K, V>>,
    index: HashMap<K, usize, RandomState>,
    /// At what cost do we start evicting?
    max_cost: u64,
    most_recent: Option<usize>,
    least_recent: Option<usize>,
    free_head: Option<usize>,
    /// Current cost of the items in the cache.
    current_cost: u64,
}

impl<K: Hash + Eq + Clone, V> CostBasedLru<K, V> {
    pub fn new(max_cost: u64) -> CostBasedLru<K, V> {
        CostBasedLru {
            slots: Default::default(),
            index: Default::default(),
            max_cost,
            most_recent: None,
            least_recent: None,
            free_head: None,
            current_cost: 0,
        }
    }

    pub fn max_cost(&self) -> u64 {
        self.max_cost
    }

    pub fn current_cost(&self) -> u64 {
        self.current_cost
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Take an occupied slot out of the recency list without freeing it.
    fn detach(&mut self, slot: usize) {
        let (newer, older) = {
            let o = self.slots[slot].occupied();
            (o.newer, o.older)
        };

        match newer {
            Some(n) => self.slots[n].occupied_mut().older = older,
            None => self.most_recent = older,
        }
        match older {
            Some(o) => self.slots[o].occupied_mut().newer = newer,
            None => self.least_recent = newer,
        }

        let o = self.slots[slot].occupied_mut();
        o.newer = None;
        o.older = None;
    }

    /// Link a detached occupied slot in as the most recent entry.
    fn attach_front(&mut self, slot: usize) {
        let old_front = self.most_recent;
        {
            let o = self.slots[slot].occupied_mut();
            o.newer = None;
            o.older = old_front;
        }
        match old_front {
            Some(f) => self.slots[f].occupied_mut().newer = Some(slot),
            None => self.least_recent = Some(slot),
        }
        self.most_recent = Some(slot);
    }

    /// Get a value, marking it as the most recently used.
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        let slot = *self.index.get(key)?;
        self.detach(slot);
        self.attach_front(slot);
        Some(self.slots[slot].occupied().value.clone())
    }

    /// Get a value without touching its recency.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let slot = *self.index.get(key)?;
        Some(self.slots[slot].occupied().value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Free a slot, returning what it held.
    fn release(&mut self, slot: usize) -> Occupied<K, V> {
        self.detach(slot);
        let freed = std::mem::replace(
            &mut self.slots[slot],
            Slot::Free {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(slot);
        match freed {
            Slot::Occupied(o) => {
                self.index.remove(&o.key);
                self.current_cost -= o.cost;
                o
            }
            Slot::Free { .. } => panic!("Should have been occupied"),
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        let slot = *self.index.get(key)?;
        Some(self.release(slot).value)
    }

    /// Find a free slot, or grow the backing vec if necessary.
    fn take_free(&mut self) -> usize {
        if let Some(f) = self.free_head {
            self.free_head = match self.slots[f] {
                Slot::Free { next_free } => next_free,
                Slot::Occupied(_) => panic!("Free list points at an occupied slot"),
            };
            return f;
        }

        self.slots.push(Slot::Free { next_free: None });
        self.slots.len() - 1
    }

    /// Add an entry as the most recent one, then evict from the least recent end until the cache is back under budget.
    pub fn insert(&mut self, key: K, value: Arc<V>, cost: u64) -> InsertOutcome<V> {
        let replaced = self.remove(&key);
        let slot = self.take_free();

        self.slots[slot] = Slot::Occupied(Occupied {
            key: key.clone(),
            value,
            newer: None,
            older: None,
            cost,
        });
        self.attach_front(slot);
        self.index.insert(key.clone(), slot);
        self.current_cost += cost;

        let mut evicted = self.evict_to(self.max_cost);
        let retained = self.index.contains_key(&key);
        if !retained {
            // The new entry went out with the rest; don't count it as someone else's eviction.
            evicted -= 1;
        }

        InsertOutcome {
            replaced,
            evicted,
            retained,
        }
    }

    /// Evict least recently used entries until the total cost is at most `budget`.  Returns how many were evicted.
    pub fn evict_to(&mut self, budget: u64) -> usize {
        let mut evicted = 0;
        while self.current_cost > budget {
            let tail = self
                .least_recent
                .expect("Not enough entries to explain cost");
            self.release(tail);
            evicted += 1;
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.most_recent = None;
        self.least_recent = None;
        self.free_head = None;
        self.current_cost = 0;
    }

    /// Iterator visiting entries in most-recently-used order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut cursor = self.most_recent;
        std::iter::from_fn(move || {
            let at = cursor?;
            let o = self.slots[at].occupied();
            cursor = o.older;
            Some((&o.key, &*o.value))
        })
    }
}
