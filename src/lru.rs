// Grounded on fuurin's LRUCache<K,V> (include/fuurin/lrucache.h): an
// insertion-ordered map with a fixed capacity, where revisiting a key moves
// it to the most-recently-used end and overflow evicts from the other end.

use std::collections::HashMap;
use std::hash::Hash;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded, insertion-ordered cache. A capacity of 0 means unbounded.
///
/// Backed by a `Vec<Node>` arena plus a `HashMap<K, usize>` index, since
/// `std` has no intrusive doubly-linked list; slots freed by eviction are
/// reused via `free` so the arena doesn't grow unboundedly under churn.
pub struct LruCache<K, V> {
    capacity: usize,
    nodes: Vec<Option<Node<K, V>>>,
    index: HashMap<K, usize>,
    free: Vec<usize>,
    head: Option<usize>, // least-recently-used
    tail: Option<usize>, // most-recently-used
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> LruCache<K, V> {
        LruCache {
            capacity,
            nodes: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = {
            let n = self.nodes[slot].as_ref().unwrap();
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_tail(&mut self, slot: usize) {
        let old_tail = self.tail;
        {
            let n = self.nodes[slot].as_mut().unwrap();
            n.prev = old_tail;
            n.next = None;
        }
        if let Some(t) = old_tail {
            self.nodes[t].as_mut().unwrap().next = Some(slot);
        } else {
            self.head = Some(slot);
        }
        self.tail = Some(slot);
    }

    fn evict_head(&mut self) {
        if let Some(h) = self.head {
            self.detach(h);
            let node = self.nodes[h].take().unwrap();
            self.index.remove(&node.key);
            self.free.push(h);
        }
    }

    /// Inserts or updates `key`, moving it to the most-recently-used
    /// position. Evicts the least-recently-used entry if the cache is at
    /// capacity and `key` is new.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(&slot) = self.index.get(&key) {
            self.detach(slot);
            self.nodes[slot].as_mut().unwrap().value = value;
            self.push_tail(slot);
            return;
        }

        if self.capacity > 0 && self.index.len() >= self.capacity {
            self.evict_head();
        }

        let slot = match self.free.pop() {
            Some(s) => s,
            None => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        };
        self.nodes[slot] = Some(Node { key: key.clone(), value, prev: None, next: None });
        self.index.insert(key, slot);
        self.push_tail(slot);
    }

    /// Looks up `key` without changing its recency.
    pub fn find(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.nodes[slot].as_ref().unwrap().value)
    }

    /// Removes and returns the value for `key`, if present.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.detach(slot);
        let node = self.nodes[slot].take().unwrap();
        self.free.push(slot);
        Some(node.value)
    }

    /// Returns the most-recently-used value, without changing recency.
    pub fn back(&self) -> Option<&V> {
        self.tail.map(|slot| &self.nodes[slot].as_ref().unwrap().value)
    }

    /// Iterates values from least- to most-recently-used.
    pub fn list(&self) -> impl Iterator<Item = &V> {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let slot = cur?;
            let node = self.nodes[slot].as_ref().unwrap();
            cur = node.next;
            Some(&node.value)
        })
    }

    /// Iterates keys in the same order as [`LruCache::list`].
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let slot = cur?;
            let node = self.nodes[slot].as_ref().unwrap();
            cur = node.next;
            Some(&node.key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_evicts_least_recently_used_at_capacity() {
        let mut c = LruCache::new(2);
        c.put(1, "a");
        c.put(2, "b");
        c.put(3, "c");
        assert_eq!(None, c.find(&1));
        assert_eq!(Some(&"b"), c.find(&2));
        assert_eq!(Some(&"c"), c.find(&3));
    }

    #[test]
    fn put_of_existing_key_moves_it_to_most_recently_used() {
        let mut c = LruCache::new(2);
        c.put(1, "a");
        c.put(2, "b");
        c.put(1, "a2");
        c.put(3, "c");
        assert_eq!(None, c.find(&2));
        assert_eq!(Some(&"a2"), c.find(&1));
        assert_eq!(Some(&"c"), c.find(&3));
    }

    #[test]
    fn get_removes_and_returns() {
        let mut c = LruCache::new(0);
        c.put("k", 42);
        assert_eq!(Some(42), c.get(&"k"));
        assert_eq!(None, c.find(&"k"));
    }

    #[test]
    fn find_does_not_reorder() {
        let mut c = LruCache::new(2);
        c.put(1, "a");
        c.put(2, "b");
        assert_eq!(Some(&"a"), c.find(&1));
        c.put(3, "c");
        // 1 was least-recently-used despite the find() above, since find
        // must not affect recency.
        assert_eq!(None, c.find(&1));
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let mut c = LruCache::new(0);
        for i in 0..1000 {
            c.put(i, i);
        }
        assert_eq!(1000, c.len());
    }

    #[test]
    fn back_returns_most_recently_inserted() {
        let mut c = LruCache::new(0);
        c.put(1, "a");
        c.put(2, "b");
        assert_eq!(Some(&"b"), c.back());
    }
}
