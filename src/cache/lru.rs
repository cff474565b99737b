//! LRU Index Module
//!
//! Bounded recency order used by the persistent store for eviction.

use std::collections::VecDeque;

// == LRU Index ==
/// Tracks key recency and reports which keys fall out of a bounded window.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default)]
pub struct LruIndex {
    order: VecDeque<String>,
    /// Maximum tracked keys, 0 = unbounded
    capacity: usize,
}

impl LruIndex {
    /// Creates an empty index. A capacity of 0 never evicts.
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            capacity,
        }
    }

    // == Touch ==
    /// Marks a key as most recently used and returns the keys pushed out
    /// of the window, least recent first.
    pub fn touch(&mut self, key: &str) -> Vec<String> {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(existing) = self.order.remove(pos) {
                self.order.push_front(existing);
            }
            return Vec::new();
        }

        self.order.push_front(key.to_string());

        let mut evicted = Vec::new();
        if self.capacity > 0 {
            while self.order.len() > self.capacity {
                match self.order.pop_back() {
                    Some(oldest) => evicted.push(oldest),
                    None => break,
                }
            }
        }
        evicted
    }

    // == Forget ==
    /// Drops a key from the index.
    pub fn forget(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Clear ==
    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Oldest First ==
    /// Keys ordered from least to most recently used.
    pub fn oldest_first(&self) -> impl Iterator<Item = &String> {
        self.order.iter().rev()
    }

    // == Capacity ==
    /// Returns the window size, 0 = unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn order(index: &LruIndex) -> Vec<&str> {
        index.oldest_first().map(String::as_str).collect()
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let mut index = LruIndex::new(0);
        for i in 0..1000 {
            assert!(index.touch(&format!("k{}", i)).is_empty());
        }
        assert_eq!(index.len(), 1000);
    }

    #[test]
    fn test_touch_evicts_least_recent() {
        let mut index = LruIndex::new(2);
        assert!(index.touch("a").is_empty());
        assert!(index.touch("b").is_empty());
        assert_eq!(index.touch("c"), vec!["a".to_string()]);
        assert_eq!(order(&index), vec!["b", "c"]);
    }

    #[test]
    fn test_retouch_refreshes_without_evicting() {
        let mut index = LruIndex::new(2);
        index.touch("a");
        index.touch("b");
        assert!(index.touch("a").is_empty());
        assert_eq!(index.touch("c"), vec!["b".to_string()]);
        assert_eq!(order(&index), vec!["a", "c"]);
    }

    #[test]
    fn test_forget_and_clear() {
        let mut index = LruIndex::new(3);
        index.touch("a");
        index.touch("b");
        index.forget("a");
        index.forget("missing");
        assert_eq!(order(&index), vec!["b"]);

        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.capacity(), 3);
    }
}
