//! OrderedKeyedList: insertion-ordered map with O(1) keyed access.
//!
//! A doubly linked list whose nodes live in an arena of slots. `prev`/`next`
//! links are slot indices, and a `HashMap<K, usize>` maps each key to its
//! slot, so every single-key operation (insert at either end, lookup,
//! update, delete, pop head/tail) is O(1).
//!
//! Semantics shared by every caller:
//! - Inserting a key that is already present is a silent no-op (the
//!   insert methods report whether anything was added).
//! - Deleting a missing key or popping an empty list is a silent no-op
//!   returning `None`. Callers use these as lookups; absence is never an error.
//! - Freed slots are recycled, so slot indices are only meaningful while the
//!   key they belong to is resident.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

// ─── Node ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

// ─── OrderedKeyedList ───────────────────────────────────────────────────────

/// Insertion-ordered container keyed by an opaque identifier.
#[derive(Clone)]
pub struct OrderedKeyedList<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K, V> Default for OrderedKeyedList<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for OrderedKeyedList<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> OrderedKeyedList<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn has(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.node(idx).map(|n| &n.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.node_mut(idx).map(|n| &mut n.value)
    }

    /// Value at the head (oldest insertion at the end, or latest `push_front`).
    pub fn first(&self) -> Option<&V> {
        self.head.and_then(|idx| self.node(idx)).map(|n| &n.value)
    }

    /// Value at the tail.
    pub fn last(&self) -> Option<&V> {
        self.tail.and_then(|idx| self.node(idx)).map(|n| &n.value)
    }

    pub fn first_key(&self) -> Option<&K> {
        self.head.and_then(|idx| self.node(idx)).map(|n| &n.key)
    }

    pub fn last_key(&self) -> Option<&K> {
        self.tail.and_then(|idx| self.node(idx)).map(|n| &n.key)
    }

    // ─── Insertion ──────────────────────────────────────────────────────

    /// Append at the tail. Returns `false` (and drops `value`) if `key` exists.
    pub fn push_end(&mut self, key: K, value: V) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let idx = self.alloc(key, value);
        self.link_after(self.tail, idx);
        true
    }

    /// Insert at the head. Returns `false` (and drops `value`) if `key` exists.
    pub fn push_front(&mut self, key: K, value: V) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let idx = self.alloc(key, value);
        self.link_after(None, idx);
        true
    }

    /// Append many entries at the tail, in iteration order.
    ///
    /// Returns how many were actually inserted.
    pub fn push_end_many<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut inserted = 0;
        for (key, value) in items {
            if self.push_end(key, value) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Insert many entries at the head, keeping their iteration order.
    ///
    /// `[a, b]` pushed in front of `[c]` yields `[a, b, c]`. Returns how many
    /// were actually inserted.
    pub fn push_front_many<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut anchor: Option<usize> = None;
        let mut inserted = 0;
        for (key, value) in items {
            if self.index.contains_key(&key) {
                continue;
            }
            let idx = self.alloc(key, value);
            self.link_after(anchor, idx);
            anchor = Some(idx);
            inserted += 1;
        }
        inserted
    }

    // ─── Mutation ───────────────────────────────────────────────────────

    /// Replace the value stored under `key` in place. No-op if absent.
    pub fn update(&mut self, key: &K, value: V) -> bool {
        match self.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Remove `key`, returning its value. No-op if absent.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.unlink(idx).map(|n| n.value)
    }

    /// Pop the head entry.
    pub fn remove_first(&mut self) -> Option<V> {
        self.remove_first_entry().map(|(_, v)| v)
    }

    /// Pop the head entry together with its key.
    pub fn remove_first_entry(&mut self) -> Option<(K, V)> {
        let idx = self.head?;
        self.unlink(idx).map(|n| (n.key, n.value))
    }

    /// Pop the tail entry.
    pub fn remove_last(&mut self) -> Option<V> {
        let idx = self.tail?;
        self.unlink(idx).map(|n| n.value)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    // ─── Reads ──────────────────────────────────────────────────────────

    /// Keys in head → tail order.
    pub fn ids(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Forward iterator over `(key, value)` pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len(),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Materialize all values, head → tail.
    pub fn to_vec(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.values().cloned().collect()
    }

    /// Values at positions `start..end` (head is position 0), clamped to the
    /// list length. An inverted or out-of-range window yields an empty vec.
    pub fn get_range(&self, start: usize, end: usize) -> Vec<V>
    where
        V: Clone,
    {
        let end = end.min(self.len());
        if start >= end {
            return Vec::new();
        }
        self.values().skip(start).take(end - start).cloned().collect()
    }

    // ─── Arena plumbing ─────────────────────────────────────────────────

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn alloc(&mut self, key: K, value: V) -> usize {
        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, idx);
        idx
    }

    /// Link a freshly allocated slot after `anchor` (`None` = at the head).
    fn link_after(&mut self, anchor: Option<usize>, idx: usize) {
        let next = match anchor {
            Some(a) => self.node(a).and_then(|n| n.next),
            None => self.head,
        };

        if let Some(node) = self.node_mut(idx) {
            node.prev = anchor;
            node.next = next;
        }

        match anchor {
            Some(a) => {
                if let Some(node) = self.node_mut(a) {
                    node.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }

        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
    }

    fn unlink(&mut self, idx: usize) -> Option<Node<K, V>> {
        let node = self.slots.get_mut(idx)?.take()?;

        match node.prev {
            Some(p) => {
                if let Some(prev) = self.node_mut(p) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.node_mut(n) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.index.remove(&node.key);
        self.free.push(idx);
        Some(node)
    }
}

// ─── Iteration ──────────────────────────────────────────────────────────────

/// Head → tail iterator returned by [`OrderedKeyedList::iter`].
pub struct Iter<'a, K, V> {
    list: &'a OrderedKeyedList<K, V>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?)?;
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> where K: Eq + Hash + Clone {}

impl<'a, K, V> IntoIterator for &'a OrderedKeyedList<K, V>
where
    K: Eq + Hash + Clone,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn list_of(keys: &[&str]) -> OrderedKeyedList<String, usize> {
        let mut list = OrderedKeyedList::new();
        for (i, k) in keys.iter().enumerate() {
            list.push_end(k.to_string(), i);
        }
        list
    }

    #[test]
    fn test_push_end_and_front_order() {
        let mut list = OrderedKeyedList::new();
        list.push_end("b", 2);
        list.push_end("c", 3);
        list.push_front("a", 1);
        assert_eq!(list.ids(), vec!["a", "b", "c"]);
        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&3));
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let mut list = OrderedKeyedList::new();
        assert!(list.push_end("a", 1));
        assert!(!list.push_end("a", 99));
        assert!(!list.push_front("a", 42));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(&"a"), Some(&1));
    }

    #[test]
    fn test_delete_missing_key_is_noop() {
        let mut list = list_of(&["a", "b"]);
        assert_eq!(list.delete(&"zzz".to_string()), None);
        assert_eq!(list.len(), 2);
        assert_eq!(list.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_delete_middle_relinks_neighbours() {
        let mut list = list_of(&["a", "b", "c"]);
        assert_eq!(list.delete(&"b".to_string()), Some(1));
        assert_eq!(list.ids(), vec!["a", "c"]);
        // The freed slot is recycled without disturbing order.
        list.push_end("d".to_string(), 3);
        assert_eq!(list.ids(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_remove_first_and_last_on_empty() {
        let mut list: OrderedKeyedList<String, usize> = OrderedKeyedList::new();
        assert_eq!(list.remove_first(), None);
        assert_eq!(list.remove_last(), None);
        assert!(list.first().is_none());
    }

    #[test]
    fn test_remove_first_and_last() {
        let mut list = list_of(&["a", "b", "c"]);
        assert_eq!(list.remove_first(), Some(0));
        assert_eq!(list.remove_last(), Some(2));
        assert_eq!(list.ids(), vec!["b"]);
        assert_eq!(list.first_key(), list.last_key());
    }

    #[test]
    fn test_push_front_many_keeps_batch_order() {
        let mut list = list_of(&["c"]);
        let inserted = list.push_front_many(vec![
            ("a".to_string(), 10),
            ("b".to_string(), 11),
            ("a".to_string(), 12),
        ]);
        assert_eq!(inserted, 2);
        assert_eq!(list.ids(), vec!["a", "b", "c"]);
        assert_eq!(list.get(&"a".to_string()), Some(&10));
    }

    #[test]
    fn test_push_end_many_skips_existing() {
        let mut list = list_of(&["a"]);
        let inserted =
            list.push_end_many(vec![("a".to_string(), 5), ("b".to_string(), 6)]);
        assert_eq!(inserted, 1);
        assert_eq!(list.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_update_in_place() {
        let mut list = list_of(&["a", "b"]);
        assert!(list.update(&"a".to_string(), 100));
        assert!(!list.update(&"missing".to_string(), 1));
        assert_eq!(list.to_vec(), vec![100, 1]);
    }

    #[test]
    fn test_get_range_clamps() {
        let list = list_of(&["a", "b", "c", "d"]);
        assert_eq!(list.get_range(1, 3), vec![1, 2]);
        assert_eq!(list.get_range(2, 100), vec![2, 3]);
        assert!(list.get_range(3, 1).is_empty());
        assert!(list.get_range(10, 12).is_empty());
    }

    #[test]
    fn test_clear_resets() {
        let mut list = list_of(&["a", "b"]);
        list.clear();
        assert!(list.is_empty());
        assert!(list.first().is_none());
        list.push_end("x".to_string(), 1);
        assert_eq!(list.ids(), vec!["x"]);
    }

    #[test]
    fn test_iter_is_exact_size() {
        let list = list_of(&["a", "b", "c"]);
        assert_eq!(list.iter().len(), 3);
        let collected: Vec<_> = (&list).into_iter().map(|(_, v)| *v).collect();
        assert_eq!(collected, vec![0, 1, 2]);
    }

    #[test]
    fn test_thousands_of_nodes() {
        let mut list = OrderedKeyedList::new();
        for i in 0..5_000u32 {
            list.push_end(i, i);
        }
        for i in (0..5_000u32).step_by(2) {
            list.delete(&i);
        }
        assert_eq!(list.len(), 2_500);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&4_999));
    }

    // ─── Property tests ─────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    enum Op {
        PushEnd(u8),
        PushFront(u8),
        Delete(u8),
        RemoveFirst,
        RemoveLast,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16).prop_map(Op::PushEnd),
            (0u8..16).prop_map(Op::PushFront),
            (0u8..16).prop_map(Op::Delete),
            Just(Op::RemoveFirst),
            Just(Op::RemoveLast),
        ]
    }

    proptest! {
        #[test]
        fn order_matches_vec_model(ops in proptest::collection::vec(op_strategy(), 0..200)) {
            let mut list = OrderedKeyedList::new();
            let mut model: Vec<u8> = Vec::new();

            for op in ops {
                let len_before = list.len();
                match op {
                    Op::PushEnd(k) => {
                        let inserted = list.push_end(k, u32::from(k));
                        prop_assert_eq!(inserted, !model.contains(&k));
                        if inserted { model.push(k); }
                    }
                    Op::PushFront(k) => {
                        let inserted = list.push_front(k, u32::from(k));
                        prop_assert_eq!(inserted, !model.contains(&k));
                        if inserted { model.insert(0, k); }
                    }
                    Op::Delete(k) => {
                        let removed = list.delete(&k);
                        match model.iter().position(|m| *m == k) {
                            Some(pos) => {
                                model.remove(pos);
                                prop_assert_eq!(removed, Some(u32::from(k)));
                                prop_assert_eq!(list.len(), len_before - 1);
                            }
                            None => {
                                prop_assert_eq!(removed, None);
                                prop_assert_eq!(list.len(), len_before);
                            }
                        }
                    }
                    Op::RemoveFirst => {
                        let expected = if model.is_empty() { None } else { Some(model.remove(0)) };
                        prop_assert_eq!(list.remove_first(), expected.map(u32::from));
                    }
                    Op::RemoveLast => {
                        let expected = model.pop();
                        prop_assert_eq!(list.remove_last(), expected.map(u32::from));
                    }
                }
                prop_assert_eq!(list.ids(), model.clone());
                prop_assert_eq!(list.len(), model.len());
            }
        }
    }
}
