//! B+ Tree Index for relstore
//!
//! This module implements an in-memory B+ tree mapping index keys to the set
//! of row identifiers that carry them. The tree maintains sorted data and
//! allows searches, ordered range scans, insertions and deletions in
//! O(log n) time.
//!
//! Separators are the first key of the right sibling at split time, so a key
//! equal to a separator always lives in the right subtree.

use std::cmp::Ordering;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::row_store::RowId;
use super::value::Value;

const ORDER: usize = 4;

/// A key in the B+ tree: one value per indexed column
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    /// Create a new index key from a single value
    pub fn new(value: Value) -> Self {
        Self(vec![value])
    }

    /// Create a new composite index key
    pub fn composite(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Does any component of the key hold NULL?
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }

    /// Compare two index keys lexicographically, column by column
    pub fn compare(&self, other: &IndexKey) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

// Equality follows the ordering, so INTEGER 2 and REAL 2.0 are the same key
impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// B+ Tree Node
#[derive(Debug, Clone, PartialEq)]
enum BPlusNode {
    /// Internal node with keys and child pointers
    Internal {
        keys: Vec<IndexKey>,
        children: Vec<BPlusNode>,
    },
    /// Leaf node with keys and their row id sets (sorted ascending)
    Leaf {
        keys: Vec<IndexKey>,
        values: Vec<Vec<RowId>>,
    },
}

impl BPlusNode {
    fn empty_leaf() -> Self {
        BPlusNode::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }
}

/// Position of the child that may contain `key`
fn child_index(keys: &[IndexKey], key: &IndexKey) -> usize {
    match keys.binary_search(key) {
        Ok(p) => p + 1,
        Err(p) => p,
    }
}

fn above_lower(key: &IndexKey, lower: Bound<&IndexKey>) -> bool {
    match lower {
        Bound::Included(s) => key >= s,
        Bound::Excluded(s) => key > s,
        Bound::Unbounded => true,
    }
}

fn below_upper(key: &IndexKey, upper: Bound<&IndexKey>) -> bool {
    match upper {
        Bound::Included(e) => key <= e,
        Bound::Excluded(e) => key < e,
        Bound::Unbounded => true,
    }
}

/// B+ Tree Index
#[derive(Debug, Clone)]
pub struct BPlusTree {
    /// Root node
    root: BPlusNode,
    /// Number of (key, row id) entries
    size: usize,
}

impl BPlusTree {
    /// Create a new empty B+ tree
    pub fn new() -> Self {
        Self {
            root: BPlusNode::empty_leaf(),
            size: 0,
        }
    }

    /// Add `row_id` under `key`. Returns false if the pair was already present.
    pub fn insert(&mut self, key: IndexKey, row_id: RowId) -> bool {
        let (added, split) = Self::insert_recursive(&mut self.root, key, row_id);

        if let Some((mid_key, new_node)) = split {
            // Root split, create new root
            let left = std::mem::replace(&mut self.root, BPlusNode::empty_leaf());
            self.root = BPlusNode::Internal {
                keys: vec![mid_key],
                children: vec![left, new_node],
            };
        }

        if added {
            self.size += 1;
        }
        added
    }

    fn insert_recursive(
        node: &mut BPlusNode,
        key: IndexKey,
        row_id: RowId,
    ) -> (bool, Option<(IndexKey, BPlusNode)>) {
        match node {
            BPlusNode::Leaf { keys, values } => match keys.binary_search(&key) {
                Ok(pos) => {
                    let ids = &mut values[pos];
                    match ids.binary_search(&row_id) {
                        Ok(_) => (false, None),
                        Err(i) => {
                            ids.insert(i, row_id);
                            (true, None)
                        }
                    }
                }
                Err(pos) => {
                    keys.insert(pos, key);
                    values.insert(pos, vec![row_id]);

                    if keys.len() > ORDER {
                        let mid = keys.len() / 2;
                        let new_keys = keys.split_off(mid);
                        let new_values = values.split_off(mid);
                        let mid_key = new_keys[0].clone();

                        return (
                            true,
                            Some((
                                mid_key,
                                BPlusNode::Leaf {
                                    keys: new_keys,
                                    values: new_values,
                                },
                            )),
                        );
                    }
                    (true, None)
                }
            },
            BPlusNode::Internal { keys, children } => {
                let pos = child_index(keys, &key);
                let (added, split) = Self::insert_recursive(&mut children[pos], key, row_id);

                if let Some((mid_key, new_node)) = split {
                    keys.insert(pos, mid_key);
                    children.insert(pos + 1, new_node);

                    if keys.len() > ORDER {
                        let mid = keys.len() / 2;
                        let new_keys = keys.split_off(mid + 1);
                        // keys now ends with the separator that moves up
                        let up_key = keys.remove(mid);
                        let new_children = children.split_off(mid + 1);

                        return (
                            added,
                            Some((
                                up_key,
                                BPlusNode::Internal {
                                    keys: new_keys,
                                    children: new_children,
                                },
                            )),
                        );
                    }
                }
                (added, None)
            }
        }
    }

    /// Row ids stored under exactly `key`, ascending
    pub fn search(&self, key: &IndexKey) -> &[RowId] {
        let mut curr = &self.root;
        loop {
            match curr {
                BPlusNode::Leaf { keys, values } => {
                    return match keys.binary_search(key) {
                        Ok(pos) => &values[pos],
                        Err(_) => &[],
                    };
                }
                BPlusNode::Internal { keys, children } => {
                    curr = &children[child_index(keys, key)];
                }
            }
        }
    }

    /// Remove `row_id` from under `key`. Returns false if it was not there.
    pub fn remove(&mut self, key: &IndexKey, row_id: RowId) -> bool {
        // Simplified deletion: entries are removed from the leaf only; nodes
        // are never merged, separators stay valid for routing.
        let removed = Self::remove_recursive(&mut self.root, key, row_id);
        if removed {
            self.size -= 1;
        }
        removed
    }

    fn remove_recursive(node: &mut BPlusNode, key: &IndexKey, row_id: RowId) -> bool {
        match node {
            BPlusNode::Leaf { keys, values } => {
                let Ok(pos) = keys.binary_search(key) else {
                    return false;
                };
                let ids = &mut values[pos];
                let Ok(i) = ids.binary_search(&row_id) else {
                    return false;
                };
                ids.remove(i);
                if ids.is_empty() {
                    keys.remove(pos);
                    values.remove(pos);
                }
                true
            }
            BPlusNode::Internal { keys, children } => {
                let pos = child_index(keys, key);
                Self::remove_recursive(&mut children[pos], key, row_id)
            }
        }
    }

    /// Range scan: row ids whose key lies within the bounds, in key order
    pub fn range(&self, lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> Vec<RowId> {
        let mut result = Vec::new();
        Self::range_recursive(
            &self.root,
            lower,
            upper,
            &mut |_: &IndexKey, ids: &[RowId]| result.extend_from_slice(ids),
        );
        result
    }

    fn range_recursive(
        node: &BPlusNode,
        lower: Bound<&IndexKey>,
        upper: Bound<&IndexKey>,
        visit: &mut dyn FnMut(&IndexKey, &[RowId]),
    ) {
        match node {
            BPlusNode::Leaf { keys, values } => {
                for (key, ids) in keys.iter().zip(values) {
                    if above_lower(key, lower) && below_upper(key, upper) {
                        visit(key, ids);
                    }
                }
            }
            BPlusNode::Internal { keys, children } => {
                let start_pos = match lower {
                    Bound::Included(s) | Bound::Excluded(s) => child_index(keys, s),
                    Bound::Unbounded => 0,
                };
                let end_pos = match upper {
                    Bound::Included(e) | Bound::Excluded(e) => child_index(keys, e),
                    Bound::Unbounded => keys.len(),
                };

                for child in children.iter().take(end_pos + 1).skip(start_pos) {
                    Self::range_recursive(child, lower, upper, visit);
                }
            }
        }
    }

    /// All entries in key order
    pub fn entries(&self) -> Vec<(IndexKey, Vec<RowId>)> {
        let mut result = Vec::new();
        Self::range_recursive(
            &self.root,
            Bound::Unbounded,
            Bound::Unbounded,
            &mut |key: &IndexKey, ids: &[RowId]| result.push((key.clone(), ids.to_vec())),
        );
        result
    }

    /// Number of (key, row id) entries in the tree
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Default for BPlusTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_key(i: i64) -> IndexKey {
        IndexKey::new(Value::Integer(i))
    }

    #[test]
    fn test_btree_insert_and_search() {
        let mut tree = BPlusTree::new();

        tree.insert(make_key(5), RowId(5));
        tree.insert(make_key(3), RowId(3));
        tree.insert(make_key(7), RowId(7));
        tree.insert(make_key(1), RowId(1));

        assert_eq!(tree.search(&make_key(5)), &[RowId(5)]);
        assert_eq!(tree.search(&make_key(3)), &[RowId(3)]);
        assert_eq!(tree.search(&make_key(7)), &[RowId(7)]);
        assert_eq!(tree.search(&make_key(1)), &[RowId(1)]);
        assert!(tree.search(&make_key(99)).is_empty());
    }

    #[test]
    fn test_btree_duplicate_keys_across_splits() {
        let mut tree = BPlusTree::new();

        for i in 0..40 {
            tree.insert(make_key(i % 10), RowId(i as u64));
        }
        assert_eq!(tree.len(), 40);

        for k in 0..10 {
            let ids = tree.search(&make_key(k));
            let expected: Vec<RowId> = (0..4).map(|j| RowId((k + 10 * j) as u64)).collect();
            assert_eq!(ids, expected.as_slice());
        }

        assert!(!tree.insert(make_key(3), RowId(3)));
        assert_eq!(tree.len(), 40);
    }

    #[test]
    fn test_btree_remove() {
        let mut tree = BPlusTree::new();

        for i in 1..=5 {
            tree.insert(make_key(i), RowId(i as u64));
        }
        tree.insert(make_key(3), RowId(30));

        assert!(tree.remove(&make_key(3), RowId(3)));
        assert_eq!(tree.search(&make_key(3)), &[RowId(30)]);
        assert!(tree.remove(&make_key(3), RowId(30)));
        assert!(tree.search(&make_key(3)).is_empty());
        assert!(!tree.remove(&make_key(3), RowId(30)));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_btree_range_scan() {
        let mut tree = BPlusTree::new();

        for i in [1, 3, 5, 7, 9, 11, 13, 15] {
            tree.insert(make_key(i), RowId(i as u64));
        }

        let inclusive = tree.range(
            Bound::Included(&make_key(5)),
            Bound::Included(&make_key(11)),
        );
        assert_eq!(inclusive, vec![RowId(5), RowId(7), RowId(9), RowId(11)]);

        let exclusive = tree.range(
            Bound::Excluded(&make_key(5)),
            Bound::Excluded(&make_key(11)),
        );
        assert_eq!(exclusive, vec![RowId(7), RowId(9)]);

        let tail = tree.range(Bound::Excluded(&make_key(13)), Bound::Unbounded);
        assert_eq!(tail, vec![RowId(15)]);
    }

    #[test]
    fn test_btree_range_hits_separator_keys() {
        let mut tree = BPlusTree::new();
        for i in 0..100 {
            tree.insert(make_key(i), RowId(i as u64));
        }

        for i in 0..100 {
            let hit = tree.range(Bound::Included(&make_key(i)), Bound::Included(&make_key(i)));
            assert_eq!(hit, vec![RowId(i as u64)]);
        }
    }

    #[test]
    fn test_btree_entries_sorted() {
        let mut tree = BPlusTree::new();

        for i in [5, 2, 8, 1, 9, 3] {
            tree.insert(make_key(i), RowId(i as u64));
        }

        let keys: Vec<IndexKey> = tree.entries().into_iter().map(|(k, _)| k).collect();
        let expected: Vec<IndexKey> = [1, 2, 3, 5, 8, 9].into_iter().map(make_key).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_composite_key_order() {
        let a = IndexKey::composite(vec![Value::Integer(1), Value::from("b")]);
        let b = IndexKey::composite(vec![Value::Integer(1), Value::from("c")]);
        let c = IndexKey::composite(vec![Value::Integer(2), Value::from("a")]);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(make_key(2), IndexKey::new(Value::Real(2.0)));
        assert!(IndexKey::composite(vec![Value::Null, Value::Integer(1)]).has_null());
    }
}
