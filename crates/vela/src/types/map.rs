//! The persistent map: a hash-array-mapped trie over the 32-bit value hash.
//!
//! Branch nodes hold a 32-bit occupancy bitmap and a dense child array
//! (popcount addressing); leaf nodes hold every entry sharing one full hash,
//! so genuine collisions degrade to a short scan inside the leaf. All
//! operations are persistent and O(log n); clones are O(1).
//!
//! Equality is order-independent: two maps are equal when they have the same
//! length and every entry of one looks up to an equal value in the other.

use std::sync::Arc;

use smallvec::{SmallVec, smallvec};

use crate::value::Value;

const BITS: u32 = 5;
const MASK: u32 = (1 << BITS) - 1;

#[derive(Debug)]
enum MNode {
    Branch {
        bitmap: u32,
        children: Vec<Arc<MNode>>,
    },
    /// All entries sharing one full 32-bit hash.
    Leaf {
        hash: u32,
        entries: SmallVec<[(Value, Value); 1]>,
    },
}

/// The persistent map value.
#[derive(Debug, Clone, Default)]
pub struct Map {
    len: usize,
    root: Option<Arc<MNode>>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = key.hash32();
        let mut node = self.root.as_deref()?;
        let mut shift = 0;
        loop {
            match node {
                MNode::Branch { bitmap, children } => {
                    let bit = 1u32 << ((hash >> shift) & MASK);
                    if bitmap & bit == 0 {
                        return None;
                    }
                    let idx = (bitmap & (bit - 1)).count_ones() as usize;
                    node = &children[idx];
                    shift += BITS;
                }
                MNode::Leaf { hash: leaf_hash, entries } => {
                    if *leaf_hash != hash {
                        return None;
                    }
                    return entries.iter().find(|(k, _)| k.value_eq(key)).map(|(_, v)| v);
                }
            }
        }
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces, returning the new map.
    pub fn put(&self, key: Value, value: Value) -> Self {
        let hash = key.hash32();
        match &self.root {
            None => Self {
                len: 1,
                root: Some(Arc::new(MNode::Leaf {
                    hash,
                    entries: smallvec![(key, value)],
                })),
            },
            Some(root) => {
                let (node, added) = Self::insert_at(root, 0, hash, key, value);
                Self {
                    len: self.len + usize::from(added),
                    root: Some(node),
                }
            }
        }
    }

    fn insert_at(node: &Arc<MNode>, shift: u32, hash: u32, key: Value, value: Value) -> (Arc<MNode>, bool) {
        match node.as_ref() {
            MNode::Branch { bitmap, children } => {
                let bit = 1u32 << ((hash >> shift) & MASK);
                let idx = (bitmap & (bit - 1)).count_ones() as usize;
                let mut children = children.clone();
                if bitmap & bit == 0 {
                    children.insert(
                        idx,
                        Arc::new(MNode::Leaf {
                            hash,
                            entries: smallvec![(key, value)],
                        }),
                    );
                    (
                        Arc::new(MNode::Branch {
                            bitmap: bitmap | bit,
                            children,
                        }),
                        true,
                    )
                } else {
                    let (child, added) = Self::insert_at(&children[idx], shift + BITS, hash, key, value);
                    children[idx] = child;
                    (
                        Arc::new(MNode::Branch {
                            bitmap: *bitmap,
                            children,
                        }),
                        added,
                    )
                }
            }
            MNode::Leaf {
                hash: leaf_hash,
                entries,
            } => {
                if *leaf_hash == hash {
                    let mut entries = entries.clone();
                    if let Some(slot) = entries.iter_mut().find(|(k, _)| k.value_eq(&key)) {
                        slot.1 = value;
                        (Arc::new(MNode::Leaf { hash, entries }), false)
                    } else {
                        entries.push((key, value));
                        (Arc::new(MNode::Leaf { hash, entries }), true)
                    }
                } else {
                    // Hashes diverge: split this leaf into a branch at the
                    // current level and re-insert the new entry below it.
                    let old_bit = 1u32 << ((leaf_hash >> shift) & MASK);
                    let branch = Arc::new(MNode::Branch {
                        bitmap: old_bit,
                        children: vec![Arc::clone(node)],
                    });
                    Self::insert_at(&branch, shift, hash, key, value)
                }
            }
        }
    }

    /// Removes a key if present, returning the new map.
    pub fn remove(&self, key: &Value) -> Self {
        let hash = key.hash32();
        let Some(root) = &self.root else { return self.clone() };
        match Self::remove_at(root, 0, hash, key) {
            Removed::NotFound => self.clone(),
            Removed::Empty => Self { len: self.len - 1, root: None },
            Removed::Node(node) => Self {
                len: self.len - 1,
                root: Some(node),
            },
        }
    }

    fn remove_at(node: &Arc<MNode>, shift: u32, hash: u32, key: &Value) -> Removed {
        match node.as_ref() {
            MNode::Branch { bitmap, children } => {
                let bit = 1u32 << ((hash >> shift) & MASK);
                if bitmap & bit == 0 {
                    return Removed::NotFound;
                }
                let idx = (bitmap & (bit - 1)).count_ones() as usize;
                match Self::remove_at(&children[idx], shift + BITS, hash, key) {
                    Removed::NotFound => Removed::NotFound,
                    Removed::Empty => {
                        let mut children = children.clone();
                        children.remove(idx);
                        if children.is_empty() {
                            Removed::Empty
                        } else {
                            Removed::Node(Arc::new(MNode::Branch {
                                bitmap: bitmap & !bit,
                                children,
                            }))
                        }
                    }
                    Removed::Node(child) => {
                        let mut children = children.clone();
                        children[idx] = child;
                        Removed::Node(Arc::new(MNode::Branch {
                            bitmap: *bitmap,
                            children,
                        }))
                    }
                }
            }
            MNode::Leaf {
                hash: leaf_hash,
                entries,
            } => {
                if *leaf_hash != hash {
                    return Removed::NotFound;
                }
                let Some(pos) = entries.iter().position(|(k, _)| k.value_eq(key)) else {
                    return Removed::NotFound;
                };
                if entries.len() == 1 {
                    Removed::Empty
                } else {
                    let mut entries = entries.clone();
                    entries.remove(pos);
                    Removed::Node(Arc::new(MNode::Leaf { hash, entries }))
                }
            }
        }
    }

    /// Right-biased merge: entries of `other` win on key conflicts.
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out = out.put(k.clone(), v.clone());
        }
        out
    }

    pub fn iter(&self) -> MapIter<'_> {
        MapIter {
            stack: self.root.as_deref().map_or_else(Vec::new, |root| vec![root]),
            entries: None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(_, v)| v)
    }

    /// Order-independent structural equality.
    pub fn map_eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|other_v| other_v.value_eq(v)))
    }
}

enum Removed {
    NotFound,
    Empty,
    Node(Arc<MNode>),
}

/// Depth-first iterator over map entries, in trie (hash) order.
pub struct MapIter<'a> {
    stack: Vec<&'a MNode>,
    entries: Option<(&'a [(Value, Value)], usize)>,
}

impl<'a> Iterator for MapIter<'a> {
    type Item = (&'a Value, &'a Value);

    fn next(&mut self) -> Option<(&'a Value, &'a Value)> {
        loop {
            if let Some((entries, idx)) = &mut self.entries {
                if *idx < entries.len() {
                    let (k, v) = &entries[*idx];
                    *idx += 1;
                    return Some((k, v));
                }
                self.entries = None;
            }
            match self.stack.pop()? {
                MNode::Branch { children, .. } => {
                    // Reverse so the lowest child pops first.
                    for child in children.iter().rev() {
                        self.stack.push(child);
                    }
                }
                MNode::Leaf { entries, .. } => {
                    self.entries = Some((entries, 0));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_map(pairs: &[(i64, i64)]) -> Map {
        let mut map = Map::new();
        for &(k, v) in pairs {
            map = map.put(Value::Int(k), Value::Int(v));
        }
        map
    }

    #[test]
    fn put_get_remove_round() {
        let map = int_map(&[(1, 10), (2, 20), (3, 30)]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&Value::Int(2)), Some(&Value::Int(20)));
        let smaller = map.remove(&Value::Int(2));
        assert_eq!(smaller.len(), 2);
        assert!(!smaller.contains(&Value::Int(2)));
        // the original is untouched
        assert!(map.contains(&Value::Int(2)));
    }

    #[test]
    fn replace_does_not_grow() {
        let map = int_map(&[(1, 10)]).put(Value::Int(1), Value::Int(11));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Value::Int(1)), Some(&Value::Int(11)));
    }

    #[test]
    fn equality_is_order_independent() {
        let a = int_map(&[(1, 10), (2, 20)]);
        let b = int_map(&[(2, 20), (1, 10)]);
        assert!(a.map_eq(&b));
        assert!(!a.map_eq(&int_map(&[(1, 10)])));
    }

    #[test]
    fn merge_right_wins() {
        let merged = int_map(&[(1, 10), (2, 20)]).merge(&int_map(&[(2, 99), (3, 30)]));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get(&Value::Int(2)), Some(&Value::Int(99)));
    }

    #[test]
    fn survives_many_entries() {
        let mut map = Map::new();
        for i in 0..500 {
            map = map.put(Value::Int(i), Value::Int(i * 2));
        }
        assert_eq!(map.len(), 500);
        for i in (0..500).step_by(37) {
            assert_eq!(map.get(&Value::Int(i)), Some(&Value::Int(i * 2)));
        }
        assert_eq!(map.iter().count(), 500);
    }
}
