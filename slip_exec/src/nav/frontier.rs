//! Priority frontier shared by the planners.
//!
//! A min-heap over `(key, insertion sequence)` with lazy deletion: removing or re-keying a node
//! only updates the live table, stale heap entries are skipped when they surface.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    hash::Hash,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Frontier<N, K> {
    heap: BinaryHeap<Entry<N, K>>,

    /// Live key and sequence number of each queued node.
    live: HashMap<N, (K, u64)>,

    next_seq: u64,
}

#[derive(Debug, Clone)]
struct Entry<N, K> {
    key: K,
    seq: u64,
    node: N,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<N, K> Frontier<N, K>
where
    N: Copy + Eq + Hash,
    K: Copy + Ord,
{
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Queue the node with the given key, replacing any entry it already has.
    pub fn push(&mut self, node: N, key: K) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.live.insert(node, (key, seq));
        self.heap.push(Entry { key, seq, node });
    }

    /// Remove the node from the frontier if present.
    pub fn remove(&mut self, node: &N) {
        self.live.remove(node);
    }

    /// Live key of a queued node.
    pub fn key_of(&self, node: &N) -> Option<K> {
        self.live.get(node).map(|(k, _)| *k)
    }

    /// Minimum live entry without removing it.
    pub fn peek(&mut self) -> Option<(N, K)> {
        self.discard_stale();
        self.heap.peek().map(|e| (e.node, e.key))
    }

    /// Remove and return the minimum live entry.
    pub fn pop(&mut self) -> Option<(N, K)> {
        self.discard_stale();
        let e = self.heap.pop()?;
        self.live.remove(&e.node);
        Some((e.node, e.key))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            match self.live.get(&top.node) {
                Some((_, seq)) if *seq == top.seq => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }
}

impl<N, K> Default for Frontier<N, K>
where
    N: Copy + Eq + Hash,
    K: Copy + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, K: Ord> PartialEq for Entry<N, K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl<N, K: Ord> Eq for Entry<N, K> {}

impl<N, K: Ord> Ord for Entry<N, K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Note that we flip the order here so that the heap will be a min-heap, not a max-heap
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<N, K: Ord> PartialOrd for Entry<N, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
