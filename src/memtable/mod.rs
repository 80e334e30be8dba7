//! The ordered in-memory index (memtable).
//!
//! Backed by a probabilistic skip list: maximum height 12, branching
//! probability 0.5, with a sentinel head node holding the empty key at
//! maximum height. This mirrors the reference skip list used by the
//! original storage engine this design is drawn from — a hand-rolled
//! structure rather than an off-the-shelf concurrent map, so height
//! generation and node layout stay under the engine's control.
//!
//! The list lives behind a single [`RwLock`]: writers take the exclusive
//! side, readers (`lookup`, `iterate`, `memory_usage`) take the shared
//! side. Node storage is a plain growable arena addressed by index, so
//! the implementation needs no `unsafe` and no atomic pointer chasing.


use std::sync::RwLock;

use rand::Rng;

/// Maximum number of levels a node can participate in.
const MAX_HEIGHT: usize = 12;

/// Probability that a node promoted to level `n` is also promoted to
/// level `n + 1`.
const BRANCHING_PROBABILITY: f64 = 0.5;

/// Sentinel "no next node" marker within the arena.
const NIL: usize = usize::MAX;

/// Result of a [`Memtable::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// No entry exists for the key.
    NotPresent,
    /// The newest entry for the key is a live value.
    Live(Vec<u8>),
    /// The newest entry for the key is a tombstone.
    Tombstoned,
}

struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    tombstone: bool,
    /// `next[level]` is the arena index of the successor at that level,
    /// or [`NIL`].
    next: Vec<usize>,
}

struct Inner {
    /// Arena of nodes. Index 0 is always the sentinel head.
    nodes: Vec<Node>,
    /// Current maximum populated level (1-based; at least 1).
    height: usize,
    /// Running estimate of live key+value bytes.
    approximate_size: usize,
}

impl Inner {
    fn new() -> Self {
        let head = Node {
            key: Vec::new(),
            value: Vec::new(),
            tombstone: false,
            next: vec![NIL; MAX_HEIGHT],
        };
        Self {
            nodes: vec![head],
            height: 1,
            approximate_size: 0,
        }
    }

    /// Finds, for each level, the last node whose key is strictly less
    /// than `key`. Index 0 (the head) stands in where no such node
    /// exists below it.
    fn find_predecessors(&self, key: &[u8]) -> [usize; MAX_HEIGHT] {
        let mut update = [0usize; MAX_HEIGHT];
        let mut current = 0usize;
        for level in (0..self.height).rev() {
            loop {
                let next = self.nodes[current].next[level];
                if next != NIL && self.nodes[next].key.as_slice() < key {
                    current = next;
                } else {
                    break;
                }
            }
            update[level] = current;
        }
        update
    }

    fn random_height(&self) -> usize {
        let mut height = 1;
        let mut rng = rand::rng();
        while height < MAX_HEIGHT && rng.random_bool(BRANCHING_PROBABILITY) {
            height += 1;
        }
        height
    }

    fn insert(&mut self, key: Vec<u8>, value: Vec<u8>, tombstone: bool) {
        let update = self.find_predecessors(&key);
        let candidate = self.nodes[update[0]].next[0];
        if candidate != NIL && self.nodes[candidate].key == key {
            let old_len = self.nodes[candidate].key.len() + self.nodes[candidate].value.len();
            let new_len = self.nodes[candidate].key.len() + value.len();
            // memory_usage() is contracted as monotonic nondecreasing: only grow
            // the estimate on a larger overwrite, never shrink it on a smaller one.
            if new_len > old_len {
                self.approximate_size += new_len - old_len;
            }
            self.nodes[candidate].value = value;
            self.nodes[candidate].tombstone = tombstone;
            return;
        }

        let height = self.random_height();
        if height > self.height {
            self.height = height;
        }
        self.approximate_size += key.len() + value.len();

        let mut next = vec![NIL; height];
        for (level, slot) in next.iter_mut().enumerate() {
            *slot = self.nodes[update[level]].next[level];
        }
        let new_index = self.nodes.len();
        self.nodes.push(Node {
            key,
            value,
            tombstone,
            next,
        });
        for (level, &pred) in update.iter().enumerate().take(height) {
            self.nodes[pred].next[level] = new_index;
        }
    }

    fn lookup(&self, key: &[u8]) -> Lookup {
        let mut current = 0usize;
        for level in (0..self.height).rev() {
            loop {
                let next = self.nodes[current].next[level];
                if next != NIL && self.nodes[next].key.as_slice() < key {
                    current = next;
                } else {
                    break;
                }
            }
        }
        let candidate = self.nodes[current].next[0];
        if candidate != NIL && self.nodes[candidate].key.as_slice() == key {
            let node = &self.nodes[candidate];
            if node.tombstone {
                Lookup::Tombstoned
            } else {
                Lookup::Live(node.value.clone())
            }
        } else {
            Lookup::NotPresent
        }
    }

    fn iter_entries(&self) -> Vec<(Vec<u8>, Vec<u8>, bool)> {
        let mut out = Vec::new();
        let mut current = self.nodes[0].next[0];
        while current != NIL {
            let node = &self.nodes[current];
            out.push((node.key.clone(), node.value.clone(), node.tombstone));
            current = node.next[0];
        }
        out
    }
}

/// Concurrent-safe ordered in-memory index mapping keys to values, with
/// tombstone support for deletes.
pub struct Memtable {
    inner: RwLock<Inner>,
}

impl Memtable {
    /// Creates an empty memtable.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Inserts or overwrites the entry for `key` with a live value.
    pub fn put(&self, key: &[u8], value: &[u8]) {
        let mut inner = self.inner.write().expect("memtable lock poisoned");
        inner.insert(key.to_vec(), value.to_vec(), false);
    }

    /// Inserts or overwrites the entry for `key` with a tombstone.
    pub fn delete(&self, key: &[u8]) {
        let mut inner = self.inner.write().expect("memtable lock poisoned");
        inner.insert(key.to_vec(), Vec::new(), true);
    }

    /// Looks up the newest entry for `key`.
    pub fn lookup(&self, key: &[u8]) -> Lookup {
        let inner = self.inner.read().expect("memtable lock poisoned");
        inner.lookup(key)
    }

    /// Returns every entry in ascending key order, including tombstones.
    ///
    /// Used by the flush path, which must carry tombstones into the
    /// resulting SSTable so deletes remain visible to older files.
    pub fn iterate(&self) -> Vec<(Vec<u8>, Vec<u8>, bool)> {
        let inner = self.inner.read().expect("memtable lock poisoned");
        inner.iter_entries()
    }

    /// Monotonic nondecreasing estimate of live key+value bytes.
    pub fn memory_usage(&self) -> usize {
        let inner = self.inner.read().expect("memtable lock poisoned");
        inner.approximate_size
    }

    /// `true` if the memtable holds no entries.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().expect("memtable lock poisoned");
        inner.nodes.len() <= 1
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}
