// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Common utilities for the community detection phases.
//!
//! This module provides the random source shared by every phase of a single
//! detection run, the deterministic tie-break rule used when comparing quality
//! deltas, and the scratch containers and grouping helper used by the phases.

use std::collections::VecDeque;

use fixedbitset::FixedBitSet;
use rand::prelude::*;
use rand_pcg::Pcg64;

// ============================================================================
// RNG Utilities
// ============================================================================

/// Type alias for the default RNG used by the engine.
pub(crate) type CommunityRng = Pcg64;

/// A user supplied source of uniform values in `[0, 1)`.
pub type RngFn = Box<dyn FnMut() -> f64>;

/// Build RNG from optional seed.
///
/// If seed is provided, creates a deterministic RNG seeded with that value.
/// Otherwise, creates an RNG seeded from the operating system's entropy source.
#[inline]
pub(crate) fn build_rng(seed: Option<u64>) -> CommunityRng {
    match seed {
        Some(s) => Pcg64::seed_from_u64(s),
        None => Pcg64::from_os_rng(),
    }
}

/// The single source of randomness of a detection run.
pub(crate) enum RandomSource {
    Pcg(CommunityRng),
    Custom(RngFn),
}

impl RandomSource {
    pub(crate) fn new(rng: Option<RngFn>, seed: Option<u64>) -> Self {
        match rng {
            Some(f) => RandomSource::Custom(f),
            None => RandomSource::Pcg(build_rng(seed)),
        }
    }

    /// Uniform value in `[0, 1)`.
    #[inline]
    pub(crate) fn next_f64(&mut self) -> f64 {
        match self {
            RandomSource::Pcg(rng) => rng.random::<f64>(),
            RandomSource::Custom(f) => f(),
        }
    }

    /// Random index in `[0, len)`, used as the starting point of cyclic
    /// traversals. `len` must be positive.
    #[inline]
    pub(crate) fn random_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        let draw = (self.next_f64() * len as f64).floor();
        if draw.is_finite() && draw > 0.0 {
            (draw as usize).min(len - 1)
        } else {
            0
        }
    }
}

// ============================================================================
// Delta comparison
// ============================================================================

/// Deltas closer than this are considered equal.
pub(crate) const EPSILON: f64 = 1e-10;

/// Whether `target` with `delta` should replace `best` with `best_delta`.
///
/// Ties favor staying in the current community, and otherwise the larger
/// community id, so that a run is reproducible whatever the order in which
/// candidates are visited.
#[inline]
pub(crate) fn tie_breaker(
    best: usize,
    current: usize,
    target: usize,
    delta: f64,
    best_delta: f64,
) -> bool {
    if (delta - best_delta).abs() < EPSILON {
        if best == current {
            false
        } else {
            target > best
        }
    } else {
        delta > best_delta
    }
}

// ============================================================================
// Sparse containers
// ============================================================================

/// Map from small integer keys to accumulated weights, iterated in insertion
/// order and cleared in time proportional to its size.
#[derive(Clone, Debug)]
pub(crate) struct SparseMap {
    dense: Vec<usize>,
    values: Vec<f64>,
    sparse: Vec<usize>,
}

impl SparseMap {
    pub(crate) fn new(capacity: usize) -> Self {
        SparseMap {
            dense: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            sparse: vec![0; capacity],
        }
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.dense.clear();
        self.values.clear();
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.dense.len()
    }

    #[inline]
    fn position(&self, key: usize) -> Option<usize> {
        let pos = *self.sparse.get(key)?;
        (pos < self.dense.len() && self.dense[pos] == key).then_some(pos)
    }

    #[inline]
    pub(crate) fn get(&self, key: usize) -> Option<f64> {
        self.position(key).map(|pos| self.values[pos])
    }

    /// Add `weight` to the value stored under `key`, inserting it if needed.
    #[inline]
    pub(crate) fn add(&mut self, key: usize, weight: f64) {
        if key >= self.sparse.len() {
            self.sparse.resize(key + 1, 0);
        }
        match self.position(key) {
            Some(pos) => self.values[pos] += weight,
            None => {
                self.sparse[key] = self.dense.len();
                self.dense.push(key);
                self.values.push(weight);
            }
        }
    }

    /// Entry at `pos` in insertion order.
    #[inline]
    pub(crate) fn entry(&self, pos: usize) -> (usize, f64) {
        (self.dense[pos], self.values[pos])
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.dense.iter().copied().zip(self.values.iter().copied())
    }
}

/// FIFO queue holding each node at most once.
#[derive(Clone, Debug)]
pub(crate) struct QueueSet {
    queue: VecDeque<usize>,
    members: FixedBitSet,
}

impl QueueSet {
    pub(crate) fn new(capacity: usize) -> Self {
        QueueSet {
            queue: VecDeque::with_capacity(capacity),
            members: FixedBitSet::with_capacity(capacity),
        }
    }

    /// Enqueue `node` unless it is already waiting. Returns whether it was added.
    #[inline]
    pub(crate) fn enqueue(&mut self, node: usize) -> bool {
        self.members.grow(node + 1);
        if self.members.put(node) {
            return false;
        }
        self.queue.push_back(node);
        true
    }

    #[inline]
    pub(crate) fn dequeue(&mut self) -> Option<usize> {
        let node = self.queue.pop_front()?;
        self.members.set(node, false);
        Some(node)
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

// ============================================================================
// Label/Community Grouping
// ============================================================================

/// Nodes laid out contiguously by community: the members of the `k`-th
/// non-empty community are `nodes[bounds[k]..bounds[k + 1]]`, in increasing
/// node order.
#[derive(Clone, Debug, Default)]
pub(crate) struct CommunityGroups {
    pub(crate) bounds: Vec<usize>,
    pub(crate) nodes: Vec<usize>,
}

impl CommunityGroups {
    /// Number of non-empty communities.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.bounds.len().saturating_sub(1)
    }

    #[inline]
    pub(crate) fn group(&self, k: usize) -> &[usize] {
        &self.nodes[self.bounds[k]..self.bounds[k + 1]]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &[usize]> + '_ {
        (0..self.len()).map(move |k| self.group(k))
    }
}

/// Counting sort of node ids by label, labels being smaller than `bound`.
///
/// Runs in `O(n + bound)` and avoids building a multimap.
pub(crate) fn counting_sort_groups(labels: &[usize], bound: usize) -> CommunityGroups {
    let mut counts = vec![0usize; bound];
    for &label in labels {
        counts[label] += 1;
    }

    let mut offsets = vec![0usize; bound];
    let mut bounds = Vec::new();
    let mut n = 0;
    for (label, &count) in counts.iter().enumerate() {
        if count != 0 {
            bounds.push(n);
            offsets[label] = n;
            n += count;
        }
    }
    bounds.push(n);

    let mut nodes = vec![0usize; labels.len()];
    for (node, &label) in labels.iter().enumerate() {
        nodes[offsets[label]] = node;
        offsets[label] += 1;
    }

    CommunityGroups { bounds, nodes }
}
