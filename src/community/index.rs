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

//! Compressed neighborhood index over a graph being partitioned.
//!
//! The index owns every mutable array of a detection run: the CSR adjacency of
//! the current level, the node to community map (`belongings`), per community
//! aggregates and the mapping from original nodes to current level nodes.
//! Each run builds its own index; nothing is shared between runs.

mod directed;
mod undirected;

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Sub, SubAssign};

pub(crate) use directed::DirectedIndex;
pub(crate) use undirected::UndirectedIndex;

use crate::graph::Graph;

/// Settings shared by both index variants.
#[derive(Clone, Debug)]
pub(crate) struct IndexOptions<'a> {
    pub(crate) weight_attribute: &'a str,
    pub(crate) weighted: bool,
    pub(crate) resolution: f64,
    pub(crate) keep_dendrogram: bool,
}

/// Bookkeeping common to the undirected and directed indices.
#[derive(Clone, Debug)]
pub(crate) struct IndexCore {
    /// Number of original nodes.
    pub(crate) n: usize,
    /// Number of nodes at the current level.
    pub(crate) c: usize,
    /// Total edge weight of the graph.
    pub(crate) m: f64,
    pub(crate) level: usize,
    pub(crate) resolution: f64,
    pub(crate) belongings: Vec<usize>,
    pub(crate) counts: Vec<usize>,
    /// Stack of community ids currently holding no node.
    pub(crate) unused: Vec<usize>,
    /// Original node -> node of the current level.
    pub(crate) mapping: Vec<usize>,
    /// Original node -> community, one entry per coarsening level.
    pub(crate) dendrogram: Option<Vec<Vec<usize>>>,
    pub(crate) loops: Vec<f64>,
    pub(crate) starts: Vec<usize>,
    pub(crate) neighborhood: Vec<usize>,
    pub(crate) weights: Vec<f64>,
}

impl IndexCore {
    fn singletons(n: usize, resolution: f64, keep_dendrogram: bool) -> Self {
        IndexCore {
            n,
            c: n,
            m: 0.0,
            level: 0,
            resolution,
            belongings: (0..n).collect(),
            counts: vec![1; n],
            unused: Vec::new(),
            mapping: (0..n).collect(),
            dendrogram: keep_dendrogram.then(Vec::new),
            loops: vec![0.0; n],
            starts: vec![0; n + 1],
            neighborhood: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Neighbor positions of node `i` in `neighborhood`/`weights`.
    #[inline]
    pub(crate) fn range(&self, i: usize) -> std::ops::Range<usize> {
        self.starts[i]..self.starts[i + 1]
    }

    #[inline]
    pub(crate) fn neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.range(i);
        self.neighborhood[range.clone()]
            .iter()
            .copied()
            .zip(self.weights[range].iter().copied())
    }

    /// Number of non-empty communities.
    #[inline]
    pub(crate) fn community_count(&self) -> usize {
        self.c - self.unused.len()
    }

    /// Community of every original node.
    pub(crate) fn collect(&self) -> Vec<usize> {
        self.mapping
            .iter()
            .map(|&node| self.belongings[node])
            .collect()
    }

    /// Record the current level in the dendrogram and advance the
    /// original-node mapping through `relabel` (old node -> induced node).
    fn advance_mapping(&mut self, relabel: &[usize]) {
        for node in self.mapping.iter_mut() {
            *node = relabel[*node];
        }
        if let Some(dendrogram) = self.dendrogram.as_mut() {
            dendrogram.push(self.mapping.clone());
        }
        self.level += 1;
    }

    /// Point every original node recorded at the latest dendrogram level to
    /// the community its current node now belongs to.
    pub(crate) fn patch_dendrogram(&mut self) {
        if let Some(level) = self.dendrogram.as_mut().and_then(|d| d.last_mut()) {
            for community in level.iter_mut() {
                *community = self.belongings[*community];
            }
        }
    }

    /// Renumber communities in first-seen order. Returns the relabeling of
    /// current nodes and the number of induced nodes.
    fn renumber(&self) -> (Vec<usize>, Vec<usize>, usize) {
        let mut labels = vec![usize::MAX; self.c];
        let mut relabel = vec![0; self.c];
        let mut next = 0;
        for (i, &community) in self.belongings[..self.c].iter().enumerate() {
            if labels[community] == usize::MAX {
                labels[community] = next;
                next += 1;
            }
            relabel[i] = labels[community];
        }
        (labels, relabel, next)
    }

    fn reset_partition(&mut self, c: usize) {
        self.c = c;
        self.belongings.truncate(c);
        self.belongings.iter_mut().enumerate().for_each(|(i, b)| *b = i);
        self.counts.truncate(c);
        self.counts.fill(1);
        self.unused.clear();
    }
}

/// Degree of a node, split by direction for directed graphs.
pub(crate) trait Degree:
    Copy + Default + Debug + Add<Output = Self> + Sub<Output = Self> + AddAssign + SubAssign
{
}

impl Degree for f64 {}

/// Primitives the detection phases need from an index.
///
/// Deltas are modularity gains scaled by the total edge weight, so they are
/// expressed in edge-weight units.
pub(crate) trait NeighborhoodIndex {
    type Degree: Degree;

    fn core(&self) -> &IndexCore;

    fn core_mut(&mut self) -> &mut IndexCore;

    /// Sum of the weights of the edges of `i`, self-loops excluded.
    fn node_degree(&self, i: usize) -> Self::Degree;

    /// Degree of `i` including its self-loops.
    fn strength(&self, i: usize) -> Self::Degree;

    /// Gain of moving `i` into the foreign community `target`, given the weight
    /// `target_weight` of its edges toward it.
    fn delta(&self, i: usize, degree: Self::Degree, target_weight: f64, target: usize) -> f64;

    /// Gain of `i` being part of its own community compared to being alone.
    fn delta_with_own_community(
        &self,
        i: usize,
        degree: Self::Degree,
        own_weight: f64,
        community: usize,
    ) -> f64;

    /// Expected weight between two disjoint groups of nodes under the null model.
    fn expected_weight(&self, a: Self::Degree, b: Self::Degree) -> f64;

    fn move_node(&mut self, i: usize, degree: Self::Degree, target: usize);

    /// Move `i` into a fresh singleton community and return its id.
    fn isolate(&mut self, i: usize, degree: Self::Degree) -> usize;

    /// Collapse every community into one node of the next level.
    ///
    /// Returns, for every node of the current level, the induced node it was
    /// folded into.
    fn zoom_out(&mut self) -> Vec<usize>;

    fn modularity(&self) -> f64;

    /// Aggregated weight of the edges incident to each community.
    fn community_weights(&self) -> Vec<Self::Degree>;

    #[inline]
    fn node_count(&self) -> usize {
        self.core().c
    }

    #[inline]
    fn community_of(&self, i: usize) -> usize {
        self.core().belongings[i]
    }

    /// Move `i` into `target`, computing its degree on the way.
    fn expensive_move(&mut self, i: usize, target: usize) {
        let degree = self.node_degree(i);
        self.move_node(i, degree, target);
    }

    fn expensive_isolate(&mut self, i: usize) -> usize {
        let degree = self.node_degree(i);
        self.isolate(i, degree)
    }
}

/// Which variant of the index a graph needs.
pub(crate) enum LouvainIndex {
    Undirected(UndirectedIndex),
    Directed(DirectedIndex),
}

impl LouvainIndex {
    pub(crate) fn new(graph: &Graph, directed: bool, options: &IndexOptions) -> Self {
        if directed {
            LouvainIndex::Directed(DirectedIndex::new(graph, options))
        } else {
            LouvainIndex::Undirected(UndirectedIndex::new(graph, options))
        }
    }
}

/// Weight of an edge of `graph` according to `options`.
#[inline]
fn edge_weight(edge: &crate::graph::EdgeView, options: &IndexOptions) -> f64 {
    if options.weighted {
        edge.weight(options.weight_attribute)
    } else {
        1.0
    }
}
