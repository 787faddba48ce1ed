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

use std::ops::{Add, AddAssign, Sub, SubAssign};

use super::{edge_weight, Degree, IndexCore, IndexOptions, NeighborhoodIndex};
use crate::community::common::{counting_sort_groups, SparseMap};
use crate::graph::Graph;

/// In and out degree of a node or community.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct DirectedDegree {
    pub(crate) inward: f64,
    pub(crate) outward: f64,
}

impl DirectedDegree {
    #[inline]
    pub(crate) fn new(inward: f64, outward: f64) -> Self {
        DirectedDegree { inward, outward }
    }
}

impl Add for DirectedDegree {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        DirectedDegree::new(self.inward + rhs.inward, self.outward + rhs.outward)
    }
}

impl Sub for DirectedDegree {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        DirectedDegree::new(self.inward - rhs.inward, self.outward - rhs.outward)
    }
}

impl AddAssign for DirectedDegree {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for DirectedDegree {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Degree for DirectedDegree {}

/// Neighborhood index of a directed graph.
///
/// The slice of node `i` holds its out-neighbors in `starts[i]..offsets[i]`
/// and its in-neighbors in `offsets[i]..starts[i + 1]`. Self-loops are stored
/// once in `loops` and count in both directions.
#[derive(Clone, Debug)]
pub(crate) struct DirectedIndex {
    core: IndexCore,
    offsets: Vec<usize>,
    total_in_weights: Vec<f64>,
    total_out_weights: Vec<f64>,
}

impl DirectedIndex {
    pub(crate) fn new(graph: &Graph, options: &IndexOptions) -> Self {
        let n = graph.node_count();
        let mut core = IndexCore::singletons(n, options.resolution, options.keep_dendrogram);
        let mut total_in_weights = vec![0.0; n];
        let mut total_out_weights = vec![0.0; n];

        let mut out_degrees = vec![0usize; n];
        let mut in_degrees = vec![0usize; n];
        for edge in graph.edges() {
            if edge.source != edge.target {
                out_degrees[edge.source] += 1;
                in_degrees[edge.target] += 1;
            }
        }

        let mut offsets = vec![0usize; n];
        for i in 0..n {
            offsets[i] = core.starts[i] + out_degrees[i];
            core.starts[i + 1] = offsets[i] + in_degrees[i];
        }

        let size = core.starts[n];
        core.neighborhood = vec![0; size];
        core.weights = vec![0.0; size];
        let mut out_cursors = core.starts[..n].to_vec();
        let mut in_cursors = offsets.clone();

        for edge in graph.edges() {
            let weight = edge_weight(&edge, options);
            let (s, t) = (edge.source, edge.target);
            core.m += weight;

            total_out_weights[s] += weight;
            total_in_weights[t] += weight;

            if s == t {
                core.loops[s] += weight;
                continue;
            }

            core.neighborhood[out_cursors[s]] = t;
            core.weights[out_cursors[s]] = weight;
            out_cursors[s] += 1;

            core.neighborhood[in_cursors[t]] = s;
            core.weights[in_cursors[t]] = weight;
            in_cursors[t] += 1;
        }

        DirectedIndex {
            core,
            offsets,
            total_in_weights,
            total_out_weights,
        }
    }

    /// Whether position `pos` of the slice of node `i` is an out-edge.
    #[inline]
    pub(crate) fn is_out(&self, i: usize, pos: usize) -> bool {
        pos < self.offsets[i]
    }

    #[inline]
    fn community_degree(&self, community: usize) -> DirectedDegree {
        DirectedDegree::new(
            self.total_in_weights[community],
            self.total_out_weights[community],
        )
    }

    #[inline]
    fn with_loops(&self, i: usize, degree: DirectedDegree) -> DirectedDegree {
        let loops = self.core.loops[i];
        DirectedDegree::new(degree.inward + loops, degree.outward + loops)
    }

    fn transfer(&mut self, i: usize, degree: DirectedDegree, current: usize, target: usize) {
        let degree = self.with_loops(i, degree);

        self.total_in_weights[current] -= degree.inward;
        self.total_out_weights[current] -= degree.outward;
        self.total_in_weights[target] += degree.inward;
        self.total_out_weights[target] += degree.outward;

        self.core.counts[current] -= 1;
        self.core.counts[target] += 1;
        self.core.belongings[i] = target;
    }
}

impl NeighborhoodIndex for DirectedIndex {
    type Degree = DirectedDegree;

    #[inline]
    fn core(&self) -> &IndexCore {
        &self.core
    }

    #[inline]
    fn core_mut(&mut self) -> &mut IndexCore {
        &mut self.core
    }

    fn node_degree(&self, i: usize) -> DirectedDegree {
        let mut degree = DirectedDegree::default();
        for pos in self.core.range(i) {
            if self.is_out(i, pos) {
                degree.outward += self.core.weights[pos];
            } else {
                degree.inward += self.core.weights[pos];
            }
        }
        degree
    }

    #[inline]
    fn strength(&self, i: usize) -> DirectedDegree {
        self.with_loops(i, self.node_degree(i))
    }

    #[inline]
    fn delta(&self, i: usize, degree: DirectedDegree, target_weight: f64, target: usize) -> f64 {
        let degree = self.with_loops(i, degree);
        let total = self.community_degree(target);
        target_weight
            - (degree.outward * total.inward + degree.inward * total.outward)
                * self.core.resolution
                / self.core.m
    }

    #[inline]
    fn delta_with_own_community(
        &self,
        i: usize,
        degree: DirectedDegree,
        own_weight: f64,
        community: usize,
    ) -> f64 {
        let degree = self.with_loops(i, degree);
        let rest = self.community_degree(community) - degree;
        own_weight
            - (degree.outward * rest.inward + degree.inward * rest.outward) * self.core.resolution
                / self.core.m
    }

    #[inline]
    fn expected_weight(&self, a: DirectedDegree, b: DirectedDegree) -> f64 {
        (a.outward * b.inward + a.inward * b.outward) * self.core.resolution / self.core.m
    }

    fn move_node(&mut self, i: usize, degree: DirectedDegree, target: usize) {
        let current = self.core.belongings[i];
        if current == target {
            return;
        }
        self.transfer(i, degree, current, target);
        if self.core.counts[current] == 0 {
            self.core.unused.push(current);
        }
    }

    fn isolate(&mut self, i: usize, degree: DirectedDegree) -> usize {
        let current = self.core.belongings[i];
        if self.core.counts[current] == 1 {
            return current;
        }
        let Some(target) = self.core.unused.pop() else {
            return current;
        };
        self.transfer(i, degree, current, target);
        target
    }

    fn zoom_out(&mut self) -> Vec<usize> {
        let (labels, relabel, induced) = self.core.renumber();
        let groups = counting_sort_groups(&relabel, induced);

        let mut total_in = vec![0.0; induced];
        let mut total_out = vec![0.0; induced];
        for (community, &label) in labels.iter().enumerate() {
            if label != usize::MAX {
                total_in[label] = self.total_in_weights[community];
                total_out[label] = self.total_out_weights[community];
            }
        }

        let mut loops = vec![0.0; induced];
        let mut starts = Vec::with_capacity(induced + 1);
        let mut offsets = Vec::with_capacity(induced);
        let mut neighborhood = Vec::new();
        let mut weights = Vec::new();
        let mut out_adjacency = SparseMap::new(induced);
        let mut in_adjacency = SparseMap::new(induced);

        for (ci, members) in groups.iter().enumerate() {
            out_adjacency.clear();
            in_adjacency.clear();
            for &i in members {
                loops[ci] += self.core.loops[i];
                for pos in self.core.range(i) {
                    let cj = relabel[self.core.neighborhood[pos]];
                    let w = self.core.weights[pos];
                    let out = self.is_out(i, pos);
                    if cj == ci {
                        // each internal edge shows up on both of its endpoints
                        if out {
                            loops[ci] += w;
                        }
                    } else if out {
                        out_adjacency.add(cj, w);
                    } else {
                        in_adjacency.add(cj, w);
                    }
                }
            }

            starts.push(neighborhood.len());
            for (cj, w) in out_adjacency.iter() {
                neighborhood.push(cj);
                weights.push(w);
            }
            offsets.push(neighborhood.len());
            for (cj, w) in in_adjacency.iter() {
                neighborhood.push(cj);
                weights.push(w);
            }
        }
        starts.push(neighborhood.len());

        self.core.advance_mapping(&relabel);
        self.core.reset_partition(induced);
        self.core.loops = loops;
        self.core.starts = starts;
        self.core.neighborhood = neighborhood;
        self.core.weights = weights;
        self.offsets = offsets;
        self.total_in_weights = total_in;
        self.total_out_weights = total_out;

        relabel
    }

    fn modularity(&self) -> f64 {
        let m = self.core.m;
        let mut internal = vec![0.0; self.core.c];

        for i in 0..self.core.c {
            let ci = self.core.belongings[i];
            internal[ci] += self.core.loops[i];
            for pos in self.core.starts[i]..self.offsets[i] {
                if self.core.belongings[self.core.neighborhood[pos]] == ci {
                    internal[ci] += self.core.weights[pos];
                }
            }
        }

        (0..self.core.c)
            .map(|c| {
                internal[c] / m
                    - self.total_in_weights[c] * self.total_out_weights[c] / (m * m)
                        * self.core.resolution
            })
            .sum()
    }

    fn community_weights(&self) -> Vec<DirectedDegree> {
        (0..self.core.c).map(|c| self.community_degree(c)).collect()
    }
}
