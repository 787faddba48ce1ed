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

use super::{edge_weight, IndexCore, IndexOptions, NeighborhoodIndex};
use crate::community::common::{counting_sort_groups, SparseMap};
use crate::graph::Graph;

/// Neighborhood index of an undirected graph.
///
/// Self-loops are kept out of the neighbor slices and stored twice in `loops`
/// and in the community totals, the way they count in a node's degree.
#[derive(Clone, Debug)]
pub(crate) struct UndirectedIndex {
    core: IndexCore,
    /// Total incident weight of every community.
    total_weights: Vec<f64>,
}

impl UndirectedIndex {
    pub(crate) fn new(graph: &Graph, options: &IndexOptions) -> Self {
        let n = graph.node_count();
        let mut core = IndexCore::singletons(n, options.resolution, options.keep_dendrogram);
        let mut total_weights = vec![0.0; n];

        let mut degrees = vec![0usize; n];
        for edge in graph.edges() {
            if edge.source != edge.target {
                degrees[edge.source] += 1;
                degrees[edge.target] += 1;
            }
        }
        for i in 0..n {
            core.starts[i + 1] = core.starts[i] + degrees[i];
        }

        let size = core.starts[n];
        core.neighborhood = vec![0; size];
        core.weights = vec![0.0; size];
        let mut cursors = core.starts[..n].to_vec();

        for edge in graph.edges() {
            let weight = edge_weight(&edge, options);
            let (s, t) = (edge.source, edge.target);
            core.m += weight;

            if s == t {
                core.loops[s] += weight * 2.0;
                total_weights[s] += weight * 2.0;
                continue;
            }

            total_weights[s] += weight;
            total_weights[t] += weight;

            core.neighborhood[cursors[s]] = t;
            core.weights[cursors[s]] = weight;
            cursors[s] += 1;

            core.neighborhood[cursors[t]] = s;
            core.weights[cursors[t]] = weight;
            cursors[t] += 1;
        }

        UndirectedIndex {
            core,
            total_weights,
        }
    }

    #[cfg(test)]
    pub(crate) fn total_weight(&self, community: usize) -> f64 {
        self.total_weights[community]
    }
}

impl NeighborhoodIndex for UndirectedIndex {
    type Degree = f64;

    #[inline]
    fn core(&self) -> &IndexCore {
        &self.core
    }

    #[inline]
    fn core_mut(&mut self) -> &mut IndexCore {
        &mut self.core
    }

    #[inline]
    fn node_degree(&self, i: usize) -> f64 {
        self.core.weights[self.core.range(i)].iter().sum()
    }

    #[inline]
    fn strength(&self, i: usize) -> f64 {
        self.node_degree(i) + self.core.loops[i]
    }

    #[inline]
    fn delta(&self, i: usize, degree: f64, target_weight: f64, target: usize) -> f64 {
        let degree = degree + self.core.loops[i];
        let m2 = self.core.m * 2.0;
        target_weight - self.total_weights[target] * degree * self.core.resolution / m2
    }

    #[inline]
    fn delta_with_own_community(
        &self,
        i: usize,
        degree: f64,
        own_weight: f64,
        community: usize,
    ) -> f64 {
        let degree = degree + self.core.loops[i];
        let m2 = self.core.m * 2.0;
        own_weight - (self.total_weights[community] - degree) * degree * self.core.resolution / m2
    }

    #[inline]
    fn expected_weight(&self, a: f64, b: f64) -> f64 {
        a * b * self.core.resolution / (self.core.m * 2.0)
    }

    fn move_node(&mut self, i: usize, degree: f64, target: usize) {
        let current = self.core.belongings[i];
        if current == target {
            return;
        }
        let degree = degree + self.core.loops[i];

        self.total_weights[current] -= degree;
        self.total_weights[target] += degree;

        self.core.counts[current] -= 1;
        self.core.counts[target] += 1;
        self.core.belongings[i] = target;

        if self.core.counts[current] == 0 {
            self.core.unused.push(current);
        }
    }

    fn isolate(&mut self, i: usize, degree: f64) -> usize {
        let current = self.core.belongings[i];
        if self.core.counts[current] == 1 {
            return current;
        }
        let Some(target) = self.core.unused.pop() else {
            return current;
        };
        let degree = degree + self.core.loops[i];

        self.total_weights[current] -= degree;
        self.total_weights[target] += degree;

        self.core.counts[current] -= 1;
        self.core.counts[target] += 1;
        self.core.belongings[i] = target;
        target
    }

    fn zoom_out(&mut self) -> Vec<usize> {
        let (labels, relabel, induced) = self.core.renumber();
        let groups = counting_sort_groups(&relabel, induced);

        let mut totals = vec![0.0; induced];
        for (community, &label) in labels.iter().enumerate() {
            if label != usize::MAX {
                totals[label] = self.total_weights[community];
            }
        }

        let mut loops = vec![0.0; induced];
        let mut starts = Vec::with_capacity(induced + 1);
        let mut neighborhood = Vec::new();
        let mut weights = Vec::new();
        let mut adjacency = SparseMap::new(induced);

        for (ci, members) in groups.iter().enumerate() {
            adjacency.clear();
            starts.push(neighborhood.len());
            for &i in members {
                loops[ci] += self.core.loops[i];
                for (j, w) in self.core.neighbors(i) {
                    let cj = relabel[j];
                    if cj == ci {
                        loops[ci] += w;
                    } else {
                        adjacency.add(cj, w);
                    }
                }
            }
            for (cj, w) in adjacency.iter() {
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
        self.total_weights = totals;

        relabel
    }

    fn modularity(&self) -> f64 {
        let m2 = self.core.m * 2.0;
        let mut internal = vec![0.0; self.core.c];

        for i in 0..self.core.c {
            let ci = self.core.belongings[i];
            internal[ci] += self.core.loops[i];
            for (j, w) in self.core.neighbors(i) {
                if self.core.belongings[j] == ci {
                    internal[ci] += w;
                }
            }
        }

        internal
            .iter()
            .zip(&self.total_weights)
            .map(|(&inside, &total)| {
                inside / m2 - (total / m2).powi(2) * self.core.resolution
            })
            .sum()
    }

    fn community_weights(&self) -> Vec<f64> {
        self.total_weights[..self.core.c].to_vec()
    }
}
