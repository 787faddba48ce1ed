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
// https://arxiv.org/abs/0803.0476

use super::common::{tie_breaker, QueueSet, RandomSource, SparseMap};
use super::index::NeighborhoodIndex;

/// Queue-driven Louvain local moving phase.
///
/// Scratch buffers are sized once for the first level; later levels only ever
/// have fewer nodes.
pub(crate) struct LocalMoving {
    communities: SparseMap,
    queue: QueueSet,
    pub(crate) delta_computations: usize,
    pub(crate) nodes_visited: usize,
}

impl LocalMoving {
    pub(crate) fn new(capacity: usize) -> Self {
        LocalMoving {
            communities: SparseMap::new(capacity),
            queue: QueueSet::new(capacity),
            delta_computations: 0,
            nodes_visited: 0,
        }
    }

    /// Move nodes of the current level until no move improves modularity.
    ///
    /// Returns the number of moves made.
    pub(crate) fn run<I: NeighborhoodIndex>(
        &mut self,
        index: &mut I,
        rng: &mut RandomSource,
        random_walk: bool,
    ) -> usize {
        let l = index.node_count();
        if l == 0 {
            return 0;
        }

        debug_assert!(self.queue.is_empty());
        let start = if random_walk { rng.random_index(l) } else { 0 };
        for s in 0..l {
            self.queue.enqueue((start + s) % l);
        }

        let mut moves = 0;

        while let Some(i) = self.queue.dequeue() {
            self.nodes_visited += 1;

            let degree = index.node_degree(i);
            let current = index.community_of(i);

            self.communities.clear();
            for (j, w) in index.core().neighbors(i) {
                self.communities.add(index.community_of(j), w);
            }

            let mut best = current;
            let mut best_delta = index.delta_with_own_community(
                i,
                degree,
                self.communities.get(current).unwrap_or(0.0),
                current,
            );

            for pos in 0..self.communities.len() {
                let (target, weight) = self.communities.entry(pos);
                if target == current {
                    continue;
                }

                self.delta_computations += 1;
                let delta = index.delta(i, degree, weight, target);

                if tie_breaker(best, current, target, delta, best_delta) {
                    best_delta = delta;
                    best = target;
                }
            }

            if best_delta >= 0.0 && best == current {
                continue;
            }

            // A node can be worse off in its own community than alone when
            // self-loops or a resolution other than 1 are involved.
            let destination = if best_delta < 0.0 {
                index.isolate(i, degree)
            } else {
                index.move_node(i, degree, best);
                best
            };

            if destination == current {
                continue;
            }
            moves += 1;

            for (j, _) in index.core().neighbors(i) {
                if index.community_of(j) != destination {
                    self.queue.enqueue(j);
                }
            }
        }

        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::common::tests::scripted;
    use crate::community::index::{DirectedIndex, IndexOptions, UndirectedIndex};
    use crate::graph::Graph;

    fn options() -> IndexOptions<'static> {
        IndexOptions {
            weight_attribute: "weight",
            weighted: true,
            resolution: 1.0,
            keep_dendrogram: false,
        }
    }

    fn double_triangle() -> Graph {
        let mut graph = Graph::undirected();
        for key in 0..6 {
            graph.add_node(key.to_string()).unwrap();
        }
        for (s, t) in [(0, 1), (0, 2), (1, 2), (3, 4), (3, 5), (4, 5), (2, 4)] {
            graph.add_edge(&s.to_string(), &t.to_string()).unwrap();
        }
        graph
    }

    #[test]
    fn finds_both_triangles() {
        let mut index = UndirectedIndex::new(&double_triangle(), &options());
        let mut rng = scripted(&[0.0]);
        let mut phase = LocalMoving::new(6);

        let moves = phase.run(&mut index, &mut rng, false);
        assert_eq!(moves, 4);
        assert_eq!(index.core().belongings, vec![1, 1, 1, 5, 5, 5]);
        // node 2 is visited again once node 4 leaves its singleton
        assert_eq!(phase.nodes_visited, 7);
        assert!(phase.delta_computations > 0);
    }

    #[test]
    fn converged_partition_is_stable() {
        let mut index = UndirectedIndex::new(&double_triangle(), &options());
        let mut rng = scripted(&[0.3, 0.7]);
        let mut phase = LocalMoving::new(6);

        assert!(phase.run(&mut index, &mut rng, true) > 0);
        let settled = index.core().belongings.clone();
        assert_eq!(phase.run(&mut index, &mut rng, true), 0);
        assert_eq!(index.core().belongings, settled);
    }

    #[test]
    fn isolates_nodes_detached_from_their_community() {
        let mut graph = double_triangle();
        graph.add_node("6").unwrap();
        graph.add_edge("6", "6").unwrap();
        let mut index = UndirectedIndex::new(&graph, &options());
        // node 6 only has a self-loop: sharing a community costs it quality
        index.expensive_move(6, 0);
        // start the traversal at node 6
        let mut rng = scripted(&[0.9]);
        let mut phase = LocalMoving::new(7);

        assert!(phase.run(&mut index, &mut rng, true) > 0);
        assert_eq!(index.community_of(6), 6);
        let belongings = &index.core().belongings;
        assert!((0..6).all(|i| belongings[i] != belongings[6]));
        assert_eq!(index.core().counts[belongings[6]], 1);
    }

    #[test]
    fn directed_cycles_are_found() {
        let mut graph = Graph::directed();
        for key in 0..6 {
            graph.add_node(key.to_string()).unwrap();
        }
        for (s, t) in [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 4)] {
            graph.add_edge(&s.to_string(), &t.to_string()).unwrap();
        }
        let mut index = DirectedIndex::new(&graph, &options());
        let mut rng = scripted(&[0.0]);
        let mut phase = LocalMoving::new(6);

        assert!(phase.run(&mut index, &mut rng, false) > 0);
        let b = &index.core().belongings;
        assert!(b[0] == b[1] && b[1] == b[2]);
        assert!(b[3] == b[4] && b[4] == b[5]);
        assert_ne!(b[0], b[3]);
    }
}
