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
// https://arxiv.org/abs/1810.08473

//! Leiden refinement of a partition produced by local moving.
//!
//! Every community (the *macro* community) is split into *micro* communities
//! by merging singletons at random, and only into sub-communities that are
//! well-connected to the rest of the macro community. Nothing is ever merged
//! across macro boundaries.

use smallvec::SmallVec;
use tracing::trace;

use super::common::{counting_sort_groups, CommunityGroups, RandomSource, SparseMap};
use super::index::NeighborhoodIndex;

/// Pick a merge target among `candidates`, given as `(target, increment)`
/// pairs, with probability proportional to `exp(increment / randomness)`.
///
/// `draw` is a uniform value in `[0, 1)`. The target is located by binary
/// search over the cumulative distribution. When the cumulative total is not
/// finite the first candidate with the largest increment is returned instead.
///
/// Returns a position in `candidates`, which must not be empty.
///
/// ```
/// use leidenrs::community::refinement::sample_merge_target;
///
/// let candidates = [(0, 0.0), (4, 1.0)];
/// assert_eq!(sample_merge_target(&candidates, 1.0, 0.0), 0);
/// assert_eq!(sample_merge_target(&candidates, 1.0, 0.99), 1);
/// // overflowing weights fall back to the best increment
/// assert_eq!(sample_merge_target(&[(0, 0.0), (4, 1e6)], 0.01, 0.0), 1);
/// ```
pub fn sample_merge_target(candidates: &[(usize, f64)], randomness: f64, draw: f64) -> usize {
    debug_assert!(!candidates.is_empty());

    let mut cumulative: SmallVec<[f64; 16]> = SmallVec::with_capacity(candidates.len());
    let mut total = 0.0;
    for &(_, increment) in candidates {
        total += (increment / randomness).exp();
        cumulative.push(total);
    }

    if !total.is_finite() {
        let mut best = 0;
        for (pos, &(_, increment)) in candidates.iter().enumerate() {
            if increment > candidates[best].1 {
                best = pos;
            }
        }
        return best;
    }

    let r = draw * total;
    cumulative
        .partition_point(|&c| c <= r)
        .min(candidates.len().saturating_sub(1))
}

/// Refined partition of the current level.
#[derive(Clone, Debug)]
pub(crate) struct RefinedPartition {
    /// Nodes grouped by macro community.
    pub(crate) groups: CommunityGroups,
    /// Representative node of the micro community of every node.
    pub(crate) micro: Vec<usize>,
    /// Representatives of the micro communities of each macro community.
    pub(crate) representatives: Vec<Vec<usize>>,
}

impl RefinedPartition {
    pub(crate) fn micro_count(&self) -> usize {
        self.representatives.iter().map(Vec::len).sum()
    }
}

/// Buffers of a single merge run, reset for every macro community.
struct MergeScratch<D> {
    /// Node -> position inside the run. Only meaningful for nodes of the run.
    position: Vec<usize>,
    /// Position in the run -> micro community (itself a position).
    belongings: Vec<usize>,
    cluster_weights: Vec<D>,
    cluster_sizes: Vec<usize>,
    /// Weight between a micro community and the rest of its macro community.
    external_weights: Vec<f64>,
    neighbors: SparseMap,
    candidates: Vec<(usize, f64)>,
}

impl<D: Copy + Default> MergeScratch<D> {
    fn new(node_count: usize) -> Self {
        MergeScratch {
            position: vec![0; node_count],
            belongings: Vec::new(),
            cluster_weights: Vec::new(),
            cluster_sizes: Vec::new(),
            external_weights: Vec::new(),
            neighbors: SparseMap::new(0),
            candidates: Vec::new(),
        }
    }

    fn reset(&mut self, order: usize) {
        self.belongings.clear();
        self.belongings.extend(0..order);
        self.cluster_weights.clear();
        self.cluster_weights.resize(order, D::default());
        self.cluster_sizes.clear();
        self.cluster_sizes.resize(order, 1);
        self.external_weights.clear();
        self.external_weights.resize(order, 0.0);
    }
}

/// Split every community of `index` into well-connected micro communities.
///
/// The index itself is left untouched.
pub(crate) fn refine_partition<I: NeighborhoodIndex>(
    index: &I,
    rng: &mut RandomSource,
    randomness: f64,
) -> RefinedPartition {
    let core = index.core();
    let groups = counting_sort_groups(&core.belongings[..core.c], core.c);

    let mut micro = vec![0; core.c];
    let mut representatives = Vec::with_capacity(groups.len());
    let mut scratch = MergeScratch::new(core.c);

    for nodes in groups.iter() {
        let reps = merge_nodes_subset(index, nodes, rng, randomness, &mut scratch, &mut micro);
        trace!(
            community = index.community_of(nodes[0]),
            nodes = nodes.len(),
            micro_communities = reps.len(),
            "refined community"
        );
        representatives.push(reps);
    }

    RefinedPartition {
        groups,
        micro,
        representatives,
    }
}

/// Constrained random merge of the nodes of one macro community.
///
/// Writes the representative of every node's micro community into `micro`
/// and returns the distinct representatives.
fn merge_nodes_subset<I: NeighborhoodIndex>(
    index: &I,
    nodes: &[usize],
    rng: &mut RandomSource,
    randomness: f64,
    scratch: &mut MergeScratch<I::Degree>,
    micro: &mut [usize],
) -> Vec<usize> {
    let order = nodes.len();
    if order == 1 {
        micro[nodes[0]] = nodes[0];
        return vec![nodes[0]];
    }

    let community = index.community_of(nodes[0]);
    scratch.reset(order);

    let mut total_weight = I::Degree::default();
    for (j, &n) in nodes.iter().enumerate() {
        scratch.position[n] = j;
        let strength = index.strength(n);
        scratch.cluster_weights[j] = strength;
        total_weight += strength;

        for (neighbor, w) in index.core().neighbors(n) {
            if index.community_of(neighbor) == community {
                scratch.external_weights[j] += w;
            }
        }
    }

    let well_connected = |scratch: &MergeScratch<I::Degree>, cluster: usize| {
        let weight = scratch.cluster_weights[cluster];
        scratch.external_weights[cluster] >= index.expected_weight(weight, total_weight - weight)
    };

    let start = rng.random_index(order);

    for s in 0..order {
        let j = (start + s) % order;
        let n = nodes[j];
        let current = scratch.belongings[j];

        // only singletons are merged
        if scratch.cluster_sizes[current] != 1 {
            continue;
        }
        if !well_connected(scratch, current) {
            continue;
        }

        scratch.neighbors.clear();
        for (neighbor, w) in index.core().neighbors(n) {
            if index.community_of(neighbor) == community {
                let cluster = scratch.belongings[scratch.position[neighbor]];
                scratch.neighbors.add(cluster, w);
            }
        }

        let node_weight = scratch.cluster_weights[current];
        scratch.candidates.clear();
        scratch.candidates.push((current, 0.0));

        for pos in 0..scratch.neighbors.len() {
            let (cluster, weight) = scratch.neighbors.entry(pos);
            if cluster == current || !well_connected(scratch, cluster) {
                continue;
            }
            let increment =
                weight - index.expected_weight(node_weight, scratch.cluster_weights[cluster]);
            if increment >= 0.0 {
                scratch.candidates.push((cluster, increment));
            }
        }

        if scratch.candidates.len() == 1 {
            continue;
        }

        let chosen = sample_merge_target(&scratch.candidates, randomness, rng.next_f64());
        let target = scratch.candidates[chosen].0;
        if target == current {
            continue;
        }

        let weight_to_target = scratch.neighbors.get(target).unwrap_or(0.0);
        scratch.cluster_weights[target] += node_weight;
        scratch.external_weights[target] +=
            scratch.external_weights[current] - 2.0 * weight_to_target;
        scratch.cluster_sizes[target] += 1;

        scratch.cluster_weights[current] = I::Degree::default();
        scratch.external_weights[current] = 0.0;
        scratch.cluster_sizes[current] = 0;
        scratch.belongings[j] = target;
    }

    // A non-empty micro community always still holds the node it started from.
    let mut reps = Vec::new();
    for (j, &n) in nodes.iter().enumerate() {
        micro[n] = nodes[scratch.belongings[j]];
        if scratch.cluster_sizes[j] > 0 {
            reps.push(n);
        }
    }
    reps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::common::tests::scripted;
    use crate::community::index::{DirectedIndex, IndexOptions, UndirectedIndex};
    use crate::community::local_moving::LocalMoving;
    use crate::graph::Graph;
    use fixedbitset::FixedBitSet;
    use proptest::prelude::*;

    fn options() -> IndexOptions<'static> {
        IndexOptions {
            weight_attribute: "weight",
            weighted: true,
            resolution: 1.0,
            keep_dendrogram: false,
        }
    }

    fn graph_of(mut graph: Graph, n: usize, edges: &[(usize, usize)]) -> Graph {
        for key in 0..n {
            graph.add_node(key.to_string()).unwrap();
        }
        for &(s, t) in edges {
            graph.add_edge(&s.to_string(), &t.to_string()).unwrap();
        }
        graph
    }

    fn double_triangle() -> Graph {
        graph_of(
            Graph::undirected(),
            6,
            &[(0, 1), (0, 2), (1, 2), (3, 4), (3, 5), (4, 5), (2, 4)],
        )
    }

    #[test]
    fn sampling_follows_the_cumulative_distribution() {
        // weights e^0 = 1 and e^(ln 3) = 3: total 4
        let candidates = [(7, 0.0), (9, 3f64.ln())];
        assert_eq!(sample_merge_target(&candidates, 1.0, 0.0), 0);
        assert_eq!(sample_merge_target(&candidates, 1.0, 0.24), 0);
        assert_eq!(sample_merge_target(&candidates, 1.0, 0.26), 1);
        assert_eq!(sample_merge_target(&candidates, 1.0, 0.999), 1);
    }

    #[test]
    fn sampling_falls_back_to_arg_max_on_overflow() {
        let candidates = [(0, 0.0), (1, 50.0), (2, 80.0), (3, 80.0)];
        assert_eq!(sample_merge_target(&candidates, 0.01, 0.5), 2);
        assert_eq!(sample_merge_target(&[(5, 0.0)], 0.01, 0.7), 0);
    }

    #[test]
    fn low_temperature_favors_the_best_increment() {
        let candidates = [(0, 0.0), (1, 0.2), (2, 0.5)];
        for draw in [0.01, 0.3, 0.6, 0.99] {
            assert_eq!(sample_merge_target(&candidates, 0.01, draw), 2);
        }
    }

    #[test]
    fn refines_within_macro_communities() {
        let mut index = UndirectedIndex::new(&double_triangle(), &options());
        for (i, target) in [(1, 0), (2, 0), (3, 4), (5, 4)] {
            index.expensive_move(i, target);
        }
        let mut rng = scripted(&[0.0, 0.5, 0.5]);
        let refined = refine_partition(&index, &mut rng, 0.01);

        assert_eq!(refined.groups.len(), 2);
        assert_eq!(refined.groups.group(0), &[0, 1, 2]);
        assert_eq!(refined.groups.group(1), &[3, 4, 5]);
        // each triangle collapses into a single micro community
        assert_eq!(refined.micro_count(), 2);
        let m = &refined.micro;
        assert!(m[0] == m[1] && m[1] == m[2]);
        assert!(m[3] == m[4] && m[4] == m[5]);
        assert_ne!(m[0], m[3]);
    }

    #[test]
    fn never_merges_across_macro_communities() {
        let mut index = UndirectedIndex::new(&double_triangle(), &options());
        // a bad macro partition: {0, 1, 2, 4} and {3, 5}
        for (i, target) in [(1, 0), (2, 0), (4, 0), (5, 3)] {
            index.expensive_move(i, target);
        }
        let mut rng = scripted(&[0.1, 0.4, 0.8]);
        let refined = refine_partition(&index, &mut rng, 0.01);

        for (i, &rep) in refined.micro.iter().enumerate() {
            assert_eq!(index.community_of(i), index.community_of(rep));
        }
    }

    #[test]
    fn disconnected_macro_community_is_split() {
        // two separate edges forced into the same community
        let graph = graph_of(Graph::undirected(), 4, &[(0, 1), (2, 3)]);
        let mut index = UndirectedIndex::new(&graph, &options());
        for i in 1..4 {
            index.expensive_move(i, 0);
        }
        let mut rng = scripted(&[0.25, 0.5, 0.75]);
        let refined = refine_partition(&index, &mut rng, 0.01);

        assert_eq!(refined.micro_count(), 2);
        assert_eq!(refined.micro[0], refined.micro[1]);
        assert_eq!(refined.micro[2], refined.micro[3]);
        assert_ne!(refined.micro[0], refined.micro[2]);
    }

    #[test]
    fn representatives_belong_to_their_own_micro_community() {
        let graph = graph_of(
            Graph::directed(),
            6,
            &[(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 4)],
        );
        let mut index = DirectedIndex::new(&graph, &options());
        for i in 1..6 {
            index.expensive_move(i, 0);
        }
        let mut rng = scripted(&[0.6, 0.2, 0.9, 0.4]);
        let refined = refine_partition(&index, &mut rng, 0.01);

        for reps in &refined.representatives {
            for &rep in reps {
                assert_eq!(refined.micro[rep], rep);
            }
        }
        let distinct: std::collections::BTreeSet<_> = refined.micro.iter().collect();
        assert_eq!(distinct.len(), refined.micro_count());
    }

    /// Whether the members of every micro community reach each other through
    /// edges inside that micro community, ignoring edge direction.
    fn micro_communities_are_connected<I: NeighborhoodIndex>(
        index: &I,
        refined: &RefinedPartition,
    ) -> bool {
        let n = index.node_count();
        let mut seen = FixedBitSet::with_capacity(n);
        let mut stack = Vec::new();
        for rep in 0..n {
            if refined.micro[rep] != rep {
                continue;
            }
            seen.insert(rep);
            stack.push(rep);
            while let Some(i) = stack.pop() {
                for (j, _) in index.core().neighbors(i) {
                    if refined.micro[j] == rep && !seen.put(j) {
                        stack.push(j);
                    }
                }
            }
        }
        seen.count_ones(..) == n
    }

    fn refine_after_local_moving<I: NeighborhoodIndex>(
        index: &mut I,
        seed: u64,
        randomness: f64,
    ) -> RefinedPartition {
        let mut rng = RandomSource::new(None, Some(seed));
        LocalMoving::new(index.node_count()).run(index, &mut rng, true);
        refine_partition(&*index, &mut rng, randomness)
    }

    proptest! {
        #[test]
        fn micro_communities_are_connected_inside_their_macro_community(
            n in 2usize..24,
            edges in prop::collection::vec((0usize..24, 0usize..24, 1u8..6), 1..64),
            seed in any::<u64>(),
            directed in any::<bool>(),
            randomness in prop::sample::select(vec![0.001, 0.01, 0.5]),
        ) {
            let mut graph = if directed { Graph::directed() } else { Graph::undirected() };
            for key in 0..n {
                graph.add_node(key.to_string()).unwrap();
            }
            for &(s, t, w) in edges.iter().filter(|&&(s, t, _)| s < n && t < n) {
                let _ = graph.add_weighted_edge(&s.to_string(), &t.to_string(), f64::from(w));
            }
            prop_assume!(graph.edge_count() > 0);

            if directed {
                let mut index = DirectedIndex::new(&graph, &options());
                let refined = refine_after_local_moving(&mut index, seed, randomness);
                for i in 0..n {
                    prop_assert_eq!(index.community_of(refined.micro[i]), index.community_of(i));
                }
                prop_assert!(micro_communities_are_connected(&index, &refined));
            } else {
                let mut index = UndirectedIndex::new(&graph, &options());
                let refined = refine_after_local_moving(&mut index, seed, randomness);
                for i in 0..n {
                    prop_assert_eq!(index.community_of(refined.micro[i]), index.community_of(i));
                }
                prop_assert!(micro_communities_are_connected(&index, &refined));
            }
        }
    }
}
