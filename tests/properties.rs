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

//! Property-based tests of the detection on small random graphs.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use leidenrs::{detect, detect_detailed, modularity, Graph, LeidenOptions, ModularityOptions};
use proptest::prelude::*;

/// Node count and weighted edge list. Duplicate edges are dropped when the
/// graph is built.
fn edges_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize, u8)>)> {
    (1usize..24).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec((0..n, 0..n, 1u8..6), 0..64),
        )
    })
}

fn build(mut graph: Graph, n: usize, edges: &[(usize, usize, u8)]) -> Graph {
    for key in 0..n {
        graph.add_node(key.to_string()).unwrap();
    }
    for &(s, t, w) in edges {
        // duplicates are rejected; keeping the first one is fine here
        let _ = graph.add_weighted_edge(&s.to_string(), &t.to_string(), f64::from(w));
    }
    graph
}

fn options(seed: u64) -> LeidenOptions {
    LeidenOptions::default().with_weighted(true).with_seed(seed)
}

/// Whether every community induces a connected subgraph, edge direction
/// ignored.
fn communities_are_connected(graph: &Graph, communities: &IndexMap<String, usize>) -> bool {
    let n = graph.node_count();
    let mut adjacency = vec![Vec::new(); n];
    for edge in graph.edges() {
        adjacency[edge.source].push(edge.target);
        adjacency[edge.target].push(edge.source);
    }
    let community: Vec<usize> = communities.values().copied().collect();

    let mut seen = vec![false; n];
    let mut reached = BTreeSet::new();
    for start in 0..n {
        if seen[start] {
            continue;
        }
        // a second flood fill starting in an already reached community
        // means that community has more than one piece
        if !reached.insert(community[start]) {
            return false;
        }
        seen[start] = true;
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            for &j in &adjacency[i] {
                if community[j] == community[start] && !seen[j] {
                    seen[j] = true;
                    stack.push(j);
                }
            }
        }
    }
    true
}

fn singletons(graph: &Graph) -> IndexMap<String, usize> {
    graph
        .node_keys()
        .enumerate()
        .map(|(i, key)| (key.to_string(), i))
        .collect()
}

proptest! {
    /// Every node gets exactly one community.
    #[test]
    fn partition_is_valid((n, edges) in edges_strategy(), seed in any::<u64>(), directed in any::<bool>()) {
        let graph = if directed { Graph::directed() } else { Graph::undirected() };
        let graph = build(graph, n, &edges);
        let communities = detect(&graph, options(seed)).unwrap();

        prop_assert_eq!(communities.len(), n);
        for (key, expected) in communities.keys().zip(graph.node_keys()) {
            prop_assert_eq!(key.as_str(), expected);
        }
        prop_assert!(communities.values().all(|&c| c < n));
    }

    /// The same seed always gives the same partition.
    #[test]
    fn runs_are_reproducible((n, edges) in edges_strategy(), seed in any::<u64>()) {
        let graph = build(Graph::undirected(), n, &edges);
        let a = detect_detailed(&graph, options(seed)).unwrap();
        let b = detect_detailed(&graph, options(seed)).unwrap();
        prop_assert_eq!(a.communities, b.communities);
        prop_assert_eq!(a.moves, b.moves);
        prop_assert_eq!(a.count, b.count);
    }

    /// The partition found is never worse than the singleton partition, and the
    /// reported modularity matches an independent evaluation.
    #[test]
    fn modularity_improves_on_singletons((n, edges) in edges_strategy(), seed in any::<u64>(), directed in any::<bool>()) {
        let graph = if directed { Graph::directed() } else { Graph::undirected() };
        let graph = build(graph, n, &edges);
        prop_assume!(graph.edge_count() > 0);

        let report = detect_detailed(&graph, options(seed)).unwrap();
        let communities = report.communities.as_ref().unwrap();

        let evaluation = ModularityOptions { weighted: true, ..Default::default() };
        let found = modularity(&graph, communities, &evaluation).unwrap();
        let baseline = modularity(&graph, &singletons(&graph), &evaluation).unwrap();

        prop_assert!(found >= baseline - 1e-9, "found={} baseline={}", found, baseline);
        prop_assert!((found - report.modularity).abs() < 1e-9, "found={} reported={}", found, report.modularity);
    }

    /// The dendrogram ends with the reported communities.
    #[test]
    fn dendrogram_is_consistent((n, edges) in edges_strategy(), seed in any::<u64>()) {
        let graph = build(Graph::undirected(), n, &edges);
        prop_assume!(graph.edge_count() > 0);

        let report = detect_detailed(&graph, options(seed)).unwrap();
        let dendrogram = report.dendrogram.unwrap();
        prop_assert_eq!(dendrogram.len(), report.level);
        if let Some(last) = dendrogram.last() {
            let communities: Vec<usize> = report.communities.unwrap().values().copied().collect();
            prop_assert_eq!(last, &communities);
        }
    }

    /// Every community is connected, whatever the resolution.
    #[test]
    fn undirected_communities_are_connected(
        (n, edges) in edges_strategy(),
        seed in any::<u64>(),
        resolution in prop::sample::select(vec![0.3, 1.0, 2.5]),
    ) {
        let graph = build(Graph::undirected(), n, &edges);
        let communities = detect(&graph, options(seed).with_resolution(resolution)).unwrap();
        prop_assert!(
            communities_are_connected(&graph, &communities),
            "resolution={} communities={:?}", resolution, communities
        );
    }

    /// Directed communities are at least weakly connected: no community
    /// gathers nodes that only share a neighbor outside of it.
    #[test]
    fn directed_communities_are_weakly_connected(
        (n, edges) in edges_strategy(),
        seed in any::<u64>(),
        resolution in prop::sample::select(vec![0.3, 1.0, 2.5]),
    ) {
        let graph = build(Graph::directed(), n, &edges);
        let communities = detect(&graph, options(seed).with_resolution(resolution)).unwrap();
        prop_assert!(
            communities_are_connected(&graph, &communities),
            "resolution={} communities={:?}", resolution, communities
        );
    }
}
