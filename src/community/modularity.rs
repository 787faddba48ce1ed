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

//! Modularity of an arbitrary partition of a [`Graph`].

use foldhash::{HashMap, HashMapExt};
use indexmap::IndexMap;

use crate::graph::{Graph, GraphType};
use crate::{Error, Result};

/// Options of [`modularity`].
#[derive(Clone, Debug, PartialEq)]
pub struct ModularityOptions {
    pub resolution: f64,
    pub weighted: bool,
    pub weight_attribute: String,
}

impl Default for ModularityOptions {
    fn default() -> Self {
        ModularityOptions {
            resolution: 1.0,
            weighted: false,
            weight_attribute: "weight".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct CommunityTotals {
    internal: f64,
    outward: f64,
    inward: f64,
}

/// Modularity of `partition`, which maps every node key to a community.
///
/// For undirected graphs `Q = Σ_c [ L_c / m - γ (k_c / 2m)^2 ]`, where `m` is
/// the total edge weight, `L_c` the weight inside `c` and `k_c` the sum of the
/// degrees of its nodes. For directed graphs
/// `Q = Σ_c [ L_c / m - γ k_c^out k_c^in / m^2 ]`.
///
/// A graph without any edge weight has an undefined modularity: NaN.
///
/// ```
/// use indexmap::IndexMap;
/// use leidenrs::{modularity, Graph, ModularityOptions};
///
/// let mut graph = Graph::undirected();
/// for key in ["a", "b", "c", "d"] {
///     graph.add_node(key).unwrap();
/// }
/// graph.add_edge("a", "b").unwrap();
/// graph.add_edge("c", "d").unwrap();
///
/// let partition: IndexMap<String, usize> =
///     [("a", 0), ("b", 0), ("c", 1), ("d", 1)].map(|(k, c)| (k.to_string(), c)).into_iter().collect();
/// let q = modularity(&graph, &partition, &ModularityOptions::default()).unwrap();
/// assert!((q - 0.5).abs() < 1e-12);
/// ```
pub fn modularity(
    graph: &Graph,
    partition: &IndexMap<String, usize>,
    options: &ModularityOptions,
) -> Result<f64> {
    let graph_type = graph.infer_type();
    if graph_type == GraphType::Mixed {
        return Err(Error::MixedGraph);
    }
    if !(options.resolution.is_finite() && options.resolution > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "resolution must be a positive number, got {}",
            options.resolution
        )));
    }

    let mut node_to_comm = Vec::with_capacity(graph.node_count());
    for key in graph.node_keys() {
        match partition.get(key) {
            Some(&community) => node_to_comm.push(community),
            None => {
                return Err(Error::InvalidParameter(format!(
                    "partition is not a complete partition of the graph: {key} is missing"
                )))
            }
        }
    }

    Ok(modularity_core(
        graph,
        &node_to_comm,
        graph_type == GraphType::Directed,
        options,
    ))
}

fn modularity_core(graph: &Graph, node_to_comm: &[usize], directed: bool, options: &ModularityOptions) -> f64 {
    let mut totals: HashMap<usize, CommunityTotals> = HashMap::new();
    let mut m = 0.0;

    for edge in graph.edges() {
        let weight = if options.weighted {
            edge.weight(&options.weight_attribute)
        } else {
            1.0
        };
        m += weight;

        let source = node_to_comm[edge.source];
        let target = node_to_comm[edge.target];

        totals.entry(source).or_default().outward += weight;
        totals.entry(target).or_default().inward += weight;
        if source == target {
            totals.entry(source).or_default().internal += weight;
        }
    }

    if m == 0.0 {
        return f64::NAN;
    }

    let gamma = options.resolution;
    totals
        .values()
        .map(|c| {
            let expected = if directed {
                c.outward * c.inward / (m * m)
            } else {
                ((c.outward + c.inward) / (2.0 * m)).powi(2)
            };
            c.internal / m - gamma * expected
        })
        .sum()
}
