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

//! Leiden community detection driver.
//!
//! Every level runs local moving until no node wants to move. When at least
//! one move was made, the partition is refined into well-connected
//! sub-communities and folded into the induced graph of the next level;
//! otherwise the run has converged and the communities of the last level are
//! reported for the original nodes.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::coarsening::commit_level;
use super::common::RandomSource;
use super::index::{IndexOptions, LouvainIndex, NeighborhoodIndex};
use super::local_moving::LocalMoving;
use super::refinement::refine_partition;
use crate::graph::{Graph, GraphType};
use crate::{Error, Result};

pub use super::common::RngFn;

/// Names of the attributes read and written by the detection.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    /// Node attribute receiving the community in assign mode.
    pub community: String,
    /// Edge attribute holding the weight of weighted runs.
    pub weight: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        AttributeNames {
            community: "community".to_string(),
            weight: "weight".to_string(),
        }
    }
}

/// Options of a detection run.
///
/// Options can be built in code or read from JSON, where every field is
/// optional:
///
/// ```
/// use leidenrs::LeidenOptions;
///
/// let options = LeidenOptions::from_json(r#"{"resolution": 0.5, "randomWalk": false}"#).unwrap();
/// assert_eq!(options.resolution, 0.5);
/// assert!(!options.random_walk);
/// assert_eq!(options.randomness, 0.01);
/// ```
#[derive(Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeidenOptions {
    pub attributes: AttributeNames,
    /// Temperature of the random merges of the refinement. Must be positive.
    pub randomness: f64,
    /// Start every traversal of the local moving phase at a random node.
    #[serde(alias = "random_walk")]
    pub random_walk: bool,
    /// Resolution of the modularity. Higher values favor smaller communities.
    pub resolution: f64,
    /// Read edge weights from `attributes.weight` instead of counting every
    /// edge as 1.
    pub weighted: bool,
    /// Seed of the default random source. Ignored when `rng` is set.
    pub seed: Option<u64>,
    /// Custom source of uniform values in `[0, 1)`.
    #[serde(skip)]
    pub rng: Option<RngFn>,
}

impl Default for LeidenOptions {
    fn default() -> Self {
        LeidenOptions {
            attributes: AttributeNames::default(),
            randomness: 0.01,
            random_walk: true,
            resolution: 1.0,
            weighted: false,
            seed: None,
            rng: None,
        }
    }
}

impl fmt::Debug for LeidenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeidenOptions")
            .field("attributes", &self.attributes)
            .field("randomness", &self.randomness)
            .field("random_walk", &self.random_walk)
            .field("resolution", &self.resolution)
            .field("weighted", &self.weighted)
            .field("seed", &self.seed)
            .field("rng", &self.rng.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl LeidenOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_randomness(mut self, randomness: f64) -> Self {
        self.randomness = randomness;
        self
    }

    pub fn with_random_walk(mut self, random_walk: bool) -> Self {
        self.random_walk = random_walk;
        self
    }

    pub fn with_weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_rng(mut self, rng: impl FnMut() -> f64 + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn with_community_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.community = name.into();
        self
    }

    pub fn with_weight_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.weight = name.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "resolution must be a positive number, got {}",
                self.resolution
            )));
        }
        if !(self.randomness.is_finite() && self.randomness > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "randomness must be a positive number, got {}",
                self.randomness
            )));
        }
        Ok(())
    }
}

/// Detailed outcome of a detection run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeidenReport {
    /// Community of every node, absent when communities were assigned to the
    /// graph instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communities: Option<IndexMap<String, usize>>,
    /// Number of communities.
    pub count: usize,
    pub delta_computations: usize,
    /// Community of every original node after each coarsening level.
    pub dendrogram: Option<Vec<Vec<usize>>>,
    /// Number of coarsening levels.
    pub level: usize,
    /// Modularity of the partition, NaN for a graph without edges.
    pub modularity: f64,
    /// Moves made by local moving at each level.
    pub moves: Option<Vec<usize>>,
    pub nodes_visited: usize,
    pub resolution: f64,
}

/// Run the Leiden algorithm on `graph` and return the community of every node.
///
/// ```
/// use leidenrs::{detect, Graph, LeidenOptions};
///
/// let mut graph = Graph::undirected();
/// for key in ["a", "b", "c", "d"] {
///     graph.add_node(key).unwrap();
/// }
/// graph.add_edge("a", "b").unwrap();
/// graph.add_edge("c", "d").unwrap();
///
/// let communities = detect(&graph, LeidenOptions::default().with_seed(7)).unwrap();
/// assert_eq!(communities["a"], communities["b"]);
/// assert_ne!(communities["a"], communities["c"]);
/// ```
pub fn detect(graph: &Graph, options: LeidenOptions) -> Result<IndexMap<String, usize>> {
    let outcome = run(graph, options, false)?;
    Ok(outcome.mapping(graph))
}

/// Run the Leiden algorithm and write the community of every node into the
/// `attributes.community` node attribute.
pub fn detect_and_assign(graph: &mut Graph, options: LeidenOptions) -> Result<()> {
    let attribute = options.attributes.community.clone();
    let outcome = run(graph, options, false)?;
    outcome.assign(graph, &attribute);
    Ok(())
}

/// Run the Leiden algorithm and return a detailed report.
pub fn detect_detailed(graph: &Graph, options: LeidenOptions) -> Result<LeidenReport> {
    let outcome = run(graph, options, true)?;
    let communities = outcome.mapping(graph);
    Ok(outcome.into_report(Some(communities)))
}

/// Assign communities like [`detect_and_assign`] and return the detailed
/// report, without the mapping.
pub fn detect_and_assign_detailed(graph: &mut Graph, options: LeidenOptions) -> Result<LeidenReport> {
    let attribute = options.attributes.community.clone();
    let outcome = run(graph, options, true)?;
    outcome.assign(graph, &attribute);
    Ok(outcome.into_report(None))
}

/// Run [`detect`] on a serialized graph.
pub fn detect_value(value: &Value, options: LeidenOptions) -> Result<IndexMap<String, usize>> {
    let graph = Graph::try_from(value)?;
    detect(&graph, options)
}

/// Raw results of a run, indexed by dense node id.
struct Outcome {
    communities: Vec<usize>,
    count: usize,
    delta_computations: usize,
    dendrogram: Option<Vec<Vec<usize>>>,
    level: usize,
    modularity: f64,
    moves: Option<Vec<usize>>,
    nodes_visited: usize,
    resolution: f64,
}

impl Outcome {
    fn mapping(&self, graph: &Graph) -> IndexMap<String, usize> {
        graph
            .node_keys()
            .zip(&self.communities)
            .map(|(key, &community)| (key.to_string(), community))
            .collect()
    }

    fn assign(&self, graph: &mut Graph, attribute: &str) {
        for (id, &community) in self.communities.iter().enumerate() {
            graph.set_node_attribute_at(id, attribute, Value::from(community));
        }
    }

    fn into_report(self, communities: Option<IndexMap<String, usize>>) -> LeidenReport {
        LeidenReport {
            communities,
            count: self.count,
            delta_computations: self.delta_computations,
            dendrogram: self.dendrogram,
            level: self.level,
            modularity: self.modularity,
            moves: self.moves,
            nodes_visited: self.nodes_visited,
            resolution: self.resolution,
        }
    }
}

fn run(graph: &Graph, mut options: LeidenOptions, detailed: bool) -> Result<Outcome> {
    let graph_type = graph.infer_type();
    if graph_type == GraphType::Mixed {
        return Err(Error::MixedGraph);
    }
    options.validate()?;

    let n = graph.node_count();
    if graph.edge_count() == 0 {
        debug!(nodes = n, "graph has no edges, every node is its own community");
        return Ok(Outcome {
            communities: (0..n).collect(),
            count: n,
            delta_computations: 0,
            dendrogram: None,
            level: 0,
            modularity: f64::NAN,
            moves: None,
            nodes_visited: 0,
            resolution: options.resolution,
        });
    }

    let directed = graph_type == GraphType::Directed;
    debug!(
        nodes = n,
        edges = graph.edge_count(),
        directed,
        resolution = options.resolution,
        "running leiden"
    );

    let mut rng = RandomSource::new(options.rng.take(), options.seed);
    let index_options = IndexOptions {
        weight_attribute: &options.attributes.weight,
        weighted: options.weighted,
        resolution: options.resolution,
        keep_dendrogram: detailed,
    };

    let outcome = match LouvainIndex::new(graph, directed, &index_options) {
        LouvainIndex::Undirected(mut index) => run_levels(&mut index, &mut rng, &options, detailed),
        LouvainIndex::Directed(mut index) => run_levels(&mut index, &mut rng, &options, detailed),
    };
    Ok(outcome)
}

fn run_levels<I: NeighborhoodIndex>(
    index: &mut I,
    rng: &mut RandomSource,
    options: &LeidenOptions,
    detailed: bool,
) -> Outcome {
    let mut phase = LocalMoving::new(index.core().n);
    let mut moves = Vec::new();

    loop {
        let level = index.core().level;
        let nodes = index.node_count();
        let made = phase.run(index, rng, options.random_walk);
        moves.push(made);

        if made == 0 {
            debug!(level, nodes, "converged");
            break;
        }

        let refined = refine_partition(index, rng, options.randomness);
        let induced = commit_level(index, &refined);
        debug!(
            level,
            nodes,
            moves = made,
            micro_communities = refined.micro_count(),
            induced,
            "level done"
        );
    }

    let core = index.core();
    Outcome {
        communities: core.collect(),
        count: core.community_count(),
        delta_computations: phase.delta_computations,
        dendrogram: core.dendrogram.clone(),
        level: core.level,
        modularity: if detailed { index.modularity() } else { f64::NAN },
        moves: Some(moves),
        nodes_visited: phase.nodes_visited,
        resolution: core.resolution,
    }
}
