// Licensed under the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License. You may obtain
// a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the
// License for the specific language governing permissions and limitations
// under the License.

//! `leidenrs`: Leiden community detection for weighted graphs.
//!
//! The engine optimizes modularity with the Louvain local-moving heuristic and
//! the Leiden refinement step. Refinement only merges sub-communities that
//! satisfy the well-connectedness constraint, and every returned community
//! induces a connected subgraph (weakly connected for directed graphs).
//!
//! Public invariants:
//! - **Partition**: every node of the input graph receives exactly one community id.
//! - **Determinism**: given the same graph, options and random source, two runs
//!   produce identical partitions.
//! - **Orientation**: graphs must be purely undirected or purely directed; mixed
//!   graphs are rejected before any work is done.
//!
//! ```
//! use leidenrs::{detect, Graph, LeidenOptions};
//!
//! let mut graph = Graph::undirected();
//! for key in ["a", "b", "c"] {
//!     graph.add_node(key).unwrap();
//! }
//! graph.add_edge("a", "b").unwrap();
//! graph.add_edge("b", "c").unwrap();
//!
//! let communities = detect(&graph, LeidenOptions::default()).unwrap();
//! assert_eq!(communities.len(), 3);
//! ```

pub mod community;
pub mod graph;

pub use community::leiden::{
    detect, detect_and_assign, detect_and_assign_detailed, detect_detailed, detect_value,
    AttributeNames, LeidenOptions, LeidenReport, RngFn,
};
pub use community::modularity::{modularity, ModularityOptions};
pub use graph::{Graph, GraphType};

/// Errors raised while building graphs or running community detection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the given graph is not a valid graph instance: {0}")]
    InvalidGraph(String),
    #[error("cannot run the algorithm on a true mixed graph")]
    MixedGraph,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("node already exists: {0}")]
    DuplicateNode(String),
    #[error("edge already exists between {from} and {to}")]
    DuplicateEdge { from: String, to: String },
    #[error("cannot add {kind} edge to a {graph_type} graph")]
    IncompatibleEdge {
        kind: &'static str,
        graph_type: &'static str,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
