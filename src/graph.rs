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

//! Attributed graph storage consumed by the community detection engine.
//!
//! Nodes are identified by string keys and numbered densely in insertion order;
//! that order is the node id order used everywhere in [`crate::community`].
//! Edges may be directed or undirected, and every node and edge carries a JSON
//! attribute map.

use indexmap::IndexMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::EdgeType;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Attribute map carried by nodes and edges.
pub type Attributes = Map<String, Value>;

/// Declared orientation of a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphType {
    Undirected,
    Directed,
    Mixed,
}

impl GraphType {
    fn as_str(self) -> &'static str {
        match self {
            GraphType::Undirected => "undirected",
            GraphType::Directed => "directed",
            GraphType::Mixed => "mixed",
        }
    }
}

#[derive(Clone, Debug)]
struct NodeData {
    key: String,
    attributes: Attributes,
}

#[derive(Clone, Debug)]
struct EdgeData {
    undirected: bool,
    attributes: Attributes,
}

/// A borrowed view over one edge of a [`Graph`].
#[derive(Clone, Copy, Debug)]
pub struct EdgeView<'a> {
    pub source: usize,
    pub target: usize,
    pub undirected: bool,
    pub attributes: &'a Attributes,
}

impl EdgeView<'_> {
    /// Weight stored under `attribute`, defaulting to `1.0` when the attribute
    /// is missing or not a number.
    #[inline]
    pub fn weight(&self, attribute: &str) -> f64 {
        self.attributes
            .get(attribute)
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
    }
}

/// Simple attributed graph, either undirected, directed or mixed.
///
/// Parallel edges are rejected; self-loops are allowed.
#[derive(Clone, Debug)]
pub struct Graph {
    graph_type: GraphType,
    inner: petgraph::Graph<NodeData, EdgeData>,
    keys: IndexMap<String, NodeIndex>,
    directed_size: usize,
    undirected_size: usize,
}

impl Graph {
    pub fn new(graph_type: GraphType) -> Self {
        Graph {
            graph_type,
            inner: petgraph::Graph::new(),
            keys: IndexMap::new(),
            directed_size: 0,
            undirected_size: 0,
        }
    }

    pub fn undirected() -> Self {
        Self::new(GraphType::Undirected)
    }

    pub fn directed() -> Self {
        Self::new(GraphType::Directed)
    }

    pub fn mixed() -> Self {
        Self::new(GraphType::Mixed)
    }

    /// Build an attributed graph out of any petgraph graph.
    ///
    /// Node keys are the petgraph node indices rendered as strings and every
    /// edge receives a `weight` attribute computed by `weight_fn`.
    pub fn from_petgraph<N, E, Ty, F>(
        graph: &petgraph::Graph<N, E, Ty>,
        mut weight_fn: F,
    ) -> Result<Self>
    where
        Ty: EdgeType,
        F: FnMut(&E) -> f64,
    {
        let mut result = if Ty::is_directed() {
            Graph::directed()
        } else {
            Graph::undirected()
        };
        for node in graph.node_indices() {
            result.add_node(node.index().to_string())?;
        }
        for edge in graph.edge_references() {
            let mut attributes = Attributes::new();
            attributes.insert("weight".to_string(), Value::from(weight_fn(edge.weight())));
            result.add_edge_with_attributes(
                &edge.source().index().to_string(),
                &edge.target().index().to_string(),
                attributes,
            )?;
        }
        Ok(result)
    }

    #[inline]
    pub fn graph_type(&self) -> GraphType {
        self.graph_type
    }

    /// Number of nodes (the graph order).
    #[inline]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of edges (the graph size).
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    #[inline]
    pub fn directed_size(&self) -> usize {
        self.directed_size
    }

    #[inline]
    pub fn undirected_size(&self) -> usize {
        self.undirected_size
    }

    /// Orientation the edges actually exhibit.
    ///
    /// A declared non-mixed type always wins. A mixed graph holding only one
    /// kind of edge is reported as that kind.
    pub fn infer_type(&self) -> GraphType {
        if self.graph_type != GraphType::Mixed {
            return self.graph_type;
        }
        if self.directed_size == 0 {
            return GraphType::Undirected;
        }
        if self.undirected_size == 0 {
            return GraphType::Directed;
        }
        GraphType::Mixed
    }

    pub fn add_node(&mut self, key: impl Into<String>) -> Result<usize> {
        self.add_node_with_attributes(key, Attributes::new())
    }

    pub fn add_node_with_attributes(
        &mut self,
        key: impl Into<String>,
        attributes: Attributes,
    ) -> Result<usize> {
        let key = key.into();
        if self.keys.contains_key(&key) {
            return Err(Error::DuplicateNode(key));
        }
        let index = self.inner.add_node(NodeData {
            key: key.clone(),
            attributes,
        });
        self.keys.insert(key, index);
        Ok(index.index())
    }

    #[inline]
    pub fn has_node(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Dense id of the node identified by `key`.
    #[inline]
    pub fn node_id(&self, key: &str) -> Option<usize> {
        self.keys.get(key).map(|index| index.index())
    }

    /// Key of the node with dense id `id`.
    #[inline]
    pub fn node_key(&self, id: usize) -> &str {
        &self.inner[NodeIndex::new(id)].key
    }

    pub fn node_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.keys().map(String::as_str)
    }

    pub fn node_attribute(&self, key: &str, name: &str) -> Option<&Value> {
        let index = self.keys.get(key)?;
        self.inner[*index].attributes.get(name)
    }

    pub fn set_node_attribute(&mut self, key: &str, name: &str, value: Value) -> Result<()> {
        let index = *self
            .keys
            .get(key)
            .ok_or_else(|| Error::UnknownNode(key.to_string()))?;
        self.inner[index].attributes.insert(name.to_string(), value);
        Ok(())
    }

    /// Sets an attribute of the node with dense id `id`.
    pub(crate) fn set_node_attribute_at(&mut self, id: usize, name: &str, value: Value) {
        self.inner[NodeIndex::new(id)]
            .attributes
            .insert(name.to_string(), value);
    }

    /// Adds an edge whose orientation follows the graph type. Mixed graphs
    /// receive a directed edge.
    pub fn add_edge(&mut self, source: &str, target: &str) -> Result<()> {
        self.add_edge_with_attributes(source, target, Attributes::new())
    }

    pub fn add_weighted_edge(&mut self, source: &str, target: &str, weight: f64) -> Result<()> {
        let mut attributes = Attributes::new();
        attributes.insert("weight".to_string(), Value::from(weight));
        self.add_edge_with_attributes(source, target, attributes)
    }

    pub fn add_edge_with_attributes(
        &mut self,
        source: &str,
        target: &str,
        attributes: Attributes,
    ) -> Result<()> {
        let undirected = self.graph_type == GraphType::Undirected;
        self.insert_edge(source, target, undirected, attributes)
    }

    pub fn add_directed_edge(
        &mut self,
        source: &str,
        target: &str,
        attributes: Attributes,
    ) -> Result<()> {
        if self.graph_type == GraphType::Undirected {
            return Err(Error::IncompatibleEdge {
                kind: "directed",
                graph_type: self.graph_type.as_str(),
            });
        }
        self.insert_edge(source, target, false, attributes)
    }

    pub fn add_undirected_edge(
        &mut self,
        source: &str,
        target: &str,
        attributes: Attributes,
    ) -> Result<()> {
        if self.graph_type == GraphType::Directed {
            return Err(Error::IncompatibleEdge {
                kind: "undirected",
                graph_type: self.graph_type.as_str(),
            });
        }
        self.insert_edge(source, target, true, attributes)
    }

    fn insert_edge(
        &mut self,
        source: &str,
        target: &str,
        undirected: bool,
        attributes: Attributes,
    ) -> Result<()> {
        let s = *self
            .keys
            .get(source)
            .ok_or_else(|| Error::UnknownNode(source.to_string()))?;
        let t = *self
            .keys
            .get(target)
            .ok_or_else(|| Error::UnknownNode(target.to_string()))?;

        if self.find_edge(s, t, undirected).is_some() {
            return Err(Error::DuplicateEdge {
                from: source.to_string(),
                to: target.to_string(),
            });
        }

        self.inner.add_edge(
            s,
            t,
            EdgeData {
                undirected,
                attributes,
            },
        );
        if undirected {
            self.undirected_size += 1;
        } else {
            self.directed_size += 1;
        }
        Ok(())
    }

    fn find_edge(&self, s: NodeIndex, t: NodeIndex, undirected: bool) -> Option<EdgeIndex> {
        let forward = self
            .inner
            .edges_connecting(s, t)
            .find(|edge| edge.weight().undirected == undirected)
            .map(|edge| edge.id());
        if forward.is_some() || !undirected {
            return forward;
        }
        self.inner
            .edges_connecting(t, s)
            .find(|edge| edge.weight().undirected)
            .map(|edge| edge.id())
    }

    /// Iterate every edge with dense endpoint ids.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.inner.edge_references().map(|edge| EdgeView {
            source: edge.source().index(),
            target: edge.target().index(),
            undirected: edge.weight().undirected,
            attributes: &edge.weight().attributes,
        })
    }
}

impl TryFrom<&Value> for Graph {
    type Error = Error;

    /// Import a serialized graph of the shape
    /// `{"options": {"type": ..}, "nodes": [{"key", "attributes"}],
    /// "edges": [{"source", "target", "attributes", "undirected"}]}`.
    fn try_from(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidGraph("expected a serialized graph object".into()))?;

        let graph_type = match object
            .get("options")
            .and_then(|options| options.get("type"))
            .and_then(Value::as_str)
        {
            None | Some("mixed") => GraphType::Mixed,
            Some("undirected") => GraphType::Undirected,
            Some("directed") => GraphType::Directed,
            Some(other) => {
                return Err(Error::InvalidGraph(format!("unknown graph type {other:?}")))
            }
        };

        let nodes = object
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidGraph("missing \"nodes\" array".into()))?;

        let mut graph = Graph::new(graph_type);

        for node in nodes {
            let key = node_key_of(node.get("key"))
                .ok_or_else(|| Error::InvalidGraph("node without a key".into()))?;
            let attributes = attributes_of(node.get("attributes"))?;
            graph
                .add_node_with_attributes(key, attributes)
                .map_err(invalid)?;
        }

        let edges = match object.get("edges") {
            None => return Ok(graph),
            Some(edges) => edges
                .as_array()
                .ok_or_else(|| Error::InvalidGraph("\"edges\" is not an array".into()))?,
        };

        for edge in edges {
            let source = node_key_of(edge.get("source"))
                .ok_or_else(|| Error::InvalidGraph("edge without a source".into()))?;
            let target = node_key_of(edge.get("target"))
                .ok_or_else(|| Error::InvalidGraph("edge without a target".into()))?;
            let attributes = attributes_of(edge.get("attributes"))?;
            let undirected = edge
                .get("undirected")
                .and_then(Value::as_bool)
                .unwrap_or(graph_type == GraphType::Undirected);

            let inserted = if undirected {
                graph.add_undirected_edge(&source, &target, attributes)
            } else {
                graph.add_directed_edge(&source, &target, attributes)
            };
            inserted.map_err(invalid)?;
        }

        Ok(graph)
    }
}

fn node_key_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(key) => Some(key.clone()),
        Value::Number(key) => Some(key.to_string()),
        _ => None,
    }
}

fn attributes_of(value: Option<&Value>) -> Result<Attributes> {
    match value {
        None | Some(Value::Null) => Ok(Attributes::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(Error::InvalidGraph("attributes must be an object".into())),
    }
}

fn invalid(err: Error) -> Error {
    Error::InvalidGraph(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_parallel_undirected_edges_in_both_directions() {
        let mut graph = Graph::undirected();
        graph.add_node("a").unwrap();
        graph.add_node("b").unwrap();
        graph.add_edge("a", "b").unwrap();
        assert!(matches!(
            graph.add_edge("b", "a"),
            Err(Error::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn duplicate_edge_error_names_both_endpoints() {
        let mut graph = Graph::directed();
        graph.add_node("a").unwrap();
        graph.add_node("b").unwrap();
        graph.add_edge("a", "b").unwrap();

        let err = graph.add_edge("a", "b").unwrap_err();
        match &err {
            Error::DuplicateEdge { from, to } => {
                assert_eq!(from, "a");
                assert_eq!(to, "b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "edge already exists between a and b");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn directed_edges_in_opposite_directions_are_distinct() {
        let mut graph = Graph::directed();
        graph.add_node("a").unwrap();
        graph.add_node("b").unwrap();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "a").unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.infer_type(), GraphType::Directed);
    }

    #[test]
    fn infers_type_of_mixed_graphs() {
        let mut graph = Graph::mixed();
        for key in ["a", "b", "c"] {
            graph.add_node(key).unwrap();
        }
        assert_eq!(graph.infer_type(), GraphType::Undirected);
        graph.add_directed_edge("a", "b", Attributes::new()).unwrap();
        assert_eq!(graph.infer_type(), GraphType::Directed);
        graph
            .add_undirected_edge("b", "c", Attributes::new())
            .unwrap();
        assert_eq!(graph.infer_type(), GraphType::Mixed);
    }

    #[test]
    fn incompatible_edges_are_refused() {
        let mut graph = Graph::undirected();
        graph.add_node("a").unwrap();
        graph.add_node("b").unwrap();
        assert!(matches!(
            graph.add_directed_edge("a", "b", Attributes::new()),
            Err(Error::IncompatibleEdge { .. })
        ));
        assert!(matches!(
            graph.add_edge("a", "z"),
            Err(Error::UnknownNode(_))
        ));
    }

    #[test]
    fn weight_defaults_to_one() {
        let mut graph = Graph::undirected();
        graph.add_node("a").unwrap();
        graph.add_node("b").unwrap();
        graph.add_node("c").unwrap();
        graph.add_weighted_edge("a", "b", 3.5).unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("weight".into(), json!("heavy"));
        graph
            .add_edge_with_attributes("b", "c", attributes)
            .unwrap();

        let weights: Vec<f64> = graph.edges().map(|edge| edge.weight("weight")).collect();
        assert_eq!(weights, vec![3.5, 1.0]);
    }

    #[test]
    fn imports_serialized_graph() {
        let value = json!({
            "options": {"type": "undirected"},
            "nodes": [{"key": "a"}, {"key": "b", "attributes": {"color": "red"}}, {"key": 3}],
            "edges": [
                {"source": "a", "target": "b", "attributes": {"weight": 2}},
                {"source": "b", "target": 3}
            ]
        });
        let graph = Graph::try_from(&value).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node_id("3"), Some(2));
        assert_eq!(graph.node_attribute("b", "color"), Some(&json!("red")));
        assert_eq!(graph.infer_type(), GraphType::Undirected);
    }

    #[test]
    fn non_graph_values_are_invalid() {
        for value in [json!(42), json!("graph"), json!({"edges": []}), json!(null)] {
            assert!(matches!(
                Graph::try_from(&value),
                Err(Error::InvalidGraph(_))
            ));
        }
        let dangling = json!({"nodes": [{"key": "a"}], "edges": [{"source": "a", "target": "b"}]});
        assert!(matches!(
            Graph::try_from(&dangling),
            Err(Error::InvalidGraph(_))
        ));
    }

    #[test]
    fn converts_petgraph_graphs() {
        let mut g: petgraph::Graph<(), f64, petgraph::Directed> = petgraph::Graph::new();
        let a = g.add_node(());
        let b = g.add_node(());
        g.add_edge(a, b, 4.0);
        let graph = Graph::from_petgraph(&g, |w| *w).unwrap();
        assert_eq!(graph.graph_type(), GraphType::Directed);
        let edge = graph.edges().next().unwrap();
        assert_eq!((edge.source, edge.target), (0, 1));
        assert_eq!(edge.weight("weight"), 4.0);
    }
}
