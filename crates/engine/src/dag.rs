//! Graph structure computed once when a run starts.
//!
//! Pure functions of (nodes, edges):
//! 1. Adjacency list: node id → downstream node ids, in edge order.
//! 2. Indegree table: node id → number of incoming edges (0 for roots).
//! 3. Start set: nodes whose indegree is 0, in declaration order.
//!
//! Nothing is validated. Edges pointing at undeclared nodes still appear in
//! the adjacency list but never count towards an indegree; the scheduler
//! skips such targets when propagating.

use std::collections::{HashMap, HashSet};

use crate::models::{Edge, GraphRequest, Node};

/// Build the adjacency list (node id → downstream ids).
pub fn build_adjacency(edges: &[Edge]) -> HashMap<String, Vec<String>> {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.from_node_id.clone())
            .or_default()
            .push(edge.to_node_id.clone());
    }
    adjacency
}

/// Build the indegree table over the declared node set.
pub fn build_indegree(nodes: &[Node], edges: &[Edge]) -> HashMap<String, usize> {
    let mut in_degree: HashMap<String, usize> =
        nodes.iter().map(|n| (n.id.clone(), 0)).collect();

    for edge in edges {
        if let Some(deg) = in_degree.get_mut(&edge.to_node_id) {
            *deg += 1;
        }
    }
    in_degree
}

/// Immutable view of one submitted graph.
#[derive(Debug, Clone)]
pub struct Dag {
    nodes: HashMap<String, Node>,
    /// Node ids in declaration order, first occurrence wins the slot.
    order: Vec<String>,
    adjacency: HashMap<String, Vec<String>>,
    indegree: HashMap<String, usize>,
}

impl Dag {
    pub fn new(graph: GraphRequest) -> Self {
        let adjacency = build_adjacency(&graph.edges);
        let indegree = build_indegree(&graph.nodes, &graph.edges);

        let mut seen: HashSet<&str> = HashSet::new();
        let order: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| seen.insert(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();

        let nodes = graph.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        Self {
            nodes,
            order,
            adjacency,
            indegree,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Declared node ids, in declaration order.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn downstream(&self, id: &str) -> &[String] {
        self.adjacency.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn indegree(&self, id: &str) -> usize {
        self.indegree.get(id).copied().unwrap_or(0)
    }

    /// Nodes with no incoming edges.
    pub fn start_nodes(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.indegree(id) == 0)
            .cloned()
            .collect()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpConfig;

    fn make_node(id: &str) -> Node {
        Node::http(id, HttpConfig::get(format!("http://{id}.local")))
    }

    fn make_dag(ids: &[&str], edges: &[(&str, &str)]) -> Dag {
        Dag::new(GraphRequest {
            nodes: ids.iter().map(|id| make_node(id)).collect(),
            edges: edges.iter().map(|(f, t)| Edge::new(*f, *t)).collect(),
        })
    }

    #[test]
    fn linear_chain_has_single_root() {
        // A → B → C
        let dag = make_dag(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);

        assert_eq!(dag.start_nodes(), vec!["a"]);
        assert_eq!(dag.downstream("a"), ["b"]);
        assert_eq!(dag.downstream("c"), [] as [String; 0]);
        assert_eq!(dag.indegree("c"), 1);
    }

    #[test]
    fn diamond_join_counts_both_parents() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let dag = make_dag(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );

        assert_eq!(dag.start_nodes(), vec!["a"]);
        assert_eq!(dag.indegree("d"), 2);
        assert_eq!(dag.downstream("a"), ["b", "c"]);
    }

    #[test]
    fn every_isolated_node_is_a_start_node() {
        let dag = make_dag(&["x", "y", "z"], &[]);
        assert_eq!(dag.start_nodes(), vec!["x", "y", "z"]);
    }

    #[test]
    fn edge_to_undeclared_node_does_not_count() {
        let indegree = build_indegree(&[make_node("a")], &[Edge::new("a", "ghost")]);
        assert_eq!(indegree.get("a"), Some(&0));
        assert!(!indegree.contains_key("ghost"));

        let adjacency = build_adjacency(&[Edge::new("a", "ghost")]);
        assert_eq!(adjacency["a"], vec!["ghost"]);
    }

    #[test]
    fn duplicate_edges_count_twice() {
        let dag = make_dag(&["a", "b"], &[("a", "b"), ("a", "b")]);
        assert_eq!(dag.indegree("b"), 2);
        assert_eq!(dag.downstream("a").len(), 2);
    }
}
