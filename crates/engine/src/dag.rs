//! Static validation and graph construction — run at execution start.
//!
//! Validation enforces:
//! 1. Node IDs are unique within the workflow.
//! 2. Kind-specific required fields are present in node data.
//! 3. The directed graph is acyclic (Kahn's algorithm).
//! 4. (strict mode only) Every edge references existing node IDs.
//!
//! Outside strict mode, edges referencing unknown nodes are tolerated:
//! an unknown target is treated as a no-op and an unknown source is
//! ignored, both with a warning. Ill-formed documents from older editor
//! versions keep executing that way.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;
use tracing::warn;

use crate::models::{Node, NodeKind, Workflow};
use crate::EngineError;

/// Validate a workflow before execution.
pub fn validate(workflow: &Workflow, strict: bool) -> Result<(), EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Kind-specific required fields
    // -----------------------------------------------------------------------
    for node in &workflow.nodes {
        check_required_fields(node)?;
    }

    // -----------------------------------------------------------------------
    // 3. Edge endpoints (strict mode only)
    // -----------------------------------------------------------------------
    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    if strict {
        for edge in &workflow.edges {
            if !node_set.contains(edge.source.as_str()) {
                return Err(EngineError::UnknownNodeReference {
                    node_id: edge.source.clone(),
                    side: "source",
                });
            }
            if !node_set.contains(edge.target.as_str()) {
                return Err(EngineError::UnknownNodeReference {
                    node_id: edge.target.clone(),
                    side: "target",
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // 4. Acyclicity (Kahn's algorithm over well-formed edges)
    // -----------------------------------------------------------------------
    let graph = Graph::build(workflow);
    let mut remaining = graph.in_degree.clone();
    let mut queue: VecDeque<&str> = graph
        .in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| id.as_str())
        .collect();

    let mut visited = 0usize;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        if let Some(children) = graph.adjacency.get(node_id) {
            for child in children {
                if let Some(deg) = remaining.get_mut(child.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    if visited != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(())
}

/// Required node-data fields per kind. A field counts as present when the
/// key exists and is not `null`.
fn check_required_fields(node: &Node) -> Result<(), EngineError> {
    let missing = |field: &str| EngineError::MissingField {
        node_id: node.id.clone(),
        field: field.to_owned(),
    };
    let has = |field: &str| !matches!(node.data.get(field), None | Some(Value::Null));

    match &node.kind {
        NodeKind::HttpRequest => {
            if !has("url") {
                return Err(missing("url"));
            }
        }
        NodeKind::Code => {
            if !has("code") {
                return Err(missing("code"));
            }
        }
        NodeKind::AiChat => {
            if !has("prompt") && !has("systemPrompt") {
                return Err(missing("prompt or systemPrompt"));
            }
        }
        NodeKind::Database => {
            if !has("connectionString") {
                return Err(missing("connectionString"));
            }
            if !has("query") {
                return Err(missing("query"));
            }
        }
        NodeKind::Email => {
            for field in ["to", "subject", "body"] {
                if !has(field) {
                    return Err(missing(field));
                }
            }
        }
        // Webhooks and unknown kinds take no required fields.
        NodeKind::Webhook | NodeKind::Other(_) => {}
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Adjacency view of a workflow, used by the scheduler's traversal.
///
/// Edges referencing unknown nodes are dropped here (with a warning);
/// child lists preserve the workflow document's edge enumeration order,
/// which makes execution order deterministic for a given document.
pub struct Graph<'a> {
    pub nodes: HashMap<&'a str, &'a Node>,
    pub adjacency: HashMap<String, Vec<String>>,
    pub parents: HashMap<String, Vec<String>>,
    pub in_degree: HashMap<String, usize>,
}

impl<'a> Graph<'a> {
    pub fn build(workflow: &'a Workflow) -> Self {
        let mut nodes: HashMap<&str, &Node> = HashMap::new();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();
        let mut in_degree: HashMap<String, usize> = HashMap::new();

        for node in &workflow.nodes {
            nodes.insert(node.id.as_str(), node);
            adjacency.entry(node.id.clone()).or_default();
            parents.entry(node.id.clone()).or_default();
            in_degree.entry(node.id.clone()).or_insert(0);
        }

        for edge in &workflow.edges {
            if !nodes.contains_key(edge.source.as_str()) {
                warn!(
                    workflow_id = workflow.id,
                    edge = %edge.id,
                    source = %edge.source,
                    "edge source references unknown node; edge ignored"
                );
                continue;
            }
            if !nodes.contains_key(edge.target.as_str()) {
                warn!(
                    workflow_id = workflow.id,
                    edge = %edge.id,
                    target = %edge.target,
                    "edge target references unknown node; treated as no-op"
                );
                continue;
            }

            adjacency
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            parents
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
            *in_degree.entry(edge.target.clone()).or_insert(0) += 1;
        }

        Self {
            nodes,
            adjacency,
            parents,
            in_degree,
        }
    }

    /// Start nodes (in-degree zero), in workflow document order.
    pub fn start_nodes(&self, workflow: &'a Workflow) -> Vec<&'a Node> {
        workflow
            .nodes
            .iter()
            .filter(|n| self.in_degree.get(n.id.as_str()) == Some(&0))
            .collect()
    }

    pub fn children(&self, node_id: &str) -> &[String] {
        self.adjacency.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parents(&self, node_id: &str) -> &[String] {
        self.parents.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node reachable from `node_id` through one or more edges.
    pub fn descendants(&self, node_id: &str) -> Vec<String> {
        let mut reachable: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = self
            .children(node_id)
            .iter()
            .map(String::as_str)
            .collect();

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            reachable.push(current.to_owned());
            queue.extend(self.children(current).iter().map(String::as_str));
        }

        reachable
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Edge;
    use serde_json::json;

    fn make_node(id: &str, kind: &str, data: Value) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::from(kind.to_string()),
            position: Value::Null,
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            id: format!("{source}-{target}"),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    fn make_workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow::new(1, "test", nodes, edges)
    }

    #[test]
    fn valid_linear_dag_passes() {
        let workflow = make_workflow(
            vec![
                make_node("a", "webhook", json!({})),
                make_node("b", "http-request", json!({ "url": "https://x.test" })),
            ],
            vec![edge("a", "b")],
        );
        validate(&workflow, false).expect("should be valid");
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(
            vec![
                make_node("a", "webhook", json!({})),
                make_node("a", "webhook", json!({})),
            ],
            vec![],
        );
        assert!(matches!(
            validate(&workflow, false),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn missing_required_field_names_node_and_field() {
        let workflow = make_workflow(
            vec![make_node(
                "db1",
                "database",
                json!({ "connectionString": "postgres://x" }),
            )],
            vec![],
        );
        let err = validate(&workflow, false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: [db1] Missing required field: query"
        );
    }

    #[test]
    fn ai_chat_accepts_either_prompt_field() {
        let with_system = make_workflow(
            vec![make_node("ai", "ai-chat", json!({ "systemPrompt": "be terse" }))],
            vec![],
        );
        validate(&with_system, false).expect("systemPrompt alone is fine");

        let with_neither = make_workflow(vec![make_node("ai", "ai-chat", json!({}))], vec![]);
        assert!(matches!(
            validate(&with_neither, false),
            Err(EngineError::MissingField { field, .. }) if field == "prompt or systemPrompt"
        ));
    }

    #[test]
    fn null_valued_field_counts_as_missing() {
        let workflow = make_workflow(
            vec![make_node("h", "http-request", json!({ "url": null }))],
            vec![],
        );
        assert!(validate(&workflow, false).is_err());
    }

    #[test]
    fn cycle_is_detected() {
        let workflow = make_workflow(
            vec![
                make_node("a", "webhook", json!({})),
                make_node("b", "webhook", json!({})),
                make_node("c", "webhook", json!({})),
            ],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(
            validate(&workflow, false),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn unknown_edge_refs_tolerated_unless_strict() {
        let workflow = make_workflow(
            vec![make_node("a", "webhook", json!({}))],
            vec![edge("a", "ghost"), edge("phantom", "a")],
        );
        validate(&workflow, false).expect("lenient mode ignores unknown refs");
        assert!(matches!(
            validate(&workflow, true),
            Err(EngineError::UnknownNodeReference { .. })
        ));
    }

    #[test]
    fn graph_drops_unknown_edges_and_keeps_order() {
        let workflow = make_workflow(
            vec![
                make_node("a", "webhook", json!({})),
                make_node("b", "webhook", json!({})),
                make_node("c", "webhook", json!({})),
            ],
            vec![edge("a", "c"), edge("a", "b"), edge("a", "ghost")],
        );
        let graph = Graph::build(&workflow);
        // Edge enumeration order preserved; ghost edge dropped.
        assert_eq!(graph.children("a"), ["c", "b"]);
        assert_eq!(graph.in_degree["b"], 1);
        assert_eq!(graph.parents("c"), ["a"]);
    }

    #[test]
    fn descendants_cover_transitive_reachability() {
        //   a → b → d
        //    \→ c ↗
        let workflow = make_workflow(
            vec![
                make_node("a", "webhook", json!({})),
                make_node("b", "webhook", json!({})),
                make_node("c", "webhook", json!({})),
                make_node("d", "webhook", json!({})),
            ],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );
        let graph = Graph::build(&workflow);

        let mut from_a = graph.descendants("a");
        from_a.sort();
        assert_eq!(from_a, ["b", "c", "d"]);

        assert_eq!(graph.descendants("b"), ["d"]);
        assert!(graph.descendants("d").is_empty());
    }
}
