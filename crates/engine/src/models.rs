//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. Serialized form matches the visual editor's persisted document
//! format (camelCase keys, `type` discriminator on nodes).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-execution mapping from node id to that node's output, visible to
/// downstream nodes.
pub type Context = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// The closed set of built-in node kinds, plus a permissive fallback so
/// persisted workflows with forward-compatible node types still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Webhook,
    HttpRequest,
    Code,
    AiChat,
    Database,
    Email,
    /// Unknown node type; carried verbatim and handled by the fallback arm.
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Webhook => "webhook",
            Self::HttpRequest => "http-request",
            Self::Code => "code",
            Self::AiChat => "ai-chat",
            Self::Database => "database",
            Self::Email => "email",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "webhook" => Self::Webhook,
            "http-request" => Self::HttpRequest,
            "code" => Self::Code,
            "ai-chat" => Self::AiChat,
            "database" => Self::Database,
            "email" => Self::Email,
            _ => Self::Other(s),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Opaque editor layout metadata; the engine never inspects it.
    #[serde(default)]
    pub position: Value,
    /// Arbitrary configuration passed to the node's handler.
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed dependency: `target` may execute only after `source` succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(id: i64, name: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: String::new(),
            is_active: true,
            nodes,
            edges,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Lifecycle state of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Terminal statuses are never transitioned out of.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A single run of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: i64,
    pub workflow_id: i64,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Final context: node id → output value. Present on terminal executions.
    pub data: Option<Value>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A stored credential. `data` is always ciphertext
/// (base64(IV || tag || ciphertext), AES-256-GCM) — never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Lifecycle state of a single node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

/// Progress of one node, embedded in [`ExecutionProgress`] snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProgress {
    pub node_id: String,
    pub status: NodeRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeProgress {
    pub fn pending(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeRunStatus::Pending,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// A full snapshot of an in-flight execution, broadcast on every scheduler
/// state change and discarded once the execution terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    pub execution_id: i64,
    pub workflow_id: i64,
    pub status: ExecutionStatus,
    pub nodes: Vec<NodeProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_kind_round_trips_through_strings() {
        for kind in ["webhook", "http-request", "code", "ai-chat", "database", "email"] {
            let parsed = NodeKind::from(kind.to_string());
            assert_eq!(parsed.as_str(), kind);
            assert!(!matches!(parsed, NodeKind::Other(_)));
        }
        let unknown = NodeKind::from("slack-post".to_string());
        assert_eq!(unknown, NodeKind::Other("slack-post".into()));
        assert_eq!(unknown.as_str(), "slack-post");
    }

    #[test]
    fn node_deserializes_editor_document() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "type": "http-request",
            "position": { "x": 10, "y": 20 },
            "data": { "url": "https://example.test" },
        }))
        .unwrap();
        assert_eq!(node.kind, NodeKind::HttpRequest);
        assert_eq!(node.data["url"], "https://example.test");
    }

    #[test]
    fn edge_handles_are_optional() {
        let edge: Edge = serde_json::from_value(json!({
            "id": "e1",
            "source": "a",
            "target": "b",
        }))
        .unwrap();
        assert!(edge.source_handle.is_none());

        let edge: Edge = serde_json::from_value(json!({
            "id": "e2",
            "source": "a",
            "target": "b",
            "sourceHandle": "out",
        }))
        .unwrap();
        assert_eq!(edge.source_handle.as_deref(), Some("out"));
    }

    #[test]
    fn execution_status_display_and_parse() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
        ] {
            let parsed: ExecutionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn progress_serializes_camel_case() {
        let progress = ExecutionProgress {
            execution_id: 7,
            workflow_id: 3,
            status: ExecutionStatus::Running,
            nodes: vec![NodeProgress::pending("a")],
            error: None,
        };
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["executionId"], 7);
        assert_eq!(value["nodes"][0]["nodeId"], "a");
        assert_eq!(value["nodes"][0]["status"], "pending");
        assert!(value.get("error").is_none());
    }
}
