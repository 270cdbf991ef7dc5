//! Fallback handler for unknown node kinds.
//!
//! Persisted workflows may carry node types this build does not know
//! (newer editor, removed integration). Instead of failing the whole
//! execution, pass the node's data through untouched and mark it as
//! executed — no external system is contacted.

use async_trait::async_trait;
use engine::{Context, Node};
use serde_json::{json, Value};
use tracing::warn;

use crate::{HandlerError, NodeHandler};

pub struct FallbackNode;

#[async_trait]
impl NodeHandler for FallbackNode {
    async fn handle(&self, node: &Node, _context: &Context) -> Result<Value, HandlerError> {
        let kind = node.kind.as_str();
        warn!(node_id = %node.id, node_type = kind, "no handler for node type; passing data through");

        let mut out = node.data.clone();
        out.insert("executed".into(), json!(true));
        out.insert("nodeType".into(), json!(kind));
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::NodeKind;

    #[tokio::test]
    async fn unknown_kind_passes_data_through() {
        let node = Node {
            id: "x".into(),
            kind: NodeKind::Other("slack-post".into()),
            position: Value::Null,
            data: json!({ "channel": "#ops" }).as_object().cloned().unwrap(),
        };

        let output = FallbackNode.handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["channel"], "#ops");
        assert_eq!(output["executed"], true);
        assert_eq!(output["nodeType"], "slack-post");
    }
}
