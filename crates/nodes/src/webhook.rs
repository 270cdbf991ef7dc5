//! `webhook` node — workflow entry point.
//!
//! When the execution was started with trigger data, the scheduler seeds
//! it under this node's id before traversal; the handler just echoes it.
//! Manual runs without trigger data get a synthetic stub so downstream
//! template references still resolve.

use async_trait::async_trait;
use chrono::Utc;
use engine::{Context, Node};
use serde_json::{json, Value};

use crate::{HandlerError, NodeHandler};

pub struct WebhookNode;

#[async_trait]
impl NodeHandler for WebhookNode {
    async fn handle(&self, node: &Node, context: &Context) -> Result<Value, HandlerError> {
        if let Some(seeded) = context.get(&node.id) {
            return Ok(seeded.clone());
        }

        Ok(json!({
            "received": true,
            "timestamp": Utc::now().to_rfc3339(),
            "body": {},
            "headers": {},
            "query": {},
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::NodeKind;
    use serde_json::json;

    fn webhook_node(id: &str) -> Node {
        Node {
            id: id.into(),
            kind: NodeKind::Webhook,
            position: Value::Null,
            data: Default::default(),
        }
    }

    #[tokio::test]
    async fn seeded_trigger_data_is_returned_verbatim() {
        let node = webhook_node("hook");
        let mut context = Context::new();
        context.insert("hook".into(), json!({ "x": 1, "nested": { "y": [2] } }));

        let output = WebhookNode.handle(&node, &context).await.unwrap();
        assert_eq!(output, json!({ "x": 1, "nested": { "y": [2] } }));
    }

    #[tokio::test]
    async fn unseeded_webhook_returns_stub() {
        let node = webhook_node("hook");
        let output = WebhookNode.handle(&node, &Context::new()).await.unwrap();

        assert_eq!(output["received"], true);
        assert_eq!(output["body"], json!({}));
        assert_eq!(output["headers"], json!({}));
        assert_eq!(output["query"], json!({}));
        // Timestamp parses as RFC 3339.
        let ts = output["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
