//! The `NodeHandler` trait — the contract every node handler fulfils —
//! plus small helpers shared by the handler implementations.

use async_trait::async_trait;
use engine::{Context, Node};
use serde_json::{Map, Value};

use crate::HandlerError;

/// The core handler trait.
///
/// `context` maps ancestor node ids to their outputs; the returned value
/// becomes `context[node.id]` on success. Handlers own all mutable state
/// they touch — many executions dispatch through the same handler set
/// concurrently.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, node: &Node, context: &Context) -> Result<Value, HandlerError>;
}

/// Node data with `{{nodeId.path}}` references resolved against the
/// execution context.
pub(crate) fn resolved_data(node: &Node, context: &Context) -> Map<String, Value> {
    match engine::template::resolve(&Value::Object(node.data.clone()), context) {
        Value::Object(map) => map,
        // resolve() preserves structure; an object stays an object.
        _ => node.data.clone(),
    }
}

pub(crate) fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

pub(crate) fn require_str<'a>(
    data: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, HandlerError> {
    str_field(data, key)
        .ok_or_else(|| HandlerError::InvalidData(format!("missing required field '{key}'")))
}
