//! `code` node — user JavaScript in an embedded sandbox.
//!
//! Scripts run in a fresh boa engine on a blocking thread, awaited under
//! `tokio::time::timeout`. Boa exposes no filesystem, network, or process
//! APIs, so the script can only touch what we inject: `items` (ancestor
//! outputs), `$node` (this node's raw data), `$env` (allowlisted
//! environment), and a prefixed `console`. The user code is wrapped in an
//! async IIFE so `await` works; the engine's job queue drives the promise
//! to settlement and the result is read from the promise state — no
//! polling anywhere.

use async_trait::async_trait;
use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::JsPromise;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context as JsContext, JsResult, JsString, JsValue, NativeFunction, Source};
use engine::{Context, Node};
use serde_json::{json, Value};
use std::time::Duration;

use crate::{HandlerError, NodeHandler};

pub struct CodeNode {
    timeout: Duration,
    sandbox_env: Value,
}

impl CodeNode {
    pub fn new(timeout: Duration, sandbox_env: &std::collections::HashMap<String, String>) -> Self {
        Self {
            timeout,
            sandbox_env: json!(sandbox_env),
        }
    }
}

#[async_trait]
impl NodeHandler for CodeNode {
    async fn handle(&self, node: &Node, context: &Context) -> Result<Value, HandlerError> {
        let code = node
            .data
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::InvalidData("missing required field 'code'".into()))?
            .to_owned();

        let items: Vec<Value> = context
            .iter()
            .map(|(node_id, output)| json!({ "nodeId": node_id, "json": output }))
            .collect();
        let node_data = Value::Object(node.data.clone());
        let node_id = node.id.clone();
        let env = self.sandbox_env.clone();

        let script = tokio::task::spawn_blocking(move || {
            run_script(&code, &node_id, items, node_data, env)
        });

        match tokio::time::timeout(self.timeout, script).await {
            Err(_) => Err(HandlerError::CodeTimeout(self.timeout.as_secs())),
            Ok(Err(join_err)) => Err(HandlerError::CodeRuntime(join_err.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

/// Evaluate the wrapped script to a settled JSON value. Runs on a
/// blocking thread; everything here is synchronous.
fn run_script(
    code: &str,
    node_id: &str,
    items: Vec<Value>,
    node_data: Value,
    env: Value,
) -> Result<Value, HandlerError> {
    let mut context = JsContext::default();
    install_globals(&mut context, node_id, items, node_data, env)?;

    let wrapped = format!("(async () => {{\n{code}\n}})()");
    let value = context
        .eval(Source::from_bytes(&wrapped))
        .map_err(|e| HandlerError::CodeRuntime(e.to_string()))?;

    // Drive queued microtasks so `await` chains settle.
    context.run_jobs();

    let promise = value
        .as_object()
        .cloned()
        .and_then(|obj| JsPromise::from_object(obj).ok())
        .ok_or_else(|| HandlerError::CodeRuntime("script did not produce a promise".into()))?;

    match promise.state() {
        PromiseState::Fulfilled(result) => {
            if result.is_undefined() {
                return Ok(Value::Null);
            }
            result
                .to_json(&mut context)
                .map_err(|e| HandlerError::CodeRuntime(format!("result is not JSON: {e}")))
        }
        PromiseState::Rejected(reason) => {
            Err(HandlerError::CodeRuntime(reason.display().to_string()))
        }
        PromiseState::Pending => Err(HandlerError::CodeRuntime(
            "script never settled (await on something that cannot resolve?)".into(),
        )),
    }
}

fn install_globals(
    context: &mut JsContext,
    node_id: &str,
    items: Vec<Value>,
    node_data: Value,
    env: Value,
) -> Result<(), HandlerError> {
    let install = |context: &mut JsContext| -> JsResult<()> {
        let items = JsValue::from_json(&Value::Array(items), context)?;
        context.register_global_property(js_string!("items"), items, Attribute::READONLY)?;

        let node_data = JsValue::from_json(&node_data, context)?;
        context.register_global_property(js_string!("$node"), node_data, Attribute::READONLY)?;

        let env = JsValue::from_json(&env, context)?;
        context.register_global_property(js_string!("$env"), env, Attribute::READONLY)?;

        context.register_global_property(
            js_string!("__nodeId"),
            JsString::from(node_id),
            Attribute::READONLY,
        )?;

        let console = ObjectInitializer::new(context)
            .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 1)
            .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 1)
            .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 1)
            .build();
        context.register_global_property(js_string!("console"), console, Attribute::READONLY)?;
        Ok(())
    };

    install(context).map_err(|e| HandlerError::CodeRuntime(format!("sandbox setup failed: {e}")))
}

fn console_line(args: &[JsValue], context: &mut JsContext) -> (String, String) {
    let prefix = context
        .global_object()
        .get(js_string!("__nodeId"), context)
        .ok()
        .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()))
        .unwrap_or_default();
    let message = args
        .iter()
        .map(|arg| match arg.to_string(context) {
            Ok(s) => s.to_std_string_escaped(),
            Err(_) => "<unprintable>".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    (prefix, message)
}

fn console_log(_this: &JsValue, args: &[JsValue], context: &mut JsContext) -> JsResult<JsValue> {
    let (prefix, message) = console_line(args, context);
    tracing::info!(target: "sandbox", "[{prefix}] {message}");
    Ok(JsValue::undefined())
}

fn console_error(_this: &JsValue, args: &[JsValue], context: &mut JsContext) -> JsResult<JsValue> {
    let (prefix, message) = console_line(args, context);
    tracing::error!(target: "sandbox", "[{prefix}] {message}");
    Ok(JsValue::undefined())
}

fn console_warn(_this: &JsValue, args: &[JsValue], context: &mut JsContext) -> JsResult<JsValue> {
    let (prefix, message) = console_line(args, context);
    tracing::warn!(target: "sandbox", "[{prefix}] {message}");
    Ok(JsValue::undefined())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use engine::NodeKind;
    use std::collections::HashMap;

    fn code_node(code: &str) -> Node {
        Node {
            id: "calc".into(),
            kind: NodeKind::Code,
            position: Value::Null,
            data: json!({ "code": code }).as_object().cloned().unwrap(),
        }
    }

    fn handler() -> CodeNode {
        CodeNode::new(Duration::from_secs(30), &HashMap::new())
    }

    #[tokio::test]
    async fn script_reads_items_from_ancestor_outputs() {
        let node = code_node("return { v: items.find(i => i.nodeId === 'hook').json.n * 2 }");
        let mut context = Context::new();
        context.insert("hook".into(), json!({ "n": 3 }));

        let output = handler().handle(&node, &context).await.unwrap();
        assert_eq!(output, json!({ "v": 6 }));
    }

    #[tokio::test]
    async fn script_sees_its_own_node_data() {
        let mut node = code_node("return { me: $node.code.length > 0, label: $node.label }");
        node.data.insert("label".into(), json!("doubler"));

        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["me"], true);
        assert_eq!(output["label"], "doubler");
    }

    #[tokio::test]
    async fn allowlisted_env_is_visible() {
        let mut env = HashMap::new();
        env.insert("REGION".to_string(), "eu-west-1".to_string());
        let handler = CodeNode::new(Duration::from_secs(30), &env);

        let node = code_node("return { region: $env.REGION }");
        let output = handler.handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["region"], "eu-west-1");
    }

    #[tokio::test]
    async fn await_works_inside_the_wrapper() {
        let node = code_node("const v = await Promise.resolve(41); return v + 1;");
        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output, json!(42));
    }

    #[tokio::test]
    async fn throwing_script_is_a_runtime_error() {
        let node = code_node("throw new Error('boom from user code')");
        let err = handler().handle(&node, &Context::new()).await.unwrap_err();
        match err {
            HandlerError::CodeRuntime(message) => assert!(message.contains("boom from user code")),
            other => panic!("expected CodeRuntime, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn script_without_return_yields_null() {
        let node = code_node("const unused = 1;");
        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output, Value::Null);
    }

    #[tokio::test]
    async fn console_calls_do_not_affect_the_result() {
        let node = code_node("console.log('hi', 1); console.warn('careful'); return 7;");
        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output, json!(7));
    }

    #[tokio::test]
    async fn long_running_script_times_out() {
        // A bounded-but-slow loop: long past the 50ms budget, short enough
        // that the leaked blocking thread finishes promptly.
        let handler = CodeNode::new(Duration::from_millis(50), &HashMap::new());
        let node = code_node("let x = 0; for (let i = 0; i < 2000000; i++) { x += i; } return x;");

        let err = handler.handle(&node, &Context::new()).await.unwrap_err();
        assert!(matches!(err, HandlerError::CodeTimeout(_)));
    }

    #[tokio::test]
    async fn sandbox_has_no_host_apis() {
        for snippet in [
            "return typeof require",
            "return typeof process",
            "return typeof fetch",
        ] {
            let node = code_node(snippet);
            let output = handler().handle(&node, &Context::new()).await.unwrap();
            assert_eq!(output, json!("undefined"), "snippet: {snippet}");
        }
    }
}
