//! `http-request` node — outbound HTTP call with templated configuration.
//!
//! Non-2xx responses are NOT failures: the node succeeds and reports
//! `ok: false`, so downstream nodes can branch on it. Only transport
//! errors (DNS, refused connection, timeout) fail the node.

use async_trait::async_trait;
use engine::{Context, Node};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::traits::{require_str, resolved_data, str_field};
use crate::{HandlerError, NodeHandler};

pub struct HttpRequestNode {
    client: Client,
    timeout: Duration,
}

impl HttpRequestNode {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl NodeHandler for HttpRequestNode {
    async fn handle(&self, node: &Node, context: &Context) -> Result<Value, HandlerError> {
        let data = resolved_data(node, context);

        let url = require_str(&data, "url")?;
        let method = str_field(&data, "method").unwrap_or("GET").to_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| HandlerError::InvalidData(format!("unsupported HTTP method '{method}'")))?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .timeout(self.timeout);

        let mut has_content_type = false;
        if let Some(headers) = data.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    if name.eq_ignore_ascii_case("content-type") {
                        has_content_type = true;
                    }
                    request = request.header(name, value);
                }
            }
        }
        if !has_content_type {
            request = request.header(CONTENT_TYPE, "application/json");
        }

        if !matches!(method, Method::GET | Method::HEAD) {
            if let Some(body) = data.get("body") {
                request = match body {
                    Value::String(s) => request.body(s.clone()),
                    other => request.body(other.to_string()),
                };
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::Io(e.to_string()))?;

        let status = response.status();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), Value::String(v.to_string())))
            })
            .collect();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        let text = response
            .text()
            .await
            .map_err(|e| HandlerError::Io(e.to_string()))?;
        let body = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        Ok(json!({
            "statusCode": status.as_u16(),
            "headers": headers,
            "body": body,
            "ok": status.is_success(),
        }))
    }
}

// ============================================================
// Unit tests (against a local server)
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::Router;
    use engine::NodeKind;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn http_node(data: Value) -> Node {
        Node {
            id: "req".into(),
            kind: NodeKind::HttpRequest,
            position: Value::Null,
            data: data.as_object().cloned().unwrap(),
        }
    }

    fn handler() -> HttpRequestNode {
        HttpRequestNode::new(Client::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn json_response_is_parsed() {
        let base = spawn_server(Router::new().route("/ok", get(|| async { axum::Json(json!({ "y": 2 })) }))).await;
        let node = http_node(json!({ "url": format!("{base}/ok") }));

        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["statusCode"], 200);
        assert_eq!(output["ok"], true);
        assert_eq!(output["body"], json!({ "y": 2 }));
    }

    #[tokio::test]
    async fn text_response_is_captured_verbatim() {
        let base = spawn_server(Router::new().route("/plain", get(|| async { "hello" }))).await;
        let node = http_node(json!({ "url": format!("{base}/plain") }));

        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["body"], "hello");
    }

    #[tokio::test]
    async fn non_2xx_succeeds_with_ok_false() {
        let base = spawn_server(Router::new().route(
            "/missing",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        ))
        .await;
        let node = http_node(json!({ "url": format!("{base}/missing") }));

        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["statusCode"], 404);
        assert_eq!(output["ok"], false);
    }

    #[tokio::test]
    async fn post_sends_body_and_default_content_type() {
        let base = spawn_server(Router::new().route(
            "/echo",
            post(|headers: HeaderMap, body: String| async move {
                axum::Json(json!({
                    "contentType": headers.get("content-type").unwrap().to_str().unwrap(),
                    "body": body,
                }))
            }),
        ))
        .await;
        let node = http_node(json!({
            "url": format!("{base}/echo"),
            "method": "POST",
            "body": { "k": "v" },
        }));

        let output = handler().handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["body"]["contentType"], "application/json");
        assert_eq!(output["body"]["body"], "{\"k\":\"v\"}");
    }

    #[tokio::test]
    async fn templated_url_resolves_from_context() {
        // The diamond scenario: both parents' outputs feed the URL.
        let base = spawn_server(Router::new().route(
            "/:a/:b",
            get(|Path((a, b)): Path<(String, String)>| async move {
                axum::Json(json!({ "a": a, "b": b }))
            }),
        ))
        .await;
        let node = http_node(json!({
            "url": format!("{base}/{{{{double.v}}}}/{{{{incr.v}}}}"),
        }));

        let mut context = Context::new();
        context.insert("double".into(), json!({ "v": 6 }));
        context.insert("incr".into(), json!({ "v": 4 }));

        let output = handler().handle(&node, &context).await.unwrap();
        assert_eq!(output["body"], json!({ "a": "6", "b": "4" }));
    }

    #[tokio::test]
    async fn transport_failure_is_an_io_error() {
        // Nothing listens on this port (bound then dropped).
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let node = http_node(json!({ "url": format!("http://{addr}/gone") }));
        let err = handler().handle(&node, &Context::new()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Io(_)));
    }
}
