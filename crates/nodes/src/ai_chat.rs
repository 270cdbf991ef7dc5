//! `ai-chat` node — one-shot chat completion against the Anthropic
//! Messages API.

use async_trait::async_trait;
use engine::{Context, Node};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AiConfig;
use crate::traits::{resolved_data, str_field};
use crate::{HandlerError, NodeHandler};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

pub struct AiChatNode {
    client: Client,
    config: AiConfig,
}

impl AiChatNode {
    pub fn new(client: Client, config: AiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NodeHandler for AiChatNode {
    async fn handle(&self, node: &Node, context: &Context) -> Result<Value, HandlerError> {
        let data = resolved_data(node, context);

        let prompt = str_field(&data, "prompt");
        let system = str_field(&data, "systemPrompt");
        if prompt.is_none() && system.is_none() {
            return Err(HandlerError::InvalidData(
                "requires 'prompt' or 'systemPrompt'".into(),
            ));
        }

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| HandlerError::ConfigMissing("ANTHROPIC_API_KEY is not set".into()))?;
        let model = str_field(&data, "model").unwrap_or(self.config.model.as_str());

        let request = MessagesRequest {
            model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt.unwrap_or_default(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let completion: MessagesResponse = response
            .json()
            .await
            .map_err(|e| HandlerError::Io(e.to_string()))?;

        let text = completion
            .content
            .into_iter()
            .filter_map(|block| (block.block_type == "text").then_some(block.text))
            .collect::<Vec<_>>()
            .join("");

        Ok(json!({
            "text": text,
            "model": completion.model,
            "usage": completion.usage,
        }))
    }
}

// Anthropic wire types.

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

// ============================================================
// Unit tests (against a local mock provider)
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use engine::NodeKind;

    async fn spawn_provider(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn chat_node(data: Value) -> Node {
        Node {
            id: "ai".into(),
            kind: NodeKind::AiChat,
            position: Value::Null,
            data: data.as_object().cloned().unwrap(),
        }
    }

    fn config(base_url: String, api_key: Option<&str>) -> AiConfig {
        AiConfig {
            api_key: api_key.map(str::to_owned),
            model: "claude-3-5-haiku-20241022".into(),
            base_url,
        }
    }

    #[tokio::test]
    async fn returns_text_model_and_usage() {
        let base = spawn_provider(Router::new().route(
            "/messages",
            post(|axum::Json(req): axum::Json<Value>| async move {
                assert_eq!(req["max_tokens"], 2048);
                assert_eq!(req["messages"][0]["role"], "user");
                axum::Json(json!({
                    "model": req["model"],
                    "content": [{ "type": "text", "text": "All clear." }],
                    "usage": { "input_tokens": 12, "output_tokens": 4 },
                }))
            }),
        ))
        .await;

        let handler = AiChatNode::new(Client::new(), config(base, Some("test-key")));
        let node = chat_node(json!({ "prompt": "Summarize: {{fetch.body}}" }));
        let mut context = Context::new();
        context.insert("fetch".into(), json!({ "body": "it works" }));

        let output = handler.handle(&node, &context).await.unwrap();
        assert_eq!(output["text"], "All clear.");
        assert_eq!(output["model"], "claude-3-5-haiku-20241022");
        assert_eq!(output["usage"]["input_tokens"], 12);
    }

    #[tokio::test]
    async fn system_prompt_is_forwarded() {
        let base = spawn_provider(Router::new().route(
            "/messages",
            post(|axum::Json(req): axum::Json<Value>| async move {
                assert_eq!(req["system"], "be terse");
                axum::Json(json!({
                    "model": "m",
                    "content": [{ "type": "text", "text": "ok" }],
                    "usage": { "input_tokens": 1, "output_tokens": 1 },
                }))
            }),
        ))
        .await;

        let handler = AiChatNode::new(Client::new(), config(base, Some("test-key")));
        let node = chat_node(json!({ "systemPrompt": "be terse", "prompt": "hi" }));
        handler.handle(&node, &Context::new()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_api_key_is_config_missing() {
        let handler = AiChatNode::new(Client::new(), config("http://unused".into(), None));
        let node = chat_node(json!({ "prompt": "hi" }));
        let err = handler.handle(&node, &Context::new()).await.unwrap_err();
        assert!(matches!(err, HandlerError::ConfigMissing(_)));
    }

    #[tokio::test]
    async fn provider_error_carries_status_and_body() {
        let base = spawn_provider(Router::new().route(
            "/messages",
            post(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    r#"{"error":"rate limited"}"#,
                )
            }),
        ))
        .await;

        let handler = AiChatNode::new(Client::new(), config(base, Some("test-key")));
        let node = chat_node(json!({ "prompt": "hi" }));
        let err = handler.handle(&node, &Context::new()).await.unwrap_err();
        match err {
            HandlerError::Upstream { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limited"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prompt_or_system_prompt_is_required() {
        let handler = AiChatNode::new(Client::new(), config("http://unused".into(), Some("k")));
        let node = chat_node(json!({ "model": "m" }));
        let err = handler.handle(&node, &Context::new()).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidData(_)));
    }
}
