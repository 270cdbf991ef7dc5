//! The handler set — one instance serves every execution.
//!
//! Dispatch over [`NodeKind`] is an exhaustive match: adding a kind to
//! the enum without wiring a handler here fails to compile.

use std::sync::Arc;

use async_trait::async_trait;
use crypto::Cipher;
use engine::{Context, DispatchError, Node, NodeDispatcher, NodeKind, Store};
use reqwest::Client;
use serde_json::Value;

use crate::ai_chat::AiChatNode;
use crate::code::CodeNode;
use crate::database::DatabaseNode;
use crate::email::EmailNode;
use crate::fallback::FallbackNode;
use crate::http_request::HttpRequestNode;
use crate::oauth::OAuthClient;
use crate::webhook::WebhookNode;
use crate::{HandlerConfig, NodeHandler};

pub struct Handlers {
    webhook: WebhookNode,
    http_request: HttpRequestNode,
    code: CodeNode,
    ai_chat: AiChatNode,
    database: DatabaseNode,
    email: EmailNode,
    fallback: FallbackNode,
}

impl Handlers {
    pub fn new(store: Arc<dyn Store>, cipher: Cipher, config: HandlerConfig) -> Self {
        let http = Client::new();
        let oauth = OAuthClient::new(http.clone());

        Self {
            webhook: WebhookNode,
            http_request: HttpRequestNode::new(http.clone(), config.http_timeout),
            code: CodeNode::new(config.code_timeout, &config.sandbox_env),
            ai_chat: AiChatNode::new(http.clone(), config.ai.clone()),
            database: DatabaseNode,
            email: EmailNode::new(store, cipher, config.smtp.clone(), oauth, http),
            fallback: FallbackNode,
        }
    }

    fn handler_for(&self, kind: &NodeKind) -> &dyn NodeHandler {
        match kind {
            NodeKind::Webhook => &self.webhook,
            NodeKind::HttpRequest => &self.http_request,
            NodeKind::Code => &self.code,
            NodeKind::AiChat => &self.ai_chat,
            NodeKind::Database => &self.database,
            NodeKind::Email => &self.email,
            NodeKind::Other(_) => &self.fallback,
        }
    }
}

#[async_trait]
impl NodeDispatcher for Handlers {
    async fn dispatch(&self, node: &Node, context: &Context) -> Result<Value, DispatchError> {
        self.handler_for(&node.kind)
            .handle(node, context)
            .await
            .map_err(|err| DispatchError::new(err.to_string()))
    }
}
