//! `email` node — send mail via Gmail OAuth or plain SMTP.
//!
//! When the node references a `gmail-oauth` credential, the handler
//! decrypts it, refreshes the access token if stale (persisting the new
//! tokens; concurrent refreshes are last-writer-wins), builds an RFC 2822
//! multipart/alternative message, and posts it to the Gmail send
//! endpoint. Otherwise it falls back to SMTP with node-data overriding
//! environment defaults.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use crypto::Cipher;
use engine::{Context, Credential, CredentialUpdate, Node, Store};
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::config::SmtpConfig;
use crate::oauth::{OAuthClient, TokenSet};
use crate::traits::{require_str, resolved_data, str_field};
use crate::{HandlerError, NodeHandler};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com";

/// Decrypted payload of a `gmail-oauth` credential.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBlob {
    email: String,
    tokens: TokenSet,
    client_id: String,
    client_secret: String,
}

pub struct EmailNode {
    store: Arc<dyn Store>,
    cipher: Cipher,
    smtp: SmtpConfig,
    oauth: OAuthClient,
    http: Client,
    gmail_base: String,
}

impl EmailNode {
    pub fn new(
        store: Arc<dyn Store>,
        cipher: Cipher,
        smtp: SmtpConfig,
        oauth: OAuthClient,
        http: Client,
    ) -> Self {
        Self {
            store,
            cipher,
            smtp,
            oauth,
            http,
            gmail_base: GMAIL_API_BASE.to_string(),
        }
    }

    /// Point the Gmail API at a different host (tests).
    pub fn with_gmail_base(mut self, base: impl Into<String>) -> Self {
        self.gmail_base = base.into();
        self
    }
}

#[async_trait]
impl NodeHandler for EmailNode {
    async fn handle(&self, node: &Node, context: &Context) -> Result<Value, HandlerError> {
        let data = resolved_data(node, context);
        let to = require_str(&data, "to")?.to_owned();
        let subject = require_str(&data, "subject")?.to_owned();
        let body = require_str(&data, "body")?.to_owned();

        if let Some(credential_id) = credential_id(&data) {
            let credential = self.store.get_credential(credential_id).await?;
            if credential.kind == "gmail-oauth" {
                return self.send_gmail(&credential, &to, &subject, &body).await;
            }
            warn!(
                credential_id,
                kind = %credential.kind,
                "credential is not gmail-oauth; using SMTP"
            );
        }

        self.send_smtp(&data, &to, &subject, &body).await
    }
}

fn credential_id(data: &Map<String, Value>) -> Option<i64> {
    match data.get("credentialId") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

impl EmailNode {
    async fn send_gmail(
        &self,
        credential: &Credential,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<Value, HandlerError> {
        let mut blob: GmailBlob = serde_json::from_value(self.cipher.decrypt(&credential.data)?)
            .map_err(|e| HandlerError::InvalidData(format!("gmail credential blob: {e}")))?;

        if blob.tokens.is_expired() {
            let refresh_token = blob
                .tokens
                .refresh_token
                .clone()
                .ok_or_else(|| HandlerError::OAuthRefresh("credential has no refresh token".into()))?;
            blob.tokens = self
                .oauth
                .refresh_token(&refresh_token, &blob.client_id, &blob.client_secret)
                .await?;

            // Persist the rotated tokens. A concurrent refresh may race us;
            // last writer wins and the older access token stays valid until
            // its own expiry.
            let updated = serde_json::to_value(&blob)
                .map_err(|e| HandlerError::InvalidData(e.to_string()))?;
            let ciphertext = self.cipher.encrypt(&updated)?;
            if let Err(store_err) = self
                .store
                .update_credential(
                    credential.id,
                    CredentialUpdate {
                        data: Some(ciphertext),
                        ..Default::default()
                    },
                )
                .await
            {
                warn!(credential_id = credential.id, "could not persist refreshed tokens: {store_err}");
            }
        }

        let message = build_mime(&blob.email, to, subject, body);
        let raw = URL_SAFE_NO_PAD.encode(message.as_bytes());

        let response = self
            .http
            .post(format!("{}/gmail/v1/users/me/messages/send", self.gmail_base))
            .bearer_auth(&blob.tokens.access_token)
            .json(&json!({ "raw": raw }))
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

        let sent: Value = response
            .json()
            .await
            .map_err(|e| HandlerError::Io(e.to_string()))?;

        Ok(json!({
            "messageId": sent.get("id").cloned().unwrap_or(Value::Null),
            "sent": true,
            "provider": "gmail-oauth",
        }))
    }

    async fn send_smtp(
        &self,
        data: &Map<String, Value>,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<Value, HandlerError> {
        let host = str_field(data, "host")
            .map(str::to_owned)
            .or_else(|| self.smtp.host.clone())
            .ok_or_else(|| HandlerError::ConfigMissing("SMTP host".into()))?;
        let user = str_field(data, "user")
            .map(str::to_owned)
            .or_else(|| self.smtp.user.clone())
            .ok_or_else(|| HandlerError::ConfigMissing("SMTP user".into()))?;
        let pass = str_field(data, "pass")
            .map(str::to_owned)
            .or_else(|| self.smtp.pass.clone())
            .ok_or_else(|| HandlerError::ConfigMissing("SMTP pass".into()))?;
        let port = data
            .get("port")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .map(|p| p as u16)
            .unwrap_or(self.smtp.port);
        let from = str_field(data, "from")
            .map(str::to_owned)
            .or_else(|| self.smtp.from.clone())
            .unwrap_or_else(|| user.clone());

        let message = Message::builder()
            .from(from.parse().map_err(|e| {
                HandlerError::InvalidData(format!("invalid 'from' address '{from}': {e}"))
            })?)
            .to(to.parse().map_err(|e| {
                HandlerError::InvalidData(format!("invalid 'to' address '{to}': {e}"))
            })?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                body.to_string(),
                body.to_string(),
            ))
            .map_err(|e| HandlerError::InvalidData(e.to_string()))?;

        // Port 465 is implicit TLS; everything else negotiates STARTTLS.
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
        }
        .map_err(|e| HandlerError::Io(e.to_string()))?;

        let transport = builder
            .port(port)
            .credentials(Credentials::new(user, pass))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| HandlerError::Io(e.to_string()))?;

        let message_id = format!("<{}@{}>", &crypto::generate_token()[..24], host);
        Ok(json!({
            "messageId": message_id,
            "accepted": [to],
            "rejected": [],
            "sent": true,
            "provider": "smtp",
        }))
    }
}

/// RFC 2822 multipart/alternative message, CRLF line endings.
fn build_mime(from: &str, to: &str, subject: &str, body: &str) -> String {
    let boundary = format!("=_flowgrid_{}", &crypto::generate_token()[..16]);
    let mut lines = Vec::new();
    lines.push(format!("From: {from}"));
    lines.push(format!("To: {to}"));
    lines.push(format!("Subject: {subject}"));
    lines.push("MIME-Version: 1.0".to_string());
    lines.push(format!(
        "Content-Type: multipart/alternative; boundary=\"{boundary}\""
    ));
    lines.push(String::new());
    lines.push(format!("--{boundary}"));
    lines.push("Content-Type: text/plain; charset=\"UTF-8\"".to_string());
    lines.push(String::new());
    lines.push(body.to_string());
    lines.push(format!("--{boundary}"));
    lines.push("Content-Type: text/html; charset=\"UTF-8\"".to_string());
    lines.push(String::new());
    lines.push(body.to_string());
    lines.push(format!("--{boundary}--"));
    lines.join("\r\n")
}
