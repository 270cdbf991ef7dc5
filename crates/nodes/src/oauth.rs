//! OAuth 2.0 authorization-code flow for Gmail sending.
//!
//! Stateless HTTPS client: builds the consent URL, exchanges the callback
//! code for tokens, and refreshes expired access tokens. Endpoints are
//! injectable so tests can point at a local server.

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::HandlerError;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Tokens held inside a `gmail-oauth` credential blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    /// Absent when the provider chose not to rotate it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch milliseconds after which `access_token` is stale.
    pub expires_at: i64,
}

impl TokenSet {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now().timestamp_millis()
    }
}

/// Raw token endpoint response (Google wire format).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_token_set(self, previous_refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            // Keep the old refresh token when the provider omits a new one.
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_owned)),
            expires_at: Utc::now().timestamp_millis() + self.expires_in * 1000,
        }
    }
}

pub struct OAuthClient {
    http: Client,
    auth_url: String,
    token_url: String,
}

impl OAuthClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Override provider endpoints (tests point these at a local server).
    pub fn with_endpoints(
        http: Client,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth_url: auth_url.into(),
            token_url: token_url.into(),
        }
    }

    /// Build the provider authorization URL the user is sent to.
    pub fn auth_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, HandlerError> {
        let url = reqwest::Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", GMAIL_SEND_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| HandlerError::InvalidData(format!("bad authorization URL: {e}")))?;
        Ok(url.into())
    }

    /// Exchange a callback `code` for an initial token set.
    pub async fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, HandlerError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::OAuthExchange(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| HandlerError::OAuthExchange(e.to_string()))?;
        Ok(token.into_token_set(None))
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenSet, HandlerError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::OAuthRefresh(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| HandlerError::OAuthRefresh(e.to_string()))?;
        Ok(token.into_token_set(Some(refresh_token)))
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_url_carries_offline_consent_parameters() {
        let client = OAuthClient::new(Client::new());
        let url = client
            .auth_url("my-client", "http://localhost:4000/cb", "state-123")
            .unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=my-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=state-123"));
        assert!(url.contains("gmail.send"));
    }

    #[test]
    fn token_response_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new-access".into(),
            refresh_token: None,
            expires_in: 120,
        };
        let set = response.into_token_set(Some("old-refresh"));
        assert_eq!(set.access_token, "new-access");
        assert_eq!(set.refresh_token.as_deref(), Some("old-refresh"));
        assert!(!set.is_expired());
    }

    #[test]
    fn token_set_expiry_compares_epoch_millis() {
        let stale = TokenSet {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: Utc::now().timestamp_millis() - 1_000,
        };
        assert!(stale.is_expired());
    }
}
