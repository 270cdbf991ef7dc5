//! Gmail OAuth flow endpoints.
//!
//! `auth-url` issues a `state` token and remembers the client config it
//! was issued for; the provider redirects the user back to `callback`,
//! which redeems the state, exchanges the code, and stores a new
//! `gmail-oauth` credential.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use super::AppState;
use crate::PendingOAuth;
use db::repository::credentials as cred_repo;

#[derive(serde::Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlDto {
    /// Optional `gmail-oauth-config` credential supplying the client
    /// id/secret instead of process configuration.
    #[serde(default)]
    pub credential_id: Option<i64>,
}

#[derive(serde::Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Resolve the OAuth client configuration: a referenced
/// `gmail-oauth-config` credential wins over the environment.
async fn client_config(
    state: &AppState,
    credential_id: Option<i64>,
) -> Result<PendingOAuth, StatusCode> {
    if let Some(id) = credential_id {
        let row = match cred_repo::get_credential(state.store.pool(), id).await {
            Ok(row) => row,
            Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
            Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        };
        let blob: Value = state
            .cipher
            .decrypt(&row.data)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let client_id = blob["clientId"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
        let client_secret = blob["clientSecret"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
        let redirect_uri = blob["redirectUri"]
            .as_str()
            .map(str::to_owned)
            .or_else(|| state.oauth_config.redirect_uri.clone())
            .ok_or(StatusCode::BAD_REQUEST)?;

        return Ok(PendingOAuth {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            redirect_uri,
        });
    }

    match (
        state.oauth_config.client_id.clone(),
        state.oauth_config.client_secret.clone(),
        state.oauth_config.redirect_uri.clone(),
    ) {
        (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(PendingOAuth {
            client_id,
            client_secret,
            redirect_uri,
        }),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

pub async fn auth_url(
    State(state): State<AppState>,
    payload: Option<Json<AuthUrlDto>>,
) -> Result<Json<Value>, StatusCode> {
    let dto = payload.map(|Json(dto)| dto).unwrap_or_default();
    let pending = client_config(&state, dto.credential_id).await?;

    let oauth_state = crypto::generate_token();
    let url = state
        .oauth
        .auth_url(&pending.client_id, &pending.redirect_uri, &oauth_state)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .pending_oauth
        .lock()
        .unwrap()
        .insert(oauth_state.clone(), pending);

    Ok(Json(json!({ "authUrl": url, "state": oauth_state })))
}

pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, StatusCode> {
    let pending = state
        .pending_oauth
        .lock()
        .unwrap()
        .remove(&params.state)
        .ok_or(StatusCode::BAD_REQUEST)?;

    let tokens = state
        .oauth
        .exchange_code(
            &params.code,
            &pending.client_id,
            &pending.client_secret,
            &pending.redirect_uri,
        )
        .await
        .map_err(|err| {
            warn!("OAuth code exchange failed: {err}");
            StatusCode::BAD_GATEWAY
        })?;

    // Best effort: the Gmail profile endpoint tells us which mailbox the
    // grant is for; without it the sender address stays blank until the
    // user edits the credential.
    let email = gmail_profile_email(&tokens.access_token).await.unwrap_or_default();

    let blob = json!({
        "email": email,
        "tokens": tokens,
        "clientId": pending.client_id,
        "clientSecret": pending.client_secret,
    });
    let ciphertext = state
        .cipher
        .encrypt(&blob)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let name = if email.is_empty() {
        "Gmail".to_string()
    } else {
        format!("Gmail ({email})")
    };
    let row = cred_repo::create_credential(state.store.pool(), &name, "gmail-oauth", &ciphertext)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Redirect::to(&format!("/?oauth=gmail&credentialId={}", row.id)))
}

async fn gmail_profile_email(access_token: &str) -> Option<String> {
    let response = reqwest::Client::new()
        .get("https://gmail.googleapis.com/gmail/v1/users/me/profile")
        .bearer_auth(access_token)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let profile: Value = response.json().await.ok()?;
    profile["emailAddress"].as_str().map(str::to_owned)
}
