//! Runtime configuration for the node handlers, loaded from the
//! environment for container deployment.

use std::collections::HashMap;
use std::time::Duration;

/// Chat-completions provider configuration.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-3-5-haiku-20241022".to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }
}

/// SMTP fallback defaults; node data overrides these per send.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            user: None,
            pass: None,
            from: None,
        }
    }
}

/// OAuth application config. May be superseded per request by a
/// `gmail-oauth-config` credential.
#[derive(Debug, Clone, Default)]
pub struct OAuthAppConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Full handler-set configuration.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub ai: AiConfig,
    pub smtp: SmtpConfig,
    pub oauth: OAuthAppConfig,
    /// Environment variables exposed read-only to the code sandbox as
    /// `$env`. Only names listed in `FLOWGRID_SANDBOX_ENV` leak in.
    pub sandbox_env: HashMap<String, String>,
    /// Wall-clock budget for one sandboxed script.
    pub code_timeout: Duration,
    /// Ceiling for outbound HTTP requests made by handlers.
    pub http_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
            smtp: SmtpConfig::default(),
            oauth: OAuthAppConfig::default(),
            sandbox_env: HashMap::new(),
            code_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(60),
        }
    }
}

impl HandlerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let sandbox_env = var("FLOWGRID_SANDBOX_ENV")
            .map(|allowlist| {
                allowlist
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            ai: AiConfig {
                api_key: var("ANTHROPIC_API_KEY"),
                model: var("FLOWGRID_AI_MODEL").unwrap_or(defaults.ai.model),
                base_url: var("FLOWGRID_AI_BASE_URL").unwrap_or(defaults.ai.base_url),
            },
            smtp: SmtpConfig {
                host: var("SMTP_HOST"),
                port: var("SMTP_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(defaults.smtp.port),
                user: var("SMTP_USER"),
                pass: var("SMTP_PASS"),
                from: var("SMTP_FROM"),
            },
            oauth: OAuthAppConfig {
                client_id: var("GOOGLE_CLIENT_ID"),
                client_secret: var("GOOGLE_CLIENT_SECRET"),
                redirect_uri: var("GOOGLE_REDIRECT_URI"),
            },
            sandbox_env,
            code_timeout: defaults.code_timeout,
            http_timeout: defaults.http_timeout,
        }
    }
}
