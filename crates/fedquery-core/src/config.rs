//! Startup configuration.
//!
//! All configuration is read once from the environment and frozen inside
//! [`Settings`]. Components receive the settings through the service
//! context; nothing re-reads the environment afterwards.
//!
//! | Field | Env var | Default |
//! |-------|---------|---------|
//! | proxy credential file | `X509_USER_PROXY` | unset |
//! | client certificate | `X509_USER_CERT` | unset |
//! | client key | `X509_USER_KEY` | unset |
//! | auth account | `FEDQUERY_AUTH_ACCOUNT` | `das` |
//! | auth base URL | `FEDQUERY_AUTH_URL` | `https://auth.example.org` |
//! | workflow base URL | `FEDQUERY_WORKFLOW_URL` | `https://workflow.example.org` |
//! | helper-process refresh | `FEDQUERY_TOKEN_HELPER` | off (direct refresh) |
//! | round deadline seconds | `FEDQUERY_ROUND_DEADLINE` | 30 |

use std::env;
use std::time::Duration;

/// Default account identity attached to authenticated backend calls.
pub const DEFAULT_ACCOUNT: &str = "das";
/// Default auth-service base URL.
pub const DEFAULT_AUTH_URL: &str = "https://auth.example.org";
/// Default workflow-manager base URL used by the resolution orchestrator.
pub const DEFAULT_WORKFLOW_URL: &str = "https://workflow.example.org";
/// Default per-round fan-in deadline.
pub const DEFAULT_ROUND_DEADLINE: Duration = Duration::from_secs(30);

/// Immutable runtime settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// X.509 proxy credential file; takes priority over cert+key.
    pub proxy_file: Option<String>,
    /// Explicit client certificate file.
    pub cert_file: Option<String>,
    /// Explicit client key file.
    pub key_file: Option<String>,
    /// Account identity sent to authenticated backends.
    pub account: String,
    /// Base URL of the token auth service.
    pub auth_base: String,
    /// Base URL of the workflow manager.
    pub workflow_base: String,
    /// Refresh tokens through the external helper process instead of a
    /// direct HTTP call.
    pub token_helper: bool,
    /// User-Agent header value for every outgoing request.
    pub user_agent: String,
    /// Deadline for one orchestrator fan-out round.
    pub round_deadline: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_file: None,
            cert_file: None,
            key_file: None,
            account: String::from(DEFAULT_ACCOUNT),
            auth_base: String::from(DEFAULT_AUTH_URL),
            workflow_base: String::from(DEFAULT_WORKFLOW_URL),
            token_helper: false,
            user_agent: format!("fedquery/{}", env!("CARGO_PKG_VERSION")),
            round_deadline: DEFAULT_ROUND_DEADLINE,
        }
    }
}

impl Settings {
    /// Resolve settings from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            proxy_file: non_empty(env::var("X509_USER_PROXY").ok()),
            cert_file: non_empty(env::var("X509_USER_CERT").ok()),
            key_file: non_empty(env::var("X509_USER_KEY").ok()),
            account: non_empty(env::var("FEDQUERY_AUTH_ACCOUNT").ok())
                .unwrap_or(defaults.account),
            auth_base: non_empty(env::var("FEDQUERY_AUTH_URL").ok())
                .unwrap_or(defaults.auth_base),
            workflow_base: non_empty(env::var("FEDQUERY_WORKFLOW_URL").ok())
                .unwrap_or(defaults.workflow_base),
            token_helper: env::var("FEDQUERY_TOKEN_HELPER")
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            user_agent: defaults.user_agent,
            round_deadline: env::var("FEDQUERY_ROUND_DEADLINE")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.round_deadline),
        }
    }

    /// Full token-endpoint URL of the auth service.
    pub fn auth_url(&self) -> String {
        format!("{}/auth/x509", self.auth_base.trim_end_matches('/'))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
