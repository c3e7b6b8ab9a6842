//! Bearer-token credential cache.
//!
//! One [`TokenManager`] owns the credential of one authenticated backend.
//! A cached token is reused unchanged until its expiry timestamp passes;
//! refresh happens under a lock held for the whole operation, so N callers
//! observing an expired token trigger exactly one refresh and all receive
//! its result.
//!
//! Both refresh strategies stamp a fixed nominal validity window on the new
//! token instead of honoring any server-asserted lifetime. Backends have
//! been observed to disagree with their own expiry metadata; the fixed
//! window is the compatible behavior.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::error::CoreError;
use crate::fetch::{FetchRequest, HttpTransport, AUTH_TOKEN_HEADER};

/// Nominal validity window assigned to every refreshed token.
pub const TOKEN_VALIDITY: Duration = Duration::from_secs(300);

/// One backend credential: identity plus the token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub account: String,
    pub agent: String,
    pub token: String,
    /// Expiry as seconds since the Unix epoch.
    pub expires: i64,
}

impl Credential {
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.token.is_empty() && now < self.expires
    }
}

/// How a token refresh reaches the auth endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Authenticated HTTP request through the shared transport; the token
    /// is read from the auth response header.
    Direct,
    /// External `curl` helper invoked with the same certificate material;
    /// its header dump is parsed for the same response header.
    Helper,
}

/// Per-backend bearer-token manager with TTL caching.
pub struct TokenManager {
    transport: Arc<dyn HttpTransport>,
    strategy: RefreshStrategy,
    account: String,
    agent: String,
    auth_url: String,
    proxy_file: Option<String>,
    cert_file: Option<String>,
    key_file: Option<String>,
    validity: Duration,
    state: Mutex<Option<Credential>>,
}

impl TokenManager {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &Settings) -> Self {
        let strategy = if settings.token_helper {
            RefreshStrategy::Helper
        } else {
            RefreshStrategy::Direct
        };
        Self {
            transport,
            strategy,
            account: settings.account.clone(),
            agent: settings.user_agent.clone(),
            auth_url: settings.auth_url(),
            proxy_file: settings.proxy_file.clone(),
            cert_file: settings.cert_file.clone(),
            key_file: settings.key_file.clone(),
            validity: TOKEN_VALIDITY,
            state: Mutex::new(None),
        }
    }

    /// Override the nominal validity window.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Return the backend token, refreshing it when missing or expired.
    ///
    /// The cache lock is held across the refresh call, which is what makes
    /// concurrent callers single-flight: the first caller refreshes, the
    /// rest find a fresh credential when the lock is released.
    pub async fn token(&self) -> Result<String, CoreError> {
        let mut state = self.state.lock().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Some(credential) = state.as_ref() {
            if credential.is_valid_at(now) {
                return Ok(credential.token.clone());
            }
        }

        log::debug!("refreshing token for account {}", self.account);
        let token = match self.strategy {
            RefreshStrategy::Direct => self.refresh_direct().await?,
            RefreshStrategy::Helper => self.refresh_helper().await?,
        };
        let credential = Credential {
            account: self.account.clone(),
            agent: self.agent.clone(),
            token: token.clone(),
            expires: now + self.validity.as_secs() as i64,
        };
        *state = Some(credential);
        Ok(token)
    }

    async fn refresh_direct(&self) -> Result<String, CoreError> {
        let request = FetchRequest::get(&self.auth_url)
            .with_user_agent(&self.agent)
            .with_account(&self.account);
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| CoreError::Auth(format!("auth request failed: {err}")))?;
        if !response.is_success() {
            return Err(CoreError::Auth(format!(
                "auth endpoint {} returned status {}",
                self.auth_url, response.status
            )));
        }
        response
            .header(AUTH_TOKEN_HEADER)
            .map(str::to_owned)
            .ok_or_else(|| {
                CoreError::Auth(format!(
                    "auth endpoint {} returned no {AUTH_TOKEN_HEADER} header",
                    self.auth_url
                ))
            })
    }

    async fn refresh_helper(&self) -> Result<String, CoreError> {
        let (key, cert) = match (&self.proxy_file, &self.cert_file, &self.key_file) {
            (Some(proxy), _, _) => (proxy.clone(), proxy.clone()),
            (None, Some(cert), Some(key)) => (key.clone(), cert.clone()),
            _ => {
                return Err(CoreError::Auth(String::from(
                    "helper refresh requires a proxy file or a certificate+key pair",
                )))
            }
        };

        let output = tokio::process::Command::new("curl")
            .arg("-q")
            .arg("-I")
            .arg("--key")
            .arg(&key)
            .arg("--cert")
            .arg(&cert)
            .arg("-H")
            .arg(format!("x-auth-account: {}", self.account))
            .arg("-A")
            .arg(&self.agent)
            .arg(&self.auth_url)
            .output()
            .await
            .map_err(|err| CoreError::Auth(format!("unable to run credential helper: {err}")))?;

        parse_helper_output(&output.stdout).ok_or_else(|| {
            CoreError::Auth(format!(
                "credential helper produced no {AUTH_TOKEN_HEADER} header for {}",
                self.auth_url
            ))
        })
    }
}

fn parse_helper_output(stdout: &[u8]) -> Option<String> {
    let dump = String::from_utf8_lossy(stdout);
    for line in dump.lines() {
        let lowered = line.to_ascii_lowercase();
        if let Some(position) = lowered.find(&format!("{AUTH_TOKEN_HEADER}:")) {
            let value = line[position + AUTH_TOKEN_HEADER.len() + 1..].trim();
            if !value.is_empty() {
                return Some(value.to_owned());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::fetch::TransportResponse;

    #[derive(Debug)]
    struct AuthTransport {
        refreshes: AtomicUsize,
    }

    impl AuthTransport {
        fn new() -> Self {
            Self {
                refreshes: AtomicUsize::new(0),
            }
        }

        fn refresh_count(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    impl HttpTransport for AuthTransport {
        fn execute<'a>(
            &'a self,
            request: FetchRequest,
        ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>>
        {
            let _ = request;
            let count = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                let mut headers = BTreeMap::new();
                headers.insert(
                    String::from(AUTH_TOKEN_HEADER),
                    format!("token-{count}"),
                );
                Ok(TransportResponse {
                    status: 200,
                    headers,
                    body: Vec::new(),
                })
            })
        }
    }

    #[derive(Debug)]
    struct HeaderlessTransport;

    impl HttpTransport for HeaderlessTransport {
        fn execute<'a>(
            &'a self,
            request: FetchRequest,
        ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>>
        {
            let _ = request;
            Box::pin(async move { Ok(TransportResponse::ok_body("")) })
        }
    }

    #[tokio::test]
    async fn cached_token_is_reused_within_validity_window() {
        let transport = Arc::new(AuthTransport::new());
        let manager = TokenManager::new(transport.clone(), &Settings::default());

        let first = manager.token().await.expect("first token");
        let second = manager.token().await.expect("second token");

        assert_eq!(first, second);
        assert_eq!(transport.refresh_count(), 1);
    }

    #[tokio::test]
    async fn expired_token_is_replaced() {
        let transport = Arc::new(AuthTransport::new());
        let manager = TokenManager::new(transport.clone(), &Settings::default())
            .with_validity(Duration::ZERO);

        let first = manager.token().await.expect("first token");
        let second = manager.token().await.expect("second token");

        assert_ne!(first, second);
        assert_eq!(transport.refresh_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_refresh() {
        let transport = Arc::new(AuthTransport::new());
        let manager = Arc::new(TokenManager::new(transport.clone(), &Settings::default()));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let manager = manager.clone();
            tasks.spawn(async move { manager.token().await });
        }

        let mut tokens = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            tokens.push(joined.expect("task").expect("token"));
        }

        assert_eq!(transport.refresh_count(), 1);
        assert!(tokens.iter().all(|token| token == &tokens[0]));
    }

    #[tokio::test]
    async fn missing_auth_header_surfaces_auth_error() {
        let manager = TokenManager::new(Arc::new(HeaderlessTransport), &Settings::default());

        let error = manager.token().await.expect_err("must fail");
        assert_eq!(error.kind(), crate::error::ErrorKind::Auth);
    }

    #[test]
    fn helper_output_parsing_finds_the_token_line() {
        let stdout = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nX-Auth-Token: abcdef123456\r\n";
        assert_eq!(parse_helper_output(stdout).as_deref(), Some("abcdef123456"));
    }

    #[test]
    fn helper_output_without_token_yields_none() {
        let stdout = b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n";
        assert_eq!(parse_helper_output(stdout), None);
    }

    #[test]
    fn credential_validity_respects_expiry() {
        let credential = Credential {
            account: String::from("das"),
            agent: String::from("fedquery/0.1.0"),
            token: String::from("tok"),
            expires: 1_000,
        };
        assert!(credential.is_valid_at(999));
        assert!(!credential.is_valid_at(1_000));
    }
}
