//! Concurrent fetch engine.
//!
//! One shared HTTP client is built at startup and reused by every worker.
//! Each fetch validates its URL before any network use, retries failures
//! with strictly increasing backoff, and returns the final error as data
//! inside the [`FetchResponse`] instead of raising it. Callers that fan out
//! correlate completions by URL, never by arrival order.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::task::JoinSet;

use crate::config::Settings;
use crate::error::CoreError;
use crate::retry::RetryConfig;

/// Request header carrying the bearer token for authenticated backends.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";
/// Request header carrying the account identity for authenticated backends.
pub const AUTH_ACCOUNT_HEADER: &str = "x-auth-account";

static URL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn url_pattern() -> &'static Regex {
    URL_PATTERN.get_or_init(|| {
        Regex::new(r"^(https|http)://[-A-Za-z0-9_+&@#/%?=~|!:,.;]*[-A-Za-z0-9+&@#/%=~_|]$")
            .expect("url pattern is valid")
    })
}

/// Validate a URL against the accepted scheme and character class.
pub fn validate_url(url: &str) -> bool {
    !url.is_empty() && url_pattern().is_match(url)
}

/// Outgoing request envelope handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    /// GET request with the standing header set every backend receives.
    pub fn get(url: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(String::from("accept-encoding"), String::from("identity"));
        headers.insert(String::from("connection"), String::from("keep-alive"));
        Self {
            url: url.into(),
            headers,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_user_agent(self, agent: &str) -> Self {
        self.with_header("user-agent", agent)
    }

    /// Attach the bearer token of an authenticated backend.
    pub fn with_token(self, token: &str) -> Self {
        self.with_header(AUTH_TOKEN_HEADER, token)
    }

    /// Attach the account identity of an authenticated backend.
    pub fn with_account(self, account: &str) -> Self {
        self.with_header(AUTH_ACCOUNT_HEADER, account)
    }
}

/// Raw transport response: status line, lower-cased headers, body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn ok_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Transport contract behind the fetch engine and the credential cache.
pub trait HttpTransport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>>;
}

/// Default no-op transport for deterministic offline tests.
#[derive(Debug, Default)]
pub struct NoopTransport;

impl HttpTransport for NoopTransport {
    fn execute<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>> {
        let _ = request;
        Box::pin(async move { Ok(TransportResponse::ok_body("{}")) })
    }
}

/// Production transport over one shared reqwest client.
///
/// Client identity is selected once, in priority order: the X.509 proxy
/// credential file, then an explicit certificate+key pair, then none. Peer
/// certificate verification is disabled: backend endpoints are trusted out
/// of band, and that operational decision is preserved here.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(true);
        if let Some(identity) = client_identity(settings) {
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|err| CoreError::Network(format!("unable to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

fn client_identity(settings: &Settings) -> Option<reqwest::Identity> {
    if let Some(proxy) = &settings.proxy_file {
        match std::fs::read(proxy).map_err(|err| err.to_string()).and_then(|pem| {
            reqwest::Identity::from_pem(&pem).map_err(|err| err.to_string())
        }) {
            Ok(identity) => return Some(identity),
            Err(err) => {
                log::warn!("unable to load proxy credential {proxy}: {err}");
                return None;
            }
        }
    }
    if let (Some(cert), Some(key)) = (&settings.cert_file, &settings.key_file) {
        let loaded = std::fs::read(cert)
            .and_then(|mut pem| {
                std::fs::read(key).map(|key_pem| {
                    pem.extend_from_slice(&key_pem);
                    pem
                })
            })
            .map_err(|err| err.to_string())
            .and_then(|pem| reqwest::Identity::from_pem(&pem).map_err(|err| err.to_string()));
        match loaded {
            Ok(identity) => return Some(identity),
            Err(err) => {
                log::warn!("unable to load client certificate {cert}: {err}");
                return None;
            }
        }
    }
    None
}

impl HttpTransport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self.client.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|err| {
                if err.is_timeout() {
                    CoreError::Network(format!("request timeout: {err}"))
                } else if err.is_connect() {
                    CoreError::Network(format!("connection failed: {err}"))
                } else {
                    CoreError::Network(format!("request failed: {err}"))
                }
            })?;

            let status = response.status().as_u16();
            let mut headers = BTreeMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.as_str().to_ascii_lowercase(), value.to_owned());
                }
            }
            let body = response
                .bytes()
                .await
                .map_err(|err| CoreError::Network(format!("unable to read response body: {err}")))?
                .to_vec();

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Fetch result correlated by URL. Failure is data: `error` holds the last
/// error after retries, and `data` is empty in that case.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub url: String,
    pub data: Vec<u8>,
    pub error: Option<CoreError>,
}

impl FetchResponse {
    pub fn ok(url: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            data,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: CoreError) -> Self {
        Self {
            url: url.into(),
            data: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Fetch engine: shared transport plus retry policy.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    retry: RetryConfig,
    agent: String,
    account: String,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryConfig, settings: &Settings) -> Self {
        Self {
            transport,
            retry,
            agent: settings.user_agent.clone(),
            account: settings.account.clone(),
        }
    }

    fn build_request(&self, url: &str, token: Option<&str>) -> FetchRequest {
        let mut request = FetchRequest::get(url).with_user_agent(&self.agent);
        if let Some(token) = token {
            request = request.with_token(token).with_account(&self.account);
        }
        request
    }

    /// Fetch one URL with bounded retries.
    ///
    /// An invalid URL is rejected synchronously with zero transport calls.
    /// A permanently failing endpoint is attempted `1 + max_retries` times
    /// with strictly increasing delay, then reported through
    /// [`FetchResponse::error`].
    pub async fn fetch_one(&self, url: &str, token: Option<&str>) -> FetchResponse {
        if !validate_url(url) {
            return FetchResponse::failed(
                url,
                CoreError::InvalidInput(format!("invalid URL: {url}")),
            );
        }

        let request = self.build_request(url, token);
        let mut last_error = CoreError::Network(String::from("no attempt executed"));
        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt - 1)).await;
            }
            match self.transport.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    return FetchResponse::ok(url, response.body);
                }
                Ok(response) => {
                    last_error = CoreError::Network(format!(
                        "{url} returned status {}",
                        response.status
                    ));
                }
                Err(error) => last_error = error,
            }
            log::warn!(
                "fetch failed for {url}, attempt {} of {}: {last_error}",
                attempt + 1,
                self.retry.max_retries + 1
            );
        }
        FetchResponse::failed(url, last_error)
    }

    /// Dispatch one concurrent fetch task into the caller's join set.
    ///
    /// The caller fans in by draining the set and matching responses by URL.
    pub fn spawn_fetch(
        &self,
        tasks: &mut JoinSet<FetchResponse>,
        url: String,
        token: Option<String>,
    ) {
        let fetcher = self.clone();
        tasks.spawn(async move { fetcher.fetch_one(&url, token.as_deref()).await });
    }
}
