//! Behavior tests for the credential cache.
//!
//! These verify the TTL contract and the single-flight refresh guarantee
//! under concurrency.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fedquery_tests::{Arc, CoreError, ErrorKind, FetchRequest, HttpTransport, Settings, TransportResponse};

use fedquery_core::credentials::TokenManager;

/// Auth endpoint double: every call mints a distinct token in the
/// `x-auth-token` response header.
struct AuthEndpoint {
    refreshes: AtomicUsize,
}

impl AuthEndpoint {
    fn new() -> Self {
        Self {
            refreshes: AtomicUsize::new(0),
        }
    }

    fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl HttpTransport for AuthEndpoint {
    fn execute<'a>(
        &'a self,
        _request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>> {
        let count = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            // a slow-ish refresh widens the race window for the
            // single-flight assertion below
            tokio::time::sleep(Duration::from_millis(10)).await;
            let mut headers = BTreeMap::new();
            headers.insert(String::from("x-auth-token"), format!("token-{count}"));
            Ok(TransportResponse {
                status: 200,
                headers,
                body: Vec::new(),
            })
        })
    }
}

#[tokio::test]
async fn token_is_reused_unchanged_inside_the_validity_window() {
    // Given: a fresh manager over a counting auth endpoint
    let endpoint = Arc::new(AuthEndpoint::new());
    let manager = TokenManager::new(endpoint.clone(), &Settings::default());

    // When: two callers ask inside the nominal validity window
    let first = manager.token().await.expect("first token");
    let second = manager.token().await.expect("second token");

    // Then: identical token, exactly one refresh
    assert_eq!(first, second);
    assert_eq!(endpoint.refresh_count(), 1);
}

#[tokio::test]
async fn concurrent_expired_callers_trigger_exactly_one_refresh() {
    // Given: sixteen callers racing on an empty cache
    let endpoint = Arc::new(AuthEndpoint::new());
    let manager = Arc::new(TokenManager::new(endpoint.clone(), &Settings::default()));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let manager = manager.clone();
        tasks.spawn(async move { manager.token().await });
    }

    // When: all complete
    let mut tokens = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        tokens.push(joined.expect("task").expect("token"));
    }

    // Then: one refresh executed and every caller got its result
    assert_eq!(endpoint.refresh_count(), 1);
    assert_eq!(tokens.len(), 16);
    assert!(tokens.iter().all(|token| token == &tokens[0]));
}

#[tokio::test]
async fn expired_token_is_replaced_by_a_fresh_one() {
    // Given: a zero-length validity window, so every call sees expiry
    let endpoint = Arc::new(AuthEndpoint::new());
    let manager = TokenManager::new(endpoint.clone(), &Settings::default())
        .with_validity(Duration::ZERO);

    let first = manager.token().await.expect("first token");
    let second = manager.token().await.expect("second token");

    assert_ne!(first, second);
    assert_eq!(endpoint.refresh_count(), 2);
}

#[tokio::test]
async fn refresh_failure_surfaces_as_an_auth_error() {
    struct DeadEndpoint;

    impl HttpTransport for DeadEndpoint {
        fn execute<'a>(
            &'a self,
            _request: FetchRequest,
        ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>>
        {
            Box::pin(async move { Err(CoreError::Network(String::from("refused"))) })
        }
    }

    let manager = TokenManager::new(Arc::new(DeadEndpoint), &Settings::default());

    let error = manager.token().await.expect_err("refresh must fail");
    assert_eq!(error.kind(), ErrorKind::Auth);
}

#[tokio::test]
async fn auth_request_carries_account_identity_and_agent() {
    use std::sync::Mutex;

    struct RecordingEndpoint {
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl HttpTransport for RecordingEndpoint {
        fn execute<'a>(
            &'a self,
            request: FetchRequest,
        ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, CoreError>> + Send + 'a>>
        {
            self.requests.lock().expect("store").push(request);
            Box::pin(async move {
                let mut headers = BTreeMap::new();
                headers.insert(String::from("x-auth-token"), String::from("tok"));
                Ok(TransportResponse {
                    status: 200,
                    headers,
                    body: Vec::new(),
                })
            })
        }
    }

    let endpoint = Arc::new(RecordingEndpoint {
        requests: Mutex::new(Vec::new()),
    });
    let manager = TokenManager::new(endpoint.clone(), &Settings::default());

    manager.token().await.expect("token");

    let requests = endpoint.requests.lock().expect("store");
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers.get("x-auth-account").map(String::as_str),
        Some("das")
    );
    assert!(requests[0]
        .headers
        .get("user-agent")
        .is_some_and(|agent| agent.starts_with("fedquery/")));
    assert!(requests[0].url.ends_with("/auth/x509"));
}
