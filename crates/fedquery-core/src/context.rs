//! Shared service context.
//!
//! Built once at startup and passed by reference into every component that
//! needs network access: the one shared client/connection pool and the
//! per-backend credential cache live here instead of in global state.

use std::sync::Arc;

use crate::config::Settings;
use crate::credentials::TokenManager;
use crate::error::CoreError;
use crate::fetch::{Fetcher, HttpTransport, ReqwestTransport};
use crate::retry::RetryConfig;

/// Process-wide context: settings, fetch engine and credential cache.
pub struct ServiceContext {
    pub settings: Settings,
    pub fetcher: Fetcher,
    /// Credential cache of the replica catalog, the one backend requiring
    /// bearer-token authentication.
    pub credentials: TokenManager,
}

impl ServiceContext {
    /// Build the production context with the shared reqwest transport.
    pub fn from_settings(settings: Settings) -> Result<Self, CoreError> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::from_settings(&settings)?);
        Ok(Self::with_transport(settings, transport))
    }

    /// Build a context over an explicit transport (used by tests).
    pub fn with_transport(settings: Settings, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_transport_and_retry(settings, transport, RetryConfig::default())
    }

    /// Build a context with an explicit transport and retry policy.
    pub fn with_transport_and_retry(
        settings: Settings,
        transport: Arc<dyn HttpTransport>,
        retry: RetryConfig,
    ) -> Self {
        let fetcher = Fetcher::new(transport.clone(), retry, &settings);
        let credentials = TokenManager::new(transport, &settings);
        Self {
            settings,
            fetcher,
            credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::NoopTransport;

    #[tokio::test]
    async fn context_wires_fetcher_and_credentials_from_settings() {
        let settings = Settings::default();
        let context = ServiceContext::with_transport(settings, Arc::new(NoopTransport));

        assert_eq!(context.credentials.account(), "das");
        let response = context
            .fetcher
            .fetch_one("https://replica.example.org/ping", None)
            .await;
        assert!(response.is_ok());
    }
}
