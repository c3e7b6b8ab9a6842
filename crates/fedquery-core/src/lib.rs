//! # Fedquery Core
//!
//! Aggregation core of the fedquery federated data-query service.
//!
//! ## Overview
//!
//! Fedquery unifies heterogeneous HTTP/JSON backends — a workflow manager,
//! a replica catalog, a site/identity directory and a request-config store
//! — behind one canonical [`Record`] model, so a higher-level query layer
//! can treat many incompatible REST APIs as a single data source.
//!
//! This crate provides:
//!
//! - **Canonical Records** with arbitrary-precision numbers and tagged
//!   error Records
//! - **A concurrent fetch engine** with URL validation, bounded retry and
//!   one shared client
//! - **A bearer-token credential cache** with single-flight refresh
//! - **Per-backend adapters** behind a `(service, api)` dispatch table
//! - **A multi-round resolution orchestrator** chaining dependent lookups
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Backend adapters (workflow, replica, directory, reqconfig) |
//! | [`config`] | Startup settings read once from the environment |
//! | [`context`] | Shared client + credential cache context |
//! | [`credentials`] | TTL-bounded bearer-token cache |
//! | [`error`] | Core error taxonomy |
//! | [`fetch`] | Fetch engine and HTTP transport seam |
//! | [`orchestrator`] | Multi-round fan-out/fan-in resolution |
//! | [`query`] | Query specification and wildcard filtering |
//! | [`record`] | Canonical Record type |
//! | [`retry`] | Retry policy |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fedquery_core::{adapters, QuerySpec, ServiceContext, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ServiceContext::from_settings(Settings::from_env())?;
//!
//!     let token = ctx.credentials.token().await?;
//!     let response = ctx
//!         .fetcher
//!         .fetch_one("https://replica.example.org/replicas/list", Some(&token))
//!         .await;
//!
//!     let spec = QuerySpec::default();
//!     for record in adapters::normalize("replica", "rses", &response.data, &spec) {
//!         println!("{record:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Query Layer     │  (external: parser, result cache)
//! └────────┬─────────┘
//!          │ QuerySpec
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │  Orchestrator    │────▶│ Service Adapters │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │                        │
//!          ▼                        ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │  Fetch Engine    │◀────│ Credential Cache │
//! │  (shared client) │     │ (single-flight)  │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Failure is data: fetch errors travel inside [`fetch::FetchResponse`],
//! parse failures become error Records tagged with an error kind, and a
//! result batch may interleave success and error Records. Consumers branch
//! on the `kind` tag:
//!
//! ```rust
//! use fedquery_core::Record;
//!
//! fn handle(record: &Record) {
//!     match record.error_kind() {
//!         Some("parse_error") => { /* report the backend payload */ }
//!         Some("network_error") => { /* endpoint unreachable */ }
//!         _ => { /* normal data record */ }
//!     }
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod query;
pub mod record;
pub mod retry;

// Re-export commonly used types at crate root for convenience

pub use config::Settings;
pub use context::ServiceContext;
pub use credentials::{Credential, RefreshStrategy, TokenManager, TOKEN_VALIDITY};
pub use error::{CoreError, ErrorKind};
pub use fetch::{
    validate_url, FetchRequest, FetchResponse, Fetcher, HttpTransport, NoopTransport,
    ReqwestTransport, TransportResponse,
};
pub use orchestrator::resolve_configs;
pub use query::{QuerySpec, WildcardPattern};
pub use record::Record;
pub use retry::{Backoff, RetryConfig};
