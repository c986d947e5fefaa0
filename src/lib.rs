//! Server-side OAuth 2.0 access gate: single-use PKCE challenges, fixed-window
//! rate limits, deadline-guarded token flows, and stale-document sweeps over a
//! per-document-atomic store.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod challenge;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod ident;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod rate_limit;
pub mod store;
pub mod sweep;
pub mod token;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		flows::Broker,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{ClientAuthMethod, ProviderDescriptor},
		store::{GateStore, MemoryStore},
		token::Secret,
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Default upstream deadline used across integration tests.
	pub const TEST_TIMEOUT: Duration = Duration::seconds(5);

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests, with the test deadline baked in.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(std::time::Duration::from_secs(TEST_TIMEOUT.whole_seconds() as u64))
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client, TEST_TIMEOUT)
	}

	/// Builds a provider descriptor pointing at an `httpmock` server.
	pub fn test_descriptor(base_url: &str) -> ProviderDescriptor {
		ProviderDescriptor::builder()
			.authorization_endpoint(
				Url::parse(&format!("{base_url}/authorize"))
					.expect("Failed to parse test authorization endpoint."),
			)
			.token_endpoint(
				Url::parse(&format!("{base_url}/token"))
					.expect("Failed to parse test token endpoint."),
			)
			.client_auth_method(ClientAuthMethod::ClientSecretBasic)
			.scope("openid")
			.build()
			.expect("Failed to build test provider descriptor.")
	}

	/// Constructs a [`Broker`] backed by an in-memory store and the insecure
	/// reqwest transport used across integration tests.
	pub fn build_reqwest_test_broker(
		descriptor: ProviderDescriptor,
		client_id: &str,
		client_secret: &str,
	) -> (ReqwestTestBroker, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn GateStore> = store_backend.clone();
		let http_client = test_reqwest_http_client();
		let mapper = Arc::new(ReqwestTransportErrorMapper);
		let broker = Broker::with_http_client(store, descriptor, client_id, http_client, mapper)
			.with_client_secret(Secret::new(client_secret));

		(broker, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {httpmock as _, oauth2_gate as _, tokio as _};
