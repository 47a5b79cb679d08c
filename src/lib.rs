//! Bearer-token backend API client—client-credentials token caching, structured
//! authenticated calls, and raw proxy forwarding in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod proxy;
pub mod request;
pub mod token;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		client::{Client, ReqwestBackendClient},
		config::ClientConfig,
		http::ReqwestTransport,
	};

	/// API key baked into the test helpers and mock token endpoints.
	pub const TEST_API_KEY: &str = "test-api-key";
	/// API secret baked into the test helpers and mock token endpoints.
	pub const TEST_API_SECRET: &str = "test-api-secret";

	/// Builds a reqwest-backed client pointed at a mock backend base URL.
	pub fn build_reqwest_test_client(base_url: &str) -> ReqwestBackendClient {
		let config = ClientConfig::builder(
			Url::parse(base_url).expect("Test base URL should parse."),
			TEST_API_KEY,
			TEST_API_SECRET,
		)
		.build()
		.expect("Test config should build.");

		test_client_with_config(config)
	}

	/// Builds a reqwest-backed client from a caller-assembled configuration.
	pub fn test_client_with_config(config: ClientConfig) -> ReqwestBackendClient {
		let transport =
			ReqwestTransport::new().expect("Failed to build reqwest transport for tests.");

		Client::with_transport(config, transport)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::RwLock;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use bytes;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use serde_json;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
#[cfg(test)] use {backend_relay as _, tokio as _};
