//! Immutable client configuration and its validating builder.

// self
use crate::{_prelude::*, error::ConfigError, token::Secret};

/// Immutable configuration consumed by [`Client`](crate::client::Client).
///
/// Construction goes through [`ClientConfig::builder`], which rejects empty
/// credentials before any network activity. Once built, the configuration never
/// changes for the lifetime of the client.
#[derive(Clone)]
pub struct ClientConfig {
	/// Backend base URL that relative call URIs are resolved against.
	pub base_url: Url,
	/// OAuth2 client identifier used for the client-credentials grant.
	pub api_key: String,
	/// OAuth2 client secret used for the client-credentials grant.
	pub api_secret: Secret,
	/// Per-request transport timeout.
	pub timeout: Duration,
	/// Status codes the call layer resolves as success.
	pub accepted_statuses: BTreeSet<u16>,
}
impl ClientConfig {
	/// Default per-request timeout.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(2);

	/// Creates a new builder seeded with the backend base URL and credentials.
	pub fn builder(
		base_url: Url,
		api_key: impl Into<String>,
		api_secret: impl Into<String>,
	) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url, api_key, api_secret)
	}

	/// Checks whether the call layer treats `status` as success.
	pub fn accepts(&self, status: u16) -> bool {
		self.accepted_statuses.contains(&status)
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("base_url", &self.base_url.as_str())
			.field("api_key", &self.api_key)
			.field("api_secret", &self.api_secret)
			.field("timeout", &self.timeout)
			.field("accepted_statuses", &self.accepted_statuses)
			.finish()
	}
}

/// Builder for [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct ClientConfigBuilder {
	base_url: Url,
	api_key: String,
	api_secret: String,
	timeout: Duration,
	accepted_statuses: BTreeSet<u16>,
}
impl ClientConfigBuilder {
	fn new(base_url: Url, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
		Self {
			base_url,
			api_key: api_key.into(),
			api_secret: api_secret.into(),
			timeout: ClientConfig::DEFAULT_TIMEOUT,
			accepted_statuses: BTreeSet::from([200]),
		}
	}

	/// Overrides the per-request timeout (defaults to 2 seconds).
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Replaces the accepted status set (defaults to `{200}`).
	pub fn accepted_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
		self.accepted_statuses = statuses.into_iter().collect();

		self
	}

	/// Adds one status to the accepted set.
	pub fn accept_status(mut self, status: u16) -> Self {
		self.accepted_statuses.insert(status);

		self
	}

	/// Validates the credentials and produces an immutable [`ClientConfig`].
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		if self.api_key.is_empty() {
			return Err(ConfigError::MissingApiKey);
		}
		if self.api_secret.is_empty() {
			return Err(ConfigError::MissingApiSecret);
		}

		Ok(ClientConfig {
			base_url: self.base_url,
			api_key: self.api_key,
			api_secret: Secret::new(self.api_secret),
			timeout: self.timeout,
			accepted_statuses: self.accepted_statuses,
		})
	}
}
