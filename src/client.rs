//! Authenticated call layer tying the token cache, request builder, and transport together.

// crates.io
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	http::{HttpTransport, ResponseEnvelope},
	obs::{self, OpKind, OpOutcome, OpSpan},
	request::{self, CallOptions, ForwardedParts, Method},
	token::{Credential, TokenCache, TokenGrant},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Backend path of the client-credentials token endpoint.
const TOKEN_PATH: &str = "/auth/oauth2/token";

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestBackendClient = Client<ReqwestTransport>;

/// Backend API client owning one cached credential and one transport.
///
/// The client is cheap to clone; clones share the transport, configuration, and
/// credential cache. Each call ensures a valid bearer token (issuing one lazily on
/// first use), builds a fresh descriptor, and classifies the backend's answer into
/// the crate's error taxonomy. Retry policy deliberately stays with the caller.
pub struct Client<C>
where
	C: ?Sized + HttpTransport,
{
	/// HTTP transport used for every outbound request.
	pub transport: Arc<C>,
	/// Immutable client configuration.
	pub config: Arc<ClientConfig>,
	cache: Arc<TokenCache>,
}
impl<C> Client<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(config: ClientConfig, transport: impl Into<Arc<C>>) -> Self {
		Self {
			transport: transport.into(),
			config: Arc::new(config),
			cache: Arc::new(TokenCache::default()),
		}
	}

	/// Returns a valid bearer credential, issuing one when the cache is empty or stale.
	///
	/// The fast path is lock-free apart from a read on the credential slot; no network
	/// call happens while the cached credential is still valid. Cache misses serialize
	/// on the issuance guard so concurrent stale callers share one token request. A
	/// failed issuance leaves the cache untouched, so the next call retries instead of
	/// presenting a broken token.
	pub async fn ensure_token(&self) -> Result<Arc<Credential>> {
		if let Some(credential) = self.cache.current() {
			return Ok(credential);
		}

		let span = OpSpan::new(OpKind::Token, "ensure_token");

		obs::record_op_outcome(OpKind::Token, OpOutcome::Attempt);

		let result = span.instrument(self.issue_token()).await;

		match &result {
			Ok(_) => obs::record_op_outcome(OpKind::Token, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(OpKind::Token, OpOutcome::Failure),
		}

		result
	}

	async fn issue_token(&self) -> Result<Arc<Credential>> {
		let _singleflight = self.cache.issuance_guard().lock().await;

		// A concurrent caller may have refreshed while this one waited on the guard.
		if let Some(credential) = self.cache.current() {
			return Ok(credential);
		}

		// Token endpoints answer directly rather than delegating to another URI, so
		// redirect-following stays off for issuance.
		let options = CallOptions::new(TOKEN_PATH)
			.json(json!({
				"grant_type": "client_credentials",
				"client_id": self.config.api_key,
				"client_secret": self.config.api_secret.expose(),
			}))
			.follow_redirects(false);
		let descriptor =
			request::build_descriptor(&self.config, Method::Post, options, None, None)?;
		let envelope = self.transport.send(descriptor).await.map_err(|err| {
			Error::Authentication { status: None, message: err.to_string() }
		})?;

		if !self.config.accepts(envelope.status) {
			return Err(Error::Authentication {
				status: Some(envelope.status),
				message: envelope.error_message(),
			});
		}

		let grant: TokenGrant = envelope.decode().map_err(|err| Error::Authentication {
			status: Some(envelope.status),
			message: err.to_string(),
		})?;

		Ok(self.cache.store(Credential::from_grant(grant, OffsetDateTime::now_utc())))
	}

	/// Issues an authenticated GET; accepts a bare URI or full [`CallOptions`].
	pub async fn get(&self, options: impl Into<CallOptions>) -> Result<Value> {
		self.execute(Method::Get, options.into()).await
	}

	/// Issues an authenticated POST; the options must carry a body.
	pub async fn post(&self, options: impl Into<CallOptions>) -> Result<Value> {
		self.execute(Method::Post, options.into()).await
	}

	/// Issues an authenticated PUT; the options must carry a body.
	pub async fn put(&self, options: impl Into<CallOptions>) -> Result<Value> {
		self.execute(Method::Put, options.into()).await
	}

	/// Issues an authenticated DELETE; accepts a bare URI or full [`CallOptions`].
	pub async fn delete(&self, options: impl Into<CallOptions>) -> Result<Value> {
		self.execute(Method::Delete, options.into()).await
	}

	async fn execute(&self, method: Method, options: CallOptions) -> Result<Value> {
		// Malformed options are rejected before token issuance, so a bad call never
		// triggers network activity.
		if options.uri.is_empty() {
			return Err(crate::error::ConfigError::MissingUri.into());
		}
		if method.requires_body() && options.body.is_empty() {
			return Err(crate::error::ConfigError::MissingBody { method: method.as_str() }.into());
		}

		let span = OpSpan::new(OpKind::Call, method.as_str());

		obs::record_op_outcome(OpKind::Call, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let credential = self.ensure_token().await?;
				let envelope = self.send_with(method, options, Some(&credential), None).await?;

				self.classify(envelope)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(OpKind::Call, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(OpKind::Call, OpOutcome::Failure),
		}

		result
	}

	/// Builds a descriptor and dispatches it, leaving classification to the caller.
	pub(crate) async fn send_with(
		&self,
		method: Method,
		options: CallOptions,
		credential: Option<&Credential>,
		forwarded: Option<&ForwardedParts>,
	) -> Result<ResponseEnvelope> {
		let descriptor =
			request::build_descriptor(&self.config, method, options, credential, forwarded)?;

		Ok(self.transport.send(descriptor).await?)
	}

	/// Classifies one envelope: accepted statuses resolve with the decoded body, all
	/// others fail with a [`Error::Backend`] carrying the upstream status and message.
	pub(crate) fn classify(&self, envelope: ResponseEnvelope) -> Result<Value> {
		if self.config.accepts(envelope.status) {
			Ok(envelope.json_value())
		} else {
			Err(Error::Backend { status: envelope.status, message: envelope.error_message() })
		}
	}
}
#[cfg(feature = "reqwest")]
impl Client<ReqwestTransport> {
	/// Creates a client with the crate's default reqwest transport.
	pub fn new(config: ClientConfig) -> Result<Self> {
		Ok(Self::with_transport(config, ReqwestTransport::new()?))
	}
}
// Derived `Clone` would demand `C: Clone`; every field is an `Arc`, so clone by hand.
impl<C> Clone for Client<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			config: self.config.clone(),
			cache: self.cache.clone(),
		}
	}
}
impl<C> Debug for Client<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client").field("config", &self.config).finish()
	}
}
