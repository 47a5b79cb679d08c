//! Request descriptors and the option-merge rules used to build them.
//!
//! Every outbound call is described by a [`RequestDescriptor`] assembled fresh from a
//! [`CallOptions`] value. The merge precedence is fixed: configured defaults first,
//! then caller-supplied fields, then computed forwarding headers, then the bearer
//! token, and finally relative-to-absolute URI resolution. Header maps merge
//! structurally; later layers override individual keys, never the whole map.

// crates.io
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;
// self
use crate::{_prelude::*, config::ClientConfig, error::ConfigError, token::Credential};

/// Byte stream used for tunnel-mode bodies that must not be buffered whole.
pub type RawByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// HTTP methods the client issues and the forwarder relays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// HTTP GET.
	Get,
	/// HTTP POST.
	Post,
	/// HTTP PUT.
	Put,
	/// HTTP DELETE.
	Delete,
}
impl Method {
	/// Returns the canonical wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Delete => "DELETE",
		}
	}

	/// Returns `true` for methods that must carry a body.
	pub const fn requires_body(self) -> bool {
		matches!(self, Self::Post | Self::Put)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl TryFrom<&str> for Method {
	type Error = ConfigError;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		match value.to_ascii_uppercase().as_str() {
			"GET" => Ok(Self::Get),
			"POST" => Ok(Self::Post),
			"PUT" => Ok(Self::Put),
			"DELETE" => Ok(Self::Delete),
			other => Err(ConfigError::UnsupportedMethod { method: other.into() }),
		}
	}
}

/// Request body shapes understood by the transport.
#[derive(Default)]
pub enum Body {
	/// No body.
	#[default]
	Empty,
	/// Structured JSON body, serialized by the transport.
	Json(Value),
	/// Pre-encoded bytes relayed verbatim.
	Raw(Bytes),
	/// Unbuffered byte stream; used by tunnel-mode forwarding for large uploads.
	Stream(RawByteStream),
}
impl Body {
	/// Returns `true` when no body is attached.
	pub fn is_empty(&self) -> bool {
		matches!(self, Self::Empty)
	}
}
impl Debug for Body {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Empty => f.write_str("Empty"),
			Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
			Self::Raw(bytes) => f.debug_tuple("Raw").field(&bytes.len()).finish(),
			Self::Stream(_) => f.write_str("Stream(..)"),
		}
	}
}
impl From<Value> for Body {
	fn from(value: Value) -> Self {
		Self::Json(value)
	}
}

/// Inbound-request facts forwarded to the backend as `x-forwarded-*` headers.
#[derive(Clone, Debug, Default)]
pub struct ForwardedParts {
	/// Originating client IP, relayed as `x-forwarded-user-ip`.
	pub user_ip: Option<String>,
	/// Originating User-Agent, relayed as `x-forwarded-user-agent`.
	pub user_agent: Option<String>,
	/// Inbound Content-Type, copied onto the outbound request.
	pub content_type: Option<String>,
}

/// Structured per-call options; the single options parameter of the call layer.
///
/// `From<&str>` provides the bare-URI shortcut, so `client.get("/api/movies")` and
/// `client.get(CallOptions::new("/api/movies"))` are equivalent.
#[derive(Debug, Default)]
pub struct CallOptions {
	/// Backend-relative or absolute URI.
	pub uri: String,
	/// Extra request headers; overridden key-by-key by computed and auth headers.
	pub headers: BTreeMap<String, String>,
	/// Query-string parameters.
	pub query: BTreeMap<String, String>,
	/// Request body.
	pub body: Body,
	/// Per-call timeout override.
	pub timeout: Option<Duration>,
	/// Per-call redirect-following override.
	pub follow_redirects: Option<bool>,
}
impl CallOptions {
	/// Creates options for the provided URI.
	pub fn new(uri: impl Into<String>) -> Self {
		Self { uri: uri.into(), ..Default::default() }
	}

	/// Attaches a JSON body.
	pub fn json(mut self, body: Value) -> Self {
		self.body = Body::Json(body);

		self
	}

	/// Attaches an arbitrary body shape.
	pub fn body(mut self, body: Body) -> Self {
		self.body = body;

		self
	}

	/// Adds one request header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Adds one query-string parameter.
	pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.insert(name.into(), value.into());

		self
	}

	/// Overrides the configured timeout for this call.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Overrides redirect-following for this call.
	pub fn follow_redirects(mut self, follow: bool) -> Self {
		self.follow_redirects = Some(follow);

		self
	}
}
impl From<&str> for CallOptions {
	fn from(uri: &str) -> Self {
		Self::new(uri)
	}
}
impl From<String> for CallOptions {
	fn from(uri: String) -> Self {
		Self::new(uri)
	}
}

/// Fully resolved request description handed to the transport.
///
/// Built fresh per call and never retained; the URI is always absolute by the time a
/// descriptor exists.
#[derive(Debug)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub uri: Url,
	/// Request headers.
	pub headers: BTreeMap<String, String>,
	/// Query-string parameters appended by the transport.
	pub query: BTreeMap<String, String>,
	/// Request body.
	pub body: Body,
	/// Whether the transport may follow redirects for this request.
	pub follow_redirects: bool,
	/// Transport timeout for this request.
	pub timeout: Duration,
}

/// Assembles a descriptor from caller options, computed forwarding headers, and the
/// bearer credential, applying the fixed merge precedence.
pub(crate) fn build_descriptor(
	config: &ClientConfig,
	method: Method,
	options: CallOptions,
	credential: Option<&Credential>,
	forwarded: Option<&ForwardedParts>,
) -> Result<RequestDescriptor, ConfigError> {
	if options.uri.is_empty() {
		return Err(ConfigError::MissingUri);
	}
	if method.requires_body() && options.body.is_empty() {
		return Err(ConfigError::MissingBody { method: method.as_str() });
	}

	// Caller headers first; computed forwarding headers and the bearer token override
	// those specific keys, everything else the caller set survives untouched.
	let mut headers = options.headers;

	if let Some(parts) = forwarded {
		if let Some(user_ip) = &parts.user_ip {
			insert_overriding(&mut headers, "x-forwarded-user-ip", user_ip.clone());
		}
		if let Some(user_agent) = &parts.user_agent {
			insert_overriding(&mut headers, "x-forwarded-user-agent", user_agent.clone());
		}
		if let Some(content_type) = &parts.content_type {
			insert_overriding(&mut headers, "Content-Type", content_type.clone());
		}
	}
	if let Some(credential) = credential {
		insert_overriding(
			&mut headers,
			"Authorization",
			format!("Bearer {}", credential.access_token.expose()),
		);
	}

	Ok(RequestDescriptor {
		method,
		uri: resolve_uri(&config.base_url, &options.uri)?,
		headers,
		query: options.query,
		body: options.body,
		follow_redirects: options.follow_redirects.unwrap_or(true),
		timeout: options.timeout.unwrap_or(config.timeout),
	})
}

/// Header names are case-insensitive on the wire, so an override first drops every
/// caller spelling of the key before inserting the computed one.
fn insert_overriding(headers: &mut BTreeMap<String, String>, name: &str, value: String) {
	headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
	headers.insert(name.into(), value);
}

/// Resolves a caller URI: absolute URLs pass through unchanged, anything else is
/// prefixed with the configured base URL (preserving any base path component).
pub(crate) fn resolve_uri(base_url: &Url, uri: &str) -> Result<Url, ConfigError> {
	match Url::parse(uri) {
		Ok(url) => Ok(url),
		Err(url::ParseError::RelativeUrlWithoutBase) => {
			let base = base_url.as_str().trim_end_matches('/');
			let joined = if uri.starts_with('/') {
				format!("{base}{uri}")
			} else {
				format!("{base}/{uri}")
			};

			Url::parse(&joined)
				.map_err(|source| ConfigError::InvalidUri { uri: uri.into(), source })
		},
		Err(source) => Err(ConfigError::InvalidUri { uri: uri.into(), source }),
	}
}
