//! Client-level error types shared across the token cache, call layer, and proxy forwarder.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
///
/// The four kinds matter to callers: [`Error::Backend`] means the backend answered and
/// rejected the call, while [`Error::Transport`] means no response arrived at all, so the
/// two must never be collapsed into one another.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration or call-construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token issuance failed; the credential cache is left untouched.
	#[error("Token issuance failed: {message}.")]
	Authentication {
		/// HTTP status returned by the token endpoint, when a response arrived.
		status: Option<u16>,
		/// Upstream- or client-supplied reason string.
		message: String,
	},
	/// Transport failure (DNS, TCP, TLS, timeout); no response was received.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Backend answered with a status outside the accepted set.
	#[error("Backend rejected the call with status {status}: {message}.")]
	Backend {
		/// HTTP status returned by the backend.
		status: u16,
		/// Message extracted from the response body's `error` field, else `unknown`.
		message: String,
	},
}
impl Error {
	/// Effective HTTP status to answer with when relaying this error outward.
	///
	/// Backend failures carry the upstream status; transport and authentication
	/// failures default to 500. Configuration errors yield `None` because they are
	/// raised before any outbound activity.
	pub fn status_code(&self) -> Option<u16> {
		match self {
			Self::Config(_) => None,
			Self::Authentication { status, .. } => Some(status.unwrap_or(500)),
			Self::Transport(_) => Some(500),
			Self::Backend { status, .. } => Some(*status),
		}
	}
}

/// Configuration and validation failures raised before any network activity.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Client was constructed without an API key.
	#[error("Missing apiKey.")]
	MissingApiKey,
	/// Client was constructed without an API secret.
	#[error("Missing apiSecret.")]
	MissingApiSecret,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},

	/// Call options lack a URI.
	#[error("Call options are missing a uri.")]
	MissingUri,
	/// Body-carrying method was invoked without a body.
	#[error("{method} requires a body.")]
	MissingBody {
		/// Method label that required the body.
		method: &'static str,
	},
	/// URI could not be resolved against the configured base URL.
	#[error("URI `{uri}` could not be resolved.")]
	InvalidUri {
		/// Offending URI string.
		uri: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Inbound request used a method the forwarder does not relay.
	#[error("Method `{method}` cannot be forwarded.")]
	UnsupportedMethod {
		/// Method label taken from the inbound request.
		method: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO); no [`ResponseEnvelope`](crate::http::ResponseEnvelope)
/// was produced.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Backend did not answer within the configured timeout.
	#[error("Backend did not respond within the configured timeout.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Outbound request could not be assembled (invalid header bytes, bad URL).
	#[error("Outbound request could not be constructed: {message}.")]
	Request {
		/// Human-readable construction failure.
		message: String,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Flags a request that could not be assembled.
	pub fn request(message: impl Into<String>) -> Self {
		Self::Request { message: message.into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn status_codes_follow_error_kind() {
		assert_eq!(Error::Config(ConfigError::MissingUri).status_code(), None);
		assert_eq!(
			Error::Authentication { status: Some(401), message: "nope".into() }.status_code(),
			Some(401),
		);
		assert_eq!(
			Error::Authentication { status: None, message: "nope".into() }.status_code(),
			Some(500),
		);
		assert_eq!(
			Error::Transport(TransportError::request("bad header")).status_code(),
			Some(500),
		);
		assert_eq!(
			Error::Backend { status: 404, message: "not found".into() }.status_code(),
			Some(404),
		);
	}

	#[test]
	fn backend_message_surfaces_in_display() {
		let err = Error::Backend { status: 403, message: "forbidden".into() };

		assert_eq!(err.to_string(), "Backend rejected the call with status 403: forbidden.");
	}
}
