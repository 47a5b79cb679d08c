//! Transport primitives for backend calls.
//!
//! The module exposes [`HttpTransport`] alongside [`ResponseEnvelope`] so downstream
//! crates can integrate custom HTTP clients (or hand-rolled fakes in tests) without
//! touching the call layer. A transport performs exactly one network operation per
//! [`send`](HttpTransport::send): it either produces a complete envelope or fails with
//! a [`TransportError`], and it never retries on its own.

// std
#[cfg(feature = "reqwest")] use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use bytes::Bytes;
#[cfg(feature = "reqwest")] use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
#[cfg(feature = "reqwest")]
use crate::request::{Body, Method};
use crate::{_prelude::*, error::TransportError, request::RequestDescriptor};

/// Boxed `Send` future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ResponseEnvelope, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing fully resolved descriptors.
///
/// The trait is the call layer's only dependency on an HTTP client. Implementations
/// must be `Send + Sync` so one transport can back many concurrent calls, must honor
/// `descriptor.follow_redirects` and `descriptor.timeout`, and must capture the
/// response status, headers, and body verbatim so the proxy forwarder can relay them
/// without loss.
pub trait HttpTransport
where
	Self: Send + Sync,
{
	/// Executes the descriptor and captures the complete response.
	fn send(&self, descriptor: RequestDescriptor) -> TransportFuture<'_>;
}

/// Captured backend response: status, headers, raw body, and a correlation id.
///
/// Produced once per transport call and consumed by exactly one classification or
/// forwarding step. The correlation id ties log lines for one request together and is
/// unique per transport instance.
#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
	/// HTTP status code.
	pub status: u16,
	/// Response headers in arrival order; repeated names (e.g. `Set-Cookie`) are kept.
	pub headers: Vec<(String, String)>,
	/// Raw response body bytes.
	pub body: Bytes,
	/// Per-transport sequence number for log correlation.
	pub correlation_id: u64,
}
impl ResponseEnvelope {
	/// Returns the first header value matching `name`, case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(header, _)| header.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Decodes the body as JSON into `T`, reporting the failing path on error.
	pub fn decode<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
	}

	/// Interprets the body as a JSON value; empty bodies become `Null` and non-JSON
	/// bodies are preserved as a JSON string.
	pub fn json_value(&self) -> Value {
		if self.body.is_empty() {
			return Value::Null;
		}

		serde_json::from_slice(&self.body)
			.unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
	}

	/// Extracts the body's `error` field, defaulting to `unknown`.
	pub fn error_message(&self) -> String {
		self.json_value()
			.get("error")
			.and_then(Value::as_str)
			.map(str::to_owned)
			.unwrap_or_else(|| "unknown".into())
	}
}

/// Reqwest-backed [`HttpTransport`] holding one redirect-following client and one
/// direct client, switched per descriptor.
///
/// Redirect policy is a client-level setting in reqwest, so the transport keeps two
/// preconfigured clients instead of rebuilding one per call. Proxy-forwarded requests
/// always take the direct client; the calling browser performs redirects itself.
#[cfg(feature = "reqwest")]
#[derive(Debug)]
pub struct ReqwestTransport {
	redirecting: ReqwestClient,
	direct: ReqwestClient,
	next_correlation: AtomicU64,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with default reqwest settings.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		Ok(Self::with_clients(
			ReqwestClient::builder().build()?,
			ReqwestClient::builder().redirect(Policy::none()).build()?,
		))
	}

	/// Wraps caller-provided clients; `direct` must have redirect-following disabled.
	pub fn with_clients(redirecting: ReqwestClient, direct: ReqwestClient) -> Self {
		Self { redirecting, direct, next_correlation: AtomicU64::new(0) }
	}

	fn correlation_id(&self) -> u64 {
		self.next_correlation.fetch_add(1, Ordering::Relaxed) + 1
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, descriptor: RequestDescriptor) -> TransportFuture<'_> {
		Box::pin(async move {
			let correlation_id = self.correlation_id();
			let client =
				if descriptor.follow_redirects { &self.redirecting } else { &self.direct };
			let timeout = std::time::Duration::try_from(descriptor.timeout).map_err(|_| {
				TransportError::request(format!("invalid timeout `{}`", descriptor.timeout))
			})?;
			let mut request = client
				.request(reqwest_method(descriptor.method), descriptor.uri.clone())
				.timeout(timeout);

			for (name, value) in &descriptor.headers {
				request = request.header(name.as_str(), value.as_str());
			}
			if !descriptor.query.is_empty() {
				request = request.query(&descriptor.query);
			}

			request = match descriptor.body {
				Body::Empty => request,
				Body::Json(value) => request.json(&value),
				Body::Raw(bytes) => request.body(bytes),
				Body::Stream(stream) => request.body(reqwest::Body::wrap_stream(stream)),
			};

			#[cfg(feature = "tracing")]
			tracing::debug!(
				id = correlation_id,
				method = %descriptor.method,
				uri = %descriptor.uri,
				"dispatching backend request",
			);

			let response = request.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let headers = capture_headers(response.headers());
			let body = response.bytes().await.map_err(TransportError::from)?;

			#[cfg(feature = "tracing")]
			tracing::debug!(id = correlation_id, status, "backend responded");

			Ok(ResponseEnvelope { status, headers, body, correlation_id })
		})
	}
}

// Passthrough is mandatory, so opaque (non-UTF-8) header values are converted
// lossily rather than dropped from the envelope.
#[cfg(feature = "reqwest")]
fn capture_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
	headers
		.iter()
		.map(|(name, value)| {
			(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
		})
		.collect()
}

#[cfg(feature = "reqwest")]
fn reqwest_method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Post => reqwest::Method::POST,
		Method::Put => reqwest::Method::PUT,
		Method::Delete => reqwest::Method::DELETE,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn envelope(body: &str) -> ResponseEnvelope {
		ResponseEnvelope {
			status: 200,
			headers: vec![
				("Location".into(), "/login".into()),
				("Set-Cookie".into(), "a=1".into()),
				("Set-Cookie".into(), "b=2".into()),
			],
			body: Bytes::copy_from_slice(body.as_bytes()),
			correlation_id: 1,
		}
	}

	#[test]
	fn header_lookup_is_case_insensitive_and_keeps_duplicates() {
		let envelope = envelope("{}");

		assert_eq!(envelope.header("location"), Some("/login"));
		assert_eq!(envelope.header("set-cookie"), Some("a=1"));
		assert_eq!(envelope.headers.iter().filter(|(name, _)| name == "Set-Cookie").count(), 2);
		assert_eq!(envelope.header("x-missing"), None);
	}

	#[test]
	fn json_value_falls_back_gracefully() {
		assert_eq!(envelope("").json_value(), Value::Null);
		assert_eq!(envelope("[1,2]").json_value(), serde_json::json!([1, 2]));
		assert_eq!(envelope("not json").json_value(), Value::String("not json".into()));
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn capture_headers_keeps_opaque_values() {
		use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

		let mut headers = HeaderMap::new();

		headers.insert(HeaderName::from_static("x-plain"), HeaderValue::from_static("ok"));
		headers.insert(
			HeaderName::from_static("x-binary"),
			HeaderValue::from_bytes(b"caf\xE9").expect("Opaque header bytes should be accepted."),
		);

		let captured = capture_headers(&headers);

		assert!(captured.contains(&("x-plain".into(), "ok".into())));
		// Non-UTF-8 bytes survive lossily instead of vanishing from the envelope.
		assert!(
			captured
				.iter()
				.any(|(name, value)| name == "x-binary" && value.starts_with("caf"))
		);
	}

	#[test]
	fn error_message_defaults_to_unknown() {
		assert_eq!(envelope("{\"error\":\"not found\"}").error_message(), "not found");
		assert_eq!(envelope("{\"detail\":\"x\"}").error_message(), "unknown");
		assert_eq!(envelope("").error_message(), "unknown");
	}
}
