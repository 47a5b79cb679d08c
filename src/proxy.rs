//! Proxy forwarder relaying inbound framework requests to the backend.
//!
//! The forwarder sits between a web framework and the backend: it authenticates the
//! hop with the client's cached bearer token, rebuilds structured requests through the
//! request builder, and falls back to a raw byte tunnel for body encodings the builder
//! cannot faithfully reconstruct (multipart form data by default). Whatever happens,
//! the inbound request is answered: every branch, including contract violations and
//! transport failures, ends in a sink write.

// crates.io
use bytes::Bytes;
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	client::Client,
	http::{HttpTransport, ResponseEnvelope},
	obs::{self, OpKind, OpOutcome, OpSpan},
	request::{Body, CallOptions, ForwardedParts, Method, RawByteStream},
};

/// Raw inbound body handed to tunnel mode.
pub enum RawBody {
	/// Body already buffered by the framework.
	Buffered(Bytes),
	/// Unbuffered byte stream; keeps memory bounded for large uploads.
	Stream(RawByteStream),
}
impl Debug for RawBody {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
			Self::Stream(_) => f.write_str("Stream(..)"),
		}
	}
}
impl From<RawBody> for Body {
	fn from(body: RawBody) -> Self {
		match body {
			RawBody::Buffered(bytes) => Self::Raw(bytes),
			RawBody::Stream(stream) => Self::Stream(stream),
		}
	}
}

/// Inbound request seam implemented by web-framework adapters.
///
/// Header lookups must be case-insensitive. [`take_raw_body`](Self::take_raw_body) is
/// called at most once, and only when the forward runs in tunnel mode; structured mode
/// relies on [`json_body`](Self::json_body) instead.
pub trait InboundRequest
where
	Self: Send,
{
	/// Wire method label (`GET`, `POST`, ...).
	fn method(&self) -> &str;

	/// Full original path including the query string.
	fn original_path(&self) -> &str;

	/// Parsed query parameters.
	fn query(&self) -> &BTreeMap<String, String>;

	/// Parsed JSON body, when the framework decoded one.
	fn json_body(&self) -> Option<&Value>;

	/// Case-insensitive header accessor.
	fn header(&self, name: &str) -> Option<&str>;

	/// All inbound headers; tunnel mode relays these verbatim.
	fn headers(&self) -> BTreeMap<String, String>;

	/// Originating client IP, relayed as `x-forwarded-user-ip`.
	fn user_ip(&self) -> Option<&str>;

	/// Inbound content type.
	fn content_type(&self) -> Option<&str> {
		self.header("Content-Type")
	}

	/// Inbound user agent.
	fn user_agent(&self) -> Option<&str> {
		self.header("User-Agent")
	}

	/// Takes ownership of the raw request body.
	fn take_raw_body(&mut self) -> RawBody;
}

/// Outbound response seam implemented by web-framework adapters.
///
/// Headers and status may be set in any order before the single body write; a body
/// write completes the response.
pub trait ResponseSink
where
	Self: Send,
{
	/// Sets the outbound status code.
	fn set_status(&mut self, status: u16);

	/// Sets one outbound header; repeated names append rather than replace.
	fn insert_header(&mut self, name: &str, value: &str);

	/// Writes a JSON body, completing the response.
	fn write_json(&mut self, body: Value);

	/// Writes a raw body without further interpretation, completing the response.
	fn write_raw(&mut self, body: Bytes);
}

/// Configurable content-type predicate selecting tunnel mode.
///
/// The default routes any `multipart/*` payload through the tunnel; callers can widen
/// the predicate (e.g. to `application/octet-stream`) without touching the forwarder.
#[derive(Clone)]
pub struct TunnelPredicate(Arc<dyn Fn(&str) -> bool + Send + Sync>);
impl TunnelPredicate {
	/// Wraps a caller-supplied predicate over the inbound content type.
	pub fn new(predicate: impl 'static + Fn(&str) -> bool + Send + Sync) -> Self {
		Self(Arc::new(predicate))
	}

	/// Evaluates the predicate; absent content types never tunnel.
	pub fn matches(&self, content_type: Option<&str>) -> bool {
		content_type.is_some_and(|value| (self.0)(value))
	}
}
impl Default for TunnelPredicate {
	fn default() -> Self {
		Self::new(|content_type| {
			content_type.trim_start().to_ascii_lowercase().starts_with("multipart/")
		})
	}
}
impl Debug for TunnelPredicate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TunnelPredicate(..)")
	}
}

/// Last-mile mutation hook invoked after header passthrough, before the body write.
pub type BeforeSendHook = Box<dyn FnOnce(&mut dyn ResponseSink) + Send>;

/// Per-forward options.
#[derive(Default)]
pub struct ForwardOptions {
	/// Predicate selecting tunnel mode from the inbound content type.
	pub tunnel: TunnelPredicate,
	/// Optional pre-send hook for structured mode.
	pub before_send: Option<BeforeSendHook>,
}
impl ForwardOptions {
	/// Replaces the tunnel predicate.
	pub fn tunnel(mut self, predicate: TunnelPredicate) -> Self {
		self.tunnel = predicate;

		self
	}

	/// Attaches a pre-send hook.
	pub fn before_send(mut self, hook: impl 'static + FnOnce(&mut dyn ResponseSink) + Send) -> Self {
		self.before_send = Some(Box::new(hook));

		self
	}
}
impl Debug for ForwardOptions {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ForwardOptions")
			.field("tunnel", &self.tunnel)
			.field("before_send_set", &self.before_send.is_some())
			.finish()
	}
}

impl<C> Client<C>
where
	C: ?Sized + HttpTransport,
{
	/// Relays one inbound request to the backend and answers through the sink.
	///
	/// Methods outside GET/POST/PUT/DELETE are rejected before any network activity.
	/// On any failure the sink still receives a well-formed `{"error": ..}` answer with
	/// the error's effective status, and the error is returned for logging.
	pub async fn forward<R, S>(
		&self,
		mut inbound: R,
		sink: &mut S,
		options: ForwardOptions,
	) -> Result<()>
	where
		R: InboundRequest,
		S: ResponseSink,
	{
		let span = OpSpan::new(OpKind::Forward, "forward");

		obs::record_op_outcome(OpKind::Forward, OpOutcome::Attempt);

		let result = span.instrument(self.forward_inner(&mut inbound, sink, options)).await;

		match &result {
			Ok(()) => obs::record_op_outcome(OpKind::Forward, OpOutcome::Success),
			Err(err) => {
				obs::record_op_outcome(OpKind::Forward, OpOutcome::Failure);

				// The inbound request must never go unanswered.
				sink.set_status(err.status_code().unwrap_or(500));
				sink.write_json(json!({ "error": err.to_string() }));
			},
		}

		result
	}

	async fn forward_inner<R, S>(
		&self,
		inbound: &mut R,
		sink: &mut S,
		options: ForwardOptions,
	) -> Result<()>
	where
		R: InboundRequest,
		S: ResponseSink,
	{
		let method = Method::try_from(inbound.method())?;

		if options.tunnel.matches(inbound.content_type()) {
			self.forward_tunnel(inbound, sink, method).await
		} else {
			self.forward_structured(inbound, sink, method, options.before_send).await
		}
	}

	/// Tunnel mode: flow the inbound bytes and headers through untouched, overriding
	/// only `Authorization`, `x-forwarded-*`, and `Content-Type`.
	async fn forward_tunnel<R, S>(&self, inbound: &mut R, sink: &mut S, method: Method) -> Result<()>
	where
		R: InboundRequest,
		S: ResponseSink,
	{
		let credential = self.ensure_token().await?;
		let forwarded = forwarded_parts(inbound);
		let mut call = CallOptions::new(inbound.original_path())
			.body(inbound.take_raw_body().into())
			.follow_redirects(false);

		call.headers = inbound.headers();
		// Hop-scoped framing headers must not survive the relay (the transport
		// recomputes them), and the builder owns `Authorization`, `Content-Type`,
		// and the `x-forwarded-*` family, so every inbound spelling of those goes
		// too; otherwise a spoofed casing would ride alongside the computed value.
		call.headers.retain(|name, _| {
			!name.eq_ignore_ascii_case("host")
				&& !name.eq_ignore_ascii_case("content-length")
				&& !name.eq_ignore_ascii_case("content-type")
				&& !name.eq_ignore_ascii_case("authorization")
				&& !name.to_ascii_lowercase().starts_with("x-forwarded-")
		});

		let envelope = self.send_with(method, call, Some(&credential), Some(&forwarded)).await?;

		// No JSON parsing in tunnel mode; the backend's bytes flow back verbatim.
		relay_headers(sink, &envelope);
		sink.set_status(envelope.status);
		sink.write_raw(envelope.body);

		Ok(())
	}

	/// Structured mode: rebuild the request through the builder and relay the decoded
	/// answer, passing every backend header through.
	async fn forward_structured<R, S>(
		&self,
		inbound: &mut R,
		sink: &mut S,
		method: Method,
		before_send: Option<BeforeSendHook>,
	) -> Result<()>
	where
		R: InboundRequest,
		S: ResponseSink,
	{
		let credential = self.ensure_token().await?;
		let forwarded = forwarded_parts(inbound);
		// The parsed query map is forwarded separately, so only the path component of
		// the original path goes into the URI; parameters are never sent twice.
		let path = inbound.original_path().split('?').next().unwrap_or_default();
		let mut call = CallOptions::new(path).follow_redirects(false);

		call.query = inbound.query().clone();

		if method.requires_body() {
			call.body = inbound.json_body().cloned().map(Body::Json).unwrap_or_default();
		}

		let envelope = self.send_with(method, call, Some(&credential), Some(&forwarded)).await?;

		// Mandatory passthrough: Location, cookies, and caching headers survive the
		// hop; 301/302 are not followed here, the calling browser handles them.
		relay_headers(sink, &envelope);

		if let Some(hook) = before_send {
			hook(sink);
		}

		sink.set_status(envelope.status);
		sink.write_json(envelope.json_value());

		Ok(())
	}
}

fn forwarded_parts(inbound: &impl InboundRequest) -> ForwardedParts {
	ForwardedParts {
		user_ip: inbound.user_ip().map(str::to_owned),
		user_agent: inbound.user_agent().map(str::to_owned),
		content_type: inbound.content_type().map(str::to_owned),
	}
}

fn relay_headers(sink: &mut impl ResponseSink, envelope: &ResponseEnvelope) {
	for (name, value) in &envelope.headers {
		sink.insert_header(name, value);
	}
}
