// crates.io
use httpmock::prelude::*;
// self
use backend_relay::{
	_preludet::*,
	client::ReqwestBackendClient,
	config::ClientConfig,
	error::{ConfigError, TransportError},
	request::CallOptions,
	serde_json::json,
};

fn build_client(server: &MockServer) -> ReqwestBackendClient {
	build_reqwest_test_client(&server.base_url())
}

async fn mock_token_endpoint(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/oauth2/token").json_body(json!({
				"grant_type": "client_credentials",
				"client_id": TEST_API_KEY,
				"client_secret": TEST_API_SECRET,
			}));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "call-token",
				"token_type": "Bearer",
				"expires_in": 1800,
			}));
		})
		.await
}

#[tokio::test]
async fn get_resolves_accepted_json_bodies() {
	let server = MockServer::start_async().await;
	let client = build_client(&server);

	mock_token_endpoint(&server).await;

	let backend = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/movies").header("authorization", "Bearer call-token");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!([{"id": 1}, {"id": 2}]));
		})
		.await;
	let body = client.get("/api/movies").await.expect("Accepted GET should resolve.");

	assert_eq!(body, json!([{"id": 1}, {"id": 2}]));

	backend.assert_async().await;
}

#[tokio::test]
async fn rejected_status_maps_to_backend_error() {
	let server = MockServer::start_async().await;
	let client = build_client(&server);

	mock_token_endpoint(&server).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/movies/42");
			then.status(404)
				.header("content-type", "application/json")
				.json_body(json!({"error": "not found"}));
		})
		.await;

	let err = client.get("/api/movies/42").await.expect_err("404 should surface as an error.");

	assert!(matches!(
		err,
		Error::Backend { status: 404, ref message } if message == "not found",
	));
}

#[tokio::test]
async fn rejected_status_without_error_field_defaults_to_unknown() {
	let server = MockServer::start_async().await;
	let client = build_client(&server);

	mock_token_endpoint(&server).await;

	server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/movies/42");
			then.status(503).body("service unavailable");
		})
		.await;

	let err = client.delete("/api/movies/42").await.expect_err("503 should surface as an error.");

	assert!(matches!(
		err,
		Error::Backend { status: 503, ref message } if message == "unknown",
	));
}

#[tokio::test]
async fn post_sends_body_and_query() {
	let server = MockServer::start_async().await;
	let client = build_client(&server);

	mock_token_endpoint(&server).await;

	let backend = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/movies")
				.query_param("notify", "true")
				.header("authorization", "Bearer call-token")
				.json_body(json!({"title": "Metropolis"}));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"id": 7, "title": "Metropolis"}));
		})
		.await;
	let body = client
		.post(
			CallOptions::new("/api/movies")
				.json(json!({"title": "Metropolis"}))
				.query_param("notify", "true"),
		)
		.await
		.expect("POST with body should resolve.");

	assert_eq!(body["id"], json!(7));

	backend.assert_async().await;
}

#[tokio::test]
async fn post_without_body_fails_before_any_network_activity() {
	let server = MockServer::start_async().await;
	let client = build_client(&server);
	let token = mock_token_endpoint(&server).await;
	let err = client.post("/api/movies").await.expect_err("Bodyless POST should be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::MissingBody { method: "POST" })));

	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn transport_failure_is_distinct_from_backend_rejection() {
	let server = MockServer::start_async().await;
	let client = build_client(&server);

	mock_token_endpoint(&server).await;

	// Absolute URIs pass through resolution, so the call goes to a dead port while
	// issuance still succeeds against the mock server.
	let err = client
		.post(CallOptions::new("http://127.0.0.1:9/api/movies").json(json!({"title": "x"})))
		.await
		.expect_err("Connection refused should surface as an error.");

	assert!(matches!(err, Error::Transport(_)));
	assert_eq!(err.status_code(), Some(500));
}

#[tokio::test]
async fn unrepresentable_timeout_fails_the_send() {
	let server = MockServer::start_async().await;
	let client = build_client(&server);

	mock_token_endpoint(&server).await;

	let backend = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/movies");
			then.status(200).header("content-type", "application/json").json_body(json!([]));
		})
		.await;
	// A negative per-call timeout cannot reach the socket layer; the send fails
	// instead of being coerced to some default.
	let err = client
		.get(CallOptions::new("/api/movies").timeout(Duration::seconds(-1)))
		.await
		.expect_err("Negative timeout should fail the send.");

	assert!(matches!(err, Error::Transport(TransportError::Request { .. })));

	backend.assert_calls_async(0).await;
}

#[tokio::test]
async fn widened_accepted_statuses_resolve() {
	let server = MockServer::start_async().await;
	let config = ClientConfig::builder(
		Url::parse(&server.base_url()).expect("Mock base URL should parse."),
		TEST_API_KEY,
		TEST_API_SECRET,
	)
	.accept_status(201)
	.build()
	.expect("Widened config should build.");
	let client = test_client_with_config(config);

	mock_token_endpoint(&server).await;

	server
		.mock_async(|when, then| {
			when.method(PUT).path("/api/movies/7");
			then.status(201)
				.header("content-type", "application/json")
				.json_body(json!({"updated": true}));
		})
		.await;

	let body = client
		.put(CallOptions::new("/api/movies/7").json(json!({"title": "y"})))
		.await
		.expect("201 should resolve once accepted.");

	assert_eq!(body, json!({"updated": true}));
}
