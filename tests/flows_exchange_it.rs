#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_gate::{
	_preludet::*,
	error::UpstreamError,
	flows::{AuthorizationRequest, ExchangeRequest},
	http::ReqwestHttpClient,
	ident::ClientKey,
	rate_limit::{Operation, RatePolicy},
	reqwest,
};

const CLIENT_ID: &str = "client-it";
const CLIENT_SECRET: &str = "secret-it";

fn redirect_uri() -> Url {
	Url::parse("https://app.example.com/callback")
		.expect("Redirect URI should parse successfully.")
}

fn caller() -> ClientKey {
	ClientKey::new("203.0.113.7").expect("Client key should be valid for exchange tests.")
}

async fn start(broker: &ReqwestTestBroker) -> oauth2_gate::flows::AuthorizationStart {
	broker
		.start_authorization(AuthorizationRequest {
			redirect_uri: redirect_uri(),
			owner_hint: None,
		})
		.await
		.expect("Authorization start should succeed.")
}

#[tokio::test]
async fn start_authorization_and_exchange_return_tokens() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.base_url());
	let (broker, _store) = build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET);
	let started = start(&broker).await;

	assert_eq!(started.state.len(), 32);

	let authorize_pairs: HashMap<_, _> =
		started.authorize_url.query_pairs().into_owned().collect();

	assert_eq!(authorize_pairs.get("response_type"), Some(&"code".into()));
	assert_eq!(authorize_pairs.get("client_id"), Some(&CLIENT_ID.into()));
	assert_eq!(authorize_pairs.get("redirect_uri"), Some(&redirect_uri().as_str().into()));
	assert_eq!(authorize_pairs.get("state"), Some(&started.state.to_string()));
	assert!(authorize_pairs.contains_key("code_challenge"));
	assert_eq!(authorize_pairs.get("code_challenge_method"), Some(&"S256".into()));

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("grant_type=authorization_code")
				.body_includes("code_verifier=");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"tok\",\"refresh_token\":\"refresh-tok\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let grant = broker
		.exchange_code(ExchangeRequest {
			state: started.state,
			code: "valid-code".into(),
			redirect_uri: redirect_uri(),
			caller: caller(),
		})
		.await
		.expect("Authorization code exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(grant.access_token.expose(), "tok");
	assert_eq!(grant.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-tok"));
	assert_eq!(grant.expires_in, Duration::seconds(3600));
	assert!(grant.expires_at() > grant.obtained_at);
}

#[tokio::test]
async fn replayed_state_renders_the_generic_invalid_request() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.base_url());
	let (broker, _store) = build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET);
	let started = start(&broker).await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"tok\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let request = ExchangeRequest {
		state: started.state,
		code: "valid-code".into(),
		redirect_uri: redirect_uri(),
		caller: caller(),
	};

	broker.exchange_code(request.clone()).await.expect("First exchange should succeed.");

	mock.assert_async().await;

	let err = broker
		.exchange_code(request)
		.await
		.expect_err("A second exchange for the same state must fail.");
	let response = err.to_response();

	assert_eq!(response.code, "invalid_request");
	assert!(!response.message.contains("replay"));
}

#[tokio::test]
async fn unknown_state_is_indistinguishable_from_a_replay() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.base_url());
	let (broker, _store) = build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET);
	let err = broker
		.exchange_code(ExchangeRequest {
			state: oauth2_gate::ident::StateToken::new("never-issued-state-token")
				.expect("State fixture should be valid."),
			code: "whatever".into(),
			redirect_uri: redirect_uri(),
			caller: caller(),
		})
		.await
		.expect_err("Unknown state must fail.");

	assert_eq!(err.to_response().code, "invalid_request");
}

#[tokio::test]
async fn redirect_mismatch_burns_the_challenge() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.base_url());
	let (broker, _store) = build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET);
	let started = start(&broker).await;
	let wrong_redirect = Url::parse("https://evil.example.com/callback")
		.expect("Redirect URI should parse successfully.");
	let err = broker
		.exchange_code(ExchangeRequest {
			state: started.state.clone(),
			code: "valid-code".into(),
			redirect_uri: wrong_redirect,
			caller: caller(),
		})
		.await
		.expect_err("A mismatched redirect URI must fail.");

	assert_eq!(err.to_response().code, "invalid_request");

	// The mismatch was detected after consumption, so the challenge is spent
	// and a retry with the correct redirect fails too.
	let err = broker
		.exchange_code(ExchangeRequest {
			state: started.state,
			code: "valid-code".into(),
			redirect_uri: redirect_uri(),
			caller: caller(),
		})
		.await
		.expect_err("The consumed challenge must reject the retry.");

	assert_eq!(err.to_response().code, "invalid_request");
}

#[tokio::test]
async fn denied_callers_never_burn_their_challenge() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.base_url());
	let (broker, _store) = build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET);
	let broker =
		broker.with_policy(Operation::OauthExchange, RatePolicy::new(1, Duration::minutes(10)));
	let first = start(&broker).await;
	let second = start(&broker).await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"tok\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;

	broker
		.exchange_code(ExchangeRequest {
			state: first.state,
			code: "valid-code".into(),
			redirect_uri: redirect_uri(),
			caller: caller(),
		})
		.await
		.expect("The first exchange should succeed within the budget.");

	let err = broker
		.exchange_code(ExchangeRequest {
			state: second.state.clone(),
			code: "valid-code".into(),
			redirect_uri: redirect_uri(),
			caller: caller(),
		})
		.await
		.expect_err("The second exchange must be rate limited.");
	let response = err.to_response();

	assert_eq!(response.code, "rate_limited");
	assert!(response.retry_after_secs.is_some_and(|secs| secs <= 600));
	// Only the first exchange reached the provider; the denial fired before
	// the second challenge was consumed.
	mock.assert_calls_async(1).await;

	// A different caller still has budget, proving the challenge survived.
	let other = ClientKey::new("198.51.100.4").expect("Client key should be valid.");

	broker
		.exchange_code(ExchangeRequest {
			state: second.state,
			code: "valid-code".into(),
			redirect_uri: redirect_uri(),
			caller: other,
		})
		.await
		.expect("The unconsumed challenge should still exchange for another caller.");
}

#[tokio::test]
async fn upstream_rejection_maps_to_upstream_error() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.base_url());
	let (broker, _store) = build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET);
	let started = start(&broker).await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"already used\"}");
		})
		.await;
	let err = broker
		.exchange_code(ExchangeRequest {
			state: started.state,
			code: "stale-code".into(),
			redirect_uri: redirect_uri(),
			caller: caller(),
		})
		.await
		.expect_err("Provider rejections must surface as upstream errors.");

	mock.assert_async().await;

	assert!(matches!(err, Error::Upstream(UpstreamError::Rejected { .. })));
	assert_eq!(err.to_response().code, "upstream_error");
}

#[tokio::test]
async fn slow_providers_hit_the_hard_deadline() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.base_url());
	let (broker, _store) = build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET);
	// Tighten the deadline to one second so the test stays fast.
	let http_client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.timeout(std::time::Duration::from_secs(1))
		.redirect(reqwest::redirect::Policy::none())
		.build()
		.expect("Failed to build the tight-deadline client.");
	let broker = ReqwestTestBroker {
		http_client: Arc::new(ReqwestHttpClient::with_client(http_client, Duration::seconds(1))),
		..broker
	};
	let started = start(&broker).await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"tok\",\"token_type\":\"bearer\",\"expires_in\":3600}")
				.delay(std::time::Duration::from_secs(3));
		})
		.await;
	let begun = std::time::Instant::now();
	let err = broker
		.exchange_code(ExchangeRequest {
			state: started.state,
			code: "slow-code".into(),
			redirect_uri: redirect_uri(),
			caller: caller(),
		})
		.await
		.expect_err("A slow provider must trip the deadline.");

	assert!(matches!(err, Error::Upstream(UpstreamError::Timeout { limit: 1 })));
	assert_eq!(err.to_response().code, "upstream_timeout");
	// The call returned near the deadline, long before the mock's delay.
	assert!(begun.elapsed() < std::time::Duration::from_secs(3));
}
