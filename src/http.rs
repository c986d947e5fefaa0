//! Transport primitives for upstream token endpoint calls.
//!
//! The module exposes [`TokenHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can integrate custom HTTP
//! clients without losing the gate's error classification. Implementations call
//! [`ResponseMetadataSlot::take`] before dispatching a request and
//! [`ResponseMetadataSlot::store`] once an HTTP status or retry hint is known.
//!
//! The deadline discipline lives here: [`ReqwestHttpClient::with_timeout`]
//! bakes the configured hard deadline into the underlying client, so every
//! upstream call inherits it without per-call plumbing.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::{
	header::{HeaderMap, RETRY_AFTER},
	redirect,
};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Abstraction over HTTP transports capable of executing token endpoint calls
/// while publishing response metadata for error classification.
///
/// The trait is the gate's only dependency on an HTTP stack. Callers provide an
/// implementation and the gate requests short-lived [`AsyncHttpClient`] handles
/// that each carry a clone of a [`ResponseMetadataSlot`]. Implementations must
/// be `Send + Sync + 'static` so they can be shared across gate instances, and
/// the handles they return must own whatever state is required so their request
/// futures remain `Send` for the lifetime of the in-flight operation.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across attempts.
	/// - Once an HTTP response (successful or erroneous) provides status headers, save them with
	///   [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;

	/// Hard per-call deadline enforced by the transport, in whole seconds.
	///
	/// Used to label timeout errors; the transport itself is responsible for
	/// actually enforcing the deadline.
	fn timeout_secs(&self) -> i64;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// The gate creates a fresh slot for each token request and reads the captured
/// metadata immediately after `oauth2` resolves. Transport implementations
/// borrow the slot just long enough to call [`store`](ResponseMetadataSlot::store).
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Reqwest-backed transport with the gate's deadline discipline built in.
///
/// Token requests never follow redirects, matching OAuth 2.0 guidance that
/// token endpoints return results directly instead of delegating to another
/// URI. [`with_timeout`](Self::with_timeout) is the supported constructor; a
/// caller supplying its own [`ReqwestClient`] via
/// [`with_client`](Self::with_client) must configure the same timeout and
/// redirect policy itself.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	timeout: Duration,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a transport enforcing `timeout` on every call, redirects disabled.
	pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
		let timeout = timeout.max(Duration::seconds(1));
		let client = ReqwestClient::builder()
			.timeout(std::time::Duration::from_secs(timeout.whole_seconds() as u64))
			.redirect(redirect::Policy::none())
			.build()?;

		Ok(Self { client, timeout })
	}

	/// Wraps an existing [`ReqwestClient`] that already enforces `timeout`.
	pub fn with_client(client: ReqwestClient, timeout: Duration) -> Self {
		Self { client, timeout }
	}

	/// Underlying reqwest client.
	pub fn as_client(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle::new(self.client.clone(), slot)
	}

	fn timeout_secs(&self) -> i64 {
		self.timeout.whole_seconds()
	}
}

/// Handle returned by [`ReqwestHttpClient`] that satisfies [`TokenHttpClient::Handle`].
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<HandleInner>);
#[cfg(feature = "reqwest")]
struct HandleInner {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(HandleInner { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			inner.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;

	#[test]
	fn metadata_slot_take_consumes() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: Some(Duration::seconds(7)) });

		let meta = slot.take().expect("Stored metadata should be returned.");

		assert_eq!(meta.status, Some(429));
		assert_eq!(meta.retry_after, Some(Duration::seconds(7)));
		assert!(slot.take().is_none());
	}

	#[test]
	fn retry_after_parses_seconds_and_http_dates() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "120".parse().expect("Failed to build header value."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(120)));

		let future = OffsetDateTime::now_utc() + Duration::minutes(5);

		headers.insert(
			RETRY_AFTER,
			future
				.format(&Rfc2822)
				.expect("Failed to format RFC 2822 date.")
				.parse()
				.expect("Failed to build header value."),
		);

		let parsed = parse_retry_after(&headers).expect("HTTP-date Retry-After should parse.");

		assert!(parsed > Duration::minutes(4));
		assert!(parsed <= Duration::minutes(5));
	}

	#[test]
	fn with_timeout_clamps_to_at_least_one_second() {
		let client = ReqwestHttpClient::with_timeout(Duration::ZERO)
			.expect("Client construction should succeed.");

		assert_eq!(client.timeout_secs(), 1);
	}
}
