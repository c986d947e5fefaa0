//! Gate-level error taxonomy shared across flows, stores, and transports.
//!
//! Two renderings exist for every failure: the library surface keeps the full
//! distinction (so callers and logs can tell a replayed state from an unknown
//! one), while [`Error::to_response`] collapses onto a stable external code
//! with a generic message that leaks nothing about which case occurred.

// self
use crate::{_prelude::*, rate_limit::RetryDirective};

/// Gate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gate error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure; surfaced externally as `internal`.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem; surfaced externally as `internal`.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Identity provider unreachable, timed out, or rejected the request.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),

	/// Malformed, unknown, expired, or replayed request material.
	///
	/// The [`RejectReason`] is for internal logging only; the rendered message
	/// stays generic for every reason.
	#[error("The authorization request could not be processed.")]
	InvalidRequest {
		/// Internal distinction, never exposed to external clients.
		reason: RejectReason,
	},
	/// Caller exceeded the fixed-window budget for the operation.
	#[error("Too many requests for this operation; retry later.")]
	RateLimited(RetryDirective),
}
impl Error {
	/// Convenience constructor for invalid-request rejections.
	pub fn invalid_request(reason: RejectReason) -> Self {
		Self::InvalidRequest { reason }
	}

	/// Stable machine-readable code carried by every external response.
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidRequest { .. } => "invalid_request",
			Self::RateLimited(_) => "rate_limited",
			Self::Upstream(UpstreamError::Timeout { .. }) => "upstream_timeout",
			Self::Upstream(_) => "upstream_error",
			Self::Storage(_) | Self::Config(_) => "internal",
		}
	}

	/// Renders the external error shape: stable code, generic message, and a
	/// retry hint when one exists. Internal detail never crosses this boundary.
	pub fn to_response(&self) -> ErrorResponse {
		let message = match self {
			Self::InvalidRequest { .. } =>
				"The authorization request could not be processed.".into(),
			Self::RateLimited(_) => "Too many requests for this operation; retry later.".into(),
			Self::Upstream(UpstreamError::Timeout { .. }) =>
				"The identity provider did not respond in time.".into(),
			Self::Upstream(_) => "The identity provider rejected the request.".into(),
			Self::Storage(_) | Self::Config(_) => "An internal error occurred.".into(),
		};
		let retry_after = match self {
			Self::RateLimited(directive) => Some(directive.retry_after),
			Self::Upstream(UpstreamError::Rejected { retry_after, .. }) => *retry_after,
			_ => None,
		};

		ErrorResponse {
			code: self.code(),
			message,
			retry_after_secs: retry_after.map(|value| value.whole_seconds().max(0) as u64),
		}
	}
}

/// External error shape: stable code, generic human-readable message, retry hint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
	/// Stable error code (`invalid_request`, `rate_limited`, `upstream_timeout`,
	/// `upstream_error`, `internal`).
	pub code: &'static str,
	/// Generic human-readable message; never mentions internal state.
	pub message: String,
	/// Seconds the caller should wait before retrying, when applicable.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_after_secs: Option<u64>,
}

/// Internal classification of invalid requests, logged but never exposed.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RejectReason {
	/// Request payload failed validation before touching storage.
	#[error("Malformed input: {detail}.")]
	MalformedInput {
		/// Which field or constraint failed.
		detail: String,
	},
	/// No challenge document exists for the presented state.
	#[error("Unknown authorization state.")]
	UnknownState,
	/// The challenge document exists but its TTL has elapsed.
	#[error("Expired authorization state.")]
	ExpiredState,
	/// The challenge was already consumed; this is a replay.
	#[error("Replayed authorization state.")]
	ReplayedState,
	/// The redirect URI presented at exchange differs from the one recorded.
	#[error("Redirect URI mismatch at exchange.")]
	RedirectMismatch,
}
impl RejectReason {
	/// Stable label for span fields and log lines.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::MalformedInput { .. } => "malformed_input",
			Self::UnknownState => "unknown_state",
			Self::ExpiredState => "expired_state",
			Self::ReplayedState => "replayed_state",
			Self::RedirectMismatch => "redirect_mismatch",
		}
	}
}

/// Configuration and validation failures raised by the gate.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},

	/// A required environment variable is missing.
	#[error("Environment variable `{key}` is required but unset.")]
	MissingEnv {
		/// Variable name.
		key: &'static str,
	},
	/// An environment variable holds an unusable value.
	#[error("Environment variable `{key}` is invalid: {detail}.")]
	InvalidEnv {
		/// Variable name.
		key: &'static str,
		/// What made the value unusable.
		detail: String,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Upstream identity-provider failures, all terminal for this layer.
///
/// The gate never retries these itself: the authorization code is single-use,
/// so a blind retry of `exchange_code` would legitimately fail anyway. A caller
/// seeing [`UpstreamError::Timeout`] must start a fresh authorization attempt.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// The token endpoint did not answer within the configured deadline.
	#[error("Token endpoint did not respond within {limit} seconds.")]
	Timeout {
		/// Configured deadline in whole seconds.
		limit: i64,
	},
	/// The token endpoint answered with a non-2xx result.
	#[error("Token endpoint rejected the request: {message}.")]
	Rejected {
		/// Provider- or gate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Underlying HTTP client reported a network failure (DNS, TCP, TLS).
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// The token endpoint responded with JSON the gate could not parse.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl UpstreamError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for UpstreamError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
