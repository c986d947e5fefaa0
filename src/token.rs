//! Transient token results and the redacting secret wrapper.
//!
//! Token grants pass straight through to the caller; this subsystem never
//! persists them. Refresh-token persistence, if any, belongs to the excluded
//! user-account layer.

// self
use crate::_prelude::*;

/// Redacted secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Tokens returned by a successful exchange or refresh.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<Secret>,
	/// Instant the gate observed the provider response.
	pub obtained_at: OffsetDateTime,
	/// Provider-declared lifetime of the access token.
	pub expires_in: Duration,
	/// Space-delimited scope string, when the provider returned one.
	pub scope: Option<String>,
}
impl TokenGrant {
	/// Absolute expiry instant derived from `obtained_at + expires_in`.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.obtained_at + self.expires_in
	}

	/// Returns `true` once the access token has outlived its declared lifetime.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at()
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("obtained_at", &self.obtained_at)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = Secret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "Secret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn grant_debug_never_prints_tokens() {
		let grant = TokenGrant {
			access_token: Secret::new("access-123"),
			refresh_token: Some(Secret::new("refresh-456")),
			obtained_at: OffsetDateTime::now_utc(),
			expires_in: Duration::seconds(3600),
			scope: Some("openid profile".into()),
		};
		let rendered = format!("{grant:?}");

		assert!(!rendered.contains("access-123"));
		assert!(!rendered.contains("refresh-456"));
	}

	#[test]
	fn grant_expiry_tracks_obtained_at() {
		let obtained_at = OffsetDateTime::now_utc();
		let grant = TokenGrant {
			access_token: Secret::new("access"),
			refresh_token: None,
			obtained_at,
			expires_in: Duration::seconds(60),
			scope: None,
		};

		assert!(!grant.is_expired_at(obtained_at + Duration::seconds(59)));
		assert!(grant.is_expired_at(obtained_at + Duration::seconds(60)));
	}
}
