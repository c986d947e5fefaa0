//! PKCE challenge records and the single-use challenge store.
//!
//! One challenge document per in-flight authorization attempt, keyed by the
//! opaque `state` token. Creation hands back only the derived challenge; the
//! verifier stays server-side until the one consume transaction releases it.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::RejectReason,
	ident::{OwnerHint, StateToken},
	obs,
	store::{ConsumeOutcome, GateStore},
	token::Secret,
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// One in-flight authorization attempt, persisted as a single document.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChallengeRecord {
	/// Opaque state token; the document's primary key.
	pub state: StateToken,
	/// Secret verifier, released exactly once by the consume transaction.
	pub code_verifier: Secret,
	/// Challenge derived from the verifier, embedded in the authorize URL.
	pub code_challenge: String,
	/// Method used to derive the challenge.
	pub code_challenge_method: PkceCodeChallengeMethod,
	/// Redirect URI that must match at exchange time.
	pub redirect_uri: Url,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// TTL expiry instant; consume rejects the record from here on.
	pub expires_at: OffsetDateTime,
	/// Set exactly once by the consume transaction.
	pub consumed: bool,
	/// Optional requesting-session identifier, kept for audit.
	pub owner_hint: Option<OwnerHint>,
}
impl ChallengeRecord {
	/// Returns `true` once the record's TTL has elapsed at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
impl Debug for ChallengeRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ChallengeRecord")
			.field("state", &self.state)
			.field("code_verifier", &"<redacted>")
			.field("code_challenge", &self.code_challenge)
			.field("code_challenge_method", &self.code_challenge_method)
			.field("redirect_uri", &self.redirect_uri)
			.field("created_at", &self.created_at)
			.field("expires_at", &self.expires_at)
			.field("consumed", &self.consumed)
			.field("owner_hint", &self.owner_hint)
			.finish()
	}
}

/// Public material returned by [`ChallengeStore::create`]; never the verifier.
#[derive(Clone, Debug)]
pub struct ChallengeGrant {
	/// State token the client must round-trip through the redirect.
	pub state: StateToken,
	/// Challenge to embed in the authorization URL.
	pub code_challenge: String,
	/// Method to declare alongside the challenge.
	pub method: PkceCodeChallengeMethod,
}

/// Store-backed component that creates and single-use-consumes challenges.
#[derive(Clone)]
pub struct ChallengeStore {
	store: Arc<dyn GateStore>,
	ttl: Duration,
}
impl ChallengeStore {
	/// Default challenge TTL.
	pub const DEFAULT_TTL: Duration = Duration::minutes(10);

	/// Creates a challenge store over the provided document store.
	pub fn new(store: Arc<dyn GateStore>) -> Self {
		Self { store, ttl: Self::DEFAULT_TTL }
	}

	/// Overrides the challenge TTL (clamped to at least one second).
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl.max(Duration::seconds(1));

		self
	}

	/// Generates verifier + challenge and writes a fresh challenge document.
	pub async fn create(
		&self,
		redirect_uri: Url,
		owner_hint: Option<OwnerHint>,
	) -> Result<ChallengeGrant> {
		let record = build_record(redirect_uri, owner_hint, self.ttl, OffsetDateTime::now_utc());
		let grant = ChallengeGrant {
			state: record.state.clone(),
			code_challenge: record.code_challenge.clone(),
			method: record.code_challenge_method,
		};

		self.store.insert_challenge(record).await?;

		Ok(grant)
	}

	/// Consumes the challenge for `state`, releasing the full record.
	///
	/// Unknown, expired, and replayed states all surface as the same generic
	/// [`Error::InvalidRequest`]; the distinction is logged internally and
	/// preserved in the error's [`RejectReason`].
	pub async fn consume(&self, state: &StateToken) -> Result<ChallengeRecord> {
		let outcome = self.store.consume_challenge(state, OffsetDateTime::now_utc()).await?;
		let reason = match outcome {
			ConsumeOutcome::Consumed(record) => return Ok(record),
			ConsumeOutcome::Missing => RejectReason::UnknownState,
			ConsumeOutcome::Expired => RejectReason::ExpiredState,
			ConsumeOutcome::AlreadyConsumed => RejectReason::ReplayedState,
		};

		obs::record_reject("challenge_consume", &reason);

		Err(Error::invalid_request(reason))
	}
}
impl Debug for ChallengeStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ChallengeStore").field("ttl", &self.ttl).finish()
	}
}

fn build_record(
	redirect_uri: Url,
	owner_hint: Option<OwnerHint>,
	ttl: Duration,
	now: OffsetDateTime,
) -> ChallengeRecord {
	let verifier = random_string(PKCE_VERIFIER_LEN);
	let code_challenge = compute_pkce_challenge(&verifier);
	let state = StateToken::from_generated(random_string(STATE_LEN));

	ChallengeRecord {
		state,
		code_verifier: Secret::new(verifier),
		code_challenge,
		code_challenge_method: PkceCodeChallengeMethod::S256,
		redirect_uri,
		created_at: now,
		expires_at: now + ttl,
		consumed: false,
		owner_hint,
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

pub(crate) fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn redirect() -> Url {
		Url::parse("https://app.example.com/callback").expect("Redirect fixture should parse.")
	}

	#[test]
	fn challenge_matches_rfc7636_test_vector() {
		// Appendix B of RFC 7636.
		let challenge = compute_pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");

		assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
	}

	#[test]
	fn fresh_records_carry_ttl_and_unconsumed_flag() {
		let now = OffsetDateTime::now_utc();
		let record = build_record(redirect(), None, Duration::minutes(10), now);

		assert_eq!(record.state.len(), STATE_LEN);
		assert_eq!(record.code_verifier.expose().len(), PKCE_VERIFIER_LEN);
		assert_eq!(record.code_challenge, compute_pkce_challenge(record.code_verifier.expose()));
		assert_eq!(record.expires_at, now + Duration::minutes(10));
		assert!(!record.consumed);
		assert!(!record.is_expired_at(now));
		assert!(record.is_expired_at(record.expires_at));
	}

	#[test]
	fn record_debug_redacts_the_verifier() {
		let record =
			build_record(redirect(), None, Duration::minutes(10), OffsetDateTime::now_utc());
		let rendered = format!("{record:?}");

		assert!(!rendered.contains(record.code_verifier.expose()));
		assert!(rendered.contains("<redacted>"));
	}

	#[test]
	fn consecutive_records_never_share_state_or_verifier() {
		let now = OffsetDateTime::now_utc();
		let a = build_record(redirect(), None, Duration::minutes(10), now);
		let b = build_record(redirect(), None, Duration::minutes(10), now);

		assert_ne!(a.state, b.state);
		assert_ne!(a.code_verifier.expose(), b.code_verifier.expose());
	}
}
