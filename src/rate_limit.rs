//! Fixed-window rate limiting backed by per-document atomic counters.
//!
//! One usage document exists per `(operation, identifier, bucket)` triple;
//! the bucket index is `floor(now_unix / window_secs)` computed from
//! server-observed time at the moment of the transaction, so concurrent
//! instances with skewed clients still agree on buckets. The create-or-
//! increment decision and the limit check happen inside one store
//! transaction; two separate read-then-write steps would let concurrent
//! callers both observe `count < limit` and silently exceed the budget.

// self
use crate::{
	_prelude::*,
	ident::ClientKey,
	obs,
	store::{GateStore, IncrementOutcome},
};

/// Operations with independent bucket families and budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
	/// Authorization-code exchange at the gate.
	OauthExchange,
	/// Token refresh at the gate; deliberately distinct from exchange so the
	/// two quotas never cross-contaminate.
	OauthRefresh,
	/// Outbound verification-code email issuance (same limiter pattern, owned
	/// by the excluded email subsystem).
	EmailVerifySend,
}
impl Operation {
	/// Returns a stable label suitable for document keys and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::OauthExchange => "oauth_exchange",
			Operation::OauthRefresh => "oauth_refresh",
			Operation::EmailVerifySend => "email_verify_send",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Budget for one operation: at most `limit` requests per `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
	/// Maximum permitted requests per window.
	pub limit: u32,
	/// Fixed window length; clamped to at least one second.
	pub window: Duration,
}
impl RatePolicy {
	/// Creates a policy, clamping degenerate windows to one second.
	pub fn new(limit: u32, window: Duration) -> Self {
		Self { limit, window: window.max(Duration::seconds(1)) }
	}
}

/// Per-operation policy table with overridable defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyTable(HashMap<Operation, RatePolicy>);
impl PolicyTable {
	/// Replaces the policy for one operation.
	pub fn with_policy(mut self, operation: Operation, policy: RatePolicy) -> Self {
		self.0.insert(operation, policy);

		self
	}

	/// Returns the policy configured for the operation.
	pub fn policy(&self, operation: Operation) -> RatePolicy {
		self.0.get(&operation).copied().unwrap_or_else(|| default_policy(operation))
	}
}
impl Default for PolicyTable {
	fn default() -> Self {
		Self(HashMap::from_iter(
			[Operation::OauthExchange, Operation::OauthRefresh, Operation::EmailVerifySend]
				.map(|operation| (operation, default_policy(operation))),
		))
	}
}

fn default_policy(operation: Operation) -> RatePolicy {
	match operation {
		Operation::OauthExchange => RatePolicy::new(10, Duration::minutes(10)),
		Operation::OauthRefresh => RatePolicy::new(30, Duration::minutes(10)),
		Operation::EmailVerifySend => RatePolicy::new(3, Duration::hours(1)),
	}
}

/// Document key for one usage counter: `(operation, identifier, bucket)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageKey {
	/// Operation owning the bucket family.
	pub operation: Operation,
	/// Caller identifier the budget applies to.
	pub client: ClientKey,
	/// Fixed-window bucket index, `floor(unix_seconds / window_secs)`.
	pub bucket: i64,
}
impl UsageKey {
	/// Computes the key for the bucket containing `now`.
	pub fn at(operation: Operation, client: ClientKey, window: Duration, now: OffsetDateTime) -> Self {
		let window_secs = window.whole_seconds().max(1);
		let bucket = now.unix_timestamp().div_euclid(window_secs);

		Self { operation, client, bucket }
	}

	/// Start instant of the key's window.
	pub fn window_start(&self, window: Duration) -> OffsetDateTime {
		instant_at(self.bucket, window)
	}

	/// End instant of the key's window (also the document's expiry).
	pub fn window_end(&self, window: Duration) -> OffsetDateTime {
		instant_at(self.bucket + 1, window)
	}
}
impl Display for UsageKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}:{}", self.operation, self.client, self.bucket)
	}
}

fn instant_at(bucket: i64, window: Duration) -> OffsetDateTime {
	let window_secs = window.whole_seconds().max(1);

	OffsetDateTime::from_unix_timestamp(bucket.saturating_mul(window_secs))
		.unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Usage counter document contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
	/// Requests counted in the window so far.
	pub count: u32,
	/// Window start instant.
	pub window_start: OffsetDateTime,
	/// Window end instant; the document's TTL expiry.
	pub expires_at: OffsetDateTime,
	/// Instant of the most recent counted request.
	pub last_request_at: OffsetDateTime,
}
impl UsageRecord {
	/// Opens a fresh counter at `count = 1` for the window bounds.
	pub fn open(window_start: OffsetDateTime, expires_at: OffsetDateTime, now: OffsetDateTime) -> Self {
		Self { count: 1, window_start, expires_at, last_request_at: now }
	}
}

/// Result of a rate-limit check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
	/// The request may proceed; `remaining` is the budget left in the window.
	Allowed {
		/// Requests still permitted in the current window.
		remaining: u32,
	},
	/// The request is denied until the window rolls over.
	Denied(RetryDirective),
}

/// Advises callers when to retry after a denial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry (the current window's end).
	pub earliest_retry_at: OffsetDateTime,
	/// Deterministic hint: the seconds remaining in the current bucket.
	pub retry_after: Duration,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, retry_after: Duration) -> Self {
		Self { earliest_retry_at, retry_after: retry_after.max(Duration::ZERO) }
	}
}

/// Store-backed fixed-window limiter.
#[derive(Clone)]
pub struct RateLimiter {
	store: Arc<dyn GateStore>,
	policies: PolicyTable,
}
impl RateLimiter {
	/// Creates a limiter with the default policy table.
	pub fn new(store: Arc<dyn GateStore>) -> Self {
		Self { store, policies: PolicyTable::default() }
	}

	/// Replaces the policy for one operation.
	pub fn with_policy(mut self, operation: Operation, policy: RatePolicy) -> Self {
		self.policies = self.policies.with_policy(operation, policy);

		self
	}

	/// Returns the policy currently configured for the operation.
	pub fn policy(&self, operation: Operation) -> RatePolicy {
		self.policies.policy(operation)
	}

	/// Atomically tests-and-increments the caller's counter for `operation`.
	pub async fn check_and_increment(
		&self,
		operation: Operation,
		client: &ClientKey,
	) -> Result<Decision> {
		let policy = self.policies.policy(operation);
		let now = OffsetDateTime::now_utc();
		let key = UsageKey::at(operation, client.clone(), policy.window, now);
		let outcome = self.store.try_increment(&key, policy.limit, policy.window, now).await?;

		Ok(match outcome {
			IncrementOutcome::Allowed { count } =>
				Decision::Allowed { remaining: policy.limit.saturating_sub(count) },
			IncrementOutcome::Denied { .. } => {
				let window_end = key.window_end(policy.window);

				Decision::Denied(RetryDirective::new(window_end, window_end - now))
			},
		})
	}

	/// Gate helper: denial becomes [`Error::RateLimited`] with the retry hint.
	pub async fn require(&self, operation: Operation, client: &ClientKey) -> Result<()> {
		match self.check_and_increment(operation, client).await? {
			Decision::Allowed { .. } => Ok(()),
			Decision::Denied(directive) => {
				obs::record_rate_limited(operation, &directive);

				Err(Error::RateLimited(directive))
			},
		}
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter").field("policies", &self.policies).finish()
	}
}
