//! Storage contract modeling the document database the gate runs against.
//!
//! The backing store only guarantees per-document atomicity: every operation
//! on this trait maps to one conditional transaction against one document,
//! and there are no ordering guarantees across documents. Implementations
//! MUST perform the read-check-write section of `consume_challenge` and
//! `try_increment` as a single serializable step; a plain read followed by a
//! separate write re-introduces the lost-update races the gate exists to
//! prevent.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, challenge::ChallengeRecord, ident::StateToken, rate_limit::UsageKey};

/// Boxed future returned by [`GateStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Document-store capability consumed by the challenge store, rate limiter,
/// and cleanup sweep.
pub trait GateStore
where
	Self: Send + Sync,
{
	/// Creates a challenge document; a duplicate state is a
	/// [`StoreError::Conflict`].
	fn insert_challenge(&self, record: ChallengeRecord) -> StoreFuture<'_, ()>;

	/// Atomically consumes the challenge keyed by `state`.
	///
	/// Inside one transaction: absent documents report
	/// [`ConsumeOutcome::Missing`], elapsed TTLs report
	/// [`ConsumeOutcome::Expired`] (expiry is checked before the consumed
	/// flag), replays report [`ConsumeOutcome::AlreadyConsumed`], and
	/// otherwise the flag is set and the record returned.
	fn consume_challenge<'a>(
		&'a self,
		state: &'a StateToken,
		now: OffsetDateTime,
	) -> StoreFuture<'a, ConsumeOutcome>;

	/// Atomically creates-or-increments the usage counter for `key`.
	///
	/// Create-if-absent with `count = 1`, or increment only while
	/// `count < limit`; the limit check and the write happen in the same
	/// transaction. `window` supplies the bucket length so fresh documents can
	/// record their own expiry instant. A zero limit denies without writing.
	fn try_increment<'a>(
		&'a self,
		key: &'a UsageKey,
		limit: u32,
		window: Duration,
		now: OffsetDateTime,
	) -> StoreFuture<'a, IncrementOutcome>;

	/// Range query: challenge states whose expiry precedes `cutoff`, capped at
	/// `limit` entries. Results may lag recent writes (eventual consistency).
	fn expired_challenges(
		&self,
		cutoff: OffsetDateTime,
		limit: usize,
	) -> StoreFuture<'_, Vec<StateToken>>;

	/// Deletes the listed challenge documents, returning how many existed.
	fn delete_challenges<'a>(&'a self, states: &'a [StateToken]) -> StoreFuture<'a, u64>;

	/// Range query: usage keys whose window expiry precedes `cutoff`, capped at
	/// `limit` entries.
	fn stale_usage(&self, cutoff: OffsetDateTime, limit: usize) -> StoreFuture<'_, Vec<UsageKey>>;

	/// Deletes the listed usage documents, returning how many existed.
	fn delete_usage<'a>(&'a self, keys: &'a [UsageKey]) -> StoreFuture<'a, u64>;
}

/// Result of one atomic challenge-consume transaction.
#[derive(Clone, Debug)]
pub enum ConsumeOutcome {
	/// The challenge was live; the consumed flag is now set and the record
	/// (including the verifier) is returned to the caller of the transaction.
	Consumed(ChallengeRecord),
	/// No document exists for the state.
	Missing,
	/// The document exists but its TTL elapsed before the transaction ran.
	Expired,
	/// The consumed flag was already set; a second exchange was attempted.
	AlreadyConsumed,
}

/// Result of one atomic create-or-increment transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncrementOutcome {
	/// The counter was created or incremented; `count` is the new value.
	Allowed {
		/// Counter value after the increment.
		count: u32,
	},
	/// The counter already reached the limit; nothing was written.
	Denied {
		/// Counter value observed inside the transaction.
		count: u32,
	},
}

/// Error type produced by [`GateStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A create-if-absent transaction found an existing document.
	#[error("Document already exists: {key}.")]
	Conflict {
		/// Rendered document key.
		key: String,
	},
}
