//! Thread-safe in-memory [`GateStore`] for local development and tests.
//!
//! Each operation holds the collection's write lock for its whole
//! read-check-write section, which models the single-document serializable
//! transaction the real document database provides.

// self
use crate::{
	_prelude::*,
	challenge::ChallengeRecord,
	ident::StateToken,
	rate_limit::{UsageKey, UsageRecord},
	store::{ConsumeOutcome, GateStore, IncrementOutcome, StoreError, StoreFuture},
};

type ChallengeMap = Arc<RwLock<HashMap<StateToken, ChallengeRecord>>>;
type UsageMap = Arc<RwLock<HashMap<UsageKey, UsageRecord>>>;

/// In-process storage backend keeping both collections in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	challenges: ChallengeMap,
	usage: UsageMap,
}
impl MemoryStore {
	fn insert_challenge_now(
		map: ChallengeMap,
		record: ChallengeRecord,
	) -> Result<(), StoreError> {
		let mut guard = map.write();

		if guard.contains_key(&record.state) {
			return Err(StoreError::Conflict { key: record.state.to_string() });
		}

		guard.insert(record.state.clone(), record);

		Ok(())
	}

	fn consume_now(map: ChallengeMap, state: StateToken, now: OffsetDateTime) -> ConsumeOutcome {
		let mut guard = map.write();

		match guard.get_mut(&state) {
			None => ConsumeOutcome::Missing,
			// Expired documents are left in place for TTL eviction or the sweep.
			Some(record) if record.is_expired_at(now) => ConsumeOutcome::Expired,
			Some(record) if record.consumed => ConsumeOutcome::AlreadyConsumed,
			Some(record) => {
				record.consumed = true;

				ConsumeOutcome::Consumed(record.clone())
			},
		}
	}

	fn increment_now(
		map: UsageMap,
		key: UsageKey,
		limit: u32,
		window: Duration,
		now: OffsetDateTime,
	) -> IncrementOutcome {
		let mut guard = map.write();

		match guard.get_mut(&key) {
			None if limit == 0 => IncrementOutcome::Denied { count: 0 },
			None => {
				let record =
					UsageRecord::open(key.window_start(window), key.window_end(window), now);

				guard.insert(key, record);

				IncrementOutcome::Allowed { count: 1 }
			},
			Some(record) if record.count < limit => {
				record.count += 1;
				record.last_request_at = now;

				IncrementOutcome::Allowed { count: record.count }
			},
			Some(record) => IncrementOutcome::Denied { count: record.count },
		}
	}
}
impl GateStore for MemoryStore {
	fn insert_challenge(&self, record: ChallengeRecord) -> StoreFuture<'_, ()> {
		let map = self.challenges.clone();

		Box::pin(async move { Self::insert_challenge_now(map, record) })
	}

	fn consume_challenge<'a>(
		&'a self,
		state: &'a StateToken,
		now: OffsetDateTime,
	) -> StoreFuture<'a, ConsumeOutcome> {
		let map = self.challenges.clone();
		let state = state.to_owned();

		Box::pin(async move { Ok(Self::consume_now(map, state, now)) })
	}

	fn try_increment<'a>(
		&'a self,
		key: &'a UsageKey,
		limit: u32,
		window: Duration,
		now: OffsetDateTime,
	) -> StoreFuture<'a, IncrementOutcome> {
		let map = self.usage.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::increment_now(map, key, limit, window, now)) })
	}

	fn expired_challenges(
		&self,
		cutoff: OffsetDateTime,
		limit: usize,
	) -> StoreFuture<'_, Vec<StateToken>> {
		let map = self.challenges.clone();

		Box::pin(async move {
			Ok(map
				.read()
				.iter()
				.filter(|(_, record)| record.expires_at <= cutoff)
				.take(limit)
				.map(|(state, _)| state.clone())
				.collect())
		})
	}

	fn delete_challenges<'a>(&'a self, states: &'a [StateToken]) -> StoreFuture<'a, u64> {
		let map = self.challenges.clone();

		Box::pin(async move {
			let mut guard = map.write();

			Ok(states.iter().filter(|state| guard.remove(*state).is_some()).count() as u64)
		})
	}

	fn stale_usage(&self, cutoff: OffsetDateTime, limit: usize) -> StoreFuture<'_, Vec<UsageKey>> {
		let map = self.usage.clone();

		Box::pin(async move {
			Ok(map
				.read()
				.iter()
				.filter(|(_, record)| record.expires_at <= cutoff)
				.take(limit)
				.map(|(key, _)| key.clone())
				.collect())
		})
	}

	fn delete_usage<'a>(&'a self, keys: &'a [UsageKey]) -> StoreFuture<'a, u64> {
		let map = self.usage.clone();

		Box::pin(async move {
			let mut guard = map.write();

			Ok(keys.iter().filter(|key| guard.remove(*key).is_some()).count() as u64)
		})
	}
}
