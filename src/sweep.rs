//! Periodic cleanup of stale challenge and usage documents.
//!
//! The sweep deletes documents whose expiry lies at least one safety margin in
//! the past. Documents inside the margin are left alone so the consume and
//! increment transactions stay the sole authority on expiry. Runs are batched
//! and resumable; losing a run midway only delays reclamation.

// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::GateStore,
};

/// Tuning for one sweep pass.
#[derive(Clone, Debug)]
pub struct SweepConfig {
	/// Safety margin subtracted from `now` to form the deletion cutoff.
	///
	/// Only documents expired for at least this long are deleted, so a sweep
	/// racing an in-flight consume can never delete a document that transaction
	/// still considers live.
	pub margin: Duration,
	/// Maximum documents fetched and deleted per batch.
	pub batch_size: usize,
}
impl Default for SweepConfig {
	fn default() -> Self {
		Self { margin: Duration::hours(1), batch_size: 500 }
	}
}

/// Counts reported by a completed sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Challenge documents deleted.
	pub challenges_deleted: u64,
	/// Usage documents deleted.
	pub usage_deleted: u64,
}

/// Runs one full sweep pass over both document kinds.
///
/// Each batch re-queries the store, so a pass terminates once a query returns
/// fewer documents than `batch_size`. Deleting an already-deleted document is
/// a no-op at the store level, making concurrent sweeps safe.
pub async fn run_sweep(
	store: &dyn GateStore,
	config: &SweepConfig,
	now: OffsetDateTime,
) -> Result<SweepReport> {
	const KIND: FlowKind = FlowKind::Sweep;

	let span = FlowSpan::new(KIND, "run_sweep");

	obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

	let result = span
		.instrument(async move {
			let cutoff = now - config.margin;
			let mut report = SweepReport::default();

			loop {
				let batch = store.expired_challenges(cutoff, config.batch_size).await?;
				let fetched = batch.len();

				if fetched > 0 {
					let deleted = store.delete_challenges(&batch).await?;

					report.challenges_deleted += deleted;

					obs::record_sweep_deleted("challenge", deleted);
				}
				if fetched < config.batch_size {
					break;
				}
			}

			loop {
				let batch = store.stale_usage(cutoff, config.batch_size).await?;
				let fetched = batch.len();

				if fetched > 0 {
					let deleted = store.delete_usage(&batch).await?;

					report.usage_deleted += deleted;

					obs::record_sweep_deleted("usage", deleted);
				}
				if fetched < config.batch_size {
					break;
				}
			}

			Ok(report)
		})
		.await;

	match &result {
		Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
	}

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		challenge::{ChallengeRecord, PkceCodeChallengeMethod},
		ident::{ClientKey, StateToken},
		rate_limit::{Operation, UsageKey, UsageRecord},
		store::MemoryStore,
		token::Secret,
	};

	fn challenge(state: &str, expires_at: OffsetDateTime) -> ChallengeRecord {
		ChallengeRecord {
			state: StateToken::from_generated(state.into()),
			code_verifier: Secret::new("verifier"),
			code_challenge: "challenge".into(),
			code_challenge_method: PkceCodeChallengeMethod::S256,
			redirect_uri: Url::parse("https://app.example/cb")
				.expect("Redirect fixture should parse."),
			created_at: expires_at - Duration::minutes(10),
			expires_at,
			consumed: false,
			owner_hint: None,
		}
	}

	#[tokio::test]
	async fn sweep_deletes_only_documents_past_the_margin() {
		let store = MemoryStore::default();
		let now = OffsetDateTime::now_utc();

		// Stale: expired two hours ago, well past the one hour margin.
		store
			.insert_challenge(challenge("stale-challenge", now - Duration::hours(2)))
			.await
			.expect("Insert should succeed.");
		// Expired but inside the margin; the sweep must leave it alone.
		store
			.insert_challenge(challenge("recent-challenge", now - Duration::minutes(5)))
			.await
			.expect("Insert should succeed.");
		// Live document.
		store
			.insert_challenge(challenge("live-challenge", now + Duration::minutes(5)))
			.await
			.expect("Insert should succeed.");

		let caller = ClientKey::new("caller").expect("Client key fixture should parse.");
		let stale_key = UsageKey::at(
			Operation::OauthExchange,
			caller.clone(),
			Duration::minutes(10),
			now - Duration::hours(3),
		);

		store
			.try_increment(&stale_key, 10, Duration::minutes(10), now - Duration::hours(3))
			.await
			.expect("Increment should succeed.");

		let report = run_sweep(&store, &SweepConfig::default(), now)
			.await
			.expect("Sweep pass should succeed.");

		assert_eq!(report.challenges_deleted, 1);
		assert_eq!(report.usage_deleted, 1);

		let leftover = store
			.expired_challenges(now + Duration::days(365), 10)
			.await
			.expect("Query should succeed.");

		assert_eq!(leftover.len(), 2);
		assert!(!leftover.iter().any(|state| state.as_ref() == "stale-challenge"));
	}

	#[tokio::test]
	async fn sweep_on_an_empty_store_reports_zero() {
		let store = MemoryStore::default();
		let report = run_sweep(&store, &SweepConfig::default(), OffsetDateTime::now_utc())
			.await
			.expect("Sweep pass should succeed.");

		assert_eq!(report, SweepReport::default());
	}
}
