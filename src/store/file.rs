//! Simple file-backed [`GateStore`] for lightweight single-process deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	challenge::ChallengeRecord,
	ident::StateToken,
	rate_limit::{UsageKey, UsageRecord},
	store::{ConsumeOutcome, GateStore, IncrementOutcome, StoreError, StoreFuture},
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
	challenges: HashMap<StateToken, ChallengeRecord>,
	usage: Vec<(UsageKey, UsageRecord)>,
}

#[derive(Debug, Default)]
struct Inner {
	challenges: HashMap<StateToken, ChallengeRecord>,
	usage: HashMap<UsageKey, UsageRecord>,
}
impl Inner {
	fn to_snapshot(&self) -> Collections {
		Collections {
			challenges: self.challenges.clone(),
			usage: self.usage.iter().map(|(key, record)| (key.clone(), record.clone())).collect(),
		}
	}

	fn from_snapshot(snapshot: Collections) -> Self {
		Self { challenges: snapshot.challenges, usage: snapshot.usage.into_iter().collect() }
	}
}

/// Persists both collections to a JSON snapshot after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Inner>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let inner = if path.exists() {
			Inner::from_snapshot(Self::load_snapshot(&path)?)
		} else {
			Inner::default()
		};

		Ok(Self { path, inner: Arc::new(RwLock::new(inner)) })
	}

	fn load_snapshot(path: &Path) -> Result<Collections, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(Collections::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, contents: &Inner) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(&contents.to_snapshot()).map_err(|e| {
			StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			}
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl GateStore for FileStore {
	fn insert_challenge(&self, record: ChallengeRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.challenges.contains_key(&record.state) {
				return Err(StoreError::Conflict { key: record.state.to_string() });
			}

			guard.challenges.insert(record.state.clone(), record);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn consume_challenge<'a>(
		&'a self,
		state: &'a StateToken,
		now: OffsetDateTime,
	) -> StoreFuture<'a, ConsumeOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let outcome = match guard.challenges.get_mut(state) {
				None => ConsumeOutcome::Missing,
				Some(record) if record.is_expired_at(now) => ConsumeOutcome::Expired,
				Some(record) if record.consumed => ConsumeOutcome::AlreadyConsumed,
				Some(record) => {
					record.consumed = true;

					ConsumeOutcome::Consumed(record.clone())
				},
			};

			if matches!(outcome, ConsumeOutcome::Consumed(_)) {
				self.persist_locked(&guard)?;
			}

			Ok(outcome)
		})
	}

	fn try_increment<'a>(
		&'a self,
		key: &'a UsageKey,
		limit: u32,
		window: Duration,
		now: OffsetDateTime,
	) -> StoreFuture<'a, IncrementOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let outcome = match guard.usage.get_mut(key) {
				None if limit == 0 => IncrementOutcome::Denied { count: 0 },
				None => {
					let record =
						UsageRecord::open(key.window_start(window), key.window_end(window), now);

					guard.usage.insert(key.clone(), record);

					IncrementOutcome::Allowed { count: 1 }
				},
				Some(record) if record.count < limit => {
					record.count += 1;
					record.last_request_at = now;

					IncrementOutcome::Allowed { count: record.count }
				},
				Some(record) => IncrementOutcome::Denied { count: record.count },
			};

			if matches!(outcome, IncrementOutcome::Allowed { .. }) {
				self.persist_locked(&guard)?;
			}

			Ok(outcome)
		})
	}

	fn expired_challenges(
		&self,
		cutoff: OffsetDateTime,
		limit: usize,
	) -> StoreFuture<'_, Vec<StateToken>> {
		Box::pin(async move {
			Ok(self
				.inner
				.read()
				.challenges
				.iter()
				.filter(|(_, record)| record.expires_at <= cutoff)
				.take(limit)
				.map(|(state, _)| state.clone())
				.collect())
		})
	}

	fn delete_challenges<'a>(&'a self, states: &'a [StateToken]) -> StoreFuture<'a, u64> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let deleted =
				states.iter().filter(|state| guard.challenges.remove(*state).is_some()).count();

			if deleted > 0 {
				self.persist_locked(&guard)?;
			}

			Ok(deleted as u64)
		})
	}

	fn stale_usage(&self, cutoff: OffsetDateTime, limit: usize) -> StoreFuture<'_, Vec<UsageKey>> {
		Box::pin(async move {
			Ok(self
				.inner
				.read()
				.usage
				.iter()
				.filter(|(_, record)| record.expires_at <= cutoff)
				.take(limit)
				.map(|(key, _)| key.clone())
				.collect())
		})
	}

	fn delete_usage<'a>(&'a self, keys: &'a [UsageKey]) -> StoreFuture<'a, u64> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let deleted = keys.iter().filter(|key| guard.usage.remove(*key).is_some()).count();

			if deleted > 0 {
				self.persist_locked(&guard)?;
			}

			Ok(deleted as u64)
		})
	}
}
