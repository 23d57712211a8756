// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use beacon_queue_core::clock::to_chrono;
use beacon_queue_core::{queue_dir, Clock, Event, EventSerializer, QueueEntryName, StoredItem};
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, StorageError};

/// Entry counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
	pub unlocked: usize,
	pub locked: usize,
}

impl QueueStats {
	pub fn total(&self) -> usize {
		self.unlocked + self.locked
	}
}

/// Outcome of [`ObjectStorage::read_entry`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntryRead {
	Event(Event),
	/// The entry is gone.
	Missing,
	/// The bytes were read but do not decode. Retrying cannot help.
	Undecodable,
	/// The backend failed to read. The entry itself is untouched.
	Unavailable,
}

impl EntryRead {
	pub fn into_event(self) -> Option<Event> {
		match self {
			Self::Event(event) => Some(event),
			_ => None,
		}
	}
}

/// Path-addressed blob store with queue operations layered on top.
///
/// Backends implement the fallible primitives (`*_object`, `set_modified`).
/// The queue operations are provided on top of them and never fail outward:
/// errors are logged and reported as `false`, `None`, an empty list or `0`.
///
/// The only mutual exclusion between workers, in this process or another,
/// is [`ObjectStorage::rename_object`] failing because the source is gone.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
	fn serializer(&self) -> &dyn EventSerializer;

	fn clock(&self) -> &dyn Clock;

	/// Writes `bytes` at `path` so readers see either the old or the new
	/// content, never a partial file. Creates parent directories.
	async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<()>;

	async fn read_object(&self, path: &str) -> Result<Option<Vec<u8>>>;

	async fn stat_object(&self, path: &str) -> Result<Option<StoredItem>>;

	/// Returns `false` if there was nothing to remove.
	async fn remove_object(&self, path: &str) -> Result<bool>;

	/// Every object below the directory `dir` (`""` for the root).
	async fn list_objects(&self, dir: &str) -> Result<Vec<StoredItem>>;

	/// Atomically moves `from` to `to`. Returns `false` if `from` no longer
	/// exists, which callers treat as a lost race.
	async fn rename_object(&self, from: &str, to: &str) -> Result<bool>;

	/// Sets the modification time. Returns `false` if `path` does not exist.
	async fn set_modified(&self, path: &str, at: DateTime<Utc>) -> Result<bool>;

	async fn save(&self, path: &str, bytes: &[u8]) -> bool {
		match self.write_object(path, bytes).await {
			Ok(()) => true,
			Err(e) => {
				log_failure("save", path, &e);
				false
			}
		}
	}

	async fn read(&self, path: &str) -> Option<Vec<u8>> {
		self.read_object(path).await.unwrap_or_else(|e| {
			log_failure("read", path, &e);
			None
		})
	}

	async fn exists(&self, path: &str) -> bool {
		match self.stat_object(path).await {
			Ok(item) => item.is_some(),
			Err(e) => {
				log_failure("exists", path, &e);
				false
			}
		}
	}

	async fn delete(&self, path: &str) -> bool {
		self.remove_object(path).await.unwrap_or_else(|e| {
			log_failure("delete", path, &e);
			false
		})
	}

	/// Objects whose path starts with `prefix`, in backend order.
	async fn list(&self, prefix: &str, limit: Option<usize>) -> Vec<StoredItem> {
		let dir = prefix.rsplit_once('/').map_or("", |(dir, _)| dir);
		match self.list_objects(dir).await {
			Ok(items) => items
				.into_iter()
				.filter(|item| item.path.starts_with(prefix))
				.take(limit.unwrap_or(usize::MAX))
				.collect(),
			Err(e) => {
				log_failure("list", prefix, &e);
				Vec::new()
			}
		}
	}

	/// Stores `event` as a new unlocked entry with zero attempts.
	async fn enqueue(&self, queue_name: &str, event: &Event) -> Option<StoredItem> {
		let bytes = match self.serializer().serialize(event) {
			Ok(bytes) => bytes,
			Err(e) => {
				log_failure("enqueue", queue_name, &StorageError::from(e));
				return None;
			}
		};

		let now = self.clock().now();
		let name = QueueEntryName::generate(now, self.serializer().extension());
		let path = format!("{}/{}", queue_dir(queue_name), name.file_name());

		if let Err(e) = self.write_object(&path, &bytes).await {
			log_failure("enqueue", &path, &e);
			return None;
		}

		trace!(queue = queue_name, path = %path, "enqueued event");

		Some(StoredItem {
			created_at: name.created_at().unwrap_or(now),
			modified_at: now,
			size: bytes.len() as u64,
			path,
		})
	}

	/// Unlocked entries of `queue_name`, optionally capped at `limit` and
	/// restricted to entries created at or before `max_created`.
	async fn list_queue_entries(
		&self,
		queue_name: &str,
		limit: Option<usize>,
		max_created: Option<DateTime<Utc>>,
	) -> Vec<StoredItem> {
		match queue_entries(self, queue_name).await {
			Ok(entries) => entries
				.into_iter()
				.filter(|(name, item)| {
					!name.locked && max_created.map_or(true, |max| item.created_at <= max)
				})
				.map(|(_, item)| item)
				.take(limit.unwrap_or(usize::MAX))
				.collect(),
			Err(e) => {
				log_failure("list_queue_entries", queue_name, &e);
				Vec::new()
			}
		}
	}

	/// Claims an unlocked entry. `None` means another worker got there first
	/// or the entry is gone.
	async fn lock(&self, item: &StoredItem) -> Option<StoredItem> {
		let name = item.entry_name().filter(|name| !name.locked)?;
		let now = self.clock().now();

		// Stamp the lock time first so a locked entry never carries an old mtime.
		match self.set_modified(&item.path, now).await {
			Ok(true) => {}
			Ok(false) => {
				trace!(path = %item.path, "entry vanished before lock");
				return None;
			}
			Err(e) => {
				log_failure("lock", &item.path, &e);
				return None;
			}
		}

		let mut locked = rename_entry(self, "lock", item, &name.to_locked()).await?;
		locked.modified_at = now;
		Some(locked)
	}

	async fn unlock(&self, item: &StoredItem) -> Option<StoredItem> {
		let name = item.entry_name().filter(|name| name.locked)?;
		rename_entry(self, "unlock", item, &name.to_unlocked()).await
	}

	/// Bumps the attempt count, keeping the lock state.
	async fn increment_attempt(&self, item: &StoredItem) -> Option<StoredItem> {
		let name = item.entry_name()?;
		rename_entry(self, "increment_attempt", item, &name.next_attempt()).await
	}

	/// Unlocks every entry locked at or before `now - stale_after`.
	async fn release_stale_locks(&self, queue_name: &str, stale_after: Duration) -> usize {
		let entries = match queue_entries(self, queue_name).await {
			Ok(entries) => entries,
			Err(e) => {
				log_failure("release_stale_locks", queue_name, &e);
				return 0;
			}
		};

		let cutoff = self.clock().now() - to_chrono(stale_after);
		let mut released = 0;
		for (name, item) in entries {
			if !name.locked || item.modified_at > cutoff {
				continue;
			}
			if rename_entry(self, "release_stale_locks", &item, &name.to_unlocked())
				.await
				.is_some()
			{
				released += 1;
			}
		}

		if released > 0 {
			info!(queue = queue_name, released, "released stale queue locks");
		}
		released
	}

	/// Deletes entries created at or before `now - max_age`, or with at least
	/// `max_attempts` attempts, whatever their lock state.
	async fn cleanup_expired(&self, queue_name: &str, max_age: Duration, max_attempts: u32) -> usize {
		let entries = match queue_entries(self, queue_name).await {
			Ok(entries) => entries,
			Err(e) => {
				log_failure("cleanup_expired", queue_name, &e);
				return 0;
			}
		};

		let cutoff = self.clock().now() - to_chrono(max_age);
		let mut removed = 0;
		for (name, item) in entries {
			if item.created_at > cutoff && name.attempts < max_attempts {
				continue;
			}
			match self.remove_object(&item.path).await {
				Ok(true) => removed += 1,
				Ok(false) => {}
				Err(e) => log_failure("cleanup_expired", &item.path, &e),
			}
		}

		if removed > 0 {
			info!(queue = queue_name, removed, "removed expired queue entries");
		}
		removed
	}

	/// Reads and decodes an entry, telling a missing entry, bad bytes and a
	/// backend failure apart.
	async fn read_entry(&self, item: &StoredItem) -> EntryRead {
		let bytes = match self.read_object(&item.path).await {
			Ok(Some(bytes)) => bytes,
			Ok(None) => {
				debug!(path = %item.path, "queue entry missing on read");
				return EntryRead::Missing;
			}
			Err(e) => {
				log_failure("read_entry", &item.path, &e);
				return EntryRead::Unavailable;
			}
		};

		match self.serializer().deserialize(&bytes) {
			Ok(event) => EntryRead::Event(event),
			Err(e) => {
				warn!(path = %item.path, error = %e, "queue entry could not be decoded");
				EntryRead::Undecodable
			}
		}
	}

	async fn delete_batch(&self, items: &[StoredItem]) -> usize {
		let mut deleted = 0;
		for item in items {
			match self.remove_object(&item.path).await {
				Ok(true) => deleted += 1,
				Ok(false) => debug!(path = %item.path, "queue entry already gone"),
				Err(e) => log_failure("delete_batch", &item.path, &e),
			}
		}
		deleted
	}

	/// Unlocks each entry and bumps its attempt count in a single rename.
	async fn release_batch(&self, items: &[StoredItem]) -> usize {
		let mut released = 0;
		for item in items {
			let Some(name) = item.entry_name() else {
				continue;
			};
			let target = name.next_attempt().to_unlocked();
			if rename_entry(self, "release_batch", item, &target).await.is_some() {
				released += 1;
			}
		}
		released
	}

	async fn queue_stats(&self, queue_name: &str) -> QueueStats {
		match queue_entries(self, queue_name).await {
			Ok(entries) => entries
				.iter()
				.fold(QueueStats::default(), |mut stats, (name, _)| {
					if name.locked {
						stats.locked += 1;
					} else {
						stats.unlocked += 1;
					}
					stats
				}),
			Err(e) => {
				log_failure("queue_stats", queue_name, &e);
				QueueStats::default()
			}
		}
	}
}

fn log_failure(op: &'static str, path: &str, err: &StorageError) {
	warn!(op, path, error = %err, "storage operation failed");
}

/// Entries directly inside the queue directory, with `created_at` taken from
/// the entry id where it encodes one.
async fn queue_entries<S>(storage: &S, queue_name: &str) -> Result<Vec<(QueueEntryName, StoredItem)>>
where
	S: ObjectStorage + ?Sized,
{
	let dir = queue_dir(queue_name);
	let items = storage.list_objects(&dir).await?;

	Ok(items
		.into_iter()
		.filter(|item| item.parent() == dir)
		.filter_map(|mut item| {
			let name = item.entry_name()?;
			if let Some(created_at) = name.created_at() {
				item.created_at = created_at;
			}
			Some((name, item))
		})
		.collect())
}

async fn rename_entry<S>(
	storage: &S,
	op: &'static str,
	item: &StoredItem,
	target: &QueueEntryName,
) -> Option<StoredItem>
where
	S: ObjectStorage + ?Sized,
{
	let path = item.sibling_path(&target.file_name());
	match storage.rename_object(&item.path, &path).await {
		Ok(true) => Some(StoredItem {
			path,
			..item.clone()
		}),
		Ok(false) => {
			trace!(op, path = %item.path, "queue entry changed under us");
			None
		}
		Err(e) => {
			log_failure(op, &item.path, &e);
			None
		}
	}
}
