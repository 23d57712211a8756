// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use beacon_queue_core::{
	Clock, EventSerializer, JsonEventSerializer, SharedClock, StoredItem, SystemClock, TEMP_SUFFIX,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::store::ObjectStorage;

/// Object storage rooted at a directory.
///
/// Several processes may point at the same root. Writes go through a temp
/// file and a rename, and every queue state change is a rename, so any
/// process sees a consistent view.
pub struct FolderObjectStorage {
	root: PathBuf,
	serializer: Arc<dyn EventSerializer>,
	clock: SharedClock,
}

impl FolderObjectStorage {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			serializer: Arc::new(JsonEventSerializer),
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_serializer(mut self, serializer: Arc<dyn EventSerializer>) -> Self {
		self.serializer = serializer;
		self
	}

	pub fn with_clock(mut self, clock: SharedClock) -> Self {
		self.clock = clock;
		self
	}

	/// Storage under `$XDG_DATA_HOME/beacon/queue`.
	pub fn from_xdg() -> Result<Self> {
		let data_dir = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
		let root = data_dir.join("beacon").join("queue");
		std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;

		info!(root = %root.display(), "initialized folder object storage");

		Ok(Self::new(root))
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn resolve(&self, path: &str) -> Result<PathBuf> {
		let mut full = self.root.clone();
		for segment in path.split('/').filter(|s| !s.is_empty()) {
			if segment == "." || segment == ".." || segment.contains('\\') {
				return Err(StorageError::InvalidPath(path.to_string()));
			}
			full.push(segment);
		}
		Ok(full)
	}

	/// Like [`Self::resolve`], but the path must name something below the root.
	fn resolve_object(&self, path: &str) -> Result<PathBuf> {
		let full = self.resolve(path)?;
		if full == self.root {
			return Err(StorageError::InvalidPath(path.to_string()));
		}
		Ok(full)
	}

	fn item_from_metadata(&self, path: String, metadata: &Metadata) -> StoredItem {
		let modified_at = metadata
			.modified()
			.map(DateTime::<Utc>::from)
			.unwrap_or_else(|_| self.clock.now());
		let created_at = metadata
			.created()
			.map(DateTime::<Utc>::from)
			.unwrap_or(modified_at);

		StoredItem {
			path,
			created_at,
			modified_at,
			size: metadata.len(),
		}
	}
}

fn join_relative(dir: &str, name: &str) -> String {
	let dir = dir.trim_matches('/');
	if dir.is_empty() {
		name.to_string()
	} else {
		format!("{dir}/{name}")
	}
}

#[async_trait]
impl ObjectStorage for FolderObjectStorage {
	fn serializer(&self) -> &dyn EventSerializer {
		self.serializer.as_ref()
	}

	fn clock(&self) -> &dyn Clock {
		self.clock.as_ref()
	}

	async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<()> {
		let full = self.resolve_object(path)?;
		let parent = full
			.parent()
			.ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
		let file_name = full
			.file_name()
			.and_then(|n| n.to_str())
			.ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;

		tokio::fs::create_dir_all(parent)
			.await
			.map_err(|e| StorageError::io(parent, e))?;

		let tmp = parent.join(format!(
			".{file_name}.{}{TEMP_SUFFIX}",
			Uuid::new_v4().simple()
		));

		tokio::fs::write(&tmp, bytes)
			.await
			.map_err(|e| StorageError::io(&tmp, e))?;

		if let Err(e) = tokio::fs::rename(&tmp, &full).await {
			let _ = tokio::fs::remove_file(&tmp).await;
			return Err(StorageError::io(&full, e));
		}

		debug!(path = %full.display(), size = bytes.len(), "wrote object");
		Ok(())
	}

	async fn read_object(&self, path: &str) -> Result<Option<Vec<u8>>> {
		let full = self.resolve_object(path)?;
		match tokio::fs::read(&full).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::io(&full, e)),
		}
	}

	async fn stat_object(&self, path: &str) -> Result<Option<StoredItem>> {
		let full = self.resolve_object(path)?;
		match tokio::fs::metadata(&full).await {
			Ok(metadata) if metadata.is_file() => Ok(Some(
				self.item_from_metadata(path.trim_matches('/').to_string(), &metadata),
			)),
			Ok(_) => Ok(None),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::io(&full, e)),
		}
	}

	async fn remove_object(&self, path: &str) -> Result<bool> {
		let full = self.resolve_object(path)?;
		match tokio::fs::remove_file(&full).await {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(StorageError::io(&full, e)),
		}
	}

	async fn list_objects(&self, dir: &str) -> Result<Vec<StoredItem>> {
		let mut items = Vec::new();
		let mut pending = vec![(self.resolve(dir)?, dir.trim_matches('/').to_string())];

		while let Some((dir_path, relative)) = pending.pop() {
			let mut entries = match tokio::fs::read_dir(&dir_path).await {
				Ok(entries) => entries,
				Err(e) if e.kind() == ErrorKind::NotFound => continue,
				Err(e) => return Err(StorageError::io(&dir_path, e)),
			};

			while let Some(entry) = entries
				.next_entry()
				.await
				.map_err(|e| StorageError::io(&dir_path, e))?
			{
				let Ok(name) = entry.file_name().into_string() else {
					continue;
				};
				let path = join_relative(&relative, &name);

				// Entries can be renamed or deleted by other workers mid-scan.
				let metadata = match entry.metadata().await {
					Ok(metadata) => metadata,
					Err(e) if e.kind() == ErrorKind::NotFound => continue,
					Err(e) => return Err(StorageError::io(entry.path(), e)),
				};

				if metadata.is_dir() {
					pending.push((entry.path(), path));
				} else if metadata.is_file() && !name.ends_with(TEMP_SUFFIX) {
					items.push(self.item_from_metadata(path, &metadata));
				}
			}
		}

		Ok(items)
	}

	async fn rename_object(&self, from: &str, to: &str) -> Result<bool> {
		let source = self.resolve_object(from)?;
		let target = self.resolve_object(to)?;
		match tokio::fs::rename(&source, &target).await {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(StorageError::io(&source, e)),
		}
	}

	async fn set_modified(&self, path: &str, at: DateTime<Utc>) -> Result<bool> {
		let full = self.resolve_object(path)?;
		let time = SystemTime::from(at);

		let result = tokio::task::spawn_blocking({
			let full = full.clone();
			move || {
				std::fs::File::options()
					.write(true)
					.open(&full)?
					.set_modified(time)
			}
		})
		.await?;

		match result {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(StorageError::io(&full, e)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{EntryRead, QueueStats};
	use beacon_queue_core::{Event, ManualClock, QueueEntryName};
	use std::time::Duration;
	use tempfile::TempDir;

	const QUEUE: &str = "test-queue";

	fn create_test_storage() -> (FolderObjectStorage, Arc<ManualClock>, TempDir) {
		let tmp = TempDir::new().unwrap();
		let clock = Arc::new(ManualClock::starting_now());
		let storage = FolderObjectStorage::new(tmp.path()).with_clock(clock.clone());
		(storage, clock, tmp)
	}

	#[tokio::test]
	async fn save_creates_parents_and_overwrites() {
		let (storage, _clock, _tmp) = create_test_storage();

		assert!(storage.save("a/b/c.txt", b"one").await);
		assert!(storage.save("a/b/c.txt", b"two").await);

		assert_eq!(storage.read("a/b/c.txt").await.unwrap(), b"two");
		assert!(storage.exists("a/b/c.txt").await);
		assert!(!storage.exists("a/b/missing.txt").await);
	}

	#[tokio::test]
	async fn save_rejects_escaping_paths() {
		let (storage, _clock, _tmp) = create_test_storage();

		assert!(!storage.save("../outside.txt", b"x").await);
		assert!(!storage.save("", b"x").await);
		assert!(storage.read("a/../../etc/passwd").await.is_none());
	}

	#[tokio::test]
	async fn list_filters_by_prefix_and_skips_temp_files() {
		let (storage, _clock, tmp) = create_test_storage();

		storage.save("logs/app-1.txt", b"1").await;
		storage.save("logs/app-2.txt", b"2").await;
		storage.save("logs/other.txt", b"3").await;
		std::fs::write(tmp.path().join("logs/.partial.tmp"), b"x").unwrap();

		let mut paths: Vec<String> = storage
			.list("logs/app", None)
			.await
			.into_iter()
			.map(|item| item.path)
			.collect();
		paths.sort();
		assert_eq!(paths, vec!["logs/app-1.txt", "logs/app-2.txt"]);

		assert_eq!(storage.list("logs/", Some(2)).await.len(), 2);
		assert!(storage.list("nothing/", None).await.is_empty());
	}

	#[tokio::test]
	async fn delete_reports_whether_anything_was_removed() {
		let (storage, _clock, _tmp) = create_test_storage();

		storage.save("x.bin", b"x").await;
		assert!(storage.delete("x.bin").await);
		assert!(!storage.delete("x.bin").await);
	}

	#[tokio::test]
	async fn enqueue_writes_unlocked_entry_with_zero_attempts() {
		let (storage, clock, _tmp) = create_test_storage();

		let item = storage.enqueue(QUEUE, &Event::log("test", "hello")).await.unwrap();
		let name = QueueEntryName::parse(item.file_name()).unwrap();

		assert!(item.path.starts_with("test-queue/q/"));
		assert_eq!(name.attempts, 0);
		assert!(!name.locked);
		assert_eq!(name.extension, "json");
		assert_eq!(item.created_at.timestamp_millis(), clock.now().timestamp_millis());

		let event = storage.read_entry(&item).await.into_event().unwrap();
		assert_eq!(event.message.as_deref(), Some("hello"));
	}

	#[tokio::test]
	async fn enqueued_entries_have_unique_paths() {
		let (storage, _clock, _tmp) = create_test_storage();

		for _ in 0..20 {
			storage.enqueue(QUEUE, &Event::usage("feature")).await.unwrap();
		}

		assert_eq!(storage.list_queue_entries(QUEUE, None, None).await.len(), 20);
	}

	#[tokio::test]
	async fn list_queue_entries_skips_locked_and_respects_cutoff() {
		let (storage, clock, _tmp) = create_test_storage();

		let first = storage.enqueue(QUEUE, &Event::error("one")).await.unwrap();
		storage.enqueue(QUEUE, &Event::error("two")).await.unwrap();
		let cutoff = clock.now();
		clock.advance(Duration::from_secs(5));
		storage.enqueue(QUEUE, &Event::error("late")).await.unwrap();

		storage.lock(&first).await.unwrap();

		assert_eq!(storage.list_queue_entries(QUEUE, None, None).await.len(), 2);
		assert_eq!(storage.list_queue_entries(QUEUE, None, Some(cutoff)).await.len(), 1);
		assert_eq!(storage.list_queue_entries(QUEUE, Some(1), None).await.len(), 1);
		assert!(storage.list_queue_entries("other", None, None).await.is_empty());
	}

	#[tokio::test]
	async fn lock_is_won_exactly_once() {
		let (storage, _clock, _tmp) = create_test_storage();
		let item = storage.enqueue(QUEUE, &Event::error("contended")).await.unwrap();

		let locked = storage.lock(&item).await.unwrap();
		assert!(locked.is_locked());
		assert!(locked.path.ends_with(".json.x"));

		assert!(storage.lock(&item).await.is_none(), "second lock must lose");
		assert!(storage.lock(&locked).await.is_none(), "locked entries cannot be relocked");
	}

	#[tokio::test]
	async fn concurrent_lockers_get_one_winner() {
		let tmp = TempDir::new().unwrap();
		let storage = Arc::new(FolderObjectStorage::new(tmp.path()));
		let item = storage.enqueue(QUEUE, &Event::error("race")).await.unwrap();

		let mut handles = Vec::new();
		for _ in 0..8 {
			let storage = Arc::clone(&storage);
			let item = item.clone();
			handles.push(tokio::spawn(async move { storage.lock(&item).await.is_some() }));
		}

		let mut winners = 0;
		for handle in handles {
			if handle.await.unwrap() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
	}

	#[tokio::test]
	async fn unlock_and_increment_attempt_rename_in_place() {
		let (storage, _clock, _tmp) = create_test_storage();
		let item = storage.enqueue(QUEUE, &Event::error("x")).await.unwrap();

		let locked = storage.lock(&item).await.unwrap();
		let bumped = storage.increment_attempt(&locked).await.unwrap();
		assert!(bumped.is_locked());
		assert_eq!(bumped.attempts(), 1);

		let unlocked = storage.unlock(&bumped).await.unwrap();
		assert!(!unlocked.is_locked());
		assert_eq!(unlocked.attempts(), 1);
		assert!(storage.unlock(&unlocked).await.is_none());

		assert!(matches!(storage.read_entry(&unlocked).await, EntryRead::Event(_)));
	}

	#[tokio::test]
	async fn release_batch_unlocks_and_bumps_attempts() {
		let (storage, _clock, _tmp) = create_test_storage();
		let mut locked = Vec::new();
		for i in 0..3 {
			let item = storage.enqueue(QUEUE, &Event::error(format!("e{i}"))).await.unwrap();
			locked.push(storage.lock(&item).await.unwrap());
		}

		assert_eq!(storage.release_batch(&locked).await, 3);

		let entries = storage.list_queue_entries(QUEUE, None, None).await;
		assert_eq!(entries.len(), 3);
		assert!(entries.iter().all(|item| item.attempts() == 1 && !item.is_locked()));
	}

	#[tokio::test]
	async fn delete_batch_removes_entries() {
		let (storage, _clock, _tmp) = create_test_storage();
		let a = storage.enqueue(QUEUE, &Event::error("a")).await.unwrap();
		let b = storage.enqueue(QUEUE, &Event::error("b")).await.unwrap();
		let a = storage.lock(&a).await.unwrap();

		assert_eq!(storage.delete_batch(&[a.clone(), b]).await, 2);
		assert_eq!(storage.delete_batch(&[a]).await, 0);
		assert_eq!(storage.queue_stats(QUEUE).await.total(), 0);
	}

	/// Purpose: a worker that crashed while holding locks must not strand its
	/// entries. Once the lock is older than the threshold any instance can
	/// reclaim it without an explicit unlock.
	#[tokio::test]
	async fn stale_locks_are_released_after_threshold() {
		let (storage, clock, _tmp) = create_test_storage();
		let item = storage.enqueue(QUEUE, &Event::error("orphan")).await.unwrap();
		storage.lock(&item).await.unwrap();

		clock.advance(Duration::from_secs(59 * 60));
		assert_eq!(storage.release_stale_locks(QUEUE, Duration::from_secs(3600)).await, 0);

		clock.advance(Duration::from_secs(60));
		assert_eq!(storage.release_stale_locks(QUEUE, Duration::from_secs(3600)).await, 1);

		let entries = storage.list_queue_entries(QUEUE, None, None).await;
		assert_eq!(entries.len(), 1);
		assert!(storage.lock(&entries[0]).await.is_some());
	}

	#[tokio::test]
	async fn cleanup_removes_old_and_exhausted_entries() {
		let (storage, clock, _tmp) = create_test_storage();
		let old = storage.enqueue(QUEUE, &Event::error("old")).await.unwrap();
		let old = storage.lock(&old).await.unwrap();

		clock.advance(Duration::from_secs(3 * 24 * 3600));
		let fresh = storage.enqueue(QUEUE, &Event::error("fresh")).await.unwrap();
		let mut tired = storage.enqueue(QUEUE, &Event::error("tired")).await.unwrap();
		for _ in 0..3 {
			tired = storage.increment_attempt(&tired).await.unwrap();
		}

		let removed = storage
			.cleanup_expired(QUEUE, Duration::from_secs(2 * 24 * 3600), 3)
			.await;
		assert_eq!(removed, 2);

		assert!(!storage.exists(&old.path).await);
		assert!(!storage.exists(&tired.path).await);
		let remaining = storage.list_queue_entries(QUEUE, None, None).await;
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].path, fresh.path);
	}

	#[tokio::test]
	async fn zero_max_age_purges_everything() {
		let (storage, _clock, _tmp) = create_test_storage();
		for i in 0..4 {
			let item = storage.enqueue(QUEUE, &Event::error(format!("{i}"))).await.unwrap();
			if i % 2 == 0 {
				storage.lock(&item).await.unwrap();
			}
		}

		assert_eq!(storage.cleanup_expired(QUEUE, Duration::ZERO, u32::MAX).await, 4);
		assert_eq!(storage.queue_stats(QUEUE).await, QueueStats::default());
	}

	#[tokio::test]
	async fn undecodable_entries_are_reported() {
		let (storage, _clock, _tmp) = create_test_storage();
		let path = format!("{QUEUE}/q/broken-0.json");
		storage.save(&path, b"{not json").await;

		let entries = storage.list_queue_entries(QUEUE, None, None).await;
		assert_eq!(entries.len(), 1);
		assert_eq!(storage.read_entry(&entries[0]).await, EntryRead::Undecodable);

		storage.delete(&entries[0].path).await;
		assert_eq!(storage.read_entry(&entries[0]).await, EntryRead::Missing);
	}

	#[tokio::test]
	async fn queue_operations_ignore_foreign_files() {
		let (storage, _clock, tmp) = create_test_storage();
		storage.enqueue(QUEUE, &Event::error("real")).await.unwrap();
		storage.save(&format!("{QUEUE}/q/readme.txt"), b"hi").await;
		storage.save(&format!("{QUEUE}/q/nested/x-0.json"), b"{}").await;
		std::fs::write(tmp.path().join(QUEUE).join("q").join(".y-0.json.abc.tmp"), b"").unwrap();

		let stats = storage.queue_stats(QUEUE).await;
		assert_eq!(stats, QueueStats { unlocked: 1, locked: 0 });
	}
}
