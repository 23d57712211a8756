// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use beacon_queue_core::{
	Clock, EventSerializer, JsonEventSerializer, SharedClock, StoredItem, SystemClock,
};
use chrono::{DateTime, Utc};

use crate::error::{Result, StorageError};
use crate::store::ObjectStorage;

#[derive(Debug, Clone)]
struct Blob {
	bytes: Vec<u8>,
	created_at: DateTime<Utc>,
	modified_at: DateTime<Utc>,
}

/// Process-local object storage.
///
/// Renames are conditional on the source key still being present, checked
/// and applied under one lock, which gives the same lost-race semantics as a
/// filesystem rename.
pub struct InMemoryObjectStorage {
	objects: Mutex<HashMap<String, Blob>>,
	serializer: Arc<dyn EventSerializer>,
	clock: SharedClock,
}

impl Default for InMemoryObjectStorage {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryObjectStorage {
	pub fn new() -> Self {
		Self {
			objects: Mutex::new(HashMap::new()),
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

	pub fn len(&self) -> usize {
		self.objects().len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects().is_empty()
	}

	fn objects(&self) -> MutexGuard<'_, HashMap<String, Blob>> {
		self.objects.lock().unwrap_or_else(|e| e.into_inner())
	}
}

fn normalize(path: &str) -> Result<String> {
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	if segments.is_empty() || segments.iter().any(|s| *s == "." || *s == "..") {
		return Err(StorageError::InvalidPath(path.to_string()));
	}
	Ok(segments.join("/"))
}

fn to_item(path: &str, blob: &Blob) -> StoredItem {
	StoredItem {
		path: path.to_string(),
		created_at: blob.created_at,
		modified_at: blob.modified_at,
		size: blob.bytes.len() as u64,
	}
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
	fn serializer(&self) -> &dyn EventSerializer {
		self.serializer.as_ref()
	}

	fn clock(&self) -> &dyn Clock {
		self.clock.as_ref()
	}

	async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<()> {
		let path = normalize(path)?;
		let now = self.clock.now();
		let mut objects = self.objects();
		let created_at = objects.get(&path).map_or(now, |blob| blob.created_at);
		objects.insert(
			path,
			Blob {
				bytes: bytes.to_vec(),
				created_at,
				modified_at: now,
			},
		);
		Ok(())
	}

	async fn read_object(&self, path: &str) -> Result<Option<Vec<u8>>> {
		let path = normalize(path)?;
		Ok(self.objects().get(&path).map(|blob| blob.bytes.clone()))
	}

	async fn stat_object(&self, path: &str) -> Result<Option<StoredItem>> {
		let path = normalize(path)?;
		Ok(self.objects().get(&path).map(|blob| to_item(&path, blob)))
	}

	async fn remove_object(&self, path: &str) -> Result<bool> {
		let path = normalize(path)?;
		Ok(self.objects().remove(&path).is_some())
	}

	async fn list_objects(&self, dir: &str) -> Result<Vec<StoredItem>> {
		let dir = dir.trim_matches('/');
		let prefix = if dir.is_empty() {
			String::new()
		} else {
			format!("{dir}/")
		};
		let mut items: Vec<StoredItem> = self
			.objects()
			.iter()
			.filter(|(path, _)| path.starts_with(&prefix))
			.map(|(path, blob)| to_item(path, blob))
			.collect();
		items.sort_by(|a, b| a.path.cmp(&b.path));
		Ok(items)
	}

	async fn rename_object(&self, from: &str, to: &str) -> Result<bool> {
		let from = normalize(from)?;
		let to = normalize(to)?;
		let mut objects = self.objects();
		match objects.remove(&from) {
			Some(blob) => {
				objects.insert(to, blob);
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn set_modified(&self, path: &str, at: DateTime<Utc>) -> Result<bool> {
		let path = normalize(path)?;
		match self.objects().get_mut(&path) {
			Some(blob) => {
				blob.modified_at = at;
				Ok(true)
			}
			None => Ok(false),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use beacon_queue_core::{Event, ManualClock};
	use std::time::Duration;

	const QUEUE: &str = "mem";

	#[tokio::test]
	async fn blob_roundtrip_and_listing() {
		let storage = InMemoryObjectStorage::new();
		assert!(storage.save("a/b.txt", b"hi").await);
		assert!(storage.save("a/c/d.txt", b"there").await);
		assert!(storage.save("ab.txt", b"!").await);

		assert_eq!(storage.read("a/b.txt").await.unwrap(), b"hi");
		assert_eq!(storage.list("a/", None).await.len(), 2);
		assert_eq!(storage.list("a", None).await.len(), 3);
		assert!(storage.delete("a/b.txt").await);
		assert!(!storage.exists("a/b.txt").await);
		assert!(!storage.save("../x", b"").await);
	}

	#[tokio::test]
	async fn conditional_rename_has_one_winner() {
		let storage = Arc::new(InMemoryObjectStorage::new());
		let item = storage.enqueue(QUEUE, &Event::error("x")).await.unwrap();

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
		assert_eq!(storage.len(), 1);
	}

	#[tokio::test]
	async fn queue_lifecycle_matches_folder_backend() {
		let clock = Arc::new(ManualClock::starting_now());
		let storage = InMemoryObjectStorage::new().with_clock(clock.clone());

		let item = storage.enqueue(QUEUE, &Event::error("x")).await.unwrap();
		let locked = storage.lock(&item).await.unwrap();
		assert_eq!(storage.list_queue_entries(QUEUE, None, None).await.len(), 0);

		clock.advance(Duration::from_secs(61 * 60));
		assert_eq!(storage.release_stale_locks(QUEUE, Duration::from_secs(3600)).await, 1);
		assert!(storage.unlock(&locked).await.is_none());

		let entries = storage.list_queue_entries(QUEUE, None, None).await;
		let locked = storage.lock(&entries[0]).await.unwrap();
		assert_eq!(storage.release_batch(&[locked]).await, 1);

		let entries = storage.list_queue_entries(QUEUE, None, None).await;
		assert_eq!(entries[0].attempts(), 1);
		assert_eq!(storage.cleanup_expired(QUEUE, Duration::from_secs(86_400), 1).await, 1);
		assert!(storage.is_empty());
	}

	#[tokio::test]
	async fn overflowing_attempt_counts_are_reaped() {
		let storage = InMemoryObjectStorage::new();
		let path = format!("{QUEUE}/q/abc-99999999999.json");
		assert!(storage.save(&path, b"{}").await);

		assert_eq!(storage.cleanup_expired(QUEUE, Duration::from_secs(86_400), 3).await, 1);
		assert!(storage.is_empty());
	}
}
