// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Queue entry naming.
//!
//! A queue entry lives at `<queue>/q/<id>-<attempts>.<ext>[.x]`. Everything
//! the storage layer needs to know about an entry (attempt count, lock state)
//! is in that name, so state changes are single renames and any process
//! sharing the directory sees the same state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{NoContext, Timestamp, Uuid};

use crate::error::{CoreError, Result};

/// Directory under a queue that holds its entries.
pub const QUEUE_DIR: &str = "q";

/// Suffix marking a locked entry.
pub const LOCK_SUFFIX: &str = ".x";

/// Suffix of partially written files. Never a queue entry.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Parsed form of a queue entry file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueEntryName {
	pub id: String,
	pub attempts: u32,
	pub extension: String,
	pub locked: bool,
}

impl QueueEntryName {
	/// A fresh, unlocked entry with zero attempts.
	pub fn new(id: impl Into<String>, extension: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			attempts: 0,
			extension: extension.into(),
			locked: false,
		}
	}

	/// A fresh entry whose id is a UUIDv7 minted at `now`.
	pub fn generate(now: DateTime<Utc>, extension: impl Into<String>) -> Self {
		let secs = u64::try_from(now.timestamp()).unwrap_or(0);
		let ts = Timestamp::from_unix(NoContext, secs, now.timestamp_subsec_nanos());
		Self::new(Uuid::new_v7(ts).to_string(), extension)
	}

	pub fn parse(file_name: &str) -> Result<Self> {
		let invalid = || CoreError::InvalidEntryName(file_name.to_string());

		if file_name.is_empty()
			|| file_name.starts_with('.')
			|| file_name.ends_with(TEMP_SUFFIX)
			|| file_name.contains('/')
		{
			return Err(invalid());
		}

		let (stem, locked) = match file_name.strip_suffix(LOCK_SUFFIX) {
			Some(rest) if rest.contains('.') => (rest, true),
			_ => (file_name, false),
		};

		let (base, extension) = stem.split_once('.').ok_or_else(invalid)?;
		if extension.is_empty() {
			return Err(invalid());
		}

		let (id, attempts) = base.rsplit_once('-').ok_or_else(invalid)?;
		if id.is_empty() || attempts.is_empty() || !attempts.bytes().all(|b| b.is_ascii_digit()) {
			return Err(invalid());
		}
		// Digits only, so parsing fails only on overflow. Such an entry is spent.
		let attempts = attempts.parse().unwrap_or(u32::MAX);

		Ok(Self {
			id: id.to_string(),
			attempts,
			extension: extension.to_string(),
			locked,
		})
	}

	pub fn file_name(&self) -> String {
		let mut name = format!("{}-{}.{}", self.id, self.attempts, self.extension);
		if self.locked {
			name.push_str(LOCK_SUFFIX);
		}
		name
	}

	pub fn to_locked(&self) -> Self {
		Self {
			locked: true,
			..self.clone()
		}
	}

	pub fn to_unlocked(&self) -> Self {
		Self {
			locked: false,
			..self.clone()
		}
	}

	/// Same entry with the attempt count bumped by one. Lock state is kept.
	pub fn next_attempt(&self) -> Self {
		Self {
			attempts: self.attempts.saturating_add(1),
			..self.clone()
		}
	}

	/// Creation time encoded in a UUIDv7 id, if the id is one.
	pub fn created_at(&self) -> Option<DateTime<Utc>> {
		let uuid = Uuid::parse_str(&self.id).ok()?;
		if uuid.get_version_num() != 7 {
			return None;
		}
		let (secs, nanos) = uuid.get_timestamp()?.to_unix();
		DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)
	}
}

impl fmt::Display for QueueEntryName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.file_name())
	}
}

impl FromStr for QueueEntryName {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}

/// Directory (relative to the storage root) holding a queue's entries.
pub fn queue_dir(queue_name: &str) -> String {
	format!("{queue_name}/{QUEUE_DIR}")
}

/// One persisted blob, as reported by object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
	/// `/`-separated path relative to the storage root.
	pub path: String,
	pub created_at: DateTime<Utc>,
	pub modified_at: DateTime<Utc>,
	pub size: u64,
}

impl StoredItem {
	pub fn file_name(&self) -> &str {
		self.path.rsplit('/').next().unwrap_or(&self.path)
	}

	/// Directory part of the path, without a trailing slash.
	pub fn parent(&self) -> &str {
		self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
	}

	/// The queue entry name, if this item is a queue entry.
	pub fn entry_name(&self) -> Option<QueueEntryName> {
		QueueEntryName::parse(self.file_name()).ok()
	}

	pub fn is_locked(&self) -> bool {
		self.entry_name().is_some_and(|name| name.locked)
	}

	pub fn attempts(&self) -> u32 {
		self.entry_name().map_or(0, |name| name.attempts)
	}

	/// Path of a sibling file with the given name.
	pub fn sibling_path(&self, file_name: &str) -> String {
		match self.parent() {
			"" => file_name.to_string(),
			dir => format!("{dir}/{file_name}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn parses_unlocked_entry_with_hyphenated_id() {
		let name = QueueEntryName::parse("0190a5b2-7c1e-7d4f-9a2b-1c3d5e7f9a0b-2.json").unwrap();
		assert_eq!(name.id, "0190a5b2-7c1e-7d4f-9a2b-1c3d5e7f9a0b");
		assert_eq!(name.attempts, 2);
		assert_eq!(name.extension, "json");
		assert!(!name.locked);
	}

	#[test]
	fn parses_locked_entry() {
		let name = QueueEntryName::parse("abc-0.json.x").unwrap();
		assert!(name.locked);
		assert_eq!(name.extension, "json");
		assert_eq!(name.file_name(), "abc-0.json.x");
	}

	#[test]
	fn rejects_names_that_are_not_entries() {
		for bad in [
			"",
			"abc.json",
			"abc-.json",
			"-3.json",
			"abc-1",
			"abc-1.",
			"abc-x1.json",
			"abc-+1.json",
			"abc-0.json.tmp",
			".abc-0.json",
		] {
			assert!(QueueEntryName::parse(bad).is_err(), "{bad:?} should not parse");
		}
	}

	#[test]
	fn overflowing_attempt_count_reads_as_spent() {
		let name = QueueEntryName::parse("abc-99999999999.json").unwrap();
		assert_eq!(name.attempts, u32::MAX);
		assert_eq!(name.next_attempt().attempts, u32::MAX);
	}

	#[test]
	fn lock_transitions_keep_attempts() {
		let name = QueueEntryName::new("abc", "json").next_attempt();
		let locked = name.to_locked();
		assert_eq!(locked.file_name(), "abc-1.json.x");
		assert_eq!(locked.next_attempt().file_name(), "abc-2.json.x");
		assert_eq!(locked.next_attempt().to_unlocked().file_name(), "abc-2.json");
	}

	#[test]
	fn generated_ids_carry_creation_time() {
		let now = DateTime::parse_from_rfc3339("2025-03-01T12:00:00.250Z")
			.unwrap()
			.with_timezone(&Utc);
		let name = QueueEntryName::generate(now, "json");
		let created = name.created_at().unwrap();
		assert_eq!(created.timestamp_millis(), now.timestamp_millis());
	}

	#[test]
	fn non_uuid_ids_have_no_creation_time() {
		assert!(QueueEntryName::new("abc", "json").created_at().is_none());
		let v4 = QueueEntryName::new(Uuid::new_v4().to_string(), "json");
		assert!(v4.created_at().is_none());
	}

	#[test]
	fn stored_item_path_helpers() {
		let item = StoredItem {
			path: "queue-a/q/abc-1.json.x".to_string(),
			created_at: Utc::now(),
			modified_at: Utc::now(),
			size: 10,
		};
		assert_eq!(item.file_name(), "abc-1.json.x");
		assert_eq!(item.parent(), "queue-a/q");
		assert!(item.is_locked());
		assert_eq!(item.attempts(), 1);
		assert_eq!(item.sibling_path("abc-2.json"), "queue-a/q/abc-2.json");
		assert_eq!(queue_dir("queue-a"), "queue-a/q");
	}

	proptest! {
		#[test]
		fn file_name_parses_back(
			id in "[a-zA-Z0-9][a-zA-Z0-9-]{0,40}",
			attempts in 0u32..10_000,
			extension in "[a-z]{1,8}",
			locked in any::<bool>(),
		) {
			let name = QueueEntryName { id, attempts, extension, locked };
			prop_assert_eq!(QueueEntryName::parse(&name.file_name()).unwrap(), name);
		}
	}
}
