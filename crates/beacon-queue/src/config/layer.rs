// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::time::Duration;

use beacon_queue_core::SuspendDurations;
use serde::{Deserialize, Serialize};

use super::{ApiKey, QueueConfig};

/// One source's view of the configuration. Unset fields defer to lower
/// precedence sources and finally to [`QueueConfig::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfigLayer {
	pub server_url: Option<String>,
	pub api_key: Option<ApiKey>,
	pub enabled: Option<bool>,
	pub storage_path: Option<PathBuf>,
	pub queue_max_age_secs: Option<u64>,
	pub queue_max_attempts: Option<u32>,
	pub submission_batch_size: Option<usize>,
	pub processing_interval_secs: Option<u64>,
	pub stale_lock_after_secs: Option<u64>,
	pub request_timeout_secs: Option<u64>,
	pub suspend_transient_secs: Option<u64>,
	pub suspend_auth_secs: Option<u64>,
	pub suspend_not_found_secs: Option<u64>,
	pub log_level: Option<String>,
}

impl QueueConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.server_url.is_some() {
			self.server_url = other.server_url;
		}
		if other.api_key.is_some() {
			self.api_key = other.api_key;
		}
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.storage_path.is_some() {
			self.storage_path = other.storage_path;
		}
		if other.queue_max_age_secs.is_some() {
			self.queue_max_age_secs = other.queue_max_age_secs;
		}
		if other.queue_max_attempts.is_some() {
			self.queue_max_attempts = other.queue_max_attempts;
		}
		if other.submission_batch_size.is_some() {
			self.submission_batch_size = other.submission_batch_size;
		}
		if other.processing_interval_secs.is_some() {
			self.processing_interval_secs = other.processing_interval_secs;
		}
		if other.stale_lock_after_secs.is_some() {
			self.stale_lock_after_secs = other.stale_lock_after_secs;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
		if other.suspend_transient_secs.is_some() {
			self.suspend_transient_secs = other.suspend_transient_secs;
		}
		if other.suspend_auth_secs.is_some() {
			self.suspend_auth_secs = other.suspend_auth_secs;
		}
		if other.suspend_not_found_secs.is_some() {
			self.suspend_not_found_secs = other.suspend_not_found_secs;
		}
		if other.log_level.is_some() {
			self.log_level = other.log_level;
		}
	}

	pub fn finalize(self) -> QueueConfig {
		let defaults = QueueConfig::default();
		let secs = |value: Option<u64>, default: Duration| value.map_or(default, Duration::from_secs);

		QueueConfig {
			server_url: self
				.server_url
				.map(|url| url.trim_end_matches('/').to_string())
				.unwrap_or(defaults.server_url),
			api_key: self.api_key.filter(|key| !key.expose().is_empty()),
			enabled: self.enabled.unwrap_or(defaults.enabled),
			storage_path: self.storage_path.or(defaults.storage_path),
			queue_max_age: secs(self.queue_max_age_secs, defaults.queue_max_age),
			queue_max_attempts: self.queue_max_attempts.unwrap_or(defaults.queue_max_attempts),
			submission_batch_size: self
				.submission_batch_size
				.unwrap_or(defaults.submission_batch_size),
			processing_interval: secs(self.processing_interval_secs, defaults.processing_interval),
			stale_lock_after: secs(self.stale_lock_after_secs, defaults.stale_lock_after),
			request_timeout: secs(self.request_timeout_secs, defaults.request_timeout),
			suspend: SuspendDurations {
				transient: secs(self.suspend_transient_secs, defaults.suspend.transient),
				auth: secs(self.suspend_auth_secs, defaults.suspend.auth),
				not_found: secs(self.suspend_not_found_secs, defaults.suspend.not_found),
			},
			log_level: self.log_level.unwrap_or(defaults.log_level),
		}
	}
}
