// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Layered queue configuration.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`BEACON_*`)
//! 2. Config file (`$XDG_CONFIG_HOME/beacon/config.toml` or an explicit path)
//! 3. Built-in defaults

mod error;
mod layer;
mod sources;

pub use error::ConfigError;
pub use layer::QueueConfigLayer;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beacon_queue_core::SuspendDurations;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Collector API key. Redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
	pub fn new(key: impl Into<String>) -> Self {
		Self(key.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for ApiKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("ApiKey([REDACTED])")
	}
}

/// Fully resolved queue configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
	/// Collector base URL, without a trailing slash.
	pub server_url: String,
	pub api_key: Option<ApiKey>,
	/// When false every processing pass is a no-op. Enqueue still persists.
	pub enabled: bool,
	/// Root of the folder storage. `None` uses the XDG data directory.
	pub storage_path: Option<PathBuf>,
	pub queue_max_age: Duration,
	pub queue_max_attempts: u32,
	/// Initial batch size. The coordinator shrinks it on oversized payloads.
	pub submission_batch_size: usize,
	pub processing_interval: Duration,
	pub stale_lock_after: Duration,
	pub request_timeout: Duration,
	pub suspend: SuspendDurations,
	pub log_level: String,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			server_url: "https://collector.beacon.dev".to_string(),
			api_key: None,
			enabled: true,
			storage_path: None,
			queue_max_age: Duration::from_secs(2 * 24 * 60 * 60),
			queue_max_attempts: 3,
			submission_batch_size: 50,
			processing_interval: Duration::from_secs(10),
			stale_lock_after: Duration::from_secs(60 * 60),
			request_timeout: Duration::from_secs(30),
			suspend: SuspendDurations::default(),
			log_level: "info".to_string(),
		}
	}
}

impl QueueConfig {
	/// Queue directory name. Derived from the API key so projects sharing a
	/// storage root never mix entries.
	pub fn queue_name(&self) -> String {
		match &self.api_key {
			Some(key) => {
				let digest = Sha256::digest(key.expose().as_bytes());
				hex::encode(&digest[..8])
			}
			None => "default".to_string(),
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.submission_batch_size == 0 {
			return Err(ConfigError::Validation(
				"submission_batch_size must be at least 1".to_string(),
			));
		}
		if self.queue_max_attempts == 0 {
			return Err(ConfigError::Validation(
				"queue_max_attempts must be at least 1".to_string(),
			));
		}
		if self.server_url.is_empty() {
			return Err(ConfigError::Validation("server_url must not be empty".to_string()));
		}
		Ok(())
	}
}

/// Load configuration from defaults, the user config file and the environment.
pub fn load_config() -> Result<QueueConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource), Box::new(EnvSource)];
	if let Some(toml) = TomlSource::user() {
		sources.push(Box::new(toml));
	}
	load_from_sources(sources)
}

/// Load configuration with an explicit config file path.
pub fn load_config_with_file(path: impl AsRef<Path>) -> Result<QueueConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(path.as_ref())),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<QueueConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = QueueConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Resolve a merged layer and validate it.
pub fn finalize(layer: QueueConfigLayer) -> Result<QueueConfig, ConfigError> {
	let config = layer.finalize();
	config.validate()?;

	info!(
		server_url = %config.server_url,
		queue = %config.queue_name(),
		enabled = config.enabled,
		batch_size = config.submission_batch_size,
		max_attempts = config.queue_max_attempts,
		"queue configuration loaded"
	);

	Ok(config)
}
