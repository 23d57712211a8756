// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use super::error::ConfigError;
use super::layer::QueueConfigLayer;
use super::ApiKey;

/// Source precedence levels (higher overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<QueueConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<QueueConfigLayer, ConfigError> {
		Ok(QueueConfigLayer::default())
	}
}

/// TOML file source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `$XDG_CONFIG_HOME/beacon/config.toml`, if a config directory exists.
	pub fn user() -> Option<Self> {
		dirs::config_dir().map(|dir| Self::new(dir.join("beacon").join("config.toml")))
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<QueueConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(QueueConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `BEACON_<FIELD>`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<QueueConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_layer(&|name: &str| std::env::var(name).ok())
	}
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_var(lookup: Lookup<'_>, name: &str) -> Option<String> {
	lookup(name).filter(|s| !s.is_empty())
}

fn env_bool(lookup: Lookup<'_>, name: &str) -> Option<bool> {
	env_var(lookup, name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(lookup: Lookup<'_>, name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(lookup, name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {} value '{v}'", std::any::type_name::<T>()),
		}),
		None => Ok(None),
	}
}

fn load_layer(lookup: Lookup<'_>) -> Result<QueueConfigLayer, ConfigError> {
	Ok(QueueConfigLayer {
		server_url: env_var(lookup, "BEACON_SERVER_URL"),
		api_key: env_var(lookup, "BEACON_API_KEY").map(ApiKey::new),
		enabled: env_bool(lookup, "BEACON_ENABLED"),
		storage_path: env_var(lookup, "BEACON_STORAGE_PATH").map(PathBuf::from),
		queue_max_age_secs: env_parse(lookup, "BEACON_QUEUE_MAX_AGE_SECS")?,
		queue_max_attempts: env_parse(lookup, "BEACON_QUEUE_MAX_ATTEMPTS")?,
		submission_batch_size: env_parse(lookup, "BEACON_SUBMISSION_BATCH_SIZE")?,
		processing_interval_secs: env_parse(lookup, "BEACON_PROCESSING_INTERVAL_SECS")?,
		stale_lock_after_secs: env_parse(lookup, "BEACON_STALE_LOCK_AFTER_SECS")?,
		request_timeout_secs: env_parse(lookup, "BEACON_REQUEST_TIMEOUT_SECS")?,
		suspend_transient_secs: env_parse(lookup, "BEACON_SUSPEND_TRANSIENT_SECS")?,
		suspend_auth_secs: env_parse(lookup, "BEACON_SUSPEND_AUTH_SECS")?,
		suspend_not_found_secs: env_parse(lookup, "BEACON_SUSPEND_NOT_FOUND_SECS")?,
		log_level: env_var(lookup, "BEACON_LOG_LEVEL"),
	})
}
