// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Event envelope and the codec used to persist it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Kind of telemetry carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	Error,
	Log,
	Usage,
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Error => write!(f, "error"),
			Self::Log => write!(f, "log"),
			Self::Usage => write!(f, "usage"),
		}
	}
}

impl FromStr for EventType {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"error" => Ok(Self::Error),
			"log" => Ok(Self::Log),
			"usage" => Ok(Self::Usage),
			other => Err(CoreError::UnknownEventType(other.to_string())),
		}
	}
}

/// A single telemetry event handed to the queue by application code.
///
/// The queue treats the payload as opaque; only [`EventSerializer`] looks
/// inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	#[serde(rename = "type")]
	pub event_type: EventType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub date: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tags: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reference_id: Option<String>,
	#[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
	pub data: serde_json::Map<String, serde_json::Value>,
}

impl Event {
	pub fn new(event_type: EventType) -> Self {
		Self {
			event_type,
			source: None,
			message: None,
			date: Utc::now(),
			tags: Vec::new(),
			reference_id: None,
			data: serde_json::Map::new(),
		}
	}

	pub fn error(message: impl Into<String>) -> Self {
		Self::new(EventType::Error).with_message(message)
	}

	pub fn log(source: impl Into<String>, message: impl Into<String>) -> Self {
		Self::new(EventType::Log)
			.with_source(source)
			.with_message(message)
	}

	/// A feature usage event; the feature name travels as the source.
	pub fn usage(feature: impl Into<String>) -> Self {
		Self::new(EventType::Usage).with_source(feature)
	}

	pub fn with_source(mut self, source: impl Into<String>) -> Self {
		self.source = Some(source.into());
		self
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}

	pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
		self.date = date;
		self
	}

	pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
		self.tags.push(tag.into());
		self
	}

	pub fn with_reference_id(mut self, id: impl Into<String>) -> Self {
		self.reference_id = Some(id.into());
		self
	}

	pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.data.insert(key.into(), value);
		self
	}
}

/// Turns events into bytes and back.
pub trait EventSerializer: Send + Sync {
	/// File extension used for entries written with this codec.
	fn extension(&self) -> &str;

	fn serialize(&self, event: &Event) -> Result<Vec<u8>>;

	fn deserialize(&self, bytes: &[u8]) -> Result<Event>;
}

/// JSON codec, one document per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventSerializer;

impl EventSerializer for JsonEventSerializer {
	fn extension(&self) -> &str {
		"json"
	}

	fn serialize(&self, event: &Event) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(event)?)
	}

	fn deserialize(&self, bytes: &[u8]) -> Result<Event> {
		Ok(serde_json::from_slice(bytes)?)
	}
}
