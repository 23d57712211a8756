// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Durable telemetry delivery.
//!
//! Events are written to object storage as soon as they are enqueued and
//! delivered to the collector in batches by an [`EventQueue`]. Delivery
//! failures are classified by a fixed response policy that decides whether
//! a batch is kept, dropped or shrunk, and whether the queue backs off.

pub mod config;
pub mod error;
pub mod hook;
pub mod queue;
pub mod submission;
mod timer;

pub use config::{
	finalize, load_config, load_config_with_file, ApiKey, ConfigError, ConfigSource, QueueConfig,
	QueueConfigLayer,
};
pub use error::{QueueError, Result};
pub use hook::{EventsPosted, EventsPostedHook};
pub use queue::{EventQueue, EventQueueBuilder, PassHandle, PassSummary, SkipReason};
pub use submission::{HttpSubmissionClient, SubmissionClient, SubmissionError, EVENTS_PATH};
