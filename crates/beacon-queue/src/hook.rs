// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Notification hook for submitted batches.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use beacon_queue::{EventQueue, EventsPosted, EventsPostedHook};
//!
//! struct Metrics;
//!
//! #[async_trait]
//! impl EventsPostedHook for Metrics {
//!     async fn on_events_posted(&self, posted: EventsPosted) {
//!         println!("{} events -> {}", posted.event_count, posted.classification);
//!     }
//! }
//!
//! let queue = EventQueue::builder()
//!     .config(config)
//!     .events_posted_hook(Metrics)
//!     .build()?;
//! ```

use async_trait::async_trait;
use beacon_queue_core::{Classification, SubmissionResponse};

/// What happened to one submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsPosted {
	pub queue: String,
	pub event_count: usize,
	/// `None` when the request never produced a response.
	pub response: Option<SubmissionResponse>,
	pub classification: Classification,
	/// Whether the batch was deleted (true) or released for retry (false).
	pub deleted: bool,
}

/// Called after every submission attempt, on the processing task.
#[async_trait]
pub trait EventsPostedHook: Send + Sync {
	async fn on_events_posted(&self, posted: EventsPosted);
}
