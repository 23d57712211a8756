// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Suspend and discard windows.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::to_chrono;
use crate::policy::SuspendKind;

/// Deadlines during which delivery is skipped and new events are dropped.
///
/// Both windows are open while `now` is strictly before the deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuspendState {
	pub suspend_until: Option<DateTime<Utc>>,
	pub discard_until: Option<DateTime<Utc>>,
}

impl SuspendState {
	pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
		self.suspend_until.is_some_and(|until| now < until)
	}

	pub fn is_discarding(&self, now: DateTime<Utc>) -> bool {
		self.discard_until.is_some_and(|until| now < until)
	}

	/// Opens the suspend window for `duration`, and the discard window too
	/// when `discard_future` is set. Returns the new suspend deadline.
	pub fn suspend(
		&mut self,
		now: DateTime<Utc>,
		duration: Duration,
		discard_future: bool,
	) -> DateTime<Utc> {
		let until = now + to_chrono(duration);
		self.suspend_until = Some(until);
		if discard_future {
			self.discard_until = Some(until);
		}
		until
	}

	pub fn clear(&mut self) {
		*self = Self::default();
	}
}

/// How long each kind of failure suspends delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendDurations {
	/// Service unavailable, payment required, unclassified and transport failures.
	pub transient: Duration,
	/// Rejected credentials.
	pub auth: Duration,
	/// Not found or bad request, usually a wrong server URL.
	pub not_found: Duration,
}

impl Default for SuspendDurations {
	fn default() -> Self {
		Self {
			transient: Duration::from_secs(5 * 60),
			auth: Duration::from_secs(15 * 60),
			not_found: Duration::from_secs(4 * 60 * 60),
		}
	}
}

impl SuspendDurations {
	pub fn duration_for(&self, kind: SuspendKind) -> Duration {
		match kind {
			SuspendKind::Transient => self.transient,
			SuspendKind::Auth => self.auth,
			SuspendKind::NotFound => self.not_found,
		}
	}
}
