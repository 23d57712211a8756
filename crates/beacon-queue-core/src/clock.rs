// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Wall clock abstraction.
//!
//! Entry ages, lock staleness and suspend windows are all computed against a
//! [`Clock`] so tests can move time forward without sleeping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Shared, dynamically dispatched clock.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Mutex::new(start),
		}
	}

	/// Starts the clock at the current system time.
	pub fn starting_now() -> Self {
		Self::new(Utc::now())
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
		*now += to_chrono(by);
	}

	pub fn set(&self, to: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(|e| e.into_inner())
	}
}

/// Converts a std duration into a chrono one, saturating at one hundred years.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
	chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn manual_clock_only_moves_when_advanced() {
		let start = Utc::now();
		let clock = ManualClock::new(start);
		assert_eq!(clock.now(), start);

		clock.advance(Duration::from_secs(90));
		assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
	}

	#[test]
	fn to_chrono_saturates_huge_durations() {
		let huge = to_chrono(Duration::from_secs(u64::MAX));
		assert_eq!(huge, chrono::Duration::days(36_500));
	}
}
