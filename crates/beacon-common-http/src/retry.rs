// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Exponential backoff for requests that never got a response.
//!
//! HTTP statuses are not retried here; the delivery policy owns those.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(250),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// A single attempt, no retries.
	pub fn no_retry() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}

	fn delay_for(&self, attempt: u32) -> Duration {
		let exponential = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
		let capped = exponential.min(self.max_delay.as_secs_f64());

		let delay = if self.jitter {
			capped * (0.5 + fastrand::f64())
		} else {
			capped
		};

		Duration::from_secs_f64(delay.max(0.0))
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		self.status().is_none() && (self.is_timeout() || self.is_connect() || self.is_request())
	}
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or
/// `cfg.max_attempts` attempts have been made.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut attempt = 0;

	loop {
		let err = match f().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};
		attempt += 1;

		if !err.is_retryable() {
			debug!(error = %err, attempt, "request failed, not retryable");
			return Err(err);
		}

		if attempt >= cfg.max_attempts {
			warn!(
				error = %err,
				attempt,
				max_attempts = cfg.max_attempts,
				"request failed, retries exhausted"
			);
			return Err(err);
		}

		let delay = cfg.delay_for(attempt - 1);
		debug!(
			error = %err,
			attempt,
			delay_ms = delay.as_millis() as u64,
			"request failed, backing off"
		);
		tokio::time::sleep(delay).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fmt;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	#[derive(Debug)]
	struct FakeError {
		retryable: bool,
	}

	impl fmt::Display for FakeError {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "fake error (retryable: {})", self.retryable)
		}
	}

	impl RetryableError for FakeError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	fn fast_config(max_attempts: u32) -> RetryConfig {
		RetryConfig {
			max_attempts,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(5),
			backoff_factor: 2.0,
			jitter: false,
		}
	}

	#[tokio::test]
	async fn non_retryable_error_is_returned_after_one_attempt() {
		let calls = Arc::new(AtomicU32::new(0));

		let result: Result<(), FakeError> = retry(&fast_config(5), || {
			let calls = Arc::clone(&calls);
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(FakeError { retryable: false })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn retryable_error_stops_at_max_attempts() {
		let calls = Arc::new(AtomicU32::new(0));

		let result: Result<(), FakeError> = retry(&fast_config(3), || {
			let calls = Arc::clone(&calls);
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(FakeError { retryable: true })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn recovers_after_transient_failures() {
		let calls = Arc::new(AtomicU32::new(0));

		let result: Result<u32, FakeError> = retry(&fast_config(5), || {
			let calls = Arc::clone(&calls);
			async move {
				let n = calls.fetch_add(1, Ordering::SeqCst);
				if n < 2 {
					Err(FakeError { retryable: true })
				} else {
					Ok(n)
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), 2);
	}

	#[test]
	fn delay_grows_and_is_capped() {
		let cfg = RetryConfig {
			max_attempts: 10,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_secs(1),
			backoff_factor: 2.0,
			jitter: false,
		};

		assert_eq!(cfg.delay_for(0).as_millis(), 100);
		assert_eq!(cfg.delay_for(1).as_millis(), 200);
		assert_eq!(cfg.delay_for(8), Duration::from_secs(1));
	}

	#[test]
	fn jitter_stays_within_half_to_one_and_a_half() {
		let cfg = RetryConfig {
			jitter: true,
			..RetryConfig::default()
		};
		for _ in 0..50 {
			let delay = cfg.delay_for(0).as_secs_f64();
			assert!((0.125..=0.375).contains(&delay), "delay {delay}");
		}
	}
}
