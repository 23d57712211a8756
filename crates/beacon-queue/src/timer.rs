// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Periodic processing tick with one-shot reschedules.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::queue::{EventQueue, Inner};

/// Next deadline of the processing timer.
pub(crate) struct TimerState {
	interval: Duration,
	next_tick: Mutex<Instant>,
	reschedule: Notify,
}

impl TimerState {
	pub(crate) fn new(interval: Duration) -> Self {
		Self {
			interval,
			next_tick: Mutex::new(Instant::now() + interval),
			reschedule: Notify::new(),
		}
	}

	/// Moves the next tick to `delay` from now and wakes the timer task.
	pub(crate) fn reschedule_after(&self, delay: Duration) {
		*self.next_tick.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now() + delay;
		self.reschedule.notify_one();
	}

	fn deadline(&self) -> Instant {
		*self.next_tick.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn advance(&self) {
		*self.next_tick.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now() + self.interval;
	}
}

/// A running timer task and the switch that stops it.
pub(crate) struct TimerTask {
	stop: watch::Sender<bool>,
	handle: JoinHandle<()>,
}

impl TimerTask {
	/// Spawns the tick loop. The task only holds a weak reference to the
	/// queue and exits once every handle has been dropped.
	pub(crate) fn spawn(queue: Weak<Inner>, state: Arc<TimerState>) -> Self {
		let (stop, mut stopped) = watch::channel(false);

		let handle = tokio::spawn(async move {
			debug!(interval_ms = state.interval.as_millis() as u64, "processing timer started");

			loop {
				tokio::select! {
					_ = tokio::time::sleep_until(state.deadline()) => {}
					_ = state.reschedule.notified() => continue,
					_ = stopped.changed() => break,
				}

				state.advance();

				let Some(inner) = queue.upgrade() else {
					break;
				};
				EventQueue::from_inner(inner).process().wait().await;
			}

			info!("processing timer stopped");
		});

		Self { stop, handle }
	}

	pub(crate) async fn stop(self) {
		let _ = self.stop.send(true);
		if let Err(e) = self.handle.await {
			debug!(error = %e, "processing timer task ended abnormally");
		}
	}
}
