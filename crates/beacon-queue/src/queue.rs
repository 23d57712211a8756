// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Queue coordinator.
//!
//! [`EventQueue`] persists events through an [`ObjectStorage`], drains them
//! in batches to a [`SubmissionClient`] and applies the response policy to
//! each batch. At most one processing pass runs per queue at a time; callers
//! arriving while a pass is running join it instead of starting another.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use beacon_queue_core::{
	decide, Classification, Event, PolicyDecision, SharedClock, StoredItem, SubmissionResponse,
	SuspendState, SystemClock,
};
use beacon_storage::{EntryRead, FolderObjectStorage, ObjectStorage, QueueStats};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::QueueConfig;
use crate::error::Result;
use crate::hook::{EventsPosted, EventsPostedHook};
use crate::submission::{HttpSubmissionClient, SubmissionClient};
use crate::timer::{TimerState, TimerTask};

/// Why a pass did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	Disabled,
	Suspended,
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Disabled => f.write_str("disabled"),
			Self::Suspended => f.write_str("suspended"),
		}
	}
}

/// Outcome of one processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
	pub skipped: Option<SkipReason>,
	/// Batches submitted.
	pub batches: usize,
	/// Entries deleted after a successful submission.
	pub delivered: usize,
	/// Entries deleted without delivery: rejected batches and undecodable entries.
	pub dropped: usize,
	/// Entries left in place because the backend failed to read them.
	pub deferred: usize,
	/// Entries released for a later retry.
	pub released: usize,
	/// Entries removed by the age and attempt limits before assembly.
	pub expired: usize,
	pub stale_released: usize,
	/// Entries removed by a purging suspend.
	pub purged: usize,
	pub last_classification: Option<Classification>,
}

impl PassSummary {
	fn skipped(reason: SkipReason) -> Self {
		Self {
			skipped: Some(reason),
			..Self::default()
		}
	}
}

/// Handle to a running or finished processing pass.
#[derive(Debug, Clone)]
pub struct PassHandle {
	rx: watch::Receiver<Option<PassSummary>>,
}

impl PassHandle {
	/// Waits for the pass to finish.
	pub async fn wait(mut self) -> PassSummary {
		let summary = match self.rx.wait_for(Option::is_some).await {
			Ok(value) => (*value).clone(),
			Err(_) => None,
		};

		summary.unwrap_or_else(|| {
			warn!("processing pass ended without a summary");
			PassSummary::default()
		})
	}

	/// Whether both handles refer to the same pass.
	pub fn same_pass(&self, other: &PassHandle) -> bool {
		self.rx.same_channel(&other.rx)
	}
}

pub(crate) struct Inner {
	config: QueueConfig,
	queue_name: String,
	storage: Arc<dyn ObjectStorage>,
	client: Arc<dyn SubmissionClient>,
	clock: SharedClock,
	hook: Option<Arc<dyn EventsPostedHook>>,
	batch_size: AtomicUsize,
	suspend: Mutex<SuspendState>,
	in_flight: Mutex<Option<watch::Receiver<Option<PassSummary>>>>,
	timer: Arc<TimerState>,
	timer_task: Mutex<Option<TimerTask>>,
	shut_down: AtomicBool,
}

/// Clears the in-flight slot when a pass ends, including by panic.
struct InFlightSlot<'a>(&'a Inner);

impl Drop for InFlightSlot<'_> {
	fn drop(&mut self) {
		lock(&self.0.in_flight).take();
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Builder for [`EventQueue`].
pub struct EventQueueBuilder {
	config: Option<QueueConfig>,
	storage: Option<Arc<dyn ObjectStorage>>,
	client: Option<Arc<dyn SubmissionClient>>,
	clock: Option<SharedClock>,
	hook: Option<Arc<dyn EventsPostedHook>>,
}

impl EventQueueBuilder {
	pub fn new() -> Self {
		Self {
			config: None,
			storage: None,
			client: None,
			clock: None,
			hook: None,
		}
	}

	pub fn config(mut self, config: QueueConfig) -> Self {
		self.config = Some(config);
		self
	}

	/// Overrides the storage backend.
	///
	/// The backend keeps its own clock; pass the same one to [`Self::clock`]
	/// when time is controlled by the caller.
	pub fn storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Overrides the HTTP client built from the configuration.
	pub fn submission_client(mut self, client: Arc<dyn SubmissionClient>) -> Self {
		self.client = Some(client);
		self
	}

	pub fn clock(mut self, clock: SharedClock) -> Self {
		self.clock = Some(clock);
		self
	}

	pub fn events_posted_hook(mut self, hook: impl EventsPostedHook + 'static) -> Self {
		self.hook = Some(Arc::new(hook));
		self
	}

	pub fn build(self) -> Result<EventQueue> {
		let config = self.config.unwrap_or_default();
		config.validate()?;

		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

		let storage: Arc<dyn ObjectStorage> = match self.storage {
			Some(storage) => storage,
			None => {
				let folder = match &config.storage_path {
					Some(path) => FolderObjectStorage::new(path.clone()),
					None => FolderObjectStorage::from_xdg()?,
				};
				Arc::new(folder.with_clock(Arc::clone(&clock)))
			}
		};

		let client: Arc<dyn SubmissionClient> = match self.client {
			Some(client) => client,
			None => Arc::new(HttpSubmissionClient::from_config(&config)?),
		};

		let queue_name = config.queue_name();
		info!(
			queue = %queue_name,
			batch_size = config.submission_batch_size,
			enabled = config.enabled,
			"event queue created"
		);

		Ok(EventQueue {
			inner: Arc::new(Inner {
				queue_name,
				storage,
				client,
				clock,
				hook: self.hook,
				batch_size: AtomicUsize::new(config.submission_batch_size),
				suspend: Mutex::new(SuspendState::default()),
				in_flight: Mutex::new(None),
				timer: Arc::new(TimerState::new(config.processing_interval)),
				timer_task: Mutex::new(None),
				shut_down: AtomicBool::new(false),
				config,
			}),
		})
	}
}

impl Default for EventQueueBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Durable event queue for one collector project.
///
/// # Example
///
/// ```ignore
/// use beacon_queue::{load_config, EventQueue};
/// use beacon_queue_core::Event;
///
/// let queue = EventQueue::builder().config(load_config()?).build()?;
/// queue.start();
///
/// queue.enqueue(&Event::error("disk full")).await;
///
/// // Flushes what it can, then stops the timer.
/// queue.shutdown().await;
/// ```
#[derive(Clone)]
pub struct EventQueue {
	inner: Arc<Inner>,
}

impl EventQueue {
	pub fn builder() -> EventQueueBuilder {
		EventQueueBuilder::new()
	}

	pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
		Self { inner }
	}

	pub fn queue_name(&self) -> &str {
		&self.inner.queue_name
	}

	pub fn config(&self) -> &QueueConfig {
		&self.inner.config
	}

	pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
		&self.inner.storage
	}

	/// Current batch size. Starts at the configured size and only shrinks.
	pub fn batch_size(&self) -> usize {
		self.inner.batch_size.load(Ordering::SeqCst)
	}

	pub fn suspend_state(&self) -> SuspendState {
		*lock(&self.inner.suspend)
	}

	pub fn is_suspended(&self) -> bool {
		self.suspend_state().is_suspended(self.now())
	}

	pub fn is_discarding(&self) -> bool {
		self.suspend_state().is_discarding(self.now())
	}

	pub async fn stats(&self) -> QueueStats {
		self.inner.storage.queue_stats(&self.inner.queue_name).await
	}

	fn now(&self) -> DateTime<Utc> {
		self.inner.clock.now()
	}

	/// Persists `event` for delivery. Returns false when the event was
	/// discarded or could not be stored.
	pub async fn enqueue(&self, event: &Event) -> bool {
		if self.is_discarding() {
			info!(
				queue = %self.inner.queue_name,
				event_type = %event.event_type,
				"discarding event while queue is suspended"
			);
			return false;
		}

		self
			.inner
			.storage
			.enqueue(&self.inner.queue_name, event)
			.await
			.is_some()
	}

	/// Starts a processing pass, or joins the one already running.
	///
	/// Must be called from within a tokio runtime.
	pub fn process(&self) -> PassHandle {
		let mut slot = lock(&self.inner.in_flight);
		if let Some(rx) = slot.as_ref() {
			trace!(queue = %self.inner.queue_name, "joining in-flight processing pass");
			return PassHandle { rx: rx.clone() };
		}

		let (tx, rx) = watch::channel(None);
		*slot = Some(rx.clone());
		drop(slot);

		let queue = self.clone();
		tokio::spawn(async move {
			let summary = {
				let _slot = InFlightSlot(&queue.inner);
				queue.run_pass().await
			};
			let _ = tx.send(Some(summary));
		});

		PassHandle { rx }
	}

	async fn run_pass(&self) -> PassSummary {
		let inner = &*self.inner;
		let queue = inner.queue_name.as_str();

		if !inner.config.enabled {
			debug!(queue, "processing disabled, skipping pass");
			return PassSummary::skipped(SkipReason::Disabled);
		}

		if self.is_suspended() {
			debug!(
				queue,
				suspend_until = ?self.suspend_state().suspend_until,
				"queue suspended, skipping pass"
			);
			return PassSummary::skipped(SkipReason::Suspended);
		}

		let mut summary = PassSummary {
			expired: inner
				.storage
				.cleanup_expired(queue, inner.config.queue_max_age, inner.config.queue_max_attempts)
				.await,
			stale_released: inner
				.storage
				.release_stale_locks(queue, inner.config.stale_lock_after)
				.await,
			..PassSummary::default()
		};

		// Entries enqueued while this pass runs wait for the next one.
		let max_created = self.now();

		loop {
			let batch_size = self.batch_size();
			let listed = inner
				.storage
				.list_queue_entries(queue, Some(batch_size), Some(max_created))
				.await;
			if listed.is_empty() {
				break;
			}

			let batch = self.claim(listed).await;
			summary.dropped += batch.undecodable;
			summary.deferred += batch.deferred;
			if batch.items.is_empty() {
				if batch.undecodable > 0 {
					continue;
				}
				break;
			}

			summary.batches += 1;
			let count = batch.events.len();

			let (response, decision) = match inner.client.post_events(&batch.events).await {
				Ok(response) => {
					let decision = decide(&response, batch_size);
					(Some(response), decision)
				}
				Err(e) => {
					warn!(queue, count, error = %e, "event submission failed");
					(None, PolicyDecision::transport_failure())
				}
			};

			self.log_decision(&decision, response.as_ref(), count);
			summary.last_classification = Some(decision.classification);

			if let Some(new_size) = decision.new_batch_size {
				inner.batch_size.store(new_size, Ordering::SeqCst);
			}

			if decision.delete_batch {
				let deleted = inner.storage.delete_batch(&batch.items).await;
				if decision.classification == Classification::Delivered {
					summary.delivered += deleted;
				} else {
					summary.dropped += deleted;
				}
			} else {
				summary.released += inner.storage.release_batch(&batch.items).await;
			}

			if let Some(action) = decision.suspend {
				summary.purged += self
					.suspend(
						inner.config.suspend.duration_for(action.kind),
						action.discard_future,
						action.purge_now,
					)
					.await;
			}

			if let Some(hook) = &inner.hook {
				hook
					.on_events_posted(EventsPosted {
						queue: queue.to_string(),
						event_count: count,
						response,
						classification: decision.classification,
						deleted: decision.delete_batch,
					})
					.await;
			}

			if !decision.delete_batch || self.is_suspended() {
				break;
			}
		}

		debug!(
			queue,
			batches = summary.batches,
			delivered = summary.delivered,
			dropped = summary.dropped,
			deferred = summary.deferred,
			released = summary.released,
			expired = summary.expired,
			"processing pass complete"
		);

		summary
	}

	/// Locks and decodes listed entries. Entries lost to another worker are
	/// skipped, undecodable ones are deleted, and ones the backend failed to
	/// read are unlocked untouched for a later pass.
	async fn claim(&self, listed: Vec<StoredItem>) -> Batch {
		let storage = &self.inner.storage;
		let mut batch = Batch::with_capacity(listed.len());

		for item in listed {
			let Some(locked) = storage.lock(&item).await else {
				continue;
			};

			match storage.read_entry(&locked).await {
				EntryRead::Event(event) => {
					batch.items.push(locked);
					batch.events.push(event);
				}
				EntryRead::Missing => {}
				EntryRead::Undecodable => {
					error!(
						queue = %self.inner.queue_name,
						path = %locked.path,
						"dropping undecodable queue entry"
					);
					if storage.delete(&locked.path).await {
						batch.undecodable += 1;
					}
				}
				EntryRead::Unavailable => {
					warn!(
						queue = %self.inner.queue_name,
						path = %locked.path,
						"queue entry unreadable, leaving it for a later pass"
					);
					storage.unlock(&locked).await;
					batch.deferred += 1;
				}
			}
		}

		batch
	}

	fn log_decision(&self, decision: &PolicyDecision, response: Option<&SubmissionResponse>, count: usize) {
		let queue = self.inner.queue_name.as_str();
		let status = response.map(|r| r.status_code);
		let detail = response.and_then(|r| r.message.as_deref()).unwrap_or_default();

		match decision.classification {
			Classification::Delivered => info!(queue, count, "delivered event batch"),
			Classification::ServiceUnavailable => {
				warn!(queue, count, detail, "collector unavailable, keeping batch")
			}
			Classification::PaymentRequired => {
				warn!(queue, count, detail, "collector requires payment, discarding events")
			}
			Classification::Unauthenticated => warn!(
				queue,
				count,
				status = ?status,
				"collector rejected the api key, dropping batch"
			),
			Classification::ClientConfiguration => warn!(
				queue,
				count,
				status = ?status,
				detail,
				"collector rejected the request, check the server url; dropping batch"
			),
			Classification::TooLargeShrink => warn!(
				queue,
				count,
				new_batch_size = ?decision.new_batch_size,
				"batch too large, shrinking"
			),
			Classification::TooLargeDropped => {
				error!(queue, "single event exceeds the collector size limit, dropping it")
			}
			Classification::Transient => warn!(
				queue,
				count,
				status = ?status,
				"submission failed, batch will be retried"
			),
		}
	}

	/// Skips processing for `duration`. With `discard_future`, new events are
	/// dropped for the same window; with `purge_now`, every stored entry is
	/// deleted. Returns the number of purged entries.
	pub async fn suspend(&self, duration: Duration, discard_future: bool, purge_now: bool) -> usize {
		let queue = self.inner.queue_name.as_str();
		let now = self.now();
		let until = lock(&self.inner.suspend).suspend(now, duration, discard_future);

		warn!(
			queue,
			until = %until,
			discard_future,
			purge_now,
			"suspending event processing"
		);
		self.inner.timer.reschedule_after(duration);

		if !purge_now {
			return 0;
		}

		self
			.inner
			.storage
			.cleanup_expired(queue, Duration::ZERO, self.inner.config.queue_max_attempts)
			.await
	}

	/// Closes both windows and schedules an immediate pass.
	pub fn resume(&self) {
		lock(&self.inner.suspend).clear();
		info!(queue = %self.inner.queue_name, "event processing resumed");
		self.inner.timer.reschedule_after(Duration::ZERO);
	}

	/// Starts the processing timer. Calling it again, or after
	/// [`Self::shutdown`], has no effect. Must be called from within a tokio
	/// runtime.
	pub fn start(&self) {
		if self.inner.shut_down.load(Ordering::SeqCst) {
			return;
		}

		let mut task = lock(&self.inner.timer_task);
		if task.is_some() {
			return;
		}

		*task = Some(TimerTask::spawn(
			Arc::downgrade(&self.inner),
			Arc::clone(&self.inner.timer),
		));

		info!(
			queue = %self.inner.queue_name,
			interval_ms = self.inner.config.processing_interval.as_millis() as u64,
			"event queue started"
		);
	}

	/// Runs a final pass and stops the timer. Idempotent.
	pub async fn shutdown(&self) {
		if self.inner.shut_down.swap(true, Ordering::SeqCst) {
			return;
		}

		info!(queue = %self.inner.queue_name, "shutting down event queue");
		let summary = self.process().wait().await;
		debug!(
			queue = %self.inner.queue_name,
			delivered = summary.delivered,
			released = summary.released,
			"final processing pass complete"
		);

		let task = lock(&self.inner.timer_task).take();
		if let Some(task) = task {
			task.stop().await;
		}
	}
}

struct Batch {
	items: Vec<StoredItem>,
	events: Vec<Event>,
	undecodable: usize,
	deferred: usize,
}

impl Batch {
	fn with_capacity(capacity: usize) -> Self {
		Self {
			items: Vec::with_capacity(capacity),
			events: Vec::with_capacity(capacity),
			undecodable: 0,
			deferred: 0,
		}
	}
}
