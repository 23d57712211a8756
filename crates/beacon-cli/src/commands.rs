// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use beacon_queue::{EventQueue, QueueConfig};
use beacon_queue_core::{Event, EventType};
use beacon_storage::ObjectStorage;
use clap::Args;
use tracing::{info, instrument};

#[derive(Debug, Clone, Args)]
pub struct EnqueueArgs {
	/// Event type: error, log or usage
	#[arg(long = "type", default_value = "log")]
	pub event_type: EventType,

	#[arg(long)]
	pub message: String,

	#[arg(long)]
	pub source: Option<String>,

	/// May be repeated
	#[arg(long = "tag")]
	pub tags: Vec<String>,

	/// Correlates the event with an external record
	#[arg(long)]
	pub reference_id: Option<String>,
}

impl EnqueueArgs {
	fn to_event(&self) -> Event {
		let mut event = Event::new(self.event_type).with_message(self.message.clone());
		if let Some(source) = &self.source {
			event = event.with_source(source.clone());
		}
		for tag in &self.tags {
			event = event.with_tag(tag.clone());
		}
		if let Some(id) = &self.reference_id {
			event = event.with_reference_id(id.clone());
		}
		event
	}
}

#[derive(Debug, Clone, Args)]
pub struct ReleaseLocksArgs {
	/// Only unlock entries locked at least this long ago (defaults to the
	/// configured stale lock age)
	#[arg(long)]
	pub older_than_secs: Option<u64>,
}

#[instrument(skip(queue))]
pub async fn handle_enqueue(args: EnqueueArgs, queue: &EventQueue) -> anyhow::Result<()> {
	let event = args.to_event();
	if !queue.enqueue(&event).await {
		anyhow::bail!("event was not stored, see the log for details");
	}

	println!("queued {} event in queue {}", event.event_type, queue.queue_name());
	Ok(())
}

#[instrument(skip(queue))]
pub async fn handle_process(queue: &EventQueue) -> anyhow::Result<()> {
	let summary = queue.process().wait().await;

	if let Some(reason) = summary.skipped {
		println!("pass skipped: {reason}");
		return Ok(());
	}

	println!("batches:        {}", summary.batches);
	println!("delivered:      {}", summary.delivered);
	println!("dropped:        {}", summary.dropped);
	println!("deferred:       {}", summary.deferred);
	println!("released:       {}", summary.released);
	println!("expired:        {}", summary.expired);
	println!("stale released: {}", summary.stale_released);
	println!("purged:         {}", summary.purged);
	if let Some(classification) = summary.last_classification {
		println!("last outcome:   {classification}");
	}
	Ok(())
}

#[instrument(skip(queue))]
pub async fn handle_status(queue: &EventQueue) -> anyhow::Result<()> {
	let stats = queue.stats().await;

	println!("queue:    {}", queue.queue_name());
	println!("server:   {}", queue.config().server_url);
	println!("enabled:  {}", queue.config().enabled);
	println!("pending:  {}", stats.unlocked);
	println!("locked:   {}", stats.locked);
	println!("total:    {}", stats.total());
	Ok(())
}

#[instrument(skip(queue))]
pub async fn handle_purge(queue: &EventQueue) -> anyhow::Result<()> {
	let removed = queue
		.storage()
		.cleanup_expired(queue.queue_name(), Duration::ZERO, queue.config().queue_max_attempts)
		.await;

	info!(queue = %queue.queue_name(), removed, "purged queue");
	println!("removed {removed} entries");
	Ok(())
}

#[instrument(skip(queue))]
pub async fn handle_release_locks(args: ReleaseLocksArgs, queue: &EventQueue) -> anyhow::Result<()> {
	let older_than = args
		.older_than_secs
		.map_or(queue.config().stale_lock_after, Duration::from_secs);

	let released = queue
		.storage()
		.release_stale_locks(queue.queue_name(), older_than)
		.await;

	println!("released {released} locks");
	Ok(())
}

pub fn handle_config(config: &QueueConfig) {
	println!("server_url             = {}", config.server_url);
	println!(
		"api_key                = {}",
		if config.api_key.is_some() { "[REDACTED]" } else { "(none)" }
	);
	println!("queue                  = {}", config.queue_name());
	println!("enabled                = {}", config.enabled);
	match &config.storage_path {
		Some(path) => println!("storage_path           = {}", path.display()),
		None => println!("storage_path           = (xdg data dir)"),
	}
	println!("queue_max_age          = {}s", config.queue_max_age.as_secs());
	println!("queue_max_attempts     = {}", config.queue_max_attempts);
	println!("submission_batch_size  = {}", config.submission_batch_size);
	println!("processing_interval    = {}s", config.processing_interval.as_secs());
	println!("stale_lock_after       = {}s", config.stale_lock_after.as_secs());
	println!("request_timeout        = {}s", config.request_timeout.as_secs());
	println!("suspend_transient      = {}s", config.suspend.transient.as_secs());
	println!("suspend_auth           = {}s", config.suspend.auth.as_secs());
	println!("suspend_not_found      = {}s", config.suspend.not_found.as_secs());
	println!("log_level              = {}", config.log_level);
}
