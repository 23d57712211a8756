// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `beacon` command line interface.

mod commands;

use std::path::PathBuf;

use beacon_queue::EventQueue;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Beacon - durable telemetry queue.
#[derive(Parser, Debug)]
#[command(name = "beacon", about = "Durable telemetry queue for the beacon collector", version)]
struct Args {
	/// Config file (defaults to $XDG_CONFIG_HOME/beacon/config.toml)
	#[arg(long, global = true, env = "BEACON_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Store an event for delivery
	Enqueue(commands::EnqueueArgs),
	/// Run one processing pass and print its summary
	Process,
	/// Show queue depth
	Status,
	/// Delete every stored entry
	Purge,
	/// Unlock entries left locked by a crashed worker
	ReleaseLocks(commands::ReleaseLocksArgs),
	/// Print the resolved configuration
	Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => beacon_queue::load_config_with_file(path)?,
		None => beacon_queue::load_config()?,
	};

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.log_level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	if let Command::Config = args.command {
		commands::handle_config(&config);
		return Ok(());
	}

	let queue = EventQueue::builder().config(config).build()?;

	match args.command {
		Command::Enqueue(enqueue) => commands::handle_enqueue(enqueue, &queue).await,
		Command::Process => commands::handle_process(&queue).await,
		Command::Status => commands::handle_status(&queue).await,
		Command::Purge => commands::handle_purge(&queue).await,
		Command::ReleaseLocks(release) => commands::handle_release_locks(release, &queue).await,
		Command::Config => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use beacon_queue_core::EventType;

	#[test]
	fn parses_enqueue_with_repeated_tags() {
		let args = Args::try_parse_from([
			"beacon",
			"enqueue",
			"--type",
			"error",
			"--message",
			"disk full",
			"--tag",
			"a",
			"--tag",
			"b",
		])
		.unwrap();

		let Command::Enqueue(enqueue) = args.command else {
			panic!("expected enqueue");
		};
		assert_eq!(enqueue.event_type, EventType::Error);
		assert_eq!(enqueue.tags, vec!["a", "b"]);
		assert_eq!(enqueue.source, None);
	}

	#[test]
	fn rejects_unknown_event_type() {
		let result = Args::try_parse_from(["beacon", "enqueue", "--type", "metric", "--message", "x"]);
		assert!(result.is_err());
	}

	#[test]
	fn config_flag_is_global() {
		let args = Args::try_parse_from(["beacon", "status", "--config", "/tmp/beacon.toml"]).unwrap();
		assert_eq!(args.config, Some(PathBuf::from("/tmp/beacon.toml")));
		assert!(matches!(args.command, Command::Status));
	}

	#[test]
	fn release_locks_threshold_is_optional() {
		let args = Args::try_parse_from(["beacon", "release-locks"]).unwrap();
		let Command::ReleaseLocks(release) = args.command else {
			panic!("expected release-locks");
		};
		assert_eq!(release.older_than_secs, None);
	}
}
