// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for building an event queue.

use beacon_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::submission::SubmissionError;

/// Result type alias for queue construction.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised while building an [`crate::EventQueue`].
///
/// Once built, the queue never fails outward: storage and delivery problems
/// are logged and retried on a later pass.
#[derive(Debug, Error)]
pub enum QueueError {
	#[error("invalid configuration: {0}")]
	Config(#[from] ConfigError),

	#[error("storage unavailable: {0}")]
	Storage(#[from] StorageError),

	#[error("submission client unavailable: {0}")]
	Submission(#[from] SubmissionError),
}
