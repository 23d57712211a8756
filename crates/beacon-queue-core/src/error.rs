// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for the queue core.

use thiserror::Error;

/// Errors raised by the pure queue types.
#[derive(Debug, Error)]
pub enum CoreError {
	/// A file name does not follow `<id>-<attempts>.<ext>[.x]`.
	#[error("invalid queue entry name: {0}")]
	InvalidEntryName(String),

	/// An event type string is not one of `error`, `log` or `usage`.
	#[error("unknown event type: {0}")]
	UnknownEventType(String),

	/// An event could not be encoded or decoded.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
