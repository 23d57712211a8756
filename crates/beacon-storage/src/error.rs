// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};

use beacon_queue_core::CoreError;
use thiserror::Error;

/// Failures inside a storage backend.
///
/// Queue operations never return these; they are logged and turned into a
/// conservative result by [`crate::ObjectStorage`].
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("I/O error on {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid object path: {0:?}")]
	InvalidPath(String),

	#[error("codec error: {0}")]
	Codec(#[from] CoreError),

	#[error("could not determine XDG data directory")]
	NoDataDir,

	#[error("blocking task failed: {0}")]
	Task(#[from] tokio::task::JoinError),
}

impl StorageError {
	pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
		Self::Io {
			path: path.as_ref().to_path_buf(),
			source,
		}
	}
}

pub type Result<T> = std::result::Result<T, StorageError>;
