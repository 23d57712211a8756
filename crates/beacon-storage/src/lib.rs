// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Object storage for the beacon event queue.
//!
//! [`ObjectStorage`] is a small path-addressed blob store. Queue entries are
//! blobs whose file name carries their attempt count and lock marker, so every
//! queue state change is a single atomic rename. Two backends are provided:
//!
//! - [`FolderObjectStorage`]: a directory that several processes may share
//! - [`InMemoryObjectStorage`]: process-local, for tests and ephemeral use

mod error;
mod folder;
mod memory;
mod store;

pub use error::{Result, StorageError};
pub use folder::FolderObjectStorage;
pub use memory::InMemoryObjectStorage;
pub use store::{EntryRead, ObjectStorage, QueueStats};
