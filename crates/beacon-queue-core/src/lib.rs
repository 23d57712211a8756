// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Core types for the beacon event delivery queue.
//!
//! This crate holds everything the storage layer and the queue coordinator
//! share without doing any I/O:
//!
//! - [`Event`] and the [`EventSerializer`] codec used to persist it
//! - [`QueueEntryName`], the file name convention that encodes attempt count
//!   and lock state, and [`StoredItem`]
//! - [`SuspendState`] and the default [`SuspendDurations`]
//! - [`SubmissionResponse`] and the response policy ([`decide`])
//! - [`Clock`] so time-dependent behaviour can be driven from tests

pub mod clock;
pub mod entry;
pub mod error;
pub mod event;
pub mod policy;
pub mod response;
pub mod suspend;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use entry::{queue_dir, QueueEntryName, StoredItem, LOCK_SUFFIX, QUEUE_DIR, TEMP_SUFFIX};
pub use error::{CoreError, Result};
pub use event::{Event, EventSerializer, EventType, JsonEventSerializer};
pub use policy::{
	decide, shrink_batch_size, Classification, PolicyDecision, SuspendAction, SuspendKind,
};
pub use response::SubmissionResponse;
pub use suspend::{SuspendDurations, SuspendState};
