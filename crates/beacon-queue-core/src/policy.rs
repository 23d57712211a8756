// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Response classification.
//!
//! Every submission outcome maps to exactly one [`PolicyDecision`]. Rows are
//! evaluated in priority order; the first matching facet wins.

use std::fmt;

use crate::response::SubmissionResponse;

/// Which configured suspend duration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspendKind {
	Transient,
	Auth,
	NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendAction {
	pub kind: SuspendKind,
	/// Drop newly enqueued events for the same window.
	pub discard_future: bool,
	/// Delete every stored entry right away.
	pub purge_now: bool,
}

impl SuspendAction {
	pub fn new(kind: SuspendKind) -> Self {
		Self {
			kind,
			discard_future: false,
			purge_now: false,
		}
	}
}

/// Why a decision was made. Used for logging and pass summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
	Delivered,
	ServiceUnavailable,
	PaymentRequired,
	Unauthenticated,
	ClientConfiguration,
	TooLargeShrink,
	TooLargeDropped,
	Transient,
}

impl fmt::Display for Classification {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Delivered => "delivered",
			Self::ServiceUnavailable => "service_unavailable",
			Self::PaymentRequired => "payment_required",
			Self::Unauthenticated => "unauthenticated",
			Self::ClientConfiguration => "client_configuration",
			Self::TooLargeShrink => "too_large_shrink",
			Self::TooLargeDropped => "too_large_dropped",
			Self::Transient => "transient",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
	pub classification: Classification,
	/// Delete the batch (true) or release it for a later retry (false).
	pub delete_batch: bool,
	pub suspend: Option<SuspendAction>,
	pub new_batch_size: Option<usize>,
}

impl PolicyDecision {
	fn new(classification: Classification, delete_batch: bool) -> Self {
		Self {
			classification,
			delete_batch,
			suspend: None,
			new_batch_size: None,
		}
	}

	fn suspending(mut self, action: SuspendAction) -> Self {
		self.suspend = Some(action);
		self
	}

	/// Decision for a submission that never produced a response.
	pub fn transport_failure() -> Self {
		Self::new(Classification::Transient, false).suspending(SuspendAction::new(SuspendKind::Transient))
	}
}

/// Classifies `response` for a batch submitted while the batch size was
/// `batch_size`.
pub fn decide(response: &SubmissionResponse, batch_size: usize) -> PolicyDecision {
	if response.success() {
		return PolicyDecision::new(Classification::Delivered, true);
	}

	if response.service_unavailable() {
		return PolicyDecision::new(Classification::ServiceUnavailable, false)
			.suspending(SuspendAction::new(SuspendKind::Transient));
	}

	if response.payment_required() {
		return PolicyDecision::new(Classification::PaymentRequired, true).suspending(SuspendAction {
			kind: SuspendKind::Transient,
			discard_future: true,
			purge_now: true,
		});
	}

	// Retrying with the same credentials cannot succeed, so the batch is dropped.
	if response.unable_to_authenticate() {
		return PolicyDecision::new(Classification::Unauthenticated, true)
			.suspending(SuspendAction::new(SuspendKind::Auth));
	}

	if response.not_found() || response.bad_request() {
		return PolicyDecision::new(Classification::ClientConfiguration, true)
			.suspending(SuspendAction::new(SuspendKind::NotFound));
	}

	if response.request_entity_too_large() {
		if batch_size > 1 {
			let mut decision = PolicyDecision::new(Classification::TooLargeShrink, false);
			decision.new_batch_size = Some(shrink_batch_size(batch_size));
			return decision;
		}
		return PolicyDecision::new(Classification::TooLargeDropped, true);
	}

	PolicyDecision::new(Classification::Transient, false).suspending(SuspendAction::new(SuspendKind::Transient))
}

/// `max(1, round(batch_size / 1.5))`, in integer arithmetic.
///
/// `2b / 3` never lands on a half, so rounding is unambiguous.
pub fn shrink_batch_size(batch_size: usize) -> usize {
	(batch_size.saturating_mul(2).saturating_add(1) / 3).max(1)
}
