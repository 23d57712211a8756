// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// Outcome of one event submission as seen by the collector.
///
/// The facet methods mirror the status codes the delivery policy cares
/// about; anything else that is not 2xx is treated as a transient failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
	pub status_code: u16,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl SubmissionResponse {
	pub fn from_status(status_code: u16) -> Self {
		Self {
			status_code,
			message: None,
		}
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		let message = message.into();
		self.message = if message.is_empty() { None } else { Some(message) };
		self
	}

	pub fn success(&self) -> bool {
		(200..300).contains(&self.status_code)
	}

	pub fn service_unavailable(&self) -> bool {
		self.status_code == 503
	}

	pub fn payment_required(&self) -> bool {
		self.status_code == 402
	}

	pub fn unable_to_authenticate(&self) -> bool {
		matches!(self.status_code, 401 | 403)
	}

	pub fn not_found(&self) -> bool {
		self.status_code == 404
	}

	pub fn bad_request(&self) -> bool {
		self.status_code == 400
	}

	pub fn request_entity_too_large(&self) -> bool {
		self.status_code == 413
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn facets_follow_status_code() {
		assert!(SubmissionResponse::from_status(202).success());
		assert!(SubmissionResponse::from_status(200).success());
		assert!(!SubmissionResponse::from_status(304).success());
		assert!(SubmissionResponse::from_status(401).unable_to_authenticate());
		assert!(SubmissionResponse::from_status(403).unable_to_authenticate());
		assert!(SubmissionResponse::from_status(402).payment_required());
		assert!(SubmissionResponse::from_status(413).request_entity_too_large());
		assert!(!SubmissionResponse::from_status(500).service_unavailable());
	}

	#[test]
	fn empty_message_is_dropped() {
		let response = SubmissionResponse::from_status(500).with_message("");
		assert_eq!(response.message, None);
		let response = SubmissionResponse::from_status(500).with_message("overloaded");
		assert_eq!(response.message.as_deref(), Some("overloaded"));
	}
}
