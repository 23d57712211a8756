// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Delivery of event batches to the collector.

use std::time::Duration;

use async_trait::async_trait;
use beacon_common_http::{retry, RetryConfig};
use beacon_queue_core::{Event, SubmissionResponse};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ApiKey, QueueConfig};

/// Path of the batch endpoint, relative to the server URL.
pub const EVENTS_PATH: &str = "/api/v2/events";

#[derive(Debug, Error)]
pub enum SubmissionError {
	/// The request never produced an HTTP response.
	#[error("transport error: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("submission failed: {0}")]
	Failed(String),
}

/// Sends a batch and reports the collector's answer.
///
/// Any HTTP status is an `Ok` response; `Err` is reserved for requests that
/// did not get one.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
	async fn post_events(&self, events: &[Event]) -> Result<SubmissionResponse, SubmissionError>;
}

/// Posts batches as a JSON array with bearer authentication.
pub struct HttpSubmissionClient {
	client: Client,
	endpoint: String,
	api_key: Option<ApiKey>,
	retry_config: RetryConfig,
}

impl HttpSubmissionClient {
	pub fn new(
		server_url: &str,
		api_key: Option<ApiKey>,
		timeout: Duration,
	) -> Result<Self, SubmissionError> {
		let client = beacon_common_http::new_client_with_timeout(timeout)?;
		let endpoint = format!("{}{EVENTS_PATH}", server_url.trim_end_matches('/'));

		info!(endpoint = %endpoint, "initialized submission client");

		Ok(Self {
			client,
			endpoint,
			api_key,
			retry_config: RetryConfig::default(),
		})
	}

	pub fn from_config(config: &QueueConfig) -> Result<Self, SubmissionError> {
		Self::new(&config.server_url, config.api_key.clone(), config.request_timeout)
	}

	pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
		self.retry_config = retry_config;
		self
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	fn request(&self, events: &[Event]) -> reqwest::RequestBuilder {
		let request = self.client.post(&self.endpoint).json(events);
		match &self.api_key {
			Some(key) => request.bearer_auth(key.expose()),
			None => request,
		}
	}
}

#[async_trait]
impl SubmissionClient for HttpSubmissionClient {
	async fn post_events(&self, events: &[Event]) -> Result<SubmissionResponse, SubmissionError> {
		let response = retry(&self.retry_config, || self.request(events).send()).await?;

		let status = response.status().as_u16();
		let message = response.text().await.unwrap_or_default();

		debug!(
			endpoint = %self.endpoint,
			status,
			count = events.len(),
			"posted event batch"
		);

		Ok(SubmissionResponse::from_status(status).with_message(message))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn client_for(server: &MockServer, key: Option<&str>) -> HttpSubmissionClient {
		HttpSubmissionClient::new(&server.uri(), key.map(ApiKey::new), Duration::from_secs(5))
			.unwrap()
			.with_retry_config(RetryConfig::no_retry())
	}

	#[tokio::test]
	async fn posts_json_array_with_bearer_auth() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path(EVENTS_PATH))
			.and(header("authorization", "Bearer key-123"))
			.and(header("content-type", "application/json"))
			.respond_with(ResponseTemplate::new(202))
			.expect(1)
			.mount(&server)
			.await;

		let client = client_for(&server, Some("key-123"));
		let events = vec![Event::error("a"), Event::log("svc", "b")];
		let response = client.post_events(&events).await.unwrap();

		assert!(response.success());
		assert_eq!(response.status_code, 202);

		let requests = server.received_requests().await.unwrap();
		let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
		assert_eq!(body.as_array().unwrap().len(), 2);
		assert_eq!(body[0]["type"], "error");
	}

	#[tokio::test]
	async fn error_statuses_are_responses_with_body_message() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path(EVENTS_PATH))
			.respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
			.mount(&server)
			.await;

		let response = client_for(&server, None)
			.post_events(&[Event::error("x")])
			.await
			.unwrap();

		assert!(response.service_unavailable());
		assert_eq!(response.message.as_deref(), Some("maintenance"));
	}

	#[tokio::test]
	async fn unreachable_server_is_transport_error() {
		let port = {
			let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
			listener.local_addr().unwrap().port()
		};

		let client = HttpSubmissionClient::new(
			&format!("http://127.0.0.1:{port}"),
			None,
			Duration::from_secs(2),
		)
		.unwrap()
		.with_retry_config(RetryConfig::no_retry());
		let result = client.post_events(&[Event::error("x")]).await;

		assert!(matches!(result, Err(SubmissionError::Transport(_))));
	}

	#[test]
	fn endpoint_joins_without_double_slash() {
		let client =
			HttpSubmissionClient::new("https://collector.example/", None, Duration::from_secs(1))
				.unwrap();
		assert_eq!(client.endpoint(), "https://collector.example/api/v2/events");
	}
}
