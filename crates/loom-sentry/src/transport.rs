// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of single events to the ingestion endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use loom_sentry_core::{Dsn, Event};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SentryError};

/// Protocol version announced in the auth header.
pub const SENTRY_VERSION: u32 = 4;
/// Name of the auth header.
pub const AUTH_HEADER: &str = "X-Sentry-Auth";

/// Sends one event and returns the server-assigned id.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, event: &Event) -> Result<String>;
}

/// Builds the `X-Sentry-Auth` header value.
///
/// The `sentry_secret` segment is omitted when the DSN carries no secret key.
pub fn auth_header(dsn: &Dsn, client: &str, timestamp: i64) -> String {
	let mut header = format!(
		"Sentry sentry_version={SENTRY_VERSION}, sentry_client={client}, sentry_timestamp={timestamp}, sentry_key={}",
		dsn.public_key()
	);
	if let Some(secret) = dsn.secret_key() {
		header.push_str(", sentry_secret=");
		header.push_str(secret);
	}
	header
}

/// Response body of a successful store request.
#[derive(Debug, Deserialize)]
struct StoreResponse {
	id: String,
}

/// [`Transport`] issuing one HTTP POST per event.
pub struct HttpTransport {
	dsn: Arc<Dsn>,
	client_name: String,
	http_client: Client,
}

impl HttpTransport {
	/// Creates a transport whose requests fail after `timeout`.
	pub fn new(dsn: Arc<Dsn>, client_name: impl Into<String>, timeout: Duration) -> Result<Self> {
		let client_name = client_name.into();
		let http_client = Client::builder()
			.user_agent(client_name.clone())
			.timeout(timeout)
			.build()
			.map_err(SentryError::RequestFailed)?;

		Ok(Self {
			dsn,
			client_name,
			http_client,
		})
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn send(&self, event: &Event) -> Result<String> {
		let url = self.dsn.store_url();
		let body = serde_json::to_vec(event)?;
		let auth = auth_header(&self.dsn, &self.client_name, Utc::now().timestamp());

		debug!(url = %url, event_id = %event.event_id(), "Sending event");

		let response = self
			.http_client
			.post(url)
			.header(AUTH_HEADER, auth)
			.header(CONTENT_TYPE, "application/json")
			.body(body)
			.send()
			.await
			.map_err(map_request_error)?;

		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			return Err(SentryError::ServerError {
				status: status.as_u16(),
				message,
			});
		}

		let text = response.text().await.map_err(map_request_error)?;
		let parsed: StoreResponse = serde_json::from_str(&text)
			.map_err(|e| SentryError::InvalidResponse(format!("{e}: {text}")))?;

		Ok(parsed.id)
	}
}

fn map_request_error(e: reqwest::Error) -> SentryError {
	if e.is_timeout() {
		SentryError::Timeout
	} else {
		SentryError::RequestFailed(e)
	}
}
