// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the reporting SDK.

use loom_sentry_core::DsnError;
use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, SentryError>;

/// Errors that can occur in the reporting SDK.
///
/// Only [`SentryError::Configuration`] is ever returned to application code
/// (from the client builder). Everything else is absorbed by the delivery
/// pipeline and reported through diagnostics.
#[derive(Debug, Error)]
pub enum SentryError {
	/// The DSN is missing or malformed.
	#[error("configuration error: {0}")]
	Configuration(#[from] DsnError),

	/// HTTP request failed before a response was received.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// The request did not complete within the configured timeout.
	#[error("request timed out")]
	Timeout,

	/// Server returned a non-success status.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Response body.
		message: String,
	},

	/// Server accepted the request but the response could not be understood.
	#[error("invalid server response: {0}")]
	InvalidResponse(String),

	/// Failed to serialize or deserialize an event.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// Local storage failed.
	#[error("storage I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// The client was built outside a Tokio runtime.
	#[error("no Tokio runtime available to run the client")]
	RuntimeUnavailable,
}

impl SentryError {
	/// True for failures of a delivery attempt, which are recovered by
	/// storing the event for a later flush.
	pub fn is_delivery_failure(&self) -> bool {
		matches!(
			self,
			Self::RequestFailed(_)
				| Self::Timeout
				| Self::ServerError { .. }
				| Self::InvalidResponse(_)
				| Self::Serialization(_)
		)
	}
}
