// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the reporter's protocol layer.

use thiserror::Error;

/// Errors raised while interpreting a DSN.
///
/// These are configuration errors: a client cannot run without a valid
/// destination, so they are surfaced synchronously at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DsnError {
	#[error("DSN is missing or empty")]
	Missing,

	#[error("malformed DSN: {0}")]
	Malformed(String),
}

/// Errors raised while parsing protocol values from strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
	#[error("invalid level: {0}")]
	InvalidLevel(String),

	#[error("invalid event id: {0}")]
	InvalidEventId(String),
}

/// Result type for DSN parsing.
pub type Result<T> = std::result::Result<T, DsnError>;
