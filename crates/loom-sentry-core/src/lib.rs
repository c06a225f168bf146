// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom store-and-forward event reporter.
//!
//! This crate holds the protocol side of the reporter and performs no I/O.
//! It is used by the `loom-sentry` SDK, which owns delivery and storage.
//!
//! # Overview
//!
//! - [`Dsn`]: parses the connection string into endpoint components and the
//!   ingestion URL
//! - [`Event`]: the JSON payload, including exception chains and the derived
//!   culprit
//! - [`parse_frames`]: turns free-form stack-trace text into [`Frame`]s
//! - [`ExceptionInfo`]: an exception with an explicit cause link, walked
//!   iteratively into [`ExceptionRecord`]s

pub mod dsn;
pub mod error;
pub mod event;
pub mod exception;
pub mod stacktrace;

pub use dsn::Dsn;
pub use error::{DsnError, ProtocolError};
pub use event::{Event, EventId, ExceptionRecord, Frame, Level, Stacktrace, User};
pub use exception::{Chain, ExceptionInfo};
pub use stacktrace::{parse_frame_line, parse_frames, FrameIter};
