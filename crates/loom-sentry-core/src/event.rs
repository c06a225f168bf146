// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event payload types and their wire schema.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Unique identifier for an event: 128 random bits rendered as 32 lowercase
/// hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(Uuid);

impl EventId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for EventId {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| ProtocolError::InvalidEventId(s.to_string()))
	}
}

impl Serialize for EventId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for EventId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
	Debug,
	Info,
	Warning,
	Error,
	Fatal,
}

impl fmt::Display for Level {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warning => write!(f, "warning"),
			Self::Error => write!(f, "error"),
			Self::Fatal => write!(f, "fatal"),
		}
	}
}

impl FromStr for Level {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"debug" => Ok(Self::Debug),
			"info" => Ok(Self::Info),
			"warning" => Ok(Self::Warning),
			"error" => Ok(Self::Error),
			"fatal" => Ok(Self::Fatal),
			_ => Err(ProtocolError::InvalidLevel(s.to_string())),
		}
	}
}

/// Identity of the user affected by an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
}

impl User {
	pub fn with_id(id: impl Into<String>) -> Self {
		Self {
			id: Some(id.into()),
			..Default::default()
		}
	}
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
	/// Declaring path of the frame (type or module).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filename: Option<String>,
	/// Method or function signature.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	/// Source file, when the trace carried one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub abs_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lineno: Option<u32>,
}

/// Ordered list of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stacktrace {
	#[serde(default)]
	pub frames: Vec<Frame>,
}

impl Stacktrace {
	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}
}

impl FromIterator<Frame> for Stacktrace {
	fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
		Self {
			frames: iter.into_iter().collect(),
		}
	}
}

/// One link of an exception chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
	#[serde(rename = "type")]
	pub ty: String,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(default)]
	pub stacktrace: Stacktrace,
}

/// A reported message or exception occurrence.
///
/// The event id is fixed at construction. `culprit` and the top-level
/// `stacktrace` are derived from the exception chain by
/// [`Event::set_exception_chain`] and have no independent setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	event_id: EventId,
	pub project: String,
	pub level: Level,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<DateTime<Utc>>,
	#[serde(default)]
	pub message: String,
	#[serde(default)]
	pub platform: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logger: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	culprit: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	stacktrace: Option<Stacktrace>,
	#[serde(
		rename = "exception",
		default,
		skip_serializing_if = "Vec::is_empty",
		deserialize_with = "legacy::exceptions"
	)]
	exceptions: Vec<ExceptionRecord>,
	#[serde(
		default,
		skip_serializing_if = "Option::is_none",
		deserialize_with = "legacy::user"
	)]
	pub user: Option<User>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub tags: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Event {
	/// Creates an event with a fresh random id.
	pub fn new(project: impl Into<String>, level: Level) -> Self {
		Self::with_id(EventId::new(), project, level)
	}

	/// Creates an event under an id that was allocated beforehand.
	pub fn with_id(event_id: EventId, project: impl Into<String>, level: Level) -> Self {
		Self {
			event_id,
			project: project.into(),
			level,
			timestamp: None,
			message: String::new(),
			platform: String::new(),
			logger: None,
			culprit: None,
			stacktrace: None,
			exceptions: Vec::new(),
			user: None,
			tags: BTreeMap::new(),
			extra: serde_json::Map::new(),
		}
	}

	pub fn event_id(&self) -> EventId {
		self.event_id
	}

	pub fn culprit(&self) -> Option<&str> {
		self.culprit.as_deref()
	}

	pub fn stacktrace(&self) -> Option<&Stacktrace> {
		self.stacktrace.as_ref()
	}

	/// Exception chain, outermost first.
	pub fn exceptions(&self) -> &[ExceptionRecord] {
		&self.exceptions
	}

	/// Attaches an exception chain (outermost first) and derives the fields
	/// that depend on it:
	///
	/// - `message` becomes `"{type}: {value}"` of the innermost record
	/// - `stacktrace` becomes the innermost record's stacktrace, if it has frames
	/// - `culprit` becomes `"{function} in {filename}"` of that stacktrace's last frame
	pub fn set_exception_chain(&mut self, exceptions: Vec<ExceptionRecord>) {
		self.exceptions = exceptions;

		let innermost = self.exceptions.last();
		if let Some(inner) = innermost {
			self.message = format!("{}: {}", inner.ty, inner.value);
		}

		self.stacktrace = innermost
			.map(|e| e.stacktrace.clone())
			.filter(|st| !st.is_empty());

		self.culprit = self
			.stacktrace
			.as_ref()
			.and_then(|st| st.frames.last())
			.map(culprit_of);
	}
}

fn culprit_of(frame: &Frame) -> String {
	format!(
		"{} in {}",
		frame.function.as_deref().unwrap_or_default(),
		frame.filename.as_deref().unwrap_or_default()
	)
}

/// Readers for compatibility-only shapes written by older clients.
mod legacy {
	use serde::{Deserialize, Deserializer};

	use super::{ExceptionRecord, User};

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum ExceptionField {
		List(Vec<ExceptionRecord>),
		TypeName(String),
	}

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum UserField {
		Object(User),
		Id(String),
	}

	pub(super) fn exceptions<'de, D>(deserializer: D) -> Result<Vec<ExceptionRecord>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(match Option::<ExceptionField>::deserialize(deserializer)? {
			Some(ExceptionField::List(list)) => list,
			Some(ExceptionField::TypeName(ty)) => vec![ExceptionRecord {
				ty,
				..Default::default()
			}],
			None => Vec::new(),
		})
	}

	pub(super) fn user<'de, D>(deserializer: D) -> Result<Option<User>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(match Option::<UserField>::deserialize(deserializer)? {
			Some(UserField::Object(user)) => Some(user),
			Some(UserField::Id(id)) => Some(User::with_id(id)),
			None => None,
		})
	}
}
