// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Composition of complete events from messages and exception chains.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use loom_sentry_core::{Event, EventId, ExceptionInfo, Level, User};

use crate::context::ContextProvider;

/// Logger name used when none is configured.
pub const DEFAULT_LOGGER: &str = "root";

/// Client-level defaults applied to every event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
	pub logger: Option<String>,
	pub user: Option<User>,
	pub tags: BTreeMap<String, String>,
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Builds events for one project.
#[derive(Clone)]
pub struct PayloadBuilder {
	project: String,
	provider: Arc<dyn ContextProvider>,
}

impl PayloadBuilder {
	pub fn new(project: impl Into<String>, provider: Arc<dyn ContextProvider>) -> Self {
		Self {
			project: project.into(),
			provider,
		}
	}

	/// Builds the common part of an event.
	///
	/// Tags and extra are layered caller, then scope, then platform; later
	/// layers win on key collisions.
	pub async fn build_base(
		&self,
		event_id: EventId,
		level: Level,
		tags: BTreeMap<String, String>,
		extra: serde_json::Map<String, serde_json::Value>,
		scope: &Scope,
	) -> Event {
		let mut event = Event::with_id(event_id, self.project.clone(), level);
		event.timestamp = Some(Utc::now());
		event.platform = self.provider.platform();
		event.logger = Some(
			scope
				.logger
				.clone()
				.filter(|l| !l.is_empty())
				.unwrap_or_else(|| DEFAULT_LOGGER.to_string()),
		);
		event.user = scope.user.clone();

		event.tags = tags;
		event
			.tags
			.extend(scope.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
		event.tags.extend(self.provider.platform_tags().await);

		event.extra = extra;
		event
			.extra
			.extend(scope.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
		event.extra.extend(self.provider.platform_extra());

		event
	}

	/// Builds a message event. No exception chain is attached.
	pub async fn build_for_message(
		&self,
		event_id: EventId,
		message: impl Into<String>,
		level: Level,
		tags: BTreeMap<String, String>,
		extra: serde_json::Map<String, serde_json::Value>,
		scope: &Scope,
	) -> Event {
		let mut event = self.build_base(event_id, level, tags, extra, scope).await;
		event.message = message.into();
		event
	}

	/// Builds an exception event from the full cause chain.
	pub async fn build_for_exception(
		&self,
		event_id: EventId,
		exception: &ExceptionInfo,
		level: Level,
		tags: BTreeMap<String, String>,
		extra: serde_json::Map<String, serde_json::Value>,
		scope: &Scope,
	) -> Event {
		let mut event = self.build_base(event_id, level, tags, extra, scope).await;
		event.set_exception_chain(exception.to_records());
		event
	}
}
