// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Send, store and replay of events.
//!
//! Each event moves through `Pending -> Sending -> {Delivered, Failed}`.
//! `Failed` events stay in the store and re-enter `Sending` on the next
//! flush. Delivery is never retried inline.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use loom_sentry_core::{Event, EventId};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::locks::KeyedLocks;
use crate::store::EventStore;
use crate::transport::Transport;

/// When a captured event is transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPolicy {
	/// Send now; store only if sending fails.
	Immediate,
	/// Store now; send on the next flush.
	#[default]
	Deferred,
	/// Resolved by the client's `automatic_sends_immediately` flag.
	Automatic,
}

impl SendPolicy {
	/// Resolves `Automatic`; returns true when the event should be sent now.
	pub fn sends_immediately(self, automatic_sends_immediately: bool) -> bool {
		match self {
			Self::Immediate => true,
			Self::Deferred => false,
			Self::Automatic => automatic_sends_immediately,
		}
	}
}

/// Lifecycle state of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
	/// Stored, waiting for a flush.
	Pending,
	/// A send is in flight.
	Sending,
	/// Accepted by the server; the stored copy is gone.
	Delivered,
	/// The last send failed; the event is stored for a later flush.
	Failed,
}

impl fmt::Display for DeliveryState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Pending => write!(f, "pending"),
			Self::Sending => write!(f, "sending"),
			Self::Delivered => write!(f, "delivered"),
			Self::Failed => write!(f, "failed"),
		}
	}
}

/// Outcome of [`DeliveryEngine::flush_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushSummary {
	pub delivered: usize,
	pub failed: usize,
}

/// Orchestrates transmission, fallback to storage and replay.
pub struct DeliveryEngine {
	store: Arc<dyn EventStore>,
	transport: Arc<dyn Transport>,
	in_flight: KeyedLocks,
}

impl DeliveryEngine {
	pub fn new(store: Arc<dyn EventStore>, transport: Arc<dyn Transport>) -> Self {
		Self {
			store,
			transport,
			in_flight: KeyedLocks::new(),
		}
	}

	pub fn store(&self) -> &Arc<dyn EventStore> {
		&self.store
	}

	/// Stores a freshly built event for the next flush.
	pub async fn capture(&self, event: &Event) -> Result<()> {
		let id = event.event_id();
		let _guard = self.in_flight.lock(&id.to_string()).await;
		self.store.put(event).await?;
		debug!(event_id = %id, state = %DeliveryState::Pending, "event stored for later delivery");
		Ok(())
	}

	/// Sends one event.
	///
	/// On success the stored copy (if any) is deleted by the local event id
	/// and the server id is returned. On failure the event is stored and the
	/// delivery error is returned; there is no inline retry.
	pub async fn send(&self, event: &Event) -> Result<String> {
		let id = event.event_id();
		let _guard = self.in_flight.lock(&id.to_string()).await;
		self.send_locked(event).await
	}

	async fn send_locked(&self, event: &Event) -> Result<String> {
		let id = event.event_id();
		debug!(event_id = %id, state = %DeliveryState::Sending, "sending event");

		match self.transport.send(event).await {
			Ok(server_id) => {
				if server_id != id.to_string() {
					debug!(event_id = %id, server_id = %server_id, "server assigned a different id");
				}
				if let Err(e) = self.store.delete(&id).await {
					error!(event_id = %id, error = %e, "failed to delete delivered event");
				}
				debug!(event_id = %id, state = %DeliveryState::Delivered, "event delivered");
				Ok(server_id)
			}
			Err(e) => {
				warn!(event_id = %id, state = %DeliveryState::Failed, error = %e, "event delivery failed");
				if let Err(store_err) = self.store.put(event).await {
					error!(event_id = %id, error = %store_err, "failed to store undelivered event");
					return Err(store_err);
				}
				Err(e)
			}
		}
	}

	/// Attempts delivery of every stored event.
	///
	/// Each entry is sent independently and concurrently. Failures leave the
	/// entry stored; successes remove it. Safe to call repeatedly.
	pub async fn flush_all(&self) -> Result<FlushSummary> {
		let events = self.store.list().await?;
		if events.is_empty() {
			return Ok(FlushSummary::default());
		}

		debug!(count = events.len(), "flushing stored events");

		let results = join_all(events.iter().map(|event| self.replay(event))).await;

		let mut summary = FlushSummary::default();
		for result in results {
			match result {
				Ok(_) => summary.delivered += 1,
				Err(_) => summary.failed += 1,
			}
		}

		info!(
			delivered = summary.delivered,
			failed = summary.failed,
			"flushed stored events"
		);

		Ok(summary)
	}

	/// Sends a listed event unless another task already settled it.
	async fn replay(&self, event: &Event) -> Result<String> {
		let id = event.event_id();
		let _guard = self.in_flight.lock(&id.to_string()).await;

		// A concurrent send may have delivered or replaced it while we waited.
		let Some(current) = self.store.get(&id).await? else {
			return Ok(id.to_string());
		};
		self.send_locked(&current).await
	}

	/// Returns the stored copy of `id`, if any.
	pub async fn stored(&self, id: &EventId) -> Result<Option<Event>> {
		self.store.get(id).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SentryError;
	use crate::store::LocalEventStore;
	use async_trait::async_trait;
	use loom_sentry_core::Level;
	use std::collections::HashSet;
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
	use std::sync::Mutex;
	use tempfile::TempDir;

	#[derive(Default)]
	struct MockTransport {
		sent: Mutex<Vec<EventId>>,
		failing: Mutex<HashSet<EventId>>,
		fail_all: AtomicBool,
		server_id_suffix: Option<&'static str>,
		calls: AtomicUsize,
	}

	impl MockTransport {
		fn fail_for(&self, id: EventId) {
			self.failing.lock().unwrap().insert(id);
		}

		fn set_fail_all(&self, fail: bool) {
			self.fail_all.store(fail, Ordering::SeqCst);
		}

		fn sent(&self) -> Vec<EventId> {
			self.sent.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl Transport for MockTransport {
		async fn send(&self, event: &Event) -> Result<String> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let id = event.event_id();
			if self.fail_all.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&id) {
				return Err(SentryError::ServerError {
					status: 503,
					message: "mock failure".to_string(),
				});
			}
			self.sent.lock().unwrap().push(id);
			Ok(match self.server_id_suffix {
				Some(suffix) => format!("{id}{suffix}"),
				None => id.to_string(),
			})
		}
	}

	fn setup(transport: MockTransport) -> (DeliveryEngine, Arc<MockTransport>, TempDir) {
		let tmp = TempDir::new().unwrap();
		let store = Arc::new(LocalEventStore::new(tmp.path().join("events")));
		let transport = Arc::new(transport);
		let engine = DeliveryEngine::new(store, transport.clone());
		(engine, transport, tmp)
	}

	fn test_event(message: &str) -> Event {
		let mut event = Event::new("1", Level::Error);
		event.message = message.to_string();
		event.platform = "rust".to_string();
		event
	}

	#[test]
	fn send_policy_resolution() {
		assert!(SendPolicy::Immediate.sends_immediately(false));
		assert!(!SendPolicy::Deferred.sends_immediately(true));
		assert!(SendPolicy::Automatic.sends_immediately(true));
		assert!(!SendPolicy::Automatic.sends_immediately(false));
		assert_eq!(SendPolicy::default(), SendPolicy::Deferred);
	}

	#[tokio::test]
	async fn deferred_capture_stores_without_sending() {
		let (engine, transport, _tmp) = setup(MockTransport::default());
		let event = test_event("later");

		engine.capture(&event).await.unwrap();

		assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
		assert_eq!(engine.stored(&event.event_id()).await.unwrap(), Some(event));
	}

	#[tokio::test]
	async fn successful_send_leaves_nothing_stored() {
		let (engine, transport, _tmp) = setup(MockTransport::default());
		let event = test_event("now");
		engine.capture(&event).await.unwrap();

		let server_id = engine.send(&event).await.unwrap();

		assert_eq!(server_id, event.event_id().to_string());
		assert_eq!(transport.sent(), vec![event.event_id()]);
		assert!(engine.store().list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn failed_send_falls_back_to_store() {
		let (engine, transport, _tmp) = setup(MockTransport::default());
		transport.set_fail_all(true);
		let event = test_event("offline");

		let result = engine.send(&event).await;
		assert!(matches!(result, Err(SentryError::ServerError { status: 503, .. })));
		assert_eq!(transport.calls.load(Ordering::SeqCst), 1, "no inline retry");
		assert_eq!(engine.stored(&event.event_id()).await.unwrap(), Some(event.clone()));

		let err = engine.send(&test_event("offline 2")).await.unwrap_err();
		assert!(err.is_delivery_failure());
		assert_eq!(engine.store().list().await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn flush_removes_delivered_and_keeps_failed() {
		let (engine, transport, _tmp) = setup(MockTransport::default());

		let events: Vec<Event> = (0..6).map(|i| test_event(&format!("event {i}"))).collect();
		for event in &events {
			engine.capture(event).await.unwrap();
		}
		transport.fail_for(events[1].event_id());
		transport.fail_for(events[4].event_id());

		let summary = engine.flush_all().await.unwrap();
		assert_eq!(summary, FlushSummary { delivered: 4, failed: 2 });

		let remaining: HashSet<EventId> = engine
			.store()
			.list()
			.await
			.unwrap()
			.iter()
			.map(Event::event_id)
			.collect();
		assert_eq!(
			remaining,
			HashSet::from([events[1].event_id(), events[4].event_id()])
		);
	}

	#[tokio::test]
	async fn flush_is_idempotent() {
		let (engine, transport, _tmp) = setup(MockTransport::default());
		transport.set_fail_all(true);
		for i in 0..3 {
			engine.capture(&test_event(&format!("e{i}"))).await.unwrap();
		}

		let first = engine.flush_all().await.unwrap();
		let second = engine.flush_all().await.unwrap();
		assert_eq!(first, FlushSummary { delivered: 0, failed: 3 });
		assert_eq!(second, first);
		assert_eq!(engine.store().list().await.unwrap().len(), 3);

		transport.set_fail_all(false);
		let third = engine.flush_all().await.unwrap();
		assert_eq!(third, FlushSummary { delivered: 3, failed: 0 });
		assert_eq!(engine.flush_all().await.unwrap(), FlushSummary::default());
	}

	#[tokio::test]
	async fn deletes_by_local_id_when_server_id_differs() {
		let (engine, _transport, _tmp) = setup(MockTransport {
			server_id_suffix: Some("-srv"),
			..Default::default()
		});
		let event = test_event("renamed");
		engine.capture(&event).await.unwrap();

		let summary = engine.flush_all().await.unwrap();

		assert_eq!(summary.delivered, 1);
		assert!(engine.stored(&event.event_id()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn concurrent_flushes_send_each_event_once() {
		let (engine, transport, _tmp) = setup(MockTransport::default());
		for i in 0..5 {
			engine.capture(&test_event(&format!("e{i}"))).await.unwrap();
		}

		let (a, b) = tokio::join!(engine.flush_all(), engine.flush_all());
		let delivered = a.unwrap().delivered + b.unwrap().delivered;

		assert!(delivered >= 5);
		assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
		assert!(engine.store().list().await.unwrap().is_empty());
	}
}
