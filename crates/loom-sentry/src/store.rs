// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable queue of events awaiting delivery.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use loom_sentry_core::{Event, EventId};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SentryError};
use crate::locks::KeyedLocks;

const TMP_SUFFIX: &str = ".json.tmp";

/// Keyed store of serialized events.
///
/// Implementations must be safe to call concurrently on different ids and
/// must serialize operations on the same id.
#[async_trait]
pub trait EventStore: Send + Sync {
	/// Returns every stored event that still decodes. Records that fail to
	/// decode are deleted as a side effect.
	async fn list(&self) -> Result<Vec<Event>>;

	/// Returns the event stored under `id`, if any.
	async fn get(&self, id: &EventId) -> Result<Option<Event>>;

	/// Stores `event` under its id, replacing any existing record.
	async fn put(&self, event: &Event) -> Result<()>;

	/// Removes the record for `id`. Removing a missing record is not an error.
	async fn delete(&self, id: &EventId) -> Result<()>;
}

/// File-backed [`EventStore`]: one JSON file per event id.
pub struct LocalEventStore {
	events_dir: PathBuf,
	locks: KeyedLocks,
}

impl LocalEventStore {
	pub fn new(events_dir: impl Into<PathBuf>) -> Self {
		Self {
			events_dir: events_dir.into(),
			locks: KeyedLocks::new(),
		}
	}

	/// Opens the store under the XDG data directory
	/// (`$XDG_DATA_HOME/loom/sentry/events`).
	pub fn from_xdg() -> Result<Self> {
		let data_dir = dirs::data_dir().ok_or_else(|| {
			SentryError::Io(std::io::Error::new(
				ErrorKind::NotFound,
				"could not determine XDG data directory",
			))
		})?;

		let events_dir = data_dir.join("loom").join("sentry").join("events");
		std::fs::create_dir_all(&events_dir)?;

		info!(events_dir = %events_dir.display(), "initialized local event store");

		Ok(Self::new(events_dir))
	}

	pub fn events_dir(&self) -> &Path {
		&self.events_dir
	}

	fn event_path(&self, id: &EventId) -> PathBuf {
		self.events_dir.join(format!("{id}.json"))
	}

	/// Reads and decodes one record. A record that does not decode is
	/// removed and reported as absent. The caller holds the key lock.
	async fn read_record(&self, id: &str, path: &Path) -> Result<Option<Event>> {
		let contents = match tokio::fs::read_to_string(path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) if e.kind() == ErrorKind::InvalidData => {
				self.discard_corrupt(id, path, &e.to_string()).await;
				return Ok(None);
			}
			Err(e) => return Err(e.into()),
		};

		match serde_json::from_str::<Event>(&contents) {
			Ok(event) if event.event_id().to_string() == id => Ok(Some(event)),
			Ok(event) => {
				let reason = format!("record holds event {}", event.event_id());
				self.discard_corrupt(id, path, &reason).await;
				Ok(None)
			}
			Err(e) => {
				self.discard_corrupt(id, path, &e.to_string()).await;
				Ok(None)
			}
		}
	}

	/// Removes a write that never reached its rename. Any write still in
	/// progress holds the key lock, so a tmp file seen under it is stale.
	async fn discard_stale_tmp(&self, id: &str, path: &Path) {
		let _guard = self.locks.lock(id).await;
		match remove_if_exists(path).await {
			Ok(true) => debug!(event_id = %id, path = %path.display(), "removed stale temporary record"),
			Ok(false) => {}
			Err(e) => error!(event_id = %id, error = %e, "failed to remove stale temporary record"),
		}
	}

	async fn discard_corrupt(&self, id: &str, path: &Path, reason: &str) {
		warn!(event_id = %id, path = %path.display(), reason, "discarding unreadable stored event");
		if let Err(e) = remove_if_exists(path).await {
			error!(event_id = %id, error = %e, "failed to delete unreadable stored event");
		}
	}
}

#[async_trait]
impl EventStore for LocalEventStore {
	async fn list(&self) -> Result<Vec<Event>> {
		let mut entries = match tokio::fs::read_dir(&self.events_dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let mut events = Vec::new();

		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			if let Some(id) = tmp_record_id(&path) {
				self.discard_stale_tmp(&id, &path).await;
				continue;
			}
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
				continue;
			};

			let _guard = self.locks.lock(&id).await;
			match self.read_record(&id, &path).await {
				Ok(Some(event)) => events.push(event),
				Ok(None) => {}
				Err(e) => {
					error!(path = %path.display(), error = %e, "failed to read stored event");
				}
			}
		}

		debug!(count = events.len(), "listed stored events");

		Ok(events)
	}

	async fn get(&self, id: &EventId) -> Result<Option<Event>> {
		let key = id.to_string();
		let path = self.event_path(id);

		let _guard = self.locks.lock(&key).await;
		self.read_record(&key, &path).await
	}

	async fn put(&self, event: &Event) -> Result<()> {
		let id = event.event_id();
		let key = id.to_string();
		let path = self.event_path(&id);
		let tmp_path = self.events_dir.join(format!("{key}{TMP_SUFFIX}"));

		let json = serde_json::to_vec(event)?;

		let _guard = self.locks.lock(&key).await;
		tokio::fs::create_dir_all(&self.events_dir).await?;
		tokio::fs::write(&tmp_path, &json).await?;
		tokio::fs::rename(&tmp_path, &path).await?;

		debug!(event_id = %id, path = %path.display(), "stored event");

		Ok(())
	}

	async fn delete(&self, id: &EventId) -> Result<()> {
		let key = id.to_string();
		let path = self.event_path(id);

		let _guard = self.locks.lock(&key).await;
		if remove_if_exists(&path).await? {
			debug!(event_id = %id, "deleted stored event");
		}

		Ok(())
	}
}

/// Returns the event id of an interrupted write's temporary file.
fn tmp_record_id(path: &Path) -> Option<String> {
	let name = path.file_name()?.to_str()?;
	name
		.strip_suffix(TMP_SUFFIX)
		.filter(|id| !id.is_empty())
		.map(str::to_string)
}

/// Removes `path`; returns whether a file was removed.
async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
	match tokio::fs::remove_file(path).await {
		Ok(()) => Ok(true),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_sentry_core::Level;
	use std::sync::Arc;
	use tempfile::TempDir;

	fn create_test_store() -> (LocalEventStore, TempDir) {
		let tmp = TempDir::new().unwrap();
		let store = LocalEventStore::new(tmp.path().join("events"));
		(store, tmp)
	}

	fn test_event(message: &str) -> Event {
		let mut event = Event::new("1", Level::Error);
		event.message = message.to_string();
		event.platform = "rust".to_string();
		event
	}

	#[tokio::test]
	async fn put_and_get_event() {
		let (store, _tmp) = create_test_store();
		let event = test_event("boom");

		store.put(&event).await.unwrap();
		let loaded = store.get(&event.event_id()).await.unwrap();

		assert_eq!(loaded, Some(event));
	}

	#[tokio::test]
	async fn get_missing_returns_none() {
		let (store, _tmp) = create_test_store();
		assert!(store.get(&EventId::new()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn put_overwrites_existing_record() {
		let (store, _tmp) = create_test_store();
		let mut event = test_event("first");
		store.put(&event).await.unwrap();

		event.message = "second".to_string();
		store.put(&event).await.unwrap();

		let loaded = store.get(&event.event_id()).await.unwrap().unwrap();
		assert_eq!(loaded.message, "second");
		assert_eq!(store.list().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn list_returns_all_events() {
		let (store, _tmp) = create_test_store();
		for i in 0..3 {
			store.put(&test_event(&format!("event {i}"))).await.unwrap();
		}

		assert_eq!(store.list().await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn list_on_missing_directory_is_empty() {
		let (store, _tmp) = create_test_store();
		assert!(store.list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn list_deletes_corrupt_records() {
		let (store, _tmp) = create_test_store();
		let good = test_event("good");
		store.put(&good).await.unwrap();

		let corrupt_id = EventId::new();
		let corrupt_path = store.event_path(&corrupt_id);
		tokio::fs::write(&corrupt_path, b"{ not json").await.unwrap();

		let listed = store.list().await.unwrap();
		assert_eq!(listed, vec![good]);
		assert!(!corrupt_path.exists());
		assert!(store.get(&corrupt_id).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn list_ignores_foreign_files() {
		let (store, _tmp) = create_test_store();
		store.put(&test_event("good")).await.unwrap();
		let stray = store.events_dir().join("notes.txt");
		tokio::fs::write(&stray, b"keep me").await.unwrap();

		assert_eq!(store.list().await.unwrap().len(), 1);
		assert!(stray.exists());
	}

	#[tokio::test]
	async fn list_removes_interrupted_writes() {
		let (store, _tmp) = create_test_store();
		let event = test_event("kept");
		store.put(&event).await.unwrap();

		let stale = store
			.events_dir()
			.join(format!("{}{TMP_SUFFIX}", EventId::new()));
		tokio::fs::write(&stale, b"{ half written").await.unwrap();

		assert_eq!(store.list().await.unwrap(), vec![event]);
		assert!(!stale.exists());
	}

	#[tokio::test]
	async fn record_under_wrong_name_is_discarded() {
		let (store, _tmp) = create_test_store();
		let event = test_event("misfiled");
		let other = EventId::new();
		tokio::fs::create_dir_all(store.events_dir()).await.unwrap();
		tokio::fs::write(store.event_path(&other), serde_json::to_vec(&event).unwrap())
			.await
			.unwrap();

		assert!(store.get(&other).await.unwrap().is_none());
		assert!(!store.event_path(&other).exists());
	}

	#[tokio::test]
	async fn delete_twice_is_ok() {
		let (store, _tmp) = create_test_store();
		let event = test_event("gone");
		store.put(&event).await.unwrap();

		store.delete(&event.event_id()).await.unwrap();
		store.delete(&event.event_id()).await.unwrap();
		assert!(store.get(&event.event_id()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn concurrent_puts_of_distinct_events_are_kept() {
		let (store, _tmp) = create_test_store();
		let store = Arc::new(store);

		let mut handles = Vec::new();
		for i in 0..16 {
			let store = Arc::clone(&store);
			handles.push(tokio::spawn(async move {
				let event = test_event(&format!("event {i}"));
				store.put(&event).await.unwrap();
				event.event_id()
			}));
		}

		let mut ids = Vec::new();
		for handle in handles {
			ids.push(handle.await.unwrap());
		}

		let listed = store.list().await.unwrap();
		assert_eq!(listed.len(), 16);
		for id in ids {
			assert!(store.get(&id).await.unwrap().is_some());
		}
	}
}
