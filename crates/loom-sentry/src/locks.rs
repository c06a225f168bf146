// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-key async locks.
//!
//! Operations on the same key are serialized; operations on different keys
//! never wait on each other. Entries are pruned once nobody holds them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const MIN_PRUNE_THRESHOLD: usize = 64;

#[derive(Debug)]
pub(crate) struct KeyedLocks {
	inner: Mutex<Table>,
}

#[derive(Debug)]
struct Table {
	locks: HashMap<String, Weak<AsyncMutex<()>>>,
	prune_at: usize,
}

/// Guard for one key; the key is unlocked on drop.
pub(crate) type KeyGuard = OwnedMutexGuard<()>;

impl KeyedLocks {
	pub(crate) fn new() -> Self {
		Self {
			inner: Mutex::new(Table {
				locks: HashMap::new(),
				prune_at: MIN_PRUNE_THRESHOLD,
			}),
		}
	}

	/// Waits until `key` is free and locks it.
	pub(crate) async fn lock(&self, key: &str) -> KeyGuard {
		let mutex = self.mutex_for(key);
		mutex.lock_owned().await
	}

	fn mutex_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

		if let Some(existing) = table.locks.get(key).and_then(Weak::upgrade) {
			return existing;
		}

		if table.locks.len() >= table.prune_at {
			table.locks.retain(|_, weak| weak.strong_count() > 0);
			table.prune_at = (table.locks.len() * 2).max(MIN_PRUNE_THRESHOLD);
		}

		let mutex = Arc::new(AsyncMutex::new(()));
		table.locks.insert(key.to_string(), Arc::downgrade(&mutex));
		mutex
	}

	#[cfg(test)]
	fn tracked(&self) -> usize {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner).locks.len()
	}
}

impl Default for KeyedLocks {
	fn default() -> Self {
		Self::new()
	}
}
