// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host context supplied to every event.

use std::collections::BTreeMap;

use async_trait::async_trait;

/// SDK version for identification.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
/// SDK name for identification.
pub const SDK_NAME: &str = "loom-sentry-rust";

/// Source of platform data for events.
///
/// Concrete data sources (OS, device, network, UI state) live in adapters
/// implementing this trait; the reporter only consumes what they return.
#[async_trait]
pub trait ContextProvider: Send + Sync {
	/// Platform tag written to every event.
	fn platform(&self) -> String;

	/// Client identifier sent as `sentry_client` in the auth header.
	fn user_agent(&self) -> String;

	/// Tags layered over caller and client tags. May query the host.
	async fn platform_tags(&self) -> BTreeMap<String, String>;

	/// Extra data layered over caller and client extra data.
	fn platform_extra(&self) -> serde_json::Map<String, serde_json::Value>;
}

/// Context provider using only compile-time target information.
#[derive(Debug, Clone, Default)]
pub struct DefaultContextProvider;

#[async_trait]
impl ContextProvider for DefaultContextProvider {
	fn platform(&self) -> String {
		"rust".to_string()
	}

	fn user_agent(&self) -> String {
		format!("{SDK_NAME}/{SDK_VERSION}")
	}

	async fn platform_tags(&self) -> BTreeMap<String, String> {
		BTreeMap::from([
			("sdk.name".to_string(), SDK_NAME.to_string()),
			("sdk.version".to_string(), SDK_VERSION.to_string()),
			("os".to_string(), std::env::consts::OS.to_string()),
			("arch".to_string(), std::env::consts::ARCH.to_string()),
		])
	}

	fn platform_extra(&self) -> serde_json::Map<String, serde_json::Value> {
		serde_json::Map::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn default_provider_tags_identify_sdk() {
		let provider = DefaultContextProvider;
		let tags = provider.platform_tags().await;

		assert_eq!(tags.get("sdk.name").map(String::as_str), Some(SDK_NAME));
		assert_eq!(tags.get("os").map(String::as_str), Some(std::env::consts::OS));
		assert!(provider.user_agent().starts_with("loom-sentry-rust/"));
		assert_eq!(provider.platform(), "rust");
	}
}
