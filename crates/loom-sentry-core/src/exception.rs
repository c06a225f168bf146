// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Captured exceptions and their cause chains.

use std::error::Error;

use crate::event::{ExceptionRecord, Stacktrace};
use crate::stacktrace::parse_frames;

/// An exception as handed to the reporter: one link plus an optional cause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionInfo {
	/// Most-derived runtime type name.
	pub type_name: String,
	pub message: String,
	/// Component the exception originated from, when known.
	pub module: Option<String>,
	/// Raw stack-trace text for this link.
	pub stacktrace: Option<String>,
	pub cause: Option<Box<ExceptionInfo>>,
}

impl ExceptionInfo {
	pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			type_name: type_name.into(),
			message: message.into(),
			..Default::default()
		}
	}

	pub fn with_module(mut self, module: impl Into<String>) -> Self {
		self.module = Some(module.into());
		self
	}

	pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
		self.stacktrace = Some(stacktrace.into());
		self
	}

	pub fn with_cause(mut self, cause: ExceptionInfo) -> Self {
		self.cause = Some(Box::new(cause));
		self
	}

	pub fn has_cause(&self) -> bool {
		self.cause.is_some()
	}

	/// Builds a chain from a Rust error and its `source()` links.
	///
	/// The outermost type name is exact; source links are type-erased, so
	/// their names are taken from the head of their `Debug` output.
	pub fn from_error<E>(error: &E) -> Self
	where
		E: Error + ?Sized,
	{
		let mut links = vec![Self::new(std::any::type_name::<E>(), error.to_string())];
		let mut source = error.source();
		while let Some(err) = source {
			links.push(Self::new(source_type_name(err), err.to_string()));
			source = err.source();
		}

		let mut chain = links.pop().unwrap_or_default();
		while let Some(outer) = links.pop() {
			chain = outer.with_cause(chain);
		}
		chain
	}

	/// Walks the chain from outermost to innermost.
	pub fn chain(&self) -> Chain<'_> {
		Chain {
			next: Some(self),
		}
	}

	/// Converts the chain into exception records, outermost first, parsing
	/// each link's stack-trace text.
	pub fn to_records(&self) -> Vec<ExceptionRecord> {
		self.chain()
			.map(|link| ExceptionRecord {
				ty: link.type_name.clone(),
				value: link.message.clone(),
				module: link.module.clone(),
				stacktrace: parse_frames(link.stacktrace.as_deref()).collect::<Stacktrace>(),
			})
			.collect()
	}
}

/// Iterator over the links of an exception chain.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
	next: Option<&'a ExceptionInfo>,
}

impl<'a> Iterator for Chain<'a> {
	type Item = &'a ExceptionInfo;

	fn next(&mut self) -> Option<Self::Item> {
		let current = self.next?;
		self.next = current.cause.as_deref();
		Some(current)
	}
}

/// Names a type-erased source link.
///
/// Common std errors are recognized by downcasting, since their `Debug`
/// output starts with a private representation (`Custom`, `Os`, ...).
/// Anything else is named by the head of its `Debug` output.
fn source_type_name(err: &(dyn Error + 'static)) -> String {
	if let Some(name) = std_error_name(err) {
		return name.to_string();
	}

	let debug = format!("{err:?}");
	let head: String = debug
		.chars()
		.take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
		.collect();
	if head.is_empty() {
		"Error".to_string()
	} else {
		head
	}
}

fn std_error_name(err: &(dyn Error + 'static)) -> Option<&'static str> {
	let name = if err.is::<std::io::Error>() {
		"std::io::Error"
	} else if err.is::<std::num::ParseIntError>() {
		"std::num::ParseIntError"
	} else if err.is::<std::num::ParseFloatError>() {
		"std::num::ParseFloatError"
	} else if err.is::<std::num::TryFromIntError>() {
		"std::num::TryFromIntError"
	} else if err.is::<std::str::ParseBoolError>() {
		"std::str::ParseBoolError"
	} else if err.is::<std::str::Utf8Error>() {
		"std::str::Utf8Error"
	} else if err.is::<std::string::FromUtf8Error>() {
		"std::string::FromUtf8Error"
	} else if err.is::<std::fmt::Error>() {
		"std::fmt::Error"
	} else {
		return None;
	};
	Some(name)
}
