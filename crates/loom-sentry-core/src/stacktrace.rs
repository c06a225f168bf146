// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parsing of free-form stack-trace text into structured frames.
//!
//! One frame per line. The accepted line format is:
//!
//! ```text
//! [token] at <Declaring.Path>.<Method>(<args>) [in <file>:line <n>]
//! ```
//!
//! - `token` is an optional leading word (frame number, marker) and is ignored.
//! - `at` is literal and must be followed by whitespace.
//! - The member is split at the last `.` before the argument list; the left
//!   side becomes the frame's `filename`, the right side its `function`.
//!   Constructors (`Type..ctor()`) keep the leading dot on the method.
//! - The optional suffix fills `abs_path` and `lineno`.
//!
//! Lines that do not follow this format are skipped.

use std::str::Lines;

use crate::event::Frame;

const AT: &str = "at ";
const IN: &str = " in ";
const LINE: &str = ":line ";

/// Parses stack-trace text into a lazy sequence of frames.
///
/// `None` or empty input yields an empty sequence. The returned iterator is
/// `Clone`, so the sequence can be restarted from the beginning.
pub fn parse_frames(text: Option<&str>) -> FrameIter<'_> {
	FrameIter {
		lines: text.unwrap_or_default().lines(),
	}
}

/// Iterator over the frames of a stack-trace text, in source order.
#[derive(Debug, Clone)]
pub struct FrameIter<'a> {
	lines: Lines<'a>,
}

impl Iterator for FrameIter<'_> {
	type Item = Frame;

	fn next(&mut self) -> Option<Frame> {
		self.lines.by_ref().find_map(parse_frame_line)
	}
}

/// Parses one line; `None` when the line does not match.
pub fn parse_frame_line(line: &str) -> Option<Frame> {
	let member = strip_at(line.trim())?;
	let (member, location) = split_location(member);
	let (path, method) = split_member(member)?;

	let (abs_path, lineno) = match location {
		Some((file, line)) => (Some(file.to_string()), Some(line)),
		None => (None, None),
	};

	Some(Frame {
		filename: Some(path.to_string()),
		function: Some(method.to_string()),
		abs_path,
		lineno,
	})
}

/// Returns the text after the literal `at`, allowing one leading token.
fn strip_at(line: &str) -> Option<&str> {
	if let Some(rest) = line.strip_prefix(AT) {
		return Some(rest.trim_start());
	}

	let (_token, rest) = line.split_once(char::is_whitespace)?;
	rest.trim_start().strip_prefix(AT).map(str::trim_start)
}

/// Splits off an `in <file>:line <n>` suffix when one is present and valid.
///
/// The suffix starts at the first ` in ` after the argument list, so file
/// paths may themselves contain ` in `.
fn split_location(member: &str) -> (&str, Option<(&str, u32)>) {
	let search_from = member.find(')').map_or(0, |close| close + 1);
	let Some(idx) = member[search_from..].find(IN).map(|rel| search_from + rel) else {
		return (member, None);
	};

	let suffix = &member[idx + IN.len()..];
	let Some(line_idx) = suffix.rfind(LINE) else {
		return (member, None);
	};

	let file = suffix[..line_idx].trim();
	let line = suffix[line_idx + LINE.len()..].trim();
	match line.parse::<u32>() {
		Ok(n) if !file.is_empty() => (member[..idx].trim_end(), Some((file, n))),
		_ => (member, None),
	}
}

/// Splits `Declaring.Path.Method(args)` into path and method signature.
fn split_member(member: &str) -> Option<(&str, &str)> {
	let member = member.trim();
	let name_end = member.find('(').unwrap_or(member.len());
	let head = &member[..name_end];
	if head.contains(char::is_whitespace) {
		return None;
	}

	let mut dot = head.rfind('.')?;
	// `Type..ctor` / `Type..cctor`: the dot belongs to the method name.
	if dot > 0 && head.as_bytes()[dot - 1] == b'.' {
		dot -= 1;
	}

	let path = &member[..dot];
	let method = &member[dot + 1..];

	if path.is_empty() || method.is_empty() || method == "." {
		return None;
	}

	Some((path, method))
}
