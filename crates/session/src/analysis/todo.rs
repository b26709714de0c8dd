use std::sync::LazyLock;

use regex::Regex;

use super::{Checker, CheckerError, CheckerKind, Finding};

const DEFAULT_MARKERS: &[&str] = &["TODO", "FIXME", "XXX", "HINT", "TIP", "@todo", "HACK", "BUG", "OPTIMIZE", "!!!", "???"];

static DEFAULT_PATTERN: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(&marker_pattern(DEFAULT_MARKERS)).expect("valid task marker regex"));

fn marker_pattern(markers: &[&str]) -> String {
	let alternatives: Vec<String> = markers.iter().map(|marker| regex::escape(marker)).collect();
	format!(r"(?:^|#)[ ]*({})([^#]*)", alternatives.join("|"))
}

/// Finds task markers at line start or after a `#`.
///
/// Each hit yields the text after the marker (trimmed of spaces and colons,
/// first letter capitalized), or the marker itself when nothing follows.
#[derive(Debug, Clone)]
pub struct TodoChecker {
	pattern: Regex,
}

impl Default for TodoChecker {
	fn default() -> Self {
		Self {
			pattern: DEFAULT_PATTERN.clone(),
		}
	}
}

impl TodoChecker {
	/// Checker for a custom marker list.
	pub fn with_markers(markers: &[&str]) -> Result<Self, regex::Error> {
		Ok(Self {
			pattern: Regex::new(&marker_pattern(markers))?,
		})
	}

	pub fn find(&self, text: &str) -> Vec<Finding> {
		let mut findings = Vec::new();
		for (index, line) in text.lines().enumerate() {
			for caps in self.pattern.captures_iter(line) {
				let marker = caps.get(1).map_or("", |m| m.as_str());
				let rest = caps.get(2).map_or("", |m| m.as_str()).trim_matches([' ', ':']);
				let message = if rest.is_empty() { marker.to_string() } else { capitalize(rest) };
				findings.push(Finding::new(message, index as u32 + 1));
			}
		}
		findings
	}
}

impl Checker for TodoChecker {
	fn kind(&self) -> CheckerKind {
		CheckerKind::Todo
	}

	fn check(&self, text: &str) -> Result<Vec<Finding>, CheckerError> {
		Ok(self.find(text))
	}
}

fn capitalize(text: &str) -> String {
	let mut chars = text.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
		None => String::new(),
	}
}
