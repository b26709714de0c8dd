use super::{CheckerKind, Finding};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
	NotExpected,
	Waiting,
	Arrived(Vec<Finding>),
}

/// Counting barrier that combines the lint and style results of one scan
/// generation.
///
/// The joined list is released exactly once, when every expected kind has
/// arrived. Lint findings come first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisJoin {
	generation: u64,
	lint: Slot,
	style: Slot,
	remaining: usize,
}

impl AnalysisJoin {
	/// Barrier for `generation` waiting on the code-analysis kinds in `expected`.
	pub fn new(generation: u64, expected: &[CheckerKind]) -> Self {
		let slot = |kind| {
			if expected.contains(&kind) {
				Slot::Waiting
			} else {
				Slot::NotExpected
			}
		};
		let lint = slot(CheckerKind::Lint);
		let style = slot(CheckerKind::Style);
		let remaining = [&lint, &style].iter().filter(|slot| ***slot == Slot::Waiting).count();
		Self {
			generation,
			lint,
			style,
			remaining,
		}
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Kinds still outstanding.
	pub fn remaining(&self) -> usize {
		self.remaining
	}

	/// Records one arrival. Returns the joined findings when this was the last
	/// expected kind; duplicate or unexpected arrivals are ignored.
	pub fn arrive(&mut self, kind: CheckerKind, findings: Vec<Finding>) -> Option<Vec<Finding>> {
		let slot = match kind {
			CheckerKind::Lint => &mut self.lint,
			CheckerKind::Style => &mut self.style,
			CheckerKind::Todo => return None,
		};
		if *slot != Slot::Waiting {
			tracing::trace!(generation = self.generation, %kind, "analysis.join.ignored");
			return None;
		}
		*slot = Slot::Arrived(findings);
		self.remaining -= 1;
		if self.remaining > 0 {
			return None;
		}

		let mut joined = Vec::new();
		for slot in [&mut self.lint, &mut self.style] {
			if let Slot::Arrived(findings) = slot {
				joined.append(findings);
			}
		}
		Some(joined)
	}
}
