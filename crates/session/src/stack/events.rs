//! Outbound structural events of a document stack.
//!
//! A stack publishes what happened to its documents on an unbounded channel.
//! The session coordinator is the single subscriber: it keeps the replica
//! registry current and replays the events into sibling stacks. Sibling
//! handlers apply events without publishing, so nothing is ever echoed back.

use std::path::PathBuf;
use std::time::SystemTime;

use tokio::sync::mpsc;

use super::StackId;
use crate::breakpoints::Breakpoint;
use crate::document::{DocKey, DocumentId};

/// Something a stack did to one of its documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
	/// A document was added to the stack.
	Opened { key: DocKey, document: DocumentId },
	/// A document left the stack through the close protocol.
	Closed { key: DocKey, document: DocumentId },
	/// A document was written, possibly under a new path.
	Saved {
		old: DocKey,
		new: PathBuf,
		modified_on_disk: Option<SystemTime>,
	},
	/// A document's path changed without a write.
	Renamed { old: DocKey, new: PathBuf },
	/// A document was reloaded from disk.
	Reloaded {
		key: DocKey,
		modified_on_disk: Option<SystemTime>,
	},
	BreakpointsChanged { key: DocKey, breakpoints: Vec<Breakpoint> },
}

impl StackEvent {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Opened { .. } => "opened",
			Self::Closed { .. } => "closed",
			Self::Saved { .. } => "saved",
			Self::Renamed { .. } => "renamed",
			Self::Reloaded { .. } => "reloaded",
			Self::BreakpointsChanged { .. } => "breakpoints_changed",
		}
	}
}

/// An event tagged with the stack that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMessage {
	pub origin: StackId,
	pub event: StackEvent,
}

pub type EventSender = mpsc::UnboundedSender<StackMessage>;
pub type EventReceiver = mpsc::UnboundedReceiver<StackMessage>;

/// Creates the channel a coordinator drains.
pub fn channel() -> (EventSender, EventReceiver) {
	mpsc::unbounded_channel()
}
