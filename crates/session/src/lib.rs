#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Document session management for a multi-view text editor.
//!
//! A session holds one or more [`DocumentStack`]s, each the ordered tab set
//! of one editor view. The same file may be open in several stacks at once;
//! its replicas share a single [`SharedText`] buffer, and the
//! [`SessionCoordinator`] replays structural changes (save-as, rename,
//! close, reload, breakpoints) made in one stack into its siblings.
//!
//! Background checkers run on the bounded [`AnalysisScheduler`] pool and
//! hand back plain values. A stack applies a result only while the document
//! is still open and the result's scan generation is current, so stale or
//! orphaned results are dropped rather than written into live state.
//!
//! ```text
//!   UI action ──► SessionCoordinator ──► DocumentStack ──► DocumentState
//!                        ▲                    │    │
//!                        └── StackEvent ──────┘    └──► AnalysisScheduler ──► Checker
//! ```

mod analysis;
mod breakpoints;
mod collab;
mod config;
mod document;
mod encoding;
mod error;
mod fs;
mod mru;
mod session;
mod stack;
mod switcher;
#[cfg(test)]
mod test_support;

pub use analysis::{
	AnalysisJoin, AnalysisOutput, AnalysisScheduler, Checker, CheckerError, CheckerKind, CheckerSet, Finding, FnChecker, SchedulerStats, Scope,
	Ticket, TodoChecker,
};
pub use breakpoints::{Breakpoint, BreakpointStore, JsonBreakpointStore, MemoryBreakpointStore, default_store_path};
pub use collab::{Answer, ConfirmKind, DefaultTemplate, EmptyTemplate, Interaction, TemplateProvider, Unattended};
pub use config::{AnalysisConfig, ConfigError, DocumentStackConfig, SessionConfig};
pub use document::{DocKey, DocumentId, DocumentState, Language, SharedText};
pub use encoding::{Decoded, Encoding, LineEnding, decode, encode, normalize_line_endings, strip_trailing_whitespace};
pub use error::{Result, SessionError};
pub use fs::{FileSystem, OsFileSystem};
pub use mru::{MruHistory, StaleEntry};
pub use session::{Registry, Replica, SessionCoordinator};
pub use stack::events::{StackEvent, StackMessage};
pub use stack::{BatchOutcome, CloseOutcome, DocumentStack, ExternalChange, SaveOutcome, StackContext, StackId};
pub use switcher::{Direction, SwitcherEntry, TabSwitcher};
pub use xeno_worker::DrainReport;
