//! Coordination of document stacks that mirror one logical file set.
//!
//! The [`SessionCoordinator`] owns every stack of a session and is the sole
//! subscriber of their event channel. Each operation runs on the target
//! stack and then drains the channel before returning: structural events are
//! replayed into every other stack in registration order, never back into
//! the stack that produced them. Sibling appliers publish nothing that fans
//! out again; at most a blank buffer they open lands in the registry. By the
//! time an operation returns every stack has a consistent view.
//!
//! The first registered stack is authoritative for session-global concerns;
//! breakpoints are persisted once, through its store.

mod registry;


use std::path::Path;
use std::time::Duration;

pub use registry::{Registry, Replica};

use crate::analysis::{AnalysisScheduler, Scope};
use crate::breakpoints::Breakpoint;
use crate::config::SessionConfig;
use crate::document::{DocKey, DocumentId};
use crate::error::{Result, SessionError};
use crate::stack::events::{self, EventReceiver, EventSender, StackEvent, StackMessage};
use crate::stack::{BatchOutcome, CloseOutcome, DocumentStack, ExternalChange, SaveOutcome, StackContext, StackId};

/// Owner of all stacks of one session.
pub struct SessionCoordinator {
	config: SessionConfig,
	ctx: StackContext,
	scheduler: AnalysisScheduler,
	stacks: Vec<DocumentStack>,
	registry: Registry,
	events_tx: EventSender,
	events_rx: EventReceiver,
}

impl std::fmt::Debug for SessionCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionCoordinator")
			.field("stacks", &self.stack_ids())
			.field("documents", &self.registry.len())
			.finish_non_exhaustive()
	}
}

impl SessionCoordinator {
	pub fn new(config: SessionConfig, ctx: StackContext) -> Self {
		let scheduler = AnalysisScheduler::new(&config.analysis);
		let (events_tx, events_rx) = events::channel();
		Self {
			config,
			ctx,
			scheduler,
			stacks: Vec::new(),
			registry: Registry::default(),
			events_tx,
			events_rx,
		}
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn scheduler(&self) -> &AnalysisScheduler {
		&self.scheduler
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	/// Stack ids in registration order.
	pub fn stack_ids(&self) -> Vec<StackId> {
		self.stacks.iter().map(DocumentStack::id).collect()
	}

	/// The stack responsible for session-global concerns.
	pub fn authoritative(&self) -> Option<StackId> {
		self.stacks.first().map(DocumentStack::id)
	}

	pub fn stack(&self, id: StackId) -> Option<&DocumentStack> {
		self.stacks.iter().find(|stack| stack.id() == id)
	}

	fn position(&self, id: StackId) -> Result<usize> {
		self.stacks.iter().position(|stack| stack.id() == id).ok_or(SessionError::UnknownStack(id))
	}

	/// Registers a new, empty stack.
	pub fn add_stack(&mut self) -> StackId {
		let stack = DocumentStack::new(self.config.stack.clone(), self.ctx.clone(), self.scheduler.clone())
			.with_events(self.events_tx.clone());
		let id = stack.id();
		self.stacks.push(stack);
		tracing::info!(stack = id.0, authoritative = self.stacks.len() == 1, "session.add_stack");
		id
	}

	/// Splits `source`: the new stack holds a replica of every document.
	pub fn split(&mut self, source: StackId) -> Result<StackId> {
		let position = self.position(source)?;
		let clone = self.stacks[position].clone_for_split(Some(self.events_tx.clone()));
		let id = clone.id();
		for doc in clone.documents() {
			self.registry.insert(
				doc.key().clone(),
				Replica {
					stack: id,
					document: doc.id(),
				},
			);
		}
		self.stacks.push(clone);
		tracing::info!(source = source.0, stack = id.0, "session.split");
		self.dispatch_events();
		Ok(id)
	}

	/// Tears down a view.
	///
	/// Documents that only this stack holds go through the close protocol;
	/// documents mirrored elsewhere are dropped silently. Returns false and
	/// leaves the stack in place if the user cancelled or kept a document.
	pub fn remove_stack(&mut self, id: StackId) -> Result<bool> {
		let position = self.position(id)?;
		let sole: Vec<usize> = self.stacks[position]
			.documents()
			.iter()
			.enumerate()
			.filter(|(_, doc)| self.registry.replicas(doc.key()).len() <= 1)
			.map(|(index, _)| index)
			.collect();

		let outcome = if sole.is_empty() {
			BatchOutcome::default()
		} else {
			self.with_stack(id, |stack| stack.close_many(&sole))??
		};
		if outcome.cancelled || !outcome.kept.is_empty() {
			tracing::info!(stack = id.0, kept = outcome.kept.len(), cancelled = outcome.cancelled, "session.remove_stack.aborted");
			return Ok(false);
		}

		let position = self.position(id)?;
		let mut stack = self.stacks.remove(position);
		let detached = stack.detach_all();
		self.registry.remove_stack(id);

		let scheduler = self.scheduler.clone();
		let report = scheduler.close_scope_with(Scope::Stack(id), || self.dispatch_events());
		drop(stack);
		self.dispatch_events();
		tracing::info!(stack = id.0, detached = detached.len(), abandoned = report.abandoned, "session.remove_stack");
		Ok(true)
	}

	/// Runs `f` on stack `id`, then propagates whatever it published.
	pub fn with_stack<R>(&mut self, id: StackId, f: impl FnOnce(&mut DocumentStack) -> R) -> Result<R> {
		let position = self.position(id)?;
		let out = f(&mut self.stacks[position]);
		self.dispatch_events();
		Ok(out)
	}

	pub fn new_document(&mut self, stack: StackId) -> Result<usize> {
		self.with_stack(stack, DocumentStack::new_document)
	}

	pub fn open(&mut self, stack: StackId, path: &Path) -> Result<usize> {
		self.with_stack(stack, |stack| stack.open(path))?
	}

	pub fn focus(&mut self, stack: StackId, index: usize) -> Result<ExternalChange> {
		self.with_stack(stack, |stack| stack.focus(index))?
	}

	pub fn save(&mut self, stack: StackId, index: usize, force: bool) -> Result<SaveOutcome> {
		self.with_stack(stack, |stack| stack.save(index, force))?
	}

	pub fn save_as(&mut self, stack: StackId, index: usize) -> Result<SaveOutcome> {
		self.with_stack(stack, |stack| stack.save_as(index))?
	}

	pub fn save_all(&mut self) -> Result<usize> {
		let mut saved = 0;
		for id in self.stack_ids() {
			saved += self.with_stack(id, DocumentStack::save_all)??;
		}
		Ok(saved)
	}

	pub fn close(&mut self, stack: StackId, index: usize, force: bool) -> Result<CloseOutcome> {
		self.with_stack(stack, |stack| stack.close(index, force))?
	}

	pub fn close_all(&mut self, stack: StackId) -> Result<BatchOutcome> {
		self.with_stack(stack, DocumentStack::close_all)?
	}

	pub fn revert(&mut self, stack: StackId, index: usize) -> Result<bool> {
		self.with_stack(stack, |stack| stack.revert(index))?
	}

	/// Renames `old_path` to `new_path` in `stack` and every sibling holding it.
	pub fn rename(&mut self, stack: StackId, old_path: &Path, new_path: &Path) -> Result<bool> {
		self.with_stack(stack, |stack| stack.rename_in_place(old_path, new_path))?
	}

	/// Applies queued analysis results and due realtime scans in every stack.
	pub fn poll(&mut self) -> usize {
		let applied = self.stacks.iter_mut().map(DocumentStack::poll_analysis).sum();
		self.dispatch_events();
		applied
	}

	/// Polls every stack until its analysis settles or `timeout` passes.
	pub fn wait_for_analysis(&mut self, timeout: Duration) -> usize {
		let applied = self.stacks.iter_mut().map(|stack| stack.wait_for_analysis(timeout)).sum();
		self.dispatch_events();
		applied
	}

	/// Whether any open document has changes worth a prompt, including
	/// documents the user chose to keep during a batch close.
	pub fn has_unsaved_changes(&self) -> bool {
		!self.unsaved_documents().is_empty()
	}

	/// Logical documents with unsaved changes, once each.
	pub fn unsaved_documents(&self) -> Vec<DocKey> {
		let mut keys: Vec<DocKey> = self
			.stacks
			.iter()
			.flat_map(|stack| stack.documents().iter())
			.filter(|doc| doc.needs_confirmation())
			.map(|doc| doc.key().clone())
			.collect();
		keys.sort();
		keys.dedup();
		keys
	}

	/// Every replica of `key` across stacks.
	pub fn replicas(&self, key: &DocKey) -> &[Replica] {
		self.registry.replicas(key)
	}

	/// Replaces the configuration of the pool and every stack.
	pub fn apply_config(&mut self, config: SessionConfig) {
		self.scheduler.apply_config(&config.analysis);
		for stack in &mut self.stacks {
			stack.apply_config(config.stack.clone());
		}
		self.config = config;
		self.dispatch_events();
		tracing::debug!("session.apply_config");
	}

	/// Cancels all analysis and waits for running checkers.
	pub fn shutdown(&mut self) {
		let report = self.scheduler.close_scope(Scope::Global);
		tracing::info!(stacks = self.stacks.len(), abandoned = report.abandoned, "session.shutdown");
	}

	/// Drains the event channel, updating the registry and fanning out.
	pub fn dispatch_events(&mut self) {
		while let Ok(message) = self.events_rx.try_recv() {
			self.handle(message);
		}
	}

	fn handle(&mut self, StackMessage { origin, event }: StackMessage) {
		tracing::trace!(origin = origin.0, event = event.name(), "session.event");
		match event {
			StackEvent::Opened { key, document } => {
				self.registry.insert(key, Replica { stack: origin, document });
			}
			StackEvent::Closed { key, document } => {
				self.registry.remove(&key, Replica { stack: origin, document });
				self.fan_out(origin, &key, |stack| stack.apply_remote_close(&key));
				self.registry.remove_key(&key);
			}
			StackEvent::Saved {
				old,
				new,
				modified_on_disk,
			} => {
				self.fan_out(origin, &old, |stack| stack.apply_remote_save(&old, &new, modified_on_disk));
				self.registry.rekey(&old, DocKey::File(new));
			}
			StackEvent::Renamed { old, new } => {
				self.fan_out(origin, &old, |stack| stack.apply_remote_rename(&old, &new));
				self.registry.rekey(&old, DocKey::File(new));
			}
			StackEvent::Reloaded { key, modified_on_disk } => {
				self.fan_out(origin, &key, |stack| stack.apply_remote_reload(&key, modified_on_disk));
			}
			StackEvent::BreakpointsChanged { key, breakpoints } => {
				self.fan_out(origin, &key, |stack| stack.apply_remote_breakpoints(&key, &breakpoints));
				self.persist_breakpoints(&key, &breakpoints);
			}
		}
	}

	/// Applies an event to every stack but `origin`, in registration order.
	fn fan_out(&mut self, origin: StackId, key: &DocKey, mut apply: impl FnMut(&mut DocumentStack) -> Option<DocumentId>) {
		let mut touched = 0;
		for stack in self.stacks.iter_mut().filter(|stack| stack.id() != origin) {
			if apply(stack).is_some() {
				touched += 1;
			}
		}
		if touched > 0 {
			tracing::debug!(origin = origin.0, key = %key, siblings = touched, "session.fanout");
		}
	}

	fn persist_breakpoints(&self, key: &DocKey, breakpoints: &[Breakpoint]) {
		let Some(path) = key.path() else {
			return;
		};
		let Some(authority) = self.stacks.first() else {
			return;
		};
		if let Err(err) = authority.context().breakpoints.save(path, breakpoints) {
			tracing::warn!(path = %path.display(), error = %err, "session.breakpoints.persist_failed");
		}
	}
}
