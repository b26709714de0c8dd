//! Bounded FIFO worker pool with scope-level cancellation and drain.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::panic_message;


/// Longest single condvar wait during a drain before the pump runs again.
const DRAIN_SLICE: Duration = Duration::from_millis(10);

/// Identifier of one submitted job, unique per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Construction parameters for a [`ScopedPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
	/// Name used in trace output.
	pub name: &'static str,
	/// Maximum number of jobs running at once. Values below 1 are treated as 1.
	pub max_concurrency: usize,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			name: "worker",
			max_concurrency: 2,
		}
	}
}

/// A job body panicked; the payload message is preserved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job panicked: {0}")]
pub struct JobPanic(pub String);

/// Output of one finished job, delivered exactly once through [`ScopedPool::take_completed`].
#[derive(Debug)]
pub struct Completion<K, T> {
	pub id: JobId,
	pub scope: K,
	pub subject: u64,
	pub output: Result<T, JobPanic>,
}

/// Summary of a cancel-and-drain operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
	/// Pending jobs dropped before they started.
	pub cancelled: usize,
	/// Running jobs the drain waited on.
	pub waited: usize,
	/// Running jobs still unfinished when the drain deadline passed.
	///
	/// Their outputs are discarded whenever they finish.
	pub abandoned: usize,
}

impl DrainReport {
	/// Returns true when every affected job stopped before the drain returned.
	pub fn is_clean(&self) -> bool {
		self.abandoned == 0
	}
}

/// Counters and gauges for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
	pub submitted: u64,
	pub delivered: u64,
	pub discarded: u64,
	pub cancelled: u64,
	pub panicked: u64,
	pub pending: usize,
	pub running: usize,
}

type Work<T> = Box<dyn FnOnce() -> T + Send + 'static>;

struct PendingJob<K, T> {
	id: JobId,
	scope: K,
	subject: u64,
	work: Work<T>,
}

struct RunningJob<K> {
	scope: K,
	subject: u64,
}

struct ScopeSlot<K, T> {
	token: CancellationToken,
	completed: VecDeque<Completion<K, T>>,
}

impl<K, T> ScopeSlot<K, T> {
	fn new() -> Self {
		Self {
			token: CancellationToken::new(),
			completed: VecDeque::new(),
		}
	}
}

/// Selects the jobs affected by a cancellation.
enum Target<'a, K> {
	All,
	Scope(&'a K),
	Subject(&'a K, u64),
}

impl<K: Eq> Target<'_, K> {
	fn matches(&self, scope: &K, subject: u64) -> bool {
		match self {
			Self::All => true,
			Self::Scope(target) => *target == scope,
			Self::Subject(target, id) => *target == scope && *id == subject,
		}
	}

	/// Whether the whole scope closes, not just some of its jobs.
	fn closes_scope(&self, scope: &K) -> bool {
		match self {
			Self::All => true,
			Self::Scope(target) => *target == scope,
			Self::Subject(..) => false,
		}
	}
}

struct PoolState<K, T> {
	max_concurrency: usize,
	next_id: u64,
	pending: VecDeque<PendingJob<K, T>>,
	running: FxHashMap<JobId, RunningJob<K>>,
	/// Running jobs whose output must be dropped on finish.
	discard: FxHashSet<JobId>,
	scopes: FxHashMap<K, ScopeSlot<K, T>>,
	stats: PoolStats,
}

impl<K: Eq, T> PoolState<K, T> {
	fn outstanding(&self, scope: &K) -> usize {
		let pending = self.pending.iter().filter(|job| job.scope == *scope).count();
		let running = self
			.running
			.iter()
			.filter(|(id, job)| job.scope == *scope && !self.discard.contains(*id))
			.count();
		pending + running
	}
}

struct Shared<K, T> {
	name: &'static str,
	state: Mutex<PoolState<K, T>>,
	changed: Condvar,
	ready: Arc<Notify>,
}

/// Bounded, scope-aware pool of blocking jobs.
///
/// Cloning yields another handle to the same pool.
pub struct ScopedPool<K, T> {
	shared: Arc<Shared<K, T>>,
}

impl<K, T> Clone for ScopedPool<K, T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<K, T> fmt::Debug for ScopedPool<K, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScopedPool").field("name", &self.shared.name).finish_non_exhaustive()
	}
}

impl<K, T> Shared<K, T>
where
	K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
	T: Send + 'static,
{
	/// Starts pending jobs until the concurrency cap is reached.
	fn dispatch(self: &Arc<Self>, state: &mut PoolState<K, T>) {
		while state.running.len() < state.max_concurrency {
			let Some(PendingJob { id, scope, subject, work }) = state.pending.pop_front() else {
				break;
			};
			let Some(token) = state.scopes.get(&scope).map(|slot| slot.token.clone()) else {
				state.stats.discarded += 1;
				continue;
			};

			tracing::trace!(pool = self.name, job = id.0, ?scope, subject, running = state.running.len() + 1, "worker.pool.start");
			state.running.insert(id, RunningJob { scope, subject });

			let shared = Arc::clone(self);
			let _detached = crate::spawn_blocking(self.name, move || {
				let output = if token.is_cancelled() {
					None
				} else {
					Some(catch_unwind(AssertUnwindSafe(work)).map_err(|payload| JobPanic(panic_message(payload.as_ref()))))
				};
				shared.finish(id, output);
			});
		}
	}

	/// Records a finished job and refills the running set.
	fn finish(self: &Arc<Self>, id: JobId, output: Option<Result<T, JobPanic>>) {
		let delivered = {
			let mut guard = self.state.lock();
			let state = &mut *guard;
			let Some(job) = state.running.remove(&id) else {
				return;
			};
			let discard = state.discard.remove(&id);

			let delivered = match output {
				None => {
					tracing::trace!(pool = self.name, job = id.0, "worker.pool.skip_cancelled");
					state.stats.discarded += 1;
					false
				}
				Some(output) => {
					if let Err(panic) = &output {
						state.stats.panicked += 1;
						tracing::warn!(pool = self.name, job = id.0, error = %panic, "worker.pool.panic");
					}
					match state.scopes.get_mut(&job.scope) {
						Some(slot) if !discard => {
							slot.completed.push_back(Completion {
								id,
								scope: job.scope,
								subject: job.subject,
								output,
							});
							state.stats.delivered += 1;
							true
						}
						_ => {
							tracing::trace!(pool = self.name, job = id.0, "worker.pool.discard");
							state.stats.discarded += 1;
							false
						}
					}
				}
			};

			self.dispatch(state);
			delivered
		};

		self.changed.notify_all();
		if delivered {
			self.ready.notify_one();
		}
	}
}

impl<K, T> ScopedPool<K, T>
where
	K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
	T: Send + 'static,
{
	/// Creates an empty pool.
	pub fn new(config: PoolConfig) -> Self {
		Self {
			shared: Arc::new(Shared {
				name: config.name,
				state: Mutex::new(PoolState {
					max_concurrency: config.max_concurrency.max(1),
					next_id: 0,
					pending: VecDeque::new(),
					running: FxHashMap::default(),
					discard: FxHashSet::default(),
					scopes: FxHashMap::default(),
					stats: PoolStats::default(),
				}),
				changed: Condvar::new(),
				ready: Arc::new(Notify::new()),
			}),
		}
	}

	/// Returns the pool name.
	pub fn name(&self) -> &'static str {
		self.shared.name
	}

	/// Enqueues `work` for `scope` and `subject`. Never blocks on running jobs.
	pub fn submit<F>(&self, scope: K, subject: u64, work: F) -> JobId
	where
		F: FnOnce() -> T + Send + 'static,
	{
		let mut state = self.shared.state.lock();
		let id = JobId(state.next_id);
		state.next_id = state.next_id.wrapping_add(1);
		state.stats.submitted += 1;
		state.scopes.entry(scope.clone()).or_insert_with(ScopeSlot::new);
		tracing::trace!(
			pool = self.shared.name,
			job = id.0,
			?scope,
			subject,
			pending = state.pending.len() + 1,
			running = state.running.len(),
			"worker.pool.submit"
		);
		state.pending.push_back(PendingJob {
			id,
			scope,
			subject,
			work: Box::new(work),
		});
		self.shared.dispatch(&mut state);
		id
	}

	/// Removes and returns every completion queued for `scope`.
	pub fn take_completed(&self, scope: &K) -> Vec<Completion<K, T>> {
		let mut state = self.shared.state.lock();
		state
			.scopes
			.get_mut(scope)
			.map(|slot| slot.completed.drain(..).collect())
			.unwrap_or_default()
	}

	/// Pending plus running jobs of `scope` whose output will still be delivered.
	pub fn outstanding(&self, scope: &K) -> usize {
		self.shared.state.lock().outstanding(scope)
	}

	/// Blocks until `scope` has a queued completion, nothing left outstanding, or `timeout` passes.
	///
	/// Returns true when a completion is ready to take.
	pub fn wait_for_completions(&self, scope: &K, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut state = self.shared.state.lock();
		loop {
			if state.scopes.get(scope).is_some_and(|slot| !slot.completed.is_empty()) {
				return true;
			}
			if state.outstanding(scope) == 0 {
				return false;
			}
			if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
				return state.scopes.get(scope).is_some_and(|slot| !slot.completed.is_empty());
			}
		}
	}

	/// Closes `scope`: drops its pending jobs and queued completions, then waits
	/// up to `timeout` for its running jobs, calling `pump` between waits.
	///
	/// Once this returns, no output of a job submitted under `scope` so far is
	/// ever delivered.
	pub fn close_scope(&self, scope: &K, timeout: Duration, pump: impl FnMut()) -> DrainReport {
		self.cancel(Target::Scope(scope), timeout, pump)
	}

	/// Closes every scope.
	pub fn close_all(&self, timeout: Duration, pump: impl FnMut()) -> DrainReport {
		self.cancel(Target::All, timeout, pump)
	}

	/// Cancels and drains the jobs of one subject inside `scope`; the scope stays open.
	pub fn cancel_subject(&self, scope: &K, subject: u64, timeout: Duration, pump: impl FnMut()) -> DrainReport {
		self.cancel(Target::Subject(scope, subject), timeout, pump)
	}

	/// Changes the concurrency cap, starting queued jobs if it grew.
	pub fn set_max_concurrency(&self, max_concurrency: usize) {
		let mut state = self.shared.state.lock();
		state.max_concurrency = max_concurrency.max(1);
		self.shared.dispatch(&mut state);
	}

	/// Returns a snapshot of the pool counters.
	pub fn stats(&self) -> PoolStats {
		let state = self.shared.state.lock();
		PoolStats {
			pending: state.pending.len(),
			running: state.running.len(),
			..state.stats
		}
	}

	/// Notifier signalled whenever a completion is queued for any scope.
	pub fn ready_notifier(&self) -> Arc<Notify> {
		Arc::clone(&self.shared.ready)
	}

	fn cancel(&self, target: Target<'_, K>, timeout: Duration, mut pump: impl FnMut()) -> DrainReport {
		let mut state = self.shared.state.lock();

		let before = state.pending.len();
		state.pending.retain(|job| !target.matches(&job.scope, job.subject));
		let cancelled = before - state.pending.len();
		state.stats.cancelled += cancelled as u64;

		let doomed: Vec<JobId> = state
			.running
			.iter()
			.filter(|(_, job)| target.matches(&job.scope, job.subject))
			.map(|(id, _)| *id)
			.collect();
		state.discard.extend(doomed.iter().copied());

		let mut dropped = 0;
		match target {
			Target::Subject(scope, subject) => {
				if let Some(slot) = state.scopes.get_mut(scope) {
					let before = slot.completed.len();
					slot.completed.retain(|done| done.subject != subject);
					dropped = before - slot.completed.len();
				}
			}
			_ => {
				let closing: Vec<K> = state.scopes.keys().filter(|scope| target.closes_scope(scope)).cloned().collect();
				for scope in closing {
					if let Some(slot) = state.scopes.remove(&scope) {
						slot.token.cancel();
						dropped += slot.completed.len();
					}
				}
			}
		}
		state.stats.discarded += dropped as u64;

		tracing::debug!(
			pool = self.shared.name,
			cancelled,
			running = doomed.len(),
			dropped,
			"worker.pool.cancel"
		);

		let deadline = Instant::now() + timeout;
		let mut abandoned = 0;
		loop {
			let remaining = doomed.iter().filter(|id| state.running.contains_key(*id)).count();
			if remaining == 0 {
				break;
			}
			let now = Instant::now();
			if now >= deadline {
				abandoned = remaining;
				tracing::warn!(pool = self.shared.name, abandoned, "worker.pool.drain_timeout");
				break;
			}
			self.shared.changed.wait_for(&mut state, (deadline - now).min(DRAIN_SLICE));
			MutexGuard::unlocked(&mut state, &mut pump);
		}

		DrainReport {
			cancelled,
			waited: doomed.len(),
			abandoned,
		}
	}
}
