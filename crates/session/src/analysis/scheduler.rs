use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use xeno_worker::{DrainReport, PoolConfig, ScopedPool, panic_message};

use super::{Checker, CheckerKind, Finding, Scope, Ticket};
use crate::config::AnalysisConfig;
use crate::document::DocumentId;

/// Result of one checker run, tagged for the staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutput {
	pub document: DocumentId,
	pub generation: u64,
	pub kind: CheckerKind,
	/// Empty when the checker failed.
	pub findings: Vec<Finding>,
	/// Failure message of an erroring or panicking checker.
	pub error: Option<String>,
}

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
	pub submitted: u64,
	/// Results queued for application.
	pub completed: u64,
	/// Results dropped because their scope or document was closed.
	pub discarded: u64,
	/// Jobs dropped before they started.
	pub cancelled: u64,
	/// Checker runs that errored or panicked.
	pub failed: u64,
	pub pending: usize,
	pub running: usize,
}

struct Counters {
	failed: AtomicU64,
	drain_timeout_ms: AtomicU64,
}

/// Bounded pool running checkers off the coordination thread.
///
/// Cloning yields another handle to the same pool; every stack of a session
/// holds one, each submitting under its own [`Scope`].
#[derive(Clone)]
pub struct AnalysisScheduler {
	pool: ScopedPool<Scope, AnalysisOutput>,
	counters: Arc<Counters>,
}

impl std::fmt::Debug for AnalysisScheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AnalysisScheduler")
			.field("stats", &self.stats())
			.field("drain_timeout", &self.drain_timeout())
			.finish()
	}
}

impl Default for AnalysisScheduler {
	fn default() -> Self {
		Self::new(&AnalysisConfig::default())
	}
}

impl AnalysisScheduler {
	pub fn new(config: &AnalysisConfig) -> Self {
		Self {
			pool: ScopedPool::new(PoolConfig {
				name: "analysis",
				max_concurrency: config.max_concurrency,
			}),
			counters: Arc::new(Counters {
				failed: AtomicU64::new(0),
				drain_timeout_ms: AtomicU64::new(config.drain_timeout_ms),
			}),
		}
	}

	/// Applies new pool limits; queued work starts immediately if the cap grew.
	pub fn apply_config(&self, config: &AnalysisConfig) {
		self.pool.set_max_concurrency(config.max_concurrency);
		self.counters.drain_timeout_ms.store(config.drain_timeout_ms, Ordering::Relaxed);
	}

	pub fn set_max_concurrency(&self, max_concurrency: usize) {
		self.pool.set_max_concurrency(max_concurrency);
	}

	/// Upper bound on the cooperative wait in [`Self::close_scope`].
	pub fn drain_timeout(&self) -> Duration {
		Duration::from_millis(self.counters.drain_timeout_ms.load(Ordering::Relaxed))
	}

	/// Enqueues `checker` against `text`. Never blocks.
	pub fn submit(&self, scope: Scope, document: DocumentId, generation: u64, checker: Arc<dyn Checker>, text: Arc<str>) -> Ticket {
		let kind = checker.kind();
		let counters = Arc::clone(&self.counters);
		let job = self.pool.submit(scope, document.0, move || {
			let started = Instant::now();
			let (findings, error) = match catch_unwind(AssertUnwindSafe(|| checker.check(&text))) {
				Ok(Ok(findings)) => (findings, None),
				Ok(Err(err)) => (Vec::new(), Some(err.0)),
				Err(payload) => (Vec::new(), Some(panic_message(payload.as_ref()))),
			};
			if let Some(error) = &error {
				counters.failed.fetch_add(1, Ordering::Relaxed);
				tracing::warn!(document = document.0, generation, %kind, error, "analysis.checker_failed");
			} else {
				tracing::trace!(
					document = document.0,
					generation,
					%kind,
					findings = findings.len(),
					elapsed_ms = started.elapsed().as_millis() as u64,
					"analysis.checker_done"
				);
			}
			AnalysisOutput {
				document,
				generation,
				kind,
				findings,
				error,
			}
		});
		tracing::trace!(?scope, document = document.0, generation, %kind, job = job.get(), "analysis.submit");
		Ticket {
			job,
			document,
			generation,
			kind,
		}
	}

	/// Removes and returns every result queued for `scope`.
	pub fn take_completed(&self, scope: Scope) -> Vec<AnalysisOutput> {
		self.pool
			.take_completed(&scope)
			.into_iter()
			.filter_map(|completion| match completion.output {
				Ok(output) => Some(output),
				Err(panic) => {
					tracing::warn!(?scope, document = completion.subject, error = %panic, "analysis.lost_result");
					None
				}
			})
			.collect()
	}

	/// Jobs of `scope` whose results will still be delivered.
	pub fn outstanding(&self, scope: Scope) -> usize {
		self.pool.outstanding(&scope)
	}

	/// Blocks until a result for `scope` is queued, nothing is outstanding, or `timeout` passes.
	pub fn wait_for_completions(&self, scope: Scope, timeout: Duration) -> bool {
		self.pool.wait_for_completions(&scope, timeout)
	}

	/// Cancels pending jobs of `scope` and waits for its running ones.
	///
	/// Once this returns no result submitted under `scope` is ever delivered.
	/// [`Scope::Global`] closes every scope.
	pub fn close_scope(&self, scope: Scope) -> DrainReport {
		self.close_scope_with(scope, || {})
	}

	/// As [`Self::close_scope`], calling `pump` between waits so the caller can
	/// keep servicing its own queue.
	pub fn close_scope_with(&self, scope: Scope, pump: impl FnMut()) -> DrainReport {
		let timeout = self.drain_timeout();
		let report = match scope {
			Scope::Global => self.pool.close_all(timeout, pump),
			Scope::Stack(_) => self.pool.close_scope(&scope, timeout, pump),
		};
		tracing::debug!(
			?scope,
			cancelled = report.cancelled,
			waited = report.waited,
			abandoned = report.abandoned,
			"analysis.close_scope"
		);
		report
	}

	/// Closes `scope` without waiting for its running jobs; their results are
	/// still discarded when they finish.
	pub fn abandon_scope(&self, scope: Scope) {
		let report = self.pool.close_scope(&scope, Duration::ZERO, || {});
		if report.waited > 0 || report.cancelled > 0 {
			tracing::trace!(?scope, cancelled = report.cancelled, running = report.waited, "analysis.abandon_scope");
		}
	}

	/// Cancels and drains one document's jobs; the scope stays open.
	pub fn cancel_document(&self, scope: Scope, document: DocumentId) -> DrainReport {
		self.pool.cancel_subject(&scope, document.0, self.drain_timeout(), || {})
	}

	pub fn stats(&self) -> SchedulerStats {
		let pool = self.pool.stats();
		SchedulerStats {
			submitted: pool.submitted,
			completed: pool.delivered,
			discarded: pool.discarded,
			cancelled: pool.cancelled,
			failed: self.counters.failed.load(Ordering::Relaxed),
			pending: pool.pending,
			running: pool.running,
		}
	}

	/// Signalled whenever a result is queued for any scope.
	pub fn ready_notifier(&self) -> Arc<Notify> {
		self.pool.ready_notifier()
	}
}
