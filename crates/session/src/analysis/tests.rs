use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;
use crate::config::AnalysisConfig;
use crate::test_support::{EchoChecker, Gate, WAIT, init_tracing};

fn scheduler(max_concurrency: usize) -> AnalysisScheduler {
	AnalysisScheduler::new(&AnalysisConfig {
		max_concurrency,
		drain_timeout_ms: 5_000,
	})
}

fn collect(scheduler: &AnalysisScheduler, scope: Scope, expected: usize) -> Vec<AnalysisOutput> {
	let mut outputs = Vec::new();
	while outputs.len() < expected && scheduler.wait_for_completions(scope, WAIT) {
		outputs.extend(scheduler.take_completed(scope));
	}
	outputs
}

#[test]
fn join_releases_once_both_kinds_arrived() {
	let mut join = AnalysisJoin::new(3, &[CheckerKind::Lint, CheckerKind::Style]);
	assert_eq!(join.remaining(), 2);
	assert_eq!(join.arrive(CheckerKind::Style, vec![Finding::new("E501", 2)]), None);
	assert_eq!(join.arrive(CheckerKind::Style, vec![Finding::new("dup", 9)]), None);
	let joined = join.arrive(CheckerKind::Lint, vec![Finding::new("undefined name", 1)]);
	assert_eq!(joined, Some(vec![Finding::new("undefined name", 1), Finding::new("E501", 2)]));
	assert_eq!(join.arrive(CheckerKind::Lint, Vec::new()), None);
	assert_eq!(join.generation(), 3);
}

#[test]
fn join_with_single_kind_releases_on_first_arrival() {
	let mut join = AnalysisJoin::new(1, &[CheckerKind::Lint]);
	assert_eq!(join.arrive(CheckerKind::Style, vec![Finding::new("ignored", 1)]), None);
	assert_eq!(join.arrive(CheckerKind::Lint, Vec::new()), Some(Vec::new()));
}

#[test]
fn todo_checker_finds_markers() {
	let text = "x = 1  # TODO: fix this\n# FIXME\nplain line\nHACK around the parser # XXX later\n";
	let findings = TodoChecker::default().find(text);
	assert_eq!(
		findings,
		vec![
			Finding::new("Fix this", 1),
			Finding::new("FIXME", 2),
			Finding::new("Around the parser", 4),
			Finding::new("Later", 4),
		]
	);
}

#[test]
fn todo_checker_custom_markers() {
	let checker = TodoChecker::with_markers(&["NOTE"]).expect("valid markers");
	assert_eq!(checker.find("# NOTE: keep\n# TODO: skip\n"), vec![Finding::new("Keep", 1)]);
	assert_eq!(checker.kind(), CheckerKind::Todo);
}

#[test]
fn checker_set_keeps_one_checker_per_kind() {
	let set = CheckerSet::standard()
		.with(EchoChecker::new(CheckerKind::Style))
		.with(EchoChecker::new(CheckerKind::Lint));
	assert_eq!(set.code_kinds(), vec![CheckerKind::Lint, CheckerKind::Style]);
	assert!(set.get(CheckerKind::Todo).is_some());
	assert!(CheckerSet::default().code_kinds().is_empty());
}

#[test]
fn results_carry_document_and_generation() {
	init_tracing();
	let scheduler = scheduler(2);
	let scope = Scope::Stack(crate::stack::StackId::next());
	let document = crate::document::DocumentId::next();

	let ticket = scheduler.submit(scope, document, 7, EchoChecker::new(CheckerKind::Lint), Arc::from("x = 1\n"));
	assert_eq!(ticket.generation, 7);

	let outputs = collect(&scheduler, scope, 1);
	assert_eq!(
		outputs,
		vec![AnalysisOutput {
			document,
			generation: 7,
			kind: CheckerKind::Lint,
			findings: vec![Finding::new("lint:x = 1", 1)],
			error: None,
		}]
	);
	assert_eq!(scheduler.stats().completed, 1);
}

#[test]
fn failing_and_panicking_checkers_yield_empty_results() {
	let scheduler = scheduler(2);
	let scope = Scope::Stack(crate::stack::StackId::next());
	let document = crate::document::DocumentId::next();

	let failing = Arc::new(FnChecker::new(CheckerKind::Lint, |_: &str| Err(CheckerError("syntax error".into()))));
	let panicking = Arc::new(FnChecker::new(CheckerKind::Style, |_: &str| -> Result<Vec<Finding>, CheckerError> {
		panic!("style checker exploded")
	}));
	scheduler.submit(scope, document, 1, failing, Arc::from(""));
	scheduler.submit(scope, document, 1, panicking, Arc::from(""));

	let mut outputs = collect(&scheduler, scope, 2);
	outputs.sort_by_key(|output| output.kind.as_str());
	assert_eq!(outputs.len(), 2);
	assert!(outputs.iter().all(|output| output.findings.is_empty()));
	assert_eq!(outputs[0].error.as_deref(), Some("syntax error"));
	assert_eq!(outputs[1].error.as_deref(), Some("style checker exploded"));
	assert_eq!(scheduler.stats().failed, 2);
}

#[test]
fn close_scope_discards_in_flight_results() {
	let scheduler = scheduler(1);
	let scope = Scope::Stack(crate::stack::StackId::next());
	let document = crate::document::DocumentId::next();
	let gate = Gate::default();
	let checker = EchoChecker::gated(CheckerKind::Lint, gate.clone());

	scheduler.submit(scope, document, 1, checker.clone(), Arc::from("a"));
	scheduler.submit(scope, document, 2, checker.clone(), Arc::from("b"));

	let opener = {
		let gate = gate.clone();
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(30));
			gate.open();
		})
	};
	let report = scheduler.close_scope(scope);
	opener.join().expect("opener thread");

	assert_eq!(report.cancelled, 1);
	assert_eq!(report.waited, 1);
	assert!(report.is_clean());
	assert!(scheduler.take_completed(scope).is_empty());
	assert!(!scheduler.wait_for_completions(scope, Duration::from_millis(50)));
	assert_eq!(checker.runs(), 1);
}

#[test]
fn cancel_document_leaves_other_documents_alone() {
	let scheduler = scheduler(1);
	let scope = Scope::Stack(crate::stack::StackId::next());
	let gate = Gate::default();
	let first = crate::document::DocumentId::next();
	let second = crate::document::DocumentId::next();

	let blocker = EchoChecker::gated(CheckerKind::Todo, gate.clone());
	scheduler.submit(scope, first, 1, blocker, Arc::from("hold"));
	scheduler.submit(scope, second, 1, EchoChecker::new(CheckerKind::Lint), Arc::from("second"));
	scheduler.submit(scope, first, 1, EchoChecker::new(CheckerKind::Lint), Arc::from("first"));

	let report = scheduler.cancel_document(scope, second);
	assert_eq!(report.cancelled, 1);
	assert_eq!(report.waited, 0);
	gate.open();

	let outputs = collect(&scheduler, scope, 2);
	assert_eq!(outputs.len(), 2);
	assert!(outputs.iter().all(|output| output.document == first));
	assert_eq!(scheduler.outstanding(scope), 0);
}

#[test]
fn global_close_tears_down_every_scope() {
	let scheduler = scheduler(2);
	let a = Scope::Stack(crate::stack::StackId::next());
	let b = Scope::Stack(crate::stack::StackId::next());
	let document = crate::document::DocumentId::next();
	let gate = Gate::default();

	scheduler.submit(a, document, 1, EchoChecker::gated(CheckerKind::Lint, gate.clone()), Arc::from(""));
	scheduler.submit(b, document, 1, EchoChecker::gated(CheckerKind::Lint, gate.clone()), Arc::from(""));
	gate.open();
	scheduler.close_scope(Scope::Global);

	assert!(scheduler.take_completed(a).is_empty());
	assert!(scheduler.take_completed(b).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ready_notifier_fires_on_completion() {
	let scheduler = scheduler(1);
	let scope = Scope::Stack(crate::stack::StackId::next());
	let notified = scheduler.ready_notifier();
	let waiter = tokio::spawn(async move { notified.notified().await });

	scheduler.submit(scope, crate::document::DocumentId::next(), 1, EchoChecker::new(CheckerKind::Todo), Arc::from(""));
	tokio::time::timeout(WAIT, waiter).await.expect("notified in time").expect("waiter task");
	assert_eq!(scheduler.take_completed(scope).len(), 1);
}

#[test]
fn apply_config_updates_limits() {
	let scheduler = AnalysisScheduler::default();
	scheduler.apply_config(&AnalysisConfig {
		max_concurrency: 4,
		drain_timeout_ms: 250,
	});
	assert_eq!(scheduler.drain_timeout(), Duration::from_millis(250));
}
