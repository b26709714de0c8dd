use proptest::prelude::*;

use super::*;

fn ids(n: u64) -> Vec<DocumentId> {
	(0..n).map(|i| DocumentId(10_000 + i)).collect()
}

#[test]
fn focus_order_defines_reverse_recency() {
	let [a, b, c] = ids(3).try_into().expect("three ids");
	let mut mru = MruHistory::new();
	for id in [a, b, c] {
		mru.append(id);
	}
	for id in [a, c, b] {
		mru.touch(id);
	}
	assert_eq!(mru.reversed(), vec![b, c, a]);
	assert_eq!(mru.most_recent_other(b), Some(c));
}

#[test]
fn resolve_tracks_tab_moves_and_reports_stale() {
	let [a, b, c] = ids(3).try_into().expect("three ids");
	let mut mru = MruHistory::new();
	mru.append(a);
	mru.append(b);

	assert_eq!(mru.resolve(b, [b, a]), Ok(0));
	assert_eq!(mru.resolve(c, [a, b]), Err(StaleEntry(c)));
}

#[test]
fn reconcile_drops_stale_and_adopts_untracked() {
	let [a, b, c, d] = ids(4).try_into().expect("four ids");
	let mut mru = MruHistory::new();
	for id in [a, b, c] {
		mru.append(id);
	}

	let dropped = mru.reconcile([c, d, a]);
	assert_eq!(dropped, 1);
	assert_eq!(mru.iter().collect::<Vec<_>>(), vec![d, a, c]);
}

#[derive(Debug, Clone)]
enum Op {
	Append(u64),
	Touch(u64),
	Remove(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
	prop_oneof![
		(0u64..8).prop_map(Op::Append),
		(0u64..8).prop_map(Op::Touch),
		(0u64..8).prop_map(Op::Remove),
	]
}

proptest! {
	#[test]
	fn history_never_holds_duplicates(ops in prop::collection::vec(op_strategy(), 0..64)) {
		let mut mru = MruHistory::new();
		for op in ops {
			match op {
				Op::Append(i) => {
					mru.append(DocumentId(i));
					prop_assert_eq!(mru.most_recent(), Some(DocumentId(i)));
				}
				Op::Touch(i) => {
					mru.touch(DocumentId(i));
					prop_assert_eq!(mru.most_recent(), Some(DocumentId(i)));
				}
				Op::Remove(i) => {
					mru.remove(DocumentId(i));
					prop_assert!(!mru.contains(DocumentId(i)));
				}
			}
			let mut seen: Vec<DocumentId> = mru.iter().collect();
			seen.sort();
			seen.dedup();
			prop_assert_eq!(seen.len(), mru.len());
		}
	}

	#[test]
	fn reconcile_matches_live_tabs(
		history in prop::collection::vec(0u64..12, 0..24),
		tabs in prop::collection::btree_set(0u64..12, 0..12),
	) {
		let mut mru = MruHistory::new();
		for i in history {
			mru.touch(DocumentId(i));
		}
		let tabs: Vec<DocumentId> = tabs.into_iter().map(DocumentId).collect();
		mru.reconcile(tabs.iter().copied());

		let mut held: Vec<DocumentId> = mru.iter().collect();
		held.sort();
		prop_assert_eq!(held, tabs.clone());
		for id in &tabs {
			prop_assert!(mru.resolve(*id, tabs.iter().copied()).is_ok());
		}
	}
}
