use rustc_hash::FxHashMap;

use crate::document::{DocKey, DocumentId};
use crate::stack::StackId;

/// One stack's copy of a logical document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Replica {
	pub stack: StackId,
	pub document: DocumentId,
}

/// Map from logical document to the replicas open across stacks.
#[derive(Debug, Default)]
pub struct Registry {
	entries: FxHashMap<DocKey, Vec<Replica>>,
}

impl Registry {
	pub fn insert(&mut self, key: DocKey, replica: Replica) {
		let replicas = self.entries.entry(key).or_default();
		if !replicas.contains(&replica) {
			replicas.push(replica);
		}
	}

	/// Returns true if the replica was registered.
	pub fn remove(&mut self, key: &DocKey, replica: Replica) -> bool {
		let Some(replicas) = self.entries.get_mut(key) else {
			return false;
		};
		let before = replicas.len();
		replicas.retain(|entry| *entry != replica);
		let removed = replicas.len() != before;
		if replicas.is_empty() {
			self.entries.remove(key);
		}
		removed
	}

	/// Forgets `key` in every stack.
	pub fn remove_key(&mut self, key: &DocKey) {
		self.entries.remove(key);
	}

	/// Moves every replica of `old` under `new`.
	///
	/// A stack holds one tab per key, so a moved replica replaces whatever
	/// that stack had registered under `new`.
	pub fn rekey(&mut self, old: &DocKey, new: DocKey) {
		if *old == new {
			return;
		}
		let Some(moved) = self.entries.remove(old) else {
			return;
		};
		let replicas = self.entries.entry(new).or_default();
		replicas.retain(|existing| !moved.iter().any(|replica| replica.stack == existing.stack));
		replicas.extend(moved);
	}

	/// Forgets every replica held by `stack`.
	pub fn remove_stack(&mut self, stack: StackId) {
		self.entries.retain(|_, replicas| {
			replicas.retain(|replica| replica.stack != stack);
			!replicas.is_empty()
		});
	}

	pub fn replicas(&self, key: &DocKey) -> &[Replica] {
		self.entries.get(key).map_or(&[], Vec::as_slice)
	}

	pub fn keys(&self) -> impl Iterator<Item = &DocKey> {
		self.entries.keys()
	}

	/// Number of logical documents.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
