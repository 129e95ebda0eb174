//! # Node Cache
//!
//! A typed object pool serving every node the skip list ever owns. The
//! pool is a slab: one growing arena (`Vec<Node>`) addressed by
//! [`NodeId`] indices, plus a LIFO free list of released slots.
//!
//! ## Contract
//!
//! - [`acquire`](NodePool::acquire) pops the free list head when it is
//!   non-empty, otherwise grows the arena by one slot. Either way the
//!   returned node is fully initialized from the caller's arguments.
//! - [`release`](NodePool::release) parks a slot on the free list head
//!   in constant time, handing the stored key and value back to the
//!   caller so they drop (or get returned) deterministically. The slot's
//!   key is swapped for the sentinel while parked. Releasing a slot that
//!   is already parked is a logic error the pool does not detect.
//! - [`clear_all`](NodePool::clear_all) destroys every node ever served,
//!   free-listed or live, and hands the arena's memory back to the
//!   allocator. Keeping the arena while releasing its items is the
//!   owner's job, done through per-node `release` calls.
//!
//! Skip lists churn nodes: every removal frees one slot per level the
//! item reached, and every insertion wants them back. The arena keeps
//! all of them in one allocation and the free list makes the churn O(1)
//! amortized. The pool never shrinks until explicitly cleared.
//!
//! Node identity is an index, not a pointer, so the structure's cyclic
//! `prev`/`next`/`parent` links need no reference counting and no
//! unsafe: the pool owns every node for the lifetime of the list.

use std::ops::{Index, IndexMut};

use crate::key::SkipKey;
use crate::{Node, NodeId};

/// Slab arena plus free list. One per skip-list instance.
pub(crate) struct NodePool<K, V> {
	/// Every node ever served, live or parked. Never shrinks until
	/// cleared.
	slab: Vec<Node<K, V>>,
	/// Indices of parked slots, most recently released last.
	free: Vec<NodeId>,
}

impl<K: SkipKey, V> NodePool<K, V> {
	pub(crate) fn new() -> Self {
		NodePool {
			slab: Vec::new(),
			free: Vec::new(),
		}
	}

	/// Creates a pool whose arena can hold `capacity` nodes before
	/// growing.
	pub(crate) fn with_capacity(capacity: usize) -> Self {
		NodePool {
			slab: Vec::with_capacity(capacity),
			free: Vec::new(),
		}
	}

	/// Serves a node initialized with the given payload and no links.
	///
	/// Reuses the most recently released slot when one is parked,
	/// otherwise grows the arena.
	pub(crate) fn acquire(&mut self, key: K, value: Option<V>, width: usize) -> NodeId {
		let node = Node {
			key,
			value,
			next: None,
			prev: None,
			parent: None,
			width,
		};

		match self.free.pop() {
			Some(id) => {
				self.slab[id.index()] = node;
				id
			}
			None => {
				assert!(self.slab.len() < u32::MAX as usize, "node pool exhausted the id space");
				let id = NodeId(self.slab.len() as u32);
				self.slab.push(node);
				id
			}
		}
	}

	/// Parks a slot on the free list and hands back its payload.
	///
	/// The key is swapped for the sentinel so the parked slot never
	/// aliases a live key's storage. Links are left stale; `acquire`
	/// rewrites them before the slot is seen again.
	pub(crate) fn release(&mut self, id: NodeId) -> (K, Option<V>) {
		let node = &mut self.slab[id.index()];
		let key = std::mem::replace(&mut node.key, K::sentinel());
		let value = node.value.take();
		self.free.push(id);
		(key, value)
	}

	/// Destroys every node ever served, empties the free list, and
	/// returns the arena's memory to the allocator.
	pub(crate) fn clear_all(&mut self) {
		self.slab = Vec::new();
		self.free = Vec::new();
	}

	/// Number of slots currently parked on the free list.
	pub(crate) fn free_count(&self) -> usize {
		self.free.len()
	}

	/// Total slots in the arena, live or parked.
	pub(crate) fn allocated(&self) -> usize {
		self.slab.len()
	}

	/// Parked slot ids, for invariant checks.
	pub(crate) fn free_ids(&self) -> &[NodeId] {
		&self.free
	}
}

impl<K, V> Index<NodeId> for NodePool<K, V> {
	type Output = Node<K, V>;

	#[inline]
	fn index(&self, id: NodeId) -> &Node<K, V> {
		&self.slab[id.index()]
	}
}

impl<K, V> IndexMut<NodeId> for NodePool<K, V> {
	#[inline]
	fn index_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
		&mut self.slab[id.index()]
	}
}
