//! Cursors over the bottom level, each holding a shared lock.
//!
//! Both iterator types in this module own a `parking_lot` read guard for
//! their whole lifetime: constructing one acquires the instance's shared
//! lock and dropping it releases it. While one is alive the bottom chain
//! cannot be spliced underneath it, and the borrow checker refuses any
//! same-thread `&mut` path to the list; cross-thread writers simply
//! block on the lock until the iterator drops.
//!
//! Consequently a thread must finish (drop) its iterators before calling
//! any writing method on the same list, or it will deadlock with itself
//! on the write lock.
//!
//! [`Iter`] is the free-running bidirectional cursor; [`SliceIter`] the
//! bounded, stepping one. Neither implements `std::iter::Iterator`:
//! they lend references tied to the guard they hold, so the usual
//! pattern is explicit `next()`/`prev()` calls in a `while let` loop:
//!
//! ```
//! use skiplane::SkipMap;
//!
//! let map: SkipMap<i64, i64> = SkipMap::new();
//! map.put(1, 10);
//! map.put(2, 20);
//!
//! let mut iter = map.items();
//! while let Some((k, v)) = iter.next() {
//!     println!("{k} -> {v}");
//! }
//! ```

use parking_lot::RwLockReadGuard;

use crate::{Core, NodeId};

// ===========================================================================
// Iter
// ===========================================================================

/// Bidirectional cursor over the items, anchored at its construction
/// position and holding a shared lock until dropped.
///
/// ## Reversal lag
///
/// `prev()` returns the node the cursor stands on and *then* steps left,
/// so after `prev()` has returned item X, an immediate `next()` returns
/// X's left neighbor, not X. This one-node lag when reversing mid-stream
/// is contractual; [`reset`](Iter::reset) restores the anchor when a
/// clean restart is wanted.
///
/// At either end the cursor parks itself one step inside the chain, so a
/// `next()` that just returned `None` can be followed by `prev()` to
/// resume from the last item, and vice versa.
pub struct Iter<'t, K, V, const DUPLICATES: bool> {
	core: RwLockReadGuard<'t, Core<K, V, DUPLICATES>>,
	current: NodeId,
	anchor: NodeId,
}

impl<'t, K, V, const DUPLICATES: bool> Iter<'t, K, V, DUPLICATES> {
	pub(crate) fn new(core: RwLockReadGuard<'t, Core<K, V, DUPLICATES>>, anchor: NodeId) -> Self {
		Iter {
			core,
			current: anchor,
			anchor,
		}
	}

	/// Returns the item under the cursor and advances right, or `None`
	/// at the end position.
	pub fn next(&mut self) -> Option<(&K, &V)> {
		loop {
			let cur = self.current;
			let node = &self.core.pool[cur];
			if node.value.is_some() {
				self.current = node.next.expect("bottom real nodes have a successor");
				let node = &self.core.pool[cur];
				return Some((&node.key, node.value.as_ref().expect("just checked")));
			}
			match node.next {
				Some(next) => {
					// Standing on the header: enter the chain.
					self.current = next;
				}
				None => {
					// Trailer: park on the last item so an immediate
					// `prev` resumes from the end.
					if let Some(prev) = node.prev {
						if self.core.pool[prev].value.is_some() {
							self.current = prev;
						}
					}
					return None;
				}
			}
		}
	}

	/// Returns the item under the cursor and steps left, or `None` at
	/// the start position.
	pub fn prev(&mut self) -> Option<(&K, &V)> {
		loop {
			let cur = self.current;
			let node = &self.core.pool[cur];
			if node.value.is_some() {
				self.current = node.prev.expect("bottom real nodes have a predecessor");
				let node = &self.core.pool[cur];
				return Some((&node.key, node.value.as_ref().expect("just checked")));
			}
			match node.prev {
				Some(prev) => {
					// Trailer: walk onto the last item.
					self.current = prev;
				}
				None => {
					// Header: park one step inside so an immediate
					// `next` resumes from the start.
					self.current = node.next.expect("headers have a successor");
					return None;
				}
			}
		}
	}

	/// Moves the cursor back to the position it was constructed at.
	pub fn reset(&mut self) {
		self.current = self.anchor;
	}
}

// ===========================================================================
// SliceIter
// ===========================================================================

enum SliceBound {
	/// Index-bounded: visit this many more bottom nodes.
	Count { remaining: usize },
	/// Key-bounded: stop upon reaching this node (exclusive).
	Node { end: NodeId },
}

/// Bounded stepping cursor produced by the slice getters, holding a
/// shared lock until dropped.
///
/// The cursor visits bottom nodes one at a time (rightward for
/// key-bounded and forward index slices, leftward for negative-step
/// index slices) and emits every `|step|`-th visited node, the first
/// one immediately.
pub struct SliceIter<'t, K, V, const DUPLICATES: bool> {
	core: RwLockReadGuard<'t, Core<K, V, DUPLICATES>>,
	cursor: Option<NodeId>,
	bound: SliceBound,
	step: i64,
	/// Visit counter driving the emission cadence: emits when
	/// `phase % step == 0`. Starts at `step` for backward walks so the
	/// first visit emits there too.
	phase: i64,
}

impl<'t, K, V, const DUPLICATES: bool> SliceIter<'t, K, V, DUPLICATES> {
	pub(crate) fn from_index_plan(
		core: RwLockReadGuard<'t, Core<K, V, DUPLICATES>>,
		plan: crate::IndexSlicePlan,
	) -> Self {
		SliceIter {
			core,
			cursor: plan.cursor,
			bound: SliceBound::Count {
				remaining: plan.remaining,
			},
			step: plan.step,
			phase: if plan.step < 0 { plan.step } else { 0 },
		}
	}

	pub(crate) fn from_key_plan(
		core: RwLockReadGuard<'t, Core<K, V, DUPLICATES>>,
		plan: crate::KeySlicePlan,
	) -> Self {
		SliceIter {
			core,
			cursor: Some(plan.cursor),
			bound: SliceBound::Node { end: plan.end },
			step: plan.step,
			phase: 0,
		}
	}

	/// Returns the next emitted item, or `None` once the bound is
	/// reached.
	pub fn next(&mut self) -> Option<(&K, &V)> {
		loop {
			match self.bound {
				SliceBound::Count { remaining } if remaining == 0 => return None,
				SliceBound::Node { end } if self.cursor == Some(end) => return None,
				_ => {}
			}
			let cur = self.cursor?;

			let emit = self.phase % self.step == 0;
			self.phase += 1;
			if let SliceBound::Count { remaining } = &mut self.bound {
				*remaining -= 1;
			}

			// Key-bounded slices always walk right; index-bounded ones
			// follow the step's sign.
			let forward = self.step > 0 || matches!(self.bound, SliceBound::Node { .. });
			let node = &self.core.pool[cur];
			self.cursor = if forward { node.next } else { node.prev };

			if emit {
				let node = &self.core.pool[cur];
				return Some((&node.key, node.value.as_ref().expect("slices visit bottom items")));
			}
		}
	}
}
