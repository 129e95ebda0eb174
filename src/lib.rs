//! Concurrent, indexable skip list mapping totally ordered keys to values.
//!
//! The list is an order-statistic structure: alongside the usual sorted-map
//! operations it answers rank queries, "the item at index `i`" and "the
//! index of key `k`", in O(log n), with Python-style negative indexing and
//! half-open slice views over both key and index ranges.
//!
//! ```
//! use skiplane::SkipMap;
//!
//! let map: SkipMap<i64, &str> = SkipMap::new();
//!
//! map.put(5, "five");
//! map.put(2, "two");
//! map.put(8, "eight");
//!
//! assert_eq!(map.get(&5), Some("five"));
//! assert_eq!(map.get_by_index(0), Some("two"));
//! assert_eq!(map.get_by_index(-1), Some("eight"));
//! assert_eq!(map.index_of_key(&5), Some(1));
//! ```
//!
//! ## Structure
//!
//! Every item lives on the doubly linked bottom level; a random subset is
//! promoted into sparser express levels above it. Each level is bracketed
//! by a header node on the left and a trailer node on the right, both
//! keyed with the type's sentinel (see [`key::SkipKey`]):
//!
//! ```text
//! Level 2:  HDR ────────────────────────► 30 ────────────────────► TRL
//! Level 1:  HDR ─────────► 10 ─────────► 30 ────────────────────► TRL
//! Level 0:  HDR ──► 5 ──► 10 ──► 20 ──► 30 ──► 40 ──► 50 ──────► TRL
//! ```
//!
//! Every express link carries a *width*: the number of bottom items the
//! link passes over, counting its destination's projection. Rank queries
//! descend the same way key queries do, consuming widths instead of
//! comparing keys. On the picture above the level-1 link into `30` has
//! width 2 (it covers `20` and `30`); the widths across any express level
//! always sum to the item count.
//!
//! ## Modes
//!
//! [`SkipMap`] keeps keys unique (`put` on an existing key overwrites);
//! [`SkipList`] allows duplicates, which accumulate in insertion order
//! left to right, with the key-addressed operations resolving to the
//! rightmost (most recently inserted) occurrence. Both are aliases of
//! [`GenericSkipList`], whose `DUPLICATES` const parameter selects the
//! mode at compile time.
//!
//! ## Concurrency
//!
//! Each instance owns one `parking_lot::RwLock` around its entire node
//! graph. Writers serialize; readers share. The iterator and slice
//! objects hold a read guard for their whole lifetime, so a traversal can
//! never observe a half-spliced level. On the flip side, a thread
//! must drop its iterators before calling any writing method on the same
//! list, or it will deadlock with itself.
//!
//! Node storage is a slab arena with a free list; removed nodes are
//! recycled, and the arena only shrinks when explicitly cleared.

use std::cmp::Ordering;
use std::fmt;

use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

pub mod alloc;
pub mod error;
pub mod iter;
pub mod key;
mod pool;

pub use error::{Error, Result};
pub use key::SkipKey;

use iter::{Iter, SliceIter};
use pool::NodePool;

/// Each inserted item extends its tower one level higher with probability
/// `1 / PROMOTION_FANOUT`, so an express level carries roughly one node
/// per `PROMOTION_FANOUT` nodes of the level below.
const PROMOTION_FANOUT: u32 = 7;

/// Inline capacity of the per-instance search-path stack. With a fanout
/// of 7 this covers lists beyond 10^13 items; taller paths spill to the
/// heap transparently.
const PATH_INLINE: usize = 16;

// ===========================================================================
// Items and nodes
// ===========================================================================

/// An ordered key-value pair, as stored in and returned from the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item<K, V> {
	pub key: K,
	pub value: V,
}

/// Index of a node slot in the instance's pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct NodeId(pub(crate) u32);

impl NodeId {
	#[inline]
	pub(crate) fn index(self) -> usize {
		self.0 as usize
	}
}

/// One node of the multi-level graph.
///
/// Bottom-level real nodes carry `Some` value and a `width` of 1. Express
/// copies carry the key only, a `parent` link to the same tower one level
/// down, and the width of the link arriving at them. Header and trailer
/// nodes hold the sentinel key; a node is the trailer of its level iff
/// `next` is `None` and the header iff `prev` is `None`.
pub(crate) struct Node<K, V> {
	pub(crate) key: K,
	pub(crate) value: Option<V>,
	pub(crate) next: Option<NodeId>,
	pub(crate) prev: Option<NodeId>,
	pub(crate) parent: Option<NodeId>,
	/// Bottom items covered by the link from this node's left neighbor,
	/// counting this node's own projection.
	pub(crate) width: usize,
}

/// One step of a recorded descent: the node the descent dropped from at
/// some level, plus the count of bottom items at or before its
/// projection.
#[derive(Clone, Copy)]
pub(crate) struct PathEntry {
	pub(crate) node: NodeId,
	pub(crate) span: usize,
}

type Path = SmallVec<[PathEntry; PATH_INLINE]>;

fn normalize_index(index: i64, size: usize) -> Option<usize> {
	let n = size as i64;
	let u = if index < 0 { n + index } else { index };
	if (0..n).contains(&u) {
		Some(u as usize)
	} else {
		None
	}
}

// ===========================================================================
// Core: the engine under the lock
// ===========================================================================

/// Everything the lock protects: the node graph, its pool, the counters
/// and the per-instance scratch and RNG.
pub(crate) struct Core<K, V, const DUPLICATES: bool> {
	pub(crate) pool: NodePool<K, V>,
	/// Top of the header stack (left sentinel of the highest level).
	pub(crate) header: NodeId,
	/// Top of the trailer stack (right sentinel of the highest level).
	pub(crate) trailer: NodeId,
	pub(crate) size: usize,
	/// Reusable search-path scratch; cleared at the start of every
	/// recorded descent so nothing meaningful survives between calls.
	stack: Path,
	rng: SmallRng,
}

impl<K: SkipKey, V, const DUPLICATES: bool> Core<K, V, DUPLICATES> {
	fn new() -> Self {
		Self::from_pool(NodePool::new())
	}

	fn with_capacity(capacity: usize) -> Self {
		Self::from_pool(NodePool::with_capacity(capacity))
	}

	fn from_pool(mut pool: NodePool<K, V>) -> Self {
		let (header, trailer) = Self::build_empty_levels(&mut pool);
		Core {
			pool,
			header,
			trailer,
			size: 0,
			stack: SmallVec::new(),
			rng: SmallRng::from_os_rng(),
		}
	}

	/// Wires a bottom level plus one empty express level and returns the
	/// top header/trailer pair.
	fn build_empty_levels(pool: &mut NodePool<K, V>) -> (NodeId, NodeId) {
		let h0 = pool.acquire(K::sentinel(), None, 0);
		let t0 = pool.acquire(K::sentinel(), None, 0);
		pool[h0].next = Some(t0);
		pool[t0].prev = Some(h0);

		let h1 = pool.acquire(K::sentinel(), None, 0);
		let t1 = pool.acquire(K::sentinel(), None, 0);
		pool[h1].next = Some(t1);
		pool[t1].prev = Some(h1);
		pool[h1].parent = Some(h0);
		pool[t1].parent = Some(t0);

		(h1, t1)
	}

	// -----------------------------------------------------------------------
	// Structural navigation
	// -----------------------------------------------------------------------

	pub(crate) fn bottom_header(&self) -> NodeId {
		let mut node = self.header;
		while let Some(down) = self.pool[node].parent {
			node = down;
		}
		node
	}

	pub(crate) fn bottom_trailer(&self) -> NodeId {
		let mut node = self.trailer;
		while let Some(down) = self.pool[node].parent {
			node = down;
		}
		node
	}

	/// Leftmost real bottom node, if any.
	pub(crate) fn ground_left(&self) -> Option<NodeId> {
		let first = self.pool[self.bottom_header()].next.expect("headers have a successor");
		self.pool[first].value.is_some().then_some(first)
	}

	/// Rightmost real bottom node, if any.
	pub(crate) fn ground_right(&self) -> Option<NodeId> {
		let last = self.pool[self.bottom_trailer()].prev.expect("trailers have a predecessor");
		self.pool[last].value.is_some().then_some(last)
	}

	/// Number of express levels above the bottom.
	pub(crate) fn height(&self) -> usize {
		let mut node = self.header;
		let mut levels = 0;
		while let Some(down) = self.pool[node].parent {
			node = down;
			levels += 1;
		}
		levels
	}

	// -----------------------------------------------------------------------
	// Descents
	// -----------------------------------------------------------------------

	/// Top-down key descent without path recording.
	///
	/// With `inclusive` the result is the rightmost bottom node whose key
	/// compares `<=` the probe; without, strictly `<`. Either way the
	/// bottom header stands in when no node qualifies. Also returns the
	/// count of items at or before the resulting node.
	fn seek_key(&self, key: &K, inclusive: bool) -> (NodeId, usize) {
		let mut node = self.header;
		let mut span = 0usize;
		loop {
			loop {
				let next = self.pool[node].next.expect("only trailers lack a successor");
				let advance = match self.pool[next].key.cmp_keys(key) {
					Ordering::Less => true,
					Ordering::Equal => inclusive,
					Ordering::Greater => false,
				};
				if !advance {
					break;
				}
				span += self.pool[next].width;
				node = next;
			}
			match self.pool[node].parent {
				Some(down) => node = down,
				None => return (node, span),
			}
		}
	}

	/// Top-down rank descent without path recording: consumes `u` items
	/// of cumulative width and lands on the bottom node at rank `u - 1`
	/// (the bottom header for `u == 0`).
	fn seek_rank(&self, mut u: usize) -> NodeId {
		let mut node = self.header;
		loop {
			loop {
				let next = self.pool[node].next.expect("only trailers lack a successor");
				if self.pool[next].next.is_none() {
					// Never step onto the trailer.
					break;
				}
				let width = self.pool[next].width;
				if u < width {
					break;
				}
				u -= width;
				node = next;
			}
			match self.pool[node].parent {
				Some(down) => node = down,
				None => return node,
			}
		}
	}

	/// Key descent that records the per-level drop nodes (top first) into
	/// the instance stack, spans included.
	fn descend_key(&mut self, key: &K, inclusive: bool) {
		self.stack.clear();
		let mut node = self.header;
		let mut span = 0usize;
		loop {
			loop {
				let next = self.pool[node].next.expect("only trailers lack a successor");
				let advance = match self.pool[next].key.cmp_keys(key) {
					Ordering::Less => true,
					Ordering::Equal => inclusive,
					Ordering::Greater => false,
				};
				if !advance {
					break;
				}
				span += self.pool[next].width;
				node = next;
			}
			self.stack.push(PathEntry { node, span });
			match self.pool[node].parent {
				Some(down) => node = down,
				None => break,
			}
		}
	}

	/// Rank descent that records the per-level drop nodes, like
	/// [`descend_key`](Self::descend_key) but consuming widths.
	fn descend_rank(&mut self, mut u: usize) {
		self.stack.clear();
		let mut node = self.header;
		let mut span = 0usize;
		loop {
			loop {
				let next = self.pool[node].next.expect("only trailers lack a successor");
				if self.pool[next].next.is_none() {
					break;
				}
				let width = self.pool[next].width;
				if u < width {
					break;
				}
				u -= width;
				span += width;
				node = next;
			}
			self.stack.push(PathEntry { node, span });
			match self.pool[node].parent {
				Some(down) => node = down,
				None => break,
			}
		}
	}

	// -----------------------------------------------------------------------
	// Point lookups
	// -----------------------------------------------------------------------

	/// Bottom node holding `key`, resolving duplicates to the rightmost
	/// occurrence.
	pub(crate) fn node_by_key(&self, key: &K) -> Option<NodeId> {
		let (node, _) = self.seek_key(key, true);
		let found = self.pool[node].value.is_some()
			&& self.pool[node].key.cmp_keys(key) == Ordering::Equal;
		found.then_some(node)
	}

	/// Bottom node at `index`, with negative indices counting from the
	/// end.
	pub(crate) fn node_by_index(&self, index: i64) -> Option<NodeId> {
		let rank = normalize_index(index, self.size)?;
		Some(self.seek_rank(rank + 1))
	}

	/// Zero-based rank of the rightmost occurrence of `key`.
	pub(crate) fn index_of_key(&self, key: &K) -> Option<usize> {
		let (node, span) = self.seek_key(key, true);
		let found = self.pool[node].value.is_some()
			&& self.pool[node].key.cmp_keys(key) == Ordering::Equal;
		found.then(|| span - 1)
	}

	// -----------------------------------------------------------------------
	// Insertion
	// -----------------------------------------------------------------------

	fn put(&mut self, key: K, value: V) {
		debug_assert!(key.is_admissible(), "key must compare strictly below the sentinel");

		self.descend_key(&key, true);
		let bottom = *self.stack.last().expect("a descent always records the bottom level");

		if !DUPLICATES {
			let node = &mut self.pool[bottom.node];
			if node.value.is_some() && node.key.cmp_keys(&key) == Ordering::Equal {
				node.value = Some(value);
				return;
			}
		}

		// Acquire before touching any width, so arena growth can never
		// interleave with a half-updated level.
		let new_node = self.pool.acquire(key.clone(), Some(value), 1);

		// Every express link crossing the insertion point spans one more
		// item now.
		for level in 0..self.stack.len() - 1 {
			let succ = self.pool[self.stack[level].node].next.expect("drop nodes have a successor");
			self.pool[succ].width += 1;
		}

		// Splice into the bottom chain.
		let pred = bottom.node;
		let succ = self.pool[pred].next.expect("drop nodes have a successor");
		self.pool[new_node].prev = Some(pred);
		self.pool[new_node].next = Some(succ);
		self.pool[pred].next = Some(new_node);
		self.pool[succ].prev = Some(new_node);

		self.size += 1;
		// Items at or before the new node, i.e. its rank + 1.
		let new_span = bottom.span + 1;

		// Bernoulli promotion: keep extending the tower while the die
		// comes up 1.
		let mut below = new_node;
		let mut level = self.stack.len() - 1;
		while self.rng.random_range(1..=PROMOTION_FANOUT) == 1 {
			if level > 0 {
				level -= 1;
				let entry = self.stack[level];
				let width = new_span - entry.span;
				let copy = self.pool.acquire(key.clone(), None, width);
				let pred = entry.node;
				let succ = self.pool[pred].next.expect("drop nodes have a successor");
				self.pool[copy].prev = Some(pred);
				self.pool[copy].next = Some(succ);
				self.pool[copy].parent = Some(below);
				self.pool[pred].next = Some(copy);
				self.pool[succ].prev = Some(copy);
				// The link into succ was pre-incremented above; the new
				// copy takes over its share of that span.
				self.pool[succ].width -= width;
				below = copy;
			} else {
				// The tower outgrew the list: open a new level with its
				// own header/trailer pair.
				let header = self.pool.acquire(K::sentinel(), None, 0);
				let copy = self.pool.acquire(key.clone(), None, new_span);
				let trailer = self.pool.acquire(K::sentinel(), None, self.size - new_span);
				self.pool[header].next = Some(copy);
				self.pool[header].parent = Some(self.header);
				self.pool[copy].prev = Some(header);
				self.pool[copy].next = Some(trailer);
				self.pool[copy].parent = Some(below);
				self.pool[trailer].prev = Some(copy);
				self.pool[trailer].parent = Some(self.trailer);
				self.header = header;
				self.trailer = trailer;
				below = copy;
			}
		}
	}

	// -----------------------------------------------------------------------
	// Point updates
	// -----------------------------------------------------------------------

	fn update(&mut self, key: &K, value: V) -> bool {
		match self.node_by_key(key) {
			Some(node) => {
				self.pool[node].value = Some(value);
				true
			}
			None => false,
		}
	}

	fn update_by_index(&mut self, index: i64, value: V) -> bool {
		match self.node_by_index(index) {
			Some(node) => {
				self.pool[node].value = Some(value);
				true
			}
			None => false,
		}
	}

	// -----------------------------------------------------------------------
	// Point removal
	// -----------------------------------------------------------------------

	fn fetch_remove(&mut self, key: &K) -> Option<Item<K, V>> {
		self.descend_key(key, true);
		let bottom = *self.stack.last().expect("a descent always records the bottom level");
		let node = &self.pool[bottom.node];
		if node.value.is_none() || node.key.cmp_keys(key) != Ordering::Equal {
			return None;
		}
		Some(self.unlink_recorded_tower())
	}

	fn fetch_remove_by_index(&mut self, index: i64) -> Option<Item<K, V>> {
		let rank = normalize_index(index, self.size)?;
		self.descend_rank(rank + 1);
		Some(self.unlink_recorded_tower())
	}

	/// Removes the bottom node the last recorded descent landed on, plus
	/// the equal-keyed drop node on every level above it.
	///
	/// The drop node at an upper level is the rightmost node there whose
	/// key compares `<=` the target's, so when it matches the target key
	/// it is the rightmost equal-keyed copy, and any surviving node's
	/// `parent` provably never points at a spliced-out one, even among
	/// duplicates.
	fn unlink_recorded_tower(&mut self) -> Item<K, V> {
		let last = self.stack.len() - 1;
		let target = self.stack[last].node;
		let target_key = self.pool[target].key.clone();

		let mut removed = None;
		for level in 0..=last {
			let node = self.stack[level].node;
			let matches = self.pool[node].key.cmp_keys(&target_key) == Ordering::Equal;
			if matches {
				let prev = self.pool[node].prev.expect("spliced nodes are never headers");
				let next = self.pool[node].next.expect("spliced nodes are never trailers");
				self.pool[prev].next = Some(next);
				self.pool[next].prev = Some(prev);
				// The successor's link absorbs the removed span, minus
				// the vanished item.
				let width = self.pool[node].width;
				self.pool[next].width += width;
				self.pool[next].width -= 1;
				let (key, value) = self.pool.release(node);
				if level == last {
					removed = Some(Item {
						key,
						value: value.expect("bottom nodes carry the value"),
					});
				}
			} else {
				// The item vanished underneath this link.
				let next = self.pool[node].next.expect("drop nodes have a successor");
				self.pool[next].width = self.pool[next].width.saturating_sub(1);
			}
		}

		self.size -= 1;
		removed.expect("the recorded bottom node always matches")
	}

	// -----------------------------------------------------------------------
	// Range removal
	// -----------------------------------------------------------------------

	/// Removes every item with `start_key <= key < stop_key`.
	fn remove_slice_by_key(&mut self, start_key: &K, stop_key: &K) -> Result<bool> {
		if self.size == 0 {
			return Ok(false);
		}
		let endpoints = start_key.cmp_keys(stop_key);
		if endpoints == Ordering::Greater {
			return Err(Error::StartKeyGreaterThanEndKey);
		}

		self.descend_key(start_key, false);
		let start_bottom = *self.stack.last().expect("a descent always records the bottom level");
		let first = self.pool[start_bottom.node].next.expect("drop nodes have a successor");
		let start_present = self.pool[first].value.is_some()
			&& self.pool[first].key.cmp_keys(start_key) == Ordering::Equal;
		if !start_present {
			return Err(if endpoints == Ordering::Equal {
				Error::MissingKey
			} else {
				Error::MissingStartKey
			});
		}
		if endpoints == Ordering::Equal {
			// A half-open range with equal endpoints is empty.
			return Ok(true);
		}
		// Keep a private copy of the start path; the stop descent reuses
		// the instance stack.
		let start_path: Path = self.stack.clone();

		self.descend_key(stop_key, false);
		let stop_bottom = *self.stack.last().expect("a descent always records the bottom level");
		let bound = self.pool[stop_bottom.node].next.expect("drop nodes have a successor");
		let stop_present = self.pool[bound].value.is_some()
			&& self.pool[bound].key.cmp_keys(stop_key) == Ordering::Equal;
		if !stop_present {
			return Err(Error::MissingEndKey);
		}

		let count = stop_bottom.span - start_bottom.span;
		let stop_path = std::mem::take(&mut self.stack);
		self.excise(&start_path, &stop_path, count);
		Ok(true)
	}

	/// Removes every item with rank in `[start, stop)` after negative
	/// normalization and clamping of `stop`.
	fn remove_slice_by_index(&mut self, start: i64, stop: i64) -> Result<bool> {
		let n = self.size as i64;
		let start_n = if start < 0 { n + start } else { start };
		let stop_n = (if stop < 0 { n + stop } else { stop }).min(n);
		if start_n >= n {
			// Deleting from past the end is a no-op, not an error.
			return Ok(false);
		}
		if start_n < 0 || stop_n <= start_n {
			return Err(Error::InvalidIndex);
		}

		let (start_n, stop_n) = (start_n as usize, stop_n as usize);
		self.descend_rank(start_n);
		let start_path: Path = self.stack.clone();
		self.descend_rank(stop_n);
		let stop_path = std::mem::take(&mut self.stack);
		self.excise(&start_path, &stop_path, stop_n - start_n);
		Ok(true)
	}

	/// Splices out, level by level, every node strictly between the
	/// start path's drop node and the successor of the stop path's drop
	/// node, releasing the excised nodes and re-establishing the width
	/// invariant on every surviving level.
	///
	/// `count` is the number of bottom items removed. A level whose real
	/// nodes are all excised stays in place as an empty express lane.
	fn excise(&mut self, start_path: &[PathEntry], stop_path: &[PathEntry], count: usize) {
		debug_assert_eq!(start_path.len(), stop_path.len());
		let last = start_path.len() - 1;
		for level in 0..=last {
			let pred = start_path[level].node;
			let tail = stop_path[level].node;
			let succ = self.pool[tail].next.expect("drop nodes have a successor");

			let mut collapsed = 0usize;
			let mut cur = self.pool[pred].next.expect("drop nodes have a successor");
			while cur != succ {
				let next = self.pool[cur].next.expect("the walk stops before the trailer");
				collapsed += self.pool[cur].width;
				self.pool.release(cur);
				cur = next;
			}

			self.pool[pred].next = Some(succ);
			self.pool[succ].prev = Some(pred);
			if level < last {
				// The surviving link absorbs the excised spans, minus
				// the removed items.
				self.pool[succ].width = self.pool[succ].width + collapsed - count;
			}
		}
		self.size -= count;
	}

	// -----------------------------------------------------------------------
	// Slice planning
	// -----------------------------------------------------------------------

	/// Validates an index-bounded slice and resolves its first visited
	/// node.
	pub(crate) fn plan_index_slice(
		&self,
		start: i64,
		stop: i64,
		step: i64,
	) -> Result<IndexSlicePlan> {
		if step == 0 {
			return Err(Error::StepIndexZero);
		}
		let n = self.size as i64;
		if !(-n..=n).contains(&stop) {
			return Err(Error::InvalidStopIndex);
		}
		let stop_n = if stop < 0 { n + stop } else { stop };
		let start_n = if start < 0 { n + start } else { start };
		if !(0..=n).contains(&start_n) {
			return Err(Error::InvalidIndex);
		}

		if step > 0 {
			if start_n > stop_n {
				return Err(Error::StartIndexGreaterThanEndIndex);
			}
			let remaining = (stop_n - start_n) as usize;
			let cursor = (remaining > 0).then(|| self.seek_rank(start_n as usize + 1));
			Ok(IndexSlicePlan { cursor, remaining, step })
		} else {
			if stop_n > start_n {
				return Err(Error::StartIndexGreaterThanEndIndex);
			}
			let remaining = (start_n - stop_n) as usize;
			if remaining > 0 && start_n == n {
				// A backward walk must anchor on an addressable rank.
				return Err(Error::InvalidIndex);
			}
			let cursor = (remaining > 0).then(|| self.seek_rank(start_n as usize + 1));
			Ok(IndexSlicePlan { cursor, remaining, step })
		}
	}

	/// Validates a key-bounded slice; both endpoint keys must exist. The
	/// cursor is the leftmost occurrence of `start_key`, the bound the
	/// leftmost occurrence of `stop_key` (exclusive).
	pub(crate) fn plan_key_slice(&self, start_key: &K, stop_key: &K, step: i64) -> Result<KeySlicePlan> {
		if step == 0 {
			return Err(Error::StepIndexZero);
		}
		if start_key.cmp_keys(stop_key) == Ordering::Greater {
			return Err(Error::StartKeyGreaterThanEndKey);
		}

		let (before_start, _) = self.seek_key(start_key, false);
		let cursor = self.pool[before_start].next.expect("drop nodes have a successor");
		let start_present = self.pool[cursor].value.is_some()
			&& self.pool[cursor].key.cmp_keys(start_key) == Ordering::Equal;
		if !start_present {
			return Err(Error::MissingStartKey);
		}

		let (before_stop, _) = self.seek_key(stop_key, false);
		let end = self.pool[before_stop].next.expect("drop nodes have a successor");
		let stop_present = self.pool[end].value.is_some()
			&& self.pool[end].key.cmp_keys(stop_key) == Ordering::Equal;
		if !stop_present {
			return Err(Error::MissingEndKey);
		}

		Ok(KeySlicePlan { cursor, end, step })
	}

	// -----------------------------------------------------------------------
	// Slice setters
	// -----------------------------------------------------------------------

	fn set_slice_by_index(&mut self, start: i64, stop: i64, step: i64, value: &V) -> Result<()>
	where
		V: Clone,
	{
		let plan = self.plan_index_slice(start, stop, step)?;
		let mut cursor = plan.cursor;
		let mut remaining = plan.remaining;
		let mut phase: i64 = if step < 0 { step } else { 0 };
		while remaining > 0 {
			let node = match cursor {
				Some(node) => node,
				None => break,
			};
			if phase % step == 0 {
				self.pool[node].value = Some(value.clone());
			}
			phase += 1;
			remaining -= 1;
			cursor = if step > 0 { self.pool[node].next } else { self.pool[node].prev };
		}
		Ok(())
	}

	fn set_slice_by_key(&mut self, start_key: &K, stop_key: &K, step: i64, value: &V) -> Result<()>
	where
		V: Clone,
	{
		let plan = self.plan_key_slice(start_key, stop_key, step)?;
		let mut cursor = plan.cursor;
		let mut edge: i64 = 0;
		while cursor != plan.end {
			if edge % step == 0 {
				self.pool[cursor].value = Some(value.clone());
			}
			edge += 1;
			cursor = self.pool[cursor].next.expect("the walk stops at the bound");
		}
		Ok(())
	}

	// -----------------------------------------------------------------------
	// Clearing
	// -----------------------------------------------------------------------

	/// Releases every node on every level to the free list, then rebuilds
	/// the empty structure from those freed slots. The arena keeps its
	/// capacity.
	fn clear_retaining_capacity(&mut self) {
		let mut header = Some(self.header);
		while let Some(level_header) = header {
			let down = self.pool[level_header].parent;
			let mut cur = Some(level_header);
			while let Some(node) = cur {
				let next = self.pool[node].next;
				self.pool.release(node);
				cur = next;
			}
			header = down;
		}
		let (new_header, new_trailer) = Self::build_empty_levels(&mut self.pool);
		self.header = new_header;
		self.trailer = new_trailer;
		self.size = 0;
		self.stack.clear();
	}

	/// Destroys every node, arena included, then rebuilds the empty
	/// structure from a fresh arena.
	fn clear_and_free(&mut self) {
		self.pool.clear_all();
		let (new_header, new_trailer) = Self::build_empty_levels(&mut self.pool);
		self.header = new_header;
		self.trailer = new_trailer;
		self.size = 0;
		self.stack.clear();
	}

	// -----------------------------------------------------------------------
	// Invariant checking
	// -----------------------------------------------------------------------

	/// Walks the whole structure asserting the representation invariants:
	/// sorted levels, mirrored links, width sums, tower keys, size, and
	/// free-list disjointness.
	fn check_invariants(&self) {
		use std::collections::HashSet;

		let mut reachable: HashSet<usize> = HashSet::new();
		let mut header = Some(self.header);
		let mut levels = 0usize;

		while let Some(level_header) = header {
			let is_bottom = self.pool[level_header].parent.is_none();
			assert!(self.pool[level_header].prev.is_none(), "headers open their level");
			assert!(self.pool[level_header].value.is_none(), "sentinels carry no value");
			reachable.insert(level_header.index());

			let mut width_sum = 0usize;
			let mut real_nodes = 0usize;
			let mut prev_id = level_header;
			let mut cur = self.pool[level_header].next;

			while let Some(node_id) = cur {
				assert_eq!(
					self.pool[node_id].prev,
					Some(prev_id),
					"prev links mirror next links"
				);
				assert!(
					self.pool[prev_id].key.cmp_keys(&self.pool[node_id].key) != Ordering::Greater
						|| prev_id == level_header,
					"keys are non-decreasing along a level"
				);
				reachable.insert(node_id.index());

				let node = &self.pool[node_id];
				if node.next.is_none() {
					// Trailer.
					assert!(node.value.is_none(), "sentinels carry no value");
					if !is_bottom {
						width_sum += node.width;
					}
				} else if is_bottom {
					real_nodes += 1;
					assert_eq!(node.width, 1, "bottom nodes span exactly themselves");
					assert!(node.value.is_some(), "bottom nodes carry a value");
					assert!(node.parent.is_none(), "bottom nodes have no projection");
				} else {
					real_nodes += 1;
					width_sum += node.width;
					assert!(node.value.is_none(), "express copies carry no value");
					let parent = node.parent.expect("express copies project downward");
					assert_eq!(
						self.pool[parent].key.cmp_keys(&node.key),
						Ordering::Equal,
						"a tower keeps a single key"
					);
				}

				prev_id = node_id;
				cur = self.pool[node_id].next;
			}

			if is_bottom {
				assert_eq!(real_nodes, self.size, "bottom population equals size");
			} else {
				assert_eq!(width_sum, self.size, "level widths sum to size");
			}

			header = self.pool[level_header].parent;
			levels += 1;
		}

		assert!(levels >= 2, "the bottom and one express level always exist");
		for id in self.pool.free_ids() {
			assert!(
				!reachable.contains(&id.index()),
				"a freed node must not be reachable from the header"
			);
		}
	}
}

/// Resolved traversal for an index-bounded slice.
pub(crate) struct IndexSlicePlan {
	pub(crate) cursor: Option<NodeId>,
	pub(crate) remaining: usize,
	pub(crate) step: i64,
}

/// Resolved traversal for a key-bounded slice.
pub(crate) struct KeySlicePlan {
	pub(crate) cursor: NodeId,
	pub(crate) end: NodeId,
	pub(crate) step: i64,
}

// ===========================================================================
// Public container
// ===========================================================================

/// Concurrent, indexable skip list. See the [crate docs](crate) for the
/// structure and [`SkipMap`] / [`SkipList`] for the two key modes.
pub struct GenericSkipList<K, V, const DUPLICATES: bool> {
	core: RwLock<Core<K, V, DUPLICATES>>,
}

/// Unique-key skip list: `put` on a present key overwrites its value.
pub type SkipMap<K, V> = GenericSkipList<K, V, false>;

/// Duplicate-friendly skip list: equal keys accumulate in insertion
/// order, and key-addressed reads and removals resolve to the rightmost
/// (most recent) occurrence.
pub type SkipList<K, V> = GenericSkipList<K, V, true>;

impl<K: SkipKey, V, const DUPLICATES: bool> GenericSkipList<K, V, DUPLICATES> {
	/// Makes a new, empty list.
	pub fn new() -> Self {
		GenericSkipList {
			core: RwLock::new(Core::new()),
		}
	}

	/// Makes a new, empty list whose node arena can hold `capacity`
	/// items' bottom nodes before growing.
	pub fn with_capacity(capacity: usize) -> Self {
		GenericSkipList {
			core: RwLock::new(Core::with_capacity(capacity)),
		}
	}

	// -----------------------------------------------------------------------
	// Point writes
	// -----------------------------------------------------------------------

	/// Inserts `(key, value)`.
	///
	/// In [`SkipMap`] mode an existing key has its value overwritten; in
	/// [`SkipList`] mode the new item lands to the right of any existing
	/// run of equal keys.
	///
	/// `key` must compare strictly below the type's sentinel (see
	/// [`key::SkipKey`]); this is debug-asserted.
	pub fn put(&self, key: K, value: V) {
		self.core.write().put(key, value);
	}

	/// Overwrites the value at `key`, returning whether the key was
	/// present. Duplicates resolve to the rightmost occurrence.
	pub fn update(&self, key: &K, value: V) -> bool {
		self.core.write().update(key, value)
	}

	/// Overwrites the value at `index` (negative indices count from the
	/// end), returning whether the index was addressable.
	pub fn update_by_index(&self, index: i64, value: V) -> bool {
		self.core.write().update_by_index(index, value)
	}

	// -----------------------------------------------------------------------
	// Range writes
	// -----------------------------------------------------------------------

	/// Overwrites the value of every `step`-th item with a key in
	/// `[start_key, stop_key)`. Both endpoint keys must be present.
	pub fn set_slice_by_key(&self, start_key: &K, stop_key: &K, step: i64, value: V) -> Result<()>
	where
		V: Clone,
	{
		self.core.write().set_slice_by_key(start_key, stop_key, step, &value)
	}

	/// Overwrites the value of every `step`-th item in the index range
	/// `[start, stop)`. A negative `step` walks from `start` down toward
	/// `stop`.
	pub fn set_slice_by_index(&self, start: i64, stop: i64, step: i64, value: V) -> Result<()>
	where
		V: Clone,
	{
		self.core.write().set_slice_by_index(start, stop, step, &value)
	}

	// -----------------------------------------------------------------------
	// Point reads
	// -----------------------------------------------------------------------

	/// Value stored at `key`; the rightmost occurrence under duplicates.
	pub fn get(&self, key: &K) -> Option<V>
	where
		V: Clone,
	{
		let core = self.core.read();
		core.node_by_key(key).and_then(|node| core.pool[node].value.clone())
	}

	/// Runs `f` over the value stored at `key` while the shared lock is
	/// held, without cloning.
	pub fn get_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
		let core = self.core.read();
		core.node_by_key(key)
			.map(|node| f(core.pool[node].value.as_ref().expect("bottom nodes carry the value")))
	}

	/// Runs `f` over the value at `index` while the shared lock is held,
	/// without cloning.
	pub fn get_by_index_with<R>(&self, index: i64, f: impl FnOnce(&V) -> R) -> Option<R> {
		let core = self.core.read();
		core.node_by_index(index)
			.map(|node| f(core.pool[node].value.as_ref().expect("bottom nodes carry the value")))
	}

	/// The full item stored at `key`.
	pub fn get_item(&self, key: &K) -> Option<Item<K, V>>
	where
		V: Clone,
	{
		let core = self.core.read();
		core.node_by_key(key).map(|node| Item {
			key: core.pool[node].key.clone(),
			value: core.pool[node].value.clone().expect("bottom nodes carry the value"),
		})
	}

	/// Whether an item with `key` is present.
	pub fn contains(&self, key: &K) -> bool {
		self.core.read().node_by_key(key).is_some()
	}

	/// Value of the item at `index`; negative indices count from the
	/// end, and anything past either end is `None`.
	pub fn get_by_index(&self, index: i64) -> Option<V>
	where
		V: Clone,
	{
		let core = self.core.read();
		core.node_by_index(index).and_then(|node| core.pool[node].value.clone())
	}

	/// The full item at `index`.
	pub fn get_item_by_index(&self, index: i64) -> Option<Item<K, V>>
	where
		V: Clone,
	{
		let core = self.core.read();
		core.node_by_index(index).map(|node| Item {
			key: core.pool[node].key.clone(),
			value: core.pool[node].value.clone().expect("bottom nodes carry the value"),
		})
	}

	/// Zero-based rank of the rightmost occurrence of `key`, if present.
	///
	/// `get_by_index(rank)` then reads the same item back.
	pub fn index_of_key(&self, key: &K) -> Option<usize> {
		self.core.read().index_of_key(key)
	}

	/// The smallest-keyed item.
	pub fn min(&self) -> Option<Item<K, V>>
	where
		V: Clone,
	{
		let core = self.core.read();
		core.ground_left().map(|node| Item {
			key: core.pool[node].key.clone(),
			value: core.pool[node].value.clone().expect("bottom nodes carry the value"),
		})
	}

	/// The largest-keyed item.
	pub fn max(&self) -> Option<Item<K, V>>
	where
		V: Clone,
	{
		let core = self.core.read();
		core.ground_right().map(|node| Item {
			key: core.pool[node].key.clone(),
			value: core.pool[node].value.clone().expect("bottom nodes carry the value"),
		})
	}

	/// The item at rank `len() / 2`.
	pub fn median(&self) -> Option<Item<K, V>>
	where
		V: Clone,
	{
		let core = self.core.read();
		let node = core.node_by_index((core.size / 2) as i64)?;
		Some(Item {
			key: core.pool[node].key.clone(),
			value: core.pool[node].value.clone().expect("bottom nodes carry the value"),
		})
	}

	/// The first item in order; same as [`min`](Self::min).
	pub fn first(&self) -> Option<Item<K, V>>
	where
		V: Clone,
	{
		self.min()
	}

	/// The last item in order; same as [`max`](Self::max).
	pub fn last(&self) -> Option<Item<K, V>>
	where
		V: Clone,
	{
		self.max()
	}

	// -----------------------------------------------------------------------
	// Point removal
	// -----------------------------------------------------------------------

	/// Removes the item at `key` (the rightmost occurrence under
	/// duplicates), returning whether one existed.
	pub fn remove(&self, key: &K) -> bool {
		self.core.write().fetch_remove(key).is_some()
	}

	/// Removes and returns the item at `key`.
	pub fn fetch_remove(&self, key: &K) -> Option<Item<K, V>> {
		self.core.write().fetch_remove(key)
	}

	/// Removes the item at `index`, returning whether the index was
	/// addressable.
	pub fn remove_by_index(&self, index: i64) -> bool {
		self.core.write().fetch_remove_by_index(index).is_some()
	}

	/// Removes and returns the item at `index`.
	pub fn fetch_remove_by_index(&self, index: i64) -> Option<Item<K, V>> {
		self.core.write().fetch_remove_by_index(index)
	}

	/// Removes and returns the last item.
	pub fn pop(&self) -> Option<Item<K, V>> {
		let mut core = self.core.write();
		if core.size == 0 {
			return None;
		}
		let index = core.size as i64 - 1;
		core.fetch_remove_by_index(index)
	}

	/// Removes and returns the first item.
	pub fn pop_first(&self) -> Option<Item<K, V>> {
		self.core.write().fetch_remove_by_index(0)
	}

	// -----------------------------------------------------------------------
	// Range removal
	// -----------------------------------------------------------------------

	/// Removes every item with a key in `[start_key, stop_key)`.
	///
	/// Returns `Ok(false)` only on an empty list. `start_key` must be
	/// present, and `stop_key` must be present when the endpoints differ;
	/// equal endpoints with the key present are a successful no-op.
	pub fn remove_slice_by_key(&self, start_key: &K, stop_key: &K) -> Result<bool> {
		self.core.write().remove_slice_by_key(start_key, stop_key)
	}

	/// Removes every item with rank in `[start, stop)`.
	///
	/// Negative indices count from the end and `stop` is clamped to
	/// `len()`. Returns `Ok(false)` when `start` lands at or past the
	/// end; an empty or inverted range is [`Error::InvalidIndex`].
	pub fn remove_slice_by_index(&self, start: i64, stop: i64) -> Result<bool> {
		self.core.write().remove_slice_by_index(start, stop)
	}

	// -----------------------------------------------------------------------
	// Iteration
	// -----------------------------------------------------------------------

	/// Cursor over all items, anchored at the first. Holds a shared lock
	/// until dropped.
	pub fn items(&self) -> Iter<'_, K, V, DUPLICATES> {
		let core = self.core.read();
		let anchor = core.pool[core.bottom_header()].next.expect("headers have a successor");
		Iter::new(core, anchor)
	}

	/// Cursor over all items, anchored at the last; step backward with
	/// [`Iter::prev`]. Holds a shared lock until dropped.
	pub fn items_reversed(&self) -> Iter<'_, K, V, DUPLICATES> {
		let core = self.core.read();
		let anchor = core.pool[core.bottom_trailer()].prev.expect("trailers have a predecessor");
		Iter::new(core, anchor)
	}

	/// Cursor anchored at the leftmost item with a key `>= key` (at the
	/// end position when every key is smaller). Holds a shared lock
	/// until dropped.
	pub fn iter_by_key(&self, key: &K) -> Iter<'_, K, V, DUPLICATES> {
		let core = self.core.read();
		let (node, _) = core.seek_key(key, false);
		let anchor = core.pool[node].next.expect("drop nodes have a successor");
		Iter::new(core, anchor)
	}

	/// Cursor anchored at the item at `index` (at the end position when
	/// the index is out of range). Holds a shared lock until dropped.
	pub fn iter_by_index(&self, index: i64) -> Iter<'_, K, V, DUPLICATES> {
		let core = self.core.read();
		let anchor = match core.node_by_index(index) {
			Some(node) => node,
			None => core.bottom_trailer(),
		};
		Iter::new(core, anchor)
	}

	// -----------------------------------------------------------------------
	// Slices
	// -----------------------------------------------------------------------

	/// Bounded cursor over every `step`-th item with a key in
	/// `[start_key, stop_key)`; both endpoint keys must be present.
	/// Holds a shared lock until dropped.
	pub fn get_slice_by_key(
		&self,
		start_key: &K,
		stop_key: &K,
		step: i64,
	) -> Result<SliceIter<'_, K, V, DUPLICATES>> {
		let core = self.core.read();
		let plan = core.plan_key_slice(start_key, stop_key, step)?;
		Ok(SliceIter::from_key_plan(core, plan))
	}

	/// Bounded cursor over every `step`-th item in the index range
	/// `[start, stop)`; a negative `step` walks from `start` down toward
	/// `stop`. Holds a shared lock until dropped.
	pub fn get_slice_by_index(
		&self,
		start: i64,
		stop: i64,
		step: i64,
	) -> Result<SliceIter<'_, K, V, DUPLICATES>> {
		let core = self.core.read();
		let plan = core.plan_index_slice(start, stop, step)?;
		Ok(SliceIter::from_index_plan(core, plan))
	}

	// -----------------------------------------------------------------------
	// Life cycle and diagnostics
	// -----------------------------------------------------------------------

	/// Releases every item but keeps the node arena for reuse.
	pub fn clear_retaining_capacity(&self) {
		self.core.write().clear_retaining_capacity();
	}

	/// Releases every item and returns the node arena to the allocator.
	pub fn clear_and_free(&self) {
		self.core.write().clear_and_free();
	}

	/// Number of items.
	pub fn len(&self) -> usize {
		self.core.read().size
	}

	/// Whether the list holds no items.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of express levels above the bottom.
	pub fn height(&self) -> usize {
		self.core.read().height()
	}

	/// Number of pooled nodes currently parked on the free list.
	pub fn free_count(&self) -> usize {
		self.core.read().pool.free_count()
	}

	/// Walks the whole structure and panics if any representation
	/// invariant is violated. Intended for tests.
	pub fn assert_invariants(&self) {
		self.core.read().check_invariants();
	}
}

impl<K: SkipKey, V, const DUPLICATES: bool> Default for GenericSkipList<K, V, DUPLICATES> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: SkipKey, V: Clone, const DUPLICATES: bool> Clone for GenericSkipList<K, V, DUPLICATES> {
	/// Structural clone: drains the source's bottom level in order under
	/// a shared lock and re-inserts into a private fresh instance with
	/// its own pool, RNG and lock. The clone's level structure is
	/// independent of the source's; only the ordered item sequence is
	/// preserved.
	fn clone(&self) -> Self {
		let src = self.core.read();
		let mut dst: Core<K, V, DUPLICATES> = Core::with_capacity(src.pool.allocated());
		let mut cur = src.pool[src.bottom_header()].next.expect("headers have a successor");
		while src.pool[cur].value.is_some() {
			let key = src.pool[cur].key.clone();
			let value = src.pool[cur].value.clone().expect("bottom nodes carry the value");
			dst.put(key, value);
			cur = src.pool[cur].next.expect("bottom real nodes have a successor");
		}
		GenericSkipList {
			core: RwLock::new(dst),
		}
	}
}

impl<K, V, const DUPLICATES: bool> fmt::Debug for GenericSkipList<K, V, DUPLICATES>
where
	K: SkipKey + fmt::Debug,
	V: fmt::Debug,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let core = self.core.read();
		let mut map = f.debug_map();
		let mut cur = core.pool[core.bottom_header()].next.expect("headers have a successor");
		while core.pool[cur].value.is_some() {
			map.entry(&core.pool[cur].key, core.pool[cur].value.as_ref().expect("just checked"));
			cur = core.pool[cur].next.expect("bottom real nodes have a successor");
		}
		map.finish()
	}
}

// ===========================================================================
// Tests
// ===========================================================================
