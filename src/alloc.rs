//! Allocation tracking for memory tests.
//!
//! A counting wrapper around the system allocator, used by the memory
//! test binary to verify two properties of the node pool: that churn
//! (remove-then-insert) is served from the free list without growing the
//! arena, and that dropping or clearing a list returns everything it
//! allocated.
//!
//! # Usage
//!
//! In a test binary:
//!
//! ```ignore
//! use skiplane::alloc::CountingAllocator;
//!
//! #[global_allocator]
//! static ALLOC: CountingAllocator = CountingAllocator;
//!
//! #[test]
//! fn no_leak() {
//!     skiplane::alloc::reset();
//!     // ... exercise a list and drop it ...
//!     skiplane::alloc::assert_balanced();
//! }
//! ```
//!
//! # Caveats
//!
//! - Counters are process-global; tests that read them must not run in
//!   parallel with other allocating tests.
//! - The harness itself allocates, so tests compare deltas around the
//!   region of interest rather than absolute counts.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);
static DEALLOCATIONS: AtomicUsize = AtomicUsize::new(0);
static BYTES_IN_USE: AtomicIsize = AtomicIsize::new(0);

/// Counting wrapper around the system allocator.
pub struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
	unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
		ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
		BYTES_IN_USE.fetch_add(layout.size() as isize, Ordering::Relaxed);
		System.alloc(layout)
	}

	unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
		DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
		BYTES_IN_USE.fetch_sub(layout.size() as isize, Ordering::Relaxed);
		System.dealloc(ptr, layout)
	}

	unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
		ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
		BYTES_IN_USE.fetch_add(layout.size() as isize, Ordering::Relaxed);
		System.alloc_zeroed(layout)
	}

	unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
		BYTES_IN_USE.fetch_add(new_size as isize - layout.size() as isize, Ordering::Relaxed);
		System.realloc(ptr, layout, new_size)
	}
}

/// A snapshot of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
	/// Allocations since the last [`reset`].
	pub allocations: usize,
	/// Deallocations since the last [`reset`].
	pub deallocations: usize,
	/// Net bytes currently allocated (may drift negative when a reset
	/// races an in-flight allocation).
	pub bytes_in_use: isize,
}

/// Zeroes all counters.
pub fn reset() {
	ALLOCATIONS.store(0, Ordering::SeqCst);
	DEALLOCATIONS.store(0, Ordering::SeqCst);
	BYTES_IN_USE.store(0, Ordering::SeqCst);
}

/// Reads the counters.
pub fn counters() -> Counters {
	Counters {
		allocations: ALLOCATIONS.load(Ordering::SeqCst),
		deallocations: DEALLOCATIONS.load(Ordering::SeqCst),
		bytes_in_use: BYTES_IN_USE.load(Ordering::SeqCst),
	}
}

/// Panics unless allocations and deallocations match and no bytes remain
/// in use.
pub fn assert_balanced() {
	let c = counters();
	let drift = c.allocations as isize - c.deallocations as isize;
	assert_eq!(
		drift, 0,
		"allocation imbalance: {} allocations vs {} deallocations",
		c.allocations, c.deallocations
	);
	assert_eq!(c.bytes_in_use, 0, "{} bytes still allocated", c.bytes_in_use);
}

/// Panics if allocations and deallocations differ by more than
/// `tolerance`. Useful when the test harness itself allocates around the
/// region of interest.
pub fn assert_balanced_within(tolerance: usize) {
	let c = counters();
	let drift = (c.allocations as isize - c.deallocations as isize).unsigned_abs();
	assert!(
		drift <= tolerance,
		"allocation imbalance beyond tolerance {}: {} allocations vs {} deallocations",
		tolerance,
		c.allocations,
		c.deallocations
	);
}
