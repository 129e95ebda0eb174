//! Memory reclamation tests for the skip list.
//!
//! This binary installs [`skiplane::alloc::CountingAllocator`] as the
//! global allocator and verifies, by allocation deltas, that:
//!
//! 1. Dropping a list returns everything it allocated.
//! 2. `clear_and_free` hands the node arena back to the allocator.
//! 3. Churn (remove-then-insert) is served from the pool's free list
//!    instead of growing the arena.
//!
//! Counters are process-global, so every test in this binary serializes
//! on one mutex and measures deltas around its own region of interest
//! rather than absolute counts.

use skiplane::alloc::{counters, CountingAllocator};
use skiplane::{SkipList, SkipMap};

use std::sync::Mutex;

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

/// Serializes the tests in this binary so counter deltas are attributable.
static SERIAL: Mutex<()> = Mutex::new(());

// ===========================================================================
// Drop Reclamation
// ===========================================================================

#[test]
fn drop_returns_every_allocation() {
	let _guard = SERIAL.lock().unwrap();

	let before = counters();
	{
		let map: SkipMap<i64, String> = SkipMap::new();
		for i in 0..2000 {
			map.put(i, format!("value-{i}"));
		}
		assert_eq!(map.len(), 2000);
	}
	let after = counters();

	assert_eq!(
		after.allocations - before.allocations,
		after.deallocations - before.deallocations,
		"dropping the list must free everything it allocated"
	);
	assert_eq!(after.bytes_in_use, before.bytes_in_use);
}

#[test]
fn drop_reclaims_byte_string_keys() {
	let _guard = SERIAL.lock().unwrap();

	let before = counters();
	{
		let map: SkipMap<Vec<u8>, u64> = SkipMap::new();
		for i in 0..1000u64 {
			map.put(i.to_be_bytes().to_vec(), i);
		}
		// Removal parks nodes on the free list; their keys must still
		// drop eagerly, not linger in parked slots.
		for i in 0..500u64 {
			assert!(map.remove(&i.to_be_bytes().to_vec()));
		}
	}
	let after = counters();

	assert_eq!(
		after.allocations - before.allocations,
		after.deallocations - before.deallocations
	);
	assert_eq!(after.bytes_in_use, before.bytes_in_use);
}

#[test]
fn dropping_a_clone_leaves_the_source_intact() {
	let _guard = SERIAL.lock().unwrap();

	let map: SkipMap<i64, String> = SkipMap::new();
	for i in 0..500 {
		map.put(i, format!("v{i}"));
	}

	let before = counters();
	{
		let copy = map.clone();
		assert_eq!(copy.len(), 500);
	}
	let after = counters();

	assert_eq!(
		after.allocations - before.allocations,
		after.deallocations - before.deallocations
	);
	for i in 0..500 {
		assert_eq!(map.get_with(&i, String::len), Some(format!("v{i}").len()));
	}
}

// ===========================================================================
// Arena Lifecycle
// ===========================================================================

#[test]
fn clear_and_free_returns_the_arena() {
	let _guard = SERIAL.lock().unwrap();

	let map: SkipMap<i64, i64> = SkipMap::new();
	for i in 0..5000 {
		map.put(i, i);
	}

	let loaded = counters().bytes_in_use;
	map.clear_and_free();
	let cleared = counters().bytes_in_use;

	assert!(
		cleared < loaded,
		"clear_and_free must shrink the footprint: {} -> {} bytes",
		loaded,
		cleared
	);
	assert_eq!(map.free_count(), 0);
	map.assert_invariants();
}

#[test]
fn clear_retaining_capacity_keeps_the_arena() {
	let _guard = SERIAL.lock().unwrap();

	let map: SkipMap<i64, i64> = SkipMap::new();
	for i in 0..5000 {
		map.put(i, i);
	}
	map.clear_retaining_capacity();

	// Refilling to the same population is served by parked slots; the
	// arena does not grow again.
	let before = counters();
	for i in 0..5000 {
		map.put(i, i);
	}
	let after = counters();

	assert!(
		after.allocations - before.allocations <= 8,
		"refill after clear_retaining_capacity allocated {} times",
		after.allocations - before.allocations
	);
	assert_eq!(map.len(), 5000);
	map.assert_invariants();
}

// ===========================================================================
// Free-List Churn
// ===========================================================================

#[test]
fn churn_reuses_parked_nodes() {
	let _guard = SERIAL.lock().unwrap();

	let map: SkipMap<i64, i64> = SkipMap::new();
	for i in 0..2000 {
		map.put(i, i);
	}
	for i in 0..2000 {
		assert!(map.remove(&i));
	}

	// Steady-state churn: every acquire should pop the free list; the
	// only acceptable allocations are the rare express-tower imbalance
	// and an occasional slab growth step.
	let before = counters();
	for round in 0..5 {
		for i in 0..2000 {
			map.put(i, round);
		}
		for i in 0..2000 {
			assert!(map.remove(&i));
		}
	}
	let after = counters();

	assert!(
		after.allocations - before.allocations <= 32,
		"steady-state churn allocated {} times",
		after.allocations - before.allocations
	);
	map.assert_invariants();
}

#[test]
fn duplicate_churn_reuses_parked_nodes() {
	let _guard = SERIAL.lock().unwrap();

	let list: SkipList<i64, i64> = SkipList::new();
	for i in 0..500 {
		list.put(7, i);
	}
	for _ in 0..500 {
		assert!(list.remove(&7));
	}

	let before = counters();
	for i in 0..500 {
		list.put(7, i);
	}
	let after = counters();

	assert!(
		after.allocations - before.allocations <= 16,
		"duplicate churn allocated {} times",
		after.allocations - before.allocations
	);
	assert_eq!(list.len(), 500);
	list.assert_invariants();
}
