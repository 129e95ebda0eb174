//! # Integration Tests for the Skip List
//!
//! End-to-end tests exercising the list through its public API with
//! realistic workloads and a `BTreeMap` oracle.

use skiplane::{SkipList, SkipMap};

use rand::prelude::*;
use std::collections::BTreeMap;

// ===========================================================================
// Large Scale Operation Tests
// ===========================================================================

#[test]
fn large_scale_insert_and_lookup() {
	let map: SkipMap<i32, i32> = SkipMap::new();

	for i in 0..10_000 {
		map.put(i, i * 10);
	}

	map.assert_invariants();
	assert_eq!(map.len(), 10_000);

	for i in 0..10_000 {
		assert_eq!(map.get(&i), Some(i * 10), "failed to find key {}", i);
	}
}

#[test]
fn large_scale_insert_and_remove() {
	let map: SkipMap<i32, i32> = SkipMap::new();

	for i in 0..10_000 {
		map.put(i, i);
	}

	map.assert_invariants();

	for i in 0..10_000 {
		let item = map.fetch_remove(&i).unwrap_or_else(|| panic!("failed to remove key {}", i));
		assert_eq!(item.value, i);
	}

	map.assert_invariants();
	assert!(map.is_empty());

	// Everything removed went back to the pool.
	assert!(map.free_count() > 0);
}

#[test]
fn large_scale_random_operations_match_oracle() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	let mut rng = rand::rng();

	let mut expected: BTreeMap<i32, i32> = BTreeMap::new();

	for _ in 0..10_000 {
		let key: i32 = rng.random_range(0..1000);
		let op: u8 = rng.random_range(0..3);

		match op {
			0 => {
				let value = key * 10;
				map.put(key, value);
				expected.insert(key, value);
			}
			1 => {
				let removed = map.remove(&key);
				let expected_removed = expected.remove(&key).is_some();
				assert_eq!(removed, expected_removed);
			}
			2 => {
				assert_eq!(map.get(&key), expected.get(&key).copied());
			}
			_ => unreachable!(),
		}
	}

	map.assert_invariants();
	assert_eq!(map.len(), expected.len());

	for (k, v) in expected.iter() {
		assert_eq!(map.get(k), Some(*v));
	}

	// Rank order matches the oracle's iteration order exactly.
	for (rank, (k, v)) in expected.iter().enumerate() {
		assert_eq!(map.get_by_index(rank as i64), Some(*v));
		assert_eq!(map.index_of_key(k), Some(rank));
	}
}

// ===========================================================================
// Sequential and Random Key Pattern Tests
// ===========================================================================

#[test]
fn sequential_keys_ascending() {
	let map: SkipMap<i32, i32> = SkipMap::new();

	for i in 0..5000 {
		map.put(i, i);
	}

	map.assert_invariants();

	let mut iter = map.items();
	let mut prev = -1;
	while let Some((k, _)) = iter.next() {
		assert!(*k > prev);
		prev = *k;
	}
	assert_eq!(prev, 4999);
}

#[test]
fn sequential_keys_descending() {
	let map: SkipMap<i32, i32> = SkipMap::new();

	for i in (0..5000).rev() {
		map.put(i, i);
	}

	map.assert_invariants();

	let mut iter = map.items();
	let mut prev = -1;
	while let Some((k, _)) = iter.next() {
		assert!(*k > prev);
		prev = *k;
	}
	assert_eq!(prev, 4999);
}

#[test]
fn shuffled_keys() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	let mut rng = rand::rng();

	let mut keys: Vec<i32> = (0..5000).collect();
	keys.shuffle(&mut rng);

	for &k in &keys {
		map.put(k, k * 2);
	}

	map.assert_invariants();
	assert_eq!(map.len(), 5000);

	for i in 0..5000 {
		assert_eq!(map.get_by_index(i as i64), Some(i * 2));
	}
}

// ===========================================================================
// Duplicate-Mode Workloads
// ===========================================================================

#[test]
fn list_mode_bulk_duplicates() {
	let list: SkipList<i32, i32> = SkipList::new();

	// 100 keys, 10 duplicates each, values encode insertion order.
	for round in 0..10 {
		for key in 0..100 {
			list.put(key, round);
		}
	}

	list.assert_invariants();
	assert_eq!(list.len(), 1000);

	// The rightmost duplicate of every key is the latest round.
	for key in 0..100 {
		assert_eq!(list.get(&key), Some(9));
		assert_eq!(list.index_of_key(&key), Some((key as usize) * 10 + 9));
	}

	// Peeling one duplicate per key drops the newest.
	for key in 0..100 {
		let item = list.fetch_remove(&key).unwrap();
		assert_eq!(item.value, 9);
	}
	assert_eq!(list.len(), 900);
	list.assert_invariants();
}

// ===========================================================================
// Pop and Drain
// ===========================================================================

#[test]
fn pop_drains_from_the_back() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	for i in 0..100 {
		map.put(i, i);
	}

	for i in (0..100).rev() {
		let item = map.pop().unwrap();
		assert_eq!(item.key, i);
	}
	assert!(map.pop().is_none());
	assert!(map.is_empty());
}

#[test]
fn pop_first_drains_from_the_front() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	for i in 0..100 {
		map.put(i, i);
	}

	for i in 0..100 {
		let item = map.pop_first().unwrap();
		assert_eq!(item.key, i);
		// The successor slides into rank 0.
		if i < 99 {
			assert_eq!(map.get_by_index(0), Some(i + 1));
		}
	}
	assert!(map.pop_first().is_none());
	assert!(map.is_empty());
	map.assert_invariants();
}

// ===========================================================================
// Clone Independence
// ===========================================================================

#[test]
fn clone_preserves_content_and_detaches_storage() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	for i in 0..1000 {
		map.put(i, i * 3);
	}

	let copy = map.clone();
	copy.assert_invariants();
	assert_eq!(copy.len(), 1000);

	// Identical ordered sequences.
	let mut a = map.items();
	let mut b = copy.items();
	loop {
		match (a.next(), b.next()) {
			(Some(x), Some(y)) => assert_eq!(x, y),
			(None, None) => break,
			_ => panic!("clone diverged from source"),
		}
	}
	drop(a);
	drop(b);

	// Mutating one leaves the other unchanged.
	copy.put(5000, 1);
	assert!(map.remove(&0));
	assert_eq!(copy.get(&0), Some(0));
	assert_eq!(map.get(&5000), None);
	assert_eq!(map.len(), 999);
	assert_eq!(copy.len(), 1001);
}

// ===========================================================================
// Clearing
// ===========================================================================

#[test]
fn clear_retaining_capacity_reuses_the_arena() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	for i in 0..1000 {
		map.put(i, i);
	}

	map.clear_retaining_capacity();
	assert!(map.is_empty());
	map.assert_invariants();

	// Everything is parked on the free list, waiting for reuse.
	assert!(map.free_count() >= 1000);

	for i in 0..1000 {
		map.put(i, i + 1);
	}
	assert_eq!(map.len(), 1000);
	assert_eq!(map.get(&999), Some(1000));
	map.assert_invariants();
}

#[test]
fn clear_and_free_resets_the_pool() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	for i in 0..1000 {
		map.put(i, i);
	}

	map.clear_and_free();
	assert!(map.is_empty());
	assert_eq!(map.free_count(), 0);
	map.assert_invariants();

	map.put(1, 10);
	assert_eq!(map.get(&1), Some(10));
}

// ===========================================================================
// Range Removal at Scale
// ===========================================================================

#[test]
fn remove_slice_by_index_windows() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	let mut expected: BTreeMap<i32, i32> = BTreeMap::new();
	for i in 0..1000 {
		map.put(i, i);
		expected.insert(i, i);
	}

	// Repeatedly cut a window out of the middle.
	while map.len() > 100 {
		let len = map.len();
		let start = (len / 4) as i64;
		let stop = (len / 2) as i64;
		assert_eq!(map.remove_slice_by_index(start, stop), Ok(true));

		let keys: Vec<i32> = expected.keys().copied().collect();
		for &k in &keys[start as usize..stop as usize] {
			expected.remove(&k);
		}

		map.assert_invariants();
		assert_eq!(map.len(), expected.len());
	}

	for (rank, (k, v)) in expected.iter().enumerate() {
		assert_eq!(map.index_of_key(k), Some(rank));
		assert_eq!(map.get_by_index(rank as i64), Some(*v));
	}
}

#[test]
fn remove_slice_by_key_full_span_leaves_empty_lanes() {
	let map: SkipMap<i32, i32> = SkipMap::new();
	for i in 0..2000 {
		map.put(i, i);
	}

	// Remove everything except the last key; whole express levels
	// collapse and must survive as empty lanes.
	assert_eq!(map.remove_slice_by_key(&0, &1999), Ok(true));
	assert_eq!(map.len(), 1);
	assert_eq!(map.get(&1999), Some(1999));
	map.assert_invariants();

	// The structure keeps working after the collapse.
	for i in 0..100 {
		map.put(i, i);
	}
	assert_eq!(map.len(), 101);
	map.assert_invariants();
}
