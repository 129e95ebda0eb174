//! # Error Types for the Skip List
//!
//! This module defines the error values surfaced by the failable range
//! operations. Point operations (`get`, `put`, `remove`, `update`, ...)
//! never fail: absence is expressed through `Option` or `bool` returns.
//! Only the slice family validates its inputs, and it does so *before*
//! mutating anything, so an `Err` return always leaves the list in its
//! pre-call state.
//!
//! ## Error Flow
//!
//! ```text
//! Slice operation starts
//!      │
//!      ▼
//! Acquire lock (shared or exclusive)
//!      │
//!      ▼
//! Validate step / bounds / endpoint keys ──► Err(...) ──► list unchanged
//!      │
//!      ▼ (Ok)
//! Traverse / excise
//!      │
//!      ▼
//! Return success
//! ```

use thiserror::Error;

/// Errors reported by the slice and range operations.
///
/// Every variant corresponds to a rejected *input*, never to a failure
/// encountered mid-flight: validation happens up front and no partial
/// mutation is ever observable after an error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// A key range was given with its endpoints inverted.
	///
	/// Returned by [`remove_slice_by_key`], [`get_slice_by_key`] and
	/// [`set_slice_by_key`] when `start_key > stop_key`.
	///
	/// [`remove_slice_by_key`]: crate::GenericSkipList::remove_slice_by_key
	/// [`get_slice_by_key`]: crate::GenericSkipList::get_slice_by_key
	/// [`set_slice_by_key`]: crate::GenericSkipList::set_slice_by_key
	#[error("start key is greater than end key")]
	StartKeyGreaterThanEndKey,

	/// An index range was given with its endpoints inverted relative to
	/// the step direction (forward steps need `start <= stop`, backward
	/// steps need `start >= stop`).
	#[error("start index is greater than end index")]
	StartIndexGreaterThanEndIndex,

	/// A single named key was required and not found.
	///
	/// Returned by [`remove_slice_by_key`] when `start_key == stop_key`
	/// (an empty range, where neither endpoint is meaningfully the
	/// "start" or the "end") and that key is absent.
	///
	/// [`remove_slice_by_key`]: crate::GenericSkipList::remove_slice_by_key
	#[error("missing key")]
	MissingKey,

	/// The range's start key is not present in the list.
	#[error("missing start key")]
	MissingStartKey,

	/// The range's stop key is not present in the list.
	///
	/// The stop key must exist even though the range is half-open and the
	/// stop key itself is never removed or emitted: it is the anchor that
	/// bounds the traversal.
	#[error("missing end key")]
	MissingEndKey,

	/// An index argument fell outside the addressable range, or an index
	/// range normalized to empty or inverted where that is not a no-op.
	#[error("invalid index")]
	InvalidIndex,

	/// A slice stop index fell outside `[-len, len]`.
	#[error("invalid stop index")]
	InvalidStopIndex,

	/// A slice step of zero was given; a step must move the cursor.
	#[error("step is zero")]
	StepIndexZero,
}

/// A `Result` alias using this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
