#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod control;
mod group;

/// A HashMap built on the Swiss-table layout.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers and a
/// configurable source for the randomized iteration start.
pub mod hash_map;

pub mod hash_table;

pub mod random;

pub use hash_map::DefaultHashBuilder;
pub use hash_map::HashMap;
pub use hash_table::HashTable;
pub use hash_table::SnapshotIter;
pub use random::RandomIndex;
