//! Internal utilities for the deterministic kernel runtime.
//!
//! These utilities are intentionally minimal and allocation-free on their
//! hot paths to preserve the no-dynamic-allocation, deterministic-ordering
//! guarantees the rest of the crate depends on.

pub mod arena;
pub mod det_hash;
pub mod fnv;

pub use arena::{Arena, ArenaError, ArenaIndex};
pub use det_hash::{DetBuildHasher, DetHashMap, DetHashSet, DetHasher};
pub use fnv::{Fnv1a, fnv1a_u64s};
