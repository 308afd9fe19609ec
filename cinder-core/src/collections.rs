//! Collection aliases used across the engine.
//!
//! Hash containers use foldhash; hot paths reach for SmallVec to stay
//! off the heap for the common small cases.

pub use smallvec::SmallVec;

pub mod hashmap {
    pub type HashMap<K, V> = hashbrown::HashMap<K, V, foldhash::fast::RandomState>;
}

pub mod hashset {
    pub type HashSet<T> = hashbrown::HashSet<T, foldhash::fast::RandomState>;
}

/// Hash a single value with a seed-stable hasher.
///
/// Used where a hash is part of engine state that must agree across
/// calls within one process (sort keys, registry lookups).
pub fn hash_value<T: std::hash::Hash>(value: &T) -> u64 {
    use foldhash::quality::FixedState;
    use std::hash::BuildHasher;

    FixedState::default().hash_one(value)
}
