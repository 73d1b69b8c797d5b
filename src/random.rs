//! Sources for the randomized iteration start.
//!
//! Iteration begins at a random group so that code cannot come to depend on
//! the order entries happen to be visited in, and so that iteration bugs tied
//! to a particular starting point show up across runs.

use core::hash::BuildHasher;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

use cfg_if::cfg_if;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Picks a starting index for iteration.
pub trait RandomIndex {
    /// Returns a value uniformly distributed over `0..len`.
    ///
    /// `len` is never zero.
    fn random_index(&self, len: usize) -> usize;
}

cfg_if! {
    if #[cfg(feature = "std")] {
        /// The start source used when none is supplied.
        pub type DefaultRandom = ThreadRandom;
    } else {
        /// The start source used when none is supplied.
        pub type DefaultRandom = SeededIndex;
    }
}

/// Draws from `rand`'s thread-local generator.
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

#[cfg(feature = "std")]
impl RandomIndex for ThreadRandom {
    fn random_index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Always starts at the same index, modulo `len`.
///
/// Useful for tests that need a reproducible iteration order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedIndex(pub usize);

impl RandomIndex for FixedIndex {
    fn random_index(&self, len: usize) -> usize {
        self.0 % len
    }
}

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

static INSTANCES: AtomicU64 = AtomicU64::new(0);

/// A seeded source that needs no operating system entropy.
///
/// Every call advances an atomic Weyl sequence and seeds a fresh
/// [`SmallRng`] from it, so consecutive iterators start at unrelated groups.
/// This is the default without the `std` feature.
///
/// [`Default`] mixes the address of a stack slot with a process-wide counter,
/// which varies between runs wherever the platform randomizes addresses. Use
/// [`SeededIndex::new`] for a reproducible order or
/// [`SeededIndex::from_build_hasher`] to inherit the hasher's randomness.
#[derive(Debug)]
pub struct SeededIndex {
    state: AtomicU64,
}

impl SeededIndex {
    /// Creates a source whose sequence is fully determined by `seed`.
    pub const fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Seeds from a [`BuildHasher`], so a randomly keyed hasher also gives a
    /// random iteration order.
    pub fn from_build_hasher<S: BuildHasher>(hash_builder: &S) -> Self {
        Self::new(hash_builder.hash_one(GOLDEN_GAMMA))
    }

    fn next_rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.state.fetch_add(GOLDEN_GAMMA, Ordering::Relaxed))
    }
}

impl Default for SeededIndex {
    fn default() -> Self {
        let marker = 0u8;
        let address = core::ptr::addr_of!(marker) as usize as u64;
        let count = INSTANCES.fetch_add(GOLDEN_GAMMA, Ordering::Relaxed);
        Self::new(address.rotate_left(32) ^ count)
    }
}

impl Clone for SeededIndex {
    fn clone(&self) -> Self {
        Self::new(self.state.load(Ordering::Relaxed))
    }
}

impl RandomIndex for SeededIndex {
    fn random_index(&self, len: usize) -> usize {
        self.next_rng().random_range(0..len)
    }
}
