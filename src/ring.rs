// File: ring.rs
//
// The purpose of this file is to provide the identifier-circle
// arithmetic: hashing names onto the ring with SHA-1 and deciding
// whether a given id falls between two other ids walking clockwise.

use sha1::{Digest, Sha1};
use std::cmp::Ordering;

/// The identifier circle `[0, 2^m)`. Copied by value into every node so
/// that nothing in the crate reads a global ring size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ring {
    m: u32,
    size: u64,
}

impl Ring {
    /// Returns a ring of size `2^m`. Callers validate `m` before
    /// constructing; the overlay constructor is the public gate.
    pub fn new(m: u32) -> Ring {
        assert!(m >= 1 && m <= 32, "ring exponent outside [1, 32]");
        Ring {
            m,
            size: 1u64 << m,
        }
    }

    /// The ring exponent `m`.
    pub fn m(&self) -> u32 {
        self.m
    }

    /// The number of positions on the ring, `2^m`.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hashes a name onto the ring: the top `m` bits of its SHA-1
    /// digest, read big-endian.
    ///
    /// # Arguments
    ///
    /// * `name` - the name to be hashed
    pub fn hash(&self, name: &str) -> u64 {
        let mut hasher = Sha1::new();
        hasher.input(name.as_bytes());
        let digest = hasher.result();
        let word = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        (word >> (32 - self.m)) as u64
    }

    /// Returns whether `x` lies strictly between `a` and `b` walking
    /// clockwise. When `a == b` the interval is the whole ring minus
    /// `a` itself.
    ///
    /// # Arguments
    ///
    /// * `x` - the id being tested
    /// * `a` - the excluded lower bound
    /// * `b` - the excluded upper bound
    pub fn in_open(&self, x: u64, a: u64, b: u64) -> bool {
        match a.cmp(&b) {
            Ordering::Less => x > a && x < b,
            Ordering::Greater => x > a || x < b,
            Ordering::Equal => x != a,
        }
    }

    /// Returns whether `x` lies in `(a, b]` walking clockwise. When
    /// `a == b` the interval is the whole ring; this is what lets a
    /// lookup terminate on a one-node ring.
    ///
    /// # Arguments
    ///
    /// * `x` - the id being tested
    /// * `a` - the excluded lower bound
    /// * `b` - the included upper bound
    pub fn in_half_open(&self, x: u64, a: u64, b: u64) -> bool {
        match a.cmp(&b) {
            Ordering::Less => x > a && x <= b,
            Ordering::Greater => x > a || x <= b,
            Ordering::Equal => true,
        }
    }

    /// Clockwise distance from `a` to `b`, `(b - a) mod 2^m`.
    pub fn forward_distance(&self, a: u64, b: u64) -> u64 {
        b.wrapping_sub(a) & (self.size - 1)
    }

    /// The start of finger interval `i` for a node at `id`,
    /// `(id + 2^i) mod 2^m`.
    pub fn finger_start(&self, id: u64, i: u32) -> u64 {
        (id + (1u64 << i)) & (self.size - 1)
    }
}
