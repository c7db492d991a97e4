//! Bit-indexed flags over an unbounded bitfield.
//!
//! `Bits` treats a little-endian sequence of `u64` limbs as one integer:
//! bit *i* has weight 2^*i*. There is no upper bound on an index (limbs
//! grow on demand), and trailing zero limbs are trimmed so that equal
//! flag sets compare equal regardless of how they were built.
//!
//! The ack aggregator stores the outstanding-peer set of each pending
//! write as a `Bits` value, clearing one flag per acknowledgement.

use serde::{Deserialize, Serialize};

const LIMB_BITS: usize = u64::BITS as usize;

/// A set of bit flags with no upper index bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bits {
    words: Vec<u64>,
}

impl Bits {
    /// The empty flag set (the integer zero).
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns a copy with the named flags set. Setting an already-set
    /// flag is a no-op.
    #[must_use]
    pub fn set_flags(mut self, indices: &[usize]) -> Self {
        for &i in indices {
            let limb = i / LIMB_BITS;
            if limb >= self.words.len() {
                self.words.resize(limb + 1, 0);
            }
            self.words[limb] |= 1 << (i % LIMB_BITS);
        }
        self
    }

    /// Returns whether flag `i` is set.
    #[must_use]
    pub fn get(&self, i: usize) -> bool {
        self.words
            .get(i / LIMB_BITS)
            .is_some_and(|w| w & (1 << (i % LIMB_BITS)) != 0)
    }

    /// Returns whether no flag is set.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Applies a mask, clearing every flag the mask names.
    #[must_use]
    pub fn apply_mask(&self, mask: &Mask) -> Self {
        let mut words = self.words.clone();
        for (w, c) in words.iter_mut().zip(&mask.cleared.words) {
            *w &= !c;
        }
        let mut out = Self { words };
        out.trim();
        out
    }

    /// Number of set flags.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

/// A mask that clears a set of flags when applied.
///
/// Conceptually the all-ones integer with the named bits unset; stored as
/// the complement so that it stays finite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    cleared: Bits,
}

impl Mask {
    /// A mask that clears flag `i`.
    #[must_use]
    pub fn unset_flag(i: usize) -> Self {
        Self {
            cleared: Bits::zero().set_flags(&[i]),
        }
    }

    /// A mask that clears every flag in `bits`.
    #[must_use]
    pub fn unset_all(bits: Bits) -> Self {
        Self { cleared: bits }
    }
}
