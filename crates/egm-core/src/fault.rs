//! Tagged fault bitset.
//!
//! A [`FaultSet`] records which hardware faults of one device family are
//! currently active. Each fault family is an enum implementing [`FaultCode`];
//! every variant owns exactly one bit, so a "set this fault" operation can
//! never carry a combined multi-bit value.
//!
//! Edge detection is exposed through [`FaultSet::toggled`], which yields the
//! bits a code would newly switch on. An empty result means the fault is
//! already recorded and no notification should be emitted.
//!
//! ```
//! use egm_core::{FaultCode, FaultSet};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Demo { Jam, Open }
//!
//! impl FaultCode for Demo {
//!     fn index(self) -> u8 { self as u8 }
//!     fn name(self) -> &'static str {
//!         match self { Demo::Jam => "Jam", Demo::Open => "Open" }
//!     }
//!     fn all() -> &'static [Self] { &[Demo::Jam, Demo::Open] }
//! }
//!
//! let set = FaultSet::<Demo>::empty().with(Demo::Jam);
//! assert!(set.toggled(Demo::Jam).is_empty());
//! assert!(set.newly_set(Demo::Open));
//! ```

use crate::constants::MAX_FAULT_CODES;
use std::fmt;
use std::marker::PhantomData;

/// A family of single-bit hardware fault codes.
pub trait FaultCode: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Bit position occupied by this code. Must be below 32 and unique
    /// within the family.
    fn index(self) -> u8;

    /// Human-readable name used in logs and notifications.
    fn name(self) -> &'static str;

    /// Every code of the family, in bit order.
    fn all() -> &'static [Self];

    /// The single bit this code occupies.
    #[inline]
    fn bit(self) -> u32 {
        let index = self.index();
        debug_assert!(index < MAX_FAULT_CODES, "fault index {index} out of range");
        1u32 << (index % MAX_FAULT_CODES)
    }
}

/// Bitset of active faults keyed by a [`FaultCode`] family.
pub struct FaultSet<C> {
    bits: u32,
    _family: PhantomData<fn() -> C>,
}

impl<C: FaultCode> FaultSet<C> {
    /// A set with no active faults.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _family: PhantomData,
        }
    }

    /// Build a set from raw bits, dropping bits no code of the family owns.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        let known = C::all().iter().fold(0u32, |acc, code| acc | code.bit());
        Self {
            bits: bits & known,
            _family: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, code: C) -> bool {
        self.bits & code.bit() != 0
    }

    /// Bits that setting `code` would newly switch on.
    ///
    /// Computed as `(faults XOR bit) AND bit`: empty when `code` is already
    /// active, otherwise exactly `code`'s bit.
    #[inline]
    #[must_use]
    pub fn toggled(&self, code: C) -> FaultSet<C> {
        let bit = code.bit();
        Self {
            bits: (self.bits ^ bit) & bit,
            _family: PhantomData,
        }
    }

    /// Returns `true` if setting `code` would be a new edge.
    #[inline]
    #[must_use]
    pub fn newly_set(&self, code: C) -> bool {
        !self.toggled(code).is_empty()
    }

    /// Copy of this set with `code` added.
    #[must_use]
    pub fn with(mut self, code: C) -> Self {
        self.insert(code);
        self
    }

    /// Add `code`, returning `true` if it was not already present.
    pub fn insert(&mut self, code: C) -> bool {
        let newly = self.newly_set(code);
        self.bits |= code.bit();
        newly
    }

    /// Remove every fault, returning the previous set.
    pub fn take(&mut self) -> FaultSet<C> {
        std::mem::take(self)
    }

    /// Active codes in bit order.
    pub fn iter(&self) -> impl Iterator<Item = C> + '_ {
        C::all().iter().copied().filter(|code| self.contains(*code))
    }
}

impl<C: FaultCode> Default for FaultSet<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C> Clone for FaultSet<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for FaultSet<C> {}

impl<C> PartialEq for FaultSet<C> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<C> Eq for FaultSet<C> {}

impl<C: FaultCode> fmt::Debug for FaultSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<C: FaultCode> fmt::Display for FaultSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.iter().map(FaultCode::name).collect();
        write!(f, "{}", names.join("|"))
    }
}

impl<C: FaultCode> FromIterator<C> for FaultSet<C> {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), FaultSet::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestFault {
        Jam,
        Sensor,
        Full,
    }

    impl FaultCode for TestFault {
        fn index(self) -> u8 {
            match self {
                TestFault::Jam => 0,
                TestFault::Sensor => 3,
                TestFault::Full => 31,
            }
        }

        fn name(self) -> &'static str {
            match self {
                TestFault::Jam => "Jam",
                TestFault::Sensor => "Sensor",
                TestFault::Full => "Full",
            }
        }

        fn all() -> &'static [Self] {
            &[TestFault::Jam, TestFault::Sensor, TestFault::Full]
        }
    }

    #[rstest]
    #[case(TestFault::Jam, 0b1)]
    #[case(TestFault::Sensor, 0b1000)]
    #[case(TestFault::Full, 1 << 31)]
    fn test_each_code_owns_one_bit(#[case] code: TestFault, #[case] expected: u32) {
        assert_eq!(code.bit(), expected);
        assert_eq!(code.bit().count_ones(), 1);
    }

    #[test]
    fn test_toggled_is_empty_for_active_code() {
        let set = FaultSet::<TestFault>::empty().with(TestFault::Jam);
        assert!(set.toggled(TestFault::Jam).is_empty());
        assert!(!set.newly_set(TestFault::Jam));
    }

    #[test]
    fn test_toggled_reports_new_bit_only() {
        let set = FaultSet::<TestFault>::empty().with(TestFault::Jam);
        let toggled = set.toggled(TestFault::Sensor);
        assert_eq!(toggled.bits(), TestFault::Sensor.bit());
        assert!(!toggled.contains(TestFault::Jam));
    }

    #[test]
    fn test_insert_accumulates() {
        let mut set = FaultSet::<TestFault>::empty();
        assert!(set.insert(TestFault::Jam));
        assert!(!set.insert(TestFault::Jam));
        assert!(set.insert(TestFault::Full));
        assert_eq!(set.bits(), TestFault::Jam.bit() | TestFault::Full.bit());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_take_clears_whole_set() {
        let mut set: FaultSet<TestFault> = [TestFault::Jam, TestFault::Sensor]
            .into_iter()
            .collect();
        let previous = set.take();
        assert!(set.is_empty());
        assert_eq!(previous.len(), 2);
    }

    #[test]
    fn test_from_bits_masks_unknown_bits() {
        let set = FaultSet::<TestFault>::from_bits(0b1111);
        assert_eq!(set.bits(), TestFault::Jam.bit() | TestFault::Sensor.bit());
    }

    #[test]
    fn test_display() {
        let set: FaultSet<TestFault> = [TestFault::Full, TestFault::Jam].into_iter().collect();
        assert_eq!(set.to_string(), "Jam|Full");
        assert_eq!(FaultSet::<TestFault>::empty().to_string(), "none");
    }
}
