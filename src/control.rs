//! Control bytes and group-wide bitmask matching.
//!
//! Every slot in the table is described by one control byte. The high bit
//! distinguishes the two sentinel states from occupied slots, so an occupied
//! byte is always the 7-bit hash fragment `h2` in `0x00..=0x7F`.

use cfg_if::cfg_if;

/// Number of slots in a group, and the width of a control-byte scan.
pub(crate) const GROUP_WIDTH: usize = 16;

/// Slot has never held an entry, or was reclaimed directly. Terminates probe
/// sequences.
pub(crate) const EMPTY: u8 = 0x80;

/// Slot held an entry that was removed from a saturated group. Probe sequences
/// continue past it.
pub(crate) const TOMBSTONE: u8 = 0xFE;

const H2_MASK: u64 = 0x7F;

/// Low 7 bits of the hash, stored verbatim in the control byte.
#[inline(always)]
pub(crate) fn h2(hash: u64) -> u8 {
    (hash & H2_MASK) as u8
}

/// Everything but the low 7 bits of the hash, used to pick the home group.
#[inline(always)]
pub(crate) fn h1(hash: u64) -> u64 {
    hash >> 7
}

/// Maps `h1` uniformly into `0..groups` with a multiply-high reduction.
///
/// `h1` carries 57 significant bits, so `(h1 * groups) >> 57` is the
/// fixed-point product of `h1 / 2^57` and `groups`. Unlike masking this works
/// for any group count, power of two or not.
#[inline(always)]
pub(crate) fn probe_start(h1: u64, groups: usize) -> usize {
    debug_assert!(groups > 0);
    ((h1 as u128 * groups as u128) >> 57) as usize
}

#[inline(always)]
pub(crate) fn is_full(ctrl: u8) -> bool {
    ctrl & 0x80 == 0
}

/// The 16 control bytes of one group.
///
/// Aligned to 16 so the SSE2 path can use an aligned load.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C, align(16))]
pub(crate) struct Metadata {
    pub(crate) bytes: [u8; GROUP_WIDTH],
}

impl Metadata {
    pub(crate) const fn empty() -> Self {
        Self {
            bytes: [EMPTY; GROUP_WIDTH],
        }
    }

    /// Bit `i` is set iff slot `i` holds `h2`.
    #[inline(always)]
    pub(crate) fn match_h2(&self, h2: u8) -> BitMask {
        debug_assert!(is_full(h2));
        self.match_byte(h2)
    }

    /// Bit `i` is set iff slot `i` is `EMPTY`.
    #[inline(always)]
    pub(crate) fn match_empty(&self) -> BitMask {
        self.match_byte(EMPTY)
    }

    /// Bit `i` is set iff slot `i` holds a live entry.
    #[inline(always)]
    pub(crate) fn match_full(&self) -> BitMask {
        cfg_if! {
            if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
                self.match_full_sse2()
            } else {
                self.match_full_scalar()
            }
        }
    }

    #[inline(always)]
    fn match_byte(&self, byte: u8) -> BitMask {
        cfg_if! {
            if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
                self.match_byte_sse2(byte)
            } else {
                self.match_byte_scalar(byte)
            }
        }
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    #[inline(always)]
    fn load(&self) -> core::arch::x86_64::__m128i {
        // SAFETY: `Metadata` is `#[repr(C, align(16))]` with `bytes` at offset 0,
        // so the aligned 16-byte load stays inside `self`.
        unsafe { core::arch::x86_64::_mm_load_si128(self.bytes.as_ptr().cast()) }
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    #[inline(always)]
    fn match_byte_sse2(&self, byte: u8) -> BitMask {
        use core::arch::x86_64::*;
        // SAFETY: SSE2 is enabled for this target.
        unsafe {
            let cmp = _mm_cmpeq_epi8(self.load(), _mm_set1_epi8(byte as i8));
            BitMask(_mm_movemask_epi8(cmp) as u16)
        }
    }

    /// Occupied bytes are the ones with the high bit clear, so the full mask
    /// is the inverted sign-bit mask.
    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    #[inline(always)]
    fn match_full_sse2(&self) -> BitMask {
        // SAFETY: SSE2 is enabled for this target.
        let high_bits = unsafe { core::arch::x86_64::_mm_movemask_epi8(self.load()) };
        BitMask(!(high_bits as u16))
    }

    #[allow(dead_code)]
    #[inline(always)]
    fn match_byte_scalar(&self, byte: u8) -> BitMask {
        let mut bits: u16 = 0;
        for (i, &b) in self.bytes.iter().enumerate() {
            if b == byte {
                bits |= 1 << i;
            }
        }
        BitMask(bits)
    }

    #[allow(dead_code)]
    #[inline(always)]
    fn match_full_scalar(&self) -> BitMask {
        let mut bits: u16 = 0;
        for (i, &b) in self.bytes.iter().enumerate() {
            if is_full(b) {
                bits |= 1 << i;
            }
        }
        BitMask(bits)
    }
}

impl core::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, &b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match b {
                EMPTY => f.write_str("..")?,
                TOMBSTONE => f.write_str("xx")?,
                _ => write!(f, "{b:02x}")?,
            }
        }
        Ok(())
    }
}

/// One bit per slot of a group. Bit `i` always corresponds to slot `i`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BitMask(pub(crate) u16);

impl BitMask {
    #[inline(always)]
    pub(crate) fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub(crate) fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    #[inline(always)]
    fn remove_lowest_bit(self) -> Self {
        BitMask(self.0 & self.0.wrapping_sub(1))
    }
}

impl IntoIterator for BitMask {
    type Item = usize;
    type IntoIter = BitMaskIter;

    #[inline(always)]
    fn into_iter(self) -> BitMaskIter {
        BitMaskIter(self)
    }
}

/// Yields the indices of set bits, lowest first.
#[derive(Clone, Copy)]
pub(crate) struct BitMaskIter(BitMask);

impl Iterator for BitMaskIter {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let bit = self.0.lowest_set_bit()?;
        self.0 = self.0.remove_lowest_bit();
        Some(bit)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn metadata(bytes: [u8; GROUP_WIDTH]) -> Metadata {
        Metadata { bytes }
    }

    #[test]
    fn empty_group_matches_every_slot() {
        let meta = Metadata::empty();
        assert_eq!(meta.match_empty(), BitMask(0xFFFF));
        assert_eq!(meta.match_full(), BitMask(0));
        for h in 0..=0x7Fu8 {
            assert!(!meta.match_h2(h).any_bit_set());
        }
    }

    #[test]
    fn match_h2_reports_each_matching_slot() {
        let mut bytes = [EMPTY; GROUP_WIDTH];
        bytes[0] = 0x11;
        bytes[3] = 0x22;
        bytes[7] = 0x11;
        bytes[15] = 0x11;
        bytes[9] = TOMBSTONE;
        let meta = metadata(bytes);

        let hits: Vec<usize> = meta.match_h2(0x11).into_iter().collect();
        assert_eq!(hits, [0, 7, 15]);
        assert_eq!(meta.match_h2(0x22), BitMask(1 << 3));
        assert_eq!(meta.match_h2(0x33), BitMask(0));

        let empties = meta.match_empty();
        assert_eq!(empties.lowest_set_bit(), Some(1));
        assert_eq!(empties.0.count_ones(), 11);
        assert_eq!(empties.0 & (1 << 9), 0, "tombstones are not empty");
        assert_eq!(meta.match_full(), BitMask(1 | 1 << 3 | 1 << 7 | 1 << 15));
    }

    #[test]
    fn simd_and_scalar_agree() {
        let mut bytes = [0u8; GROUP_WIDTH];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = match i % 4 {
                0 => EMPTY,
                1 => TOMBSTONE,
                _ => (i as u8 * 13) & 0x7F,
            };
        }
        let meta = metadata(bytes);
        for byte in (0..=0x7Fu8).chain([EMPTY, TOMBSTONE]) {
            assert_eq!(meta.match_byte(byte), meta.match_byte_scalar(byte));
        }
        assert_eq!(meta.match_full(), meta.match_full_scalar());
        assert_eq!(meta.match_full().0.count_ones(), 8);
    }

    #[test]
    fn match_full_ignores_both_sentinels() {
        let mut bytes = [EMPTY; GROUP_WIDTH];
        bytes[1] = 0x00;
        bytes[2] = TOMBSTONE;
        bytes[14] = 0x7F;
        let meta = metadata(bytes);
        assert_eq!(meta.match_full(), BitMask(1 << 1 | 1 << 14));
        assert_eq!(meta.match_full(), meta.match_full_scalar());
        assert_eq!(Metadata::empty().match_full(), BitMask(0));
        assert_eq!(metadata([0x42; GROUP_WIDTH]).match_full(), BitMask(0xFFFF));
    }

    #[test]
    fn full_group_has_no_empty_slot() {
        let mut bytes = [0x05; GROUP_WIDTH];
        bytes[4] = TOMBSTONE;
        let meta = metadata(bytes);
        assert!(!meta.match_empty().any_bit_set());
        assert_eq!(meta.match_empty().lowest_set_bit(), None);
    }

    #[test]
    fn hash_split_keeps_h2_in_occupied_range() {
        for hash in [0u64, 0x7F, 0x80, u64::MAX, 0xDEAD_BEEF_CAFE_F00D] {
            assert!(is_full(h2(hash)));
            assert_eq!(h1(hash) << 7 | h2(hash) as u64, hash);
        }
    }

    #[test]
    fn probe_start_stays_in_range() {
        for groups in [1usize, 2, 3, 7, 16, 1000] {
            assert_eq!(probe_start(0, groups), 0);
            assert_eq!(probe_start(h1(u64::MAX), groups), groups - 1);
            let mut hash = 0x9E37_79B9_7F4A_7C15u64;
            for _ in 0..256 {
                hash = hash.wrapping_mul(0x2545_F491_4F6C_DD1D).rotate_left(17);
                assert!(probe_start(h1(hash), groups) < groups);
            }
        }
    }

    #[test]
    fn probe_start_spreads_over_non_power_of_two_counts() {
        let groups = 3;
        let mut seen = [0usize; 3];
        for i in 0..3u64 {
            let h1 = (i << 57) / 3 + 1;
            seen[probe_start(h1, groups)] += 1;
        }
        assert_eq!(seen, [1, 1, 1]);
    }
}
