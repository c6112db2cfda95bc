//! Bit-field primitives for 48-bit words.
//!
//! Bits are numbered the way the B5500 documentation numbers them:
//! bit 0 is the most significant bit of the word and bit 47 the least
//! significant.  A field is described by the number of its first
//! (most significant) bit and its width, so the exponent field of an
//! operand word is `[3:6]` and the address field of a descriptor is
//! `[33:15]`.
//!
//! All of these functions are pure.  Out-of-range source values are
//! masked to the declared width rather than reported; the hardware
//! had no way to signal such an error either.

use crate::word::{Word, WORD_BITS, WORD_MASK};

/// A single bit mask for bit `bit` (0 = most significant).
const fn bit_mask(bit: u8) -> Word {
    debug_assert!(bit < WORD_BITS);
    1 << (WORD_BITS - 1 - bit)
}

/// Whether the numbered bit is set.
#[must_use]
pub const fn bit_test(word: Word, bit: u8) -> bool {
    word & bit_mask(bit) != 0
}

/// Return `word` with the numbered bit forced to 1.
#[must_use]
pub const fn bit_set(word: Word, bit: u8) -> Word {
    word | bit_mask(bit)
}

/// Return `word` with the numbered bit forced to 0.
#[must_use]
pub const fn bit_reset(word: Word, bit: u8) -> Word {
    word & !bit_mask(bit)
}

/// Amount `word` must be shifted right so that the field starting at
/// `start` with width `width` lands in the low-order bits.
const fn field_shift(start: u8, width: u8) -> u32 {
    debug_assert!(width > 0);
    debug_assert!(start + width <= WORD_BITS);
    (WORD_BITS - start - width) as u32
}

/// A mask of `width` low-order ones.
const fn low_mask(width: u8) -> Word {
    if width >= WORD_BITS {
        WORD_MASK
    } else {
        (1 << width) - 1
    }
}

/// Extract the `width`-bit unsigned value whose most significant bit
/// is bit `start` of `word`.
#[must_use]
pub const fn field_isolate(word: Word, start: u8, width: u8) -> Word {
    (word >> field_shift(start, width)) & low_mask(width)
}

/// Return `word` with the low `width` bits of `value` written into
/// the field at `start`; all other bits of `word` are unchanged.
#[must_use]
pub const fn field_insert(word: Word, start: u8, width: u8, value: Word) -> Word {
    let shift = field_shift(start, width);
    let mask = low_mask(width) << shift;
    (word & !mask) | ((value << shift) & mask)
}

/// Like [`field_insert`], but the source field is taken from `value`
/// at bit position `vstart` rather than from its low-order bits.
#[must_use]
pub const fn field_transfer(word: Word, wstart: u8, width: u8, value: Word, vstart: u8) -> Word {
    field_insert(word, wstart, width, field_isolate(value, vstart, width))
}
