//! The B5500's 48-bit word and the fields of its polymorphic
//! interpretations.
//!
//! A word is held in a `u64` and always masked to 48 bits.  A word
//! must never be represented in floating point: multiply and divide
//! intermediates depend on the exact low-order bits.
//!
//! The same 48 bits are read three ways, selected by context and by
//! the flag bit:
//!
//! - a plain operand (flag bit clear): mantissa sign `[1:1]`,
//!   exponent sign `[2:1]`, exponent magnitude `[3:6]`, mantissa
//!   `[9:39]` (thirteen octades).  The value is
//!   `mantissa * 8^exponent` in signed magnitude.
//! - a control word or descriptor (flag bit set): presence bit
//!   `[2:1]`, mode bit `[4:1]`, argument bit `[5:1]`, size field
//!   `[8:10]`, address field `[33:15]`.
//! - a program word: four 12-bit syllables, most significant first.

use crate::field::{bit_test, field_insert, field_isolate};

/// One 48-bit machine word, in the low bits of a `u64`.
pub type Word = u64;

/// Number of value bits in a word.
pub const WORD_BITS: u8 = 48;

/// Mask of all 48 value bits.
pub const WORD_MASK: Word = 0o7777_7777_7777_7777;

/// Flag bit: clear for operands, set for control words.
pub const FLAG_BIT: u8 = 0;
/// Mantissa sign bit of an operand (1 = negative).
pub const MANT_SIGN_BIT: u8 = 1;
/// Exponent sign bit of an operand (1 = negative).
pub const EXP_SIGN_BIT: u8 = 2;
/// Presence bit of a descriptor.
pub const PRESENCE_BIT: u8 = 2;
/// Mode bit of a program descriptor (1 = character mode).
pub const MODE_BIT: u8 = 4;
/// Argument bit of a program descriptor (1 = parameters expected).
pub const ARGUMENT_BIT: u8 = 5;

/// Number of octades in a mantissa.
pub const MANTISSA_OCTADES: u8 = 13;
/// Mask of the 39 mantissa bits, in the low bits of the word.
pub const MANTISSA_MASK: Word = 0o7_7777_7777_7777;

/// True if the word is a control word (descriptor, MSCW, RCW, ...).
#[must_use]
pub fn is_control_word(w: Word) -> bool {
    bit_test(w, FLAG_BIT)
}

/// True if a descriptor's described area is present in memory.
#[must_use]
pub fn is_present(w: Word) -> bool {
    bit_test(w, PRESENCE_BIT)
}

/// The mantissa of an operand: field `[9:39]`.
#[must_use]
pub fn mantissa(w: Word) -> Word {
    w & MANTISSA_MASK
}

/// The mantissa sign of an operand: -1 or +1.
#[must_use]
pub fn mantissa_sign(w: Word) -> i8 {
    if bit_test(w, MANT_SIGN_BIT) { -1 } else { 1 }
}

/// The signed exponent of an operand, -63..=63 (a power of 8).
#[must_use]
pub fn exponent(w: Word) -> i8 {
    let magnitude = field_isolate(w, 3, 6) as i8;
    if bit_test(w, EXP_SIGN_BIT) {
        -magnitude
    } else {
        magnitude
    }
}

/// Assemble an operand word from sign, signed exponent and mantissa.
/// The exponent must already be in range; callers handle wraparound.
#[must_use]
pub fn make_operand(negative: bool, exp: i8, mantissa: Word) -> Word {
    let mut w = mantissa & MANTISSA_MASK;
    w = field_insert(w, 3, 6, exp.unsigned_abs() as Word);
    if exp < 0 {
        w = crate::field::bit_set(w, EXP_SIGN_BIT);
    }
    if negative {
        w = crate::field::bit_set(w, MANT_SIGN_BIT);
    }
    w
}

/// The six-bit character code for a blank.
pub const BLANK_CHAR: u8 = 0o60;

/// The 15-bit address field of a descriptor or control word: `[33:15]`.
#[must_use]
pub fn address_field(w: Word) -> u16 {
    field_isolate(w, 33, 15) as u16
}

/// Replace the address field of a descriptor or control word.
#[must_use]
pub fn set_address_field(w: Word, addr: u16) -> Word {
    field_insert(w, 33, 15, Word::from(addr))
}

/// The 10-bit size field of a data descriptor: `[8:10]`.
#[must_use]
pub fn size_field(w: Word) -> u16 {
    field_isolate(w, 8, 10) as u16
}

/// Format a word as sixteen octal digits, the way the console
/// displays and the diagnostic dump print it.
#[must_use]
pub fn octal(w: Word) -> String {
    format!("{:016o}", w & WORD_MASK)
}
