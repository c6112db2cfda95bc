//! Instruction syllables.
//!
//! A program word holds four 12-bit syllables, numbered 0..=3 from
//! the most significant end.  The same 12 bits decode two ways,
//! selected by the processor's character/word mode flag (CWMF).

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::field::field_isolate;
use crate::word::Word;

/// One 12-bit instruction syllable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Syllable(u16);

/// The decoded form of a syllable in word mode.  The low two bits
/// select the class; the remaining ten bits are a literal, a relative
/// address, or an operator split into a 6-bit family (low bits) and a
/// 6-bit variant (high bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSyllable {
    /// LITC: push the 10-bit literal.
    Litc(u16),
    /// OPDC: operand call on the 10-bit relative address.
    Opdc(u16),
    /// DESC: descriptor call on the 10-bit relative address.
    Desc(u16),
    /// Any other word-mode operator.
    Operator { family: u8, variant: u8 },
}

/// The decoded form of a syllable in character mode: a 6-bit opcode
/// with a 6-bit repeat count in the high bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharSyllable {
    pub opcode: u8,
    pub repeat: u8,
}

impl Syllable {
    pub const BITS: u16 = 12;
    const MASK: u16 = 0o7777;

    #[must_use]
    pub const fn new(bits: u16) -> Syllable {
        Syllable(bits & Self::MASK)
    }

    /// Extract syllable `index` (0..=3) of a program word.
    #[must_use]
    pub fn of_word(w: Word, index: u8) -> Syllable {
        assert!(index < 4);
        Syllable(field_isolate(w, index * 12, 12) as u16)
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Decode for word mode.
    #[must_use]
    pub fn word_mode(self) -> WordSyllable {
        let high10 = self.0 >> 2;
        match self.0 & 3 {
            0 => WordSyllable::Litc(high10),
            2 => WordSyllable::Opdc(high10),
            3 => WordSyllable::Desc(high10),
            _ => WordSyllable::Operator {
                family: (self.0 & 0o77) as u8,
                variant: (self.0 >> 6) as u8,
            },
        }
    }

    /// Decode for character mode.
    #[must_use]
    pub const fn char_mode(self) -> CharSyllable {
        CharSyllable {
            opcode: (self.0 & 0o77) as u8,
            repeat: (self.0 >> 6) as u8,
        }
    }

    /// The same syllable with its repeat field replaced.  Used by the
    /// character-mode CRF operator, which rewrites the repeat field
    /// of the following syllable from a stack operand.
    #[must_use]
    pub const fn with_repeat(self, repeat: u8) -> Syllable {
        Syllable((self.0 & 0o77) | (((repeat & 0o77) as u16) << 6))
    }

    /// Build an operator syllable from a family and a variant.
    #[must_use]
    pub const fn operator(family: u8, variant: u8) -> Syllable {
        Syllable((((variant & 0o77) as u16) << 6) | ((family & 0o77) as u16))
    }
}

impl Display for Syllable {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:04o}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_syllables_per_word() {
        // Word built from syllables 0o0001, 0o0002, 0o0003, 0o0004.
        let w: Word = 0o0001_0002_0003_0004;
        for (i, expected) in [1u16, 2, 3, 4].iter().enumerate() {
            assert_eq!(Syllable::of_word(w, i as u8).bits(), *expected);
        }
    }

    #[test]
    fn word_mode_selector_bits() {
        assert_eq!(
            Syllable::new(0o0050 << 2).word_mode(),
            WordSyllable::Litc(0o0050)
        );
        assert_eq!(
            Syllable::new((0o0050 << 2) | 2).word_mode(),
            WordSyllable::Opdc(0o0050)
        );
        assert_eq!(
            Syllable::new((0o0050 << 2) | 3).word_mode(),
            WordSyllable::Desc(0o0050)
        );
        assert_eq!(
            Syllable::operator(0o25, 0o02).word_mode(),
            WordSyllable::Operator {
                family: 0o25,
                variant: 0o02
            }
        );
    }

    #[test]
    fn repeat_field_rewrite() {
        let s = Syllable::new(0o1234);
        let r = s.with_repeat(0o77);
        assert_eq!(r.char_mode().repeat, 0o77);
        assert_eq!(r.char_mode().opcode, s.char_mode().opcode);
    }
}
