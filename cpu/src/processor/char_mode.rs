//! Character-mode syllable execution.
//!
//! In character mode the stack cache is repurposed: A buffers the
//! source word at [M] (G and H are the character and bit offsets into
//! it) and B buffers the destination word at [S] (offsets K and V).
//! Bit 0 of Q marks a destination buffer that has been written but
//! not yet stored back.  The repeat field of each syllable gives an
//! iteration count, or the literal character for the comparison
//! operators; a repeat of zero does nothing.

use tracing::{event, Level};

use base::word::{make_operand, BLANK_CHAR};
use base::{bit_reset, bit_set, field_insert, field_isolate, Word};

use crate::central::{CentralControl, IRQ_FLAG_BIT};

use super::linkage::{build_pointer_word, pointer_fields};
use super::Processor;

pub(crate) const OP_EXC: u8 = 0o00;
pub(crate) const OP_CRF: u8 = 0o01;
pub(crate) const OP_BSS: u8 = 0o02;
pub(crate) const OP_BSD: u8 = 0o03;
pub(crate) const OP_SFS: u8 = 0o04;
pub(crate) const OP_SFD: u8 = 0o05;
pub(crate) const OP_RSA: u8 = 0o06;
pub(crate) const OP_RDA: u8 = 0o07;
pub(crate) const OP_SSA: u8 = 0o10;
pub(crate) const OP_SDA: u8 = 0o11;
pub(crate) const OP_TRW: u8 = 0o12;
pub(crate) const OP_TRC: u8 = 0o14;
pub(crate) const OP_TRZ: u8 = 0o16;
pub(crate) const OP_TRN: u8 = 0o17;
pub(crate) const OP_TRP: u8 = 0o20;
pub(crate) const OP_TRS: u8 = 0o21;
pub(crate) const OP_TBN: u8 = 0o22;
pub(crate) const OP_BTD: u8 = 0o24;
pub(crate) const OP_DTB: u8 = 0o25;
pub(crate) const OP_FAD: u8 = 0o26;
pub(crate) const OP_FSU: u8 = 0o27;
pub(crate) const OP_BIS: u8 = 0o30;
pub(crate) const OP_BIR: u8 = 0o31;
pub(crate) const OP_TEQ: u8 = 0o32;
pub(crate) const OP_TNE: u8 = 0o33;
pub(crate) const OP_TGR: u8 = 0o34;
pub(crate) const OP_TGE: u8 = 0o35;
pub(crate) const OP_TLS: u8 = 0o36;
pub(crate) const OP_TLE: u8 = 0o37;

impl Processor {
    pub(super) fn execute_char(&mut self, cc: &mut CentralControl, syllable: base::Syllable) {
        let decoded = syllable.char_mode();
        let count = self.crf_repeat.take().unwrap_or(decoded.repeat);
        match decoded.opcode {
            OP_EXC => self.exit_character_mode(cc),
            OP_CRF => self.call_repeat_field(cc, count),
            OP_BSS => {
                for _ in 0..count {
                    self.advance_src_bit();
                }
            }
            OP_BSD => {
                for _ in 0..count {
                    self.advance_dst_bit(cc);
                }
            }
            OP_SFS => {
                for _ in 0..count {
                    self.advance_src_char();
                }
            }
            OP_SFD => {
                for _ in 0..count {
                    self.advance_dst_char(cc);
                }
            }
            OP_RSA => self.recall_source_address(cc, count),
            OP_RDA => self.recall_destination_address(cc, count),
            OP_SSA => {
                let w = build_pointer_word(self.m, self.g, self.h);
                let addr = self.relative_addr(cc, count as u16, false);
                self.store_word(cc, addr, w);
            }
            OP_SDA => {
                self.flush_destination(cc);
                let w = build_pointer_word(self.s, self.k, self.v);
                let addr = self.relative_addr(cc, count as u16, false);
                self.store_word(cc, addr, w);
            }
            OP_TRW => self.transfer_words(cc, count),
            OP_TRC => {
                for _ in 0..count {
                    let ch = self.read_src_char(cc);
                    self.write_dst_char(cc, ch);
                }
            }
            OP_TRZ => self.transfer_partial(cc, count, 0o60),
            OP_TRN => self.transfer_partial(cc, count, 0o17),
            OP_TRP => self.transfer_program_chars(cc, count),
            OP_TRS => {
                for _ in 0..count {
                    let ch = self.read_src_char(cc);
                    self.y = ch;
                    if ch & 0o17 != 0 {
                        self.z = ch;
                    }
                    self.write_dst_char(cc, ch);
                }
            }
            OP_TBN => self.transfer_blanks_for_zeros(cc, count),
            OP_BTD => self.binary_to_decimal(cc, count),
            OP_DTB => self.decimal_to_binary(cc, count),
            OP_FAD => self.field_add(cc, count, false),
            OP_FSU => self.field_add(cc, count, true),
            OP_BIS => {
                for _ in 0..count {
                    self.write_dst_bit(cc, true);
                }
            }
            OP_BIR => {
                for _ in 0..count {
                    self.write_dst_bit(cc, false);
                }
            }
            OP_TEQ | OP_TNE | OP_TGR | OP_TGE | OP_TLS | OP_TLE => {
                self.compare_char(cc, decoded.opcode, count);
            }
            other => {
                event!(Level::TRACE, "undefined character-mode operator {:02o}", other);
            }
        }
    }

    // ------------------------------------------------------------------
    // Source and destination buffers

    fn src_word(&mut self, cc: &mut CentralControl) -> Word {
        if !self.arof {
            self.a = self.fetch_word(cc, self.m).unwrap_or(0);
            self.arof = true;
        }
        self.a
    }

    fn advance_src_char(&mut self) {
        self.h = 0;
        if self.g == 7 {
            self.g = 0;
            self.m = (self.m + 1) & 0o77777;
            self.arof = false;
        } else {
            self.g += 1;
        }
    }

    fn advance_src_bit(&mut self) {
        if self.h == 5 {
            self.advance_src_char();
        } else {
            self.h += 1;
        }
    }

    fn read_src_char(&mut self, cc: &mut CentralControl) -> u8 {
        let w = self.src_word(cc);
        let ch = Self::char_of(w, self.g);
        self.advance_src_char();
        ch
    }

    fn dst_word(&mut self, cc: &mut CentralControl) {
        if !self.brof {
            self.b = self.fetch_word(cc, self.s).unwrap_or(0);
            self.brof = true;
            self.q &= !1;
        }
    }

    /// Stores the destination buffer back if it holds unstored
    /// changes.  Must run before anything repositions S.
    pub(crate) fn flush_destination(&mut self, cc: &mut CentralControl) {
        if self.q & 1 != 0 {
            let word = self.b;
            self.store_word(cc, self.s, word);
            self.q &= !1;
        }
    }

    fn advance_dst_char(&mut self, cc: &mut CentralControl) {
        self.v = 0;
        if self.k == 7 {
            self.flush_destination(cc);
            self.k = 0;
            self.s = (self.s + 1) & 0o77777;
            self.brof = false;
        } else {
            self.k += 1;
        }
    }

    fn advance_dst_bit(&mut self, cc: &mut CentralControl) {
        if self.v == 5 {
            self.v = 0;
            self.advance_dst_char(cc);
        } else {
            self.v += 1;
        }
    }

    fn write_dst_char(&mut self, cc: &mut CentralControl, ch: u8) {
        self.dst_word(cc);
        self.b = field_insert(self.b, self.k * 6, 6, ch as u64);
        self.q |= 1;
        self.advance_dst_char(cc);
    }

    fn write_dst_bit(&mut self, cc: &mut CentralControl, set: bool) {
        self.dst_word(cc);
        let bit = self.k * 6 + self.v;
        self.b = if set {
            bit_set(self.b, bit)
        } else {
            bit_reset(self.b, bit)
        };
        self.q |= 1;
        self.advance_dst_bit(cc);
    }

    // ------------------------------------------------------------------
    // Operators

    /// Returns to word mode through the return control word the
    /// entering operator left at F.
    fn exit_character_mode(&mut self, cc: &mut CentralControl) {
        self.flush_destination(cc);
        let Some(rcw) = self.fetch_word(cc, self.f) else {
            return;
        };
        if !base::word::is_control_word(rcw) {
            self.interrupt(cc, IRQ_FLAG_BIT);
            return;
        }
        self.s = self.f.wrapping_sub(1) & 0o77777;
        self.apply_rcw(rcw);
        self.cwmf = false;
        self.arof = false;
        self.brof = false;
        self.msff = false;
        self.q &= !1;
    }

    /// Fetches a word and latches its low six bits as the repeat
    /// field of the next syllable.
    fn call_repeat_field(&mut self, cc: &mut CentralControl, offset: u8) {
        let addr = self.relative_addr(cc, offset as u16, false);
        if let Some(w) = self.fetch_word(cc, addr) {
            self.crf_repeat = Some((w & 0o77) as u8);
        }
    }

    fn recall_source_address(&mut self, cc: &mut CentralControl, offset: u8) {
        let addr = self.relative_addr(cc, offset as u16, false);
        let Some(w) = self.fetch_word(cc, addr) else {
            return;
        };
        self.arof = false;
        if base::word::is_control_word(w) {
            let (m, g, h) = pointer_fields(w);
            self.m = m;
            self.g = g;
            self.h = h;
        } else {
            self.m = base::word::address_field(w);
            self.g = 0;
            self.h = 0;
        }
    }

    fn recall_destination_address(&mut self, cc: &mut CentralControl, offset: u8) {
        let addr = self.relative_addr(cc, offset as u16, false);
        let Some(w) = self.fetch_word(cc, addr) else {
            return;
        };
        self.flush_destination(cc);
        self.brof = false;
        if base::word::is_control_word(w) {
            let (s, k, v) = pointer_fields(w);
            self.s = s;
            self.k = k;
            self.v = v;
        } else {
            self.s = base::word::address_field(w);
            self.k = 0;
            self.v = 0;
        }
    }

    /// Whole-word transfer; both pointers are treated as word-aligned
    /// and left that way.
    fn transfer_words(&mut self, cc: &mut CentralControl, count: u8) {
        self.flush_destination(cc);
        self.arof = false;
        self.brof = false;
        self.g = 0;
        self.h = 0;
        self.k = 0;
        self.v = 0;
        for _ in 0..count {
            if let Some(w) = self.fetch_word(cc, self.m) {
                self.store_word(cc, self.s, w);
            }
            self.m = (self.m + 1) & 0o77777;
            self.s = (self.s + 1) & 0o77777;
        }
    }

    /// Zone or numeric transfer: moves only the masked part of each
    /// source character, keeping the rest of the destination
    /// character.
    fn transfer_partial(&mut self, cc: &mut CentralControl, count: u8, mask: u8) {
        for _ in 0..count {
            let src = self.read_src_char(cc);
            self.dst_word(cc);
            let existing = Self::char_of(self.b, self.k);
            let merged = (src & mask) | (existing & !mask);
            self.b = field_insert(self.b, self.k * 6, 6, merged as u64);
            self.q |= 1;
            self.advance_dst_char(cc);
        }
    }

    /// Transfers characters taken from the program string itself: the
    /// syllables following this operator hold two characters each.
    fn transfer_program_chars(&mut self, cc: &mut CentralControl, count: u8) {
        let mut moved = 0;
        while moved < count {
            self.advance();
            if !self.prof {
                self.load_p(cc);
                if !self.prof {
                    return;
                }
            }
            let pair = field_isolate(self.p, self.l * 12, 12) as u16;
            self.write_dst_char(cc, (pair >> 6) as u8);
            moved += 1;
            if moved < count {
                self.write_dst_char(cc, (pair & 0o77) as u8);
                moved += 1;
            }
        }
    }

    /// Leading-zero suppression: writes a blank for every zero source
    /// character; the first non-zero character stops the transfer and
    /// sets the true/false flip-flop (the character itself is not
    /// consumed).
    fn transfer_blanks_for_zeros(&mut self, cc: &mut CentralControl, count: u8) {
        self.set_tfff(false);
        for _ in 0..count {
            let w = self.src_word(cc);
            if Self::char_of(w, self.g) != 0 {
                self.set_tfff(true);
                return;
            }
            self.advance_src_char();
            self.write_dst_char(cc, BLANK_CHAR);
        }
    }

    /// Converts the integer operand at [M] to `count` decimal digit
    /// characters, most significant first.
    fn binary_to_decimal(&mut self, cc: &mut CentralControl, count: u8) {
        let word = self.src_word(cc);
        let value = super::arith::integerize(word).unwrap_or(0).unsigned_abs();
        self.m = (self.m + 1) & 0o77777;
        self.g = 0;
        self.h = 0;
        self.arof = false;
        let mut digits = [0u8; 64];
        let mut v = value;
        for slot in digits.iter_mut().take(count as usize) {
            *slot = (v % 10) as u8;
            v /= 10;
        }
        for i in (0..count as usize).rev() {
            self.write_dst_char(cc, digits[i]);
        }
    }

    /// Reads `count` digit characters from the source and stores
    /// their value as an integer operand at [S].  A non-digit zone
    /// sets the true/false flip-flop.
    fn decimal_to_binary(&mut self, cc: &mut CentralControl, count: u8) {
        self.set_tfff(false);
        let mut value: u64 = 0;
        for _ in 0..count {
            let ch = self.read_src_char(cc);
            if ch & 0o60 != 0 {
                self.set_tfff(true);
            }
            value = value * 10 + (ch & 0o17) as u64;
        }
        self.flush_destination(cc);
        self.brof = false;
        let word = make_operand(false, 0, value);
        self.store_word(cc, self.s, word);
        self.s = (self.s + 1) & 0o77777;
        self.k = 0;
        self.v = 0;
    }

    /// Decimal field add/subtract: the `count`-digit source field is
    /// added to (subtracted from) the `count`-digit destination field
    /// in place; a carry (borrow) out of the top digit sets the
    /// true/false flip-flop.
    fn field_add(&mut self, cc: &mut CentralControl, count: u8, subtract: bool) {
        let mut src: u64 = 0;
        for _ in 0..count {
            let ch = self.read_src_char(cc);
            src = src * 10 + (ch & 0o17) as u64;
        }
        let dest_start = (self.s, self.k);
        let mut dst: u64 = 0;
        for _ in 0..count {
            self.dst_word(cc);
            let ch = Self::char_of(self.b, self.k);
            dst = dst * 10 + (ch & 0o17) as u64;
            self.advance_dst_char(cc);
        }
        let modulus = 10u64.pow(count as u32);
        let (result, out) = if subtract {
            if src > dst {
                (modulus + dst - src, true)
            } else {
                (dst - src, false)
            }
        } else {
            let sum = dst + src;
            (sum % modulus, sum >= modulus)
        };
        self.set_tfff(out);
        // rewind and write the result digits back
        self.flush_destination(cc);
        self.s = dest_start.0;
        self.k = dest_start.1;
        self.v = 0;
        self.brof = false;
        let mut digits = [0u8; 64];
        let mut v = result;
        for slot in digits.iter_mut().take(count as usize) {
            *slot = (v % 10) as u8;
            v /= 10;
        }
        for i in (0..count as usize).rev() {
            self.write_dst_char(cc, digits[i]);
        }
    }

    /// Compares the character at the source pointer with the repeat
    /// field as a literal; the source pointer does not move.
    fn compare_char(&mut self, cc: &mut CentralControl, opcode: u8, literal: u8) {
        let w = self.src_word(cc);
        let ch = Self::char_of(w, self.g);
        let result = match opcode {
            OP_TEQ => ch == literal,
            OP_TNE => ch != literal,
            OP_TGR => ch > literal,
            OP_TGE => ch >= literal,
            OP_TLS => ch < literal,
            _ => ch <= literal,
        };
        self.set_tfff(result);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use base::Syllable;

    fn cop(opcode: u8, repeat: u8) -> Syllable {
        Syllable::new(((repeat as u16) << 6) | opcode as u16)
    }

    /// A processor set up in character mode with separate source and
    /// destination areas.
    fn char_machine() -> (crate::central::CentralControl, super::super::Processor) {
        let (cc, mut p) = machine();
        p.cwmf = true;
        p.m = 0o4000;
        p.s = 0o5000;
        (cc, p)
    }

    fn pack_chars(chars: &[u8]) -> base::Word {
        let mut w = 0;
        for (i, &ch) in chars.iter().enumerate() {
            w = field_insert(w, i as u8 * 6, 6, ch as u64);
        }
        w
    }

    #[test]
    fn transfer_chars_across_word_boundaries() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[1, 2, 3, 4, 5, 6, 7, 8]));
        p.store_word(&mut cc, 0o4001, pack_chars(&[9, 10, 0, 0, 0, 0, 0, 0]));
        p.execute_char(&mut cc, cop(OP_TRC, 10));
        p.flush_destination(&mut cc);
        assert_eq!(
            cc.read_raw(0o5000),
            Some(pack_chars(&[1, 2, 3, 4, 5, 6, 7, 8]))
        );
        assert_eq!(cc.read_raw(0o5001), Some(pack_chars(&[9, 10, 0, 0, 0, 0, 0, 0])));
        assert_eq!((p.m, p.g), (0o4001, 2));
        assert_eq!((p.s, p.k), (0o5001, 2));
    }

    #[test]
    fn repeat_zero_moves_nothing() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[7; 8]));
        p.execute_char(&mut cc, cop(OP_TRC, 0));
        p.flush_destination(&mut cc);
        assert_eq!(cc.read_raw(0o5000), Some(0));
        assert_eq!((p.m, p.g), (0o4000, 0));
    }

    #[test]
    fn zone_transfer_keeps_destination_numerics() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[0o63, 0o21, 0, 0, 0, 0, 0, 0]));
        p.store_word(&mut cc, 0o5000, pack_chars(&[0o15, 0o47, 0, 0, 0, 0, 0, 0]));
        p.execute_char(&mut cc, cop(OP_TRZ, 2));
        p.flush_destination(&mut cc);
        let out = cc.read_raw(0o5000).unwrap();
        assert_eq!(field_isolate(out, 0, 6), 0o75); // zone of 0o63, digit of 0o15
        assert_eq!(field_isolate(out, 6, 6), 0o27);
    }

    #[test]
    fn skip_and_bit_operators_move_pointers() {
        let (mut cc, mut p) = char_machine();
        p.execute_char(&mut cc, cop(OP_SFS, 9)); // one word + one char
        assert_eq!((p.m, p.g), (0o4001, 1));
        p.execute_char(&mut cc, cop(OP_BSS, 7)); // one char + one bit
        assert_eq!((p.m, p.g, p.h), (0o4001, 2, 1));
        p.execute_char(&mut cc, cop(OP_SFD, 8));
        assert_eq!((p.s, p.k), (0o5001, 0));
    }

    #[test]
    fn bit_set_writes_into_destination_word() {
        let (mut cc, mut p) = char_machine();
        p.execute_char(&mut cc, cop(OP_BIS, 3)); // set bits 0,1,2
        p.flush_destination(&mut cc);
        let w = cc.read_raw(0o5000).unwrap();
        assert_eq!(field_isolate(w, 0, 3), 0b111);
        assert_eq!((p.k, p.v), (0, 3));
    }

    #[test]
    fn store_and_recall_pointer_words() {
        let (mut cc, mut p) = char_machine();
        p.r = 0o100;
        p.salf = false;
        p.m = 0o4010;
        p.g = 5;
        p.h = 2;
        p.execute_char(&mut cc, cop(OP_SSA, 3));
        p.m = 0;
        p.g = 0;
        p.h = 0;
        p.execute_char(&mut cc, cop(OP_RSA, 3));
        assert_eq!((p.m, p.g, p.h), (0o4010, 5, 2));
    }

    #[test]
    fn recall_destination_flushes_pending_buffer() {
        let (mut cc, mut p) = char_machine();
        p.r = 0o100;
        p.salf = false;
        p.store_word(&mut cc, (0o100 << 6) + 4, 0o6000); // operand address
        p.execute_char(&mut cc, cop(OP_BIS, 1)); // dirty the buffer at 0o5000
        p.execute_char(&mut cc, cop(OP_RDA, 4));
        // the dirty word went back before S moved
        assert_ne!(cc.read_raw(0o5000), Some(0));
        assert_eq!((p.s, p.k, p.v), (0o6000, 0, 0));
    }

    #[test]
    fn word_transfer_moves_whole_words() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, 0o111);
        p.store_word(&mut cc, 0o4001, 0o222);
        p.execute_char(&mut cc, cop(OP_TRW, 2));
        assert_eq!(cc.read_raw(0o5000), Some(0o111));
        assert_eq!(cc.read_raw(0o5001), Some(0o222));
        assert_eq!((p.m, p.s), (0o4002, 0o5002));
    }

    #[test]
    fn blank_transfer_stops_at_first_nonzero() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[0, 0, 5, 1, 0, 0, 0, 0]));
        p.execute_char(&mut cc, cop(OP_TBN, 6));
        p.flush_destination(&mut cc);
        assert!(p.tfff());
        let out = cc.read_raw(0o5000).unwrap();
        assert_eq!(field_isolate(out, 0, 6), BLANK_CHAR as u64);
        assert_eq!(field_isolate(out, 6, 6), BLANK_CHAR as u64);
        assert_eq!(field_isolate(out, 12, 6), 0); // stopped before the 5
        assert_eq!((p.m, p.g), (0o4000, 2)); // the 5 is not consumed
    }

    #[test]
    fn decimal_to_binary_builds_integer_operand() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[4, 0, 9, 5, 0, 0, 0, 0]));
        p.execute_char(&mut cc, cop(OP_DTB, 4));
        assert!(!p.tfff());
        let w = cc.read_raw(0o5000).unwrap();
        assert_eq!(base::word::mantissa(w), 4095);
        assert_eq!(p.s, 0o5001);
    }

    #[test]
    fn binary_to_decimal_writes_digit_chars() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, make_operand(false, 0, 4095));
        p.execute_char(&mut cc, cop(OP_BTD, 5));
        p.flush_destination(&mut cc);
        assert_eq!(
            cc.read_raw(0o5000),
            Some(pack_chars(&[0, 4, 0, 9, 5, 0, 0, 0]))
        );
        assert_eq!(p.m, 0o4001);
    }

    #[test]
    fn field_add_with_carry_sets_flip_flop() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[0, 0, 7, 0, 0, 0, 0, 0])); // 007
        p.store_word(&mut cc, 0o5000, pack_chars(&[9, 9, 5, 0, 0, 0, 0, 0])); // 995
        p.execute_char(&mut cc, cop(OP_FAD, 3));
        p.flush_destination(&mut cc);
        assert!(p.tfff()); // 995 + 7 carried out
        let out = cc.read_raw(0o5000).unwrap();
        assert_eq!(field_isolate(out, 0, 18), pack_chars(&[0, 0, 2, 0, 0, 0, 0, 0]) >> 30);
    }

    #[test]
    fn field_subtract_without_borrow() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[0, 0, 7, 0, 0, 0, 0, 0]));
        p.store_word(&mut cc, 0o5000, pack_chars(&[1, 0, 9, 0, 0, 0, 0, 0]));
        p.execute_char(&mut cc, cop(OP_FSU, 3));
        p.flush_destination(&mut cc);
        assert!(!p.tfff());
        let out = cc.read_raw(0o5000).unwrap();
        assert_eq!(field_isolate(out, 0, 18), pack_chars(&[1, 0, 2, 0, 0, 0, 0, 0]) >> 30);
    }

    #[test]
    fn comparisons_test_without_consuming() {
        let (mut cc, mut p) = char_machine();
        p.store_word(&mut cc, 0o4000, pack_chars(&[0o25, 0, 0, 0, 0, 0, 0, 0]));
        p.execute_char(&mut cc, cop(OP_TEQ, 0o25));
        assert!(p.tfff());
        p.execute_char(&mut cc, cop(OP_TGR, 0o30));
        assert!(!p.tfff());
        p.execute_char(&mut cc, cop(OP_TLS, 0o30));
        assert!(p.tfff());
        assert_eq!((p.m, p.g), (0o4000, 0));
    }

    #[test]
    fn call_repeat_field_overrides_next_syllable() {
        let (mut cc, mut p) = char_machine();
        p.r = 0o100;
        p.salf = false;
        p.store_word(&mut cc, (0o100 << 6) + 2, 0o3); // repeat value 3
        p.store_word(&mut cc, 0o4000, pack_chars(&[6, 6, 6, 6, 6, 6, 6, 6]));
        p.execute_char(&mut cc, cop(OP_CRF, 2));
        // syllable says 7 but the latched field says 3
        p.execute_char(&mut cc, cop(OP_TRC, 7));
        p.flush_destination(&mut cc);
        assert_eq!(cc.read_raw(0o5000), Some(pack_chars(&[6, 6, 6, 0, 0, 0, 0, 0])));
    }

    #[test]
    fn transfer_program_chars_reads_code_stream() {
        let (mut cc, mut p) = char_machine();
        // word at 0o2000: TRP 4, then two syllables carrying the chars
        let trp = cop(OP_TRP, 4);
        let s1 = Syllable::new((0o21 << 6) | 0o22);
        let s2 = Syllable::new((0o23 << 6) | 0o24);
        load_program(&mut cc, &mut p, 0o2000, &[trp, s1, s2, cop(OP_EXC, 0)]);
        p.execute_char(&mut cc, cop(OP_TRP, 4));
        p.flush_destination(&mut cc);
        assert_eq!(
            cc.read_raw(0o5000),
            Some(pack_chars(&[0o21, 0o22, 0o23, 0o24, 0, 0, 0, 0]))
        );
        // C/L rest on the last character syllable
        assert_eq!((p.c, p.l), (0o2000, 2));
    }

    #[test]
    fn enter_and_exit_round_trip_through_word_mode() {
        use super::super::word_mode::{FAMILY_CONTROL, FAMILY_MARK, CONTROL_ZPI, MARK_CMN};
        let (mut cc, mut p) = machine();
        // char routine at 0o1000: one EXC syllable.  The address must
        // fit the 10-bit literal field.
        load_program(&mut cc, &mut p, 0o1000, &[cop(OP_EXC, 0)]);
        // caller pushes the routine address and enters
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[
                Syllable::new(0o1000 << 2), // LITC of the address
                Syllable::operator(FAMILY_MARK, MARK_CMN),
                Syllable::operator(FAMILY_CONTROL, CONTROL_ZPI),
            ],
        );
        let f_before = p.f;
        p.run(&mut cc, 200);
        assert!(!p.busy);
        assert!(!p.cwmf);
        assert_eq!(p.f, f_before);
        assert_eq!(p.s, f_before); // the RCW was consumed
    }
}
