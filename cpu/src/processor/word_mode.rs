//! Word-mode syllable execution.
//!
//! A 12-bit syllable selects a literal, an operand call, a descriptor
//! call, or an operator; operators carry a family in the low six bits
//! and a variant in the high six.  Every operator here follows the
//! stack convention of the arithmetic unit: A is the top of stack, B
//! the word below it, and two-operand results land in B.

use tracing::{event, Level};

use base::word::{
    is_control_word, is_present, make_operand, MANT_SIGN_BIT,
};
use base::{bit_reset, bit_set, bit_test, field_isolate, field_transfer, Word, WordSyllable};

use crate::central::{
    make_data_descriptor, CentralControl, ProcessorRole, IRQ_COMMUNICATE, IRQ_FLAG_BIT,
    IRQ_INTEGER_OVERFLOW, IRQ_PRESENCE, IRQ_PROGRAM_RELEASE, COMMUNICATE_CELL,
};

use super::arith::{compare, integerize, store_target};
use super::{is_program_descriptor, Processor};

pub(crate) const FAMILY_ARITH: u8 = 0o01;
pub(crate) const FAMILY_DOUBLE: u8 = 0o05;
pub(crate) const FAMILY_CONTROL: u8 = 0o11;
pub(crate) const FAMILY_LOGICAL: u8 = 0o15;
pub(crate) const FAMILY_STORE: u8 = 0o21;
pub(crate) const FAMILY_COMPARE: u8 = 0o25;
pub(crate) const FAMILY_BRANCH: u8 = 0o31;
pub(crate) const FAMILY_RETURN: u8 = 0o35;
pub(crate) const FAMILY_MARK: u8 = 0o41;
pub(crate) const FAMILY_ISOLATE: u8 = 0o45;
pub(crate) const FAMILY_BIT_BRANCH: u8 = 0o51;
pub(crate) const FAMILY_FIELD_TRANSFER: u8 = 0o55;
pub(crate) const FAMILY_FIELD_COMPARE_LOW: u8 = 0o61;
pub(crate) const FAMILY_FIELD_COMPARE_EQUAL: u8 = 0o65;

pub(crate) const ARITH_ADD: u8 = 0o01;
pub(crate) const ARITH_SUB: u8 = 0o03;
pub(crate) const ARITH_MUL: u8 = 0o04;
pub(crate) const ARITH_DIV: u8 = 0o10;
pub(crate) const ARITH_IDV: u8 = 0o30;
pub(crate) const ARITH_RDV: u8 = 0o70;

pub(crate) const DOUBLE_ADD: u8 = 0o01;
pub(crate) const DOUBLE_SUB: u8 = 0o03;
pub(crate) const DOUBLE_MUL: u8 = 0o04;
pub(crate) const DOUBLE_DIV: u8 = 0o10;

pub(crate) const CONTROL_PRL: u8 = 0o01;
pub(crate) const CONTROL_ITI: u8 = 0o02;
pub(crate) const CONTROL_RTR: u8 = 0o04;
pub(crate) const CONTROL_COM: u8 = 0o10;
pub(crate) const CONTROL_IOR: u8 = 0o21;
pub(crate) const CONTROL_HP2: u8 = 0o22;
pub(crate) const CONTROL_ZPI: u8 = 0o24;
pub(crate) const CONTROL_SFI: u8 = 0o30;
pub(crate) const CONTROL_SFT: u8 = 0o34;
pub(crate) const CONTROL_IP1: u8 = 0o41;
pub(crate) const CONTROL_IP2: u8 = 0o42;
pub(crate) const CONTROL_IIO: u8 = 0o44;
pub(crate) const CONTROL_IFT: u8 = 0o51;

pub(crate) const LOGICAL_LNG: u8 = 0o01;
pub(crate) const LOGICAL_LOR: u8 = 0o02;
pub(crate) const LOGICAL_LND: u8 = 0o04;
pub(crate) const LOGICAL_LQV: u8 = 0o10;
pub(crate) const LOGICAL_MOP: u8 = 0o20;
pub(crate) const LOGICAL_MDS: u8 = 0o40;

pub(crate) const STORE_CID: u8 = 0o01;
pub(crate) const STORE_CIN: u8 = 0o02;
pub(crate) const STORE_STD: u8 = 0o04;
pub(crate) const STORE_SND: u8 = 0o10;
pub(crate) const STORE_LOD: u8 = 0o20;
pub(crate) const STORE_ISD: u8 = 0o41;
pub(crate) const STORE_ISN: u8 = 0o42;

pub(crate) const COMPARE_GEQ: u8 = 0o01;
pub(crate) const COMPARE_GTR: u8 = 0o02;
pub(crate) const COMPARE_NEQ: u8 = 0o04;
pub(crate) const COMPARE_XCH: u8 = 0o10;
pub(crate) const COMPARE_FTC: u8 = 0o14;
pub(crate) const COMPARE_DUP: u8 = 0o20;
pub(crate) const COMPARE_FTF: u8 = 0o34;
pub(crate) const COMPARE_LEQ: u8 = 0o41;
pub(crate) const COMPARE_LSS: u8 = 0o42;
pub(crate) const COMPARE_EQL: u8 = 0o44;
pub(crate) const COMPARE_CTC: u8 = 0o54;
pub(crate) const COMPARE_CTF: u8 = 0o74;

pub(crate) const BRANCH_BBC: u8 = 0o01;
pub(crate) const BRANCH_BFC: u8 = 0o02;
pub(crate) const BRANCH_SSN: u8 = 0o04;
pub(crate) const BRANCH_CHS: u8 = 0o10;
pub(crate) const BRANCH_TOP: u8 = 0o20;
pub(crate) const BRANCH_TUS: u8 = 0o21;
pub(crate) const BRANCH_SSP: u8 = 0o24;
pub(crate) const BRANCH_TIO: u8 = 0o30;
pub(crate) const BRANCH_BBW: u8 = 0o41;
pub(crate) const BRANCH_BFW: u8 = 0o42;
pub(crate) const BRANCH_FBS: u8 = 0o64;

pub(crate) const RETURN_XIT: u8 = 0o01;
pub(crate) const RETURN_BRT: u8 = 0o02;
pub(crate) const RETURN_RTN: u8 = 0o04;
pub(crate) const RETURN_RTS: u8 = 0o12;

pub(crate) const MARK_INX: u8 = 0o01;
pub(crate) const MARK_COC: u8 = 0o02;
pub(crate) const MARK_MKS: u8 = 0o04;
pub(crate) const MARK_CDC: u8 = 0o12;
pub(crate) const MARK_SSF: u8 = 0o21;
pub(crate) const MARK_LLL: u8 = 0o25;
pub(crate) const MARK_CMN: u8 = 0o44;

/// Bound on the flag-search and list-lookup scans; the hardware loops
/// without limit, a simulation must not.
const SCAN_LIMIT: u16 = 8192;

impl Processor {
    pub(super) fn execute_word(&mut self, cc: &mut CentralControl, syllable: base::Syllable) {
        match syllable.word_mode() {
            WordSyllable::Litc(value) => self.push(cc, value as Word),
            WordSyllable::Opdc(offset) => self.operand_call(cc, offset),
            WordSyllable::Desc(offset) => self.descriptor_call(cc, offset),
            WordSyllable::Operator { family, variant } => {
                self.word_operator(cc, family, variant);
            }
        }
    }

    fn word_operator(&mut self, cc: &mut CentralControl, family: u8, variant: u8) {
        match family {
            FAMILY_ARITH => match variant {
                ARITH_ADD => self.add_sub(cc, false),
                ARITH_SUB => self.add_sub(cc, true),
                ARITH_MUL => self.multiply(cc),
                ARITH_DIV => self.divide(cc),
                ARITH_IDV => self.integer_divide(cc, false),
                ARITH_RDV => self.integer_divide(cc, true),
                _ => self.undefined(family, variant),
            },
            FAMILY_DOUBLE => match variant {
                DOUBLE_ADD => self.double_add_sub(cc, false),
                DOUBLE_SUB => self.double_add_sub(cc, true),
                DOUBLE_MUL => self.double_multiply(cc),
                DOUBLE_DIV => self.double_divide(cc),
                _ => self.undefined(family, variant),
            },
            FAMILY_CONTROL => self.control_operator(cc, variant),
            FAMILY_LOGICAL => self.logical_operator(cc, variant),
            FAMILY_STORE => self.store_operator(cc, variant),
            FAMILY_COMPARE => self.compare_operator(cc, variant),
            FAMILY_BRANCH => self.branch_operator(cc, variant),
            FAMILY_RETURN => self.return_operator(cc, variant),
            FAMILY_MARK => self.mark_operator(cc, variant),
            FAMILY_ISOLATE => self.isolate_operator(cc, variant),
            FAMILY_BIT_BRANCH => self.bit_branch_operator(cc, variant),
            FAMILY_FIELD_TRANSFER => self.field_transfer_operator(cc, variant),
            FAMILY_FIELD_COMPARE_LOW => self.field_compare_operator(cc, variant, false),
            FAMILY_FIELD_COMPARE_EQUAL => self.field_compare_operator(cc, variant, true),
            _ => self.undefined(family, variant),
        }
    }

    fn undefined(&mut self, family: u8, variant: u8) {
        event!(
            Level::TRACE,
            "undefined word-mode operator {:02o}{:02o}",
            variant,
            family
        );
    }

    // ------------------------------------------------------------------

    fn control_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        match variant {
            CONTROL_ITI => {
                if self.role(cc) == ProcessorRole::Control {
                    let vector = cc.interrupt_address();
                    if vector != 0 {
                        cc.clear_interrupt();
                        self.c = vector as u16;
                        self.l = 0;
                        self.prof = false;
                        self.trof = false;
                        self.branched = true;
                    }
                }
            }
            CONTROL_SFI | CONTROL_SFT => self.store_for_interrupt(cc),
            CONTROL_COM => {
                self.adjust_a_full(cc);
                let word = self.a;
                self.arof = false;
                // The communicate cell sits inside protected low
                // memory; this store is exempt from the restriction.
                self.store_word_unprotected(cc, COMMUNICATE_CELL, word);
                self.interrupt(cc, IRQ_COMMUNICATE);
            }
            CONTROL_PRL => {
                self.adjust_a_full(cc);
                let word = self.a;
                self.arof = false;
                let Some(addr) = store_target(word) else {
                    self.interrupt(cc, IRQ_FLAG_BIT);
                    return;
                };
                if self.ncsf {
                    self.interrupt(cc, IRQ_PROGRAM_RELEASE);
                } else if let Some(cell) = self.fetch_word(cc, addr) {
                    self.store_word(cc, addr, bit_reset(cell, base::word::PRESENCE_BIT));
                }
            }
            CONTROL_IOR if !self.ncsf => {
                self.adjust_a_full(cc);
                let word = self.a;
                self.arof = false;
                if let Some(addr) = store_target(word) {
                    if let Some(cell) = self.fetch_word(cc, addr) {
                        self.store_word(cc, addr, bit_set(cell, base::word::PRESENCE_BIT));
                    }
                }
            }
            CONTROL_RTR if !self.ncsf => {
                let timer = cc.timer_value();
                self.push(cc, make_operand(false, 0, timer as Word));
            }
            CONTROL_IIO if !self.ncsf => cc.initiate_io(),
            CONTROL_IP1 if !self.ncsf => self.initiate(cc, false),
            CONTROL_IFT if !self.ncsf => self.initiate(cc, true),
            CONTROL_IP2 if !self.ncsf => cc.initiate_p2(),
            CONTROL_HP2 if !self.ncsf => cc.halt_p2(),
            CONTROL_ZPI => {
                self.busy = false;
                if self.role(cc) == ProcessorRole::Slave {
                    cc.p2_stopped();
                }
            }
            _ => (),
        }
    }

    fn logical_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        match variant {
            LOGICAL_LNG => {
                self.adjust_a_full(cc);
                // invert everything below the flag, flag cleared
                self.a = !self.a & (base::WORD_MASK >> 1);
            }
            LOGICAL_LOR => {
                self.adjust_ab_full(cc);
                self.b |= self.a;
                self.arof = false;
            }
            LOGICAL_LND => {
                self.adjust_ab_full(cc);
                self.b &= self.a;
                self.arof = false;
            }
            LOGICAL_LQV => {
                self.adjust_ab_full(cc);
                self.b = !(self.b ^ self.a) & base::WORD_MASK;
                self.arof = false;
            }
            LOGICAL_MOP => {
                self.adjust_a_full(cc);
                self.a = bit_reset(self.a, base::word::FLAG_BIT);
            }
            LOGICAL_MDS => {
                self.adjust_a_full(cc);
                self.a = bit_set(self.a, base::word::FLAG_BIT);
            }
            _ => self.undefined(FAMILY_LOGICAL, variant),
        }
    }

    /// Resolves the destination of a store: A names it either as a
    /// present descriptor or as an integer address.
    fn store_destination(&mut self, cc: &mut CentralControl) -> Option<u16> {
        let word = self.a;
        if is_control_word(word) && !is_present(word) {
            self.interrupt(cc, IRQ_PRESENCE);
            return None;
        }
        match store_target(word) {
            Some(addr) => Some(addr),
            None => {
                self.interrupt(cc, IRQ_INTEGER_OVERFLOW);
                None
            }
        }
    }

    fn store_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        match variant {
            STORE_LOD => {
                self.adjust_a_full(cc);
                if let Some(addr) = self.store_destination(cc) {
                    self.m = addr;
                    if let Some(word) = self.fetch_word(cc, addr) {
                        self.a = word;
                    } else {
                        self.arof = false;
                    }
                }
            }
            STORE_STD | STORE_SND | STORE_ISD | STORE_ISN | STORE_CID | STORE_CIN => {
                self.adjust_ab_full(cc);
                let destructive = matches!(variant, STORE_STD | STORE_ISD | STORE_CID);
                let integerize_value = match variant {
                    STORE_ISD | STORE_ISN => true,
                    // conditional integer store: only when the
                    // destination descriptor carries the integer bit
                    STORE_CID | STORE_CIN => {
                        is_control_word(self.a) && bit_test(self.a, base::word::MODE_BIT)
                    }
                    _ => false,
                };
                let Some(addr) = self.store_destination(cc) else {
                    return;
                };
                let value = if integerize_value {
                    let Some(v) = self.integerize_b(cc) else {
                        return;
                    };
                    v
                } else {
                    self.b
                };
                self.m = addr;
                self.store_word(cc, addr, value);
                self.arof = false;
                if destructive {
                    self.brof = false;
                } else {
                    self.b = value;
                }
            }
            _ => self.undefined(FAMILY_STORE, variant),
        }
    }

    fn relation(&mut self, cc: &mut CentralControl, pred: fn(std::cmp::Ordering) -> bool) {
        self.adjust_ab_full(cc);
        let result = pred(compare(self.b, self.a));
        self.b = result as Word;
        self.arof = false;
    }

    fn compare_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        use std::cmp::Ordering::*;
        match variant {
            COMPARE_GEQ => self.relation(cc, |o| o != Less),
            COMPARE_GTR => self.relation(cc, |o| o == Greater),
            COMPARE_NEQ => self.relation(cc, |o| o != Equal),
            COMPARE_LEQ => self.relation(cc, |o| o != Greater),
            COMPARE_LSS => self.relation(cc, |o| o == Less),
            COMPARE_EQL => self.relation(cc, |o| o == Equal),
            COMPARE_XCH => self.exchange_tos(cc),
            COMPARE_DUP => {
                self.adjust_a_full(cc);
                let word = self.a;
                self.push(cc, word);
            }
            // Field moves: the named field of A replaces the same (or
            // paired) field of B; A is deleted.
            COMPARE_FTF => self.move_field(cc, 18, 18, 15),
            COMPARE_FTC => self.move_field(cc, 18, 33, 15),
            COMPARE_CTC => self.move_field(cc, 33, 33, 15),
            COMPARE_CTF => self.move_field(cc, 33, 18, 15),
            _ => self.undefined(FAMILY_COMPARE, variant),
        }
    }

    fn move_field(&mut self, cc: &mut CentralControl, from: u8, to: u8, width: u8) {
        self.adjust_ab_full(cc);
        self.b = field_transfer(self.b, to, width, self.a, from);
        self.arof = false;
    }

    fn branch_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        match variant {
            BRANCH_BFW => self.branch_unconditional(cc, true),
            BRANCH_BBW => self.branch_unconditional(cc, false),
            BRANCH_BFC => self.branch_conditional(cc, true),
            BRANCH_BBC => self.branch_conditional(cc, false),
            BRANCH_SSN => {
                self.adjust_a_full(cc);
                self.a = bit_set(self.a, MANT_SIGN_BIT);
            }
            BRANCH_SSP => {
                self.adjust_a_full(cc);
                self.a = bit_reset(self.a, MANT_SIGN_BIT);
            }
            BRANCH_CHS => {
                self.adjust_a_full(cc);
                self.a ^= 1 << (47 - MANT_SIGN_BIT);
            }
            BRANCH_TOP => {
                self.adjust_a_full(cc);
                let operand = !is_control_word(self.a);
                self.push(cc, operand as Word);
            }
            BRANCH_TUS => {
                let mask = cc.unit_ready_mask();
                self.push(cc, make_operand(false, 0, mask as Word));
            }
            BRANCH_TIO => {
                let channel = cc.interrogate_io_channel();
                self.push(cc, make_operand(false, 0, channel as Word));
            }
            BRANCH_FBS => self.flag_bit_search(cc),
            _ => self.undefined(FAMILY_BRANCH, variant),
        }
    }

    /// Consumes the branch argument in A: either a syllable offset or
    /// a present descriptor naming a word to branch to.  Returns true
    /// if the program pointer was changed.
    fn take_branch(&mut self, cc: &mut CentralControl, forward: bool) -> bool {
        let word = self.a;
        self.arof = false;
        if is_control_word(word) {
            if !is_present(word) {
                self.interrupt(cc, IRQ_PRESENCE);
                return false;
            }
            self.c = base::word::address_field(word);
            self.l = 0;
            self.prof = false;
            self.trof = false;
            self.branched = true;
            return true;
        }
        let Some(offset) = integerize(word) else {
            self.interrupt(cc, IRQ_INTEGER_OVERFLOW);
            return false;
        };
        let here = self.current_syllable_index() as i64;
        let target = if forward {
            here + offset
        } else {
            here - offset
        };
        self.jump_to_syllable(target.max(0) as u32);
        true
    }

    fn branch_unconditional(&mut self, cc: &mut CentralControl, forward: bool) {
        self.adjust_a_full(cc);
        self.take_branch(cc, forward);
    }

    /// Conditional branches take the branch when the condition word in
    /// B has a zero low-order bit (false).
    fn branch_conditional(&mut self, cc: &mut CentralControl, forward: bool) {
        self.adjust_ab_full(cc);
        let condition = self.b & 1 != 0;
        self.brof = false;
        if condition {
            self.arof = false;
        } else {
            self.take_branch(cc, forward);
        }
    }

    /// Scans memory forward from the address in A for the first word
    /// with its flag bit set and leaves its descriptor in A.
    fn flag_bit_search(&mut self, cc: &mut CentralControl) {
        self.adjust_a_full(cc);
        let Some(mut addr) = store_target(self.a) else {
            self.interrupt(cc, IRQ_INTEGER_OVERFLOW);
            return;
        };
        for _ in 0..SCAN_LIMIT {
            match self.fetch_word(cc, addr) {
                Some(word) if is_control_word(word) => {
                    self.a = make_data_descriptor(addr, 0);
                    return;
                }
                Some(_) => addr = (addr + 1) & 0o77777,
                None => break,
            }
        }
        self.a = make_data_descriptor(addr, 0);
    }

    fn return_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        match variant {
            RETURN_XIT => self.exit_subroutine(cc, None, false),
            RETURN_RTN => {
                self.adjust_a_full(cc);
                let result = self.a;
                self.exit_subroutine(cc, Some(result), true);
            }
            RETURN_RTS => {
                self.adjust_a_full(cc);
                let result = self.a;
                self.exit_subroutine(cc, Some(result), false);
            }
            RETURN_BRT if !self.ncsf => {
                self.adjust_a_full(cc);
                let rcw = self.a;
                if is_control_word(rcw) {
                    self.arof = false;
                    self.apply_rcw(rcw);
                } else {
                    self.interrupt(cc, IRQ_FLAG_BIT);
                }
            }
            _ => self.undefined(FAMILY_RETURN, variant),
        }
    }

    fn mark_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        match variant {
            MARK_MKS => self.mark_stack(cc),
            MARK_INX => {
                self.adjust_ab_full(cc);
                if !is_control_word(self.b) {
                    self.interrupt(cc, IRQ_FLAG_BIT);
                    return;
                }
                let (descriptor, index) = (self.b, self.a);
                if let Some(indexed) = self.index_descriptor(cc, descriptor, index) {
                    self.b = indexed;
                    self.arof = false;
                }
            }
            MARK_COC => {
                self.adjust_a_full(cc);
                if is_control_word(self.a) {
                    self.resolve_operand(cc);
                }
            }
            MARK_CDC => {
                self.adjust_a_full(cc);
                let word = self.a;
                if is_program_descriptor(word) && is_present(word) {
                    self.arof = false;
                    self.enter_subroutine(cc, word, true);
                }
            }
            MARK_SSF => self.set_or_store_sf(cc),
            MARK_LLL => self.linked_list_lookup(cc),
            MARK_CMN => self.enter_character_mode(cc),
            _ => self.undefined(FAMILY_MARK, variant),
        }
    }

    /// Set/store S or F, selected by the low two bits of the operand
    /// in A: 0 pushes F, 1 sets F from B, 2 pushes S, 3 sets S from B.
    fn set_or_store_sf(&mut self, cc: &mut CentralControl) {
        self.adjust_a_full(cc);
        let selector = integerize(self.a).unwrap_or(0) & 3;
        self.arof = false;
        match selector {
            0 => {
                let f = self.f;
                self.push(cc, make_operand(false, 0, f as Word));
            }
            1 => {
                self.adjust_b_full(cc);
                self.f = base::word::address_field(self.b);
                self.brof = false;
            }
            2 => {
                let s = self.s;
                self.push(cc, make_operand(false, 0, s as Word));
            }
            _ => {
                self.adjust_b_full(cc);
                self.s = base::word::address_field(self.b);
                self.brof = false;
            }
        }
    }

    /// Follows a chain whose links are in the address field of each
    /// entry, looking for the first entry whose mantissa is at least
    /// the argument in A.  B ends as the descriptor of the found
    /// entry; the true/false flip-flop reports success.
    fn linked_list_lookup(&mut self, cc: &mut CentralControl) {
        self.adjust_ab_full(cc);
        let argument = base::word::mantissa(self.a);
        self.arof = false;
        if !is_control_word(self.b) {
            self.interrupt(cc, IRQ_FLAG_BIT);
            return;
        }
        if !is_present(self.b) {
            self.interrupt(cc, IRQ_PRESENCE);
            return;
        }
        let mut addr = base::word::address_field(self.b);
        for _ in 0..SCAN_LIMIT {
            let Some(entry) = self.fetch_word(cc, addr) else {
                break;
            };
            if base::word::mantissa(entry) >= argument {
                self.b = make_data_descriptor(addr, 0);
                self.set_tfff(true);
                return;
            }
            let link = base::word::address_field(entry);
            if link == 0 {
                break;
            }
            addr = link;
        }
        self.set_tfff(false);
    }

    /// Isolates a field of the top-of-stack word: the variant's high
    /// three bits give the octal digits to skip from the left of the
    /// word, the low three the digit count to keep.
    fn isolate_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        self.adjust_a_full(cc);
        let skip = (variant >> 3) & 7;
        let count = variant & 7;
        self.a = if count == 0 {
            0
        } else {
            field_isolate(self.a, skip * 3, count * 3)
        };
    }

    /// Conditional bit branch: the variant's high five bits select a
    /// bit of B (word positions 0 to 31), its low bit makes the test
    /// nondestructive.  A supplies the branch target, taken forward
    /// when the tested bit is set.
    fn bit_branch_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        self.adjust_ab_full(cc);
        let bit = variant >> 1;
        let nondestructive = variant & 1 != 0;
        let set = bit_test(self.b, bit);
        if !nondestructive {
            self.brof = false;
        }
        if set {
            self.take_branch(cc, true);
        } else {
            self.arof = false;
        }
    }

    /// Transfers the low `variant` bits of A into B (zero means the
    /// whole word).
    fn field_transfer_operator(&mut self, cc: &mut CentralControl, variant: u8) {
        self.adjust_ab_full(cc);
        let width = if variant == 0 || variant > 48 {
            48
        } else {
            variant
        };
        let start = 48 - width;
        self.b = field_transfer(self.b, start, width, self.a, start);
        self.arof = false;
    }

    /// Compares the low `variant` bits of A and B; sets the
    /// true/false flip-flop on less-than (or equality).  A is
    /// deleted, B retained.
    fn field_compare_operator(&mut self, cc: &mut CentralControl, variant: u8, equal: bool) {
        self.adjust_ab_full(cc);
        let width = if variant == 0 || variant > 48 {
            48
        } else {
            variant
        };
        let start = 48 - width;
        let a = field_isolate(self.a, start, width);
        let b = field_isolate(self.b, start, width);
        self.set_tfff(if equal { b == a } else { b < a });
        self.arof = false;
    }

    /// Enters character mode through the routine address in A.  The
    /// return control word records the syllable after this one; F
    /// marks the stack top so S can serve as the destination pointer.
    fn enter_character_mode(&mut self, cc: &mut CentralControl) {
        self.adjust_a_full(cc);
        let word = self.a;
        self.arof = false;
        self.adjust_b_empty(cc);
        if is_control_word(word) && !is_present(word) {
            self.interrupt(cc, IRQ_PRESENCE);
            return;
        }
        let Some(addr) = store_target(word) else {
            self.interrupt(cc, IRQ_INTEGER_OVERFLOW);
            return;
        };
        self.advance();
        let rcw = self.build_rcw(false);
        self.push_raw(cc, rcw);
        self.f = self.s;
        self.c = addr;
        self.l = 0;
        self.prof = false;
        self.trof = false;
        self.branched = true;
        self.cwmf = true;
        self.msff = false;
        self.m = 0;
        self.g = 0;
        self.h = 0;
        self.k = 0;
        self.v = 0;
        self.q &= !1;
    }

    /// The true/false flip-flop shares hardware with the mark flip-
    /// flop; word-mode tests read and set it through these.
    pub(crate) fn set_tfff(&mut self, value: bool) {
        self.msff = value;
    }

    pub(crate) fn tfff(&self) -> bool {
        self.msff
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use base::Syllable;

    fn op(family: u8, variant: u8) -> Syllable {
        Syllable::operator(family, variant)
    }

    fn litc(v: u16) -> Syllable {
        Syllable::new(v << 2)
    }

    fn int(v: i64) -> Word {
        make_operand(v < 0, 0, v.unsigned_abs())
    }

    #[test]
    fn literal_call_pushes_ten_bit_literal() {
        let (mut cc, mut p) = machine();
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[litc(0o777), op(FAMILY_CONTROL, CONTROL_ZPI)],
        );
        p.run(&mut cc, 4);
        assert!(p.arof);
        assert_eq!(p.a, 0o777);
    }

    #[test]
    fn literal_add_program_leaves_sum_in_b() {
        let (mut cc, mut p) = machine();
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[litc(5), litc(3), op(FAMILY_ARITH, ARITH_ADD), op(FAMILY_CONTROL, CONTROL_ZPI)],
        );
        p.run(&mut cc, 100);
        assert!(!p.busy);
        assert_eq!(integerize(p.b), Some(8));
    }

    #[test]
    fn operand_call_resolves_data_descriptor() {
        let (mut cc, mut p) = machine();
        p.r = 0o100;
        p.store_word(&mut cc, 0o5000, int(99));
        let d = make_data_descriptor(0o5000, 1);
        p.store_word(&mut cc, (0o100 << 6) + 2, d);
        p.operand_call(&mut cc, 2);
        assert!(p.arof);
        assert_eq!(integerize(p.a), Some(99));
    }

    #[test]
    fn operand_call_loads_plain_operand() {
        let (mut cc, mut p) = machine();
        p.r = 0o100;
        p.store_word(&mut cc, (0o100 << 6) + 3, int(17));
        p.operand_call(&mut cc, 3);
        assert_eq!(integerize(p.a), Some(17));
    }

    #[test]
    fn operand_call_on_absent_descriptor_raises_presence() {
        let (mut cc, mut p) = machine();
        normal_state(&mut p);
        p.s = 0o3000;
        let mut d = make_data_descriptor(0o5000, 1);
        d = bit_reset(d, base::word::PRESENCE_BIT);
        p.store_word(&mut cc, (0o100 << 6) + 2, d);
        p.operand_call(&mut cc, 2);
        assert_ne!(
            cc.processor_irq(ProcessorRole::Control) & IRQ_PRESENCE,
            0
        );
    }

    #[test]
    fn descriptor_call_builds_address_descriptor() {
        let (mut cc, mut p) = machine();
        p.r = 0o100;
        p.store_word(&mut cc, (0o100 << 6) + 4, int(55));
        p.descriptor_call(&mut cc, 4);
        assert!(is_control_word(p.a));
        assert_eq!(base::word::address_field(p.a), (0o100 << 6) + 4);
    }

    #[test]
    fn store_destructive_and_nondestructive() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, int(42));
        p.push(&mut cc, make_data_descriptor(0o5100, 0));
        p.word_operator(&mut cc, FAMILY_STORE, STORE_SND);
        assert_eq!(cc.read_raw(0o5100), Some(int(42)));
        assert!(p.brof); // value retained
        p.push(&mut cc, make_data_descriptor(0o5101, 0));
        p.word_operator(&mut cc, FAMILY_STORE, STORE_STD);
        assert_eq!(cc.read_raw(0o5101), Some(int(42)));
        assert!(!p.brof);
        assert!(!p.arof);
    }

    #[test]
    fn integer_store_rounds_value() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, make_operand(false, -1, 12)); // 1.5
        p.push(&mut cc, make_data_descriptor(0o5102, 0));
        p.word_operator(&mut cc, FAMILY_STORE, STORE_ISD);
        assert_eq!(cc.read_raw(0o5102), Some(int(2)));
    }

    #[test]
    fn integer_store_overflow_interrupts_and_stores_nothing() {
        let (mut cc, mut p) = machine();
        normal_state(&mut p);
        // 8^13: too large to integerize
        p.push(&mut cc, make_operand(false, 13, 1));
        p.push(&mut cc, make_data_descriptor(0o5104, 0));
        p.word_operator(&mut cc, FAMILY_STORE, STORE_ISD);
        assert_eq!(cc.read_raw(0o5104), Some(0));
        assert_ne!(
            cc.processor_irq(ProcessorRole::Control) & IRQ_INTEGER_OVERFLOW,
            0
        );
    }

    #[test]
    fn load_replaces_address_with_word() {
        let (mut cc, mut p) = machine();
        p.store_word(&mut cc, 0o5103, int(7));
        p.push(&mut cc, make_data_descriptor(0o5103, 0));
        p.word_operator(&mut cc, FAMILY_STORE, STORE_LOD);
        assert_eq!(integerize(p.a), Some(7));
    }

    #[test]
    fn relational_operators_leave_boolean_in_b() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, int(3));
        p.push(&mut cc, int(5));
        p.word_operator(&mut cc, FAMILY_COMPARE, COMPARE_LSS); // 3 < 5
        assert_eq!(p.b, 1);
        assert!(!p.arof);
        p.push(&mut cc, int(5));
        p.word_operator(&mut cc, FAMILY_COMPARE, COMPARE_GTR); // 1 > 5?
        assert_eq!(p.b, 0);
    }

    #[test]
    fn duplicate_copies_top_of_stack() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, int(9));
        p.word_operator(&mut cc, FAMILY_COMPARE, COMPARE_DUP);
        assert_eq!(p.a, int(9));
        assert_eq!(p.b, int(9));
    }

    #[test]
    fn logical_or_and_equivalence() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, 0o0101);
        p.push(&mut cc, 0o0011);
        p.word_operator(&mut cc, FAMILY_LOGICAL, LOGICAL_LOR);
        assert_eq!(p.b, 0o0111);
        let (mut cc, mut p) = machine();
        p.push(&mut cc, 0o7777);
        p.push(&mut cc, 0o7777);
        p.word_operator(&mut cc, FAMILY_LOGICAL, LOGICAL_LQV);
        assert_eq!(p.b, base::WORD_MASK);
    }

    #[test]
    fn make_descriptor_and_operand_toggle_flag() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, int(1));
        p.word_operator(&mut cc, FAMILY_LOGICAL, LOGICAL_MDS);
        assert!(is_control_word(p.a));
        p.word_operator(&mut cc, FAMILY_LOGICAL, LOGICAL_MOP);
        assert!(!is_control_word(p.a));
    }

    #[test]
    fn forward_branch_skips_syllables() {
        let (mut cc, mut p) = machine();
        // branch two syllables forward from itself, over litc(7)
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[
                litc(2), // offset from the branch syllable
                op(FAMILY_BRANCH, BRANCH_BFW),
                litc(7),
                litc(9),
                op(FAMILY_CONTROL, CONTROL_ZPI),
            ],
        );
        p.run(&mut cc, 100);
        assert_eq!(p.a, 9);
        assert!(!p.brof); // litc(7) never pushed
    }

    #[test]
    fn conditional_branch_taken_on_false() {
        let (mut cc, mut p) = machine();
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[
                litc(0), // condition: false
                litc(2), // offset from the branch syllable
                op(FAMILY_BRANCH, BRANCH_BFC),
                litc(7),
                litc(9),
                op(FAMILY_CONTROL, CONTROL_ZPI),
            ],
        );
        p.run(&mut cc, 100);
        assert_eq!(p.a, 9);
        assert!(!p.brof);
    }

    #[test]
    fn conditional_branch_not_taken_on_true() {
        let (mut cc, mut p) = machine();
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[
                litc(1), // condition: true
                litc(2),
                op(FAMILY_BRANCH, BRANCH_BFC),
                litc(7),
                op(FAMILY_CONTROL, CONTROL_ZPI),
            ],
        );
        p.run(&mut cc, 100);
        assert_eq!(p.a, 7);
    }

    #[test]
    fn branch_through_descriptor_goes_to_word_address() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, make_data_descriptor(0o2345, 0));
        p.branch_unconditional(&mut cc, true);
        assert_eq!((p.c, p.l), (0o2345, 0));
        assert!(p.branched);
    }

    #[test]
    fn sign_operators() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, int(5));
        p.word_operator(&mut cc, FAMILY_BRANCH, BRANCH_SSN);
        assert_eq!(integerize(p.a), Some(-5));
        p.word_operator(&mut cc, FAMILY_BRANCH, BRANCH_CHS);
        assert_eq!(integerize(p.a), Some(5));
        p.word_operator(&mut cc, FAMILY_BRANCH, BRANCH_SSN);
        p.word_operator(&mut cc, FAMILY_BRANCH, BRANCH_SSP);
        assert_eq!(integerize(p.a), Some(5));
    }

    #[test]
    fn test_operand_pushes_result_above_tested_word() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, int(3));
        p.word_operator(&mut cc, FAMILY_BRANCH, BRANCH_TOP);
        assert_eq!(p.a, 1);
        assert_eq!(p.b, int(3));
        p.push(&mut cc, make_data_descriptor(0, 0));
        p.word_operator(&mut cc, FAMILY_BRANCH, BRANCH_TOP);
        assert_eq!(p.a, 0);
    }

    #[test]
    fn flag_bit_search_finds_first_control_word() {
        let (mut cc, mut p) = machine();
        p.store_word(&mut cc, 0o5200, int(1));
        p.store_word(&mut cc, 0o5201, int(2));
        p.store_word(&mut cc, 0o5202, make_data_descriptor(0, 0));
        p.push(&mut cc, int(0o5200));
        p.word_operator(&mut cc, FAMILY_BRANCH, BRANCH_FBS);
        assert_eq!(base::word::address_field(p.a), 0o5202);
    }

    #[test]
    fn subroutine_entry_and_return_value() {
        let (mut cc, mut p) = machine();
        // routine at 0o2100: push 40, fetch the argument (one word
        // below the return word, so couplet F-1), add, return the sum
        load_program(
            &mut cc,
            &mut p,
            0o2100,
            &[
                litc(40),
                Syllable::new((0o1601 << 2) | 2), // OPDC F-1
                op(FAMILY_ARITH, ARITH_ADD),
                op(FAMILY_RETURN, RETURN_RTN),
            ],
        );
        // caller: mark, argument 2, call via operand call on a
        // program descriptor at R+5
        let d = super::super::make_program_descriptor(0o2100, false, true);
        p.r = 0o100;
        p.store_word(&mut cc, (0o100 << 6) + 5, d);
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[
                op(FAMILY_MARK, MARK_MKS),
                litc(2),
                Syllable::new((5 << 2) | 2), // OPDC R+5
                op(FAMILY_CONTROL, CONTROL_ZPI),
            ],
        );
        p.run(&mut cc, 200);
        assert!(!p.busy);
        assert_eq!(integerize(p.a), Some(42));
    }

    #[test]
    fn index_operator_indexes_descriptor_on_stack() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, make_data_descriptor(0o4000, 8));
        p.push(&mut cc, int(5));
        p.word_operator(&mut cc, FAMILY_MARK, MARK_INX);
        assert_eq!(base::word::address_field(p.b), 0o4005);
        assert!(!p.arof);
    }

    #[test]
    fn isolate_extracts_digit_field() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, 0o1234_5670_0000_0000);
        // skip 2 digits, take 3: digits 3,4,5 of the word
        p.word_operator(&mut cc, FAMILY_ISOLATE, (2 << 3) | 3);
        assert_eq!(p.a, 0o345);
    }

    #[test]
    fn bit_branch_tests_selected_bit() {
        let (mut cc, mut p) = machine();
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[op(FAMILY_CONTROL, CONTROL_ZPI)],
        );
        // bit 0 (flag) of the tested word is set: branch taken
        p.push(&mut cc, make_data_descriptor(0, 0));
        p.push(&mut cc, int(8)); // target offset
        p.bit_branch_operator(&mut cc, 0 << 1 | 1); // bit 0, nondestructive
        assert!(p.branched);
        assert!(p.brof); // nondestructive keeps the tested word
    }

    #[test]
    fn field_transfer_moves_low_bits() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, 0o7700);
        p.push(&mut cc, 0o0077);
        p.word_operator(&mut cc, FAMILY_FIELD_TRANSFER, 5);
        assert_eq!(p.b, 0o7737); // low 5 bits of A into B
    }

    #[test]
    fn field_compare_sets_true_false_flip_flop() {
        let (mut cc, mut p) = machine();
        p.push(&mut cc, int(0)); // B field = 0
        p.push(&mut cc, int(1)); // A field = 1
        p.word_operator(&mut cc, FAMILY_FIELD_COMPARE_LOW, 12);
        assert!(p.tfff()); // B < A
        p.push(&mut cc, int(1));
        p.word_operator(&mut cc, FAMILY_FIELD_COMPARE_EQUAL, 12);
        assert!(!p.tfff());
    }

    #[test]
    fn communicate_stores_word_and_interrupts_in_normal_state() {
        let (mut cc, mut p) = machine();
        normal_state(&mut p);
        p.push(&mut cc, int(31));
        p.word_operator(&mut cc, FAMILY_CONTROL, CONTROL_COM);
        assert_eq!(cc.read_raw(COMMUNICATE_CELL), Some(int(31)));
        assert_ne!(
            cc.processor_irq(ProcessorRole::Control) & IRQ_COMMUNICATE,
            0
        );
    }

    #[test]
    fn read_timer_is_control_state_only() {
        let (mut cc, mut p) = machine();
        p.word_operator(&mut cc, FAMILY_CONTROL, CONTROL_RTR);
        assert!(p.arof);
        let (mut cc, mut p) = machine();
        normal_state(&mut p);
        p.word_operator(&mut cc, FAMILY_CONTROL, CONTROL_RTR);
        assert!(!p.arof);
    }

    #[test]
    fn interrupt_injection_saves_state_and_vectors() {
        let (mut cc, mut p) = machine();
        normal_state(&mut p);
        p.s = 0o3000;
        p.f = 0o3000;
        load_program(
            &mut cc,
            &mut p,
            0o2000,
            &[litc(1), litc(2), litc(3), litc(4)],
        );
        // a keyboard request arrives before the second literal
        p.run(&mut cc, 1);
        cc.set_keyboard_request();
        p.run(&mut cc, 20);
        // the processor stored its state and vectored in control state
        assert!(!p.ncsf);
        assert_eq!(cc.interrupt_address(), 0); // accepted and cleared
        // the vector cell held no code, so the run stopped there; the
        // resumable state sits in the exchange cell chain
        let incw = cc.read_raw(crate::central::EXCHANGE_CELL).unwrap();
        assert!(is_control_word(incw));
    }
}
