//! Control words and linkage: stack frames, subroutine entry and
//! exit, and the save/restore chains used when an interrupt takes a
//! processor or a stopped processor is (re)initiated.
//!
//! Word layouts (bit 0 is the most significant bit):
//!
//! * Mark Stack Control Word: tag bits 0-1; R at [6:9]; mark and
//!   subroutine flip-flops at bits 16 and 17; F at [18:15].
//! * Return Control Word: tag bits 0-1; descriptor-call flag at
//!   bit 2; H [4:3]; V [7:3]; L [10:2]; G [12:3]; K [15:3];
//!   F [18:15]; C [33:15].
//! * Interrupt Control Word: tag bits 0-1; VARF/SALF/MSFF at bits
//!   3-5; R [6:9]; N [15:4]; M [33:15].
//! * Interrupt Loop Control Word: tag bits 0-1; X at [9:39].
//! * Pointer word (also built by the store-address character
//!   operators): flag bit; bit index [9:3]; character index [12:3];
//!   address [33:15].
//! * Initiate Control Word: tag bits 0-1; character-mode flag at
//!   bit 5; buffer-occupancy flags at bits 6-7; S [33:15].

use base::{bit_set, bit_test, field_insert, field_isolate, Word};

use crate::central::{
    CentralControl, ProcessorRole, EXCHANGE_CELL, IRQ_FLAG_BIT, IRQ_INTEGER_OVERFLOW,
    IRQ_INVALID_INDEX,
};

use super::word_mode::{CONTROL_ITI, FAMILY_CONTROL};
use super::Processor;

fn tags() -> Word {
    let mut w = 0;
    w = bit_set(w, 0);
    bit_set(w, 1)
}

pub fn build_mscw_word(r: u16, msff: bool, salf: bool, f: u16) -> Word {
    let mut w = tags();
    w = field_insert(w, 6, 9, r as u64);
    if msff {
        w = bit_set(w, 16);
    }
    if salf {
        w = bit_set(w, 17);
    }
    field_insert(w, 18, 15, f as u64)
}

pub fn mscw_r(w: Word) -> u16 {
    field_isolate(w, 6, 9) as u16
}

pub fn mscw_msff(w: Word) -> bool {
    bit_test(w, 16)
}

pub fn mscw_salf(w: Word) -> bool {
    bit_test(w, 17)
}

pub fn mscw_f(w: Word) -> u16 {
    field_isolate(w, 18, 15) as u16
}

#[allow(clippy::too_many_arguments)]
pub fn build_rcw_word(
    c: u16,
    l: u8,
    f: u16,
    g: u8,
    h: u8,
    k: u8,
    v: u8,
    descriptor_call: bool,
) -> Word {
    let mut w = tags();
    if descriptor_call {
        w = bit_set(w, 2);
    }
    w = field_insert(w, 4, 3, h as u64);
    w = field_insert(w, 7, 3, v as u64);
    w = field_insert(w, 10, 2, l as u64);
    w = field_insert(w, 12, 3, g as u64);
    w = field_insert(w, 15, 3, k as u64);
    w = field_insert(w, 18, 15, f as u64);
    field_insert(w, 33, 15, c as u64)
}

/// Field accessors for return control words, used by the processor
/// and by diagnostic displays.
pub fn apply_rcw_fields(w: Word) -> (u16, u8, u16, u8, u8, u8, u8, bool) {
    (
        field_isolate(w, 33, 15) as u16,
        field_isolate(w, 10, 2) as u8,
        field_isolate(w, 18, 15) as u16,
        field_isolate(w, 12, 3) as u8,
        field_isolate(w, 4, 3) as u8,
        field_isolate(w, 15, 3) as u8,
        field_isolate(w, 7, 3) as u8,
        bit_test(w, 2),
    )
}

fn build_icw(p: &Processor) -> Word {
    let mut w = tags();
    if p.varf {
        w = bit_set(w, 3);
    }
    if p.salf {
        w = bit_set(w, 4);
    }
    if p.msff {
        w = bit_set(w, 5);
    }
    w = field_insert(w, 6, 9, p.r as u64);
    w = field_insert(w, 15, 4, p.n as u64);
    field_insert(w, 33, 15, p.m as u64)
}

fn build_ilcw(x: Word) -> Word {
    field_insert(tags(), 9, 39, x)
}

pub(super) fn build_pointer_word(addr: u16, char_index: u8, bit_index: u8) -> Word {
    let mut w = 0;
    w = bit_set(w, base::word::FLAG_BIT);
    w = field_insert(w, 9, 3, bit_index as u64);
    w = field_insert(w, 12, 3, char_index as u64);
    field_insert(w, 33, 15, addr as u64)
}

pub(super) fn pointer_fields(w: Word) -> (u16, u8, u8) {
    (
        field_isolate(w, 33, 15) as u16,
        field_isolate(w, 12, 3) as u8,
        field_isolate(w, 9, 3) as u8,
    )
}

fn build_incw(s: u16, cwmf: bool, arof: bool, brof: bool) -> Word {
    let mut w = tags();
    if cwmf {
        w = bit_set(w, 5);
    }
    if arof {
        w = bit_set(w, 6);
    }
    if brof {
        w = bit_set(w, 7);
    }
    field_insert(w, 33, 15, s as u64)
}

impl Processor {
    pub(crate) fn build_rcw(&self, descriptor_call: bool) -> Word {
        build_rcw_word(
            self.c,
            self.l,
            self.f,
            self.g,
            self.h,
            self.k,
            self.v,
            descriptor_call,
        )
    }

    /// Restores the program pointer and the scratch pointer registers
    /// from a return control word.  Returns the descriptor-call flag.
    pub(crate) fn apply_rcw(&mut self, w: Word) -> bool {
        let (c, l, f, g, h, k, v, descriptor_call) = apply_rcw_fields(w);
        self.c = c;
        self.l = l;
        self.f = f;
        self.g = g;
        self.h = h;
        self.k = k;
        self.v = v;
        self.prof = false;
        self.trof = false;
        self.branched = true;
        descriptor_call
    }

    pub(crate) fn build_mscw(&self) -> Word {
        build_mscw_word(self.r, self.msff, self.salf, self.f)
    }

    fn apply_mscw(&mut self, w: Word) {
        self.r = mscw_r(w);
        self.msff = mscw_msff(w);
        self.salf = mscw_salf(w);
        self.f = mscw_f(w);
    }

    /// Mark-stack operator: pushes a mark word and starts a new frame.
    pub(crate) fn mark_stack(&mut self, cc: &mut CentralControl) {
        self.adjust_ab_empty(cc);
        let mscw = self.build_mscw();
        self.push_raw(cc, mscw);
        self.f = self.s;
        self.msff = true;
        self.salf = true;
    }

    /// Enters the subroutine named by a present program descriptor.
    /// An argument-expecting descriptor reached without a marked frame
    /// is not entered; it stays on the stack as a value.
    pub(crate) fn enter_subroutine(
        &mut self,
        cc: &mut CentralControl,
        descriptor: Word,
        descriptor_call: bool,
    ) {
        let argument = bit_test(descriptor, base::word::ARGUMENT_BIT);
        let char_entry = bit_test(descriptor, base::word::MODE_BIT);
        if argument && !self.msff {
            self.a = descriptor;
            self.arof = true;
            return;
        }
        self.adjust_ab_empty(cc);
        // C/L still name the calling syllable; the return control
        // word must name the one after it.
        self.advance();
        let rcw = self.build_rcw(descriptor_call);
        self.push_raw(cc, rcw);
        self.c = base::word::address_field(descriptor);
        self.l = 0;
        self.prof = false;
        self.trof = false;
        self.branched = true;
        if argument {
            self.f = self.s;
        }
        self.msff = false;
        self.salf = true;
        if char_entry {
            // In character mode the stack is reached through F while
            // S serves as the destination pointer.
            self.f = self.s;
            self.cwmf = true;
            self.g = 0;
            self.h = 0;
            self.k = 0;
            self.v = 0;
        }
    }

    /// Common exit path: consumes the return control word at F and
    /// the mark word underneath it, cutting the stack back to the
    /// caller's frame.  `result` is re-pushed afterwards; when
    /// `resolve` is set and the call was an operand call, a control
    /// word result is resolved the way an operand call would resolve
    /// it.
    pub(crate) fn exit_subroutine(
        &mut self,
        cc: &mut CentralControl,
        result: Option<Word>,
        resolve: bool,
    ) {
        let Some(rcw) = self.fetch_word(cc, self.f) else {
            return;
        };
        if !base::word::is_control_word(rcw) {
            self.interrupt(cc, IRQ_FLAG_BIT);
            return;
        }
        self.arof = false;
        self.brof = false;
        let descriptor_call = self.apply_rcw(rcw);
        if let Some(mscw) = self.fetch_word(cc, self.f) {
            self.s = self.f.wrapping_sub(1) & 0o77777;
            self.apply_mscw(mscw);
        }
        self.cwmf = false;
        if let Some(value) = result {
            self.push(cc, value);
            if resolve && !descriptor_call && base::word::is_control_word(value) {
                self.resolve_operand(cc);
            }
        }
    }

    /// Bounds-checks an index against a data descriptor and produces
    /// the descriptor of the selected element (size field cleared).
    pub(crate) fn index_descriptor(
        &mut self,
        cc: &mut CentralControl,
        descriptor: Word,
        index: Word,
    ) -> Option<Word> {
        let Some(idx) = super::arith::integerize(index) else {
            self.interrupt(cc, IRQ_INTEGER_OVERFLOW);
            return None;
        };
        let size = base::word::size_field(descriptor) as i64;
        if idx < 0 || (size > 0 && idx >= size) {
            self.interrupt(cc, IRQ_INVALID_INDEX);
            return None;
        }
        let addr = (base::word::address_field(descriptor) as i64 + idx) as u16 & 0o77777;
        let cleared = field_insert(descriptor, 8, 10, 0);
        Some(base::word::set_address_field(cleared, addr))
    }

    /// Saves the whole processor state to the stack and the exchange
    /// cell.  The control processor then accepts the interrupt via an
    /// injected interrogate syllable; the slave simply stops.
    pub(crate) fn store_for_interrupt(&mut self, cc: &mut CentralControl) {
        let had_a = self.arof;
        let had_b = self.brof;
        if self.cwmf {
            // The A/B registers are string buffers here, not stack
            // words; flush the destination and let re-initiation
            // refetch them.
            self.flush_destination(cc);
            self.arof = false;
            self.brof = false;
            let dest = (self.s, self.k, self.v);
            self.s = self.f;
            let icw = build_icw(self);
            self.push_raw(cc, icw);
            self.push_raw(cc, build_ilcw(self.x));
            self.push_raw(cc, build_pointer_word(dest.0, dest.1, dest.2));
            let rcw = self.build_rcw(false);
            self.push_raw(cc, rcw);
        } else {
            self.adjust_ab_empty(cc);
            let icw = build_icw(self);
            self.push_raw(cc, icw);
            let rcw = self.build_rcw(false);
            self.push_raw(cc, rcw);
        }
        let incw = build_incw(self.s, self.cwmf, had_a, had_b);
        // The exchange cell is in protected low memory; the rest of
        // the save runs in control state.
        self.ncsf = false;
        self.store_word(cc, EXCHANGE_CELL, incw);
        self.cwmf = false;
        match self.role(cc) {
            ProcessorRole::Control => {
                self.salf = false;
                self.msff = false;
                self.t = base::Syllable::operator(FAMILY_CONTROL, CONTROL_ITI);
                self.trof = true;
            }
            ProcessorRole::Slave => {
                self.busy = false;
                cc.p2_stopped();
            }
        }
    }

    /// Restores processor state from the chain recorded by
    /// [`Processor::store_for_interrupt`] and resumes execution.
    pub(crate) fn initiate(&mut self, cc: &mut CentralControl, for_test: bool) {
        let Some(incw) = self.fetch_word(cc, EXCHANGE_CELL) else {
            return;
        };
        self.s = field_isolate(incw, 33, 15) as u16;
        let cwmf = bit_test(incw, 5);
        let restore_a = bit_test(incw, 6);
        let restore_b = bit_test(incw, 7);
        let Some(rcw) = self.pop_raw(cc) else { return };
        self.apply_rcw(rcw);
        if cwmf {
            let dest = self.pop_raw(cc).unwrap_or(0);
            let ilcw = self.pop_raw(cc).unwrap_or(0);
            let icw = self.pop_raw(cc).unwrap_or(0);
            self.apply_icw(icw);
            self.x = field_isolate(ilcw, 9, 39);
            let (s, k, v) = pointer_fields(dest);
            self.s = s;
            self.k = k;
            self.v = v;
            self.arof = false;
            self.brof = false;
        } else {
            let icw = self.pop_raw(cc).unwrap_or(0);
            self.apply_icw(icw);
            if restore_a {
                self.a = self.pop_raw(cc).unwrap_or(0);
            }
            if restore_b {
                self.b = self.pop_raw(cc).unwrap_or(0);
            }
            self.arof = restore_a;
            self.brof = restore_b;
        }
        self.cwmf = cwmf;
        self.ncsf = !for_test;
        self.q = 0;
        self.busy = true;
    }

    fn apply_icw(&mut self, w: Word) {
        self.varf = bit_test(w, 3);
        self.salf = bit_test(w, 4);
        self.msff = bit_test(w, 5);
        self.r = field_isolate(w, 6, 9) as u16;
        self.n = field_isolate(w, 15, 4) as u8;
        self.m = field_isolate(w, 33, 15) as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::central::make_data_descriptor;

    #[test]
    fn mscw_roundtrip() {
        let w = build_mscw_word(0o123, true, false, 0o12345);
        assert!(base::word::is_control_word(w));
        assert_eq!(mscw_r(w), 0o123);
        assert!(mscw_msff(w));
        assert!(!mscw_salf(w));
        assert_eq!(mscw_f(w), 0o12345);
    }

    #[test]
    fn rcw_roundtrip() {
        let w = build_rcw_word(0o23456, 2, 0o11111, 5, 3, 6, 1, true);
        let (c, l, f, g, h, k, v, dc) = apply_rcw_fields(w);
        assert_eq!((c, l, f, g, h, k, v, dc), (0o23456, 2, 0o11111, 5, 3, 6, 1, true));
    }

    #[test]
    fn mark_then_exit_restores_caller_frame() {
        let (mut cc, mut p) = machine();
        p.r = 0o40;
        p.salf = false;
        p.f = 0o2000;
        p.c = 0o500;
        p.l = 1;
        p.mark_stack(&mut cc);
        assert!(p.msff);
        let frame = p.f;
        assert_eq!(frame, p.s);
        // push an argument, then enter
        p.push(&mut cc, 42);
        let target = super::super::make_program_descriptor(0o600, false, true);
        p.enter_subroutine(&mut cc, target, false);
        assert_eq!((p.c, p.l), (0o600, 0));
        assert!(p.salf);
        assert!(!p.msff);
        // and exit; the return point is the syllable after the call
        p.exit_subroutine(&mut cc, None, false);
        assert_eq!((p.c, p.l), (0o500, 2));
        assert_eq!(p.f, 0o2000);
        assert_eq!(p.r, 0o40);
        assert!(!p.salf);
        // stack cut back below the mark word
        assert_eq!(p.s, frame - 1);
    }

    #[test]
    fn exit_with_result_pushes_value() {
        let (mut cc, mut p) = machine();
        p.f = 0o2000;
        p.mark_stack(&mut cc);
        let target = super::super::make_program_descriptor(0o600, false, true);
        p.enter_subroutine(&mut cc, target, false);
        p.exit_subroutine(&mut cc, Some(base::word::make_operand(false, 0, 7)), false);
        assert!(p.arof);
        assert_eq!(base::word::mantissa(p.a), 7);
    }

    #[test]
    fn exit_on_non_control_word_raises_flag_interrupt() {
        let (mut cc, mut p) = machine();
        normal_state(&mut p);
        p.f = 0o2100;
        p.store_word(&mut cc, 0o2100, 0); // not a control word
        p.exit_subroutine(&mut cc, None, false);
        assert_ne!(
            cc.processor_irq(crate::central::ProcessorRole::Control) & IRQ_FLAG_BIT,
            0
        );
    }

    #[test]
    fn index_descriptor_checks_bounds() {
        let (mut cc, mut p) = machine();
        normal_state(&mut p);
        let d = make_data_descriptor(0o4000, 10);
        let idx = base::word::make_operand(false, 0, 3);
        let indexed = p.index_descriptor(&mut cc, d, idx).unwrap();
        assert_eq!(base::word::address_field(indexed), 0o4003);
        assert_eq!(base::word::size_field(indexed), 0);

        let bad = base::word::make_operand(false, 0, 10);
        assert!(p.index_descriptor(&mut cc, d, bad).is_none());
        assert_ne!(
            cc.processor_irq(crate::central::ProcessorRole::Control) & IRQ_INVALID_INDEX,
            0
        );
    }

    #[test]
    fn store_for_interrupt_then_initiate_roundtrips_registers() {
        let (mut cc, mut p) = machine();
        p.ncsf = true;
        p.c = 0o1234;
        p.l = 2;
        p.f = 0o2345;
        p.r = 0o55;
        p.m = 0o3456;
        p.n = 5;
        p.salf = true;
        p.varf = true;
        p.push(&mut cc, 0o111);
        p.push(&mut cc, 0o222);
        p.store_for_interrupt(&mut cc);
        assert!(!p.ncsf);
        // scramble, then restore
        p.c = 0;
        p.l = 0;
        p.f = 0;
        p.r = 0;
        p.m = 0;
        p.salf = false;
        p.varf = false;
        p.arof = false;
        p.brof = false;
        p.initiate(&mut cc, false);
        assert!(p.ncsf);
        assert_eq!((p.c, p.l), (0o1234, 2));
        assert_eq!(p.f, 0o2345);
        assert_eq!(p.r, 0o55);
        assert_eq!(p.m, 0o3456);
        assert_eq!(p.n, 5);
        assert!(p.salf);
        assert!(p.varf);
        assert!(p.arof);
        assert!(p.brof);
        assert_eq!(p.a, 0o222);
        assert_eq!(p.b, 0o111);
    }

    #[test]
    fn character_mode_chain_preserves_both_pointers() {
        let (mut cc, mut p) = machine();
        p.ncsf = true;
        p.cwmf = true;
        p.f = 0o2345; // stack resumes here
        p.m = 0o4000;
        p.g = 3;
        p.h = 2;
        p.s = 0o5000; // destination pointer
        p.k = 6;
        p.v = 1;
        p.x = 0o1234567;
        p.store_for_interrupt(&mut cc);
        p.m = 0;
        p.s = 0;
        p.x = 0;
        p.g = 0;
        p.k = 0;
        p.initiate(&mut cc, false);
        assert!(p.cwmf);
        assert_eq!((p.m, p.g, p.h), (0o4000, 3, 2));
        assert_eq!((p.s, p.k, p.v), (0o5000, 6, 1));
        assert_eq!(p.x, 0o1234567);
    }
}
