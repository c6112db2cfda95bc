//! One processor: the register file, the two-register stack cache,
//! the syllable sequencing loop and the memory interface.
//!
//! A processor owns no memory and no interrupt register; every access
//! goes through [`CentralControl`] via an [`Accessor`] packet, and
//! interrupt bits are set in Central Control where the arbitration
//! happens.  The operator families themselves live in the sibling
//! modules (`word_mode`, `char_mode`, `arith`, `linkage`); this module
//! holds everything they share.

mod arith;
mod char_mode;
mod linkage;
pub(crate) mod word_mode;

use serde::Serialize;
use tracing::{event, Level};

use base::{field_isolate, Syllable, Word};

use crate::central::{
    Accessor, CentralControl, ProcessorRole, ProcessorUnit, Requestor, IRQ_INVALID_ADDRESS,
    IRQ_PARITY, IRQ_STACK_OVERFLOW, LOAD_ADDRESS,
};

pub(crate) use linkage::mscw_f;

/// Tag bit distinguishing program descriptors from data descriptors.
pub const PROGRAM_BIT: u8 = 3;

/// Builds a present program descriptor for code starting at `addr`.
/// `char_mode` sets the mode bit (entry in character mode) and
/// `argument` the argument bit (a stack frame was marked for the
/// call).
pub fn make_program_descriptor(addr: u16, char_mode: bool, argument: bool) -> Word {
    let mut w = 0;
    w = base::bit_set(w, base::word::FLAG_BIT);
    w = base::bit_set(w, base::word::PRESENCE_BIT);
    w = base::bit_set(w, PROGRAM_BIT);
    if char_mode {
        w = base::bit_set(w, base::word::MODE_BIT);
    }
    if argument {
        w = base::bit_set(w, base::word::ARGUMENT_BIT);
    }
    base::word::set_address_field(w, addr)
}

pub fn is_program_descriptor(w: Word) -> bool {
    base::word::is_control_word(w) && base::bit_test(w, PROGRAM_BIT)
}

/// Register values for dumps and diagnostics.
#[derive(Debug, Serialize)]
pub struct ProcessorSnapshot {
    pub unit: ProcessorUnit,
    pub busy: bool,
    pub a: String,
    pub arof: bool,
    pub b: String,
    pub brof: bool,
    pub x: String,
    pub c: u16,
    pub l: u8,
    pub m: u16,
    pub s: u16,
    pub f: u16,
    pub r: u16,
    pub g: u8,
    pub h: u8,
    pub k: u8,
    pub v: u8,
    pub n: u8,
    pub y: u8,
    pub z: u8,
    pub t: u16,
    pub trof: bool,
    pub cwmf: bool,
    pub ncsf: bool,
    pub salf: bool,
    pub msff: bool,
    pub varf: bool,
    pub cycles: u64,
}

#[derive(Debug)]
pub struct Processor {
    pub(crate) unit: ProcessorUnit,

    // Top-of-stack cache and extension
    pub(crate) a: Word,
    pub(crate) arof: bool,
    pub(crate) b: Word,
    pub(crate) brof: bool,
    pub(crate) x: Word,

    // Character work registers
    pub(crate) y: u8,
    pub(crate) z: u8,

    // Program pointer and buffer
    pub(crate) c: u16,
    pub(crate) l: u8,
    pub(crate) p: Word,
    pub(crate) prof: bool,
    pub(crate) t: Syllable,
    pub(crate) trof: bool,

    // Address registers.  In character mode M/G/H form the source
    // pointer and S/K/V the destination pointer.
    pub(crate) m: u16,
    pub(crate) g: u8,
    pub(crate) h: u8,
    pub(crate) s: u16,
    pub(crate) k: u8,
    pub(crate) v: u8,
    pub(crate) f: u16,
    pub(crate) r: u16,
    pub(crate) n: u8,

    // Mode flip-flops
    pub(crate) cwmf: bool,
    pub(crate) ncsf: bool,
    pub(crate) salf: bool,
    pub(crate) msff: bool,
    pub(crate) varf: bool,

    // Miscellaneous flip-flops; bit 0 marks an unstored destination
    // buffer word in character mode.
    pub(crate) q: u16,

    pub(crate) busy: bool,
    /// Set by any operator that assigned C/L itself, so the sequencing
    /// logic does not advance past the target.
    pub(crate) branched: bool,
    /// A repeat-field override latched by the call-repeat-field
    /// operator for the next character-mode syllable.
    pub(crate) crf_repeat: Option<u8>,

    cycles: u64,
}

impl Processor {
    pub fn new(unit: ProcessorUnit) -> Processor {
        Processor {
            unit,
            a: 0,
            arof: false,
            b: 0,
            brof: false,
            x: 0,
            y: 0,
            z: 0,
            c: 0,
            l: 0,
            p: 0,
            prof: false,
            t: Syllable::default(),
            trof: false,
            m: 0,
            g: 0,
            h: 0,
            s: 0,
            k: 0,
            v: 0,
            f: 0,
            r: 0,
            n: 0,
            cwmf: false,
            ncsf: false,
            salf: false,
            msff: false,
            varf: false,
            q: 0,
            busy: false,
            branched: false,
            crf_repeat: None,
            cycles: 0,
        }
    }

    /// Console CLEAR: every register and flip-flop to zero, processor
    /// stopped.
    pub fn clear(&mut self) {
        let unit = self.unit;
        *self = Processor::new(unit);
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn stop(&mut self) {
        self.busy = false;
    }

    pub fn unit(&self) -> ProcessorUnit {
        self.unit
    }

    /// Presets the processor to run the bootstrap block just read into
    /// low memory.  The bootstrap runs in control state with its stack
    /// above the protected region.
    pub fn start_at_load_address(&mut self) {
        self.c = LOAD_ADDRESS;
        self.l = 0;
        self.s = 0o100;
        self.f = 0o100;
        self.r = 0;
        self.prof = false;
        self.trof = false;
        self.arof = false;
        self.brof = false;
        self.ncsf = false;
        self.cwmf = false;
        self.salf = false;
        self.msff = false;
        self.branched = false;
        self.busy = true;
    }

    pub fn snapshot(&self) -> ProcessorSnapshot {
        ProcessorSnapshot {
            unit: self.unit,
            busy: self.busy,
            a: base::word::octal(self.a),
            arof: self.arof,
            b: base::word::octal(self.b),
            brof: self.brof,
            x: base::word::octal(self.x),
            c: self.c,
            l: self.l,
            m: self.m,
            s: self.s,
            f: self.f,
            r: self.r,
            g: self.g,
            h: self.h,
            k: self.k,
            v: self.v,
            n: self.n,
            y: self.y,
            z: self.z,
            t: self.t.bits(),
            trof: self.trof,
            cwmf: self.cwmf,
            ncsf: self.ncsf,
            salf: self.salf,
            msff: self.msff,
            varf: self.varf,
            cycles: self.cycles,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn requestor(&self) -> Requestor {
        Requestor::Processor(self.unit)
    }

    pub(crate) fn role(&self, cc: &CentralControl) -> ProcessorRole {
        cc.role_of(self.unit)
    }

    /// Raises a syllable-dependent interrupt condition.  Suppressed in
    /// control state: control-state code must not be interrupted by
    /// its own arithmetic.
    pub(crate) fn interrupt(&mut self, cc: &mut CentralControl, bits: u16) {
        if self.ncsf {
            let role = self.role(cc);
            event!(
                Level::DEBUG,
                "processor {:?} interrupt condition {:#04x}",
                self.unit,
                bits
            );
            cc.set_processor_irq(role, bits);
        }
    }

    // ------------------------------------------------------------------
    // Memory interface

    pub(crate) fn fetch_word(&mut self, cc: &mut CentralControl, addr: u16) -> Option<Word> {
        self.cycles += 1;
        let mut acc = Accessor::new(self.requestor(), addr, self.ncsf);
        cc.fetch(&mut acc);
        if acc.address_error {
            let role = self.role(cc);
            cc.set_processor_irq(role, IRQ_INVALID_ADDRESS);
            None
        } else if acc.parity_error {
            let role = self.role(cc);
            cc.set_processor_irq(role, IRQ_PARITY);
            None
        } else {
            Some(acc.word)
        }
    }

    pub(crate) fn store_word(&mut self, cc: &mut CentralControl, addr: u16, word: Word) -> bool {
        self.cycles += 1;
        let mut acc = Accessor::new(self.requestor(), addr, self.ncsf);
        acc.word = word;
        cc.store(&mut acc);
        if acc.address_error {
            let role = self.role(cc);
            cc.set_processor_irq(role, IRQ_INVALID_ADDRESS);
            false
        } else {
            true
        }
    }

    /// Stores a word with the low-memory protection lifted, for the
    /// operators whose whole purpose is handing a word to supervisor
    /// cells below the protected bound.
    pub(crate) fn store_word_unprotected(
        &mut self,
        cc: &mut CentralControl,
        addr: u16,
        word: Word,
    ) -> bool {
        self.cycles += 1;
        let mut acc = Accessor::new(self.requestor(), addr, false);
        acc.word = word;
        cc.store(&mut acc);
        if acc.address_error {
            let role = self.role(cc);
            cc.set_processor_irq(role, IRQ_INVALID_ADDRESS);
            false
        } else {
            true
        }
    }

    // ------------------------------------------------------------------
    // Stack adjustments
    //
    // A is the top of stack when AROF is set, B the word below it when
    // BROF is set; the rest of the stack is in memory ending at S.

    fn check_stack_overflow(&mut self, cc: &mut CentralControl) {
        // Gating on normal state lets control-state code build stacks
        // anywhere.
        if (self.s >> 6) == self.r && self.ncsf {
            let role = self.role(cc);
            cc.set_processor_irq(role, IRQ_STACK_OVERFLOW);
        }
    }

    /// Pushes a word onto the in-memory stack, bypassing the A/B cache.
    pub(crate) fn push_raw(&mut self, cc: &mut CentralControl, word: Word) {
        self.check_stack_overflow(cc);
        self.s = (self.s + 1) & 0o77777;
        self.store_word(cc, self.s, word);
    }

    pub(crate) fn pop_raw(&mut self, cc: &mut CentralControl) -> Option<Word> {
        let word = self.fetch_word(cc, self.s);
        self.s = self.s.wrapping_sub(1) & 0o77777;
        word
    }

    /// Makes A empty so a new top-of-stack word can be loaded into it.
    pub(crate) fn adjust_a_empty(&mut self, cc: &mut CentralControl) {
        if self.arof {
            if self.brof {
                self.push_raw(cc, self.b);
            }
            self.b = self.a;
            self.brof = true;
            self.arof = false;
        }
    }

    /// Makes A hold the top-of-stack word.
    pub(crate) fn adjust_a_full(&mut self, cc: &mut CentralControl) {
        if !self.arof {
            if self.brof {
                self.a = self.b;
                self.brof = false;
            } else if let Some(w) = self.pop_raw(cc) {
                self.a = w;
            } else {
                self.a = 0;
            }
            self.arof = true;
        }
    }

    pub(crate) fn adjust_b_empty(&mut self, cc: &mut CentralControl) {
        if self.brof {
            self.push_raw(cc, self.b);
            self.brof = false;
        }
    }

    pub(crate) fn adjust_b_full(&mut self, cc: &mut CentralControl) {
        if !self.brof {
            self.b = self.pop_raw(cc).unwrap_or(0);
            self.brof = true;
        }
    }

    pub(crate) fn adjust_ab_full(&mut self, cc: &mut CentralControl) {
        self.adjust_a_full(cc);
        self.adjust_b_full(cc);
    }

    pub(crate) fn adjust_ab_empty(&mut self, cc: &mut CentralControl) {
        self.adjust_b_empty(cc);
        if self.arof {
            self.push_raw(cc, self.a);
            self.arof = false;
        }
    }

    /// Exchanges the two top-of-stack words.
    pub(crate) fn exchange_tos(&mut self, cc: &mut CentralControl) {
        self.adjust_ab_full(cc);
        std::mem::swap(&mut self.a, &mut self.b);
    }

    /// Pushes `word` as the new top of stack.
    pub(crate) fn push(&mut self, cc: &mut CentralControl, word: Word) {
        self.adjust_a_empty(cc);
        self.a = word;
        self.arof = true;
    }

    // ------------------------------------------------------------------
    // Relative addressing
    //
    // A 10-bit address couplet is interpreted against the program and
    // stack base registers when the subroutine flip-flop is set:
    // the top octal digit selects the base and the remaining bits are
    // the offset.

    /// The frame base for F-relative couplets: while arguments are
    /// still being gathered (mark flip-flop set) the caller's frame is
    /// reached through the control word at R+7.
    fn f_base(&mut self, cc: &mut CentralControl) -> u16 {
        if self.msff {
            match self.fetch_word(cc, (self.r << 6) + 7) {
                Some(w) => mscw_f(w),
                None => self.f,
            }
        } else {
            self.f
        }
    }

    /// Resolves a 10-bit address couplet to a memory address.
    /// `code_relative_ok` is set for operand/descriptor calls, which
    /// may address relative to the program word; stores may not.
    pub(crate) fn relative_addr(
        &mut self,
        cc: &mut CentralControl,
        offset: u16,
        code_relative_ok: bool,
    ) -> u16 {
        let offset = offset & 0o1777;
        if !self.salf {
            return ((self.r << 6) + offset) & 0o77777;
        }
        match offset >> 7 {
            0..=3 => ((self.r << 6) + (offset & 0o777)) & 0o77777,
            4 | 5 => (self.f_base(cc) + (offset & 0o377)) & 0o77777,
            6 => {
                if code_relative_ok {
                    (self.c + (offset & 0o177)) & 0o77777
                } else {
                    (self.f_base(cc) + (offset & 0o177)) & 0o77777
                }
            }
            _ => self.f_base(cc).wrapping_sub(offset & 0o177) & 0o77777,
        }
    }

    // ------------------------------------------------------------------
    // Syllable sequencing

    fn load_p(&mut self, cc: &mut CentralControl) {
        if let Some(w) = self.fetch_word(cc, self.c) {
            self.p = w;
            self.prof = true;
        }
    }

    /// Loads the syllable at C/L into T.  Never advances the pointer;
    /// that happens at syllable-complete time.
    fn fetch_syllable(&mut self, cc: &mut CentralControl) {
        if !self.prof {
            self.load_p(cc);
            if !self.prof {
                // Code stream unreachable; nothing sane to execute.
                self.busy = false;
                return;
            }
        }
        self.t = Syllable::of_word(self.p, self.l);
        self.trof = true;
    }

    /// Advances C/L to the next syllable.
    pub(crate) fn advance(&mut self) {
        if self.l == 3 {
            self.l = 0;
            self.c = (self.c + 1) & 0o77777;
            self.prof = false;
        } else {
            self.l += 1;
        }
    }

    /// Repositions the program pointer to an absolute syllable count.
    pub(crate) fn jump_to_syllable(&mut self, total: u32) {
        self.c = ((total >> 2) & 0o77777) as u16;
        self.l = (total & 3) as u8;
        self.prof = false;
        self.trof = false;
        self.branched = true;
    }

    pub(crate) fn current_syllable_index(&self) -> u32 {
        (self.c as u32) << 2 | self.l as u32
    }

    fn interrupt_pending(&self, cc: &CentralControl) -> bool {
        match self.role(cc) {
            ProcessorRole::Control => cc.interrupt_address() != 0,
            ProcessorRole::Slave => {
                cc.processor_irq(ProcessorRole::Slave) != 0 || cc.halt_p2_requested()
            }
        }
    }

    /// Syllable Execution Complete: decide what runs next.  A pending
    /// interrupt in normal state injects a store-for-interrupt
    /// syllable in place of the next fetch.
    fn secl(&mut self, cc: &mut CentralControl) {
        if self.trof {
            // An operator already injected the next syllable.
            return;
        }
        if !self.branched {
            self.advance();
        }
        self.branched = false;
        if self.ncsf && self.interrupt_pending(cc) {
            self.t = Syllable::operator(word_mode::FAMILY_CONTROL, word_mode::CONTROL_SFI);
            self.trof = true;
            return;
        }
        self.fetch_syllable(cc);
    }

    /// Runs until the processor halts or `cycle_limit` cycles have
    /// been consumed.  The limit is checked before each syllable, so a
    /// multi-cycle syllable may overrun; the overrun is reported in
    /// the return value and absorbed by the caller's accounting.
    pub fn run(&mut self, cc: &mut CentralControl, cycle_limit: u64) -> u64 {
        let start = self.cycles;
        while self.busy && self.cycles - start < cycle_limit {
            if !self.trof {
                self.fetch_syllable(cc);
                if !self.trof {
                    break;
                }
            }
            self.cycles += 1;
            let syllable = self.t;
            self.trof = false;
            self.execute(cc, syllable);
            if self.busy {
                self.secl(cc);
            }
        }
        self.cycles - start
    }

    fn execute(&mut self, cc: &mut CentralControl, syllable: Syllable) {
        if self.cwmf {
            self.execute_char(cc, syllable);
        } else {
            self.execute_word(cc, syllable);
        }
    }

    /// Loads the word addressed by an operand-call couplet and, when
    /// it names a present descriptor, resolves it: data descriptors
    /// load the word they address, program descriptors are entered as
    /// accidental subroutine calls.
    pub(crate) fn operand_call(&mut self, cc: &mut CentralControl, offset: u16) {
        self.adjust_a_empty(cc);
        let addr = self.relative_addr(cc, offset, true);
        self.m = addr;
        let Some(word) = self.fetch_word(cc, addr) else {
            return;
        };
        self.a = word;
        self.arof = true;
        if base::word::is_control_word(word) {
            self.resolve_operand(cc);
        }
    }

    /// Resolution step shared by operand calls and the construct-call
    /// operators: A holds a control word.
    pub(crate) fn resolve_operand(&mut self, cc: &mut CentralControl) {
        let word = self.a;
        if !base::word::is_present(word) {
            self.interrupt(cc, crate::central::IRQ_PRESENCE);
            return;
        }
        if is_program_descriptor(word) {
            self.arof = false;
            self.enter_subroutine(cc, word, false);
        } else {
            let target = base::word::address_field(word);
            self.m = target;
            if let Some(value) = self.fetch_word(cc, target) {
                self.a = value;
                self.arof = true;
            } else {
                self.arof = false;
            }
        }
    }

    /// Converts an address couplet into a present data descriptor on
    /// the stack; a present program descriptor at that address is
    /// entered instead (a descriptor call).
    pub(crate) fn descriptor_call(&mut self, cc: &mut CentralControl, offset: u16) {
        self.adjust_a_empty(cc);
        let addr = self.relative_addr(cc, offset, true);
        self.m = addr;
        let Some(word) = self.fetch_word(cc, addr) else {
            return;
        };
        if is_program_descriptor(word) {
            if base::word::is_present(word) {
                self.enter_subroutine(cc, word, true);
            } else {
                self.a = word;
                self.arof = true;
                self.interrupt(cc, crate::central::IRQ_PRESENCE);
            }
        } else {
            self.a = crate::central::make_data_descriptor(addr, 0);
            self.arof = true;
        }
    }

    /// Character value of the word currently in A at character
    /// position `pos` (0 is the leftmost of the eight characters).
    pub(crate) fn char_of(word: Word, pos: u8) -> u8 {
        field_isolate(word, pos * 6, 6) as u8
    }
}
