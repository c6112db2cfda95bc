//! Central Control: the hub which connects the processors, the
//! memory modules and the I/O units.
//!
//! Central Control owns the core memory (up to eight modules of 4096
//! words each) and arbitrates every access to it.  It also owns the
//! whole interrupt network: the fourteen machine-condition flip-flops,
//! the per-processor interrupt registers, and the interrupt address
//! register which names the single highest-priority pending interrupt
//! vector.  Keeping the interrupt registers of both processors here
//! (rather than inside the processor structs) mirrors the arbitration
//! role of the real unit and lets either processor raise a condition
//! the other will service.

use std::time::Duration;

use serde::Serialize;
use tracing::{event, Level};

use base::{bit_set, field_isolate, Word, WORD_MASK};

/// Words in one core memory module.
pub const MODULE_WORDS: usize = 4096;
/// Number of module slots (addressed by the top 3 bits of an address).
pub const MODULE_COUNT: usize = 8;

/// Addresses below this bound are refused to normal-state requests
/// when the memory protect switch is on.
pub const PROTECTED_BOUND: u16 = 0o1000;

/// Memory cell used to exchange the Initiate Control Word between a
/// processor storing its state and the processor (re)initiating it.
/// The same cell carries the address of an I/O descriptor when an
/// initiate-I/O operator runs; the supervisor program coordinates the
/// two uses.
pub const EXCHANGE_CELL: u16 = 0o10;
/// Cell used by the communicate operator to pass a word to the
/// supervisor, and by program-release to pass an address.
pub const COMMUNICATE_CELL: u16 = 0o11;
/// First of four cells receiving I/O result descriptors (one per
/// I/O unit).
pub const IO_RESULT_CELL: u16 = 0o14;
/// A successful load reads the bootstrap block to this address and
/// starts processor 1 there.
pub const LOAD_ADDRESS: u16 = 0o20;

/// Interval timer period: the 6-bit timer increments 60 times per
/// simulated second.
pub const TIMER_PERIOD: Duration = Duration::from_nanos(16_666_667);

/// Processor interrupt register bits (syllable-independent).
pub const IRQ_PARITY: u16 = 0x01;
pub const IRQ_INVALID_ADDRESS: u16 = 0x02;
pub const IRQ_STACK_OVERFLOW: u16 = 0x04;
/// Syllable-dependent conditions live in the high nibble; the vector
/// is `(irq >> 4) + 0o60` for processor 1 (`+ 0o40` for processor 2).
pub const IRQ_COMMUNICATE: u16 = 0x40;
pub const IRQ_PROGRAM_RELEASE: u16 = 0x50;
pub const IRQ_CONTINUITY: u16 = 0x60;
pub const IRQ_PRESENCE: u16 = 0x70;
pub const IRQ_FLAG_BIT: u16 = 0x80;
pub const IRQ_INVALID_INDEX: u16 = 0x90;
pub const IRQ_EXPONENT_UNDERFLOW: u16 = 0xA0;
pub const IRQ_EXPONENT_OVERFLOW: u16 = 0xB0;
pub const IRQ_INTEGER_OVERFLOW: u16 = 0xC0;
pub const IRQ_DIVIDE_BY_ZERO: u16 = 0xD0;

/// Interrupt vectors raised by Central Control conditions.
pub const VECTOR_P2_BUSY: u8 = 0o20;
pub const VECTOR_INQUIRY: u8 = 0o21;
pub const VECTOR_TIMER: u8 = 0o22;
pub const VECTOR_IO_BUSY: u8 = 0o23;
pub const VECTOR_KEYBOARD: u8 = 0o24;
pub const VECTOR_PRINTER_1: u8 = 0o25;
pub const VECTOR_PRINTER_2: u8 = 0o26;
pub const VECTOR_IO_1_FINISHED: u8 = 0o27;
pub const VECTOR_IO_2_FINISHED: u8 = 0o30;
pub const VECTOR_IO_3_FINISHED: u8 = 0o31;
pub const VECTOR_IO_4_FINISHED: u8 = 0o32;
pub const VECTOR_SPECIAL_1: u8 = 0o33;
pub const VECTOR_DISK_1_CHECK: u8 = 0o34;
pub const VECTOR_DISK_2_CHECK: u8 = 0o35;

/// Base vectors for per-processor conditions; the three
/// syllable-independent bits map to base+0..base+2 and the
/// syllable-dependent nibble to base+4..base+15.
pub const VECTOR_P2_BASE: u8 = 0o40;
pub const VECTOR_P1_BASE: u8 = 0o60;

/// The two physical processor cabinets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessorUnit {
    A,
    B,
}

/// Role a processor is currently wired into: exactly one processor is
/// the control processor (processor 1) at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessorRole {
    Control,
    Slave,
}

impl ProcessorRole {
    fn index(self) -> usize {
        match self {
            ProcessorRole::Control => 0,
            ProcessorRole::Slave => 1,
        }
    }
}

/// One of the four I/O exchange channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoChannel(pub u8); // 1..=4

impl IoChannel {
    fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

/// Identity of a unit requesting a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requestor {
    Processor(ProcessorUnit),
    Io(IoChannel),
}

impl Requestor {
    fn index(self) -> usize {
        match self {
            Requestor::Processor(ProcessorUnit::A) => 0,
            Requestor::Processor(ProcessorUnit::B) => 1,
            Requestor::Io(ch) => 2 + ch.index(),
        }
    }
}

const REQUESTOR_COUNT: usize = 6;

/// A memory exchange packet.  The requestor fills in its identity,
/// the address, the word (for a store) and whether the access is
/// subject to the low-memory protection (i.e. it was issued from
/// normal state).  Central Control performs the transfer and reports
/// the outcome through the two error flags.
#[derive(Debug)]
pub struct Accessor {
    pub requestor: Requestor,
    pub addr: u16,
    pub word: Word,
    pub protected: bool,
    pub address_error: bool,
    pub parity_error: bool,
}

impl Accessor {
    pub fn new(requestor: Requestor, addr: u16, protected: bool) -> Accessor {
        Accessor {
            requestor,
            addr: addr & 0o77777,
            word: 0,
            protected: protected && (addr & 0o77777) < PROTECTED_BOUND,
            address_error: false,
            parity_error: false,
        }
    }
}

/// The fourteen machine-condition flip-flops, in interrupt-mask bit
/// order (bit 1 is `p2_busy`, bit 14 is `disk_2_check`).
#[derive(Debug, Default, Clone, Serialize)]
pub struct Conditions {
    pub p2_busy: bool,
    pub inquiry: bool,
    pub timer: bool,
    pub io_busy: bool,
    pub keyboard: bool,
    pub printer_1: bool,
    pub printer_2: bool,
    pub io_finished: [bool; 4],
    pub special_1: bool,
    pub disk_1_check: bool,
    pub disk_2_check: bool,
}

impl Conditions {
    fn mask_bit(vector: u8) -> u16 {
        match vector {
            VECTOR_P2_BUSY => 1 << 1,
            VECTOR_INQUIRY => 1 << 2,
            VECTOR_TIMER => 1 << 3,
            VECTOR_IO_BUSY => 1 << 4,
            VECTOR_KEYBOARD => 1 << 5,
            VECTOR_PRINTER_1 => 1 << 6,
            VECTOR_PRINTER_2 => 1 << 7,
            VECTOR_IO_1_FINISHED => 1 << 8,
            VECTOR_IO_2_FINISHED => 1 << 9,
            VECTOR_IO_3_FINISHED => 1 << 10,
            VECTOR_IO_4_FINISHED => 1 << 11,
            VECTOR_SPECIAL_1 => 1 << 12,
            VECTOR_DISK_1_CHECK => 1 << 13,
            VECTOR_DISK_2_CHECK => 1 << 14,
            _ => 0,
        }
    }
}

/// Pending work Central Control has asked the system driver to carry
/// out on its behalf (operations a processor initiated but which need
/// the peripheral units, owned elsewhere).
#[derive(Debug, Default)]
pub struct PendingRequests {
    /// I/O channel selected by an initiate-I/O operator; the driver
    /// must fetch the descriptor and start the device.
    pub io_start: Option<IoChannel>,
    /// A start-processor-2 operator ran; the driver must initiate the
    /// slave processor from the exchange cell.
    pub p2_start: bool,
}

/// Why a load request was refused, and the numeric code the operator
/// console reports for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailure {
    ProcessorBusy,
    ConsoleNotReady,
    CardNotReady,
    CardBusy,
    DiskNotReady,
    DiskBusy,
}

impl LoadFailure {
    pub fn code(self) -> u8 {
        match self {
            LoadFailure::ProcessorBusy => 1,
            LoadFailure::ConsoleNotReady => 2,
            LoadFailure::CardNotReady => 3,
            LoadFailure::CardBusy => 4,
            LoadFailure::DiskNotReady => 5,
            LoadFailure::DiskBusy => 6,
        }
    }
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let desc = match self {
            LoadFailure::ProcessorBusy => "processor 1 is busy",
            LoadFailure::ConsoleNotReady => "console printer is not ready",
            LoadFailure::CardNotReady => "card reader is not ready",
            LoadFailure::CardBusy => "card reader is busy",
            LoadFailure::DiskNotReady => "disk file is not ready",
            LoadFailure::DiskBusy => "disk file is busy",
        };
        f.write_str(desc)
    }
}

impl std::error::Error for LoadFailure {}

/// Which peripheral the console load switch selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadSelect {
    Card,
    Disk,
}

/// Registers and state of Central Control, for dumps.
#[derive(Debug, Serialize)]
pub struct CentralSnapshot {
    pub iar: u8,
    pub interrupt_mask: u16,
    pub interrupt_latch: u16,
    pub timer: u8,
    pub conditions: Conditions,
    pub p2_busy: bool,
    pub halt_p2: bool,
}

#[derive(Debug)]
pub struct CentralControl {
    modules: [Option<Vec<Word>>; MODULE_COUNT],
    /// Last-module-accessed display bits, one set per requestor.
    access_display: [u8; REQUESTOR_COUNT],
    memory_protect: bool,

    conditions: Conditions,
    interrupt_mask: u16,
    interrupt_latch: u16,
    /// Interrupt address register: the vector of the single pending
    /// interrupt, or zero.
    iar: u8,
    /// Per-role processor interrupt registers.
    irq: [u16; 2],

    /// Which physical processor is currently processor 1.
    control_unit: ProcessorUnit,
    p2_present: bool,
    p2_busy: bool,
    halt_p2: bool,
    p1_busy: bool,

    /// Peripheral ready-status bitmask, one bit per unit designate.
    unit_ready: u16,
    /// Per-channel busy flip-flops for the four I/O units.
    unit_busy: [bool; 4],
    /// Channels actually present in this configuration.
    unit_present: [bool; 4],

    timer: u8,
    timer_running: bool,
    timer_inhibit: bool,
    next_timer_tick: Duration,

    load_select: LoadSelect,
    pub requests: PendingRequests,

    // Two flip-flops of the original interlock whose purpose is not
    // fully understood; toggled at the points the hardware toggles
    // them and otherwise left alone.
    ccio_miscue_1: bool,
    ccio_miscue_2: bool,
}

impl CentralControl {
    /// Builds a Central Control with `module_count` populated memory
    /// modules and the given processor complement.
    pub fn new(module_count: usize, p2_present: bool, channels: usize) -> CentralControl {
        let mut modules: [Option<Vec<Word>>; MODULE_COUNT] = Default::default();
        for slot in modules.iter_mut().take(module_count.min(MODULE_COUNT)) {
            *slot = Some(vec![0; MODULE_WORDS]);
        }
        let mut unit_present = [false; 4];
        for present in unit_present.iter_mut().take(channels.min(4)) {
            *present = true;
        }
        CentralControl {
            modules,
            access_display: [0; REQUESTOR_COUNT],
            memory_protect: true,
            conditions: Conditions::default(),
            interrupt_mask: 0,
            interrupt_latch: 0,
            iar: 0,
            irq: [0, 0],
            control_unit: ProcessorUnit::A,
            p2_present,
            p2_busy: false,
            halt_p2: false,
            p1_busy: false,
            unit_ready: 0,
            unit_busy: [false; 4],
            unit_present,
            timer: 0,
            timer_running: false,
            timer_inhibit: false,
            next_timer_tick: TIMER_PERIOD,
            load_select: LoadSelect::Card,
            requests: PendingRequests::default(),
            ccio_miscue_1: false,
            ccio_miscue_2: false,
        }
    }

    /// The role the given physical processor currently plays.
    pub fn role_of(&self, unit: ProcessorUnit) -> ProcessorRole {
        if unit == self.control_unit {
            ProcessorRole::Control
        } else {
            ProcessorRole::Slave
        }
    }

    pub fn set_load_select(&mut self, select: LoadSelect) {
        self.load_select = select;
    }

    pub fn set_memory_protect(&mut self, on: bool) {
        self.memory_protect = on;
    }

    pub fn p2_present(&self) -> bool {
        self.p2_present
    }

    pub fn p2_busy(&self) -> bool {
        self.p2_busy
    }

    pub fn set_p2_busy(&mut self, busy: bool) {
        self.p2_busy = busy;
    }

    pub fn halt_p2_requested(&self) -> bool {
        self.halt_p2
    }

    pub fn interrupt_address(&self) -> u8 {
        self.iar
    }

    pub fn interrupt_mask(&self) -> u16 {
        self.interrupt_mask
    }

    /// Reads and resets the interrupt latch; this is the console
    /// "interrupt reset" action, the only thing that clears the latch.
    pub fn read_and_reset_latch(&mut self) -> u16 {
        std::mem::take(&mut self.interrupt_latch)
    }

    pub fn access_display(&self, requestor: Requestor) -> u8 {
        self.access_display[requestor.index()]
    }

    /// Performs a memory read described by `acc`.  On failure the word
    /// is left unchanged and an error flag is set; the requestor turns
    /// the flags into its own interrupt conditions.
    pub fn fetch(&mut self, acc: &mut Accessor) {
        let addr = (acc.addr & 0o77777) as usize;
        let module = addr >> 12;
        self.access_display[acc.requestor.index()] |= 1 << module;
        if self.memory_protect && acc.protected {
            acc.address_error = true;
            return;
        }
        match &self.modules[module] {
            Some(words) => {
                acc.word = words[addr & 0o7777];
                acc.address_error = false;
                acc.parity_error = false;
            }
            None => {
                event!(
                    Level::DEBUG,
                    "fetch from absent memory module {} (address {:05o})",
                    module,
                    addr
                );
                acc.address_error = true;
            }
        }
    }

    /// Performs a memory write described by `acc`.
    pub fn store(&mut self, acc: &mut Accessor) {
        let addr = (acc.addr & 0o77777) as usize;
        let module = addr >> 12;
        self.access_display[acc.requestor.index()] |= 1 << module;
        if self.memory_protect && acc.protected {
            acc.address_error = true;
            return;
        }
        match &mut self.modules[module] {
            Some(words) => {
                words[addr & 0o7777] = acc.word & WORD_MASK;
                acc.address_error = false;
                acc.parity_error = false;
            }
            None => {
                event!(
                    Level::DEBUG,
                    "store to absent memory module {} (address {:05o})",
                    module,
                    addr
                );
                acc.address_error = true;
            }
        }
    }

    /// Direct memory read for the driver and for dumps; absent modules
    /// read as None.
    pub fn read_raw(&self, addr: u16) -> Option<Word> {
        let addr = (addr & 0o77777) as usize;
        self.modules[addr >> 12]
            .as_ref()
            .map(|words| words[addr & 0o7777])
    }

    pub fn module_present(&self, module: usize) -> bool {
        module < MODULE_COUNT && self.modules[module].is_some()
    }

    /// Sets bits in a processor's interrupt register and re-evaluates
    /// the interrupt network.
    pub fn set_processor_irq(&mut self, role: ProcessorRole, bits: u16) {
        self.irq[role.index()] |= bits;
        self.signal_interrupt();
    }

    pub fn processor_irq(&self, role: ProcessorRole) -> u16 {
        self.irq[role.index()]
    }

    /// Condition setters used by peripherals and the driver.
    pub fn set_inquiry_request(&mut self) {
        self.conditions.inquiry = true;
        self.signal_interrupt();
    }

    pub fn set_keyboard_request(&mut self) {
        self.conditions.keyboard = true;
        self.signal_interrupt();
    }

    pub fn set_printer_finished(&mut self, printer: u8) {
        match printer {
            1 => self.conditions.printer_1 = true,
            _ => self.conditions.printer_2 = true,
        }
        self.signal_interrupt();
    }

    pub fn set_special_1(&mut self) {
        self.conditions.special_1 = true;
        self.signal_interrupt();
    }

    pub fn set_disk_check(&mut self, disk: u8) {
        match disk {
            1 => self.conditions.disk_1_check = true,
            _ => self.conditions.disk_2_check = true,
        }
        self.signal_interrupt();
    }

    /// An I/O unit completed the operation it was dispatched on.
    pub fn io_finished(&mut self, channel: IoChannel) {
        self.conditions.io_finished[channel.index()] = true;
        self.ccio_miscue_2 = !self.ccio_miscue_2;
        self.signal_interrupt();
    }

    /// Recomputes the interrupt address register: scans every pending
    /// condition in descending priority and records the vector of the
    /// highest one.  Called every time any condition changes.
    pub fn signal_interrupt(&mut self) {
        let p1 = self.irq[ProcessorRole::Control.index()];
        let p2 = self.irq[ProcessorRole::Slave.index()];
        let c = &self.conditions;
        let vector = if p1 & IRQ_PARITY != 0 {
            VECTOR_P1_BASE
        } else if p1 & IRQ_INVALID_ADDRESS != 0 {
            VECTOR_P1_BASE + 1
        } else if c.timer {
            VECTOR_TIMER
        } else if c.io_busy {
            VECTOR_IO_BUSY
        } else if c.keyboard {
            VECTOR_KEYBOARD
        } else if c.io_finished[0] {
            VECTOR_IO_1_FINISHED
        } else if c.io_finished[1] {
            VECTOR_IO_2_FINISHED
        } else if c.io_finished[2] {
            VECTOR_IO_3_FINISHED
        } else if c.io_finished[3] {
            VECTOR_IO_4_FINISHED
        } else if c.printer_1 {
            VECTOR_PRINTER_1
        } else if c.printer_2 {
            VECTOR_PRINTER_2
        } else if c.p2_busy {
            VECTOR_P2_BUSY
        } else if c.inquiry {
            VECTOR_INQUIRY
        } else if c.special_1 {
            VECTOR_SPECIAL_1
        } else if c.disk_1_check {
            VECTOR_DISK_1_CHECK
        } else if c.disk_2_check {
            VECTOR_DISK_2_CHECK
        } else if p1 & IRQ_STACK_OVERFLOW != 0 {
            VECTOR_P1_BASE + 2
        } else if p1 & 0xF0 != 0 {
            (p1 >> 4) as u8 + VECTOR_P1_BASE
        } else if self.p2_present && !self.p2_busy {
            // Slave-processor conditions wait until it stops running.
            if p2 & IRQ_PARITY != 0 {
                VECTOR_P2_BASE
            } else if p2 & IRQ_INVALID_ADDRESS != 0 {
                VECTOR_P2_BASE + 1
            } else if p2 & IRQ_STACK_OVERFLOW != 0 {
                VECTOR_P2_BASE + 2
            } else if p2 & 0xF0 != 0 {
                (p2 >> 4) as u8 + VECTOR_P2_BASE
            } else {
                0
            }
        } else {
            0
        };
        if vector != self.iar {
            event!(Level::TRACE, "interrupt address register -> {:02o}", vector);
        }
        self.iar = vector;
        let bit = Conditions::mask_bit(vector);
        self.interrupt_mask |= bit;
        self.interrupt_latch |= bit;
    }

    /// Resets the flip-flop behind the current interrupt vector and
    /// re-evaluates the network, exposing any lower-priority pending
    /// condition.  Called by the processor when it accepts the
    /// interrupt.
    pub fn clear_interrupt(&mut self) {
        let vector = self.iar;
        self.interrupt_mask &= !Conditions::mask_bit(vector);
        match vector {
            0 => (),
            VECTOR_P2_BUSY => self.conditions.p2_busy = false,
            VECTOR_INQUIRY => self.conditions.inquiry = false,
            VECTOR_TIMER => self.conditions.timer = false,
            VECTOR_IO_BUSY => self.conditions.io_busy = false,
            VECTOR_KEYBOARD => self.conditions.keyboard = false,
            VECTOR_PRINTER_1 => self.conditions.printer_1 = false,
            VECTOR_PRINTER_2 => self.conditions.printer_2 = false,
            VECTOR_IO_1_FINISHED..=VECTOR_IO_4_FINISHED => {
                let ch = (vector - VECTOR_IO_1_FINISHED) as usize;
                self.conditions.io_finished[ch] = false;
                self.unit_busy[ch] = false;
            }
            VECTOR_SPECIAL_1 => self.conditions.special_1 = false,
            VECTOR_DISK_1_CHECK => self.conditions.disk_1_check = false,
            VECTOR_DISK_2_CHECK => self.conditions.disk_2_check = false,
            v if v >= VECTOR_P1_BASE => {
                self.irq[ProcessorRole::Control.index()] =
                    Self::drop_irq_bits(self.irq[ProcessorRole::Control.index()], v - VECTOR_P1_BASE);
            }
            v if v >= VECTOR_P2_BASE => {
                self.irq[ProcessorRole::Slave.index()] =
                    Self::drop_irq_bits(self.irq[ProcessorRole::Slave.index()], v - VECTOR_P2_BASE);
            }
            _ => (),
        }
        self.iar = 0;
        self.signal_interrupt();
    }

    fn drop_irq_bits(irq: u16, offset: u8) -> u16 {
        match offset {
            0 => irq & !IRQ_PARITY,
            1 => irq & !IRQ_INVALID_ADDRESS,
            2 => irq & !IRQ_STACK_OVERFLOW,
            _ => irq & 0x0F,
        }
    }

    /// Selects an I/O unit for an initiate-I/O operator: the first
    /// present, non-busy channel in fixed order.  When every channel
    /// is busy the I/O-busy interrupt is raised instead.
    pub fn initiate_io(&mut self) {
        for (i, (&present, busy)) in self
            .unit_present
            .iter()
            .zip(self.unit_busy.iter_mut())
            .enumerate()
        {
            if present && !*busy {
                *busy = true;
                let channel = IoChannel(i as u8 + 1);
                event!(Level::DEBUG, "initiate I/O on channel {}", channel.0);
                self.ccio_miscue_1 = !self.ccio_miscue_1;
                self.requests.io_start = Some(channel);
                return;
            }
        }
        self.conditions.io_busy = true;
        self.signal_interrupt();
    }

    /// Returns the number of the first free I/O channel, or zero when
    /// all are busy; this is what the interrogate-I/O-channel operator
    /// pushes.
    pub fn interrogate_io_channel(&self) -> u8 {
        for (i, (&present, &busy)) in self.unit_present.iter().zip(self.unit_busy.iter()).enumerate()
        {
            if present && !busy {
                return i as u8 + 1;
            }
        }
        0
    }

    pub fn channel_busy(&self, channel: IoChannel) -> bool {
        self.unit_busy[channel.index()]
    }

    /// Ready-status change reported by a peripheral unit; `bit` is the
    /// unit's position in the interrogate mask.
    pub fn set_unit_ready(&mut self, bit: u8, ready: bool) {
        if ready {
            self.unit_ready |= 1 << bit;
        } else {
            self.unit_ready &= !(1 << bit);
        }
    }

    /// The word pushed by the interrogate-unit-status operator.
    pub fn unit_ready_mask(&self) -> u16 {
        self.unit_ready
    }

    /// Requests that the slave processor start.  If there is no slave
    /// or it is already running the processor-2-busy interrupt is
    /// raised instead.
    pub fn initiate_p2(&mut self) {
        if !self.p2_present || self.p2_busy {
            self.conditions.p2_busy = true;
            self.signal_interrupt();
        } else {
            self.p2_busy = true;
            self.requests.p2_start = true;
        }
    }

    /// Latches a halt request for the slave processor; it honours the
    /// request at its next syllable boundary.
    pub fn halt_p2(&mut self) {
        if self.p2_present && self.p2_busy {
            self.halt_p2 = true;
        }
    }

    /// The slave processor stopped (voluntarily or on a halt request).
    pub fn p2_stopped(&mut self) {
        self.p2_busy = false;
        self.halt_p2 = false;
    }

    pub fn set_p1_busy(&mut self, busy: bool) {
        self.p1_busy = busy;
    }

    pub fn p1_busy(&self) -> bool {
        self.p1_busy
    }

    /// Validates a console load request.  On success the interval
    /// timer starts and the boot channel is held busy; the caller
    /// performs the bootstrap read and then releases the channel with
    /// [`CentralControl::load_complete`].
    pub fn load_request(&mut self) -> Result<LoadSelect, LoadFailure> {
        if self.p1_busy {
            return Err(LoadFailure::ProcessorBusy);
        }
        if self.unit_busy[0] {
            return Err(match self.load_select {
                LoadSelect::Card => LoadFailure::CardBusy,
                LoadSelect::Disk => LoadFailure::DiskBusy,
            });
        }
        self.unit_busy[0] = true;
        self.timer_running = true;
        event!(Level::INFO, "load accepted from {:?}", self.load_select);
        Ok(self.load_select)
    }

    /// Releases the boot channel once the bootstrap transfer has
    /// finished, whether or not it succeeded.
    pub fn load_complete(&mut self) {
        self.unit_busy[0] = false;
    }

    pub fn load_refused_not_ready(&self) -> LoadFailure {
        match self.load_select {
            LoadSelect::Card => LoadFailure::CardNotReady,
            LoadSelect::Disk => LoadFailure::DiskNotReady,
        }
    }

    pub fn timer_running(&self) -> bool {
        self.timer_running
    }

    pub fn set_timer_inhibit(&mut self, inhibit: bool) {
        self.timer_inhibit = inhibit;
    }

    /// Current interval-timer reading, for the read-timer operator.
    pub fn timer_value(&self) -> u8 {
        self.timer
    }

    /// Advances the interval timer to the given simulated time.  The
    /// deadline carries over exactly, so a late call does not slow the
    /// long-run tick rate.
    pub fn poll_timer(&mut self, simulated_time: Duration) {
        while simulated_time >= self.next_timer_tick {
            self.next_timer_tick += TIMER_PERIOD;
            if !self.timer_running {
                continue;
            }
            self.timer = (self.timer + 1) & 0o77;
            if self.timer == 0 && !self.timer_inhibit {
                self.conditions.timer = true;
                self.signal_interrupt();
            }
        }
    }

    pub fn snapshot(&self) -> CentralSnapshot {
        CentralSnapshot {
            iar: self.iar,
            interrupt_mask: self.interrupt_mask,
            interrupt_latch: self.interrupt_latch,
            timer: self.timer,
            conditions: self.conditions.clone(),
            p2_busy: self.p2_busy,
            halt_p2: self.halt_p2,
        }
    }
}

/// Builds a present data descriptor addressing `addr` with the given
/// element count in the size field.
pub fn make_data_descriptor(addr: u16, size: u16) -> Word {
    let mut w = 0;
    w = bit_set(w, base::word::FLAG_BIT);
    w = bit_set(w, base::word::PRESENCE_BIT);
    w = base::field_insert(w, 8, 10, size as u64);
    base::word::set_address_field(w, addr)
}

/// Extracts the unit-designate field of an I/O descriptor (the top
/// five bits after the flag).
pub fn descriptor_unit(word: Word) -> u8 {
    field_isolate(word, 3, 5) as u8
}
