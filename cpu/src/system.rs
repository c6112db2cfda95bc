//! The assembled machine: Central Control, one or two processors, the
//! peripheral exchange and the service loop that ties them together.
//!
//! A [`System`] advances in slices.  Each slice runs every busy
//! processor for at most the configured cycle quota, credits the
//! simulated clock with the time those cycles represent, advances the
//! interval timer, and then services the requests the processors left
//! with Central Control (start an I/O, start processor 2).  Device
//! transfers happen synchronously inside the service step but their
//! result descriptors and I/O-finished interrupts are delivered one
//! slice later, which is the closest a cycle-sliced emulation gets to
//! the original overlap of computation with peripheral activity.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{event, Level};

use base::{bit_test, field_insert, Word};

use crate::central::{
    descriptor_unit, Accessor, CentralControl, IoChannel, LoadFailure, LoadSelect, ProcessorUnit,
    Requestor, EXCHANGE_CELL, IO_RESULT_CELL, LOAD_ADDRESS,
};
use crate::clock::{BasicClock, Clock};
use crate::io::{
    DeviceManager, PeripheralUnit, TransferMode, UnitDesignate, UnitOutcome, OUTCOME_MEMORY_ERROR,
    OUTCOME_NOT_READY, OUTCOME_UNSUPPORTED,
};
use crate::processor::Processor;
use crate::scheduler::SliceTimer;

/// I/O descriptor field: set for a read (unit to memory), clear for a
/// write.
const IOD_READ_BIT: u8 = 24;
/// I/O descriptor field: set for a binary transfer, clear for
/// alphanumeric.
const IOD_BINARY_BIT: u8 = 16;
/// Result descriptor field holding the unit's error bits.
const RESULT_ERROR_START: u8 = 25;
const RESULT_ERROR_WIDTH: u8 = 8;

/// Hardware complement of a [`System`].
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    /// Populated 4096-word memory modules, 1 to 8.
    pub memory_modules: usize,
    /// Whether processor 2 is installed.
    pub p2: bool,
    /// Installed I/O channels, 1 to 4.
    pub channels: usize,
    /// Processor clock rate in cycles per simulated second.
    pub clock_hz: u64,
    /// Cycle quota of one execution slice.
    pub slice_cycles: u64,
}

impl Default for SystemConfig {
    fn default() -> SystemConfig {
        SystemConfig {
            memory_modules: 8,
            p2: false,
            channels: 4,
            clock_hz: 1_000_000,
            slice_cycles: 10_000,
        }
    }
}

/// Peripheral work finished in an earlier slice, waiting to be
/// reported to the software.
#[derive(Debug)]
enum Completion {
    IoFinished { channel: IoChannel, result: Word },
}

/// A complete machine.
#[derive(Debug)]
pub struct System {
    cc: CentralControl,
    p1: Processor,
    p2: Processor,
    devices: DeviceManager,
    completions: VecDeque<Completion>,
    timer: SliceTimer,
    clock: BasicClock,
}

impl System {
    pub fn new(config: SystemConfig) -> System {
        System {
            cc: CentralControl::new(config.memory_modules, config.p2, config.channels),
            p1: Processor::new(ProcessorUnit::A),
            p2: Processor::new(ProcessorUnit::B),
            devices: DeviceManager::new(),
            completions: VecDeque::new(),
            timer: SliceTimer::new(config.clock_hz, config.slice_cycles),
            clock: BasicClock::new(),
        }
    }

    pub fn attach(&mut self, designate: UnitDesignate, unit: Box<dyn PeripheralUnit>) {
        self.devices.attach(&mut self.cc, designate, unit);
    }

    pub fn central(&self) -> &CentralControl {
        &self.cc
    }

    pub fn central_mut(&mut self) -> &mut CentralControl {
        &mut self.cc
    }

    pub fn processor_1(&self) -> &Processor {
        &self.p1
    }

    pub fn processor_2(&self) -> &Processor {
        &self.p2
    }

    /// Simulated time elapsed since power-on.
    pub fn simulated_time(&self) -> Duration {
        self.clock.now()
    }

    /// Whether any processor still has work.
    pub fn is_running(&self) -> bool {
        self.p1.is_busy() || self.p2.is_busy()
    }

    /// How long the caller should sleep after a slice that executed
    /// `cycles` cycles in `elapsed` of wall-clock time.
    pub fn next_delay(&mut self, cycles: u64, elapsed: Duration) -> Duration {
        self.timer.next_delay(cycles, elapsed)
    }

    /// Console load: validates the request, reads the bootstrap block
    /// from the selected unit into low memory and presets processor 1
    /// to execute it.  With `start` false the processor is left
    /// stopped at the load address, for inspection.
    pub fn load(&mut self, select: LoadSelect, start: bool) -> Result<(), LoadFailure> {
        self.cc.set_load_select(select);
        // Refusals in fixed order: processor, console, boot unit.
        if self.cc.p1_busy() {
            return Err(LoadFailure::ProcessorBusy);
        }
        if !self.devices.is_ready(UnitDesignate::Console) {
            return Err(LoadFailure::ConsoleNotReady);
        }
        let boot_unit = match select {
            LoadSelect::Card => UnitDesignate::CardReader1,
            LoadSelect::Disk => UnitDesignate::Disk1,
        };
        if !self.devices.is_ready(boot_unit) {
            return Err(self.cc.load_refused_not_ready());
        }
        // The boot channel is held busy across the bootstrap read.
        self.cc.load_request()?;
        let read = self.read_boot_block(boot_unit);
        self.cc.load_complete();
        let words = read?;
        self.store_block(IoChannel(1), LOAD_ADDRESS, &words);
        self.devices.refresh_ready(&mut self.cc);
        self.p1.start_at_load_address();
        if !start {
            self.p1.stop();
        }
        self.cc.set_p1_busy(start);
        Ok(())
    }

    fn read_boot_block(&mut self, boot_unit: UnitDesignate) -> Result<Vec<Word>, LoadFailure> {
        let Some(unit) = self.devices.get_mut(boot_unit) else {
            return Err(self.cc.load_refused_not_ready());
        };
        let (words, outcome) = match unit.read(0, TransferMode::Binary) {
            Ok(read) => read,
            Err(_) => return Err(self.cc.load_refused_not_ready()),
        };
        if outcome.error_mask != 0 {
            return Err(self.cc.load_refused_not_ready());
        }
        event!(
            Level::INFO,
            "loaded {} bootstrap words from {}",
            words.len(),
            unit.name()
        );
        Ok(words)
    }

    /// Runs one slice: every busy processor executes up to the cycle
    /// quota, the clock and interval timer advance, and pending
    /// requests and completions are serviced.  Returns the largest
    /// cycle count any processor used.
    pub fn run_slice(&mut self) -> u64 {
        self.deliver_completions();
        let quota = self.timer.slice_cycles();
        let mut used = 0;
        if self.p1.is_busy() {
            used = used.max(self.p1.run(&mut self.cc, quota));
            if !self.p1.is_busy() {
                event!(Level::INFO, "processor 1 halted");
                self.cc.set_p1_busy(false);
            }
        }
        if self.p2.is_busy() {
            used = used.max(self.p2.run(&mut self.cc, quota));
        }
        // an idle machine still keeps time
        let consumed = if used == 0 { quota } else { used };
        self.clock.consume(&self.timer.simulated(consumed));
        self.cc.poll_timer(self.clock.now());
        self.service_requests();
        used
    }

    fn deliver_completions(&mut self) {
        while let Some(completion) = self.completions.pop_front() {
            match completion {
                Completion::IoFinished { channel, result } => {
                    let cell = IO_RESULT_CELL + (channel.0 - 1) as u16;
                    self.store_block(channel, cell, &[result]);
                    self.cc.io_finished(channel);
                }
            }
        }
    }

    fn service_requests(&mut self) {
        if let Some(channel) = self.cc.requests.io_start.take() {
            self.start_io(channel);
        }
        if self.cc.requests.p2_start {
            self.cc.requests.p2_start = false;
            self.p2.initiate(&mut self.cc, false);
        }
    }

    /// Fetches the descriptor named by the exchange cell and carries
    /// out the transfer it describes.  The result descriptor is queued
    /// for delivery in the next slice.
    fn start_io(&mut self, channel: IoChannel) {
        let pointer = self.read_word(channel, EXCHANGE_CELL).unwrap_or(0);
        let iod_addr = base::word::address_field(pointer);
        let Some(iod) = self.read_word(channel, iod_addr) else {
            self.finish_io(channel, 0, UnitOutcome::failed(OUTCOME_MEMORY_ERROR));
            return;
        };
        let code = descriptor_unit(iod);
        let designate = UnitDesignate::from_code(code).filter(|&d| self.devices.get_mut(d).is_some());
        let Some(designate) = designate else {
            event!(Level::WARN, "I/O descriptor names absent unit {:02o}", code);
            self.finish_io(channel, iod, UnitOutcome::failed(OUTCOME_NOT_READY));
            return;
        };
        let count = base::word::size_field(iod);
        let addr = base::word::address_field(iod);
        let mode = if bit_test(iod, IOD_BINARY_BIT) {
            TransferMode::Binary
        } else {
            TransferMode::Alpha
        };
        let outcome = if bit_test(iod, IOD_READ_BIT) {
            self.read_from_unit(channel, designate, addr, count, mode)
        } else {
            self.write_to_unit(channel, designate, addr, count, mode)
        };
        self.devices.refresh_ready(&mut self.cc);
        self.finish_io(channel, iod, outcome);
    }

    fn read_from_unit(
        &mut self,
        channel: IoChannel,
        designate: UnitDesignate,
        addr: u16,
        count: u16,
        mode: TransferMode,
    ) -> UnitOutcome {
        let Some(unit) = self.devices.get_mut(designate) else {
            return UnitOutcome::failed(OUTCOME_NOT_READY);
        };
        match unit.read(count, mode) {
            Ok((words, mut outcome)) => {
                if !self.store_block(channel, addr, &words) {
                    outcome.error_mask |= OUTCOME_MEMORY_ERROR;
                }
                outcome
            }
            Err(err) => {
                event!(Level::WARN, "{}", err);
                UnitOutcome::failed(OUTCOME_UNSUPPORTED)
            }
        }
    }

    fn write_to_unit(
        &mut self,
        channel: IoChannel,
        designate: UnitDesignate,
        addr: u16,
        count: u16,
        mode: TransferMode,
    ) -> UnitOutcome {
        let Some(words) = self.fetch_block(channel, addr, count) else {
            return UnitOutcome::failed(OUTCOME_MEMORY_ERROR);
        };
        let Some(unit) = self.devices.get_mut(designate) else {
            return UnitOutcome::failed(OUTCOME_NOT_READY);
        };
        match unit.write(&words, mode) {
            Ok(outcome) => outcome,
            Err(err) => {
                event!(Level::WARN, "{}", err);
                UnitOutcome::failed(OUTCOME_UNSUPPORTED)
            }
        }
    }

    /// Builds the result descriptor for a finished transfer and queues
    /// its delivery.
    fn finish_io(&mut self, channel: IoChannel, iod: Word, outcome: UnitOutcome) {
        let mut result = field_insert(
            iod,
            RESULT_ERROR_START,
            RESULT_ERROR_WIDTH,
            outcome.error_mask as u64,
        );
        let advanced = base::word::address_field(iod).wrapping_add(outcome.length);
        result = base::word::set_address_field(result, advanced);
        self.completions
            .push_back(Completion::IoFinished { channel, result });
    }

    fn read_word(&mut self, channel: IoChannel, addr: u16) -> Option<Word> {
        let mut acc = Accessor::new(Requestor::Io(channel), addr, false);
        self.cc.fetch(&mut acc);
        if acc.address_error {
            None
        } else {
            Some(acc.word)
        }
    }

    fn fetch_block(&mut self, channel: IoChannel, addr: u16, count: u16) -> Option<Vec<Word>> {
        (0..count)
            .map(|i| self.read_word(channel, addr.wrapping_add(i)))
            .collect()
    }

    /// Stores `words` ascending from `addr`; false if any store was
    /// refused.
    fn store_block(&mut self, channel: IoChannel, addr: u16, words: &[Word]) -> bool {
        let mut ok = true;
        for (i, &word) in words.iter().enumerate() {
            let mut acc = Accessor::new(Requestor::Io(channel), addr.wrapping_add(i as u16), false);
            acc.word = word;
            self.cc.store(&mut acc);
            ok &= !acc.address_error;
        }
        ok
    }
}
