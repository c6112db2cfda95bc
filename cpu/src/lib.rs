//! This crate emulates the machine proper: Central Control with the
//! memory exchange and interrupt network, the two processors, and the
//! peripheral units, driven one cycle slice at a time.
#![crate_name = "cpu"]

mod central;
mod clock;
mod dump;
mod io;
mod processor;
mod scheduler;
mod system;

pub use central::{
    CentralControl, CentralSnapshot, IoChannel, LoadFailure, LoadSelect, ProcessorRole,
    ProcessorUnit, EXCHANGE_CELL, IO_RESULT_CELL, LOAD_ADDRESS, MODULE_COUNT, MODULE_WORDS,
};
pub use clock::{BasicClock, Clock};
pub use dump::write_dump;
pub use io::{
    decode_alpha, CardReaderUnit, ConsoleUnit, DeviceManager, DiskUnit, PeripheralUnit,
    TransferMode, UnitDesignate, UnitOutcome, Unsupported, CARD_WORDS, CHARSET, SEGMENT_WORDS,
};
pub use processor::{Processor, ProcessorSnapshot};
pub use scheduler::SliceTimer;
pub use system::{System, SystemConfig};
