//! Peripheral units and the device manager.
//!
//! A peripheral is anything an I/O descriptor can address: card
//! equipment, printers, disk files, the operator console.  The
//! emulator dispatches a descriptor to the unit it designates and the
//! unit reports back an outcome (an error mask and a transferred
//! length) which the driver folds into the result descriptor.  Only
//! the operations the load path needs are fully emulated; everything
//! else a unit does not override reports itself unsupported.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};

use tracing::{event, Level};

use base::Word;

use crate::central::CentralControl;

/// Result-descriptor error bits reported by a unit.
pub const OUTCOME_NOT_READY: u16 = 0o01;
pub const OUTCOME_PARITY: u16 = 0o02;
pub const OUTCOME_END_OF_FILE: u16 = 0o04;
pub const OUTCOME_MEMORY_ERROR: u16 = 0o10;
pub const OUTCOME_UNSUPPORTED: u16 = 0o20;

/// What a completed device operation reports: the error bits for the
/// result descriptor and the number of words actually moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    pub error_mask: u16,
    pub length: u16,
}

impl UnitOutcome {
    pub fn ok(length: u16) -> UnitOutcome {
        UnitOutcome {
            error_mask: 0,
            length,
        }
    }

    pub fn failed(error_mask: u16) -> UnitOutcome {
        UnitOutcome {
            error_mask,
            length: 0,
        }
    }
}

/// Alphanumeric or binary transfer, selected by a descriptor mode bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Alpha,
    Binary,
}

/// An operation the unit does not implement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported {
    pub unit: String,
    pub operation: &'static str,
}

impl Display for Unsupported {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unit {} does not support {}", self.unit, self.operation)
    }
}

impl std::error::Error for Unsupported {}

/// The full device contract.  Every operation other than the status
/// query has an unsupported default, so a unit implements only the
/// subset its hardware had.
pub trait PeripheralUnit: Debug {
    fn name(&self) -> String;

    /// Whether the unit could accept an operation right now.
    fn ready(&self) -> bool;

    fn unsupported(&self, operation: &'static str) -> Unsupported {
        Unsupported {
            unit: self.name(),
            operation,
        }
    }

    /// Reads up to `length` words (zero means "whatever the unit's
    /// record holds").
    fn read(
        &mut self,
        length: u16,
        mode: TransferMode,
    ) -> Result<(Vec<Word>, UnitOutcome), Unsupported> {
        let _ = (length, mode);
        Err(self.unsupported("read"))
    }

    fn write(&mut self, words: &[Word], mode: TransferMode) -> Result<UnitOutcome, Unsupported> {
        let _ = (words, mode);
        Err(self.unsupported("write"))
    }

    /// Spaces forward (positive) or backward (negative) by records.
    fn space(&mut self, records: i32) -> Result<UnitOutcome, Unsupported> {
        let _ = records;
        Err(self.unsupported("space"))
    }

    fn rewind(&mut self) -> Result<UnitOutcome, Unsupported> {
        Err(self.unsupported("rewind"))
    }

    fn erase(&mut self, length: u16) -> Result<UnitOutcome, Unsupported> {
        let _ = length;
        Err(self.unsupported("erase"))
    }

    /// Reads a record and verifies it without transferring it.
    fn read_check(&mut self, length: u16) -> Result<UnitOutcome, Unsupported> {
        let _ = length;
        Err(self.unsupported("read check"))
    }

    fn read_interrogate(&mut self) -> Result<UnitOutcome, Unsupported> {
        Err(self.unsupported("read interrogate"))
    }

    fn write_interrogate(&mut self) -> Result<UnitOutcome, Unsupported> {
        Err(self.unsupported("write interrogate"))
    }
}

/// The unit-designate codes an I/O descriptor can carry, with each
/// unit's bit position in the ready-status mask the interrogate
/// operator pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnitDesignate {
    Console,
    CardReader1,
    CardReader2,
    CardPunch,
    Printer1,
    Printer2,
    Disk1,
    Disk2,
}

impl UnitDesignate {
    /// The five-bit designate field value.
    pub fn code(self) -> u8 {
        match self {
            UnitDesignate::Disk1 => 0o06,
            UnitDesignate::Disk2 => 0o14,
            UnitDesignate::CardReader1 => 0o12,
            UnitDesignate::CardReader2 => 0o16,
            UnitDesignate::CardPunch => 0o13,
            UnitDesignate::Printer1 => 0o26,
            UnitDesignate::Printer2 => 0o32,
            UnitDesignate::Console => 0o36,
        }
    }

    pub fn from_code(code: u8) -> Option<UnitDesignate> {
        [
            UnitDesignate::Console,
            UnitDesignate::CardReader1,
            UnitDesignate::CardReader2,
            UnitDesignate::CardPunch,
            UnitDesignate::Printer1,
            UnitDesignate::Printer2,
            UnitDesignate::Disk1,
            UnitDesignate::Disk2,
        ]
        .into_iter()
        .find(|d| d.code() == code)
    }

    /// Bit position in the ready-status mask.
    pub fn ready_bit(self) -> u8 {
        match self {
            UnitDesignate::Console => 0,
            UnitDesignate::CardReader1 => 1,
            UnitDesignate::CardReader2 => 2,
            UnitDesignate::CardPunch => 3,
            UnitDesignate::Printer1 => 4,
            UnitDesignate::Printer2 => 5,
            UnitDesignate::Disk1 => 6,
            UnitDesignate::Disk2 => 7,
        }
    }
}

/// Maps unit designates to attached units and keeps Central Control's
/// ready mask in step with them.  Not a physical component; the real
/// cabinets wired each unit straight into the exchange.
#[derive(Debug, Default)]
pub struct DeviceManager {
    devices: BTreeMap<UnitDesignate, Box<dyn PeripheralUnit>>,
}

impl DeviceManager {
    pub fn new() -> DeviceManager {
        DeviceManager {
            devices: BTreeMap::new(),
        }
    }

    pub fn attach(
        &mut self,
        cc: &mut CentralControl,
        designate: UnitDesignate,
        unit: Box<dyn PeripheralUnit>,
    ) {
        event!(
            Level::DEBUG,
            "attaching {} as unit {:02o}",
            unit.name(),
            designate.code()
        );
        cc.set_unit_ready(designate.ready_bit(), unit.ready());
        self.devices.insert(designate, unit);
    }

    pub fn get_mut(&mut self, designate: UnitDesignate) -> Option<&mut Box<dyn PeripheralUnit>> {
        self.devices.get_mut(&designate)
    }

    pub fn is_ready(&self, designate: UnitDesignate) -> bool {
        self.devices
            .get(&designate)
            .map(|u| u.ready())
            .unwrap_or(false)
    }

    /// Re-reports every unit's ready state; run after any operation
    /// that may have changed one.
    pub fn refresh_ready(&self, cc: &mut CentralControl) {
        for (designate, unit) in &self.devices {
            cc.set_unit_ready(designate.ready_bit(), unit.ready());
        }
    }
}

/// A card reader holding a deck of pre-punched cards, each card a
/// block of up to ten words.
#[derive(Debug, Default)]
pub struct CardReaderUnit {
    deck: std::collections::VecDeque<Vec<Word>>,
}

/// Words on one punched card.
pub const CARD_WORDS: usize = 10;

impl CardReaderUnit {
    pub fn new() -> CardReaderUnit {
        CardReaderUnit::default()
    }

    pub fn with_deck(deck: Vec<Vec<Word>>) -> CardReaderUnit {
        CardReaderUnit {
            deck: deck.into_iter().collect(),
        }
    }

    pub fn feed(&mut self, card: Vec<Word>) {
        self.deck.push_back(card);
    }
}

impl PeripheralUnit for CardReaderUnit {
    fn name(&self) -> String {
        "card reader".to_string()
    }

    fn ready(&self) -> bool {
        !self.deck.is_empty()
    }

    fn read(
        &mut self,
        length: u16,
        _mode: TransferMode,
    ) -> Result<(Vec<Word>, UnitOutcome), Unsupported> {
        match self.deck.pop_front() {
            Some(mut card) => {
                if length != 0 {
                    card.truncate(length as usize);
                }
                let outcome = UnitOutcome::ok(card.len() as u16);
                Ok((card, outcome))
            }
            None => Ok((Vec::new(), UnitOutcome::failed(OUTCOME_NOT_READY))),
        }
    }
}

/// Words in one disk segment, the granule of disk transfers.
pub const SEGMENT_WORDS: usize = 30;

/// A disk file unit backed by an in-memory word image with a simple
/// seek position.
#[derive(Debug, Default)]
pub struct DiskUnit {
    image: Vec<Word>,
    position: usize,
}

impl DiskUnit {
    pub fn new(image: Vec<Word>) -> DiskUnit {
        DiskUnit { image, position: 0 }
    }
}

impl PeripheralUnit for DiskUnit {
    fn name(&self) -> String {
        "disk file".to_string()
    }

    fn ready(&self) -> bool {
        !self.image.is_empty()
    }

    fn read(
        &mut self,
        length: u16,
        _mode: TransferMode,
    ) -> Result<(Vec<Word>, UnitOutcome), Unsupported> {
        if self.image.is_empty() {
            return Ok((Vec::new(), UnitOutcome::failed(OUTCOME_NOT_READY)));
        }
        let want = if length == 0 {
            SEGMENT_WORDS
        } else {
            length as usize
        };
        let end = (self.position + want).min(self.image.len());
        let words: Vec<Word> = self.image[self.position..end].to_vec();
        let mut outcome = UnitOutcome::ok(words.len() as u16);
        if words.len() < want {
            outcome.error_mask |= OUTCOME_END_OF_FILE;
        }
        self.position = end;
        Ok((words, outcome))
    }

    fn space(&mut self, records: i32) -> Result<UnitOutcome, Unsupported> {
        let delta = records as i64 * SEGMENT_WORDS as i64;
        let pos = (self.position as i64 + delta).clamp(0, self.image.len() as i64);
        self.position = pos as usize;
        Ok(UnitOutcome::ok(0))
    }

    fn rewind(&mut self) -> Result<UnitOutcome, Unsupported> {
        self.position = 0;
        Ok(UnitOutcome::ok(0))
    }

    fn read_check(&mut self, length: u16) -> Result<UnitOutcome, Unsupported> {
        // the in-memory image cannot have a parity defect; report the
        // length that a real check would have covered
        let want = if length == 0 {
            SEGMENT_WORDS
        } else {
            length as usize
        };
        let end = (self.position + want).min(self.image.len());
        let covered = end - self.position;
        self.position = end;
        Ok(UnitOutcome::ok(covered as u16))
    }

    fn read_interrogate(&mut self) -> Result<UnitOutcome, Unsupported> {
        Ok(UnitOutcome::ok(0))
    }

    fn write_interrogate(&mut self) -> Result<UnitOutcome, Unsupported> {
        Ok(UnitOutcome::ok(0))
    }
}

/// The sixty-four character internal code in collating order, as the
/// console printer renders it.
pub const CHARSET: [char; 64] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '#', '@', '?', ':', '>', '}', '+', 'A', 'B',
    'C', 'D', 'E', 'F', 'G', 'H', 'I', '.', '[', '&', '(', '<', '~', '|', 'J', 'K', 'L', 'M', 'N',
    'O', 'P', 'Q', 'R', '$', '*', '-', ')', ';', '{', ' ', '/', 'S', 'T', 'U', 'V', 'W', 'X', 'Y',
    'Z', ',', '%', '!', '=', ']', '"',
];

/// Decodes the eight six-bit characters of `words` into text, without
/// the trailing blank fill.
pub fn decode_alpha(words: &[Word]) -> String {
    let mut text = String::with_capacity(words.len() * 8);
    for &w in words {
        for pos in 0..8u8 {
            let code = base::field_isolate(w, pos * 6, 6) as usize;
            text.push(CHARSET[code]);
        }
    }
    text.truncate(text.trim_end().len());
    text
}

/// The operator console printer.  Output is kept a line per write;
/// keyboard input arrives through the inquiry interrupt instead of a
/// read operation, so reads stay unsupported.
#[derive(Debug, Default)]
pub struct ConsoleUnit {
    lines: Vec<String>,
}

impl ConsoleUnit {
    pub fn new() -> ConsoleUnit {
        ConsoleUnit::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl PeripheralUnit for ConsoleUnit {
    fn name(&self) -> String {
        "console printer".to_string()
    }

    fn ready(&self) -> bool {
        true
    }

    fn write(&mut self, words: &[Word], mode: TransferMode) -> Result<UnitOutcome, Unsupported> {
        let line = match mode {
            TransferMode::Alpha => decode_alpha(words),
            TransferMode::Binary => words.iter().map(|w| format!("{w:016o} ")).collect(),
        };
        event!(Level::INFO, "console: {}", line);
        self.lines.push(line);
        Ok(UnitOutcome::ok(words.len() as u16))
    }
}
