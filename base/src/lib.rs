//! The `base` crate defines the B5500-related things which are useful
//! in both a simulator and other associated tools.  The idea is that
//! if you want to write a dump reader or a loader, it would depend on
//! the base crate but would not need to depend on the simulator
//! library itself.

pub mod field;
pub mod syllable;
pub mod word;

pub use field::{bit_reset, bit_set, bit_test, field_insert, field_isolate, field_transfer};
pub use syllable::{CharSyllable, Syllable, WordSyllable};
pub use word::{Word, WORD_BITS, WORD_MASK};
