//! Post-mortem diagnostic dumps.
//!
//! The dump is an ordered text stream with region markers, one region
//! per processor, then the memory image with zero words elided.  It is
//! meant for eyeballing after a halt, not for reloading.

use std::io::{self, Write};

use crate::central::MODULE_WORDS;
use crate::processor::ProcessorSnapshot;
use crate::system::System;

const MARK_P1: &str = "=== PROCESSOR 1 ===";
const MARK_P2: &str = "=== PROCESSOR 2 ===";
const MARK_MEMORY: &str = "=== MEMORY ===";
const MARK_END: &str = "=== END ===";

/// Writes the full machine state of `sys` to `out`.
pub fn write_dump<W: Write>(sys: &System, out: &mut W) -> io::Result<()> {
    writeln!(out, "{MARK_P1}")?;
    write_processor(&sys.processor_1().snapshot(), out)?;
    writeln!(out, "{MARK_P2}")?;
    write_processor(&sys.processor_2().snapshot(), out)?;
    writeln!(out, "{MARK_MEMORY}")?;
    write_memory(sys, out)?;
    writeln!(out, "{MARK_END}")?;
    let central = sys.central().snapshot();
    writeln!(
        out,
        "iar {:02o}  mask {:05o}  timer {:02o}  cycles {}",
        central.iar,
        central.interrupt_mask,
        central.timer,
        sys.processor_1().cycles()
    )
}

fn write_processor<W: Write>(p: &ProcessorSnapshot, out: &mut W) -> io::Result<()> {
    writeln!(out, "A {} ({})  B {} ({})", p.a, flag(p.arof), p.b, flag(p.brof))?;
    writeln!(out, "X {}", p.x)?;
    writeln!(
        out,
        "C {:05o}  L {}  M {:05o}  S {:05o}  F {:05o}  R {:03o}",
        p.c, p.l, p.m, p.s, p.f, p.r
    )?;
    writeln!(
        out,
        "G {} H {} K {} V {} N {}  T {:04o}",
        p.g, p.h, p.k, p.v, p.n, p.t
    )?;
    writeln!(
        out,
        "busy {} ncsf {} cwmf {} salf {} msff {} varf {}",
        flag(p.busy),
        flag(p.ncsf),
        flag(p.cwmf),
        flag(p.salf),
        flag(p.msff),
        flag(p.varf)
    )
}

fn write_memory<W: Write>(sys: &System, out: &mut W) -> io::Result<()> {
    let cc = sys.central();
    for module in 0..8u16 {
        for offset in 0..MODULE_WORDS as u16 {
            let addr = (module << 12) | offset;
            match cc.read_raw(addr) {
                Some(0) | None => {}
                Some(word) => writeln!(out, "{addr:05o}: {word:016o}")?,
            }
        }
    }
    Ok(())
}

fn flag(b: bool) -> char {
    if b {
        '1'
    } else {
        '0'
    }
}
