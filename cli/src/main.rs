mod sleep;
mod spo;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

use base::Word;
use cpu::{
    write_dump, CardReaderUnit, DiskUnit, LoadSelect, System, SystemConfig, UnitDesignate,
};

use sleep::MinimalSleeper;
use spo::SupervisoryPrinter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BootSource {
    Card,
    Disk,
}

/// Emulate a dual-processor 48-bit stack machine.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Unit the bootstrap block is read from.
    #[arg(long, value_enum, default_value = "card")]
    boot: BootSource,

    /// Card deck image: octal words, one per line, with a blank line
    /// between cards.
    #[arg(long)]
    deck: Option<PathBuf>,

    /// Disk unit image: octal words, one per line.
    #[arg(long)]
    disk: Option<PathBuf>,

    /// Run this many times faster than real-time ('MAX' for
    /// as-fast-as-possible).
    #[arg(long, default_value = "1.0")]
    speed_multiplier: String,

    /// Processor cycles to run per execution slice.
    #[arg(long, default_value_t = 10_000)]
    slice_cycles: u64,

    /// Write a diagnostic dump to this file when the machine halts.
    #[arg(long)]
    dump: Option<PathBuf>,
}

/// Reads a file of octal words, one per line.  Blank lines and lines
/// starting with '#' are skipped; blank lines additionally close the
/// current record when `records` is set.
fn read_word_image(path: &Path, records: bool) -> Result<Vec<Vec<Word>>, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(path)?);
    let mut result: Vec<Vec<Word>> = Vec::new();
    let mut current: Vec<Word> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let text = line.trim();
        if text.starts_with('#') {
            continue;
        }
        if text.is_empty() {
            if records && !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(Word::from_str_radix(text, 8)?);
    }
    if !current.is_empty() {
        result.push(current);
    }
    Ok(result)
}

fn parse_speed_multiplier(text: &str) -> Result<Option<f64>, Box<dyn std::error::Error>> {
    if text == "MAX" {
        event!(Level::INFO, "running at maximum speed");
        Ok(None)
    } else {
        let multiplier: f64 = text.parse()?;
        event!(Level::INFO, "running at speed multiplier {}", multiplier);
        Ok(Some(multiplier))
    }
}

/// Runs the machine to a halt, throttling to the configured speed.
fn run(sys: &mut System, multiplier: Option<f64>) {
    let mut sleeper = MinimalSleeper::new(Duration::from_millis(2));
    while sys.is_running() {
        let before = Instant::now();
        let cycles = sys.run_slice();
        let wait = sys.next_delay(cycles, before.elapsed());
        if let Some(m) = multiplier {
            sleeper.sleep(&wait.div_f64(m));
        }
    }
    event!(
        Level::INFO,
        "machine halted after {:?} of simulated time",
        sys.simulated_time()
    );
}

fn run_emulator() -> Result<u8, Box<dyn std::error::Error>> {
    let args = Args::parse();

    // See the tracing_subscriber::fmt documentation for how to select
    // which trace messages get printed (e.g. RUST_LOG=cpu=debug).
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let multiplier = parse_speed_multiplier(&args.speed_multiplier)?;

    let mut sys = System::new(SystemConfig {
        slice_cycles: args.slice_cycles,
        ..SystemConfig::default()
    });
    sys.attach(UnitDesignate::Console, Box::new(SupervisoryPrinter::new()));
    if let Some(deck) = &args.deck {
        let cards = read_word_image(deck, true)?;
        event!(Level::INFO, "card reader holds {} cards", cards.len());
        sys.attach(
            UnitDesignate::CardReader1,
            Box::new(CardReaderUnit::with_deck(cards)),
        );
    }
    if let Some(disk) = &args.disk {
        let image: Vec<Word> = read_word_image(disk, false)?.into_iter().flatten().collect();
        event!(Level::INFO, "disk unit holds {} words", image.len());
        sys.attach(UnitDesignate::Disk1, Box::new(DiskUnit::new(image)));
    }

    let select = match args.boot {
        BootSource::Card => LoadSelect::Card,
        BootSource::Disk => LoadSelect::Disk,
    };
    if let Err(failure) = sys.load(select, true) {
        event!(Level::ERROR, "load refused: {}", failure);
        return Ok(failure.code());
    }

    run(&mut sys, multiplier);

    if let Some(path) = &args.dump {
        let mut out = BufWriter::new(File::create(path)?);
        write_dump(&sys, &mut out)?;
        event!(Level::INFO, "wrote dump to {}", path.display());
    }
    Ok(0)
}

fn main() {
    match run_emulator() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(code) => {
            std::process::exit(i32::from(code));
        }
    }
}
