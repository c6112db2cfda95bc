use std::fmt::{self, Debug, Formatter};
use std::io::Write;

use termcolor::{self, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::{event, Level};

use base::Word;
use cpu::{decode_alpha, PeripheralUnit, TransferMode, UnitOutcome, Unsupported};

fn get_colour_choice() -> termcolor::ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// The supervisory printout: console output rendered on the terminal
/// the emulator runs in, coloured so it stands apart from the
/// emulator's own messages.
pub struct SupervisoryPrinter {
    stream: StandardStream,
}

impl SupervisoryPrinter {
    pub fn new() -> SupervisoryPrinter {
        SupervisoryPrinter {
            stream: StandardStream::stdout(get_colour_choice()),
        }
    }

    fn emit(&mut self, line: &str) -> Result<(), std::io::Error> {
        let mut colour = ColorSpec::new();
        colour
            .set_fg(Some(termcolor::Color::Green))
            .set_intense(true);
        self.stream.set_color(&colour)?;
        writeln!(self.stream, "{line}")?;
        self.stream.reset()?;
        self.stream.flush()
    }
}

impl Debug for SupervisoryPrinter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SupervisoryPrinter")
    }
}

impl PeripheralUnit for SupervisoryPrinter {
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
        if let Err(e) = self.emit(&line) {
            event!(Level::ERROR, "Failed to print console output: {}", e);
        }
        Ok(UnitOutcome::ok(words.len() as u16))
    }
}
