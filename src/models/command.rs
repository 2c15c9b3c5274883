use std::fmt::Display;

use clap::ValueEnum;

/// Commands understood by the buzzer firmware. Each one goes out as a
/// single ASCII byte with no framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuzzerCommand {
    /// Sound the buzzer for three seconds.
    Beep,
    /// Silence the buzzer immediately.
    Stop,
    /// Short half second test tone.
    Test,
}

impl BuzzerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BuzzerCommand::Beep => "beep",
            BuzzerCommand::Stop => "stop",
            BuzzerCommand::Test => "test",
        }
    }

    /// The exact bytes the firmware expects for this command.
    pub fn wire_code(&self) -> &'static str {
        match self {
            BuzzerCommand::Beep => "B",
            BuzzerCommand::Stop => "S",
            BuzzerCommand::Test => "T",
        }
    }
}

impl Display for BuzzerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Buzzer Command | {} ({})>", self.name(), self.wire_code())
    }
}
