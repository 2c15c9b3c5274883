use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    externals::{
        detector::task::DetectorSource,
        hardware::{
            channel::{ChannelSettings, DEFAULT_BAUD_RATE},
            discovery::PORT_ENV_VAR,
        },
    },
    internals::core::debouncer::HoldDebouncer,
    models::command::BuzzerCommand,
};

/// Sound a serial-attached buzzer when a detector keeps reporting an
/// unauthorized object.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Serial device of the buzzer controller. Skips port discovery.
    #[arg(long, env = PORT_ENV_VAR, global = true)]
    pub port: Option<String>,

    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,

    /// Serial read timeout in milliseconds.
    #[arg(long, default_value_t = 1000, global = true)]
    pub read_timeout_ms: u64,

    /// Time to let the controller boot after the port is opened.
    #[arg(long, default_value_t = 2000, global = true)]
    pub settle_ms: u64,

    /// Time to wait for controller output after each command.
    #[arg(long, default_value_t = 50, global = true)]
    pub response_delay_ms: u64,

    #[arg(long, default_value = "info", global = true)]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Watch detector output and buzz on a sustained unauthorized detection.
    Monitor(MonitorArgs),
    /// Send a single command to the controller.
    Send {
        #[arg(value_enum)]
        command: BuzzerCommand,
    },
    /// List serial ports and the one discovery would pick.
    Ports,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Seconds the unauthorized detection must be held before buzzing.
    #[arg(long = "hold-secs", default_value = "3", value_parser = parse_seconds)]
    pub hold: Duration,

    /// Minimum seconds between two buzzes.
    #[arg(long = "cooldown-secs", default_value = "3", value_parser = parse_seconds)]
    pub cooldown: Duration,

    /// Do not echo detector output.
    #[arg(long)]
    pub quiet: bool,

    /// Detector program and arguments. Reads stdin when omitted.
    #[arg(last = true)]
    pub detector_cmd: Vec<String>,
}

impl Cli {
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            baud_rate: self.baud,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle_time: Duration::from_millis(self.settle_ms),
            response_delay: Duration::from_millis(self.response_delay_ms),
            port_override: self.port.clone(),
        }
    }
}

impl MonitorArgs {
    pub fn debouncer(&self) -> HoldDebouncer {
        HoldDebouncer::new(self.hold, self.cooldown)
    }

    pub fn detector_source(&self) -> DetectorSource {
        if self.detector_cmd.is_empty() {
            DetectorSource::Stdin
        } else {
            DetectorSource::Command(self.detector_cmd.clone())
        }
    }
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .parse()
        .map_err(|e| format!("'{}' is not a number of seconds: {}", raw, e))?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| format!("'{}' is not a valid duration: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_monitor_defaults() {
        let cli = Cli::try_parse_from(["unauthorized_buzzer", "monitor"]).expect("Failed to parse");

        assert_eq!(cli.baud, 115_200);
        let settings = cli.channel_settings();
        assert_eq!(settings.settle_time, Duration::from_secs(2));
        assert_eq!(settings.response_delay, Duration::from_millis(50));
        assert_eq!(settings.read_timeout, Duration::from_secs(1));

        let Mode::Monitor(args) = cli.mode else {
            panic!("Expected monitor mode");
        };
        assert_eq!(args.hold, Duration::from_secs(3));
        assert_eq!(args.cooldown, Duration::from_secs(3));
        assert_eq!(args.detector_source(), DetectorSource::Stdin);
    }

    #[test]
    fn test_monitor_with_detector_command() {
        let cli = Cli::try_parse_from([
            "unauthorized_buzzer",
            "monitor",
            "--hold-secs",
            "1.5",
            "--",
            "python",
            "-u",
            "main.py",
        ])
        .expect("Failed to parse");

        let Mode::Monitor(args) = cli.mode else {
            panic!("Expected monitor mode");
        };
        assert_eq!(args.hold, Duration::from_millis(1500));
        assert_eq!(
            args.detector_source(),
            DetectorSource::Command(vec!["python".into(), "-u".into(), "main.py".into()])
        );
    }

    #[test]
    fn test_send_command_and_port_flag() {
        let cli = Cli::try_parse_from([
            "unauthorized_buzzer",
            "send",
            "test",
            "--port",
            "/dev/cu.usbmodem1101",
        ])
        .expect("Failed to parse");

        assert_eq!(cli.port.as_deref(), Some("/dev/cu.usbmodem1101"));
        assert!(matches!(
            cli.mode,
            Mode::Send {
                command: BuzzerCommand::Test
            }
        ));
    }

    #[test]
    fn test_negative_hold_is_rejected() {
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
        assert_eq!(parse_seconds("0").expect("zero is valid"), Duration::ZERO);
    }
}
