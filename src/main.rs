pub mod config;
pub mod externals;
pub mod internals;
pub mod models;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use config::{Cli, Mode, MonitorArgs};
use externals::{
    detector::task::task_read_detector_lines,
    hardware::{
        channel::{ChannelSettings, CommandChannel},
        discovery::{select_port, PORT_ENV_VAR},
        services::{SerialBackend, SerialBackendActual},
        task::task_drive_buzzer,
    },
};
use internals::core::system::task_debounce_detections;
use models::command::BuzzerCommand;
use tokio::{signal, sync::broadcast};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(cli.log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let settings = cli.channel_settings();
    match cli.mode {
        Mode::Monitor(args) => {
            run_monitor(settings, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Send { command } => {
            let sent = tokio::task::spawn_blocking(move || send_once(settings, command)).await?;
            Ok(if sent {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Mode::Ports => {
            list_ports(&SerialBackendActual, settings.port_override.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Wire the detector, debouncer and buzzer tasks together and run them
/// until the detector exits or Ctrl-C is pressed.
async fn run_monitor(settings: ChannelSettings, args: MonitorArgs) -> Result<()> {
    let tracker = TaskTracker::new();

    let token = CancellationToken::new();

    let (tx_detection_samples, rx_detection_samples) = broadcast::channel(64);
    let (tx_alert_events, rx_alert_events) = broadcast::channel(8);

    info!("Monitor started. Watching for 'Unauthorized' detections.");

    let token_clone = token.clone();
    let channel = CommandChannel::new(SerialBackendActual, settings);
    tracker.spawn(async move { task_drive_buzzer(token_clone, channel, rx_alert_events).await });

    let token_clone = token.clone();
    let debouncer = args.debouncer();
    tracker.spawn(async move {
        task_debounce_detections(
            token_clone,
            debouncer,
            rx_detection_samples,
            tx_alert_events,
        )
        .await
    });

    let token_clone = token.clone();
    let source = args.detector_source();
    let echo = !args.quiet;
    tracker.spawn(async move {
        task_read_detector_lines(token_clone, source, tx_detection_samples, echo).await
    });

    tracker.close();

    // Tasks stop in order once the detector output ends; Ctrl-C cancels all.
    tokio::select! {
        _ = tracker.wait() => {}
        res = signal::ctrl_c() => {
            match res {
                Ok(_) => {
                    info!("Interrupted.");
                    token.cancel();
                },
                Err(e) => {
                    error!("Failed to listen for ctrl_c. Error: {}", e);
                    token.cancel();
                }
            };
        },
    }

    tracker.wait().await;

    info!("Cleanup complete.");
    Ok(())
}

/// Connect, send one command and release the port.
fn send_once(settings: ChannelSettings, command: BuzzerCommand) -> bool {
    let mut channel = CommandChannel::new(SerialBackendActual, settings);
    let sent = channel.send(command);
    if !sent {
        error!(
            "Could not send {} ({}). Set {} to the controller's device path if discovery picks the wrong port.",
            command.name(),
            command.wire_code(),
            PORT_ENV_VAR
        );
    }
    channel.close();
    sent
}

fn list_ports(backend: &dyn SerialBackend, port_override: Option<&str>) -> Result<()> {
    let candidates = backend.list_ports()?;

    println!("Available serial ports:");
    for candidate in candidates.iter() {
        let marker = if candidate.is_debug_console() {
            " (debug console, skipped)"
        } else {
            ""
        };
        println!("  {} - {}{}", candidate.device, candidate.description, marker);
    }

    if let Some(port) = port_override.filter(|p| !p.is_empty()) {
        println!("Chosen port: {} (override)", port);
        return Ok(());
    }

    match select_port(&candidates) {
        Some(chosen) => println!("Chosen port: {}", chosen.device),
        None => println!("No usable port found."),
    }
    Ok(())
}
