use std::{io, process::Stdio};

use anyhow::{anyhow, Context, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::broadcast::Sender,
    time::Instant,
};
use tokio_stream::{wrappers::LinesStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::models::detection_sample::DetectionSample;

use super::parsing::frame_observation;

/// Where detector output lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorSource {
    /// Lines piped into this process.
    Stdin,
    /// Program and arguments to spawn. Stdout and stderr are merged.
    Command(Vec<String>),
}

/// Task: Reads detector output line by line and emits one detection sample
/// per observed frame. Returning drops the sample sender, so downstream
/// tasks drain what is queued and then stop on their own.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_read_detector_lines(
    token: CancellationToken,
    source: DetectorSource,
    tx_detection_samples: Sender<DetectionSample>,
    echo: bool,
) {
    info!("Started. Source: {:?}", source);

    let result = match source {
        DetectorSource::Stdin => {
            let lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
            pump_lines(&token, lines, &tx_detection_samples, echo).await
        }
        DetectorSource::Command(argv) => {
            run_detector_command(&token, &argv, &tx_detection_samples, echo).await
        }
    };

    if let Err(e) = result {
        error!("Detector source failed. Error: {:#}", e);
    }

    if !token.is_cancelled() {
        warn!("Detector output ended. Shutting down.");
    }
}

/// Spawn the detector and pump its merged output until it exits or the
/// token is cancelled. The child is killed on cancellation.
#[instrument(skip_all)]
async fn run_detector_command(
    token: &CancellationToken,
    argv: &[String],
    tx_detection_samples: &Sender<DetectionSample>,
    echo: bool,
) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("Detector command is empty"))?;

    let mut child = Command::new(program)
        .args(args)
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn detector '{}'", program))?;
    info!("Spawned detector '{}' (pid {:?}).", program, child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Detector stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("Detector stderr was not captured"))?;

    let lines = LinesStream::new(BufReader::new(stdout).lines())
        .merge(LinesStream::new(BufReader::new(stderr).lines()));
    let pumped = pump_lines(token, lines, tx_detection_samples, echo).await;

    if token.is_cancelled() {
        debug!("Stopping detector.");
        if let Err(e) = child.kill().await {
            warn!("Failed to kill detector. Error: {}", e);
        }
    }

    match child.wait().await {
        Ok(status) => info!("Detector exited with {}.", status),
        Err(e) => warn!("Failed to wait for detector. Error: {}", e),
    }

    pumped
}

/// Feed every line of `lines` through the business logic until the stream
/// ends or the token is cancelled.
async fn pump_lines<S>(
    token: &CancellationToken,
    mut lines: S,
    tx_detection_samples: &Sender<DetectionSample>,
    echo: bool,
) -> Result<()>
where
    S: Stream<Item = io::Result<String>> + Unpin,
{
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                return Ok(());
            },
            next = lines.next() => match next {
                Some(Ok(line)) => business_logic(&line, tx_detection_samples, echo),
                Some(Err(e)) => return Err(e).context("Failed to read detector output"),
                None => {
                    debug!("Detector output closed.");
                    return Ok(());
                },
            },
        }
    }
}

/// Perform task business logic. Parse one line and, if it describes a
/// frame, try to emit a sample.
fn business_logic(line: &str, tx_detection_samples: &Sender<DetectionSample>, echo: bool) {
    if echo {
        info!("{}", line);
    }

    let Some(sample) = sample_for_line(line, Instant::now()) else {
        trace!("Skipped non-frame line.");
        return;
    };

    trace!("Parsed {}.", sample);
    if let Err(e) = tx_detection_samples.send(sample) {
        error!("Failed to broadcast detection sample. Error: {}", e);
    }
}

fn sample_for_line(line: &str, at: Instant) -> Option<DetectionSample> {
    frame_observation(line).map(|count| DetectionSample::new(count, at))
}
