use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::models::alert_event::AlertEvent;

use super::{channel::CommandChannel, services::SerialBackend};

/// Task: Owns the command channel. Beeps the buzzer for every alert event.
/// Serial calls block, so they run through `block_in_place`; this task is
/// the only holder of the channel, which keeps connect, send and close
/// strictly sequential. Stops when the alert stream closes and closes the
/// channel exactly once on the way out.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_drive_buzzer<B: SerialBackend + Send>(
    token: CancellationToken,
    mut channel: CommandChannel<B>,
    mut rx_alert_events: Receiver<AlertEvent>,
) {
    info!("Started.");

    // A busy or missing controller here is fine, the next beep retries.
    tokio::task::block_in_place(|| channel.reconnect());

    loop {
        // Queued alerts are still sounded before cancellation is honoured.
        tokio::select! {
            biased;
            res = rx_alert_events.recv() => match res {
                Ok(alert) => {
                    debug!("Got alert event: {}", alert);
                    business_logic(&mut channel);
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} alert events.", skipped);
                    business_logic(&mut channel);
                },
                Err(RecvError::Closed) => {
                    info!("Alert event stream closed.");
                    break;
                },
            },
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
        }
    }

    tokio::task::block_in_place(|| channel.close());
    info!("Serial channel released.");
}

/// Perform task business logic. Sound the buzzer.
fn business_logic<B: SerialBackend>(channel: &mut CommandChannel<B>) {
    trace!("Executing business logic.");
    if tokio::task::block_in_place(|| channel.beep()) {
        info!("Buzzer triggered on {}.", channel.port().unwrap_or("unknown port"));
    } else {
        warn!("Could not buzz (port busy or not found). Will retry on next alert.");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{sync::broadcast, time::Instant};

    use crate::externals::hardware::{
        channel::tests::{quick_settings, FakeBackend},
        discovery::PortCandidate,
    };

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_beeps_on_alert_and_closes_on_cancel() {
        let backend = FakeBackend::with_ports(vec![PortCandidate::new("/dev/ttyUSB0", "n/a")]);
        let channel = CommandChannel::new(backend.clone(), quick_settings());
        let token = CancellationToken::new();
        let (tx_alerts, rx_alerts) = broadcast::channel(8);

        let handle = tokio::spawn(task_drive_buzzer(token.clone(), channel, rx_alerts));

        tx_alerts
            .send(AlertEvent { at: Instant::now() })
            .expect("Failed to send alert");

        let deadline = Instant::now() + Duration::from_secs(5);
        while backend.device().written.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        token.cancel();
        handle.await.expect("Buzzer task panicked");

        let device = backend.device();
        assert_eq!(device.written, b"B");
        assert_eq!(device.open_links, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_controller_does_not_stop_task() {
        let backend = FakeBackend::default();
        let channel = CommandChannel::new(backend.clone(), quick_settings());
        let token = CancellationToken::new();
        let (tx_alerts, rx_alerts) = broadcast::channel(8);

        let handle = tokio::spawn(task_drive_buzzer(token.clone(), channel, rx_alerts));

        tx_alerts
            .send(AlertEvent { at: Instant::now() })
            .expect("Failed to send alert");
        drop(tx_alerts);

        handle.await.expect("Buzzer task panicked");
        assert!(backend.device().written.is_empty());
        assert!(backend.device().opened.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_alert_sounds_before_cancel() {
        let backend = FakeBackend::with_ports(vec![PortCandidate::new("/dev/ttyUSB0", "n/a")]);
        let channel = CommandChannel::new(backend.clone(), quick_settings());
        let token = CancellationToken::new();
        let (tx_alerts, rx_alerts) = broadcast::channel(8);

        tx_alerts
            .send(AlertEvent { at: Instant::now() })
            .expect("Failed to send alert");
        token.cancel();

        tokio::spawn(task_drive_buzzer(token, channel, rx_alerts))
            .await
            .expect("Buzzer task panicked");

        let device = backend.device();
        assert_eq!(device.written, b"B");
        assert_eq!(device.open_links, 0);
        drop(tx_alerts);
    }
}
