use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::models::{alert_event::AlertEvent, detection_sample::DetectionSample};

use super::debouncer::{AlertDecision, HoldDebouncer};

/// Task: Activate whenever a detection sample is emitted.
/// Ticks the debouncer with the sample and broadcasts an alert event when
/// the unauthorized condition has been held long enough. Stops when the
/// sample stream closes, dropping the alert sender in turn.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_debounce_detections(
    token: CancellationToken,
    mut debouncer: HoldDebouncer,
    mut rx_detection_samples: Receiver<DetectionSample>,
    tx_alert_events: Sender<AlertEvent>,
) {
    info!(
        "Started. Hold threshold: {:?}, cooldown: {:?}.",
        debouncer.hold_threshold(),
        debouncer.cooldown()
    );

    loop {
        // Queued samples are handled before cancellation is honoured.
        tokio::select! {
            biased;
            res = rx_detection_samples.recv() => match res {
                Ok(sample) => {
                    trace!("Received detection sample.");
                    business_logic(&mut debouncer, sample, &tx_alert_events);
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Fell behind the detector. Skipped {} samples.", skipped);
                },
                Err(RecvError::Closed) => {
                    info!("Detection sample stream closed.");
                    break;
                },
            },
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
        }
    }
}

/// Perform task business logic. Tick the debouncer and, if it decides to
/// alert, try to broadcast the alert.
fn business_logic(
    debouncer: &mut HoldDebouncer,
    sample: DetectionSample,
    tx_alert_events: &Sender<AlertEvent>,
) {
    match debouncer.tick(sample.is_unauthorized(), sample.at) {
        AlertDecision::None => {
            trace!("No alert. Holding: {}.", debouncer.is_holding());
        }
        AlertDecision::Alert => {
            info!("[ALERT] Unauthorized held for {:?}.", debouncer.hold_threshold());
            if let Err(e) = tx_alert_events.send(AlertEvent { at: sample.at }) {
                error!("Failed to broadcast alert event. Error: {}", e);
            } else {
                debug!("Sent an alert event.");
            }
        }
    }
}
