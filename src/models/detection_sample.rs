use std::fmt::Display;

use tokio::time::Instant;

/// One observation from the detector: how many unauthorized objects were
/// reported on a single output line, and when that line arrived.
#[derive(Debug, Clone, Copy)]
pub struct DetectionSample {
    pub unauthorized_count: u32,
    pub at: Instant,
}

impl DetectionSample {
    pub fn new(unauthorized_count: u32, at: Instant) -> Self {
        Self {
            unauthorized_count,
            at,
        }
    }

    /// The per-tick condition fed to the debouncer.
    pub fn is_unauthorized(&self) -> bool {
        self.unauthorized_count >= 1
    }
}

impl Display for DetectionSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Detection Sample | unauthorized:{}>",
            self.unauthorized_count
        )
    }
}
