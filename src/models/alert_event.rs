use std::fmt::Display;

use tokio::time::Instant;

/// Emitted by the debouncer once an unauthorized hold has lasted long
/// enough and the cooldown has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertEvent {
    pub at: Instant,
}

impl Display for AlertEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Alert Event | at:{:?}>", self.at)
    }
}
