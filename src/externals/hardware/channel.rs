use std::{mem, thread, time::Duration};

use tracing::{debug, error, info, instrument, trace, warn};

use crate::models::command::BuzzerCommand;

use super::{
    discovery::discover_port,
    services::{ChannelError, SerialBackend, SerialLink},
};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Opening the port resets most Arduinos; commands sent during the boot
/// sequence are lost.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(2);
pub const DEFAULT_RESPONSE_DELAY: Duration = Duration::from_millis(50);

/// Upper bound on response bytes collected per command.
const MAX_RESPONSE_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub settle_time: Duration,
    pub response_delay: Duration,
    /// Device path that bypasses discovery.
    pub port_override: Option<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_time: DEFAULT_SETTLE_TIME,
            response_delay: DEFAULT_RESPONSE_DELAY,
            port_override: None,
        }
    }
}

enum ConnectionState {
    Disconnected,
    Connected {
        port: String,
        link: Box<dyn SerialLink>,
    },
}

/// Owns the serial link to the buzzer controller.
///
/// Nothing here returns an error to the caller. Every failure is logged
/// and reported as `false`, and the next command retries discovery, so a
/// long running monitor survives the controller being unplugged or busy.
/// The link is released on [`close`](Self::close) or when the channel is
/// dropped, whichever comes first.
pub struct CommandChannel<B: SerialBackend> {
    backend: B,
    settings: ChannelSettings,
    state: ConnectionState,
}

impl<B: SerialBackend> CommandChannel<B> {
    /// Create a disconnected channel. The first command connects lazily.
    pub fn new(backend: B, settings: ChannelSettings) -> Self {
        Self {
            backend,
            settings,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { .. })
    }

    /// Port of the open link, if any.
    pub fn port(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Connected { port, .. } => Some(port),
            ConnectionState::Disconnected => None,
        }
    }

    /// Close any open link and open `port`, then wait for the controller
    /// to finish booting.
    #[instrument(skip(self))]
    pub fn connect(&mut self, port: &str) -> bool {
        match self.try_connect(port) {
            Ok(()) => {
                info!("Connected to buzzer controller on {}.", port);
                true
            }
            Err(e) => {
                error!("Could not open serial port. Error: {}", e);
                false
            }
        }
    }

    /// Discover the controller port and connect to it.
    #[instrument(skip_all)]
    pub fn reconnect(&mut self) -> bool {
        match discover_port(self.settings.port_override.as_deref(), &self.backend) {
            Ok(port) => self.connect(&port),
            Err(e) => {
                warn!("Could not find buzzer controller. Error: {}", e);
                false
            }
        }
    }

    /// Send raw command text. Reconnects first when no link is open.
    /// Returns `true` once the bytes were written and flushed.
    #[instrument(skip(self))]
    pub fn send_cmd(&mut self, cmd: &str) -> bool {
        if !self.is_connected() {
            debug!("Not connected. Trying to reconnect before sending.");
            self.reconnect();
        }

        match self.try_send(cmd) {
            Ok(lines) => {
                if !lines.is_empty() {
                    info!("Controller: {}", lines.join(" | "));
                }
                true
            }
            Err(ChannelError::NotConnected) => {
                warn!("No serial connection. Command '{}' dropped.", cmd);
                false
            }
            Err(e) => {
                error!("Failed to send command '{}'. Error: {}", cmd, e);
                false
            }
        }
    }

    pub fn send(&mut self, command: BuzzerCommand) -> bool {
        debug!("Sending {}.", command);
        self.send_cmd(command.wire_code())
    }

    /// Sound the buzzer for three seconds.
    pub fn beep(&mut self) -> bool {
        self.send(BuzzerCommand::Beep)
    }

    /// Silence the buzzer.
    pub fn stop(&mut self) -> bool {
        self.send(BuzzerCommand::Stop)
    }

    /// Short test tone.
    pub fn test(&mut self) -> bool {
        self.send(BuzzerCommand::Test)
    }

    /// Release the link if one is open. Safe to call any number of times.
    pub fn close(&mut self) {
        if let ConnectionState::Connected { port, link } =
            mem::replace(&mut self.state, ConnectionState::Disconnected)
        {
            drop(link);
            info!("Closed serial port {}.", port);
        }
    }

    fn try_connect(&mut self, port: &str) -> Result<(), ChannelError> {
        self.close();

        let link = self
            .backend
            .open(port, self.settings.baud_rate, self.settings.read_timeout)?;

        if !self.settings.settle_time.is_zero() {
            debug!(
                "Waiting {:?} for the controller to boot.",
                self.settings.settle_time
            );
            thread::sleep(self.settings.settle_time);
        }

        self.state = ConnectionState::Connected {
            port: port.to_string(),
            link,
        };
        Ok(())
    }

    /// Write `cmd` and collect any response lines. A failed write drops
    /// the link so the next command starts over with discovery.
    fn try_send(&mut self, cmd: &str) -> Result<Vec<String>, ChannelError> {
        let response_delay = self.settings.response_delay;
        let ConnectionState::Connected { link, .. } = &mut self.state else {
            return Err(ChannelError::NotConnected);
        };

        let result = exchange(&mut **link, cmd, response_delay);
        if result.is_err() {
            self.state = ConnectionState::Disconnected;
        }
        result
    }
}

impl<B: SerialBackend> Drop for CommandChannel<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn exchange(
    link: &mut dyn SerialLink,
    cmd: &str,
    response_delay: Duration,
) -> Result<Vec<String>, ChannelError> {
    link.write_all(cmd.as_bytes())
        .and_then(|_| link.flush())
        .map_err(ChannelError::WriteFailed)?;
    trace!("Wrote {} bytes.", cmd.len());

    if !response_delay.is_zero() {
        thread::sleep(response_delay);
    }

    Ok(drain_response_lines(link))
}

/// Read whatever the controller has already buffered, without waiting
/// for more, and split it into trimmed non-empty lines.
fn drain_response_lines(link: &mut dyn SerialLink) -> Vec<String> {
    let mut received: Vec<u8> = vec![];
    let mut buffer = [0u8; 256];

    while received.len() < MAX_RESPONSE_BYTES {
        let waiting = match link.bytes_to_read() {
            Ok(0) => break,
            Ok(n) => n as usize,
            Err(e) => {
                warn!("Failed to check for response bytes. Error: {}", e);
                break;
            }
        };

        let want = waiting.min(buffer.len());
        match link.read(&mut buffer[..want]) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buffer[..n]),
            Err(e) => {
                warn!("Failed to read response. Error: {}", e);
                break;
            }
        }
    }

    String::from_utf8_lossy(&received)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
