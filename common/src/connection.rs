use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport started a (re)connect attempt.
    Attempt,
    /// The broker acknowledged the session.
    ConnAck,
    /// The transport reported a failure; the session is gone.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Re-subscribe and republish every light's status.
    Resync,
    /// Block the control loop for the fixed retry delay.
    RetryAfter(Duration),
}

/// Tracks broker connectivity for the control loop.
///
/// Retries are unbounded with a fixed delay. Timer reconciliation and command
/// handling only run while [`ConnectionMonitor::is_connected`] holds.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    state: ConnectionState,
    retry_delay: Duration,
    failed_attempts: u32,
}

impl ConnectionMonitor {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_delay,
            failed_attempts: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Failures since the last acknowledged session.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn on_event(&mut self, event: ConnectionEvent) -> Option<ConnectionAction> {
        match (self.state, event) {
            (ConnectionState::Connected, ConnectionEvent::ConnAck) => None,
            (_, ConnectionEvent::ConnAck) => {
                self.state = ConnectionState::Connected;
                self.failed_attempts = 0;
                Some(ConnectionAction::Resync)
            }
            (ConnectionState::Connected, ConnectionEvent::Attempt) => None,
            (_, ConnectionEvent::Attempt) => {
                self.state = ConnectionState::Connecting;
                None
            }
            (_, ConnectionEvent::Error) => {
                self.state = ConnectionState::Disconnected;
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                Some(ConnectionAction::RetryAfter(self.retry_delay))
            }
        }
    }
}
