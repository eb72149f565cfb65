pub mod app;
pub mod config;
pub mod connection;
pub mod controller;
pub mod publisher;
pub mod relay;
pub mod router;
pub mod timer;
pub mod topics;
pub mod types;

#[cfg(test)]
mod testing;

pub use app::RelayLights;
pub use config::{ConfigError, LightsConfig, NetworkConfig, RuntimeConfig};
pub use connection::{ConnectionAction, ConnectionEvent, ConnectionMonitor, ConnectionState};
pub use controller::LightController;
pub use publisher::{MessageSink, StatusPublisher};
pub use relay::{PinLevel, RelayBank, SimulatedRelayBank};
pub use router::{CommandRouter, Intent};
pub use timer::{TimeOfDay, TimerEngine, TimerError, TimerPayload, TimerWindow};
pub use topics::Topics;
pub use types::{Availability, ChangeSource, ClockTick, LightPower};

/// Inbound payloads larger than this are dropped before decoding.
pub const MAX_PAYLOAD_BYTES: usize = 512;
