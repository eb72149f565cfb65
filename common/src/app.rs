use std::time::Duration;

use crate::{
    config::LightsConfig,
    connection::{ConnectionAction, ConnectionEvent, ConnectionMonitor},
    controller::LightController,
    publisher::{MessageSink, StatusPublisher},
    relay::RelayBank,
    router::{CommandRouter, Intent},
    timer::{TimerEngine, TimerError},
    topics::Topics,
    types::{Availability, ChangeSource, ClockTick},
};

/// Sole owner of all mutable firmware state. Commands and clock ticks both
/// funnel into the same [`LightController`], and neither is processed while
/// the broker connection is down.
#[derive(Debug)]
pub struct RelayLights<R, S> {
    router: CommandRouter,
    lights: LightController<R, S>,
    timer: TimerEngine,
    connection: ConnectionMonitor,
}

impl<R: RelayBank, S: MessageSink> RelayLights<R, S> {
    pub fn new(config: &LightsConfig, relays: R, sink: S) -> Self {
        let topics = Topics::new(&config.topic_prefix);
        let lights = LightController::new(relays, StatusPublisher::new(topics.clone(), sink));
        let router = CommandRouter::new(topics, lights.len());

        Self {
            router,
            lights,
            timer: TimerEngine::new(),
            connection: ConnectionMonitor::new(Duration::from_millis(config.reconnect_delay_ms)),
        }
    }

    pub fn lights(&self) -> &LightController<R, S> {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightController<R, S> {
        &mut self.lights
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn connection(&self) -> &ConnectionMonitor {
        &self.connection
    }

    /// Feeds a transport event through the connection state machine. On
    /// [`ConnectionAction::Resync`] availability and every light's status are
    /// republished here; re-subscribing is left to the caller, which owns the
    /// transport.
    pub fn on_connection_event(&mut self, event: ConnectionEvent) -> Option<ConnectionAction> {
        let action = self.connection.on_event(event);
        if action == Some(ConnectionAction::Resync) {
            self.lights.publish_availability(Availability::Online);
            self.lights.publish_all_status();
            self.timer.rearm();
        }
        action
    }

    /// Decodes and applies one inbound message. The decoded intent is
    /// returned so callers can trace what happened; unroutable topics, and
    /// anything arriving while disconnected, come back as [`Intent::Ignored`]
    /// with no side effects.
    pub fn handle_message(
        &mut self,
        topic: &str,
        payload: &str,
        now: Option<ClockTick>,
    ) -> Result<Intent, TimerError> {
        if !self.connection.is_connected() {
            return Ok(Intent::Ignored);
        }

        let intent = self.router.decode(topic, payload);
        match &intent {
            Intent::SetLight { index, power } => {
                self.lights
                    .set_light_state(*index, *power, ChangeSource::UserCommand);
            }
            Intent::QueryLight { index } => self.lights.publish_status(*index),
            Intent::SetTimer(payload) => {
                self.timer.set_timer(payload, &mut self.lights, now)?;
            }
            Intent::ClearTimer => self.timer.clear_timer(&mut self.lights),
            Intent::Ignored => {}
        }
        Ok(intent)
    }

    /// The timer is frozen while reconnecting; the first tick after a resync
    /// always reconciles.
    pub fn on_tick(&mut self, now: Option<ClockTick>) -> usize {
        if !self.connection.is_connected() {
            return 0;
        }
        self.timer.on_tick(&mut self.lights, now)
    }
}
