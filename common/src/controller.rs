use crate::{
    publisher::{MessageSink, StatusPublisher},
    relay::RelayBank,
    types::{Availability, ChangeSource, LightPower},
};

/// Authoritative per-light state.
///
/// Every transition goes through [`LightController::set_light_state`], which
/// keeps the stored state, the relay output and the retained status topic in
/// lockstep. Indices are 0-based; topics and log lines use `index + 1`.
#[derive(Debug)]
pub struct LightController<R, S> {
    lights: Box<[LightPower]>,
    relays: R,
    publisher: StatusPublisher<S>,
}

impl<R: RelayBank, S: MessageSink> LightController<R, S> {
    /// Drives every relay OFF so stored state and outputs agree from boot.
    /// Nothing is published until the transport reports a connection.
    pub fn new(mut relays: R, publisher: StatusPublisher<S>) -> Self {
        let lights = vec![LightPower::Off; relays.len()].into_boxed_slice();
        for index in 0..lights.len() {
            relays.set_output(index, false);
        }

        Self {
            lights,
            relays,
            publisher,
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn light_state(&self, index: usize) -> LightPower {
        self.lights[index]
    }

    pub fn states(&self) -> &[LightPower] {
        &self.lights
    }

    pub fn relays(&self) -> &R {
        &self.relays
    }

    pub fn publisher(&self) -> &StatusPublisher<S> {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut StatusPublisher<S> {
        &mut self.publisher
    }

    /// Not guarded against redundant calls: the relay is re-driven and the
    /// status re-published even when `power` equals the current state.
    pub fn set_light_state(&mut self, index: usize, power: LightPower, source: ChangeSource) {
        self.relays.set_output(index, power.is_on());
        self.lights[index] = power;

        let light_number = index + 1;
        self.publisher
            .publish_log(&format!("Light {light_number} turned {power} by {source}"));
        self.publisher.publish_status(light_number, power);
    }

    pub fn publish_status(&mut self, index: usize) {
        self.publisher.publish_status(index + 1, self.lights[index]);
    }

    pub fn publish_all_status(&mut self) {
        for index in 0..self.lights.len() {
            self.publish_status(index);
        }
    }

    pub fn publish_availability(&mut self, availability: Availability) {
        self.publisher.publish_availability(availability);
    }

    pub fn log(&mut self, text: &str) {
        self.publisher.publish_log(text);
    }
}
