use crate::{
    topics::Topics,
    types::{Availability, LightPower},
};

/// Outbound side of the MQTT transport.
///
/// Delivery is fire-and-forget: implementations log failures themselves and
/// never report them back. Retained status is corrected by the next full
/// resync after a reconnect.
pub trait MessageSink {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool);
}

/// Formats status and log notifications onto their topics.
#[derive(Debug)]
pub struct StatusPublisher<S> {
    topics: Topics,
    sink: S,
}

impl<S: MessageSink> StatusPublisher<S> {
    pub fn new(topics: Topics, sink: S) -> Self {
        Self { topics, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// `light_number` is the 1-based external number.
    pub fn publish_status(&mut self, light_number: usize, power: LightPower) {
        let topic = self.topics.light_status(light_number);
        self.sink.publish(&topic, power.as_str(), true);
    }

    pub fn publish_log(&mut self, text: &str) {
        self.sink.publish(self.topics.log(), text, false);
    }

    pub fn publish_availability(&mut self, availability: Availability) {
        self.sink
            .publish(self.topics.availability(), availability.as_str(), true);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{Published, RecordingSink};

    #[test]
    fn status_is_retained_on_per_light_topic() {
        let mut publisher = StatusPublisher::new(Topics::new("home"), RecordingSink::default());
        publisher.publish_status(3, LightPower::On);
        publisher.publish_status(1, LightPower::Off);

        assert_eq!(
            publisher.sink().messages,
            vec![
                Published::new("home/light/3/status", "ON", true),
                Published::new("home/light/1/status", "OFF", true),
            ]
        );
    }

    #[test]
    fn log_lines_are_not_retained() {
        let mut publisher = StatusPublisher::new(Topics::new("home"), RecordingSink::default());
        publisher.publish_log("Timer cleared");
        publisher.publish_availability(Availability::Online);

        assert_eq!(
            publisher.sink().messages,
            vec![
                Published::new("home/light/log", "Timer cleared", false),
                Published::new("home/light/availability", "online", true),
            ]
        );
    }
}
