//! Recording doubles for the relay and transport seams.

use crate::{publisher::MessageSink, relay::RelayBank};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl Published {
    pub fn new(topic: &str, payload: &str, retain: bool) -> Self {
        Self {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub messages: Vec<Published>,
}

impl RecordingSink {
    pub fn on_topic(&self, topic: &str) -> Vec<&Published> {
        self.messages
            .iter()
            .filter(|message| message.topic == topic)
            .collect()
    }

    pub fn log_lines(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|message| message.topic.ends_with("/light/log"))
            .map(|message| message.payload.as_str())
            .collect()
    }

    pub fn status_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.topic.ends_with("/status"))
            .count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl MessageSink for RecordingSink {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        self.messages.push(Published::new(topic, payload, retain));
    }
}

#[derive(Debug)]
pub struct RecordingRelays {
    pub outputs: Vec<bool>,
    pub writes: Vec<(usize, bool)>,
}

impl RecordingRelays {
    pub fn new(len: usize) -> Self {
        Self {
            outputs: vec![false; len],
            writes: Vec::new(),
        }
    }
}

impl RelayBank for RecordingRelays {
    fn len(&self) -> usize {
        self.outputs.len()
    }

    fn set_output(&mut self, index: usize, on: bool) {
        self.outputs[index] = on;
        self.writes.push((index, on));
    }
}
