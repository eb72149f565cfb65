use crate::{
    topics::{Topics, SUFFIX_GET_STATUS, SUFFIX_SET},
    types::LightPower,
};

/// What an inbound message asks for. Light indices are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SetLight { index: usize, power: LightPower },
    QueryLight { index: usize },
    SetTimer(String),
    ClearTimer,
    Ignored,
}

/// Maps topic/payload pairs onto [`Intent`]s without touching any state.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    topics: Topics,
    num_lights: usize,
}

impl CommandRouter {
    pub fn new(topics: Topics, num_lights: usize) -> Self {
        Self { topics, num_lights }
    }

    pub fn decode(&self, topic: &str, payload: &str) -> Intent {
        if topic == self.topics.set_timer() {
            return Intent::SetTimer(payload.to_string());
        }
        if topic == self.topics.clear_timer() {
            return Intent::ClearTimer;
        }

        let Some((index, suffix)) = self.light_address(topic) else {
            return Intent::Ignored;
        };

        match suffix {
            SUFFIX_SET => Intent::SetLight {
                index,
                power: LightPower::from_command_payload(payload),
            },
            SUFFIX_GET_STATUS => Intent::QueryLight { index },
            _ => Intent::Ignored,
        }
    }

    /// Splits `{prefix}/light/{n}/{suffix}` into a 0-based index and suffix.
    /// Numbers outside `1..=num_lights` are treated as unroutable.
    fn light_address<'t>(&self, topic: &'t str) -> Option<(usize, &'t str)> {
        let rest = topic.strip_prefix(self.topics.light_root())?;
        let (number, suffix) = rest.split_once('/')?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let number: usize = number.parse().ok()?;
        if !(1..=self.num_lights).contains(&number) {
            return None;
        }
        Some((number - 1, suffix))
    }
}
