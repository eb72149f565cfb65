use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    controller::LightController,
    publisher::MessageSink,
    relay::RelayBank,
    types::{ChangeSource, ClockTick, LightPower},
};

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("invalid timer payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid time `{0}`, expected H:MM")]
    Format(String),
    #[error("time `{0}` is out of range")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

impl FromStr for TimeOfDay {
    type Err = TimerError;

    /// Accepts `H:MM` and `HH:MM`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let format_err = || TimerError::Format(value.to_string());

        let (hour, minute) = value.trim().split_once(':').ok_or_else(format_err)?;
        let is_field = |field: &str| {
            (1..=2).contains(&field.len()) && field.bytes().all(|b| b.is_ascii_digit())
        };
        if !is_field(hour) || !is_field(minute) {
            return Err(format_err());
        }

        let hour: u8 = hour.parse().map_err(|_| format_err())?;
        let minute: u8 = minute.parse().map_err(|_| format_err())?;
        Self::new(hour, minute).ok_or_else(|| TimerError::OutOfRange(value.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Wire format of a `setTimer` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPayload {
    pub on: String,
    pub off: String,
}

/// Daily on/off window shared by every light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerWindow {
    pub on: TimeOfDay,
    pub off: TimeOfDay,
}

impl TimerWindow {
    pub fn parse(payload: &str) -> Result<Self, TimerError> {
        let raw: TimerPayload = serde_json::from_str(payload)?;
        Ok(Self {
            on: raw.on.parse()?,
            off: raw.off.parse()?,
        })
    }

    /// `on` is inclusive, `off` exclusive. A window that starts after it ends
    /// wraps past midnight; a zero-width window is never on.
    pub fn desired_power(&self, now: ClockTick) -> LightPower {
        let on = self.on.minutes_since_midnight();
        let off = self.off.minutes_since_midnight();
        let now = now.minutes_since_midnight();

        let lit = if on < off {
            on <= now && now < off
        } else if on > off {
            now >= on || now < off
        } else {
            false
        };
        LightPower::from(lit)
    }
}

#[derive(Debug, Default)]
pub struct TimerEngine {
    window: Option<TimerWindow>,
    last_minute: Option<u8>,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.window.is_some()
    }

    pub fn window(&self) -> Option<TimerWindow> {
        self.window
    }

    /// The next observed tick counts as a minute change.
    pub(crate) fn rearm(&mut self) {
        self.last_minute = None;
    }

    /// A payload that fails to decode is logged and leaves the previous
    /// window, active or not, exactly as it was.
    pub fn set_timer<R: RelayBank, S: MessageSink>(
        &mut self,
        payload: &str,
        lights: &mut LightController<R, S>,
        now: Option<ClockTick>,
    ) -> Result<TimerWindow, TimerError> {
        let window = match TimerWindow::parse(payload) {
            Ok(window) => window,
            Err(err) => {
                lights.log(&format!("Failed to parse timer: {err}"));
                return Err(err);
            }
        };

        self.window = Some(window);
        lights.log(&format!(
            "Timer set: ON at {}, OFF at {}",
            window.on, window.off
        ));
        self.check_timer(lights, now);
        Ok(window)
    }

    /// Lights keep whatever state they are in; only future reconciliation
    /// stops.
    pub fn clear_timer<R: RelayBank, S: MessageSink>(
        &mut self,
        lights: &mut LightController<R, S>,
    ) {
        self.window = None;
        lights.log("Timer cleared");
    }

    /// Re-drives only the lights whose state differs from the window's
    /// verdict. Returns how many lights were changed.
    pub fn check_timer<R: RelayBank, S: MessageSink>(
        &mut self,
        lights: &mut LightController<R, S>,
        now: Option<ClockTick>,
    ) -> usize {
        let (Some(window), Some(now)) = (self.window, now) else {
            return 0;
        };

        let desired = window.desired_power(now);
        let mut changed = 0;
        for index in 0..lights.len() {
            if lights.light_state(index) != desired {
                lights.set_light_state(index, desired, ChangeSource::Timer);
                changed += 1;
            }
        }
        changed
    }

    /// Reconciles at most once per observed minute, however often the loop
    /// polls the clock.
    pub fn on_tick<R: RelayBank, S: MessageSink>(
        &mut self,
        lights: &mut LightController<R, S>,
        now: Option<ClockTick>,
    ) -> usize {
        let Some(now) = now else {
            return 0;
        };
        if self.last_minute == Some(now.minute) {
            return 0;
        }

        self.last_minute = Some(now.minute);
        self.check_timer(lights, Some(now))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        publisher::StatusPublisher,
        testing::{RecordingRelays, RecordingSink},
        topics::Topics,
    };

    fn lights(num_lights: usize) -> LightController<RecordingRelays, RecordingSink> {
        LightController::new(
            RecordingRelays::new(num_lights),
            StatusPublisher::new(Topics::new("home"), RecordingSink::default()),
        )
    }

    fn at(hour: u8, minute: u8) -> ClockTick {
        ClockTick::new(hour, minute)
    }

    fn window(on: &str, off: &str) -> TimerWindow {
        TimerWindow {
            on: on.parse().unwrap(),
            off: off.parse().unwrap(),
        }
    }

    #[test]
    fn parses_short_and_long_hours() {
        assert_eq!("6:00".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(6, 0).unwrap());
        assert_eq!("06:05".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(6, 5).unwrap());
        assert_eq!("23:59".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(23, 59).unwrap());
    }

    #[test]
    fn rejects_bad_times() {
        assert!(matches!("24:00".parse::<TimeOfDay>(), Err(TimerError::OutOfRange(_))));
        assert!(matches!("12:60".parse::<TimeOfDay>(), Err(TimerError::OutOfRange(_))));
        assert!(matches!("1200".parse::<TimeOfDay>(), Err(TimerError::Format(_))));
        assert!(matches!("-1:00".parse::<TimeOfDay>(), Err(TimerError::Format(_))));
        assert!(matches!("ab:cd".parse::<TimeOfDay>(), Err(TimerError::Format(_))));
        assert!(matches!("123:00".parse::<TimeOfDay>(), Err(TimerError::Format(_))));
    }

    #[test]
    fn same_day_window() {
        let window = window("06:00", "18:00");

        assert_eq!(window.desired_power(at(12, 0)), LightPower::On);
        assert_eq!(window.desired_power(at(5, 0)), LightPower::Off);
        assert_eq!(window.desired_power(at(6, 0)), LightPower::On);
        assert_eq!(window.desired_power(at(18, 0)), LightPower::Off);
        assert_eq!(window.desired_power(at(17, 59)), LightPower::On);
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let window = window("22:00", "06:00");

        assert_eq!(window.desired_power(at(23, 30)), LightPower::On);
        assert_eq!(window.desired_power(at(7, 0)), LightPower::Off);
        assert_eq!(window.desired_power(at(22, 0)), LightPower::On);
        assert_eq!(window.desired_power(at(6, 0)), LightPower::Off);
        assert_eq!(window.desired_power(at(0, 0)), LightPower::On);
        assert_eq!(window.desired_power(at(5, 59)), LightPower::On);
        assert_eq!(window.desired_power(at(21, 59)), LightPower::Off);
    }

    #[test]
    fn zero_width_window_is_always_off() {
        let window = window("09:00", "09:00");

        for hour in 0..24 {
            for minute in [0, 1, 30, 59] {
                assert_eq!(window.desired_power(at(hour, minute)), LightPower::Off);
            }
        }
    }

    #[test]
    fn set_timer_logs_and_reconciles_immediately() {
        let mut lights = lights(3);
        let mut engine = TimerEngine::new();

        let window = engine
            .set_timer(r#"{"on":"6:00","off":"18:00"}"#, &mut lights, Some(at(12, 0)))
            .unwrap();

        assert_eq!(window.on, TimeOfDay::new(6, 0).unwrap());
        assert!(engine.is_active());
        assert_eq!(lights.states(), &[LightPower::On; 3]);
        let log = lights.publisher().sink().log_lines();
        assert_eq!(log[0], "Timer set: ON at 06:00, OFF at 18:00");
        assert_eq!(log[1], "Light 1 turned ON by timer");
    }

    #[test]
    fn set_timer_without_clock_defers_reconciliation() {
        let mut lights = lights(2);
        let mut engine = TimerEngine::new();

        engine
            .set_timer(r#"{"on":"6:00","off":"18:00"}"#, &mut lights, None)
            .unwrap();

        assert!(engine.is_active());
        assert_eq!(lights.states(), &[LightPower::Off; 2]);
    }

    #[test]
    fn malformed_payload_preserves_previous_window() {
        let mut lights = lights(2);
        let mut engine = TimerEngine::new();
        engine
            .set_timer(r#"{"on":"22:00","off":"06:00"}"#, &mut lights, None)
            .unwrap();
        let before = engine.window();

        for payload in [
            "not json",
            r#"{"on":"07:00"}"#,
            r#"{"on":"7","off":"8:00"}"#,
            r#"{"on":"25:00","off":"08:00"}"#,
        ] {
            assert!(engine.set_timer(payload, &mut lights, Some(at(23, 0))).is_err());
            assert_eq!(engine.window(), before);
        }

        let log = lights.publisher().sink().log_lines();
        assert!(log
            .iter()
            .filter(|line| line.starts_with("Failed to parse timer"))
            .count()
            == 4);
        assert_eq!(lights.states(), &[LightPower::Off; 2]);
    }

    #[test]
    fn malformed_payload_keeps_inactive_timer_inactive() {
        let mut lights = lights(1);
        let mut engine = TimerEngine::new();

        assert!(engine.set_timer("{", &mut lights, Some(at(8, 0))).is_err());
        assert!(!engine.is_active());
        assert_eq!(engine.window(), None);
    }

    #[test]
    fn clear_timer_leaves_lights_alone() {
        let mut lights = lights(2);
        let mut engine = TimerEngine::new();
        engine
            .set_timer(r#"{"on":"06:00","off":"18:00"}"#, &mut lights, Some(at(12, 0)))
            .unwrap();

        engine.clear_timer(&mut lights);
        lights.publisher_mut().sink_mut().clear();
        let writes_before = lights.relays().writes.len();

        for minute in 0..5 {
            assert_eq!(engine.on_tick(&mut lights, Some(at(20, minute))), 0);
        }

        assert!(!engine.is_active());
        assert_eq!(lights.states(), &[LightPower::On; 2]);
        assert_eq!(lights.relays().writes.len(), writes_before);
        assert!(lights.publisher().sink().messages.is_empty());
    }

    #[test]
    fn reconciliation_skips_lights_already_matching() {
        let mut lights = lights(4);
        lights.set_light_state(1, LightPower::On, ChangeSource::UserCommand);
        lights.set_light_state(3, LightPower::On, ChangeSource::UserCommand);
        lights.publisher_mut().sink_mut().clear();
        let writes_before = lights.relays().writes.len();

        let mut engine = TimerEngine::new();
        engine
            .set_timer(r#"{"on":"06:00","off":"18:00"}"#, &mut lights, Some(at(12, 0)))
            .unwrap();

        assert_eq!(lights.publisher().sink().status_count(), 2);
        assert_eq!(lights.relays().writes.len() - writes_before, 2);
        assert_eq!(lights.states(), &[LightPower::On; 4]);
    }

    #[test]
    fn ticks_reconcile_once_per_minute() {
        let mut lights = lights(1);
        let mut engine = TimerEngine::new();
        engine
            .set_timer(r#"{"on":"06:00","off":"18:00"}"#, &mut lights, None)
            .unwrap();

        assert_eq!(engine.on_tick(&mut lights, Some(at(12, 0))), 1);

        // A manual override holds until the next minute boundary.
        lights.set_light_state(0, LightPower::Off, ChangeSource::UserCommand);
        assert_eq!(engine.on_tick(&mut lights, Some(at(12, 0))), 0);
        assert_eq!(lights.light_state(0), LightPower::Off);

        assert_eq!(engine.on_tick(&mut lights, Some(at(12, 1))), 1);
        assert_eq!(lights.light_state(0), LightPower::On);
    }

    #[test]
    fn evening_tick_turns_lights_off() {
        let mut lights = lights(2);
        let mut engine = TimerEngine::new();
        engine
            .set_timer(r#"{"on":"06:00","off":"18:00"}"#, &mut lights, Some(at(17, 59)))
            .unwrap();
        assert_eq!(lights.states(), &[LightPower::On; 2]);

        assert_eq!(engine.on_tick(&mut lights, Some(at(18, 0))), 2);
        assert_eq!(lights.states(), &[LightPower::Off; 2]);
        assert_eq!(
            lights.publisher().sink().log_lines().last(),
            Some(&"Light 2 turned OFF by timer")
        );
    }
}
