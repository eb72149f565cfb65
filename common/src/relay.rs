/// Electrical level written to a relay input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    /// Level a relay pin must hold from the moment it is claimed.
    pub const RELEASED: Self = Self::High;

    /// Relay boards are active-low: pulling the input low energises the coil.
    pub fn for_power(on: bool) -> Self {
        if on {
            Self::Low
        } else {
            Self::High
        }
    }
}

/// A fixed bank of relay outputs.
///
/// `index` is 0-based and must be `< len()`. Implementations may panic on an
/// out-of-range index; callers never pass one. There is no read-back: the
/// light controller's stored state is the only record of what was written.
pub trait RelayBank {
    fn len(&self) -> usize;

    fn set_output(&mut self, index: usize, on: bool);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Relay bank without hardware, used by the host build.
#[derive(Debug, Clone)]
pub struct SimulatedRelayBank {
    pins: Vec<i32>,
    levels: Vec<PinLevel>,
}

impl SimulatedRelayBank {
    pub fn new(pins: Vec<i32>) -> Self {
        let levels = vec![PinLevel::RELEASED; pins.len()];
        Self { pins, levels }
    }

    pub fn pin(&self, index: usize) -> i32 {
        self.pins[index]
    }

    pub fn level(&self, index: usize) -> PinLevel {
        self.levels[index]
    }
}

impl RelayBank for SimulatedRelayBank {
    fn len(&self) -> usize {
        self.pins.len()
    }

    fn set_output(&mut self, index: usize, on: bool) {
        self.levels[index] = PinLevel::for_power(on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_drives_pin_low() {
        assert_eq!(PinLevel::for_power(true), PinLevel::Low);
        assert_eq!(PinLevel::for_power(false), PinLevel::High);
    }

    #[test]
    fn claimed_pins_start_released() {
        assert_eq!(PinLevel::RELEASED, PinLevel::for_power(false));

        let bank = SimulatedRelayBank::new(vec![16, 17, 18, 19]);
        assert!((0..bank.len()).all(|index| bank.level(index) == PinLevel::RELEASED));
    }

    #[test]
    fn simulated_bank_tracks_levels() {
        let mut bank = SimulatedRelayBank::new(vec![16, 17]);
        assert_eq!(bank.level(1), PinLevel::High);

        bank.set_output(1, true);
        assert_eq!(bank.level(1), PinLevel::Low);
        assert_eq!(bank.level(0), PinLevel::High);
        assert_eq!(bank.pin(1), 17);
    }
}
