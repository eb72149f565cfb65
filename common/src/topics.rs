pub const LIGHT_SEGMENT: &str = "light";
pub const SUFFIX_SET: &str = "set";
pub const SUFFIX_GET_STATUS: &str = "getStatus";
pub const SUFFIX_STATUS: &str = "status";
pub const SUFFIX_SET_TIMER: &str = "setTimer";
pub const SUFFIX_CLEAR_TIMER: &str = "clearTimer";
pub const SUFFIX_LOG: &str = "log";
pub const SUFFIX_AVAILABILITY: &str = "availability";

/// Topic names derived from the configured prefix, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    light_root: String,
    set_timer: String,
    clear_timer: String,
    log: String,
    availability: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let light_root = format!("{prefix}/{LIGHT_SEGMENT}/");
        Self {
            set_timer: format!("{prefix}/{SUFFIX_SET_TIMER}"),
            clear_timer: format!("{prefix}/{SUFFIX_CLEAR_TIMER}"),
            log: format!("{light_root}{SUFFIX_LOG}"),
            availability: format!("{light_root}{SUFFIX_AVAILABILITY}"),
            light_root,
        }
    }

    /// `{prefix}/light/`, the part every per-light topic starts with.
    pub fn light_root(&self) -> &str {
        &self.light_root
    }

    pub fn set_timer(&self) -> &str {
        &self.set_timer
    }

    pub fn clear_timer(&self) -> &str {
        &self.clear_timer
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn availability(&self) -> &str {
        &self.availability
    }

    pub fn light_status(&self, light_number: usize) -> String {
        format!("{}{light_number}/{SUFFIX_STATUS}", self.light_root)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            format!("{}+/{SUFFIX_SET}", self.light_root),
            format!("{}+/{SUFFIX_GET_STATUS}", self.light_root),
            self.set_timer.clone(),
            self.clear_timer.clone(),
        ]
    }
}
