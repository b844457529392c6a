//! Runtime debug toggle for frame tracing.
//!
//! Operators flip this at runtime (typically from a host command such as
//! `/busdebug on`) to log every frame published and received. It is shared
//! by the bus, registry, and listener through an `Arc`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared on/off switch for per-frame trace logging.
#[derive(Debug, Clone, Default)]
pub struct DebugMode {
    enabled: Arc<AtomicBool>,
}

impl DebugMode {
    /// Create a toggle in the given state.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// Current state.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turn tracing on or off.
    pub fn set(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            log::info!("Bus frame tracing {}", if enabled { "enabled" } else { "disabled" });
        }
    }
}

/// Parse an operator's on/off argument.
///
/// Accepts `on`/`off`, `true`/`false`, `yes`/`no`, and `1`/`0`, ignoring
/// case and surrounding whitespace. Returns `None` for anything else so the
/// caller can print usage.
pub fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toggle() {
        assert_eq!(parse_toggle("on"), Some(true));
        assert_eq!(parse_toggle("ON"), Some(true));
        assert_eq!(parse_toggle(" off "), Some(false));
        assert_eq!(parse_toggle("Off"), Some(false));
        assert_eq!(parse_toggle("0"), Some(false));
        assert_eq!(parse_toggle("maybe"), None);
        assert_eq!(parse_toggle(""), None);
    }

    #[test]
    fn test_off_disables_after_on() {
        let mode = DebugMode::default();
        mode.set(parse_toggle("on").unwrap());
        assert!(mode.is_enabled());
        mode.set(parse_toggle("off").unwrap());
        assert!(!mode.is_enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let mode = DebugMode::new(false);
        let other = mode.clone();
        other.set(true);
        assert!(mode.is_enabled());
    }
}
