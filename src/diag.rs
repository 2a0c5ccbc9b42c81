//! Leveled, suppressible logging used throughout the crate.
//!
//! This is a thin wrapper around the `log` facade rather than a logging
//! backend: production binaries install whatever subscriber they like
//! (`env_logger` in our tests), and this module just adds the
//! per-process threshold and substring-suppression list so that tests
//! can run deterministically even when a noisy subsystem is under test.

use std::sync::RwLock;

use log::Level;

struct Threshold {
    level: Level,
    suppress: Vec<String>,
}

static THRESHOLD: RwLock<Threshold> = RwLock::new(Threshold {
    level: Level::Info,
    suppress: Vec::new(),
});

/// Set the minimum level that will be forwarded to the `log` facade.
pub fn set_threshold(level: Level) {
    THRESHOLD.write().unwrap().level = level;
}

/// Suppress any log line containing `needle`. Used by tests to silence
/// expected-but-noisy drop/warn paths.
pub fn suppress(needle: impl Into<String>) {
    THRESHOLD.write().unwrap().suppress.push(needle.into());
}

/// Clear the suppression list (threshold is left as-is).
pub fn clear_suppressions() {
    THRESHOLD.write().unwrap().suppress.clear();
}

#[doc(hidden)]
pub fn allowed(level: Level, msg: &str) -> bool {
    let t = THRESHOLD.read().unwrap();
    if level > t.level {
        return false;
    }
    !t.suppress.iter().any(|s| msg.contains(s.as_str()))
}

/// Emit a log line at `level` if it passes the threshold and suppression
/// filter. Prefer the `log_line!` macro below at call sites.
pub fn emit(level: Level, target: &str, msg: std::fmt::Arguments<'_>) {
    let rendered = msg.to_string();
    if allowed(level, &rendered) {
        log::log!(target: target, level, "{}", rendered);
    }
}

/// Log through the suppression filter, e.g. `log_line!(Level::Warn, "dropped: {}", reason)`.
#[macro_export]
macro_rules! log_line {
    ($level:expr, $($arg:tt)+) => {
        $crate::diag::emit($level, module_path!(), format_args!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_filters_matching_substrings() {
        clear_suppressions();
        set_threshold(Level::Debug);
        assert!(allowed(Level::Warn, "dropped: runt frame"));
        suppress("runt");
        assert!(!allowed(Level::Warn, "dropped: runt frame"));
        assert!(allowed(Level::Warn, "dropped: vlan"));
        clear_suppressions();
    }

    #[test]
    fn threshold_filters_by_level() {
        clear_suppressions();
        set_threshold(Level::Warn);
        assert!(!allowed(Level::Debug, "noisy"));
        assert!(allowed(Level::Error, "important"));
        set_threshold(Level::Info);
    }
}
