//! Leveled library logger.
//!
//! The session reports what it does through a small leveled logger rather than
//! calling `tracing` directly, so host applications can silence the library
//! entirely or route its messages somewhere else without installing a
//! subscriber. The default sink forwards to `tracing` under the `bluewing`
//! target; the default level is [`LogLevel::None`].
//!
//! ```
//! use bluewing_core::logger::{LogLevel, Logger};
//!
//! let logger = Logger::new();
//! logger.set_level(LogLevel::Debug);
//! assert!(logger.enabled(LogLevel::Error));
//! assert!(!logger.enabled(LogLevel::Verbose));
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

use serde::{Deserialize, Serialize};

/// Tracing target used by [`TracingSink`].
pub const LOG_TARGET: &str = "bluewing";

/// Verbosity of the library logger, ordered `None < Error < Debug < Verbose`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LogLevel {
    /// Emit nothing.
    #[default]
    None = 0,
    Error = 1,
    Debug = 2,
    Verbose = 3,
}

impl LogLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LogLevel::Error,
            2 => LogLevel::Debug,
            3 => LogLevel::Verbose,
            _ => LogLevel::None,
        }
    }
}

/// Destination for library log messages.
pub trait LogSink: Send + Sync {
    /// Write one message. Only called for levels that pass the filter.
    fn log(&self, level: LogLevel, message: &str);
}

/// Sink that forwards messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: LOG_TARGET, "{}", message),
            LogLevel::Debug => tracing::debug!(target: LOG_TARGET, "{}", message),
            LogLevel::Verbose => tracing::trace!(target: LOG_TARGET, "{}", message),
            LogLevel::None => {}
        }
    }
}

/// Leveled logger with a replaceable sink.
///
/// A process-wide instance is available through [`Logger::global`] and is
/// what the `ble_error!`, `ble_debug!` and `ble_verbose!` macros write to.
pub struct Logger {
    level: AtomicU8,
    sink: RwLock<Arc<dyn LogSink>>,
}

static GLOBAL: LazyLock<Logger> = LazyLock::new(Logger::new);

impl Logger {
    /// Create a logger at [`LogLevel::None`] writing to [`TracingSink`].
    pub fn new() -> Self {
        Self {
            level: AtomicU8::new(LogLevel::None as u8),
            sink: RwLock::new(Arc::new(TracingSink)),
        }
    }

    /// The process-wide logger.
    pub fn global() -> &'static Logger {
        &GLOBAL
    }

    /// Set the active level.
    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// The active level.
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Whether a message at `level` would be written.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::None && level <= self.level()
    }

    /// Replace the sink.
    pub fn set_sink(&self, sink: Arc<dyn LogSink>) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = sink;
    }

    /// Restore the default [`TracingSink`].
    pub fn reset_sink(&self) {
        self.set_sink(Arc::new(TracingSink));
    }

    /// Write `message` if `level` passes the filter.
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.enabled(level) {
            self.current_sink().log(level, message);
        }
    }

    /// Write a lazily built message; `message` only runs if `level` passes the filter.
    pub fn log_with(&self, level: LogLevel, message: impl FnOnce() -> String) {
        if self.enabled(level) {
            self.current_sink().log(level, &message());
        }
    }

    fn current_sink(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.sink.read().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

/// Log at [`LogLevel::Error`](crate::logger::LogLevel::Error) through the global logger.
#[macro_export]
macro_rules! ble_error {
    ($($arg:tt)+) => {
        $crate::logger::Logger::global()
            .log_with($crate::logger::LogLevel::Error, || format!($($arg)+))
    };
}

/// Log at [`LogLevel::Debug`](crate::logger::LogLevel::Debug) through the global logger.
#[macro_export]
macro_rules! ble_debug {
    ($($arg:tt)+) => {
        $crate::logger::Logger::global()
            .log_with($crate::logger::LogLevel::Debug, || format!($($arg)+))
    };
}

/// Log at [`LogLevel::Verbose`](crate::logger::LogLevel::Verbose) through the global logger.
#[macro_export]
macro_rules! ble_verbose {
    ($($arg:tt)+) => {
        $crate::logger::Logger::global()
            .log_with($crate::logger::LogLevel::Verbose, || format!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CaptureSink {
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogSink for CaptureSink {
        fn log(&self, level: LogLevel, message: &str) {
            self.lines.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(LogLevel::None < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Verbose);
        assert_eq!(LogLevel::default(), LogLevel::None);
    }

    #[test]
    fn test_filtering_by_level() {
        let logger = Logger::new();
        let sink = Arc::new(CaptureSink::default());
        logger.set_sink(sink.clone());

        logger.log(LogLevel::Error, "dropped while silent");

        logger.set_level(LogLevel::Debug);
        logger.log(LogLevel::Error, "kept error");
        logger.log(LogLevel::Debug, "kept debug");
        logger.log(LogLevel::Verbose, "dropped verbose");

        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (LogLevel::Error, "kept error".to_string()),
                (LogLevel::Debug, "kept debug".to_string()),
            ]
        );
    }

    #[test]
    fn test_lazy_message_not_built_when_filtered() {
        let logger = Logger::new();
        logger.set_level(LogLevel::Error);
        let mut built = false;
        logger.log_with(LogLevel::Verbose, || {
            built = true;
            String::from("expensive")
        });
        assert!(!built);
    }

    #[test]
    fn test_none_level_message_never_written() {
        let logger = Logger::new();
        let sink = Arc::new(CaptureSink::default());
        logger.set_sink(sink.clone());
        logger.set_level(LogLevel::Verbose);
        logger.log(LogLevel::None, "never");
        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn test_level_round_trips_through_atomic() {
        let logger = Logger::new();
        for level in [LogLevel::None, LogLevel::Error, LogLevel::Debug, LogLevel::Verbose] {
            logger.set_level(level);
            assert_eq!(logger.level(), level);
        }
    }
}
