use std::sync::OnceLock;

use serde_json::Value;

use crate::error::ConvertError;

type LogSink = Box<dyn Fn(&Value) + Send + Sync>;

// Sink installed by the embedding front end (CLI, host add-on bridge).
static LOG_SINK: OnceLock<LogSink> = OnceLock::new();

/// ログレベル定義
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Install the record sink. Only the first call wins.
pub fn init_logging(sink: impl Fn(&Value) + Send + Sync + 'static) {
    if LOG_SINK.set(Box::new(sink)).is_err() {
        log::warn!("Logging system already initialized");
    }
}

/// Build the JSON record delivered to sinks.
pub fn log_record(level: LogLevel, message: &str) -> Value {
    serde_json::json!({
        "level": level.as_str(),
        "message": message,
        "timestamp": jiff::Zoned::now().to_string()
    })
}

/// Send a log message to the installed sink, or to the `log` facade when
/// no sink is installed.
pub fn send_log(level: LogLevel, message: &str) {
    match LOG_SINK.get() {
        Some(sink) => sink(&log_record(level, message)),
        None => log::log!(target: "rigify_export", log::Level::from(level), "{}", message),
    }
}

/// Log a ConvertError at error level.
pub fn log_convert_error(error: &ConvertError, context: Option<&str>) {
    let message = match context {
        Some(ctx) => format!("{}: {}", ctx, error),
        None => error.to_string(),
    };

    send_log(LogLevel::Error, &message);
}

/// Convenience macros for logging
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Debug, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Error, &format!($($arg)*))
    };
}

/// Result extension for convenient error logging
pub trait ResultExt<T, E> {
    fn log_error(self, context: Option<&str>) -> Self;
}

impl<T> ResultExt<T, ConvertError> for Result<T, ConvertError> {
    fn log_error(self, context: Option<&str>) -> Self {
        if let Err(ref error) = self {
            log_convert_error(error, context);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_warn_level_when_building_record_then_fields_are_present() {
        let record = log_record(LogLevel::Warn, "bone 'nose' not found");
        assert_eq!(record["level"], "warn");
        assert_eq!(record["message"], "bone 'nose' not found");
        assert!(record["timestamp"].as_str().is_some_and(|ts| !ts.is_empty()));
    }

    #[test]
    fn given_log_levels_when_mapping_to_facade_then_levels_match() {
        assert_eq!(log::Level::from(LogLevel::Debug), log::Level::Debug);
        assert_eq!(log::Level::from(LogLevel::Info), log::Level::Info);
        assert_eq!(log::Level::from(LogLevel::Warn), log::Level::Warn);
        assert_eq!(log::Level::from(LogLevel::Error), log::Level::Error);
    }

    #[test]
    fn given_error_result_when_logging_then_result_passes_through() {
        let result: Result<(), ConvertError> = Err(ConvertError::Cancelled);
        let passed = result.log_error(Some("bake"));
        assert_eq!(passed, Err(ConvertError::Cancelled));
    }
}
