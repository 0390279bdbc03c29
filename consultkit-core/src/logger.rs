//! Forwards the crate's `log` records to the host app's logger.

use std::sync::{Arc, OnceLock};

/// Logger implemented by the host app.
///
/// ## Swift
///
/// ```swift
/// final class ConsultKitLogBridge: ConsultKit.Logger {
///     func log(level: ConsultKit.LogLevel, message: String) {
///         AppLog.write(level.appLevel, message)
///     }
/// }
///
/// ConsultKit.setLogger(logger: ConsultKitLogBridge()) // once, at launch
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed diagnostics.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of the session lifecycle.
    Info,
    /// Recoverable problems (e.g. unreadable stored accounts).
    Warn,
    /// Failures surfaced to the user.
    Error,
}

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace output from dependencies (reqwest, hyper, rustls) is dropped.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let from_consultkit = module_path.is_some_and(|path| path.starts_with("consultkit"));
    let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    from_consultkit || !verbose
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the host app's logger. Only the first call has an effect.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        println!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
