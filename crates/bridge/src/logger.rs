use std::fmt::{Arguments, Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;

/// Severity of a log record, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Fine-grained lifecycle transitions.
    Trace,

    /// Diagnostic information.
    Debug,

    /// Notable events.
    Info,

    /// Recoverable problems.
    Warn,

    /// Failures, such as terminated messages.
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };

        f.write_str(name)
    }
}

type LogFn = dyn Fn(LogLevel, &str) + Send + Sync;

/// Logging capability injected into a connection.
///
/// The default logger discards everything. Messages are only formatted when a
/// logging function is installed.
#[derive(Clone, Default)]
pub struct Logger {
    log_fn: Option<Arc<LogFn>>,
}

impl Logger {
    /// A logger that discards every record.
    #[must_use]
    pub const fn noop() -> Self {
        Self { log_fn: None }
    }

    /// A logger backed by `log_fn`.
    pub fn new<F>(log_fn: F) -> Self
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        Self {
            log_fn: Some(Arc::new(log_fn)),
        }
    }

    /// A logger forwarding every record to `tracing` at the matching level.
    #[must_use]
    pub fn tracing() -> Self {
        Self::new(|level, message| match level {
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        })
    }

    /// Whether records are discarded.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.log_fn.is_none()
    }

    /// Records `args` at `level`.
    pub fn log(&self, level: LogLevel, args: Arguments<'_>) {
        if let Some(log_fn) = &self.log_fn {
            match args.as_str() {
                Some(message) => log_fn(level, message),
                None => log_fn(level, &args.to_string()),
            }
        }
    }

    /// Records `args` at trace level.
    pub fn trace(&self, args: Arguments<'_>) {
        self.log(LogLevel::Trace, args);
    }

    /// Records `args` at debug level.
    pub fn debug(&self, args: Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }

    /// Records `args` at info level.
    pub fn info(&self, args: Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    /// Records `args` at warn level.
    pub fn warn(&self, args: Arguments<'_>) {
        self.log(LogLevel::Warn, args);
    }

    /// Records `args` at error level.
    pub fn error(&self, args: Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }
}

impl Debug for Logger {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Logger")
            .field("noop", &self.is_noop())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use tracing_test::traced_test;

    #[test]
    fn test_levels_are_ordered() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_default_is_noop() {
        let logger = Logger::default();

        assert!(logger.is_noop());
        logger.error(format_args!("dropped {}", 1));
    }

    #[test]
    fn test_custom_log_fn_receives_formatted_message() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();

        let logger = Logger::new(move |level, message| {
            sink.lock().unwrap().push((level, message.to_string()));
        });

        logger.info(format_args!("stream {} ready", "ORDERS"));
        logger.trace(format_args!("static message"));

        let records = records.lock().unwrap();
        assert_eq!(
            *records,
            vec![
                (LogLevel::Info, "stream ORDERS ready".to_string()),
                (LogLevel::Trace, "static message".to_string()),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn test_tracing_logger_forwards() {
        let logger = Logger::tracing();

        logger.warn(format_args!("consumer {} lagging", "orders-service"));

        assert!(logs_contain("consumer orders-service lagging"));
    }
}
