use std::path::Path;
use std::sync::Mutex;

use log::{debug, error, info, log_enabled, warn, Level, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::json::JsonEncoder;
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;
use once_cell::sync::Lazy;

use crate::error::AppError;

const FILE_LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f%:z)} {l} {t} - {m}{n}";

/// Logger singleton
pub static LOG: Lazy<Mutex<Logger>> = Lazy::new(|| Mutex::new(Logger { handle: None }));

/// Logger debug log function
pub fn debug(target: &str, msg: &str) {
    if let Ok(logger) = LOG.lock() {
        logger.debug(target, msg);
    }
}

/// Logger info log function
pub fn info(target: &str, msg: &str) {
    if let Ok(logger) = LOG.lock() {
        logger.info(target, msg);
    }
}

/// Logger warn log function
pub fn warn(target: &str, msg: &str) {
    if let Ok(logger) = LOG.lock() {
        logger.warn(target, msg);
    }
}

/// Logger error log function
pub fn error(target: &str, msg: &str) {
    if let Ok(logger) = LOG.lock() {
        logger.error(target, msg);
    }
}

/// Simplify code location macro usage for log target
#[macro_export]
macro_rules! target {
    () => {{
        format!("{}:{}:{}", file!(), line!(), column!())
    }};
}

pub use target;

/// Construct logging implementation
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LogLevel {
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::DEBUG => LevelFilter::Debug,
            LogLevel::INFO => LevelFilter::Info,
            LogLevel::WARN => LevelFilter::Warn,
            LogLevel::ERROR => LevelFilter::Error,
        }
    }
}

pub struct Logger {
    handle: Option<Handle>,
}

impl Logger {
    /// Configure logger. Records are written as JSON to stderr, unless a log file is given,
    /// in which case they are appended to that file (keeping the console free for command output).
    ///
    /// # Arguments
    ///
    /// * `level` - Minimum level of records to emit
    /// * `log_file` - Optional file to receive log records
    ///
    /// # Returns
    ///
    /// A [`Result`] indicating success/failure of the logger setup.
    ///
    pub fn configure(&mut self, level: LogLevel, log_file: Option<&Path>) -> Result<(), AppError> {
        let appender = match log_file {
            Some(log_file) => {
                let file_appender = FileAppender::builder()
                    .encoder(Box::new(PatternEncoder::new(FILE_LOG_PATTERN)))
                    .build(log_file)
                    .map_err(|err| {
                        AppError::IoWithMsg(format!("Failed to open log file: path={:?}", log_file), err)
                    })?;
                Appender::builder().build("main", Box::new(file_appender))
            }
            None => {
                let stderr = ConsoleAppender::builder()
                    .target(Target::Stderr)
                    .encoder(Box::new(JsonEncoder::new()))
                    .build();
                Appender::builder().build("main", Box::new(stderr))
            }
        };

        let log_config = log4rs::config::Config::builder()
            .appender(appender)
            .build(Root::builder().appender("main").build(level.into()))
            .map_err(|err| {
                AppError::GenWithMsgAndErr("Invalid logging configuration".to_string(), Box::new(err))
            })?;

        match &self.handle {
            Some(handle) => handle.set_config(log_config),
            None => {
                self.handle = Some(log4rs::init_config(log_config).map_err(|err| {
                    AppError::GenWithMsgAndErr("Failed to initialize logger".to_string(), Box::new(err))
                })?)
            }
        }

        Ok(())
    }

    /// debug-level logging
    pub fn debug(&self, target: &str, msg: &str) {
        if log_enabled!(Level::Debug) {
            debug!(target: target, "{}", msg);
        }
    }

    /// info-level logging
    pub fn info(&self, target: &str, msg: &str) {
        if log_enabled!(Level::Info) {
            info!(target: target, "{}", msg);
        }
    }

    /// warn-level logging
    pub fn warn(&self, target: &str, msg: &str) {
        if log_enabled!(Level::Warn) {
            warn!(target: target, "{}", msg);
        }
    }

    /// error-level logging
    pub fn error(&self, target: &str, msg: &str) {
        if log_enabled!(Level::Error) {
            error!(target: target, "{}", msg);
        }
    }
}
