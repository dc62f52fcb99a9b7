use std::process;

use anyhow::Result;

use certguard::api::{AppConfig, MainProcessor};
use certguard_common::error::AppError;
use certguard_common::logging::{error, LogLevel, LOG};
use certguard_common::target;

fn process_runner() -> Result<(), AppError> {
    let app_config = AppConfig::new()?;

    LOG.lock()
        .map_err(|err| AppError::General(format!("Failed to access logger: err={}", err)))?
        .configure(
            if app_config.verbose_logging {
                LogLevel::DEBUG
            } else {
                LogLevel::INFO
            },
            app_config.log_file.as_deref(),
        )?;

    let mut processor = MainProcessor::new(app_config)?;

    processor.process().map_err(|err| {
        error(&target!(), &format!("Command failed: err={}", &err));
        err
    })
}

pub fn main() -> Result<()> {
    match process_runner() {
        Ok(()) => {
            process::exit(0);
        }
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}
