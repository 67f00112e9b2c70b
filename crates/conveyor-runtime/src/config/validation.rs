//! Configuration validation utilities.

use tokio::sync::Semaphore;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BusConfig, ConveyorConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ConveyorConfig) -> ConfigResult<()> {
    validate_bus_config(&config.bus)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_bus_config(bus: &BusConfig) -> ConfigResult<()> {
    if bus.address.is_empty() {
        return Err(ConfigError::missing_field("bus.address"));
    }

    validate_queue_name(&bus.input_queue)?;

    if bus.workers == 0 {
        return Err(ConfigError::validation("Worker count must be greater than 0"));
    }

    if bus.max_parallelism == 0 {
        return Err(ConfigError::validation(
            "Max parallelism must be greater than 0",
        ));
    }

    if bus.max_parallelism > Semaphore::MAX_PERMITS {
        return Err(ConfigError::validation(format!(
            "Max parallelism cannot exceed {}",
            Semaphore::MAX_PERMITS
        )));
    }

    Ok(())
}

fn validate_queue_name(queue: &str) -> ConfigResult<()> {
    if queue.is_empty() {
        return Err(ConfigError::missing_field("bus.input_queue"));
    }

    if queue.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "Queue name cannot contain whitespace: {queue:?}"
        )));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter module name cannot be empty: {module:?}"
        )));
    }

    Ok(())
}
