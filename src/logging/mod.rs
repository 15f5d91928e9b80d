//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - JSON-formatted log files with rotation
//! - Configurable log levels
//! - Human-readable console output
//!
//! # Example
//!
//! ```no_run
//! use quarry::logging::init_logging;
//! use quarry::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! // Use tracing macros for logging
//! tracing::info!("Application started");
//! tracing::error!(error = "Something went wrong", "Error occurred");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};

/// Log the start of a datatype export
///
/// # Example
///
/// ```no_run
/// use quarry::log_export_start;
/// use quarry::domain::ids::DatatypeName;
///
/// let datatype = DatatypeName::new("users").unwrap();
/// log_export_start!(&datatype, 1200u64);
/// ```
#[macro_export]
macro_rules! log_export_start {
    ($datatype:expr, $expected:expr) => {
        tracing::info!(
            datatype = %$datatype,
            expected = $expected,
            "Starting export"
        );
    };
}

/// Log the completion of a datatype export
///
/// # Example
///
/// ```no_run
/// use quarry::log_export_complete;
/// use std::time::Duration;
///
/// let duration = Duration::from_secs(10);
/// log_export_complete!("users", 42u64, duration);
/// ```
#[macro_export]
macro_rules! log_export_complete {
    ($datatype:expr, $count:expr, $duration:expr) => {
        tracing::info!(
            datatype = %$datatype,
            count = $count,
            duration_ms = $duration.as_millis() as u64,
            "Export completed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use quarry::log_error_with_context;
/// use quarry::domain::QuarryError;
///
/// let error = QuarryError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log a flushed page
///
/// # Example
///
/// ```no_run
/// use quarry::log_batch_processing;
///
/// log_batch_processing!("users", 100u64, 1000u64);
/// ```
#[macro_export]
macro_rules! log_batch_processing {
    ($datatype:expr, $current:expr, $total:expr) => {
        tracing::debug!(
            datatype = %$datatype,
            current = $current,
            total = $total,
            progress_pct = if $total == 0 {
                100.0
            } else {
                $current as f64 / $total as f64 * 100.0
            },
            "Processing batch"
        );
    };
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[test]
    fn test_macros_expand_without_subscriber() {
        log_export_start!("users", 3u64);
        log_batch_processing!("users", 2u64, 3u64);
        log_batch_processing!("users", 0u64, 0u64);
        log_export_complete!("users", 3u64, Duration::from_millis(5));
        log_error_with_context!("boom", "test");
    }
}
