//! Logging backend setup (`log` facade + `flexi_logger`).
//!
//! Everything goes to stderr so stdout stays reserved for the report. With a
//! log directory, records are also written to size-rotated files there.

use std::path::Path;

use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};

use crate::error::AppError;

/// Level spec used when neither `--log-level` nor `STARCAL_LOG` is set.
pub const DEFAULT_LEVEL: &str = "info";

/// Pick the level spec: explicit flag, then `STARCAL_LOG`, then the default.
pub fn resolve_level(flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var("STARCAL_LOG").ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

/// Start the logger. Keep the returned handle alive for the whole run.
pub fn init(level: &str, log_dir: Option<&Path>) -> Result<LoggerHandle, AppError> {
    let logger = Logger::try_with_str(level)
        .map_err(|e| AppError::config(format!("Invalid log level '{level}': {e}")))?;

    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir).basename("starcal"))
            .duplicate_to_stderr(Duplicate::All)
            .rotate(
                Criterion::Size(1024 * 1024),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(5),
            ),
        None => logger.log_to_stderr(),
    };

    logger
        .start()
        .map_err(|e| AppError::io(format!("Logger initialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_wins() {
        assert_eq!(resolve_level(Some("debug")), "debug");
        assert_eq!(resolve_level(Some("starcal=trace,info")), "starcal=trace,info");
    }
}
