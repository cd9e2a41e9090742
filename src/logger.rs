//! Logger initialization.
//!
//! Lines are prefixed with the UTC time:
//!
//! ```text
//! 2026-10-18 13:05:42 INFO  Certificate for example.com expires on: 2027-01-15 12:00:00
//! ```

use log::{LevelFilter, SetLoggerError};
use std::io::Write;

/// Initializes `env_logger` for the binary.
///
/// `RUST_LOG` is read first; the level chosen from `verbose` (`debug` when
/// set, `info` otherwise) then applies to this crate. HTTP server internals
/// stay at `warn`.
///
/// # Errors
///
/// Returns an error if a logger was already installed.
pub fn init_logger(verbose: bool) -> Result<(), SetLoggerError> {
    let level = level_for(verbose);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("checkwebcert", level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    builder.try_init()
}

/// Log level for this crate.
pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(true), LevelFilter::Debug);
        assert_eq!(level_for(false), LevelFilter::Info);
    }

    #[test]
    fn test_init_logger_twice() {
        // only the first installation in a process can succeed
        let _ = init_logger(false);
        assert!(init_logger(true).is_err());
    }
}
