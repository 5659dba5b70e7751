//! Logging setup
//!
//! The engine logs through the `log` facade; applications pick the backend.
//! [`init_with_level`] wires up `env_logger` with a default level that
//! `RUST_LOG` can still override.

pub use log::{debug, error, info, trace, warn};

/// Parse a level name, falling back to `Info` for anything unrecognized
pub fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{level}', using info");
        log::LevelFilter::Info
    })
}

/// Initialize `env_logger` with a default level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(level: &str) {
    let _ = env_logger::Builder::new()
        .filter_level(parse_level(level))
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
