/*!
 * accessim Core
 *
 * This crate provides the shared vocabulary of the accessory simulator:
 * identifiers, loosely-typed parameter values, protocol and link enums,
 * configuration loading and logging setup.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use chrono;
    pub use serde;
    pub use tracing;
}

/// accessim core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization with the configured logging
pub fn init(config: &config::Config) -> Result<(), error::Error> {
    logging::init_from_config(&config.logging)?;
    tracing::info!("accessim core {} initialized", VERSION);
    Ok(())
}
