//! Logging facade for the chartgen workspace.
//!
//! All chartgen crates log through this crate rather than importing `tracing`
//! directly, so the subscriber setup and the macro surface stay in one place.
//!
//! # Setup
//!
//! Call [`init`] once at startup with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be embedded in the surrounding
//! collector's configuration file.
//!
//! ```
//! let config = chartgen_log::LogConfig::default();
//! chartgen_log::init(&config);
//! ```
//!
//! # Conventions
//!
//! Log messages start lowercase and end without punctuation. Levels:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable but recoverable behavior.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] and [`trace!`] for debugging detail.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};

/// The output format of log records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, single line per record.
    #[default]
    Text,
    /// Newline-delimited JSON, one object per record.
    Json,
}

/// Controls the logging subscriber installed by [`init`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The maximum level to emit, as an env-filter directive.
    ///
    /// Defaults to `"info"`. Accepts anything `RUST_LOG` accepts, for
    /// example `"chartgen_engine=debug,info"`.
    pub level: String,
    /// The record format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::default(),
        }
    }
}

/// Initializes the global logging subscriber.
///
/// Repeated calls are ignored, which keeps this safe to call from tests and
/// embedding frameworks alike.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    // A subscriber may already be installed by the host process.
    drop(result);
}

/// Initializes logging for a unit test with debug output for chartgen crates.
#[macro_export]
macro_rules! init_test {
    () => {
        $crate::init(&$crate::LogConfig {
            level: concat!(env!("CARGO_PKG_NAME"), "=debug").replace('-', "_"),
            ..$crate::LogConfig::default()
        });
    };
}
