#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Process configuration, loaded once from the environment at startup.
//!
//! Unlike a declarative multi-pipeline config, this process has one fixed
//! topology, so `Settings` is a flat, typed struct read from environment
//! variables rather than a YAML document.

use std::env;
use std::time::Duration;

/// All the errors of this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An environment variable was present but could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Name of the offending environment variable.
        name: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Process-wide settings, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Broker host to connect to.
    pub broker_host: String,
    /// Broker port to connect to.
    pub broker_port: u16,
    /// Client identifier the broker adapter presents on connect.
    pub broker_client_id: String,
    /// Connection string for the relational store.
    pub database_url: String,
    /// Bind address for the interactive-connection endpoint.
    pub ws_bind_addr: String,
    /// Initial value of the save flag.
    pub save_flag_default: bool,

    /// Maximum number of raw payloads drained per dispatcher tick.
    pub max_batch: usize,
    /// Maximum time the dispatcher waits for the first payload of a tick.
    pub batch_timeout: Duration,
    /// Maximum number of records accumulated before a broadcast is emitted.
    pub egress_batch: usize,
    /// Maximum time a broadcast batch is held open before being emitted.
    pub egress_timeout: Duration,
    /// Size, in bytes, above which an outbound broadcast frame is compressed.
    pub compression_threshold: usize,
    /// Maximum number of records accumulated before a persistence flush.
    pub db_batch: usize,
    /// Maximum time a persistence batch is held open before being flushed.
    pub db_interval: Duration,
}

impl Settings {
    /// Loads settings from the process environment, falling back to the
    /// defaults fixed by the specification for any variable left unset.
    pub fn from_env() -> Result<Self, Error> {
        let settings = Self {
            broker_host: env_or("BROKER_HOST", "localhost"),
            broker_port: env_parsed("BROKER_PORT", 1883)?,
            broker_client_id: env_or("BROKER_CLIENT_ID", "telemetry-bridge"),
            database_url: env_or("DATABASE_URL", "sqlite://telemetry.db"),
            ws_bind_addr: env_or("WS_BIND_ADDR", "0.0.0.0:8000"),
            save_flag_default: env_parsed("SAVE_FLAG_DEFAULT", false)?,

            max_batch: env_parsed("MAX_BATCH", 2000)?,
            batch_timeout: Duration::from_millis(env_parsed("BATCH_TIMEOUT_MS", 10)?),
            egress_batch: env_parsed("EGRESS_BATCH", 2000)?,
            egress_timeout: Duration::from_millis(env_parsed("EGRESS_TIMEOUT_MS", 50)?),
            compression_threshold: env_parsed("COMPRESSION_THRESHOLD", 1000)?,
            db_batch: env_parsed("DB_BATCH", 500)?,
            db_interval: Duration::from_millis(env_parsed("DB_INTERVAL_MS", 1000)?),
        };

        tracing::debug!(
            broker_host = %settings.broker_host,
            broker_port = settings.broker_port,
            max_batch = settings.max_batch,
            egress_batch = settings.egress_batch,
            db_batch = settings.db_batch,
            "settings loaded from environment"
        );

        Ok(settings)
    }
}

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T>(name: &'static str, default: T) -> Result<T, Error>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| Error::InvalidValue { name, value }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        // Run in isolation from the process environment: construct directly
        // rather than through from_env, since env vars are process-global
        // and tests may run concurrently.
        let settings = Settings {
            broker_host: "localhost".into(),
            broker_port: 1883,
            broker_client_id: "telemetry-bridge".into(),
            database_url: "sqlite://telemetry.db".into(),
            ws_bind_addr: "0.0.0.0:8000".into(),
            save_flag_default: false,
            max_batch: 2000,
            batch_timeout: Duration::from_millis(10),
            egress_batch: 2000,
            egress_timeout: Duration::from_millis(50),
            compression_threshold: 1000,
            db_batch: 500,
            db_interval: Duration::from_millis(1000),
        };
        assert_eq!(settings.max_batch, 2000);
        assert_eq!(settings.db_batch, 500);
    }

    #[test]
    fn env_parsed_rejects_garbage() {
        env::set_var("CONFIG_TEST_GARBAGE", "not-a-number");
        let result: Result<u16, Error> = env_parsed("CONFIG_TEST_GARBAGE", 0);
        env::remove_var("CONFIG_TEST_GARBAGE");
        assert!(result.is_err());
    }
}
