//! Client configuration.
//!
//! Settings are loaded with figment from a TOML file merged with
//! `ROACH_MC_`-prefixed environment variables, then validated. The
//! supervisor endpoint has no in-code fallback beyond the standard
//! deployment (`localhost:50015`, object `DSS-43`); a client that cannot
//! reach it fails at startup.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::McResult;

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/roach_mc.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Supervisor host.
    #[serde(default = "default_host")]
    pub supervisor_host: String,
    /// Supervisor RPC port.
    #[serde(default = "default_port")]
    pub supervisor_port: u16,
    /// Remote object the proxy addresses.
    #[serde(default = "default_object_id")]
    pub object_id: String,
    /// Period of the cooperative monitor refresh (e.g. "10s").
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,
    /// Bound on TCP connect and on each blocking read.
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub call_timeout: Duration,
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    50015
}

fn default_object_id() -> String {
    "DSS-43".to_string()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            supervisor_host: default_host(),
            supervisor_port: default_port(),
            object_id: default_object_id(),
            refresh_interval: default_refresh_interval(),
            call_timeout: default_call_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load from the default file and `ROACH_MC_` environment overrides.
    pub fn load() -> McResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path (missing file falls back to the
    /// defaults, environment overrides still apply).
    pub fn load_from<P: AsRef<Path>>(path: P) -> McResult<Self> {
        let settings: Settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ROACH_MC_"))
            .extract()?;
        Ok(settings)
    }

    /// Semantic checks on values that parse but cannot work.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "invalid log_level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        if self.supervisor_host.is_empty() {
            return Err("supervisor_host must not be empty".to_string());
        }
        if self.supervisor_port == 0 {
            return Err("supervisor_port must be non-zero".to_string());
        }
        if self.refresh_interval.is_zero() {
            return Err("refresh_interval must be non-zero".to_string());
        }
        if self.call_timeout.is_zero() {
            return Err("call_timeout must be non-zero".to_string());
        }
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.supervisor_host, self.supervisor_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_standard_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.endpoint(), "localhost:50015");
        assert_eq!(settings.object_id, "DSS-43");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let settings = Settings {
            refresh_interval: Duration::ZERO,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let settings = Settings {
            log_level: "loud".into(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
