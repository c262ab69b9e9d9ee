//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Desk runtime configuration.
#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// How often the assignment sweep retries unassigned tasks.
    pub sweep_interval: Duration,
    /// Broadcast capacity for desk events.
    pub event_capacity: usize,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/staff-desk.db"),
            sweep_interval: Duration::from_secs(60), // 1 minute
            event_capacity: 256,
        }
    }
}

impl DeskConfig {
    /// Build from `STAFF_DESK_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup("STAFF_DESK_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("STAFF_DESK_SWEEP_INTERVAL_SECS") {
            let secs: u64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "STAFF_DESK_SWEEP_INTERVAL_SECS".into(),
                message: format!("{e}"),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "STAFF_DESK_SWEEP_INTERVAL_SECS".into(),
                    message: "must be greater than zero".into(),
                });
            }
            config.sweep_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = DeskConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("./data/staff-desk.db"));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn overrides_from_env() {
        let config = DeskConfig::from_lookup(|key| match key {
            "STAFF_DESK_DB_PATH" => Some("/tmp/desk.db".into()),
            "STAFF_DESK_SWEEP_INTERVAL_SECS" => Some("15".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/desk.db"));
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
    }

    #[test]
    fn rejects_bad_interval() {
        let err = DeskConfig::from_lookup(|key| {
            (key == "STAFF_DESK_SWEEP_INTERVAL_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("STAFF_DESK_SWEEP_INTERVAL_SECS"));

        let err = DeskConfig::from_lookup(|key| {
            (key == "STAFF_DESK_SWEEP_INTERVAL_SECS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
