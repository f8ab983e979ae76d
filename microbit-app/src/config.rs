//! Controller configuration, stored as `config.json` in the controller home

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Only devices whose advertised name starts with this are offered
    pub name_prefix: String,
    /// Written to the Scrolling Delay characteristic once per connection
    pub scrolling_delay_ms: u16,
    /// How long to scan before picking a device
    pub scan_secs: u64,
    /// Poll interval of the guided self-test
    pub self_test_interval_ms: u64,
    /// Scroll steps the display takes per character, used to estimate when
    /// a message has finished scrolling
    pub scroll_columns_per_char: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name_prefix: microbit_proto::DEVICE_NAME_PREFIX.to_string(),
            scrolling_delay_ms: 100,
            scan_secs: 5,
            self_test_interval_ms: 1000,
            scroll_columns_per_char: 6,
        }
    }
}

impl ControllerConfig {
    /// Load `home/config.json`, writing the defaults there if it is missing
    pub fn load_or_create(home: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(home)?;
        let path = home.join("config.json");

        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let config: Self = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
            tracing::info!(path = %path.display(), "wrote default config");
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.self_test_interval_ms == 0 {
            return Err(ConfigError::Invalid("self_test_interval_ms must be at least 1"));
        }
        Ok(())
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }

    pub fn self_test_interval(&self) -> Duration {
        Duration::from_millis(self.self_test_interval_ms)
    }
}

/// `$MICROBIT_HOME`, or `~/.microbit-ble`
pub fn controller_home() -> PathBuf {
    std::env::var("MICROBIT_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".microbit-ble")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("microbit-app-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_config_is_created_with_defaults() {
        let home = scratch_dir("create");
        let config = ControllerConfig::load_or_create(&home).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert!(home.join("config.json").exists());

        let again = ControllerConfig::load_or_create(&home).unwrap();
        assert_eq!(again, config);
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let home = scratch_dir("partial");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("config.json"), r#"{ "scrolling_delay_ms": 60 }"#).unwrap();

        let config = ControllerConfig::load_or_create(&home).unwrap();
        assert_eq!(config.scrolling_delay_ms, 60);
        assert_eq!(config.name_prefix, "BBC micro:bit");
        assert_eq!(config.scan_duration(), Duration::from_secs(5));
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn zero_self_test_interval_is_rejected() {
        let home = scratch_dir("zero-interval");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("config.json"), r#"{ "self_test_interval_ms": 0 }"#).unwrap();

        assert!(matches!(
            ControllerConfig::load_or_create(&home),
            Err(ConfigError::Invalid(_))
        ));
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn broken_config_is_an_error() {
        let home = scratch_dir("broken");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("config.json"), "{ nope").unwrap();

        assert!(matches!(
            ControllerConfig::load_or_create(&home),
            Err(ConfigError::Json(_))
        ));
        std::fs::remove_dir_all(&home).unwrap();
    }
}
