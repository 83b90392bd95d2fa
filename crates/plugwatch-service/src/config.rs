//! Service configuration.
//!
//! Configuration is an immutable snapshot built once at startup: a TOML
//! file (default path under the user config dir), then `PLUGWATCH_*`
//! environment overrides for identity and credentials, then CLI overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// The supervised device.
    pub device: DeviceConfig,
    /// Cloud gateway settings.
    pub cloud: CloudConfig,
    /// Local-mode settings.
    pub local: LocalConfig,
    /// Charge control loop settings.
    pub charge: ChargeConfig,
    /// Connectivity monitor settings.
    pub monitor: MonitorConfig,
    /// Telemetry sink settings.
    pub telemetry: TelemetryConfig,
    /// Notification channel settings.
    pub notifications: NotifyConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when no file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply `PLUGWATCH_*` environment overrides.
    ///
    /// Identity and credentials are usually injected through the
    /// environment, so these win over the file.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides through an injected lookup, so tests can
    /// override without touching the process environment.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PLUGWATCH_DEVICE_ID") {
            self.device.id = v;
        }
        if let Some(v) = lookup("PLUGWATCH_USE_LOCAL") {
            self.device.local = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("PLUGWATCH_API_REGION") {
            self.cloud.region = v;
        }
        if let Some(v) = lookup("PLUGWATCH_API_KEY") {
            self.cloud.api_key = v;
        }
        if let Some(v) = lookup("PLUGWATCH_API_SECRET") {
            self.cloud.api_secret = v;
        }
        if let Some(v) = lookup("PLUGWATCH_DEVICE_ADDR") {
            self.local.address = v;
        }
        if let Some(v) = lookup("PLUGWATCH_LOCAL_KEY") {
            self.local.key = v;
        }
        if let Some(v) = lookup("PLUGWATCH_INFLUX_URL") {
            self.telemetry.url = Some(v);
        }
        if let Some(v) = lookup("PLUGWATCH_INFLUX_TOKEN") {
            self.telemetry.token = Some(v);
        }
        if let Some(v) = lookup("PLUGWATCH_INFLUX_ORG") {
            self.telemetry.org = v;
        }
        if let Some(v) = lookup("PLUGWATCH_INFLUX_BUCKET") {
            self.telemetry.bucket = v;
        }
        if let Some(v) = lookup("PLUGWATCH_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(v);
        }
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Device id is present
    /// - Mode-specific requirements (cloud credentials, local address)
    /// - Battery thresholds are ordered and within 0-100
    /// - Poll intervals are within reasonable bounds
    /// - Telemetry settings are complete when a sink is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());

        if self.device.id.is_empty() {
            errors.push(ValidationError {
                field: "device.id".to_string(),
                message: "device id cannot be empty".to_string(),
            });
        }

        if self.device.local {
            if self.local.address.is_empty() {
                errors.push(ValidationError {
                    field: "local.address".to_string(),
                    message: "local mode requires the device address".to_string(),
                });
            }
        } else {
            if plugwatch_core::region_base_url(&self.cloud.region).is_none() {
                errors.push(ValidationError {
                    field: "cloud.region".to_string(),
                    message: format!(
                        "unknown region '{}' (expected one of us, eu, cn, in)",
                        self.cloud.region
                    ),
                });
            }
            if self.cloud.api_key.is_empty() || self.cloud.api_secret.is_empty() {
                errors.push(ValidationError {
                    field: "cloud.api_key".to_string(),
                    message: "cloud mode requires api_key and api_secret".to_string(),
                });
            }
        }

        errors.extend(self.charge.validate());
        errors.extend(self.monitor.validate());
        errors.extend(self.telemetry.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
            return errors;
        }

        let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
        if parts.len() != 2 {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            });
        } else {
            match parts[0].parse::<u16>() {
                Ok(0) => errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: "port cannot be 0".to_string(),
                }),
                Err(_) => errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!("invalid port '{}': must be a number 1-65535", parts[0]),
                }),
                Ok(_) => {}
            }
        }

        errors
    }
}

/// The supervised device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device id at the cloud gateway.
    pub id: String,
    /// Friendly name used in notifications and telemetry tags.
    pub name: String,
    /// Drive the device over the LAN instead of the cloud.
    pub local: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "Smart Plug".to_string(),
            local: false,
        }
    }
}

/// Cloud gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Gateway region: us, eu, cn or in.
    pub region: String,
    /// API key (sent as the client id).
    pub api_key: String,
    /// API secret (sent as the bearer token).
    pub api_secret: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: "us".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

/// Local-mode settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Device address on the LAN.
    pub address: String,
    /// Device password; empty for unprotected devices.
    pub key: String,
}

/// Charge control loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeConfig {
    /// Whether the charge control loop runs.
    pub enabled: bool,
    /// Networks on which the loop is allowed to act.
    pub allowed_ssids: Vec<String>,
    /// Stop charging at or above this percentage.
    pub battery_max: u8,
    /// Start charging below this percentage.
    pub battery_min: u8,
    /// Poll interval in seconds.
    pub interval: u64,
    /// Socket index driving the charger relay.
    pub switch: u32,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_ssids: Vec::new(),
            battery_max: 100,
            battery_min: 20,
            interval: 60,
            switch: 2,
        }
    }
}

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = 5;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

fn validate_interval(field: &str, interval: u64) -> Option<ValidationError> {
    if interval < MIN_POLL_INTERVAL {
        Some(ValidationError {
            field: field.to_string(),
            message: format!(
                "poll interval {interval} is too short (minimum {MIN_POLL_INTERVAL} seconds)"
            ),
        })
    } else if interval > MAX_POLL_INTERVAL {
        Some(ValidationError {
            field: field.to_string(),
            message: format!(
                "poll interval {interval} is too long (maximum {MAX_POLL_INTERVAL} seconds)"
            ),
        })
    } else {
        None
    }
}

impl ChargeConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.battery_max > 100 {
            errors.push(ValidationError {
                field: "charge.battery_max".to_string(),
                message: format!("battery_max {} is above 100", self.battery_max),
            });
        }
        if self.battery_min >= self.battery_max {
            errors.push(ValidationError {
                field: "charge.battery_min".to_string(),
                message: format!(
                    "battery_min {} must be below battery_max {}",
                    self.battery_min, self.battery_max
                ),
            });
        }
        if self.switch == 0 {
            errors.push(ValidationError {
                field: "charge.switch".to_string(),
                message: "switch index is 1-based and cannot be 0".to_string(),
            });
        }
        errors.extend(validate_interval("charge.interval", self.interval));

        errors
    }
}

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether the connectivity monitor runs.
    pub enabled: bool,
    /// Poll interval in seconds.
    pub interval: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 10,
        }
    }
}

impl MonitorConfig {
    fn validate(&self) -> Vec<ValidationError> {
        validate_interval("monitor.interval", self.interval)
            .into_iter()
            .collect()
    }
}

/// Telemetry sink settings. The sink is active only when both `url` and
/// `token` are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Sink base URL.
    pub url: Option<String>,
    /// Access token.
    pub token: Option<String>,
    /// Organization.
    pub org: String,
    /// Bucket the measurements go to.
    pub bucket: String,
}

impl TelemetryConfig {
    /// Whether a sink is configured.
    pub fn enabled(&self) -> bool {
        self.url.is_some() && self.token.is_some()
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(url) = &self.url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "telemetry.url".to_string(),
                message: format!("invalid sink URL '{url}': must start with http:// or https://"),
            });
        }
        if self.enabled() && self.bucket.is_empty() {
            errors.push(ValidationError {
                field: "telemetry.bucket".to_string(),
                message: "bucket cannot be empty when telemetry is configured".to_string(),
            });
        }

        errors
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Send desktop notifications.
    pub desktop: bool,
    /// Application name shown by the desktop environment.
    pub app_name: String,
    /// Optional chat/webhook endpoint to post notifications to.
    pub webhook_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            desktop: true,
            app_name: "plugwatch".to_string(),
            webhook_url: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `charge.battery_min`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plugwatch")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_cloud_config() -> Config {
        let mut config = Config::default();
        config.device.id = "eb03bbe4df01c1351aaxjz".to_string();
        config.cloud.api_key = "key".to_string();
        config.cloud.api_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.cloud.region, "us");
        assert!(!config.device.local);
        assert_eq!(config.charge.battery_max, 100);
        assert_eq!(config.charge.battery_min, 20);
        assert_eq!(config.charge.interval, 60);
        assert_eq!(config.charge.switch, 2);
        assert_eq!(config.monitor.interval, 10);
        assert!(!config.telemetry.enabled());
        assert!(config.notifications.desktop);
        assert_eq!(config.notifications.app_name, "plugwatch");
    }

    #[test]
    fn test_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:5000"

            [device]
            id = "eb03bbe4df01c1351aaxjz"
            name = "Socket Kamar Tidur"
            local = false

            [cloud]
            region = "eu"
            api_key = "key"
            api_secret = "secret"

            [charge]
            allowed_ssids = ["frans-extender", "Frans-IOT"]
            battery_max = 90
            battery_min = 25
            interval = 120
            switch = 2

            [monitor]
            interval = 15

            [telemetry]
            url = "http://localhost:8086"
            token = "influx-token"
            org = "home"
            bucket = "plugwatch"

            [notifications]
            desktop = true
            app_name = "tuya-app"
            webhook_url = "https://example.com/hook"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.device.name, "Socket Kamar Tidur");
        assert_eq!(config.cloud.region, "eu");
        assert_eq!(config.charge.allowed_ssids.len(), 2);
        assert_eq!(config.charge.battery_max, 90);
        assert_eq!(config.monitor.interval, 15);
        assert!(config.telemetry.enabled());
        assert_eq!(config.notifications.app_name, "tuya-app");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("service.toml");
        std::fs::write(&path, "[device]\nid = \"dev\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.device.id, "dev");
    }

    #[test]
    fn test_load_nonexistent() {
        let result = Config::load("/nonexistent/path/service.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("invalid.toml");
        std::fs::write(&path, "this is not valid { toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_requires_device_id() {
        let mut config = valid_cloud_config();
        config.device.id.clear();
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "device.id"));
    }

    #[test]
    fn test_validate_cloud_credentials() {
        let mut config = valid_cloud_config();
        config.cloud.api_secret.clear();
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "cloud.api_key"));
    }

    #[test]
    fn test_validate_unknown_region() {
        let mut config = valid_cloud_config();
        config.cloud.region = "mars".to_string();
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "cloud.region"));
    }

    #[test]
    fn test_validate_local_mode_requires_address() {
        let mut config = valid_cloud_config();
        config.device.local = true;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "local.address"));

        // With an address, no cloud credentials are needed.
        config.local.address = "192.168.0.42".to_string();
        config.cloud.api_key.clear();
        config.cloud.api_secret.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_thresholds() {
        let mut config = valid_cloud_config();
        config.charge.battery_min = 90;
        config.charge.battery_max = 80;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "charge.battery_min"));
    }

    #[test]
    fn test_validate_interval_bounds() {
        let mut config = valid_cloud_config();
        config.charge.interval = 1;
        config.monitor.interval = 7200;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "charge.interval"));
        assert!(errors.iter().any(|e| e.field == "monitor.interval"));
    }

    #[test]
    fn test_validate_switch_index() {
        let mut config = valid_cloud_config();
        config.charge.switch = 0;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "charge.switch"));
    }

    #[test]
    fn test_validate_telemetry_url() {
        let mut config = valid_cloud_config();
        config.telemetry.url = Some("localhost:8086".to_string());
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "telemetry.url"));
    }

    #[test]
    fn test_validate_telemetry_bucket_required() {
        let mut config = valid_cloud_config();
        config.telemetry.url = Some("http://localhost:8086".to_string());
        config.telemetry.token = Some("token".to_string());
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "telemetry.bucket"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_from(|name| match name {
            "PLUGWATCH_DEVICE_ID" => Some("env-device".to_string()),
            "PLUGWATCH_API_KEY" => Some("env-key".to_string()),
            "PLUGWATCH_API_SECRET" => Some("env-secret".to_string()),
            "PLUGWATCH_USE_LOCAL" => Some("TRUE".to_string()),
            "PLUGWATCH_DEVICE_ADDR" => Some("192.168.0.42".to_string()),
            "PLUGWATCH_LOCAL_KEY" => Some("env-local-key".to_string()),
            "PLUGWATCH_INFLUX_URL" => Some("http://localhost:8086".to_string()),
            "PLUGWATCH_INFLUX_TOKEN" => Some("env-token".to_string()),
            _ => None,
        });

        assert_eq!(config.device.id, "env-device");
        assert!(config.device.local);
        assert_eq!(config.cloud.api_key, "env-key");
        assert_eq!(config.local.address, "192.168.0.42");
        assert_eq!(config.local.key, "env-local-key");
        assert!(config.telemetry.enabled());
    }

    #[test]
    fn test_env_overrides_leave_unset_fields() {
        let mut config = valid_cloud_config();
        config.apply_env_from(|_| None);
        assert_eq!(config.device.id, "eb03bbe4df01c1351aaxjz");
        assert_eq!(config.cloud.api_key, "key");
    }

    #[test]
    fn test_bind_validation() {
        let mut config = valid_cloud_config();

        config.server.bind = "127.0.0.1".to_string();
        assert!(config.validate().is_err());

        config.server.bind = "127.0.0.1:0".to_string();
        assert!(config.validate().is_err());

        config.server.bind = "127.0.0.1:abc".to_string();
        assert!(config.validate().is_err());

        config.server.bind = "[::1]:5000".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("plugwatch/service.toml"));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError {
            field: "charge.interval".to_string(),
            message: "too short".to_string(),
        };
        assert_eq!(error.to_string(), "charge.interval: too short");
    }
}
