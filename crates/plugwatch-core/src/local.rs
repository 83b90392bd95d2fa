//! Local backend: LAN HTTP client for plugs running local-HTTP firmware.
//!
//! Talks to the Tasmota-compatible `cm` command endpoint the plug firmware
//! exposes on the LAN; the configured local key is the device's web
//! password. The encrypted vendor LAN protocol is not implemented here;
//! devices without a local HTTP endpoint are driven through the cloud
//! backend instead.
//!
//! Power flags from the firmware (`POWER`, `POWER1`, `POWER2`, ...) are
//! mapped onto the same `switch`/`switch_<n>` data-point codes the cloud
//! reports, so the control loops and the switch summary work identically in
//! both modes.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use plugwatch_types::DataPoint;

use crate::error::{Error, Result};
use crate::traits::{PlugBackend, SwitchTarget};

/// Request timeout for LAN calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// LAN HTTP client for a single plug.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    client: reqwest::Client,
    base_url: String,
    password: Option<String>,
    device_id: String,
}

impl LocalBackend {
    /// Create a backend for a device address (`192.168.0.42` or a full
    /// `http://...` URL) with an optional device password.
    pub fn new(address: &str, password: Option<&str>, device_id: &str) -> Result<Self> {
        if address.is_empty() {
            return Err(Error::invalid_config("device address cannot be empty"));
        }
        if device_id.is_empty() {
            return Err(Error::invalid_config("device id cannot be empty"));
        }

        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{address}")
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            device_id: device_id.to_string(),
        })
    }

    /// Send a firmware command and return the JSON response.
    async fn command(&self, cmnd: &str) -> Result<serde_json::Value> {
        let url = format!("{}/cm", self.base_url);
        debug!("GET {url} cmnd={cmnd}");

        let mut request = self.client.get(&url).query(&[("cmnd", cmnd)]);
        if let Some(password) = &self.password {
            request = request.query(&[("user", "admin"), ("password", password.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                code: i64::from(status.as_u16()),
                message: format!("device returned HTTP {status}"),
            });
        }

        Ok(response.json().await?)
    }
}

/// Extract switch data points from a full status response.
fn power_points(status: &serde_json::Value) -> Vec<DataPoint> {
    let sts = status.get("StatusSTS").unwrap_or(status);
    let Some(map) = sts.as_object() else {
        return Vec::new();
    };

    let mut points = Vec::new();
    for (key, value) in map {
        let Some(code) = power_code(key) else {
            continue;
        };
        let on = value.as_str() == Some("ON");
        points.push(DataPoint::new(code, on));
    }
    points
}

/// Map a firmware power key to a data-point code: `POWER` becomes `switch`,
/// `POWER2` becomes `switch_2`.
fn power_code(key: &str) -> Option<String> {
    let rest = key.strip_prefix("POWER")?;
    if rest.is_empty() {
        Some("switch".to_string())
    } else if rest.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("switch_{rest}"))
    } else {
        None
    }
}

#[async_trait]
impl PlugBackend for LocalBackend {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn status(&self) -> Result<Vec<DataPoint>> {
        let status = self.command("Status 0").await?;
        Ok(power_points(&status))
    }

    /// Local reachability: the device answering on the LAN means online;
    /// connect and timeout failures mean offline. Anything else (bad
    /// password, malformed response) is a real error.
    async fn connect_status(&self) -> Result<bool> {
        match self.command("Status 0").await {
            Ok(_) => Ok(true),
            Err(Error::Transport(e)) if e.is_connect() || e.is_timeout() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn set_switch(&self, target: &SwitchTarget, on: bool) -> Result<()> {
        let state = if on { "On" } else { "Off" };
        let index = match target {
            SwitchTarget::Index(index) => *index,
            SwitchTarget::Code(_) if target.is_master() => 1,
            SwitchTarget::Code(code) => {
                return Err(Error::unsupported(format!(
                    "local control of '{code}' requires a data-point mapping; \
                     use cloud mode for code-named switches"
                )));
            }
        };
        self.command(&format!("Power{index} {state}")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_power_code() {
        assert_eq!(power_code("POWER").as_deref(), Some("switch"));
        assert_eq!(power_code("POWER1").as_deref(), Some("switch_1"));
        assert_eq!(power_code("POWER12").as_deref(), Some("switch_12"));
        assert_eq!(power_code("POWERONSTATE"), None);
        assert_eq!(power_code("Wifi"), None);
    }

    #[test]
    fn test_power_points_from_status() {
        let status = json!({
            "StatusSTS": {
                "POWER1": "ON",
                "POWER2": "OFF",
                "Wifi": {"SSId": "Frans-IOT"},
            }
        });
        let points = power_points(&status);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], DataPoint::new("switch_1", true));
        assert_eq!(points[1], DataPoint::new("switch_2", false));
    }

    #[test]
    fn test_power_points_single_relay() {
        let status = json!({"StatusSTS": {"POWER": "ON"}});
        let points = power_points(&status);
        assert_eq!(points, vec![DataPoint::new("switch", true)]);
    }

    #[test]
    fn test_power_points_bare_response() {
        // `Power1` alone answers without the StatusSTS wrapper.
        let status = json!({"POWER1": "OFF"});
        assert_eq!(power_points(&status), vec![DataPoint::new("switch_1", false)]);
    }

    #[test]
    fn test_new_normalizes_address() {
        let backend = LocalBackend::new("192.168.0.42", None, "dev").unwrap();
        assert_eq!(backend.base_url, "http://192.168.0.42");

        let backend = LocalBackend::new("http://192.168.0.42/", None, "dev").unwrap();
        assert_eq!(backend.base_url, "http://192.168.0.42");
    }

    #[test]
    fn test_new_rejects_empty_address() {
        assert!(matches!(
            LocalBackend::new("", None, "dev"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_password_treated_as_none() {
        let backend = LocalBackend::new("192.168.0.42", Some(""), "dev").unwrap();
        assert!(backend.password.is_none());
    }

    #[tokio::test]
    async fn test_code_named_switch_unsupported() {
        let backend = LocalBackend::new("192.168.0.42", None, "dev").unwrap();
        let err = backend
            .set_switch(&SwitchTarget::Code("usb1".to_string()), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
