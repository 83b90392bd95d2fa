//! Host sensors: WiFi network identity and battery state.
//!
//! The charge controller only ever acts on trusted networks and needs the
//! battery level of the machine it runs on. Both reads go through
//! [`HostSensors`] so the loop can be tested with fixed values.

use async_trait::async_trait;
use starship_battery::units::ratio::percent;
use starship_battery::{Manager, State};
use tokio::process::Command;
use tracing::debug;

use plugwatch_types::BatteryReading;

/// Host-side sensor reads used by the charge controller.
#[async_trait]
pub trait HostSensors: Send + Sync {
    /// The SSID of the currently connected WiFi network, if any.
    async fn current_ssid(&self) -> Option<String>;

    /// A battery snapshot, if the host has a battery.
    fn battery(&self) -> Option<BatteryReading>;
}

/// Sensors of the local machine.
///
/// SSID detection shells out to `iwgetid -r`, falling back to `nmcli`;
/// battery state comes from the power-supply subsystem.
#[derive(Debug, Default)]
pub struct SystemSensors;

impl SystemSensors {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostSensors for SystemSensors {
    async fn current_ssid(&self) -> Option<String> {
        if let Some(ssid) = ssid_from_iwgetid().await {
            return Some(ssid);
        }
        ssid_from_nmcli().await
    }

    fn battery(&self) -> Option<BatteryReading> {
        let manager = match Manager::new() {
            Ok(manager) => manager,
            Err(e) => {
                debug!("battery manager unavailable: {e}");
                return None;
            }
        };
        let battery = manager.batteries().ok()?.next()?.ok()?;

        let charge = battery.state_of_charge().get::<percent>();
        let plugged = matches!(battery.state(), State::Charging | State::Full);

        Some(BatteryReading {
            percent: charge.round().clamp(0.0, 100.0) as u8,
            plugged,
        })
    }
}

/// Read the SSID via `iwgetid -r` (wireless-tools).
async fn ssid_from_iwgetid() -> Option<String> {
    let output = Command::new("iwgetid").arg("-r").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let ssid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if ssid.is_empty() {
        None
    } else {
        Some(ssid)
    }
}

/// Read the SSID of the active connection via `nmcli`.
async fn ssid_from_nmcli() -> Option<String> {
    let output = Command::new("nmcli")
        .args(["-t", "-f", "active,ssid", "dev", "wifi"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_nmcli_active_ssid(&stdout)
}

/// Pick the active SSID out of `nmcli -t -f active,ssid dev wifi` output.
fn parse_nmcli_active_ssid(output: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(ssid) = line.strip_prefix("yes:") {
            if !ssid.is_empty() {
                return Some(ssid.to_string());
            }
        }
    }
    None
}

/// Settable sensor values for tests.
#[derive(Debug, Default)]
pub struct MockSensors {
    ssid: std::sync::Mutex<Option<String>>,
    battery: std::sync::Mutex<Option<BatteryReading>>,
}

impl MockSensors {
    pub fn new(ssid: Option<&str>, battery: Option<BatteryReading>) -> Self {
        Self {
            ssid: std::sync::Mutex::new(ssid.map(str::to_string)),
            battery: std::sync::Mutex::new(battery),
        }
    }

    pub fn set_ssid(&self, ssid: Option<&str>) {
        *self.ssid.lock().unwrap() = ssid.map(str::to_string);
    }

    pub fn set_battery(&self, battery: Option<BatteryReading>) {
        *self.battery.lock().unwrap() = battery;
    }
}

#[async_trait]
impl HostSensors for MockSensors {
    async fn current_ssid(&self) -> Option<String> {
        self.ssid.lock().unwrap().clone()
    }

    fn battery(&self) -> Option<BatteryReading> {
        *self.battery.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nmcli_active_ssid() {
        let output = "no:frans-extender\nyes:Frans-IOT\nno:neighbor\n";
        assert_eq!(parse_nmcli_active_ssid(output).as_deref(), Some("Frans-IOT"));
    }

    #[test]
    fn test_parse_nmcli_no_active() {
        let output = "no:frans-extender\nno:neighbor\n";
        assert_eq!(parse_nmcli_active_ssid(output), None);
    }

    #[test]
    fn test_parse_nmcli_keeps_colons_in_ssid() {
        let output = "yes:cafe:guest\n";
        assert_eq!(parse_nmcli_active_ssid(output).as_deref(), Some("cafe:guest"));
    }

    #[test]
    fn test_parse_nmcli_empty_ssid() {
        assert_eq!(parse_nmcli_active_ssid("yes:\n"), None);
    }

    #[tokio::test]
    async fn test_mock_sensors() {
        let sensors = MockSensors::new(
            Some("Frans"),
            Some(BatteryReading {
                percent: 50,
                plugged: false,
            }),
        );
        assert_eq!(sensors.current_ssid().await.as_deref(), Some("Frans"));
        assert_eq!(sensors.battery().unwrap().percent, 50);
    }
}
