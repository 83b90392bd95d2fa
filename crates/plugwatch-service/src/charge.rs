//! Battery-aware charge control loop.
//!
//! Polls the host battery and toggles the charger relay with a hysteresis
//! band: charging is cut once the battery is full and still on external
//! power, and re-enabled once it drops below the low threshold while
//! unplugged. Between the thresholds nothing happens, which prevents
//! on/off oscillation around a single threshold.
//!
//! The loop only ever acts while the host is on a trusted WiFi network;
//! on any other network the whole tick is skipped so the relay cannot be
//! mis-triggered from a public network.
//!
//! A failed relay command is not retried within the tick. The held action
//! is left unchanged, so the next tick that still qualifies re-issues the
//! same command (retry-by-recurrence, bounded by the poll interval).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use plugwatch_core::{PlugBackend, SwitchTarget};
use plugwatch_types::{ChargeAction, Urgency};

use crate::config::Config;
use crate::notify::Notifier;
use crate::sensors::HostSensors;
use crate::telemetry::{FieldValue, TelemetrySink};

/// Settings for the charge controller.
#[derive(Debug, Clone)]
pub struct ChargeSettings {
    /// Networks on which the loop is allowed to act.
    pub allowed_ssids: Vec<String>,
    /// Stop charging at or above this percentage (while plugged).
    pub battery_max: u8,
    /// Start charging below this percentage (while unplugged).
    pub battery_min: u8,
    /// Socket index driving the charger relay.
    pub switch: u32,
    /// Poll interval.
    pub interval: Duration,
    /// Device tag for telemetry.
    pub device_label: String,
}

impl ChargeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_ssids: config.charge.allowed_ssids.clone(),
            battery_max: config.charge.battery_max,
            battery_min: config.charge.battery_min,
            switch: config.charge.switch,
            interval: Duration::from_secs(config.charge.interval),
            device_label: config.device.name.clone(),
        }
    }
}

/// The charge control state machine.
///
/// [`tick`](Self::tick) performs one full poll cycle and is deterministic
/// given the injected sensors and backend; [`run`](Self::run) drives it on
/// the configured interval until stopped.
pub struct ChargeController {
    settings: ChargeSettings,
    backend: Arc<dyn PlugBackend>,
    sensors: Arc<dyn HostSensors>,
    telemetry: Arc<dyn TelemetrySink>,
    notifier: Notifier,
    /// Last command successfully issued to the relay. `None` until the
    /// first command succeeds; command failures leave it untouched.
    last_action: Option<ChargeAction>,
}

impl ChargeController {
    pub fn new(
        settings: ChargeSettings,
        backend: Arc<dyn PlugBackend>,
        sensors: Arc<dyn HostSensors>,
        telemetry: Arc<dyn TelemetrySink>,
        notifier: Notifier,
    ) -> Self {
        Self {
            settings,
            backend,
            sensors,
            telemetry,
            notifier,
            last_action: None,
        }
    }

    /// The last successfully issued relay command.
    pub fn last_action(&self) -> Option<ChargeAction> {
        self.last_action
    }

    /// One poll cycle: network gate, battery read, telemetry, hysteresis.
    pub async fn tick(&mut self) {
        let ssid = match self.sensors.current_ssid().await {
            Some(ssid) if self.settings.allowed_ssids.iter().any(|a| *a == ssid) => ssid,
            other => {
                debug!(
                    "connected to {:?} (not a trusted network), skipping check",
                    other
                );
                return;
            }
        };

        let Some(battery) = self.sensors.battery() else {
            warn!("battery information not available");
            return;
        };

        debug!(
            "ssid: {ssid} | battery: {}% | plugged: {}",
            battery.percent, battery.plugged
        );

        self.telemetry
            .write(
                "battery_status",
                &[
                    ("percent", FieldValue::Float(f64::from(battery.percent))),
                    ("plugged", FieldValue::Bool(battery.plugged)),
                ],
                &[
                    ("ssid", ssid.as_str()),
                    ("device", self.settings.device_label.as_str()),
                ],
            )
            .await;

        if battery.percent >= self.settings.battery_max && battery.plugged {
            // Still on external power with a full battery: keep commanding
            // OFF until the relay actually opens.
            info!("battery full, cutting charger power");
            self.command(ChargeAction::Off).await;
        } else if battery.percent < self.settings.battery_min && !battery.plugged {
            if self.last_action != Some(ChargeAction::On) {
                info!("battery low, starting charger");
                self.command(ChargeAction::On).await;
            }
        }
        // Between the thresholds: the hysteresis band, nothing to do.
    }

    /// Issue a relay command; on success record it and notify, on failure
    /// leave the held action unchanged so the next qualifying tick retries.
    async fn command(&mut self, action: ChargeAction) {
        let target = SwitchTarget::Index(self.settings.switch);
        let result = match action {
            ChargeAction::On => self.backend.turn_on(&target).await,
            ChargeAction::Off => self.backend.turn_off(&target).await,
        };

        match result {
            Ok(()) => {
                self.last_action = Some(action);
                let body = match action {
                    ChargeAction::Off => format!(
                        "Switch {} turned OFF because battery reached limit.",
                        self.settings.switch
                    ),
                    ChargeAction::On => format!(
                        "Switch {} turned ON because battery is low.",
                        self.settings.switch
                    ),
                };
                self.notifier
                    .notify(
                        &format!("Battery Manager: Charging {action}"),
                        &body,
                        Urgency::Normal,
                    )
                    .await;
            }
            Err(e) => {
                error!("error controlling charger switch: {e}");
                self.notifier
                    .notify(
                        "Battery Manager Error",
                        &format!("Failed to control switch: {e}"),
                        Urgency::Critical,
                    )
                    .await;
            }
        }
    }

    /// Run until the stop channel fires. Ticks never overlap; a tick that
    /// outlives the interval delays the next one.
    pub async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            "starting charge controller (interval: {:?}, trusted networks: {:?})",
            self.settings.interval, self.settings.allowed_ssids
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("charge controller received stop signal");
                        break;
                    }
                }
            }
        }

        info!("charge controller stopped");
    }
}
