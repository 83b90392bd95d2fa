//! Device connectivity monitor loop.
//!
//! Polls the backend's connectivity flag and raises notifications on
//! online/offline transitions only, never on repeated polls of the same
//! state. The very first poll after startup notifies if the device is
//! online (with its initial switch states); a device that starts offline
//! stays silent until it comes up.
//!
//! Two failure modes get special treatment:
//!
//! - An access-denied rejection (caller address not whitelisted at the
//!   gateway) counts as offline and raises one critical notification;
//!   repeats are suppressed until a poll succeeds again.
//! - Any other failure leaves the held state untouched, so a transient
//!   fetch error is never misread as a real offline transition.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use plugwatch_core::{Error, PlugBackend};
use plugwatch_types::{summarize_switches, ConnectivityState, Urgency};

use crate::config::Config;
use crate::notify::Notifier;
use crate::telemetry::{FieldValue, TelemetrySink};

/// Settings for the connectivity monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Poll interval.
    pub interval: Duration,
    /// Device id used in telemetry tags.
    pub device_id: String,
    /// Friendly device name used in notifications and telemetry tags.
    pub device_name: String,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.monitor.interval),
            device_id: config.device.id.clone(),
            device_name: config.device.name.clone(),
        }
    }
}

/// The connectivity state machine.
pub struct ConnectivityMonitor {
    settings: MonitorSettings,
    backend: Arc<dyn PlugBackend>,
    telemetry: Arc<dyn TelemetrySink>,
    notifier: Notifier,
    state: ConnectivityState,
    /// Set after the access-denied notification fired; cleared by the next
    /// successfully classified poll.
    api_error_notified: bool,
}

impl ConnectivityMonitor {
    pub fn new(
        settings: MonitorSettings,
        backend: Arc<dyn PlugBackend>,
        telemetry: Arc<dyn TelemetrySink>,
        notifier: Notifier,
    ) -> Self {
        Self {
            settings,
            backend,
            telemetry,
            notifier,
            state: ConnectivityState::Unknown,
            api_error_notified: false,
        }
    }

    /// The currently held connectivity state.
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// One poll cycle: classify, record telemetry, fire edge-triggered
    /// notifications.
    pub async fn tick(&mut self) {
        let is_online = match self.backend.connect_status().await {
            Ok(online) => {
                self.api_error_notified = false;
                online
            }
            Err(Error::AccessDenied { detail, .. }) => {
                if self.api_error_notified {
                    debug!("access still denied, notification suppressed");
                } else {
                    let body = match extract_caller_ip(&detail) {
                        Some(ip) => {
                            format!("IP {ip} is not whitelisted at the cloud gateway.")
                        }
                        None => "The caller's IP address is not whitelisted at the cloud gateway."
                            .to_string(),
                    };
                    self.notifier
                        .notify("API Access Error", &body, Urgency::Critical)
                        .await;
                    self.api_error_notified = true;
                }
                false
            }
            Err(e) => {
                // Transient failure: keep the held state so a fetch error
                // is not misread as an offline transition.
                warn!("error checking device status: {e}");
                return;
            }
        };

        self.telemetry
            .write(
                "device_connectivity",
                &[("is_online", FieldValue::Bool(is_online))],
                &[
                    ("device_name", self.settings.device_name.as_str()),
                    ("device_id", self.settings.device_id.as_str()),
                ],
            )
            .await;

        let observed = ConnectivityState::from_online(is_online);
        let name = self.settings.device_name.clone();

        match (self.state, observed) {
            (ConnectivityState::Unknown, ConnectivityState::Online) => {
                info!("initial status: ONLINE");
                let details = self.switch_summary().await;
                self.notifier
                    .notify(
                        &format!("{name} is Online"),
                        &format!("Initial Status: {details}"),
                        Urgency::Normal,
                    )
                    .await;
            }
            (ConnectivityState::Unknown, ConnectivityState::Offline) => {
                info!("initial status: OFFLINE");
            }
            (ConnectivityState::Offline, ConnectivityState::Online) => {
                info!("status changed: OFFLINE -> ONLINE");
                let details = self.switch_summary().await;
                self.notifier
                    .notify(
                        &format!("{name} is Online"),
                        &format!("Reconnected. Status: {details}"),
                        Urgency::Normal,
                    )
                    .await;
            }
            (ConnectivityState::Online, ConnectivityState::Offline) => {
                info!("status changed: ONLINE -> OFFLINE");
                self.notifier
                    .notify(
                        &format!("{name} is Offline"),
                        "The device is not connected to WiFi or is unavailable.",
                        Urgency::Critical,
                    )
                    .await;
            }
            _ => {}
        }

        self.state = observed;
    }

    /// Best-effort human-readable switch summary for notifications.
    async fn switch_summary(&self) -> String {
        match self.backend.status().await {
            Ok(points) => {
                let summary = summarize_switches(&points);
                if summary.is_empty() {
                    "Details unavailable".to_string()
                } else {
                    summary
                }
            }
            Err(e) => {
                warn!("error fetching device details: {e}");
                "Details unavailable".to_string()
            }
        }
    }

    /// Run until the stop channel fires.
    pub async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            "starting connectivity monitor for {} ({}) at {:?}",
            self.settings.device_name, self.settings.device_id, self.settings.interval
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("connectivity monitor received stop signal");
                        break;
                    }
                }
            }
        }

        info!("connectivity monitor stopped");
    }
}

/// Pull the rejected caller address out of a gateway access-denied message,
/// e.g. `your ip(203.0.113.9) don't be allowed to access this API`.
///
/// Best-effort: anything that is not a valid IP between `ip(` and `)`
/// yields `None` and callers fall back to a generic message.
fn extract_caller_ip(detail: &str) -> Option<String> {
    let start = detail.find("ip(")? + 3;
    let rest = detail.get(start..)?;
    let end = rest.find(')')?;
    let candidate = rest[..end].trim();
    candidate.parse::<std::net::IpAddr>().ok()?;
    Some(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugwatch_core::{ConnectOutcome, MockPlug};

    use crate::notify::RecordingChannel;
    use crate::telemetry::RecordingSink;

    struct Harness {
        monitor: ConnectivityMonitor,
        plug: Arc<MockPlug>,
        sink: Arc<RecordingSink>,
        channel: RecordingChannel,
    }

    fn harness() -> Harness {
        let plug = Arc::new(MockPlug::new("test-device"));
        let sink = Arc::new(RecordingSink::new());
        let channel = RecordingChannel::new();
        let notifier = Notifier::with_channels(vec![Box::new(channel.clone())]);

        let settings = MonitorSettings {
            interval: Duration::from_secs(10),
            device_id: "test-device".to_string(),
            device_name: "Socket Kamar Tidur".to_string(),
        };

        let monitor = ConnectivityMonitor::new(
            settings,
            Arc::clone(&plug) as Arc<dyn PlugBackend>,
            Arc::clone(&sink) as Arc<dyn TelemetrySink>,
            notifier,
        );

        Harness {
            monitor,
            plug,
            sink,
            channel,
        }
    }

    #[tokio::test]
    async fn test_edge_triggered_notifications() {
        let mut h = harness();
        h.plug.script_connect([
            ConnectOutcome::Online,
            ConnectOutcome::Online,
            ConnectOutcome::Online,
            ConnectOutcome::Offline,
            ConnectOutcome::Offline,
            ConnectOutcome::Online,
        ]);

        let mut counts = Vec::new();
        for _ in 0..6 {
            h.monitor.tick().await;
            counts.push(h.channel.sent().len());
        }

        // Notifications exactly at ticks 1, 4 and 6.
        assert_eq!(counts, vec![1, 1, 1, 2, 2, 3]);

        let sent = h.channel.sent();
        assert_eq!(sent[0].0, "Socket Kamar Tidur is Online");
        assert!(sent[0].1.starts_with("Initial Status:"));
        assert_eq!(sent[0].2, Urgency::Normal);

        assert_eq!(sent[1].0, "Socket Kamar Tidur is Offline");
        assert_eq!(sent[1].2, Urgency::Critical);

        assert_eq!(sent[2].0, "Socket Kamar Tidur is Online");
        assert!(sent[2].1.starts_with("Reconnected."));
        assert_eq!(sent[2].2, Urgency::Normal);

        assert_eq!(h.monitor.state(), ConnectivityState::Online);
    }

    #[tokio::test]
    async fn test_initial_offline_is_silent() {
        let mut h = harness();
        h.plug.script_connect([ConnectOutcome::Offline]);

        h.monitor.tick().await;

        assert!(h.channel.sent().is_empty());
        assert_eq!(h.monitor.state(), ConnectivityState::Offline);
    }

    #[tokio::test]
    async fn test_initial_summary_content() {
        let mut h = harness();
        h.plug.script_connect([ConnectOutcome::Online]);

        h.monitor.tick().await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        // Default mock status is switch_1 on, switch_2 off.
        assert_eq!(sent[0].1, "Initial Status: S1: ON, S2: OFF");
    }

    #[tokio::test]
    async fn test_summary_falls_back_when_status_fails() {
        let mut h = harness();
        h.plug.script_connect([ConnectOutcome::Online]);
        h.plug.set_fail_status(true);

        h.monitor.tick().await;

        let sent = h.channel.sent();
        assert_eq!(sent[0].1, "Initial Status: Details unavailable");
    }

    #[tokio::test]
    async fn test_access_denied_notifies_once() {
        let mut h = harness();
        h.plug.script_connect([
            ConnectOutcome::AccessDenied,
            ConnectOutcome::AccessDenied,
        ]);

        h.monitor.tick().await;
        h.monitor.tick().await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "API Access Error");
        assert!(sent[0].1.contains("203.0.113.9"));
        assert_eq!(sent[0].2, Urgency::Critical);

        // Access denied counts as offline; the first tick was the initial
        // (silent) offline observation.
        assert_eq!(h.monitor.state(), ConnectivityState::Offline);
    }

    #[tokio::test]
    async fn test_access_denied_suppression_clears_on_success() {
        let mut h = harness();
        h.plug.script_connect([
            ConnectOutcome::AccessDenied,
            ConnectOutcome::Online,
            ConnectOutcome::AccessDenied,
        ]);

        h.monitor.tick().await; // access error notification
        h.monitor.tick().await; // clears the flag, offline -> online
        h.monitor.tick().await; // notifies again

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].0, "API Access Error");
        assert!(sent[1].0.ends_with("is Online"));
        assert_eq!(sent[2].0, "API Access Error");
        // The third tick is also an online -> offline edge.
        assert!(sent[3].0.ends_with("is Offline"));
    }

    #[tokio::test]
    async fn test_access_denied_while_online_raises_offline_edge() {
        let mut h = harness();
        h.plug
            .script_connect([ConnectOutcome::Online, ConnectOutcome::AccessDenied]);

        h.monitor.tick().await;
        h.monitor.tick().await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].0, "API Access Error");
        assert!(sent[2].0.ends_with("is Offline"));
        assert_eq!(h.monitor.state(), ConnectivityState::Offline);
    }

    #[tokio::test]
    async fn test_failure_preserves_state_and_skips_telemetry() {
        let mut h = harness();
        h.plug.script_connect([
            ConnectOutcome::Online,
            ConnectOutcome::Fail,
            ConnectOutcome::Offline,
        ]);

        h.monitor.tick().await;
        assert_eq!(h.monitor.state(), ConnectivityState::Online);
        assert_eq!(h.sink.writes().len(), 1);

        h.monitor.tick().await;
        // Failed tick: no state change, no telemetry, no notification.
        assert_eq!(h.monitor.state(), ConnectivityState::Online);
        assert_eq!(h.sink.writes().len(), 1);
        assert_eq!(h.channel.sent().len(), 1);

        h.monitor.tick().await;
        assert_eq!(h.monitor.state(), ConnectivityState::Offline);
        assert_eq!(h.sink.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_telemetry_content() {
        let mut h = harness();
        h.plug.script_connect([ConnectOutcome::Offline]);

        h.monitor.tick().await;

        let writes = h.sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].measurement, "device_connectivity");
        assert_eq!(
            writes[0].fields,
            vec![("is_online".to_string(), FieldValue::Bool(false))]
        );
        assert_eq!(
            writes[0].tags,
            vec![
                (
                    "device_name".to_string(),
                    "Socket Kamar Tidur".to_string()
                ),
                ("device_id".to_string(), "test-device".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let h = harness();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(h.monitor.run(stop_rx));
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run() should stop promptly")
            .unwrap();
    }

    #[test]
    fn test_extract_caller_ip() {
        assert_eq!(
            extract_caller_ip("your ip(203.0.113.9) don't be allowed to access this API")
                .as_deref(),
            Some("203.0.113.9")
        );
        assert_eq!(
            extract_caller_ip("ip(2001:db8::1) rejected").as_deref(),
            Some("2001:db8::1")
        );
        assert_eq!(extract_caller_ip("permission deny"), None);
        assert_eq!(extract_caller_ip("your ip(not-an-ip) rejected"), None);
        assert_eq!(extract_caller_ip("your ip("), None);
        assert_eq!(extract_caller_ip("your ip() rejected"), None);
    }
}
