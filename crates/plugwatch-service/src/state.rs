//! Application state shared across handlers and loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use plugwatch_core::{CloudBackend, LocalBackend, PlugBackend};

use crate::config::Config;
use crate::notify::Notifier;
use crate::telemetry::{InfluxSink, NullSink, TelemetrySink};

/// How the device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Cloud,
    Local,
}

/// The device backend plus the mode it was built for.
///
/// The backend is constructed exactly once at startup and shared by the
/// loops and the HTTP handlers; a construction failure aborts startup
/// rather than surfacing on every tick.
pub struct DeviceHandle {
    backend: Arc<dyn PlugBackend>,
    mode: BackendMode,
}

impl DeviceHandle {
    /// Build the backend the configuration asks for.
    pub fn from_config(config: &Config) -> plugwatch_core::Result<Self> {
        if config.device.local {
            let key = (!config.local.key.is_empty()).then_some(config.local.key.as_str());
            let backend = LocalBackend::new(&config.local.address, key, &config.device.id)?;
            Ok(Self {
                backend: Arc::new(backend),
                mode: BackendMode::Local,
            })
        } else {
            let backend = CloudBackend::for_region(
                &config.cloud.region,
                &config.cloud.api_key,
                &config.cloud.api_secret,
                &config.device.id,
            )?;
            Ok(Self {
                backend: Arc::new(backend),
                mode: BackendMode::Cloud,
            })
        }
    }

    /// Wrap an arbitrary backend (used by tests).
    pub fn custom(backend: Arc<dyn PlugBackend>, mode: BackendMode) -> Self {
        Self { backend, mode }
    }

    /// A shared handle to the backend.
    pub fn backend(&self) -> Arc<dyn PlugBackend> {
        Arc::clone(&self.backend)
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn is_local(&self) -> bool {
        self.mode == BackendMode::Local
    }
}

/// Shared application state.
pub struct AppState {
    /// Immutable configuration snapshot, built once at startup.
    pub config: Config,
    /// The device backend.
    pub device: DeviceHandle,
    /// Notification dispatcher.
    pub notifier: Notifier,
    /// Telemetry sink (a null sink when not configured).
    pub telemetry: Arc<dyn TelemetrySink>,
    /// Background loop lifecycle.
    pub loops: LoopState,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: Config, device: DeviceHandle) -> Arc<Self> {
        let notifier = Notifier::from_config(&config.notifications);
        let telemetry: Arc<dyn TelemetrySink> = match InfluxSink::from_config(&config.telemetry) {
            Some(sink) => Arc::new(sink),
            None => Arc::new(NullSink),
        };
        Arc::new(Self {
            config,
            device,
            notifier,
            telemetry,
            loops: LoopState::new(),
        })
    }
}

/// Lifecycle state for the background loops.
pub struct LoopState {
    charge_running: AtomicBool,
    monitor_running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl LoopState {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            charge_running: AtomicBool::new(false),
            monitor_running: AtomicBool::new(false),
            stop_tx,
            stop_rx,
        }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal all loops to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.charge_running.store(false, Ordering::SeqCst);
        self.monitor_running.store(false, Ordering::SeqCst);
    }

    pub fn set_charge_running(&self, running: bool) {
        self.charge_running.store(running, Ordering::SeqCst);
    }

    pub fn charge_running(&self) -> bool {
        self.charge_running.load(Ordering::SeqCst)
    }

    pub fn set_monitor_running(&self, running: bool) {
        self.monitor_running.store(running, Ordering::SeqCst);
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor_running.load(Ordering::SeqCst)
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugwatch_core::MockPlug;

    #[test]
    fn test_device_handle_cloud() {
        let mut config = Config::default();
        config.device.id = "dev".to_string();
        config.cloud.api_key = "key".to_string();
        config.cloud.api_secret = "secret".to_string();

        let handle = DeviceHandle::from_config(&config).unwrap();
        assert_eq!(handle.mode(), BackendMode::Cloud);
        assert!(!handle.is_local());
        assert_eq!(handle.backend().device_id(), "dev");
    }

    #[test]
    fn test_device_handle_local() {
        let mut config = Config::default();
        config.device.id = "dev".to_string();
        config.device.local = true;
        config.local.address = "192.168.0.42".to_string();
        config.local.key = "secret".to_string();

        let handle = DeviceHandle::from_config(&config).unwrap();
        assert_eq!(handle.mode(), BackendMode::Local);
        assert!(handle.is_local());
    }

    #[test]
    fn test_device_handle_construction_failure() {
        let mut config = Config::default();
        config.device.id = "dev".to_string();
        config.cloud.region = "mars".to_string();

        assert!(DeviceHandle::from_config(&config).is_err());
    }

    #[test]
    fn test_app_state_new() {
        let mut config = Config::default();
        config.device.id = "dev".to_string();
        let handle = DeviceHandle::custom(Arc::new(MockPlug::new("dev")), BackendMode::Cloud);

        let state = AppState::new(config, handle);
        assert_eq!(state.config.device.id, "dev");
        assert!(!state.loops.charge_running());
    }

    #[test]
    fn test_loop_state_stop_signal() {
        let loops = LoopState::new();
        let rx = loops.subscribe_stop();
        assert!(!*rx.borrow());

        loops.set_charge_running(true);
        loops.set_monitor_running(true);
        assert!(loops.charge_running());
        assert!(loops.monitor_running());

        loops.signal_stop();
        assert!(*rx.borrow());
        assert!(!loops.charge_running());
        assert!(!loops.monitor_running());
    }
}
