//! plugwatch service: control loops and HTTP API for a smart plug.
//!
//! Two independent polling loops share the device backend:
//!
//! - the **charge controller** toggles a charger relay from the host
//!   battery level with a hysteresis band, and only on trusted networks
//! - the **connectivity monitor** watches the device's online flag and
//!   notifies on transitions only
//!
//! Around them sit the adapters: host sensors, a best-effort telemetry
//! sink, fan-out notifications, and a small HTTP control surface.

pub mod api;
pub mod charge;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod sensors;
pub mod state;
pub mod telemetry;

pub use charge::{ChargeController, ChargeSettings};
pub use config::Config;
pub use monitor::{ConnectivityMonitor, MonitorSettings};
pub use notify::Notifier;
pub use sensors::{HostSensors, SystemSensors};
pub use state::{AppState, BackendMode, DeviceHandle};
pub use telemetry::TelemetrySink;
