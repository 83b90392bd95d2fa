//! Shared types for the plugwatch smart-plug supervisor.
//!
//! This crate holds the plain data types exchanged between the device
//! backend, the control loops, and the HTTP surface: device data points,
//! connectivity and charge state, battery readings, and the switch-summary
//! formatting used in notifications.
//!
//! It deliberately has no I/O dependencies so every other crate can use it.

pub mod types;

pub use types::{
    summarize_switches, switch_label, BatteryReading, ChargeAction, ConnectivityState, DataPoint,
    Urgency,
};
