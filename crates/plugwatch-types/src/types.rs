//! Core data types.

use serde::{Deserialize, Serialize};

/// A single device data point as reported by the backend.
///
/// Cloud status responses are a list of these; the local backend synthesizes
/// the same shape from its power flags. Switch values are booleans, but the
/// device also reports countdown timers and similar non-boolean points, so
/// the value is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Data-point code, e.g. `switch_1` or `countdown_1`.
    pub code: String,
    /// Reported value.
    pub value: serde_json::Value,
}

impl DataPoint {
    /// Create a data point from a code and a JSON value.
    pub fn new(code: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            code: code.into(),
            value: value.into(),
        }
    }

    /// The boolean value of this point, if it is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    /// Whether this point describes a switch (`switch`, `switch_1`, ...).
    pub fn is_switch(&self) -> bool {
        self.code.starts_with("switch")
    }
}

/// Connectivity of the device as tracked by the monitor loop.
///
/// Starts as [`ConnectivityState::Unknown`] and only ever changes on a
/// successfully classified poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// No poll has completed yet.
    Unknown,
    Online,
    Offline,
}

impl ConnectivityState {
    /// Map an observed online flag to a state.
    pub fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Online => write!(f, "ONLINE"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// The last command the charge controller issued to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeAction {
    On,
    Off,
}

impl std::fmt::Display for ChargeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

/// A battery snapshot from the host machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReading {
    /// Charge percentage, 0-100.
    pub percent: u8,
    /// Whether the machine is on external power.
    pub plugged: bool,
}

/// Notification urgency, mapped per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Critical => "critical",
        }
    }
}

/// Short label for a switch code: `switch_1` becomes `S1`, a bare `switch`
/// becomes `S`. Non-switch codes have no label.
pub fn switch_label(code: &str) -> Option<String> {
    if let Some(rest) = code.strip_prefix("switch_") {
        Some(format!("S{rest}"))
    } else if code == "switch" {
        Some("S".to_string())
    } else {
        None
    }
}

/// Human-readable summary of the switch states in a status response,
/// e.g. `"S1: ON, S2: OFF"`, in the order the backend reported them.
///
/// Non-switch data points are skipped. An empty status produces an empty
/// string; callers decide what to show when nothing is available.
pub fn summarize_switches(points: &[DataPoint]) -> String {
    let mut parts = Vec::new();
    for point in points {
        let Some(label) = switch_label(&point.code) else {
            continue;
        };
        let state = if point.as_bool().unwrap_or(false) {
            "ON"
        } else {
            "OFF"
        };
        parts.push(format!("{label}: {state}"));
    }
    parts.join(", ")
}
