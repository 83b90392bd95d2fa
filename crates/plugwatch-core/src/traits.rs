//! Trait abstraction over plug backends.
//!
//! [`PlugBackend`] is the seam between the control loops and the device:
//! it is implemented by the cloud client, the local-LAN client, and the
//! mock used in tests. Backends are constructed once at startup and reused
//! across poll ticks; construction failure is fatal, per-call failure is
//! not.

use async_trait::async_trait;

use plugwatch_types::DataPoint;

use crate::error::Result;

/// Which switch a command addresses.
///
/// The HTTP surface accepts either a numeric socket index (`/switch/2/on`)
/// or a raw data-point code (`/switch/usb1/on`); the two backend modes
/// support different subsets of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchTarget {
    /// Socket by index, 1-based. Index 1 is the master switch.
    Index(u32),
    /// Socket by raw data-point code, e.g. `usb1`.
    Code(String),
}

impl SwitchTarget {
    /// Parse an HTTP path segment: all-digit segments become an index,
    /// anything else is treated as a raw code.
    pub fn parse(segment: &str) -> Self {
        match segment.parse::<u32>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Code(segment.to_string()),
        }
    }

    /// The master switch (`switch_1`).
    pub fn master() -> Self {
        Self::Index(1)
    }

    /// The cloud data-point code for this target.
    pub fn cloud_code(&self) -> String {
        match self {
            Self::Index(index) => format!("switch_{index}"),
            Self::Code(code) => code.clone(),
        }
    }

    /// Whether this target addresses the master switch.
    pub fn is_master(&self) -> bool {
        match self {
            Self::Index(index) => *index == 1,
            Self::Code(code) => code == "switch_1",
        }
    }
}

impl std::fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cloud_code())
    }
}

/// Operations every plug backend provides.
#[async_trait]
pub trait PlugBackend: Send + Sync {
    /// Stable identifier of the device this backend controls.
    fn device_id(&self) -> &str;

    /// Read the device's full data-point status.
    async fn status(&self) -> Result<Vec<DataPoint>>;

    /// Whether the backend currently reports the device as online.
    ///
    /// An [`crate::Error::AccessDenied`] here means the backend refused to
    /// answer because the caller's address is not authorized; callers decide
    /// how to classify that.
    async fn connect_status(&self) -> Result<bool>;

    /// Drive a single switch on or off.
    async fn set_switch(&self, target: &SwitchTarget, on: bool) -> Result<()>;

    /// Turn a switch on.
    async fn turn_on(&self, target: &SwitchTarget) -> Result<()> {
        self.set_switch(target, true).await
    }

    /// Turn a switch off.
    async fn turn_off(&self, target: &SwitchTarget) -> Result<()> {
        self.set_switch(target, false).await
    }
}
