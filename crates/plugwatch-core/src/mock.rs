//! Mock backend for testing.
//!
//! [`MockPlug`] implements [`PlugBackend`] without any network access, so
//! the control loops and HTTP handlers can be exercised deterministically.
//!
//! # Features
//!
//! - **Scripted connectivity**: queue a sequence of poll outcomes
//!   (online / offline / access denied / transport-style failure)
//! - **Failure injection**: make commands or status reads fail
//! - **Command log**: every switch command is recorded for assertions

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use plugwatch_types::DataPoint;

use crate::error::{Error, Result};
use crate::traits::{PlugBackend, SwitchTarget};

/// Access-denied detail used by scripted rejections; shaped like the real
/// gateway message so address extraction can be tested against it.
pub const DENIED_DETAIL: &str = "your ip(203.0.113.9) don't be allowed to access this API";

/// One scripted outcome of a connectivity poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Online,
    Offline,
    /// The caller's address is rejected by the backend.
    AccessDenied,
    /// The poll fails for an unclassified reason.
    Fail,
}

/// A mock plug backend.
///
/// # Example
///
/// ```
/// use plugwatch_core::{ConnectOutcome, MockPlug, PlugBackend};
///
/// #[tokio::main]
/// async fn main() {
///     let plug = MockPlug::new("test-device");
///     plug.script_connect([ConnectOutcome::Online, ConnectOutcome::Offline]);
///
///     assert_eq!(plug.connect_status().await.unwrap(), true);
///     assert_eq!(plug.connect_status().await.unwrap(), false);
///     // Script exhausted: stays online.
///     assert_eq!(plug.connect_status().await.unwrap(), true);
/// }
/// ```
pub struct MockPlug {
    device_id: String,
    status: Mutex<Vec<DataPoint>>,
    connect_script: Mutex<VecDeque<ConnectOutcome>>,
    commands: Mutex<Vec<(SwitchTarget, bool)>>,
    fail_commands: AtomicBool,
    fail_status: AtomicBool,
}

impl std::fmt::Debug for MockPlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlug")
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl MockPlug {
    /// Create a mock with a fixed device id and a default two-socket status.
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            status: Mutex::new(vec![
                DataPoint::new("switch_1", true),
                DataPoint::new("switch_2", false),
            ]),
            connect_script: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            fail_commands: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
        }
    }

    /// Create a mock with a generated device id.
    pub fn generated() -> Self {
        Self::new(&format!("mock-{:06x}", rand::random::<u32>() % 0xFF_FFFF))
    }

    /// Replace the status the mock reports.
    pub fn set_status(&self, points: Vec<DataPoint>) {
        *self.status.lock().unwrap() = points;
    }

    /// Queue connectivity poll outcomes. Once the queue is drained the mock
    /// reports online.
    pub fn script_connect(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.connect_script.lock().unwrap().extend(outcomes);
    }

    /// Make subsequent switch commands fail (after being recorded).
    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent status reads fail.
    pub fn set_fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    /// All switch commands issued so far, in order.
    pub fn commands(&self) -> Vec<(SwitchTarget, bool)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlugBackend for MockPlug {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn status(&self) -> Result<Vec<DataPoint>> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Error::InvalidResponse(
                "injected status failure".to_string(),
            ));
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn connect_status(&self) -> Result<bool> {
        let outcome = self
            .connect_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectOutcome::Online);
        match outcome {
            ConnectOutcome::Online => Ok(true),
            ConnectOutcome::Offline => Ok(false),
            ConnectOutcome::AccessDenied => Err(Error::access_denied(DENIED_DETAIL)),
            ConnectOutcome::Fail => Err(Error::InvalidResponse(
                "injected connectivity failure".to_string(),
            )),
        }
    }

    async fn set_switch(&self, target: &SwitchTarget, on: bool) -> Result<()> {
        self.commands.lock().unwrap().push((target.clone(), on));
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(Error::Api {
                code: 1010,
                message: "injected command failure".to_string(),
            });
        }
        Ok(())
    }
}
