//! Device backend library for plugwatch smart plugs.
//!
//! This crate provides the [`PlugBackend`] trait the control loops and the
//! HTTP surface are written against, plus its three implementations:
//!
//! - [`CloudBackend`]: the vendor cloud gateway (REST)
//! - [`LocalBackend`]: LAN HTTP for plugs running local-HTTP firmware
//! - [`MockPlug`]: scripted backend for tests
//!
//! Backends are long-lived: construct one at startup and reuse it across
//! poll ticks. The device wire protocol and the cloud auth handshake are
//! deliberately not implemented here; backends only glue requests onto
//! HTTP endpoints that already exist.
//!
//! # Quick start
//!
//! ```no_run
//! use plugwatch_core::{CloudBackend, PlugBackend, SwitchTarget};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = CloudBackend::for_region("us", "client-id", "token", "device-id")?;
//!
//!     if backend.connect_status().await? {
//!         backend.turn_off(&SwitchTarget::Index(2)).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cloud;
pub mod error;
pub mod local;
pub mod mock;
pub mod traits;

pub use cloud::{is_access_forbidden, region_base_url, CloudBackend};
pub use error::{Error, Result};
pub use local::LocalBackend;
pub use mock::{ConnectOutcome, MockPlug, DENIED_DETAIL};
pub use traits::{PlugBackend, SwitchTarget};
