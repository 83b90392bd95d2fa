//! Cloud backend: REST client for the vendor's device gateway.
//!
//! All device communication goes through the gateway's documented HTTP
//! endpoints; this module only does request/response glue. Token
//! negotiation and request signing are not implemented here; credentials
//! from the configuration are sent as issued.
//!
//! # Example
//!
//! ```no_run
//! use plugwatch_core::{CloudBackend, PlugBackend};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = CloudBackend::for_region("us", "client-id", "token", "eb03bbe4df01c1351aaxjz")?;
//! let online = backend.connect_status().await?;
//! println!("online: {online}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use plugwatch_types::DataPoint;

use crate::error::{Error, Result};
use crate::traits::{PlugBackend, SwitchTarget};

/// Known gateway regions and their endpoints.
const REGIONS: &[(&str, &str)] = &[
    ("us", "https://openapi.tuyaus.com"),
    ("eu", "https://openapi.tuyaeu.com"),
    ("cn", "https://openapi.tuyacn.com"),
    ("in", "https://openapi.tuyain.com"),
];

/// Request timeout for gateway calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve a region short code to its gateway base URL.
pub fn region_base_url(region: &str) -> Option<&'static str> {
    REGIONS
        .iter()
        .find(|(code, _)| *code == region)
        .map(|(_, url)| *url)
}

/// Whether a gateway error message is the "caller address not allowed"
/// rejection, e.g. `your ip(203.0.113.9) don't be allowed to access this
/// API`.
pub fn is_access_forbidden(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("don't be allowed")
        || msg.contains("not be allowed")
        || msg.contains("whitelist")
        || msg.contains("access forbidden")
}

/// REST client for the vendor cloud gateway.
///
/// Constructed once at startup and reused across poll ticks.
#[derive(Debug, Clone)]
pub struct CloudBackend {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    token: String,
    device_id: String,
}

/// Response envelope every gateway endpoint uses.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T> {
        if self.success {
            self.result.ok_or_else(|| {
                Error::InvalidResponse("successful response without a result".to_string())
            })
        } else {
            let msg = self
                .msg
                .unwrap_or_else(|| "unknown gateway error".to_string());
            if is_access_forbidden(&msg) {
                Err(Error::access_denied(msg))
            } else {
                Err(Error::Api {
                    code: self.code.unwrap_or(-1),
                    message: msg,
                })
            }
        }
    }
}

/// Device record returned by the gateway's device endpoint. Only the
/// online flag is of interest here.
#[derive(Debug, Deserialize)]
struct DeviceRecord {
    #[serde(default)]
    online: bool,
}

impl CloudBackend {
    /// Create a backend against an explicit gateway base URL.
    pub fn new(base_url: &str, client_id: &str, token: &str, device_id: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "gateway URL must start with http:// or https://, got: {base_url}"
            )));
        }
        if device_id.is_empty() {
            return Err(Error::invalid_config("device id cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            client_id: client_id.to_string(),
            token: token.to_string(),
            device_id: device_id.to_string(),
        })
    }

    /// Create a backend for one of the known gateway regions.
    pub fn for_region(region: &str, client_id: &str, token: &str, device_id: &str) -> Result<Self> {
        let base_url = region_base_url(region).ok_or_else(|| {
            Error::invalid_config(format!(
                "unknown cloud region '{region}' (expected one of us, eu, cn, in)"
            ))
        })?;
        Self::new(base_url, client_id, token, device_id)
    }

    /// The gateway base URL this backend talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}");
        let envelope: Envelope<T> = self
            .client
            .get(&url)
            .header("client_id", &self.client_id)
            .bearer_auth(&self.token)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_result()
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!("POST {url}");
        let envelope: Envelope<T> = self
            .client
            .post(&url)
            .header("client_id", &self.client_id)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_result()
    }
}

#[async_trait]
impl PlugBackend for CloudBackend {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn status(&self) -> Result<Vec<DataPoint>> {
        self.get(&format!("/v1.0/devices/{}/status", self.device_id))
            .await
    }

    async fn connect_status(&self) -> Result<bool> {
        let record: DeviceRecord = self.get(&format!("/v1.0/devices/{}", self.device_id)).await?;
        Ok(record.online)
    }

    async fn set_switch(&self, target: &SwitchTarget, on: bool) -> Result<()> {
        let body = serde_json::json!({
            "commands": [{"code": target.cloud_code(), "value": on}],
        });
        let _: bool = self
            .post(&format!("/v1.0/devices/{}/commands", self.device_id), &body)
            .await?;
        Ok(())
    }
}
