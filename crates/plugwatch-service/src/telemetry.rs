//! Telemetry sink: best-effort measurement writes.
//!
//! Writes are fire-and-forget: a failed write is logged and swallowed, and
//! must never abort a poll tick. The production sink posts InfluxDB v2 line
//! protocol over HTTP; when no sink is configured a null sink is used.
//!
//! # Example Configuration
//!
//! ```toml
//! [telemetry]
//! url = "http://localhost:8086"
//! token = "influx-token"
//! org = "home"
//! bucket = "plugwatch"
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::TelemetryConfig;

/// A field value in a measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Bool(bool),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Best-effort sink for named measurements.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Write one measurement. Failures are handled inside the sink.
    async fn write(&self, measurement: &str, fields: &[(&str, FieldValue)], tags: &[(&str, &str)]);
}

/// InfluxDB v2 sink writing line protocol over HTTP.
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    token: String,
}

impl InfluxSink {
    /// Build a sink from configuration; `None` when no sink is configured.
    pub fn from_config(config: &TelemetryConfig) -> Option<Self> {
        let (Some(url), Some(token)) = (&config.url, &config.token) else {
            return None;
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;

        let write_url = format!(
            "{}/api/v2/write?org={}&bucket={}",
            url.trim_end_matches('/'),
            config.org,
            config.bucket
        );

        Some(Self {
            client,
            write_url,
            token: token.clone(),
        })
    }
}

#[async_trait]
impl TelemetrySink for InfluxSink {
    async fn write(&self, measurement: &str, fields: &[(&str, FieldValue)], tags: &[(&str, &str)]) {
        let line = line_protocol(measurement, fields, tags);

        let result = self
            .client
            .post(&self.write_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("wrote measurement '{measurement}'");
            }
            Ok(response) => {
                warn!(
                    "telemetry write for '{measurement}' rejected: HTTP {}",
                    response.status()
                );
            }
            Err(e) => {
                warn!("telemetry write for '{measurement}' failed: {e}");
            }
        }
    }
}

/// Sink used when telemetry is not configured.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl TelemetrySink for NullSink {
    async fn write(
        &self,
        _measurement: &str,
        _fields: &[(&str, FieldValue)],
        _tags: &[(&str, &str)],
    ) {
    }
}

/// Render one line of InfluxDB line protocol:
/// `measurement,tag=value field=value`.
fn line_protocol(
    measurement: &str,
    fields: &[(&str, FieldValue)],
    tags: &[(&str, &str)],
) -> String {
    let mut line = escape_measurement(measurement);
    for (key, value) in tags {
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(value));
    }
    line.push(' ');
    let rendered: Vec<String> = fields
        .iter()
        .map(|(key, value)| format!("{}={value}", escape_tag(key)))
        .collect();
    line.push_str(&rendered.join(","));
    line
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

/// Recording sink for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    writes: std::sync::Mutex<Vec<RecordedWrite>>,
}

/// One write captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub measurement: String,
    pub fields: Vec<(String, FieldValue)>,
    pub tags: Vec<(String, String)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes captured so far.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn write(&self, measurement: &str, fields: &[(&str, FieldValue)], tags: &[(&str, &str)]) {
        self.writes.lock().unwrap().push(RecordedWrite {
            measurement: measurement.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}
