// Data model and schedule fetching for the MTR Next Train real-time service
// Open data portal: https://data.gov.hk/en-data/dataset/mtr-data2-nexttrain-data
//
// API Endpoint:
// - Next Train: https://rt.data.gov.hk/v1/transport/mtr/getSchedule.php?line={LINE}&sta={STA}

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRef {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub stations: Vec<StationRef>,
}

impl LineRef {
    pub fn serves(&self, station_id: &str) -> bool {
        let station_id = station_id.trim();
        self.stations.iter().any(|s| s.id.eq_ignore_ascii_case(station_id))
    }
}

/// One upcoming train. Field names follow the remote contract.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArrivalRecord {
    #[serde(rename = "dest", default)]
    pub destination_station_id: String,
    #[serde(rename = "plat", default)]
    pub platform: String,
    #[serde(rename = "seq", default)]
    pub sequence_number: String,
    /// "YYYY-MM-DD HH:MM:SS" in HKT.
    #[serde(rename = "time", default)]
    pub scheduled_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Up => "Up Direction",
            Direction::Down => "Down Direction",
        }
    }
}

/// Address of one arrival inside the current schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrivalSlot {
    pub direction: Direction,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScheduleResult {
    pub up: Vec<ArrivalRecord>,
    pub down: Vec<ArrivalRecord>,
}

impl ScheduleResult {
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    pub fn arrivals(&self, direction: Direction) -> &[ArrivalRecord] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    pub fn arrival(&self, slot: ArrivalSlot) -> Option<&ArrivalRecord> {
        self.arrivals(slot.direction).get(slot.index)
    }
}

#[cfg(test)]
impl ScheduleResult {
    /// Every occupied slot, up direction first.
    pub fn slots(&self) -> Vec<ArrivalSlot> {
        [Direction::Up, Direction::Down]
            .into_iter()
            .flat_map(|direction| {
                (0..self.arrivals(direction).len()).map(move |index| ArrivalSlot { direction, index })
            })
            .collect()
    }
}

/// Line and station a schedule is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub line_id: String,
    pub station_id: String,
}

impl ScheduleKey {
    pub fn new(line_id: impl Into<String>, station_id: impl Into<String>) -> Self {
        ScheduleKey {
            line_id: line_id.into(),
            station_id: station_id.into(),
        }
    }

    /// Key of this station inside the response `data` object.
    pub fn composite(&self) -> String {
        format!("{}-{}", self.line_id, self.station_id)
    }
}

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleResponse {
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sys_time: Option<String>,
    #[serde(default)]
    pub curr_time: Option<String>,
    #[serde(default)]
    pub isdelay: Option<String>,
    #[serde(default)]
    pub data: Option<HashMap<String, StationSchedule>>,
}

impl ScheduleResponse {
    /// The service answers `1` for success; it has been seen as a number and as a string.
    pub fn is_success(&self) -> bool {
        match &self.status {
            Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
            Some(serde_json::Value::String(s)) => s.trim() == "1",
            _ => false,
        }
    }

    pub fn is_delayed(&self) -> bool {
        self.isdelay.as_deref() == Some("Y")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationSchedule {
    #[serde(rename = "UP", default)]
    pub up: Option<Vec<ArrivalRecord>>,
    #[serde(rename = "DOWN", default)]
    pub down: Option<Vec<ArrivalRecord>>,
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum NTFError {
    #[error("{0}")]
    Validation(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Station '{0}' is not served by any known line")]
    UnknownStation(String),
    #[error("Line '{0}' not found")]
    UnknownLine(String),
    #[error("Station '{station}' is not on line '{line}'")]
    StationNotOnLine { line: String, station: String },
    #[error("Invalid choice '{0}'")]
    InvalidChoice(String),
    #[error("Invalid command '{0}'")]
    InvalidCommand(String),
}

impl NTFError {
    /// Transport or decoding fault while talking to the remote service.
    pub fn is_transport(&self) -> bool {
        matches!(self, NTFError::NetworkError(_) | NTFError::ParseError(_))
    }
}

pub type Result<T> = std::result::Result<T, NTFError>;

// ============================================================================
// Schedule Source
// ============================================================================

/// Transport for the next-train query.
pub trait ScheduleSource: Send + Sync + 'static {
    fn query(&self, key: &ScheduleKey) -> impl Future<Output = Result<ScheduleResponse>> + Send;
}

/// HTTP client for the public MTR endpoint.
pub struct MtrScheduleClient {
    client: Client,
    endpoint: String,
}

impl MtrScheduleClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://rt.data.gov.hk/v1/transport/mtr/getSchedule.php";
    pub const REQUEST_TIMEOUT_SECS: u64 = 15;

    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NTFError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MtrScheduleClient {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ScheduleSource for MtrScheduleClient {
    fn query(&self, key: &ScheduleKey) -> impl Future<Output = Result<ScheduleResponse>> + Send {
        let request = self
            .client
            .get(&self.endpoint)
            .query(&[("line", key.line_id.as_str()), ("sta", key.station_id.as_str())]);
        let composite = key.composite();

        async move {
            let response = request
                .send()
                .await
                .map_err(|e| NTFError::NetworkError(format!("Failed to fetch {}: {}", composite, e)))?;

            // The body is still decoded on an error status; it may carry a usable schedule
            let status = response.status();
            if !status.is_success() {
                warn!("{} answered with HTTP {}", composite, status);
            }

            let body = response
                .text()
                .await
                .map_err(|e| NTFError::NetworkError(format!("Failed to read response: {}", e)))?;

            serde_json::from_str(&body)
                .map_err(|e| NTFError::ParseError(format!("Invalid JSON response (HTTP {}): {}", status.as_u16(), e)))
        }
    }
}

// ============================================================================
// Main Implementation
// ============================================================================

pub struct NTFModels;

impl NTFModels {
    /// Fetch and normalise the schedule for one line and station.
    ///
    /// Empty ids are rejected before the transport is touched. A payload
    /// without the requested key yields an empty schedule.
    pub async fn fetch_schedule<S: ScheduleSource>(
        source: &S,
        line_id: &str,
        station_id: &str,
    ) -> Result<ScheduleResult> {
        if line_id.trim().is_empty() || station_id.trim().is_empty() {
            return Err(NTFError::Validation("Please select both line and station.".to_string()));
        }

        let key = ScheduleKey::new(line_id.trim(), station_id.trim());
        let request_id = Uuid::new_v4();
        let start = Instant::now();
        debug!("[{}] GET next train for {}", request_id, key.composite());

        let response = source.query(&key).await.inspect_err(|e| {
            warn!("[{}] {} failed after {} ms: {}", request_id, key.composite(), start.elapsed().as_millis(), e);
        })?;

        info!(
            "[{}] {} answered in {} ms (status {:?})",
            request_id,
            key.composite(),
            start.elapsed().as_millis(),
            response.status
        );
        debug!(
            "[{}] server time {}, data time {}",
            request_id,
            response.sys_time.as_deref().unwrap_or("-"),
            response.curr_time.as_deref().unwrap_or("-")
        );

        Ok(Self::normalize(response, &key))
    }

    /// Map a raw response onto the canonical schedule for `key`.
    pub fn normalize(response: ScheduleResponse, key: &ScheduleKey) -> ScheduleResult {
        if !response.is_success() {
            warn!(
                "Schedule service returned status {:?} for {}: {}",
                response.status,
                key.composite(),
                response.message.as_deref().unwrap_or("no message")
            );
        }
        if response.is_delayed() {
            warn!("Service delay reported on line {}", key.line_id);
        }

        let composite = key.composite();
        match response.data.and_then(|mut data| data.remove(&composite)) {
            Some(station) => ScheduleResult {
                up: station.up.unwrap_or_default(),
                down: station.down.unwrap_or_default(),
            },
            None => {
                debug!("No entry for {} in payload", composite);
                ScheduleResult::default()
            }
        }
    }
}
