/// Core data types for the IoW telemetry reporting service.
///
/// This module defines the shared domain model imported by all other modules:
/// raw samples as fetched, the per-sensor provenance descriptor, and the
/// typed records every report is built from. It contains no I/O.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// A single raw measurement from the remote time-series API.
///
/// Corresponds to one entry of the `DataPoints` array of a `ReadRawData`
/// response. A `null` value on the wire is stored as `0.0`: the sample is
/// present (counts toward availability) but never active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Active samples are the only ones segmentation ever groups.
    pub fn is_active(&self) -> bool {
        self.value > 0.0
    }
}

/// Outcome of fetching one sensor's series, decided once at fetch time.
///
/// `Empty` means the source returned no usable series at all ("no historical
/// data"), which is distinct from a series whose samples are all inactive.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesResult {
    Empty,
    NonEmpty(Vec<Sample>),
}

impl SeriesResult {
    /// Wraps a sample list, collapsing an empty list into `Empty`.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        if samples.is_empty() {
            SeriesResult::Empty
        } else {
            SeriesResult::NonEmpty(samples)
        }
    }

    pub fn samples(&self) -> &[Sample] {
        match self {
            SeriesResult::Empty => &[],
            SeriesResult::NonEmpty(samples) => samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SeriesResult::Empty)
    }
}

// ---------------------------------------------------------------------------
// Sensor descriptors
// ---------------------------------------------------------------------------

/// One line of a batch sensor list: the station and the physical quantity
/// to report on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRef {
    pub station_id: String,
    pub quantity_id: String,
    /// Human-readable location (county/town/village), when the list carries it.
    pub location: Option<String>,
}

/// Station metadata as resolved from the remote station directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub station_id: String,
    pub name: String,
    pub institution: Option<String>,
}

/// Inclusive calendar-date window a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportWindow {
    /// Builds a window, rejecting an end date before the start date.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ReportError> {
        if end < start {
            return Err(ReportError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive day count: a single-day window is 1 day long.
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Provenance attached to every record derived for one sensor.
///
/// Built once per sensor per report and only ever borrowed by calculators.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorContext {
    pub sensor_id: String,
    pub sensor_label: String,
    pub quantity_id: String,
    pub location: Option<String>,
    pub institution: Option<String>,
    pub window: ReportWindow,
}

impl SensorContext {
    pub fn new(sensor: &SensorRef, station: &StationInfo, window: ReportWindow) -> Self {
        Self {
            sensor_id: sensor.station_id.clone(),
            sensor_label: station.name.clone(),
            quantity_id: sensor.quantity_id.clone(),
            location: sensor.location.clone(),
            institution: station.institution.clone(),
            window,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

/// What an interval record reports: a measured interval or a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntervalOutcome {
    Measured {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        /// Pumped volume in m³, or peak flood height, depending on the mode.
        metric: f64,
        duration_secs: i64,
    },
    /// The source had no series for the sensor in the window.
    NoHistoricalData,
    /// Samples exist but none of them were active.
    NoActivity,
}

/// One per-event record (or one sentinel) for a sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalMetric {
    pub sensor_id: String,
    pub quantity_id: String,
    pub sensor_label: String,
    pub location: Option<String>,
    pub institution: Option<String>,
    pub outcome: IntervalOutcome,
}

impl IntervalMetric {
    /// Start instant and metric of a measured record.
    pub fn measured(&self) -> Option<(DateTime<Utc>, f64)> {
        match self.outcome {
            IntervalOutcome::Measured { start, metric, .. } => Some((start, metric)),
            _ => None,
        }
    }
}

/// Availability of one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub sample_count: usize,
    pub daily_availability_pct: f64,
    /// Window-level statistic replicated on every row; only present for
    /// windows of 28 days or more.
    pub monthly_availability_pct: Option<f64>,
}

/// Row label of a fleet rollup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupLabel {
    Day(NaiveDate),
    Total,
}

/// Per-day fleet summary. The `Total` row leaves `active_unit_count` empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRollup {
    pub label: RollupLabel,
    pub active_unit_count: Option<usize>,
    pub total_volume: f64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A single remote call failed. Always treated as transient by the fetcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// Connection, timeout, or body-read failure.
    #[error("Network error: {0}")]
    Network(String),
}

/// Errors that end processing of one sensor (never the whole batch).
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Every attempt of a retried fetch failed.
    #[error("Fetch exhausted after {attempts} attempts: {last}")]
    FetchExhausted { attempts: u32, last: FetchError },
    /// The single-shot token refresh between attempts failed.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(FetchError),
    /// The response body did not have the expected shape.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Invalid window: end {end} is before start {start}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
