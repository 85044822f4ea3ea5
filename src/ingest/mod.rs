/// Data acquisition for the reporting engine.
///
/// Submodules:
/// - `fetcher` — bounded-retry GET with per-retry token refresh.
/// - `iow`     — wire protocol of the remote time-series API.
/// - `replay`  — offline replay of saved API payloads.
///
/// The engine only sees the two capability traits below; which concrete
/// source sits behind them is a caller decision.

pub mod fetcher;
pub mod iow;
pub mod replay;

use chrono::{DateTime, Utc};

use crate::model::{ReportError, ReportWindow, SensorRef, SeriesResult, StationInfo};

/// Supplies a sensor's raw series.
pub trait SeriesSource {
    /// Series covering the whole calendar days of `window`.
    fn fetch_series(&self, sensor: &SensorRef, window: &ReportWindow)
    -> Result<SeriesResult, ReportError>;

    /// Series between two instants.
    fn fetch_series_between(
        &self,
        sensor: &SensorRef,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SeriesResult, ReportError>;
}

/// Resolves station metadata.
pub trait StationDirectory {
    fn describe(&self, station_id: &str) -> Result<StationInfo, ReportError>;

    /// Timestamp of the most recent upload of one quantity, if it has any.
    fn latest_upload(
        &self,
        station_id: &str,
        quantity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, ReportError>;
}
