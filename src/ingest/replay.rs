/// Offline replay of saved API payloads
///
/// When the live API is unavailable (or for reproducible report runs), point
/// the service at a directory of payloads captured from it:
///
/// ```text
/// <root>/series/<quantity_id>.json    ReadRawData body
/// <root>/stations/<station_id>.json   Station/Get body
/// <root>/latest/<station_id>.json     LatestData body
/// ```
///
/// A missing series file means the quantity has no history. Samples are
/// clipped to the requested window, as the live endpoint would do.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};

use crate::analysis::calendar::local_date;
use crate::ingest::iow::{parse_latest, parse_raw_data, parse_station, parse_timestamp};
use crate::ingest::{SeriesSource, StationDirectory};
use crate::logging::{self, DataSource};
use crate::model::{ReportError, ReportWindow, SensorRef, SeriesResult, StationInfo};

pub struct ReplaySource {
    root: PathBuf,
    offset: FixedOffset,
}

impl ReplaySource {
    /// # Arguments
    /// * `root` - payload directory laid out as described above
    /// * `offset` - local time zone used to clip samples to calendar days
    pub fn new(root: impl Into<PathBuf>, offset: FixedOffset) -> Self {
        Self {
            root: root.into(),
            offset,
        }
    }

    fn payload_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", id))
    }

    fn read_series(&self, quantity_id: &str) -> Result<SeriesResult, ReportError> {
        let path = self.payload_path("series", quantity_id);
        match read_optional(&path)? {
            Some(body) => parse_raw_data(&body, self.offset),
            None => {
                logging::debug(
                    DataSource::Replay,
                    None,
                    &format!("no payload for {}, treating as no history", quantity_id),
                );
                Ok(SeriesResult::Empty)
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ReportError> {
    match std::fs::read_to_string(path) {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ReportError::Io(e)),
    }
}

impl SeriesSource for ReplaySource {
    fn fetch_series(
        &self,
        sensor: &SensorRef,
        window: &ReportWindow,
    ) -> Result<SeriesResult, ReportError> {
        let samples = self
            .read_series(&sensor.quantity_id)?
            .samples()
            .iter()
            .filter(|s| {
                let date = local_date(s.timestamp, self.offset);
                date >= window.start && date <= window.end
            })
            .copied()
            .collect();
        Ok(SeriesResult::from_samples(samples))
    }

    fn fetch_series_between(
        &self,
        sensor: &SensorRef,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SeriesResult, ReportError> {
        let samples = self
            .read_series(&sensor.quantity_id)?
            .samples()
            .iter()
            .filter(|s| s.timestamp >= from && s.timestamp <= to)
            .copied()
            .collect();
        Ok(SeriesResult::from_samples(samples))
    }
}

impl StationDirectory for ReplaySource {
    fn describe(&self, station_id: &str) -> Result<StationInfo, ReportError> {
        let path = self.payload_path("stations", station_id);
        let body = std::fs::read_to_string(&path)?;
        parse_station(&body, station_id)
    }

    fn latest_upload(
        &self,
        station_id: &str,
        quantity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, ReportError> {
        let Some(body) = read_optional(&self.payload_path("latest", station_id))? else {
            return Ok(None);
        };
        parse_latest(&body)?
            .iter()
            .find(|r| r.quantity_id == quantity_id)
            .map(|r| parse_timestamp(&r.timestamp, self.offset))
            .transpose()
    }
}
