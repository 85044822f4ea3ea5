//! Batch report orchestration.
//!
//! A report runs over a sensor list in list order. For each sensor the
//! runner resolves station metadata, fetches the series, and hands both to
//! the engine. Any error for one sensor is logged and recorded in the
//! report's `failed` list; the remaining sensors are still processed.
//!
//! Cross-sensor stages (the fleet rollup) only run after every sensor has
//! been processed.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::analysis::availability::compute_availability;
use crate::analysis::calendar::local_date;
use crate::analysis::dispatch::{DispatchStatus, assess_dispatch, lookback_window};
use crate::analysis::metrics::{MetricMode, compute_sensor_metrics};
use crate::analysis::rollup::rollup;
use crate::config::{EngineConfig, ServiceConfig};
use crate::ingest::{SeriesSource, StationDirectory};
use crate::logging::{self, DataSource};
use crate::model::{
    DayAvailability, DayRollup, IntervalMetric, IntervalOutcome, ReportError, ReportWindow,
    Sample, SensorContext, SensorRef, SeriesResult,
};

// ---------------------------------------------------------------------------
// Report kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    /// Pump runtime intervals with pumped volume.
    PumpRuntime,
    /// Flood events with their peak height.
    FloodHeight,
    /// Daily and window-level data availability.
    Availability,
    /// Active pumps and pumped volume per day across the fleet.
    Fleet,
    /// Raw samples per sensor.
    RawSeries,
    /// Pumps free for dispatch (no pumping in the lookback window).
    Dispatch,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        ReportKind::PumpRuntime,
        ReportKind::FloodHeight,
        ReportKind::Availability,
        ReportKind::Fleet,
        ReportKind::RawSeries,
        ReportKind::Dispatch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportKind::PumpRuntime => "pump-runtime",
            ReportKind::FloodHeight => "flood-height",
            ReportKind::Availability => "availability",
            ReportKind::Fleet => "fleet",
            ReportKind::RawSeries => "raw-series",
            ReportKind::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = ReportKind::ALL.iter().map(|k| k.name()).collect();
                ReportError::Config(format!(
                    "unknown report {:?}, expected one of: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Report records
// ---------------------------------------------------------------------------

/// A sensor whose processing failed. Its label is unknown when the station
/// lookup itself failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSensor {
    pub sensor_id: String,
    pub quantity_id: String,
    pub label: Option<String>,
    pub reason: String,
}

/// A sensor that had no series in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoDataSensor {
    pub sensor_id: String,
    pub quantity_id: String,
    pub sensor_label: String,
}

impl NoDataSensor {
    fn from_context(context: &SensorContext) -> Self {
        Self {
            sensor_id: context.sensor_id.clone(),
            quantity_id: context.quantity_id.clone(),
            sensor_label: context.sensor_label.clone(),
        }
    }
}

/// Pump runtime or flood height intervals, sentinels included.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalReport {
    pub report: ReportKind,
    pub window: ReportWindow,
    pub metrics: Vec<IntervalMetric>,
    pub failed: Vec<FailedSensor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorAvailability {
    pub sensor_id: String,
    pub quantity_id: String,
    pub sensor_label: String,
    pub location: Option<String>,
    pub institution: Option<String>,
    pub days: Vec<DayAvailability>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityReport {
    pub report: ReportKind,
    pub window: ReportWindow,
    pub sensors: Vec<SensorAvailability>,
    pub no_data: Vec<NoDataSensor>,
    pub failed: Vec<FailedSensor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub report: ReportKind,
    pub window: ReportWindow,
    pub days: Vec<DayRollup>,
    pub no_data: Vec<NoDataSensor>,
    pub failed: Vec<FailedSensor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorSeries {
    pub sensor_id: String,
    pub quantity_id: String,
    pub sensor_label: String,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawSeriesReport {
    pub report: ReportKind,
    pub window: ReportWindow,
    pub series: Vec<SensorSeries>,
    pub failed: Vec<FailedSensor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub report: ReportKind,
    pub generated_at: DateTime<Utc>,
    pub pumps: Vec<DispatchStatus>,
    pub failed: Vec<FailedSensor>,
}

/// Any of the reports above.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Report {
    Interval(IntervalReport),
    Availability(AvailabilityReport),
    Fleet(FleetReport),
    RawSeries(RawSeriesReport),
    Dispatch(DispatchReport),
}

impl Report {
    pub fn failed(&self) -> &[FailedSensor] {
        match self {
            Report::Interval(r) => &r.failed,
            Report::Availability(r) => &r.failed,
            Report::Fleet(r) => &r.failed,
            Report::RawSeries(r) => &r.failed,
            Report::Dispatch(r) => &r.failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct ReportRunner<'a> {
    series: &'a dyn SeriesSource,
    stations: &'a dyn StationDirectory,
    engine: EngineConfig,
    expected_per_day: NonZeroU32,
    offset: FixedOffset,
}

impl<'a> ReportRunner<'a> {
    pub fn new(
        series: &'a dyn SeriesSource,
        stations: &'a dyn StationDirectory,
        config: &ServiceConfig,
    ) -> Result<Self, ReportError> {
        config.validate()?;
        let expected_per_day = NonZeroU32::new(config.engine.expected_samples_per_day)
            .ok_or_else(|| ReportError::Config("expected_samples_per_day is zero".to_string()))?;
        Ok(Self {
            series,
            stations,
            engine: config.engine.clone(),
            expected_per_day,
            offset: config.local_offset()?,
        })
    }

    /// Runs one report. `now` is only used by the dispatch report.
    pub fn run(
        &self,
        kind: ReportKind,
        sensors: &[SensorRef],
        window: &ReportWindow,
        now: DateTime<Utc>,
    ) -> Report {
        match kind {
            ReportKind::PumpRuntime => Report::Interval(self.pump_runtime(sensors, window)),
            ReportKind::FloodHeight => Report::Interval(self.flood_height(sensors, window)),
            ReportKind::Availability => Report::Availability(self.availability(sensors, window)),
            ReportKind::Fleet => Report::Fleet(self.fleet(sensors, window)),
            ReportKind::RawSeries => Report::RawSeries(self.raw_series(sensors, window)),
            ReportKind::Dispatch => Report::Dispatch(self.dispatch(sensors, now)),
        }
    }

    pub fn pump_runtime(&self, sensors: &[SensorRef], window: &ReportWindow) -> IntervalReport {
        self.interval_report(
            ReportKind::PumpRuntime,
            sensors,
            window,
            self.engine.pump_gap_tolerance_minutes,
            MetricMode::pump_volume(&self.engine),
        )
    }

    pub fn flood_height(&self, sensors: &[SensorRef], window: &ReportWindow) -> IntervalReport {
        self.interval_report(
            ReportKind::FloodHeight,
            sensors,
            window,
            self.engine.flood_gap_tolerance_minutes,
            MetricMode::FloodHeight,
        )
    }

    fn interval_report(
        &self,
        kind: ReportKind,
        sensors: &[SensorRef],
        window: &ReportWindow,
        gap_tolerance_minutes: u32,
        mode: MetricMode,
    ) -> IntervalReport {
        let (per_sensor, failed) = self.each_sensor(kind, sensors, window, |sensor, context| {
            let series = self.series.fetch_series(sensor, window)?;
            Ok(compute_sensor_metrics(&series, &context, gap_tolerance_minutes, mode, self.offset))
        });

        IntervalReport {
            report: kind,
            window: *window,
            metrics: per_sensor.into_iter().flatten().collect(),
            failed,
        }
    }

    pub fn availability(&self, sensors: &[SensorRef], window: &ReportWindow) -> AvailabilityReport {
        let kind = ReportKind::Availability;
        let (per_sensor, failed) = self.each_sensor(kind, sensors, window, |sensor, context| {
            let series = self.series.fetch_series(sensor, window)?;
            let days =
                compute_availability(series.samples(), self.expected_per_day, window, self.offset);
            Ok((context, days))
        });

        let mut report = AvailabilityReport {
            report: kind,
            window: *window,
            sensors: Vec::new(),
            no_data: Vec::new(),
            failed,
        };
        for (context, days) in per_sensor {
            if days.is_empty() {
                report.no_data.push(NoDataSensor::from_context(&context));
                continue;
            }
            report.sensors.push(SensorAvailability {
                sensor_id: context.sensor_id,
                quantity_id: context.quantity_id,
                sensor_label: context.sensor_label,
                location: context.location,
                institution: context.institution,
                days,
            });
        }
        report
    }

    /// Pump volume rollup over the whole fleet.
    pub fn fleet(&self, sensors: &[SensorRef], window: &ReportWindow) -> FleetReport {
        let kind = ReportKind::Fleet;
        let mode = MetricMode::pump_volume(&self.engine);
        let (per_sensor, failed) = self.each_sensor(kind, sensors, window, |sensor, context| {
            let series = self.series.fetch_series(sensor, window)?;
            Ok(compute_sensor_metrics(
                &series,
                &context,
                self.engine.pump_gap_tolerance_minutes,
                mode,
                self.offset,
            ))
        });

        let metrics: Vec<IntervalMetric> = per_sensor.into_iter().flatten().collect();
        let no_data = metrics
            .iter()
            .filter(|m| m.outcome == IntervalOutcome::NoHistoricalData)
            .map(|m| NoDataSensor {
                sensor_id: m.sensor_id.clone(),
                quantity_id: m.quantity_id.clone(),
                sensor_label: m.sensor_label.clone(),
            })
            .collect();

        FleetReport {
            report: kind,
            window: *window,
            days: rollup(&metrics, self.offset),
            no_data,
            failed,
        }
    }

    pub fn raw_series(&self, sensors: &[SensorRef], window: &ReportWindow) -> RawSeriesReport {
        let kind = ReportKind::RawSeries;
        let (series, failed) = self.each_sensor(kind, sensors, window, |sensor, context| {
            let samples = match self.series.fetch_series(sensor, window)? {
                SeriesResult::Empty => Vec::new(),
                SeriesResult::NonEmpty(samples) => samples,
            };
            Ok(SensorSeries {
                sensor_id: context.sensor_id,
                quantity_id: context.quantity_id,
                sensor_label: context.sensor_label,
                samples,
            })
        });

        RawSeriesReport {
            report: kind,
            window: *window,
            series,
            failed,
        }
    }

    /// Dispatch readiness over the lookback window ending at `now`.
    pub fn dispatch(&self, sensors: &[SensorRef], now: DateTime<Utc>) -> DispatchReport {
        let kind = ReportKind::Dispatch;
        let range = match lookback_window(now, self.engine.dispatch_lookback_hours, self.offset) {
            Ok(range) => range,
            Err(e) => {
                logging::error(DataSource::Engine, None, &format!("{}: {}", kind, e));
                return DispatchReport {
                    report: kind,
                    generated_at: now,
                    pumps: Vec::new(),
                    failed: sensors.iter().map(|s| failure(s, None, &e)).collect(),
                };
            }
        };
        let window = ReportWindow {
            start: local_date(range.0, self.offset),
            end: local_date(range.1, self.offset),
        };

        let (pumps, failed) = self.each_sensor(kind, sensors, &window, |sensor, context| {
            let series = self.series.fetch_series_between(sensor, range.0, range.1)?;
            let latest = self
                .stations
                .latest_upload(&sensor.station_id, &sensor.quantity_id)?;
            Ok(assess_dispatch(&context, &series, range, latest))
        });

        DispatchReport {
            report: kind,
            generated_at: now,
            pumps,
            failed,
        }
    }

    /// Runs `work` for every sensor in list order, isolating failures.
    fn each_sensor<T>(
        &self,
        kind: ReportKind,
        sensors: &[SensorRef],
        window: &ReportWindow,
        mut work: impl FnMut(&SensorRef, SensorContext) -> Result<T, ReportError>,
    ) -> (Vec<T>, Vec<FailedSensor>) {
        let mut done = Vec::with_capacity(sensors.len());
        let mut failed = Vec::new();

        for sensor in sensors {
            logging::debug(
                DataSource::Engine,
                Some(&sensor.station_id),
                &format!("{}: processing quantity {}", kind, sensor.quantity_id),
            );

            let station = match self.stations.describe(&sensor.station_id) {
                Ok(station) => station,
                Err(e) => {
                    logging::log_sensor_failure(&sensor.station_id, "station lookup", &e);
                    failed.push(failure(sensor, None, &e));
                    continue;
                }
            };
            let context = SensorContext::new(sensor, &station, *window);
            let label = context.sensor_label.clone();

            match work(sensor, context) {
                Ok(result) => done.push(result),
                Err(e) => {
                    logging::log_sensor_failure(&sensor.station_id, kind.name(), &e);
                    failed.push(failure(sensor, Some(label), &e));
                }
            }
        }

        logging::log_batch_summary(kind.name(), sensors.len(), done.len(), failed.len());
        (done, failed)
    }
}

fn failure(sensor: &SensorRef, label: Option<String>, err: &ReportError) -> FailedSensor {
    FailedSensor {
        sensor_id: sensor.station_id.clone(),
        quantity_id: sensor.quantity_id.clone(),
        label,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_kind_names_round_trip() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.name().parse::<ReportKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_report_kind_lists_known_ones() {
        let err = "weekly".parse::<ReportKind>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("weekly"), "got: {}", message);
        assert!(message.contains("pump-runtime"), "got: {}", message);
    }

    #[test]
    fn test_report_kind_serializes_as_its_name() {
        let json = serde_json::to_string(&ReportKind::RawSeries).unwrap();
        assert_eq!(json, "\"raw-series\"");
    }
}
