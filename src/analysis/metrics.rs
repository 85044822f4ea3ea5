/// Per-run interval metrics.
///
/// Two report flavours share the segmentation step and differ in what they
/// measure per run:
///
/// - `PumpVolume`: volume pumped = run duration × a constant flow rate. A run
///   crossing local midnight is split per calendar day and each piece is
///   measured on its own clipped duration. Pieces at or below the minimum
///   volume are dropped (with the default 0.3 m³/s and 3 m³ this drops
///   anything pumping for 10 seconds or less).
/// - `FloodHeight`: the peak value observed in the run. Never split, never
///   thresholded.
///
/// A sensor with no series gets a single `NoHistoricalData` record; a sensor
/// whose series produced nothing reportable gets a single `NoActivity` record.

use chrono::{DateTime, FixedOffset, Utc};

use crate::analysis::calendar::{local_date, split_at_midnights};
use crate::analysis::segmenter::{ActiveRun, segment};
use crate::config::EngineConfig;
use crate::model::{IntervalMetric, IntervalOutcome, SensorContext, SeriesResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricMode {
    PumpVolume {
        /// m³ per second of pumping.
        flow_rate: f64,
        /// Intervals with volume `<=` this are discarded.
        min_volume: f64,
    },
    FloodHeight,
}

impl MetricMode {
    pub fn pump_volume(engine: &EngineConfig) -> Self {
        MetricMode::PumpVolume {
            flow_rate: engine.flow_rate_m3_per_sec,
            min_volume: engine.min_volume_threshold,
        }
    }
}

fn record(context: &SensorContext, outcome: IntervalOutcome) -> IntervalMetric {
    IntervalMetric {
        sensor_id: context.sensor_id.clone(),
        quantity_id: context.quantity_id.clone(),
        sensor_label: context.sensor_label.clone(),
        location: context.location.clone(),
        institution: context.institution.clone(),
        outcome,
    }
}

fn measured(start: DateTime<Utc>, end: DateTime<Utc>, metric: f64) -> IntervalOutcome {
    IntervalOutcome::Measured {
        start,
        end,
        metric,
        duration_secs: (end - start).num_seconds(),
    }
}

/// Metric records for one run. May be empty in `PumpVolume` mode when every
/// piece falls under the minimum volume.
pub fn compute_metrics(
    run: &ActiveRun,
    context: &SensorContext,
    mode: MetricMode,
    offset: FixedOffset,
) -> Vec<IntervalMetric> {
    match mode {
        MetricMode::PumpVolume { flow_rate, min_volume } => {
            let pieces = if local_date(run.start(), offset) != local_date(run.end(), offset) {
                split_at_midnights(run.start(), run.end(), offset)
            } else {
                vec![(run.start(), run.end())]
            };

            pieces
                .into_iter()
                .filter_map(|(start, end)| {
                    let seconds = (end - start).num_milliseconds() as f64 / 1000.0;
                    let volume = seconds * flow_rate;
                    (volume > min_volume).then(|| record(context, measured(start, end, volume)))
                })
                .collect()
        }
        MetricMode::FloodHeight => {
            vec![record(context, measured(run.start(), run.end(), run.peak()))]
        }
    }
}

/// All metric records for one sensor's series, sentinels included.
pub fn compute_sensor_metrics(
    series: &SeriesResult,
    context: &SensorContext,
    gap_tolerance_minutes: u32,
    mode: MetricMode,
    offset: FixedOffset,
) -> Vec<IntervalMetric> {
    let samples = match series {
        SeriesResult::Empty => {
            return vec![record(context, IntervalOutcome::NoHistoricalData)];
        }
        SeriesResult::NonEmpty(samples) => samples,
    };

    let metrics: Vec<IntervalMetric> = segment(samples, gap_tolerance_minutes)
        .iter()
        .flat_map(|run| compute_metrics(run, context, mode, offset))
        .collect();

    if metrics.is_empty() {
        vec![record(context, IntervalOutcome::NoActivity)]
    } else {
        metrics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReportWindow, Sample};
    use chrono::{Duration, NaiveDate, TimeZone};

    const PUMP: MetricMode = MetricMode::PumpVolume {
        flow_rate: 0.3,
        min_volume: 3.0,
    };

    fn taipei() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn local(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        taipei()
            .with_ymd_and_hms(2024, 7, d, h, m, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn context() -> SensorContext {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        SensorContext {
            sensor_id: "ST-9".to_string(),
            sensor_label: "MPD-009".to_string(),
            quantity_id: "PQ-9".to_string(),
            location: Some("Annan District".to_string()),
            institution: Some("Tainan City".to_string()),
            window: ReportWindow::new(day, day.succ_opt().unwrap()).unwrap(),
        }
    }

    fn run_of(samples: &[Sample]) -> ActiveRun {
        let runs = segment(samples, 10);
        assert_eq!(runs.len(), 1, "fixture should be a single run");
        runs.into_iter().next().unwrap()
    }

    fn outcome_parts(metric: &IntervalMetric) -> (DateTime<Utc>, DateTime<Utc>, f64, i64) {
        match metric.outcome {
            IntervalOutcome::Measured { start, end, metric, duration_secs } => {
                (start, end, metric, duration_secs)
            }
            ref other => panic!("expected a measured record, got {:?}", other),
        }
    }

    #[test]
    fn test_pump_volume_is_duration_times_flow_rate() {
        let run = run_of(&[
            Sample::new(local(1, 8, 0, 0), 1.0),
            Sample::new(local(1, 8, 5, 0), 1.0),
            Sample::new(local(1, 8, 10, 0), 1.0),
        ]);

        let metrics = compute_metrics(&run, &context(), PUMP, taipei());

        assert_eq!(metrics.len(), 1);
        let (start, end, volume, duration) = outcome_parts(&metrics[0]);
        assert_eq!(start, local(1, 8, 0, 0));
        assert_eq!(end, local(1, 8, 10, 0));
        assert_eq!(duration, 600);
        assert!((volume - 180.0).abs() < 1e-9, "600 s × 0.3 = 180 m³, got {}", volume);
        assert_eq!(metrics[0].sensor_label, "MPD-009");
        assert_eq!(metrics[0].institution.as_deref(), Some("Tainan City"));
    }

    #[test]
    fn test_run_across_midnight_is_split_per_day() {
        let run = run_of(&[
            Sample::new(local(1, 23, 50, 0), 1.0),
            Sample::new(local(1, 23, 58, 0), 1.0),
            Sample::new(local(2, 0, 5, 0), 1.0),
            Sample::new(local(2, 0, 10, 0), 1.0),
        ]);

        let metrics = compute_metrics(&run, &context(), PUMP, taipei());

        assert_eq!(metrics.len(), 2);
        let (s1, e1, v1, d1) = outcome_parts(&metrics[0]);
        let (s2, e2, v2, d2) = outcome_parts(&metrics[1]);
        assert_eq!((s1, e1), (local(1, 23, 50, 0), local(2, 0, 0, 0)));
        assert_eq!((s2, e2), (local(2, 0, 0, 0), local(2, 0, 10, 0)));
        assert_eq!((d1, d2), (600, 600));
        assert!((v1 - 180.0).abs() < 1e-9);
        assert!((v2 - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_piece_after_midnight_is_discarded() {
        // 00:00:00 → 00:00:10 is 10 s = 3 m³, which is not above the threshold.
        let run = run_of(&[
            Sample::new(local(1, 23, 55, 0), 1.0),
            Sample::new(local(2, 0, 0, 10), 1.0),
        ]);

        let metrics = compute_metrics(&run, &context(), PUMP, taipei());

        assert_eq!(metrics.len(), 1, "only the pre-midnight piece survives");
        let (_, end, _, _) = outcome_parts(&metrics[0]);
        assert_eq!(end, local(2, 0, 0, 0));
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let ten_seconds = run_of(&[
            Sample::new(local(1, 8, 0, 0), 1.0),
            Sample::new(local(1, 8, 0, 10), 1.0),
        ]);
        let eleven_seconds = run_of(&[
            Sample::new(local(1, 8, 0, 0), 1.0),
            Sample::new(local(1, 8, 0, 11), 1.0),
        ]);

        assert!(compute_metrics(&ten_seconds, &context(), PUMP, taipei()).is_empty());
        assert_eq!(compute_metrics(&eleven_seconds, &context(), PUMP, taipei()).len(), 1);
    }

    #[test]
    fn test_flood_height_reports_peak_without_split_or_threshold() {
        let run = run_of(&[
            Sample::new(local(1, 23, 58, 0), 12.0),
            Sample::new(local(2, 0, 2, 0), 31.5),
            Sample::new(local(2, 0, 6, 0), 20.0),
        ]);

        let metrics = compute_metrics(&run, &context(), MetricMode::FloodHeight, taipei());

        assert_eq!(metrics.len(), 1, "flood runs are never split");
        let (start, end, peak, duration) = outcome_parts(&metrics[0]);
        assert_eq!(peak, 31.5);
        assert_eq!((start, end), (local(1, 23, 58, 0), local(2, 0, 6, 0)));
        assert_eq!(duration, 480);
    }

    #[test]
    fn test_single_sample_flood_run_is_reported() {
        let run = run_of(&[Sample::new(local(1, 8, 0, 0), 4.0)]);

        let metrics = compute_metrics(&run, &context(), MetricMode::FloodHeight, taipei());

        assert_eq!(metrics.len(), 1);
        assert_eq!(outcome_parts(&metrics[0]).3, 0);
    }

    #[test]
    fn test_empty_series_is_no_historical_data() {
        let metrics = compute_sensor_metrics(&SeriesResult::Empty, &context(), 10, PUMP, taipei());

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].outcome, IntervalOutcome::NoHistoricalData);
        assert_eq!(metrics[0].sensor_id, "ST-9", "sentinels keep their provenance");
    }

    #[test]
    fn test_all_inactive_series_is_no_activity() {
        let series = SeriesResult::NonEmpty(vec![
            Sample::new(local(1, 8, 0, 0), 0.0),
            Sample::new(local(1, 9, 0, 0), 0.0),
        ]);

        for mode in [PUMP, MetricMode::FloodHeight] {
            let metrics = compute_sensor_metrics(&series, &context(), 10, mode, taipei());
            assert_eq!(metrics.len(), 1);
            assert_eq!(metrics[0].outcome, IntervalOutcome::NoActivity, "mode {:?}", mode);
        }
    }

    #[test]
    fn test_runs_all_below_threshold_is_no_activity() {
        let series = SeriesResult::NonEmpty(vec![
            Sample::new(local(1, 8, 0, 0), 1.0),
            Sample::new(local(1, 12, 0, 0), 1.0),
        ]);

        let metrics = compute_sensor_metrics(&series, &context(), 10, PUMP, taipei());

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].outcome, IntervalOutcome::NoActivity);
    }

    #[test]
    fn test_sensor_metrics_cover_every_run_in_order() {
        let base = local(1, 6, 0, 0);
        let series = SeriesResult::NonEmpty(
            [0, 2, 4, 30, 32, 34, 36]
                .iter()
                .map(|m| Sample::new(base + Duration::minutes(*m), 1.0))
                .collect(),
        );

        let metrics = compute_sensor_metrics(&series, &context(), 10, PUMP, taipei());

        let durations: Vec<i64> = metrics.iter().map(|m| outcome_parts(m).3).collect();
        assert_eq!(durations, vec![240, 360]);
    }
}
