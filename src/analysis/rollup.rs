/// Fleet rollup: per-day summary across every sensor in a report.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{FixedOffset, NaiveDate};

use crate::analysis::calendar::local_date;
use crate::model::{DayRollup, IntervalMetric, RollupLabel};

/// Groups measured records by the local date of their start.
///
/// Each day row carries the number of distinct sensor labels seen that day
/// and the summed metric. A final `Total` row sums the day rows' volumes and
/// leaves the unit count empty, since a sensor active on several days would
/// otherwise be counted more than once. Sentinel records are skipped.
///
/// Takes the full metric collection of a report; rolling up per sensor and
/// merging afterwards would undercount the per-day units.
pub fn rollup(metrics: &[IntervalMetric], offset: FixedOffset) -> Vec<DayRollup> {
    let mut days: BTreeMap<NaiveDate, (BTreeSet<&str>, f64)> = BTreeMap::new();

    for metric in metrics {
        let Some((start, value)) = metric.measured() else {
            continue;
        };
        let (labels, volume) = days.entry(local_date(start, offset)).or_default();
        labels.insert(metric.sensor_label.as_str());
        *volume += value;
    }

    let mut rows: Vec<DayRollup> = days
        .into_iter()
        .map(|(date, (labels, volume))| DayRollup {
            label: RollupLabel::Day(date),
            active_unit_count: Some(labels.len()),
            total_volume: volume,
        })
        .collect();

    let total: f64 = rows.iter().map(|r| r.total_volume).sum();
    rows.push(DayRollup {
        label: RollupLabel::Total,
        active_unit_count: None,
        total_volume: total,
    });
    rows
}
