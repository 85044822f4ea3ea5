/// Data availability: the share of expected samples actually received.
///
/// Availability counts presence, not activity, so every sample is counted
/// regardless of its value. Days are local calendar days.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use chrono::{FixedOffset, NaiveDate};

use crate::analysis::calendar::local_date;
use crate::model::{DayAvailability, ReportWindow, Sample};

/// Windows at least this long also get the window-level percentage.
pub const MONTHLY_MIN_DAYS: i64 = 28;

fn capped_pct(count: usize, expected_per_day: NonZeroU32) -> f64 {
    (count as f64 / f64::from(expected_per_day.get()) * 100.0).min(100.0)
}

/// One row per local date that has at least one sample, in date order.
///
/// For windows of [`MONTHLY_MIN_DAYS`] days or more, the same
/// `monthly_availability_pct` is attached to every row:
/// `min(100, Σ daily / (days × 100) × 100)`. Days without any sample add 0
/// to the sum but still count in `days`.
///
/// An empty sample slice yields an empty table; callers treat that as "no
/// data" rather than 0 % availability.
pub fn compute_availability(
    samples: &[Sample],
    expected_per_day: NonZeroU32,
    window: &ReportWindow,
    offset: FixedOffset,
) -> Vec<DayAvailability> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for sample in samples {
        *counts.entry(local_date(sample.timestamp, offset)).or_default() += 1;
    }

    let mut rows: Vec<DayAvailability> = counts
        .into_iter()
        .map(|(date, sample_count)| DayAvailability {
            date,
            sample_count,
            daily_availability_pct: capped_pct(sample_count, expected_per_day),
            monthly_availability_pct: None,
        })
        .collect();

    let days = window.duration_days();
    if days >= MONTHLY_MIN_DAYS && !rows.is_empty() {
        let daily_sum: f64 = rows.iter().map(|r| r.daily_availability_pct).sum();
        // Approximation kept from the production reports: daily values are
        // already capped before being averaged over the window.
        let monthly = (daily_sum / (days as f64 * 100.0) * 100.0).min(100.0);
        for row in &mut rows {
            row.monthly_availability_pct = Some(monthly);
        }
    }

    rows
}
