/// Event segmentation.
///
/// Groups the active (`value > 0`) samples of a series into maximal runs:
/// consecutive active samples belong to the same run while the time between
/// them is at most the gap tolerance. A gap of exactly the tolerance does not
/// break a run.

use chrono::{DateTime, Duration, Utc};

use crate::model::Sample;

/// A maximal, non-empty, time-ordered group of active samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRun {
    samples: Vec<Sample>,
}

impl ActiveRun {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.samples[0].timestamp
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.samples[self.samples.len() - 1].timestamp
    }

    /// Zero for a run of one sample.
    pub fn duration(&self) -> Duration {
        self.end() - self.start()
    }

    /// Largest value observed in the run.
    pub fn peak(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.value)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Segments `samples` into active runs.
///
/// Input order does not matter: active samples are stable-sorted by
/// timestamp first, so equal timestamps keep their source order. Returns an
/// empty list when no sample is active.
pub fn segment(samples: &[Sample], gap_tolerance_minutes: u32) -> Vec<ActiveRun> {
    let tolerance = Duration::minutes(i64::from(gap_tolerance_minutes));

    let mut active: Vec<Sample> = samples.iter().filter(|s| s.is_active()).copied().collect();
    active.sort_by_key(|s| s.timestamp);

    let mut runs = Vec::new();
    let mut current: Vec<Sample> = Vec::new();
    for sample in active {
        if let Some(previous) = current.last() {
            if sample.timestamp - previous.timestamp > tolerance {
                runs.push(ActiveRun { samples: std::mem::take(&mut current) });
            }
        }
        current.push(sample);
    }
    if !current.is_empty() {
        runs.push(ActiveRun { samples: current });
    }
    runs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
    }

    fn at(minutes: i64, value: f64) -> Sample {
        Sample::new(t0() + Duration::minutes(minutes), value)
    }

    #[test]
    fn test_gap_beyond_tolerance_starts_new_run() {
        let samples = [at(0, 5.0), at(2, 3.0), at(20, 4.0)];

        let runs = segment(&samples, 10);

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].samples(), &[at(0, 5.0), at(2, 3.0)]);
        assert_eq!(runs[1].samples(), &[at(20, 4.0)]);
    }

    #[test]
    fn test_gap_exactly_at_tolerance_stays_in_run() {
        let samples = [at(0, 1.0), at(10, 1.0), at(21, 1.0)];

        let runs = segment(&samples, 10);

        assert_eq!(runs.len(), 2, "10 min gap joins, 11 min gap splits");
        assert_eq!(runs[0].len(), 2);
    }

    #[test]
    fn test_inactive_samples_are_dropped_but_do_not_split() {
        // The zero in the middle is not part of any run; the 8 minute gap
        // between the surrounding active samples still joins them.
        let samples = [at(0, 2.0), at(4, 0.0), at(8, 2.0), at(9, -1.0)];

        let runs = segment(&samples, 10);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].samples(), &[at(0, 2.0), at(8, 2.0)]);
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let samples = [at(20, 4.0), at(0, 5.0), at(2, 3.0)];

        let runs = segment(&samples, 10);

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].start(), at(0, 0.0).timestamp);
        assert_eq!(runs[1].start(), at(20, 0.0).timestamp);
    }

    #[test]
    fn test_isolated_sample_is_zero_duration_run() {
        let runs = segment(&[at(0, 0.0), at(30, 7.5), at(60, 0.0)], 10);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].duration(), Duration::zero());
        assert_eq!(runs[0].peak(), 7.5);
    }

    #[test]
    fn test_no_active_samples_yields_no_runs() {
        assert!(segment(&[at(0, 0.0), at(5, 0.0)], 10).is_empty());
        assert!(segment(&[], 10).is_empty());
    }

    #[test]
    fn test_nan_values_are_never_active() {
        assert!(segment(&[at(0, f64::NAN)], 10).is_empty());
    }

    // --- Properties --------------------------------------------------------

    fn arb_samples() -> impl Strategy<Value = Vec<Sample>> {
        prop::collection::vec((0i64..2_000, -5.0f64..10.0), 0..80).prop_map(|points| {
            points
                .into_iter()
                .map(|(minute, value)| at(minute, value))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_runs_partition_the_active_samples(samples in arb_samples(), tolerance in 0u32..30) {
            let runs = segment(&samples, tolerance);

            let mut expected: Vec<Sample> = samples.iter().filter(|s| s.value > 0.0).copied().collect();
            expected.sort_by_key(|s| s.timestamp);
            let flattened: Vec<Sample> = runs.iter().flat_map(|r| r.samples().iter().copied()).collect();

            prop_assert_eq!(flattened, expected);
            for run in &runs {
                prop_assert!(!run.is_empty());
                prop_assert!(run.samples().iter().all(|s| s.value > 0.0));
            }
        }

        #[test]
        fn prop_runs_are_maximal_and_ordered(samples in arb_samples(), tolerance in 0u32..30) {
            let runs = segment(&samples, tolerance);
            let limit = Duration::minutes(i64::from(tolerance));

            for run in &runs {
                for pair in run.samples().windows(2) {
                    prop_assert!(pair[1].timestamp - pair[0].timestamp <= limit);
                }
            }
            for pair in runs.windows(2) {
                prop_assert!(pair[1].start() - pair[0].end() > limit);
            }
        }

        #[test]
        fn prop_resegmenting_is_idempotent(samples in arb_samples(), tolerance in 0u32..30) {
            let runs = segment(&samples, tolerance);
            let concatenated: Vec<Sample> = runs.iter().flat_map(|r| r.samples().iter().copied()).collect();

            prop_assert_eq!(segment(&concatenated, tolerance), runs);
        }
    }
}
