/// Time-series segmentation and aggregation engine.
///
/// Everything in here is pure: samples and descriptors in, typed records
/// out. Calendar-sensitive steps take the local `FixedOffset` explicitly.
///
/// Submodules:
/// - `calendar`     — local-date helpers and day-boundary splitting.
/// - `segmenter`    — groups active samples into runs under a gap tolerance.
/// - `metrics`      — per-run pump volume / flood height records.
/// - `availability` — per-day and window-level availability percentages.
/// - `rollup`       — cross-sensor per-day fleet summary.
/// - `dispatch`     — pump dispatch readiness from a recent window.

pub mod availability;
pub mod calendar;
pub mod dispatch;
pub mod metrics;
pub mod rollup;
pub mod segmenter;
