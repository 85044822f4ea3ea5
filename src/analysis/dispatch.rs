/// Pump dispatch readiness.
///
/// A pump can be dispatched elsewhere when it has not pumped during the
/// recent lookback window. A pump without any recent series is also
/// dispatchable: it is reported as "no data" rather than held back.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::model::{ReportError, SensorContext, SeriesResult};

/// Longest accepted lookback.
pub const MAX_LOOKBACK_HOURS: u32 = 24 * 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpedRecently {
    Yes,
    No,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchStatus {
    pub sensor_id: String,
    pub quantity_id: String,
    pub sensor_label: String,
    pub location: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub pumped_recently: PumpedRecently,
    pub has_history: bool,
    pub latest_upload: Option<DateTime<Utc>>,
    pub dispatchable: bool,
}

/// `[now - hours, now]`, both ends truncated to the whole local hour.
pub fn lookback_window(
    now: DateTime<Utc>,
    hours: u32,
    offset: FixedOffset,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
    if hours > MAX_LOOKBACK_HOURS {
        return Err(ReportError::Config(format!(
            "dispatch lookback of {} hours exceeds {}",
            hours, MAX_LOOKBACK_HOURS
        )));
    }

    let local = now.with_timezone(&offset).naive_local();
    let end = local
        .date()
        .and_hms_opt(local.hour(), 0, 0)
        .and_then(|hour| offset.from_local_datetime(&hour).single())
        .map_or(now, |hour| hour.with_timezone(&Utc));
    let start = end
        .checked_sub_signed(Duration::hours(i64::from(hours)))
        .ok_or_else(|| {
            ReportError::Config(format!("dispatch lookback of {} hours is out of range", hours))
        })?;
    Ok((start, end))
}

pub fn assess_dispatch(
    context: &SensorContext,
    series: &SeriesResult,
    window: (DateTime<Utc>, DateTime<Utc>),
    latest_upload: Option<DateTime<Utc>>,
) -> DispatchStatus {
    let (pumped_recently, has_history) = match series {
        SeriesResult::Empty => (PumpedRecently::NoData, false),
        SeriesResult::NonEmpty(samples) if samples.iter().any(|s| s.is_active()) => {
            (PumpedRecently::Yes, true)
        }
        SeriesResult::NonEmpty(_) => (PumpedRecently::No, true),
    };

    DispatchStatus {
        sensor_id: context.sensor_id.clone(),
        quantity_id: context.quantity_id.clone(),
        sensor_label: context.sensor_label.clone(),
        location: context.location.clone(),
        window_start: window.0,
        window_end: window.1,
        pumped_recently,
        has_history,
        latest_upload,
        dispatchable: pumped_recently != PumpedRecently::Yes,
    }
}
