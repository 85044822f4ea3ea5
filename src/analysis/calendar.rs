//! Local calendar helpers.
//!
//! Timestamps are kept in UTC everywhere; these functions are the only
//! place that decides which local day an instant belongs to.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

/// Local calendar date of an instant.
pub fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// Instant of local midnight at the start of `date`.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, Utc)
}

/// Splits `[start, end]` at every local midnight it crosses.
///
/// The first piece runs from `start` to the next midnight, middle pieces are
/// whole days, and the last piece runs from the final midnight to `end`. An
/// interval inside one local day comes back unchanged. Pieces are
/// contiguous and their durations sum to `end - start`.
pub fn split_at_midnights(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let first_day = local_date(start, offset);
    let last_day = local_date(end, offset);
    if end <= start || first_day == last_day {
        return vec![(start, end)];
    }

    let mut pieces = Vec::new();
    let mut piece_start = start;
    let mut day = first_day;
    while day < last_day {
        let Some(next_day) = day.succ_opt() else { break };
        let boundary = local_midnight(next_day, offset);
        pieces.push((piece_start, boundary));
        piece_start = boundary;
        day = next_day;
    }
    pieces.push((piece_start, end));
    pieces
}
