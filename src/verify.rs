//! Sensor List Verification
//!
//! Checks a sensor list against the station directory to find out which
//! entries are actually accessible and uploading data before they are put
//! into a batch report.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::ingest::StationDirectory;
use crate::model::SensorRef;

/// Uploads older than this are reported as stale.
pub const DEFAULT_STALE_HOURS: i64 = 24;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub results: Vec<SensorVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorVerification {
    pub station_id: String,
    pub quantity_id: String,
    pub name: Option<String>,
    pub status: VerificationStatus,
    pub station_found: bool,
    pub quantity_reporting: bool,
    pub latest_upload: Option<DateTime<Utc>>,
    pub upload_age_hours: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub enum VerificationStatus {
    /// Station resolves and the quantity uploaded recently.
    Success,
    /// Station resolves but the quantity is missing or stale.
    PartialSuccess,
    Failed,
}

// ============================================================================
// Single Sensor
// ============================================================================

pub fn verify_sensor(
    directory: &dyn StationDirectory,
    sensor: &SensorRef,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> SensorVerification {
    let mut result = SensorVerification {
        station_id: sensor.station_id.clone(),
        quantity_id: sensor.quantity_id.clone(),
        name: None,
        status: VerificationStatus::Failed,
        station_found: false,
        quantity_reporting: false,
        latest_upload: None,
        upload_age_hours: None,
        error_message: None,
    };

    // Test 1: station metadata resolves
    match directory.describe(&sensor.station_id) {
        Ok(station) => {
            result.station_found = true;
            result.name = Some(station.name);
        }
        Err(e) => {
            result.error_message = Some(format!("Station lookup failed: {}", e));
            return result;
        }
    }

    // Test 2: the quantity appears in the latest data, and recently
    match directory.latest_upload(&sensor.station_id, &sensor.quantity_id) {
        Ok(Some(latest)) => {
            let age = now - latest;
            result.quantity_reporting = true;
            result.latest_upload = Some(latest);
            result.upload_age_hours = Some(age.num_hours());
            if age > stale_after {
                result.status = VerificationStatus::PartialSuccess;
                result.error_message =
                    Some(format!("Last upload {} hours ago", age.num_hours()));
            } else {
                result.status = VerificationStatus::Success;
            }
        }
        Ok(None) => {
            result.status = VerificationStatus::PartialSuccess;
            result.error_message = Some("Quantity not present in latest data".to_string());
        }
        Err(e) => {
            result.status = VerificationStatus::PartialSuccess;
            result.error_message = Some(format!("Latest data lookup failed: {}", e));
        }
    }

    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

pub fn run_verification(
    directory: &dyn StationDirectory,
    sensors: &[SensorRef],
    now: DateTime<Utc>,
) -> VerificationReport {
    let mut report = VerificationReport {
        timestamp: now.to_rfc3339(),
        results: Vec::with_capacity(sensors.len()),
        summary: VerificationSummary {
            total: sensors.len(),
            ..Default::default()
        },
    };

    for sensor in sensors {
        let result = verify_sensor(directory, sensor, now, Duration::hours(DEFAULT_STALE_HOURS));
        match result.status {
            VerificationStatus::Success | VerificationStatus::PartialSuccess => {
                report.summary.working += 1
            }
            VerificationStatus::Failed => report.summary.failed += 1,
        }
        report.results.push(result);
    }

    report
}

/// Human-readable summary on stderr, so stdout stays machine-readable.
pub fn print_summary(report: &VerificationReport) {
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("SENSOR VERIFICATION SUMMARY");
    eprintln!("═══════════════════════════════════════════════════════════");
    for result in &report.results {
        let marker = match result.status {
            VerificationStatus::Success => "✓",
            VerificationStatus::PartialSuccess => "⚠",
            VerificationStatus::Failed => "✗",
        };
        eprintln!(
            "  {} {} / {}  {}",
            marker,
            result.station_id,
            result.quantity_id,
            result.error_message.as_deref().unwrap_or("OK")
        );
    }

    let success_rate = if report.summary.total > 0 {
        (report.summary.working as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };
    eprintln!();
    eprintln!(
        "Sensors: {}/{} working ({} failed), {:.1}%",
        report.summary.working, report.summary.total, report.summary.failed, success_rate
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReportError, StationInfo};
    use chrono::TimeZone;

    struct Directory;

    impl StationDirectory for Directory {
        fn describe(&self, station_id: &str) -> Result<StationInfo, ReportError> {
            match station_id {
                "ST-404" => Err(ReportError::MalformedPayload("no such station".to_string())),
                _ => Ok(StationInfo {
                    station_id: station_id.to_string(),
                    name: format!("MPD-{}", station_id),
                    institution: None,
                }),
            }
        }

        fn latest_upload(
            &self,
            _station_id: &str,
            quantity_id: &str,
        ) -> Result<Option<DateTime<Utc>>, ReportError> {
            Ok(match quantity_id {
                "PQ-fresh" => Some(now() - Duration::hours(1)),
                "PQ-stale" => Some(now() - Duration::hours(72)),
                _ => None,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn sensor(station: &str, quantity: &str) -> SensorRef {
        SensorRef {
            station_id: station.to_string(),
            quantity_id: quantity.to_string(),
            location: None,
        }
    }

    #[test]
    fn test_fresh_sensor_is_success() {
        let result = verify_sensor(&Directory, &sensor("ST-1", "PQ-fresh"), now(), Duration::hours(24));

        assert_eq!(result.status, VerificationStatus::Success);
        assert_eq!(result.name.as_deref(), Some("MPD-ST-1"));
        assert_eq!(result.upload_age_hours, Some(1));
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_stale_or_missing_quantity_is_partial() {
        let stale = verify_sensor(&Directory, &sensor("ST-1", "PQ-stale"), now(), Duration::hours(24));
        let missing = verify_sensor(&Directory, &sensor("ST-1", "PQ-gone"), now(), Duration::hours(24));

        assert_eq!(stale.status, VerificationStatus::PartialSuccess);
        assert_eq!(stale.upload_age_hours, Some(72));
        assert_eq!(missing.status, VerificationStatus::PartialSuccess);
        assert!(!missing.quantity_reporting);
    }

    #[test]
    fn test_unknown_station_fails() {
        let result = verify_sensor(&Directory, &sensor("ST-404", "PQ-fresh"), now(), Duration::hours(24));

        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(!result.station_found);
        assert!(
            result.error_message.as_deref().unwrap_or("").contains("no such station"),
            "error should carry the cause"
        );
    }

    #[test]
    fn test_run_verification_summarises() {
        let sensors = vec![
            sensor("ST-1", "PQ-fresh"),
            sensor("ST-2", "PQ-stale"),
            sensor("ST-404", "PQ-fresh"),
        ];

        let report = run_verification(&Directory, &sensors, now());

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.working, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.timestamp, "2024-07-01T12:00:00+00:00");
    }
}
