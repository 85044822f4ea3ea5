/// Sensor list for batch reports.
///
/// A report runs over a list of sensors supplied as plain text, one sensor
/// per line:
///
/// ```text
/// # station id                          physical quantity id                  location
/// 6c6b4a10-...,0d2e61f4-...,Tainan City Annan District
/// ```
///
/// Fields are tab or comma separated (a line containing a tab is split on
/// tabs only, so locations may contain commas in that case). The location
/// column is optional. Blank lines and lines starting with `#` are ignored,
/// as is a leading `station_id,...` header row. Duplicate station/quantity
/// pairs are reported once.

use std::collections::HashSet;
use std::path::Path;

use crate::logging::{self, DataSource};
use crate::model::{ReportError, SensorRef};

const HEADER_FIELD: &str = "station_id";

fn split_fields(line: &str) -> Vec<&str> {
    let separator = if line.contains('\t') { '\t' } else { ',' };
    line.splitn(3, separator).map(str::trim).collect()
}

/// Parses a sensor list. Any malformed line fails the whole list, naming
/// the 1-based line number.
pub fn parse_sensor_list(text: &str) -> Result<Vec<SensorRef>, ReportError> {
    let mut sensors = Vec::new();
    let mut seen = HashSet::new();
    let mut first_entry = true;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields = split_fields(line);
        if first_entry && fields[0].eq_ignore_ascii_case(HEADER_FIELD) {
            first_entry = false;
            continue;
        }
        first_entry = false;

        let (station_id, quantity_id) = match fields.as_slice() {
            [station, quantity, ..] if !station.is_empty() && !quantity.is_empty() => {
                (station.to_string(), quantity.to_string())
            }
            _ => {
                return Err(ReportError::Config(format!(
                    "sensor list line {}: expected `station_id,quantity_id[,location]`, got {:?}",
                    line_no, raw
                )));
            }
        };
        let location = fields
            .get(2)
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string());

        if !seen.insert((station_id.clone(), quantity_id.clone())) {
            logging::warn(
                DataSource::System,
                Some(&station_id),
                &format!("sensor list line {}: duplicate of an earlier entry, skipped", line_no),
            );
            continue;
        }

        sensors.push(SensorRef {
            station_id,
            quantity_id,
            location,
        });
    }

    Ok(sensors)
}

/// Reads and parses a sensor list file.
pub fn load_sensor_list(path: &Path) -> Result<Vec<SensorRef>, ReportError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ReportError::Config(format!("cannot read sensor list {}: {}", path.display(), e))
    })?;
    parse_sensor_list(&text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
