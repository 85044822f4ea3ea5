/// IoW (Internet of Water) Data API Client
///
/// Retrieves raw time series, station metadata and latest readings from the
/// water-resources IoW API. Every GET goes through `ResilientFetcher`, so a
/// transient failure costs a flat delay and a fresh token rather than the
/// whole sensor.
///
/// Endpoints used (relative to `{base_url}/api/`):
///   TimeSeriesData/ReadRawData/{quantity}/{from}/{to}/true/{offset}
///   Station/Get/{station}
///   LatestData/Read/Station/{station}/{offset}

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::config::{Credentials, ServiceConfig};
use crate::ingest::fetcher::{
    AccessToken, HttpTransport, OAuthTokenSource, Pause, ResilientFetcher, RetryPolicy,
    ThreadSleep, TokenSource, Transport,
};
use crate::ingest::{SeriesSource, StationDirectory};
use crate::logging::{self, DataSource};
use crate::model::{ReportError, ReportWindow, Sample, SensorRef, SeriesResult, StationInfo};

// ============================================================================
// IoW API Response Structures
// ============================================================================

/// `ReadRawData` response. `DataPoints` may be absent or `null` when the
/// quantity has no history in the requested range.
#[derive(Debug, Deserialize)]
pub struct RawDataResponse {
    #[serde(rename = "DataPoints", default)]
    pub data_points: Option<Vec<RawDataPoint>>,
}

#[derive(Debug, Deserialize)]
pub struct RawDataPoint {
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
    #[serde(rename = "Value", default)]
    pub value: Option<f64>,
}

/// `Station/Get` response. `JsonProperties` arrives as a JSON-encoded string.
#[derive(Debug, Deserialize)]
pub struct StationResponse {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "JsonProperties", default)]
    pub json_properties: Option<serde_json::Value>,
}

/// One entry of a `LatestData/Read/Station` response.
#[derive(Debug, Deserialize)]
pub struct LatestReading {
    #[serde(rename = "Id")]
    pub quantity_id: String,
    #[serde(rename = "Value", default)]
    pub value: Option<f64>,
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
}

// ============================================================================
// URL Construction
// ============================================================================

/// Raw-data URL covering whole calendar days `[start 00:00:00, end 23:59:59]`.
pub fn build_raw_data_url(
    base_url: &str,
    quantity_id: &str,
    window: &ReportWindow,
    offset: FixedOffset,
) -> String {
    format!(
        "{}/api/TimeSeriesData/ReadRawData/{}/{}T00.00.00/{}T23.59.59/true/{}",
        base_url.trim_end_matches('/'),
        quantity_id,
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d"),
        offset_minutes(offset)
    )
}

/// Raw-data URL between two instants, rendered in local time.
pub fn build_raw_data_url_between(
    base_url: &str,
    quantity_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "{}/api/TimeSeriesData/ReadRawData/{}/{}/{}/true/{}",
        base_url.trim_end_matches('/'),
        quantity_id,
        from.with_timezone(&offset).format("%Y-%m-%dT%H.%M.%S"),
        to.with_timezone(&offset).format("%Y-%m-%dT%H.%M.%S"),
        offset_minutes(offset)
    )
}

pub fn build_station_url(base_url: &str, station_id: &str) -> String {
    format!("{}/api/Station/Get/{}", base_url.trim_end_matches('/'), station_id)
}

pub fn build_latest_url(base_url: &str, station_id: &str, offset: FixedOffset) -> String {
    format!(
        "{}/api/LatestData/Read/Station/{}/{}",
        base_url.trim_end_matches('/'),
        station_id,
        offset_minutes(offset)
    )
}

fn offset_minutes(offset: FixedOffset) -> i32 {
    offset.local_minus_utc() / 60
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses an API timestamp. Offset-less timestamps are local time.
pub fn parse_timestamp(raw: &str, offset: FixedOffset) -> Result<DateTime<Utc>, ReportError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            if let Some(local) = offset.from_local_datetime(&naive).single() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }

    Err(ReportError::MalformedPayload(format!("unparseable timestamp '{}'", raw)))
}

/// Parses a `ReadRawData` body into a series, preserving source order.
pub fn parse_raw_data(body: &str, offset: FixedOffset) -> Result<SeriesResult, ReportError> {
    let response: RawDataResponse = serde_json::from_str(body)
        .map_err(|e| ReportError::MalformedPayload(format!("raw data: {}", e)))?;

    let points = response.data_points.unwrap_or_default();
    let samples = points
        .iter()
        .map(|point| {
            Ok(Sample::new(
                parse_timestamp(&point.timestamp, offset)?,
                point.value.unwrap_or(0.0),
            ))
        })
        .collect::<Result<Vec<_>, ReportError>>()?;

    Ok(SeriesResult::from_samples(samples))
}

/// Parses a `Station/Get` body, pulling the institution out of the nested
/// `JsonProperties.MetaData.Institution`.
pub fn parse_station(body: &str, station_id: &str) -> Result<StationInfo, ReportError> {
    let response: StationResponse = serde_json::from_str(body)
        .map_err(|e| ReportError::MalformedPayload(format!("station {}: {}", station_id, e)))?;

    let properties = match response.json_properties {
        Some(serde_json::Value::String(encoded)) => Some(
            serde_json::from_str::<serde_json::Value>(&encoded).map_err(|e| {
                ReportError::MalformedPayload(format!("station {} JsonProperties: {}", station_id, e))
            })?,
        ),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other),
    };

    let institution = properties
        .as_ref()
        .and_then(|p| p.get("MetaData"))
        .and_then(|m| m.get("Institution"))
        .and_then(|i| i.as_str())
        .map(str::to_string);

    Ok(StationInfo {
        station_id: station_id.to_string(),
        name: response.name,
        institution,
    })
}

/// Parses a `LatestData` body. A `null` body means the station reports nothing.
pub fn parse_latest(body: &str) -> Result<Vec<LatestReading>, ReportError> {
    let readings: Option<Vec<LatestReading>> = serde_json::from_str(body)
        .map_err(|e| ReportError::MalformedPayload(format!("latest data: {}", e)))?;
    Ok(readings.unwrap_or_default())
}

// ============================================================================
// Client
// ============================================================================

pub struct IowClient<T, S, P = ThreadSleep> {
    fetcher: ResilientFetcher<T, S, P>,
    base_url: String,
    offset: FixedOffset,
    credentials: Credentials,
    token: AccessToken,
}

impl IowClient<HttpTransport, OAuthTokenSource, ThreadSleep> {
    /// Builds the blocking HTTP stack from configuration and acquires the
    /// initial token.
    pub fn connect(config: &ServiceConfig, credentials: Credentials) -> Result<Self, ReportError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ReportError::Config(format!("HTTP client: {}", e)))?;

        let fetcher = ResilientFetcher::new(
            HttpTransport::new(http.clone()),
            OAuthTokenSource::new(http, config.api.token_url.clone()),
            RetryPolicy::from_config(config),
        );
        Self::new(fetcher, config, credentials)
    }
}

impl<T: Transport, S: TokenSource, P: Pause> IowClient<T, S, P> {
    pub fn new(
        fetcher: ResilientFetcher<T, S, P>,
        config: &ServiceConfig,
        credentials: Credentials,
    ) -> Result<Self, ReportError> {
        let token = fetcher.acquire_token(&credentials)?;
        Ok(Self {
            fetcher,
            base_url: config.api.base_url.clone(),
            offset: config.local_offset()?,
            credentials,
            token,
        })
    }

    fn get(&self, url: &str) -> Result<String, ReportError> {
        logging::debug(DataSource::Iow, None, &format!("GET {}", url));
        self.fetcher.fetch(url, &self.token, &self.credentials)
    }

    /// Latest reading of every physical quantity a station reports.
    pub fn latest_readings(&self, station_id: &str) -> Result<Vec<LatestReading>, ReportError> {
        let body = self.get(&build_latest_url(&self.base_url, station_id, self.offset))?;
        parse_latest(&body)
    }
}

impl<T: Transport, S: TokenSource, P: Pause> SeriesSource for IowClient<T, S, P> {
    fn fetch_series(
        &self,
        sensor: &SensorRef,
        window: &ReportWindow,
    ) -> Result<SeriesResult, ReportError> {
        let url = build_raw_data_url(&self.base_url, &sensor.quantity_id, window, self.offset);
        let series = parse_raw_data(&self.get(&url)?, self.offset)?;
        logging::debug(
            DataSource::Iow,
            Some(&sensor.station_id),
            &format!("{} samples for {}", series.samples().len(), sensor.quantity_id),
        );
        Ok(series)
    }

    fn fetch_series_between(
        &self,
        sensor: &SensorRef,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SeriesResult, ReportError> {
        let url =
            build_raw_data_url_between(&self.base_url, &sensor.quantity_id, from, to, self.offset);
        parse_raw_data(&self.get(&url)?, self.offset)
    }
}

impl<T: Transport, S: TokenSource, P: Pause> StationDirectory for IowClient<T, S, P> {
    fn describe(&self, station_id: &str) -> Result<StationInfo, ReportError> {
        let body = self.get(&build_station_url(&self.base_url, station_id))?;
        parse_station(&body, station_id)
    }

    fn latest_upload(
        &self,
        station_id: &str,
        quantity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, ReportError> {
        self.latest_readings(station_id)?
            .iter()
            .find(|r| r.quantity_id == quantity_id)
            .map(|r| parse_timestamp(&r.timestamp, self.offset))
            .transpose()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FetchError;
    use chrono::NaiveDate;
    use chrono::Timelike;
    use std::cell::RefCell;
    use std::time::Duration;

    fn taipei() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn window() -> ReportWindow {
        ReportWindow::new(
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_raw_data_url_covers_whole_days() {
        let url = build_raw_data_url("https://api.test/v3/", "PQ-1", &window(), taipei());
        assert_eq!(
            url,
            "https://api.test/v3/api/TimeSeriesData/ReadRawData/PQ-1/2024-07-01T00.00.00/2024-07-31T23.59.59/true/480"
        );
    }

    #[test]
    fn test_between_url_renders_local_time() {
        let from = Utc.with_ymd_and_hms(2024, 7, 1, 4, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 7, 1, 16, 0, 0).unwrap();
        let url = build_raw_data_url_between("https://api.test/v3", "PQ-1", from, to, taipei());
        assert!(
            url.ends_with("/PQ-1/2024-07-01T12.00.00/2024-07-02T00.00.00/true/480"),
            "got {}",
            url
        );
    }

    #[test]
    fn test_parse_raw_data_with_offsets_and_nulls() {
        let body = r#"{"DataPoints":[
            {"TimeStamp":"2024-07-01T08:00:00+08:00","Value":1.5},
            {"TimeStamp":"2024-07-01T08:10:00","Value":null}
        ]}"#;
        let series = parse_raw_data(body, taipei()).expect("valid payload");
        let samples = series.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(samples[0].value, 1.5);
        assert_eq!(samples[1].timestamp.hour(), 0, "offset-less time is local");
        assert_eq!(samples[1].value, 0.0, "null value is present but inactive");
    }

    #[test]
    fn test_empty_or_missing_data_points_is_empty_series() {
        assert!(parse_raw_data(r#"{"DataPoints":[]}"#, taipei()).unwrap().is_empty());
        assert!(parse_raw_data(r#"{"DataPoints":null}"#, taipei()).unwrap().is_empty());
        assert!(parse_raw_data(r#"{}"#, taipei()).unwrap().is_empty());
    }

    #[test]
    fn test_unexpected_shape_is_malformed() {
        let result = parse_raw_data(r#"{"DataPoints":"oops"}"#, taipei());
        assert!(matches!(result, Err(ReportError::MalformedPayload(_))), "got {:?}", result);

        let result = parse_raw_data(
            r#"{"DataPoints":[{"TimeStamp":"yesterday","Value":1}]}"#,
            taipei(),
        );
        assert!(matches!(result, Err(ReportError::MalformedPayload(_))), "got {:?}", result);
    }

    #[test]
    fn test_parse_station_decodes_encoded_properties() {
        let body = r#"{"Name":"MPD-017","JsonProperties":"{\"MetaData\":{\"Institution\":\"Tainan City\"}}"}"#;
        let station = parse_station(body, "ST-17").expect("valid station");
        assert_eq!(station.name, "MPD-017");
        assert_eq!(station.institution.as_deref(), Some("Tainan City"));
    }

    #[test]
    fn test_parse_station_without_properties() {
        let station = parse_station(r#"{"Name":"RFD-3","JsonProperties":null}"#, "ST-3").unwrap();
        assert_eq!(station.institution, None);
    }

    #[test]
    fn test_parse_latest_accepts_null_body() {
        assert!(parse_latest("null").unwrap().is_empty());
        let readings =
            parse_latest(r#"[{"Id":"PQ-1","Value":0.0,"TimeStamp":"2024-07-01T08:00:00+08:00"}]"#)
                .unwrap();
        assert_eq!(readings[0].quantity_id, "PQ-1");
    }

    // --- Client over a fake transport -------------------------------------

    struct FakeApi {
        requests: RefCell<Vec<String>>,
    }

    impl Transport for &FakeApi {
        fn get(&self, url: &str, _token: &AccessToken) -> Result<String, FetchError> {
            self.requests.borrow_mut().push(url.to_string());
            if url.contains("/Station/Get/") {
                Ok(r#"{"Name":"MPD-001","JsonProperties":null}"#.to_string())
            } else if url.contains("/LatestData/") {
                Ok(r#"[{"Id":"PQ-1","Value":0,"TimeStamp":"2024-07-01T09:00:00+08:00"}]"#.to_string())
            } else {
                Ok(r#"{"DataPoints":[{"TimeStamp":"2024-07-01T08:00:00+08:00","Value":2}]}"#.to_string())
            }
        }
    }

    struct StaticToken;

    impl TokenSource for StaticToken {
        fn acquire(&self, _credentials: &Credentials) -> Result<AccessToken, FetchError> {
            Ok(AccessToken("token".to_string()))
        }
    }

    struct NoPause;

    impl Pause for NoPause {
        fn pause(&self, _delay: Duration) {}
    }

    #[test]
    fn test_client_routes_each_capability_to_its_endpoint() {
        let api = FakeApi { requests: RefCell::new(Vec::new()) };
        let fetcher = ResilientFetcher::with_pause(&api, StaticToken, NoPause, RetryPolicy::default());
        let client = IowClient::new(fetcher, &ServiceConfig::default(), Credentials::new("a", "b"))
            .expect("token acquisition succeeds");
        let sensor = SensorRef {
            station_id: "ST-1".to_string(),
            quantity_id: "PQ-1".to_string(),
            location: None,
        };

        let station = client.describe("ST-1").unwrap();
        let series = client.fetch_series(&sensor, &window()).unwrap();
        let latest = client.latest_upload("ST-1", "PQ-1").unwrap();
        let missing = client.latest_upload("ST-1", "PQ-9").unwrap();

        assert_eq!(station.name, "MPD-001");
        assert_eq!(series.samples().len(), 1);
        assert_eq!(latest, Some(Utc.with_ymd_and_hms(2024, 7, 1, 1, 0, 0).unwrap()));
        assert_eq!(missing, None);
        assert_eq!(api.requests.borrow().len(), 4);
    }
}
