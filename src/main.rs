//! Command-line entry point.
//!
//! ```text
//! iow_report_service <report> <start> <end> <sensor-list> [config]
//! iow_report_service verify <sensor-list> [config]
//! ```
//!
//! `<report>` is one of `pump-runtime`, `flood-height`, `availability`,
//! `fleet`, `raw-series`, `dispatch`; dates are `YYYY-MM-DD`. The report is
//! printed as JSON on stdout. Per-sensor failures are part of the report;
//! the process only fails on configuration or connection problems.
//!
//! Environment: `API_CLIENT_ID` / `API_CLIENT_SECRET` (or a `.env` file),
//! `IOW_REPLAY_DIR` to read saved payloads instead of the live API,
//! `IOW_LOG_FILE` to append logs to a file, `RUST_LOG` to override the
//! log filter.

use std::path::Path;
use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use iow_report_service::config::{Credentials, ServiceConfig};
use iow_report_service::ingest::iow::IowClient;
use iow_report_service::ingest::replay::ReplaySource;
use iow_report_service::ingest::{SeriesSource, StationDirectory};
use iow_report_service::logging::{self, DataSource, LogLevel};
use iow_report_service::model::{ReportError, ReportWindow};
use iow_report_service::report::{ReportKind, ReportRunner};
use iow_report_service::stations::load_sensor_list;
use iow_report_service::verify;

const DEFAULT_CONFIG: &str = "iow_report.toml";

const USAGE: &str = "usage: iow_report_service <report> <start> <end> <sensor-list> [config]\n       \
                     iow_report_service verify <sensor-list> [config]";

enum Command {
    Report {
        kind: ReportKind,
        window: ReportWindow,
        sensor_list: String,
    },
    Verify {
        sensor_list: String,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ReportError> {
    let log_file = std::env::var("IOW_LOG_FILE").ok();
    logging::init_logger(LogLevel::Info, log_file.as_deref(), true)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, config_path) = parse_args(&args)?;
    let config = load_config(config_path)?;

    match std::env::var("IOW_REPLAY_DIR") {
        Ok(dir) => {
            logging::info(DataSource::System, None, &format!("replaying payloads from {}", dir));
            execute(&ReplaySource::new(dir, config.local_offset()?), &config, command)
        }
        Err(_) => {
            let client = IowClient::connect(&config, Credentials::from_env()?)?;
            execute(&client, &config, command)
        }
    }
}

fn parse_args(args: &[String]) -> Result<(Command, Option<&str>), ReportError> {
    match args {
        [verb, list, rest @ ..] if verb == "verify" && rest.len() <= 1 => Ok((
            Command::Verify {
                sensor_list: list.clone(),
            },
            rest.first().map(String::as_str),
        )),
        [kind, start, end, list, rest @ ..] if rest.len() <= 1 => {
            let window = ReportWindow::new(parse_date(start)?, parse_date(end)?)?;
            Ok((
                Command::Report {
                    kind: kind.parse()?,
                    window,
                    sensor_list: list.clone(),
                },
                rest.first().map(String::as_str),
            ))
        }
        _ => Err(ReportError::Config(USAGE.to_string())),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ReportError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ReportError::Config(format!("invalid date {:?}: {}", raw, e)))
}

/// An explicit path must exist; the default file is optional.
fn load_config(path: Option<&str>) -> Result<ServiceConfig, ReportError> {
    match path {
        Some(path) => ServiceConfig::load(Path::new(path)),
        None if Path::new(DEFAULT_CONFIG).exists() => ServiceConfig::load(Path::new(DEFAULT_CONFIG)),
        None => Ok(ServiceConfig::default()),
    }
}

fn execute<S>(source: &S, config: &ServiceConfig, command: Command) -> Result<(), ReportError>
where
    S: SeriesSource + StationDirectory,
{
    match command {
        Command::Report {
            kind,
            window,
            sensor_list,
        } => {
            let sensors = load_sensor_list(Path::new(&sensor_list))?;
            let runner = ReportRunner::new(source, source, config)?;
            let report = runner.run(kind, &sensors, &window, Utc::now());
            if !report.failed().is_empty() {
                logging::warn(
                    DataSource::System,
                    None,
                    &format!("{} of {} sensors failed", report.failed().len(), sensors.len()),
                );
            }
            print_json(&report)
        }
        Command::Verify { sensor_list } => {
            let sensors = load_sensor_list(Path::new(&sensor_list))?;
            let report = verify::run_verification(source, &sensors, Utc::now());
            verify::print_summary(&report);
            print_json(&report)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{}", json);
    Ok(())
}
