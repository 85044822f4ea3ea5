pub mod analysis;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod report;
pub mod stations;
pub mod verify;
