pub mod app_settings;
pub mod errors;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod telemetry;
