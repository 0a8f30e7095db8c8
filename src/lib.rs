pub mod broadcast;
pub mod bus;
pub mod commands;
pub mod config;
pub mod delta;
pub mod error;
pub mod format;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod persistence;
pub mod sampler;
pub mod service;
pub mod simulator;
pub mod telemetry;
pub mod tracker;

pub use config::AppConfig;
pub use error::TrackerError;
pub use service::Service;
pub use tracker::Tracker;
