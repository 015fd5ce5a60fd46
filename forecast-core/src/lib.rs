//! Core library for the `forecast` CLI.
//!
//! This crate reconciles several free, keyless U.S. forecast sources into
//! one normalized forecast:
//! - Grid-point resolution with a process-lifetime cache
//! - Concurrent multi-source fetch tolerating partial failure
//! - Time-series decoding and timezone-aware daily/hourly aggregation
//! - Text and structured-code condition classification
//! - A disk-backed revision cache that keeps today's extremes monotonic
//!
//! It is used by `forecast-cli`, but can also be reused by other binaries or services.

pub mod aggregate;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod grid;
pub mod model;
pub mod provider;
pub mod revision;
pub mod sources;
pub mod timeseries;

pub use config::{Config, Endpoints, LocationConfig};
pub use error::{CacheError, PipelineError, SourceError};
pub use model::{
    Alert, Condition, ConditionCategory, Coordinate, DailyForecast, ForecastRequest,
    NormalizedForecast, PointForecast, Units,
};
pub use provider::{WeatherProvider, nws::NwsProvider, provider_from_config};
