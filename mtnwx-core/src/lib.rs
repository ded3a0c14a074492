//! Core library for the `mtnwx` CLI.
//!
//! This crate defines:
//! - Configuration handling
//! - A query cache with staleness and retention horizons
//! - The mountain weather forecast client and its response schema
//! - The KML-to-GeoJSON pipeline for observation zones
//!
//! It is used by `mtnwx-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod forecast;
pub mod geojson;
pub mod kml;
pub mod model;

pub use cache::{CachePolicy, Clock, ManualClock, Query, QueryCache, QueryKey, SystemClock};
pub use client::WeatherClient;
pub use config::{CacheConfig, CacheSettings, Config, ZoneSourceConfig};
pub use error::{ErrorReporter, FetchError, LogReporter, ValidationError};
pub use forecast::{ForecastClient, ForecastObject, ForecastResponse, TimeOfDay};
pub use geojson::{Feature, FeatureCollection, FeatureId, Geometry, ZoneProperties};
pub use kml::{ZoneClient, zones_from_kml};
pub use model::{RegionId, RequestedTime};
