//! Business logic services

pub mod geo;
pub mod geocoding;
pub mod hos;
pub mod nominatim;
pub mod routing;
pub mod trip_planner;
