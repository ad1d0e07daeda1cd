//! Valhalla routing engine client
//!
//! Valhalla API documentation:
//! https://valhalla.github.io/valhalla/api/turn-by-turn/api-reference/

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RouteSummary, RoutingService, POLYLINE_PRECISION};
use crate::services::geo::decode_polyline;
use crate::types::Coordinates;

/// Valhalla client configuration
#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    /// Base URL of Valhalla server (e.g., "http://localhost:8002")
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl ValhallaConfig {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

/// Valhalla routing client
pub struct ValhallaClient {
    client: Client,
    config: ValhallaConfig,
}

impl ValhallaClient {
    pub fn new(config: ValhallaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Build the route request
    fn build_route_request(&self, locations: &[Coordinates]) -> RouteRequest {
        let locations = locations
            .iter()
            .map(|c| ValhallaLocation {
                lat: c.lat,
                lon: c.lng,
                // Geocoded city centroids are often well off the road network
                radius: Some(500),
            })
            .collect();

        RouteRequest {
            locations,
            costing: "truck".to_string(),
            units: "miles".to_string(),
            directions_type: "none".to_string(),
        }
    }
}

/// Concatenate the leg shapes, dropping the repeated first point of each
/// leg after the first.
fn join_legs(legs: &[Leg]) -> Result<Vec<Coordinates>> {
    let mut path: Vec<Coordinates> = Vec::new();
    for (i, leg) in legs.iter().enumerate() {
        let points = decode_polyline(&leg.shape, POLYLINE_PRECISION)?;
        debug!("Leg {} has {} points", i, points.len());
        if i == 0 {
            path.extend(points);
        } else {
            path.extend(points.into_iter().skip(1));
        }
    }
    Ok(path)
}

#[async_trait]
impl RoutingService for ValhallaClient {
    async fn route(&self, locations: &[Coordinates]) -> Result<RouteSummary> {
        if locations.len() < 2 {
            anyhow::bail!("Routing needs at least two locations, got {}", locations.len());
        }

        let request = self.build_route_request(locations);
        let url = format!("{}/route", self.config.base_url);

        debug!("Requesting route from Valhalla for {} locations", locations.len());

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send route request to Valhalla")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Valhalla route returned error {}: {}", status, body);
        }

        let route_response: RouteResponse = response
            .json()
            .await
            .context("Failed to parse Valhalla route response")?;

        let trip = route_response.trip;
        let path = join_legs(&trip.legs)?;

        debug!(
            "Valhalla route: {:.1} mi, {:.2} h, {} points",
            trip.summary.length,
            trip.summary.time / 3600.0,
            path.len()
        );

        Ok(RouteSummary {
            distance_miles: trip.summary.length,
            duration_hours: trip.summary.time / 3600.0,
            path,
        })
    }

    fn name(&self) -> &str {
        "Valhalla"
    }
}

// Valhalla API types

#[derive(Debug, Serialize, Clone)]
struct ValhallaLocation {
    lat: f64,
    lon: f64,
    /// Radius in meters for snapping to roads
    #[serde(skip_serializing_if = "Option::is_none")]
    radius: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RouteRequest {
    locations: Vec<ValhallaLocation>,
    costing: String,
    units: String,
    directions_type: String,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    legs: Vec<Leg>,
    summary: Summary,
}

#[derive(Debug, Deserialize)]
struct Summary {
    /// Length in the requested units (miles)
    length: f64,
    /// Time in seconds
    time: f64,
}

#[derive(Debug, Deserialize)]
struct Leg {
    /// Encoded polyline shape
    shape: String,
}
