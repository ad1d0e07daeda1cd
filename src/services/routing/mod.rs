//! Routing service for truck routes between trip locations
//!
//! Uses Valhalla for production, mock for tests.

mod valhalla;

pub use valhalla::{ValhallaClient, ValhallaConfig};

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::services::geo::{encode_polyline, road_miles, AVERAGE_SPEED_MPH};
use crate::types::Coordinates;

/// Precision of the polylines this worker emits (Valhalla's 6 digits)
pub const POLYLINE_PRECISION: u32 = 6;

/// A routed path through all requested locations
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSummary {
    pub distance_miles: f64,
    pub duration_hours: f64,
    /// Points of the path in travel order
    pub path: Vec<Coordinates>,
}

impl RouteSummary {
    pub fn polyline(&self) -> String {
        encode_polyline(&self.path, POLYLINE_PRECISION)
    }
}

/// Routing service trait for abstraction (Valhalla, mock, etc.)
#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Route through `locations` in order. At least two locations are required.
    async fn route(&self, locations: &[Coordinates]) -> Result<RouteSummary>;

    /// Get service name for logging
    fn name(&self) -> &str;
}

/// Mock routing service for tests
/// Uses Haversine distance × coefficient at a constant average speed
pub struct MockRoutingService {
    average_speed_mph: f64,
}

impl Default for MockRoutingService {
    fn default() -> Self {
        Self {
            average_speed_mph: AVERAGE_SPEED_MPH,
        }
    }
}

impl MockRoutingService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoutingService for MockRoutingService {
    async fn route(&self, locations: &[Coordinates]) -> Result<RouteSummary> {
        if locations.len() < 2 {
            anyhow::bail!("Routing needs at least two locations, got {}", locations.len());
        }

        let distance_miles: f64 = locations.windows(2).map(|w| road_miles(&w[0], &w[1])).sum();

        Ok(RouteSummary {
            distance_miles,
            duration_hours: distance_miles / self.average_speed_mph,
            path: locations.to_vec(),
        })
    }

    fn name(&self) -> &str {
        "MockRouting"
    }
}

/// Create routing service with automatic Valhalla detection and fallback
///
/// Tries to connect to Valhalla if URL is provided. Falls back to mock
/// routing service if Valhalla is unavailable or URL is not configured.
pub async fn create_routing_service_with_fallback(
    valhalla_url: Option<String>,
    timeout: Duration,
) -> Box<dyn RoutingService> {
    if let Some(url) = valhalla_url {
        match check_valhalla_health(&url, timeout).await {
            Ok(()) => match ValhallaClient::new(ValhallaConfig::new(&url, timeout)) {
                Ok(client) => {
                    info!("Valhalla routing service available at {}", url);
                    return Box::new(client);
                }
                Err(e) => warn!("Failed to build Valhalla client: {}. Falling back to mock routing.", e),
            },
            Err(e) => {
                warn!("Valhalla not available at {}: {}. Falling back to mock routing.", url, e);
            }
        }
    }

    info!("Using mock routing service (Valhalla not configured or unavailable)");
    Box::new(MockRoutingService::new())
}

/// Check if Valhalla is healthy by making a simple status request
async fn check_valhalla_health(base_url: &str, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let url = format!("{}/status", base_url.trim_end_matches('/'));
    let response = client.get(&url).send().await?;

    if response.status().is_success() {
        Ok(())
    } else {
        anyhow::bail!("Valhalla returned status {}", response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::geo::decode_polyline;

    fn chicago() -> Coordinates {
        Coordinates { lat: 41.8781, lng: -87.6298 }
    }

    fn st_louis() -> Coordinates {
        Coordinates { lat: 38.6270, lng: -90.1994 }
    }

    fn dallas() -> Coordinates {
        Coordinates { lat: 32.7767, lng: -96.7970 }
    }

    #[tokio::test]
    async fn mock_route_needs_two_locations() {
        let service = MockRoutingService::new();
        assert!(service.route(&[chicago()]).await.is_err());
        assert!(service.route(&[]).await.is_err());
    }

    #[tokio::test]
    async fn mock_route_sums_legs() {
        let service = MockRoutingService::new();
        let direct = service.route(&[chicago(), dallas()]).await.unwrap();
        let via = service.route(&[chicago(), st_louis(), dallas()]).await.unwrap();

        assert!(via.distance_miles > direct.distance_miles);
        assert_eq!(via.path.len(), 3);
        // Chicago → St. Louis is ~258 mi straight, ~335 mi estimated road
        let first_leg = service.route(&[chicago(), st_louis()]).await.unwrap();
        assert!(first_leg.distance_miles > 300.0 && first_leg.distance_miles < 370.0);
    }

    #[tokio::test]
    async fn mock_route_uses_average_speed() {
        let service = MockRoutingService { average_speed_mph: 50.0 };
        let route = service.route(&[chicago(), st_louis()]).await.unwrap();
        assert!((route.duration_hours - route.distance_miles / 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn polyline_round_trips_path() {
        let route = MockRoutingService::new().route(&[chicago(), dallas()]).await.unwrap();
        let decoded = decode_polyline(&route.polyline(), POLYLINE_PRECISION).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!((decoded[1].lat - 32.7767).abs() < 1e-6);
    }

    #[test]
    fn test_routing_service_name() {
        assert_eq!(MockRoutingService::new().name(), "MockRouting");
    }

    #[tokio::test]
    async fn test_create_routing_service_with_fallback_no_url() {
        let service = create_routing_service_with_fallback(None, Duration::from_secs(1)).await;
        assert_eq!(service.name(), "MockRouting");
    }

    #[tokio::test]
    async fn test_create_routing_service_with_fallback_invalid_url() {
        let service = create_routing_service_with_fallback(
            Some("http://localhost:99999".to_string()),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(service.name(), "MockRouting");
    }

    #[tokio::test]
    #[ignore = "Requires running Valhalla server"]
    async fn test_create_routing_service_with_fallback_valhalla_available() {
        let service = create_routing_service_with_fallback(
            Some("http://localhost:8002".to_string()),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(service.name(), "Valhalla");
    }
}
