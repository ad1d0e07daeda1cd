//! Nominatim geocoding client

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::Coordinates;

/// Nominatim API response
#[derive(Debug, Deserialize)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

/// A resolved place
#[derive(Debug, Clone)]
pub struct NominatimPlace {
    pub coordinates: Coordinates,
    pub display_name: String,
}

/// Nominatim geocoding client
pub struct NominatimClient {
    base_url: String,
    client: reqwest::Client,
}

impl NominatimClient {
    /// Create a new client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("hos-worker/0.1 (trip planning)")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn search_url(&self, address: &str) -> String {
        format!(
            "{}/search?q={}&format=json&countrycodes=us&limit=1",
            self.base_url,
            urlencoding::encode(address)
        )
    }

    /// Geocode a free-form address
    pub async fn geocode(&self, address: &str) -> Result<Option<NominatimPlace>> {
        let response = self.client
            .get(self.search_url(address))
            .send()
            .await
            .context("Failed to send geocoding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Nominatim returned status {}", response.status());
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .context("Failed to parse geocoding response")?;

        match results.into_iter().next() {
            Some(result) => {
                let lat: f64 = result.lat.parse().context("Invalid latitude")?;
                let lng: f64 = result.lon.parse().context("Invalid longitude")?;
                Ok(Some(NominatimPlace {
                    coordinates: Coordinates { lat, lng },
                    display_name: result.display_name,
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_address() {
        let client = NominatimClient::new("https://nominatim.example.org/").unwrap();
        let url = client.search_url("Chicago, IL");
        assert_eq!(
            url,
            "https://nominatim.example.org/search?q=Chicago%2C%20IL&format=json&countrycodes=us&limit=1"
        );
    }

    #[test]
    fn parses_search_response() {
        let body = r#"[{"lat":"41.8755616","lon":"-87.6244212","display_name":"Chicago, Cook County, Illinois, United States"}]"#;
        let results: Vec<NominatimResult> = serde_json::from_str(body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lat, "41.8755616");
    }

    #[tokio::test]
    #[ignore = "Requires network access to Nominatim"]
    async fn geocodes_real_address() {
        let client = NominatimClient::new("https://nominatim.openstreetmap.org").unwrap();
        let place = client.geocode("Chicago, IL").await.unwrap().unwrap();
        assert!((place.coordinates.lat - 41.88).abs() < 0.5);
    }
}
