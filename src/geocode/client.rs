use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::GeocoderConfig;
use crate::directory::{Coordinates, ProfileError};

/// One geocoding hit. Coordinates arrive as decimal strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeMatch {
    pub lat: String,
    pub lon: String,
}

impl GeocodeMatch {
    pub fn coordinates(&self) -> Result<Coordinates, ProfileError> {
        Coordinates::parse(&self.lat, &self.lon)
    }
}

/// Free-text address lookup.
pub trait Geocoder: Send + Sync {
    /// Best matches for `query`, most relevant first. An empty list means no match.
    fn lookup(&self, query: &str) -> Result<Vec<GeocodeMatch>>;
}

/// Client for a Nominatim search endpoint.
pub struct NominatimClient {
    agent: ureq::Agent,
    search_url: String,
    user_agent: String,
}

impl NominatimClient {
    pub fn new(config: &GeocoderConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            search_url: format!("{}/search", config.endpoint.trim_end_matches('/')),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Geocoder for NominatimClient {
    fn lookup(&self, query: &str) -> Result<Vec<GeocodeMatch>> {
        let response = self
            .agent
            .get(&self.search_url)
            .set("User-Agent", &self.user_agent)
            .query("format", "json")
            .query("q", query)
            .query("limit", "1")
            .call()
            .map_err(|e| anyhow!("Geocoding request failed: {}", e))?;

        response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse geocoding response: {}", e))
    }
}
