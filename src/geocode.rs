//! Geocoding collaborator
//!
//! Only consulted when a zone is created or located; the store never calls it.

use async_trait::async_trait;
use geozone_core::Coordinate;

/// Address lookup in both directions. Failures are `None`, never errors.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Human-readable address for a point
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Option<String>;

    /// Point and display address for a free-text query
    async fn forward_geocode(&self, query: &str) -> Option<(Coordinate, String)>;
}

/// Geocoder that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGeocoder;

#[async_trait]
impl Geocoder for NoGeocoder {
    async fn reverse_geocode(&self, _coordinate: Coordinate) -> Option<String> {
        None
    }

    async fn forward_geocode(&self, _query: &str) -> Option<(Coordinate, String)> {
        None
    }
}

/// Fixed list of named places, for offline use and tests
#[derive(Debug, Clone)]
pub struct Gazetteer {
    places: Vec<(String, Coordinate)>,
    /// Reverse lookups further than this from every place find nothing
    max_distance_m: f64,
}

impl Gazetteer {
    pub fn new(max_distance_m: f64) -> Self {
        Self {
            places: Vec::new(),
            max_distance_m,
        }
    }

    pub fn with_place(mut self, name: impl Into<String>, at: Coordinate) -> Self {
        self.places.push((name.into(), at));
        self
    }
}

#[async_trait]
impl Geocoder for Gazetteer {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Option<String> {
        self.places
            .iter()
            .map(|(name, at)| (name, at.distance_to(&coordinate)))
            .filter(|(_, d)| *d <= self.max_distance_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name.clone())
    }

    async fn forward_geocode(&self, query: &str) -> Option<(Coordinate, String)> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.places
            .iter()
            .find(|(name, _)| name.to_lowercase().contains(&needle))
            .map(|(name, at)| (*at, name.clone()))
    }
}
