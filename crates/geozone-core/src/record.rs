//! The shape record - one user-drawn zone.
//!
//! Geometry is a sum type so a record can never carry a radius and a
//! polygon at the same time; the flat, one-optional-field-per-kind layout
//! only exists on the wire (see [`crate::wire`]).

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use geozone_geometry::Coordinate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::ZoneColor;
use crate::error::ValidationError;

/// Shape identifier - UUID so ids minted on different devices never collide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub Uuid);

impl ShapeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ShapeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ShapeId)
    }
}

/// Which geometry a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Circle,
    Rectangle,
    Polygon,
    Polyline,
}

impl ShapeKind {
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Circle => "circle",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Polygon => "polygon",
            ShapeKind::Polyline => "polyline",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Kind-specific geometry, anchored at the record's base coordinate
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Radius in metres around the base coordinate
    Circle { radius: f64 },
    /// Base coordinate and this one are opposite corners
    Rectangle { second_coordinate: Coordinate },
    /// Closed ring
    Polygon { points: Vec<Coordinate> },
    /// Open path
    Polyline { points: Vec<Coordinate> },
}

impl Geometry {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Geometry::Circle { .. } => ShapeKind::Circle,
            Geometry::Rectangle { .. } => ShapeKind::Rectangle,
            Geometry::Polygon { .. } => ShapeKind::Polygon,
            Geometry::Polyline { .. } => ShapeKind::Polyline,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Geometry::Circle { radius } => {
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(ValidationError::InvalidRadius(*radius));
                }
            }
            Geometry::Rectangle { .. } => {}
            Geometry::Polygon { points } if points.len() < 3 => {
                return Err(ValidationError::TooFewPoints {
                    kind: ShapeKind::Polygon,
                    min: 3,
                    got: points.len(),
                });
            }
            Geometry::Polyline { points } if points.len() < 2 => {
                return Err(ValidationError::TooFewPoints {
                    kind: ShapeKind::Polyline,
                    min: 2,
                    got: points.len(),
                });
            }
            Geometry::Polygon { .. } | Geometry::Polyline { .. } => {}
        }
        Ok(())
    }
}

/// A zone drawn by the user.
///
/// `updated_at` is the merge authority and only ever moves forward; use
/// [`ShapeRecord::touch`] rather than assigning it. A record with
/// `deleted_at` set is a tombstone: hidden from every normal read but kept
/// in the durable file so the deletion can be synced.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    pub id: ShapeId,
    pub title: String,
    pub base_coordinate: Coordinate,
    pub geometry: Geometry,
    pub address: Option<String>,
    pub memo: Option<String>,
    /// Hex colour, normally one of [`ZoneColor`]
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub flight_start: Option<DateTime<Utc>>,
    pub flight_end: Option<DateTime<Utc>>,
}

impl ShapeRecord {
    /// Create a fresh, active record stamped with the current time
    pub fn new(
        title: impl Into<String>,
        base_coordinate: Coordinate,
        geometry: Geometry,
    ) -> Result<Self, ValidationError> {
        Self::new_at(title, base_coordinate, geometry, Utc::now())
    }

    /// Create a fresh record with an explicit creation time
    pub fn new_at(
        title: impl Into<String>,
        base_coordinate: Coordinate,
        geometry: Geometry,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        geometry.validate()?;
        Ok(Self {
            id: ShapeId::new(),
            title: title.into(),
            base_coordinate,
            geometry,
            address: None,
            memo: None,
            color: ZoneColor::default().to_hex().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            flight_start: None,
            flight_end: None,
        })
    }

    /// Convenience constructor for the common radius zone
    pub fn circle(
        title: impl Into<String>,
        center: Coordinate,
        radius: f64,
    ) -> Result<Self, ValidationError> {
        Self::new(title, center, Geometry::Circle { radius })
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_flight_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.flight_start = start;
        self.flight_end = end;
        self
    }

    pub fn shape_kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    /// Check every invariant a mutation must hold before it is applied
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.geometry.validate()?;
        if let (Some(start), Some(end)) = (self.flight_start, self.flight_end) {
            if end < start {
                return Err(ValidationError::InvertedWindow);
            }
        }
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// A record whose validity window has closed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.flight_end.is_some_and(|end| end < now)
    }

    /// Time left in the validity window, `None` when open-ended or expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.flight_end
            .filter(|end| *end >= now)
            .map(|end| end - now)
    }

    /// Latest moment this record changed, tombstoning included
    pub fn last_modified(&self) -> DateTime<Utc> {
        match self.deleted_at {
            Some(deleted) if deleted > self.updated_at => deleted,
            _ => self.updated_at,
        }
    }

    /// Bump `updated_at` without ever moving it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Turn this record into a tombstone
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.touch(now);
        self.deleted_at = Some(self.updated_at);
    }

    /// Bring a tombstone back to the active set
    pub fn restore(&mut self, now: DateTime<Utc>) {
        self.touch(now);
        self.deleted_at = None;
    }

    /// Point that represents the shape on a map (centroid for multi-point shapes)
    pub fn center(&self) -> Coordinate {
        match &self.geometry {
            Geometry::Circle { .. } => self.base_coordinate,
            Geometry::Rectangle { second_coordinate } => Coordinate::new(
                (self.base_coordinate.latitude() + second_coordinate.latitude()) / 2.0,
                (self.base_coordinate.longitude() + second_coordinate.longitude()) / 2.0,
            )
            .unwrap_or(self.base_coordinate),
            Geometry::Polygon { points } | Geometry::Polyline { points } => {
                let n = points.len() as f64;
                let lat = points.iter().map(Coordinate::latitude).sum::<f64>() / n;
                let lon = points.iter().map(Coordinate::longitude).sum::<f64>() / n;
                Coordinate::new(lat, lon).unwrap_or(self.base_coordinate)
            }
        }
    }

    /// Check whether a point falls inside the zone
    pub fn contains(&self, point: &Coordinate) -> bool {
        match &self.geometry {
            Geometry::Circle { radius } => self.base_coordinate.distance_to(point) <= *radius,
            Geometry::Rectangle { second_coordinate } => {
                let (a, b) = (self.base_coordinate, *second_coordinate);
                let lat_ok = point.latitude() >= a.latitude().min(b.latitude())
                    && point.latitude() <= a.latitude().max(b.latitude());
                let lon_ok = point.longitude() >= a.longitude().min(b.longitude())
                    && point.longitude() <= a.longitude().max(b.longitude());
                lat_ok && lon_ok
            }
            Geometry::Polygon { points } => polygon_contains(points, point),
            Geometry::Polyline { .. } => false,
        }
    }
}

/// Even-odd ray casting in the lat/lon plane
fn polygon_contains(ring: &[Coordinate], point: &Coordinate) -> bool {
    let (x, y) = (point.longitude(), point.latitude());
    let mut inside = false;
    let mut j = ring.len().wrapping_sub(1);
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].longitude(), ring[i].latitude());
        let (xj, yj) = (ring[j].longitude(), ring[j].latitude());
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn new_record_is_active_with_equal_timestamps() {
        let r = ShapeRecord::circle("Home", c(37.5, 127.0), 100.0).unwrap();
        assert!(r.is_active());
        assert_eq!(r.created_at, r.updated_at);
        assert_eq!(r.shape_kind(), ShapeKind::Circle);
        assert_eq!(r.color, ZoneColor::Red.to_hex());
    }

    #[test]
    fn geometry_validation() {
        assert_eq!(
            ShapeRecord::circle("x", c(0.0, 0.0), 0.0).unwrap_err(),
            ValidationError::InvalidRadius(0.0)
        );
        let err = ShapeRecord::new("x", c(0.0, 0.0), Geometry::Polygon { points: vec![c(0.0, 0.0)] })
            .unwrap_err();
        assert!(matches!(err, ValidationError::TooFewPoints { min: 3, got: 1, .. }));
        let err = ShapeRecord::new("x", c(0.0, 0.0), Geometry::Polyline { points: vec![] }).unwrap_err();
        assert!(matches!(err, ValidationError::TooFewPoints { min: 2, got: 0, .. }));
    }

    #[test]
    fn inverted_window_rejected() {
        let r = ShapeRecord::circle("x", c(0.0, 0.0), 10.0)
            .unwrap()
            .with_flight_window(Some(at(200)), Some(at(100)));
        assert_eq!(r.validate(), Err(ValidationError::InvertedWindow));
    }

    #[test]
    fn touch_never_regresses() {
        let mut r = ShapeRecord::new_at("x", c(0.0, 0.0), Geometry::Circle { radius: 5.0 }, at(1_000)).unwrap();
        r.touch(at(500));
        assert_eq!(r.updated_at, at(1_000));
        r.touch(at(2_000));
        assert_eq!(r.updated_at, at(2_000));
    }

    #[test]
    fn tombstone_and_restore() {
        let mut r = ShapeRecord::new_at("x", c(0.0, 0.0), Geometry::Circle { radius: 5.0 }, at(10)).unwrap();
        r.mark_deleted(at(20));
        assert!(r.is_deleted());
        assert_eq!(r.deleted_at, Some(at(20)));
        assert_eq!(r.last_modified(), at(20));
        r.restore(at(30));
        assert!(r.is_active());
        assert_eq!(r.updated_at, at(30));
    }

    #[test]
    fn expiry() {
        let r = ShapeRecord::circle("x", c(0.0, 0.0), 5.0)
            .unwrap()
            .with_flight_window(None, Some(at(100)));
        assert!(r.is_expired(at(101)));
        assert!(!r.is_expired(at(100)));
        assert_eq!(r.remaining(at(40)), Some(Duration::seconds(60)));
        assert_eq!(r.remaining(at(200)), None);
    }

    #[test]
    fn circle_contains_by_distance() {
        let r = ShapeRecord::circle("x", c(37.5665, 126.9780), 500.0).unwrap();
        assert!(r.contains(&c(37.5670, 126.9785)));
        assert!(!r.contains(&c(37.60, 126.9780)));
    }

    #[test]
    fn rectangle_and_polygon_contains() {
        let rect = ShapeRecord::new(
            "r",
            c(10.0, 10.0),
            Geometry::Rectangle { second_coordinate: c(0.0, 0.0) },
        )
        .unwrap();
        assert!(rect.contains(&c(5.0, 5.0)));
        assert!(!rect.contains(&c(11.0, 5.0)));
        assert_eq!(rect.center(), c(5.0, 5.0));

        let tri = ShapeRecord::new(
            "t",
            c(0.0, 0.0),
            Geometry::Polygon { points: vec![c(0.0, 0.0), c(0.0, 10.0), c(10.0, 0.0)] },
        )
        .unwrap();
        assert!(tri.contains(&c(2.0, 2.0)));
        assert!(!tri.contains(&c(8.0, 8.0)));

        let line = ShapeRecord::new(
            "l",
            c(0.0, 0.0),
            Geometry::Polyline { points: vec![c(0.0, 0.0), c(1.0, 1.0)] },
        )
        .unwrap();
        assert!(!line.contains(&c(0.5, 0.5)));
    }
}
