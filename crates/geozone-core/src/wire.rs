//! On-disk / on-wire form of [`ShapeRecord`].
//!
//! The durable file has never carried a schema version, so decoding accepts
//! every layout earlier clients wrote:
//!
//! - `started_at` stands in for a missing `created_at` and `flight_start`
//! - `expire_date` stands in for a missing `flight_end`
//! - dates may be RFC 3339 strings, float or integer seconds since
//!   2001-01-01T00:00:00Z, or looser ISO-8601 strings
//!
//! A date that cannot be read degrades to a default and logs a warning; it
//! never fails the record. Encoding only ever writes the modern field names.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use geozone_geometry::Coordinate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::color::ZoneColor;
use crate::error::ValidationError;
use crate::record::{Geometry, ShapeId, ShapeKind, ShapeRecord};

/// Unix timestamp of the reference date legacy numeric dates count from
pub const REFERENCE_DATE_UNIX: i64 = 978_307_200;

// --- Encoding ---

#[derive(Serialize)]
struct EncodedRecord<'a> {
    id: ShapeId,
    title: &'a str,
    shape_kind: ShapeKind,
    base_coordinate: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    second_coordinate: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    polygon_points: Option<&'a [Coordinate]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    polyline_points: Option<&'a [Coordinate]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<&'a str>,
    color: &'a str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flight_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flight_end: Option<DateTime<Utc>>,
}

impl<'a> From<&'a ShapeRecord> for EncodedRecord<'a> {
    fn from(r: &'a ShapeRecord) -> Self {
        let (radius, second_coordinate, polygon_points, polyline_points) = match &r.geometry {
            Geometry::Circle { radius } => (Some(*radius), None, None, None),
            Geometry::Rectangle { second_coordinate } => (None, Some(*second_coordinate), None, None),
            Geometry::Polygon { points } => (None, None, Some(points.as_slice()), None),
            Geometry::Polyline { points } => (None, None, None, Some(points.as_slice())),
        };
        Self {
            id: r.id,
            title: &r.title,
            shape_kind: r.shape_kind(),
            base_coordinate: r.base_coordinate,
            radius,
            second_coordinate,
            polygon_points,
            polyline_points,
            address: r.address.as_deref(),
            memo: r.memo.as_deref(),
            color: &r.color,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
            flight_start: r.flight_start,
            flight_end: r.flight_end,
        }
    }
}

impl Serialize for ShapeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EncodedRecord::from(self).serialize(serializer)
    }
}

// --- Decoding ---

/// Every field any client version has written. Dates stay untyped until
/// [`decode_date`] has had a go at them.
#[derive(Deserialize)]
struct DecodedRecord {
    id: ShapeId,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "shapeKind")]
    shape_kind: Option<ShapeKind>,
    #[serde(alias = "baseCoordinate")]
    base_coordinate: Coordinate,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default, alias = "secondCoordinate")]
    second_coordinate: Option<Coordinate>,
    #[serde(default, alias = "polygonPoints")]
    polygon_points: Option<Vec<Coordinate>>,
    #[serde(default, alias = "polylinePoints")]
    polyline_points: Option<Vec<Coordinate>>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    memo: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default, alias = "createdAt")]
    created_at: Option<Value>,
    #[serde(default, alias = "updatedAt")]
    updated_at: Option<Value>,
    #[serde(default, alias = "deletedAt")]
    deleted_at: Option<Value>,
    #[serde(default, alias = "flightStart")]
    flight_start: Option<Value>,
    #[serde(default, alias = "flightEnd")]
    flight_end: Option<Value>,
    #[serde(default, alias = "startedAt")]
    started_at: Option<Value>,
    #[serde(default, alias = "expireDate")]
    expire_date: Option<Value>,
}

impl<'de> Deserialize<'de> for ShapeRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let decoded = DecodedRecord::deserialize(deserializer)?;
        decoded.into_record(Utc::now()).map_err(serde::de::Error::custom)
    }
}

impl DecodedRecord {
    fn into_record(self, now: DateTime<Utc>) -> Result<ShapeRecord, ValidationError> {
        let id = self.id;
        let geometry = self.geometry()?;

        let started_at = self
            .started_at
            .as_ref()
            .and_then(|v| decode_date_field(id, "started_at", v));

        let created_at = self
            .created_at
            .as_ref()
            .and_then(|v| decode_date_field(id, "created_at", v))
            .or(started_at)
            .unwrap_or_else(|| {
                warn!(%id, field = "created_at", "no readable creation date, using now");
                now
            });

        let updated_at = self
            .updated_at
            .as_ref()
            .and_then(|v| decode_date_field(id, "updated_at", v))
            .unwrap_or(created_at)
            .max(created_at);

        let flight_start = self
            .flight_start
            .as_ref()
            .and_then(|v| decode_date_field(id, "flight_start", v))
            .or(started_at);

        let flight_end = self
            .flight_end
            .as_ref()
            .and_then(|v| decode_date_field(id, "flight_end", v))
            .or_else(|| {
                self.expire_date
                    .as_ref()
                    .and_then(|v| decode_date_field(id, "expire_date", v))
            });

        // An unreadable tombstone marker must not resurrect the record
        let deleted_at = match self.deleted_at.as_ref() {
            None => None,
            Some(v) => Some(decode_date_field(id, "deleted_at", v).unwrap_or(updated_at)),
        };

        Ok(ShapeRecord {
            id,
            title: self.title,
            base_coordinate: self.base_coordinate,
            geometry,
            address: self.address,
            memo: self.memo,
            color: self
                .color
                .unwrap_or_else(|| ZoneColor::default().to_hex().to_string()),
            created_at,
            updated_at,
            deleted_at,
            flight_start,
            flight_end,
        })
    }

    fn geometry(&self) -> Result<Geometry, ValidationError> {
        // Records from before shapes had kinds were all radius zones
        let kind = self.shape_kind.unwrap_or_else(|| {
            if self.second_coordinate.is_some() {
                ShapeKind::Rectangle
            } else if self.polygon_points.is_some() {
                ShapeKind::Polygon
            } else if self.polyline_points.is_some() {
                ShapeKind::Polyline
            } else {
                ShapeKind::Circle
            }
        });

        let geometry = match kind {
            ShapeKind::Circle => Geometry::Circle {
                radius: self.radius.ok_or(ValidationError::MissingGeometry { kind, field: "radius" })?,
            },
            ShapeKind::Rectangle => Geometry::Rectangle {
                second_coordinate: self.second_coordinate.ok_or(ValidationError::MissingGeometry {
                    kind,
                    field: "second_coordinate",
                })?,
            },
            ShapeKind::Polygon => Geometry::Polygon {
                points: self.polygon_points.clone().ok_or(ValidationError::MissingGeometry {
                    kind,
                    field: "polygon_points",
                })?,
            },
            ShapeKind::Polyline => Geometry::Polyline {
                points: self.polyline_points.clone().ok_or(ValidationError::MissingGeometry {
                    kind,
                    field: "polyline_points",
                })?,
            },
        };
        geometry.validate()?;
        Ok(geometry)
    }
}

// --- Date migration ---

type DateStrategy = fn(&Value) -> Option<DateTime<Utc>>;

/// Tried in order; the first hit wins
const DATE_STRATEGIES: &[DateStrategy] = &[native_date, float_timestamp, integer_timestamp, iso8601_string];

/// Decode a date in any layout ever persisted, `None` if nothing fits
pub fn decode_date(value: &Value) -> Option<DateTime<Utc>> {
    if value.is_null() {
        return None;
    }
    DATE_STRATEGIES.iter().find_map(|strategy| strategy(value))
}

fn decode_date_field(id: ShapeId, field: &'static str, value: &Value) -> Option<DateTime<Utc>> {
    let decoded = decode_date(value);
    match (&decoded, value.is_null()) {
        (None, false) => warn!(%id, field, raw = %value, "unreadable legacy date, falling back to default"),
        (Some(_), _) if field == "started_at" || field == "expire_date" => {
            debug!(%id, field, "migrated legacy date field")
        }
        _ => {}
    }
    decoded
}

fn native_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn from_reference_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    let secs = (whole as i64).checked_add(REFERENCE_DATE_UNIX)?;
    DateTime::from_timestamp(secs, nanos.min(999_999_999))
}

fn float_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if !value.is_f64() {
        return None;
    }
    from_reference_seconds(value.as_f64()?)
}

fn integer_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let seconds = value.as_i64()?;
    DateTime::from_timestamp(seconds.checked_add(REFERENCE_DATE_UNIX)?, 0)
}

fn iso8601_string(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();

    const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"];
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
