//! Geographic coordinates.
//!
//! A [`Coordinate`] is an immutable, range-checked latitude/longitude pair.
//! Textual input is recognised by a fixed, ordered list of notation
//! strategies; the first one that matches wins, so the most structured
//! notations are tried before the loose ones.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Mean earth radius used for great-circle distances, in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Coordinate construction errors
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
}

/// A point on the earth's surface, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

/// Unvalidated wire form, checked on the way in
#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Parse a coordinate from any supported notation.
    ///
    /// Tried in order: degrees-minutes-seconds, decimal degrees with degree
    /// symbols, a bare `"lat lon"` pair, and a `geo:` URI. Unrecognised
    /// input yields `None`; this never fails loudly.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        PARSE_STRATEGIES.iter().find_map(|strategy| strategy(text))
    }

    /// Render as `D° M′ S″ N D° M′ S″ E`, truncating sub-second precision
    pub fn format_dms(&self) -> String {
        let (lat_d, lat_m, lat_s, lat_neg) = dms_parts(self.latitude);
        let (lon_d, lon_m, lon_s, lon_neg) = dms_parts(self.longitude);
        let lat_hemi = if lat_neg { 'S' } else { 'N' };
        let lon_hemi = if lon_neg { 'W' } else { 'E' };
        format!(
            "{lat_d}° {lat_m}′ {lat_s}″ {lat_hemi} {lon_d}° {lon_m}′ {lon_s}″ {lon_hemi}"
        )
    }

    /// Render as `"lat, lon"` with a fixed number of decimals
    pub fn format_decimal(&self, precision: usize) -> String {
        format!(
            "{:.prec$}, {:.prec$}",
            self.latitude,
            self.longitude,
            prec = precision
        )
    }

    /// Great-circle (haversine) distance to another coordinate, in metres
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_dms())
    }
}

/// Unrecognised coordinate notation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized coordinate format: {0:?}")]
pub struct UnrecognizedFormat(pub String);

impl FromStr for Coordinate {
    type Err = UnrecognizedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coordinate::parse(s).ok_or_else(|| UnrecognizedFormat(s.to_string()))
    }
}

/// Largest float error, in arc seconds, treated as landing on a whole second
const SNAP_SECONDS: f64 = 1e-9;

/// Split an angle into whole degrees, minutes, seconds and a sign flag.
///
/// Angles that truncate to zero seconds are reported as non-negative.
fn dms_parts(value: f64) -> (u64, u64, u64, bool) {
    // Exact D/M/S input can come back a few ulps under the whole second;
    // only that float noise snaps up, anything further below truncates.
    let scaled = value.abs() * 3600.0;
    let whole = scaled.round();
    let total_seconds = (if (whole - scaled).abs() < SNAP_SECONDS { whole } else { scaled.floor() }) as u64;
    let negative = value < 0.0 && total_seconds > 0;
    (total_seconds / 3600, (total_seconds % 3600) / 60, total_seconds % 60, negative)
}

// --- Parse strategies ---

type ParseStrategy = fn(&str) -> Option<Coordinate>;

/// Most structured notation first
const PARSE_STRATEGIES: &[ParseStrategy] = &[parse_dms, parse_degree_decimal, parse_bare_pair, parse_geo_uri];

static DMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^(\d{1,3})\s*°\s*(\d{1,2})\s*['′]\s*(\d{1,2}(?:\.\d+)?)\s*(?:″|"|'')\s*([NS])\s*,?\s*(\d{1,3})\s*°\s*(\d{1,2})\s*['′]\s*(\d{1,2}(?:\.\d+)?)\s*(?:″|"|'')\s*([EW])$"#,
    )
    .expect("valid DMS pattern")
});

static DEGREE_DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(-?\d{1,3}(?:\.\d+)?)\s*°\s*([NS])?\s*,?\s*(-?\d{1,3}(?:\.\d+)?)\s*°\s*([EW])?$")
        .expect("valid degree pattern")
});

static BARE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d{1,3}(?:\.\d+)?)\s*(?:,|\s)\s*(-?\d{1,3}(?:\.\d+)?)$")
        .expect("valid pair pattern")
});

static GEO_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^geo:(-?\d{1,3}(?:\.\d+)?),(-?\d{1,3}(?:\.\d+)?)(?:,-?\d+(?:\.\d+)?)?(?:[;?].*)?$")
        .expect("valid geo uri pattern")
});

fn num(caps: &regex::Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx)?.as_str().parse().ok()
}

fn hemisphere_sign(caps: &regex::Captures<'_>, idx: usize, negative: &str) -> f64 {
    match caps.get(idx) {
        Some(m) if m.as_str().eq_ignore_ascii_case(negative) => -1.0,
        _ => 1.0,
    }
}

fn parse_dms(text: &str) -> Option<Coordinate> {
    let caps = DMS_RE.captures(text)?;
    let minutes_lat = num(&caps, 2)?;
    let seconds_lat = num(&caps, 3)?;
    let minutes_lon = num(&caps, 6)?;
    let seconds_lon = num(&caps, 7)?;
    if minutes_lat >= 60.0 || seconds_lat >= 60.0 || minutes_lon >= 60.0 || seconds_lon >= 60.0 {
        return None;
    }

    let lat = num(&caps, 1)? + minutes_lat / 60.0 + seconds_lat / 3600.0;
    let lon = num(&caps, 5)? + minutes_lon / 60.0 + seconds_lon / 3600.0;
    Coordinate::new(
        lat * hemisphere_sign(&caps, 4, "S"),
        lon * hemisphere_sign(&caps, 8, "W"),
    )
    .ok()
}

fn parse_degree_decimal(text: &str) -> Option<Coordinate> {
    let caps = DEGREE_DECIMAL_RE.captures(text)?;
    let mut lat = num(&caps, 1)?;
    let mut lon = num(&caps, 3)?;
    // An explicit hemisphere letter overrides any sign on the number
    if caps.get(2).is_some() {
        lat = lat.abs() * hemisphere_sign(&caps, 2, "S");
    }
    if caps.get(4).is_some() {
        lon = lon.abs() * hemisphere_sign(&caps, 4, "W");
    }
    Coordinate::new(lat, lon).ok()
}

fn parse_bare_pair(text: &str) -> Option<Coordinate> {
    let caps = BARE_PAIR_RE.captures(text)?;
    Coordinate::new(num(&caps, 1)?, num(&caps, 2)?).ok()
}

fn parse_geo_uri(text: &str) -> Option<Coordinate> {
    let caps = GEO_URI_RE.captures(text)?;
    Coordinate::new(num(&caps, 1)?, num(&caps, 2)?).ok()
}
