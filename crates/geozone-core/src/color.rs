//! Named zone colours.
//!
//! Records store their colour as an untyped hex string so that colours
//! written by other clients survive a round trip; this palette is what the
//! shell actually offers.

use serde::{Deserialize, Serialize};

/// Palette of zone colours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ZoneColor {
    #[default]
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Gray,
}

impl ZoneColor {
    pub const ALL: [ZoneColor; 7] = [
        ZoneColor::Red,
        ZoneColor::Orange,
        ZoneColor::Yellow,
        ZoneColor::Green,
        ZoneColor::Blue,
        ZoneColor::Purple,
        ZoneColor::Gray,
    ];

    /// Hex encoding as stored on records
    pub fn to_hex(self) -> &'static str {
        match self {
            ZoneColor::Red => "#FF3B30",
            ZoneColor::Orange => "#FF9500",
            ZoneColor::Yellow => "#FFCC00",
            ZoneColor::Green => "#34C759",
            ZoneColor::Blue => "#007AFF",
            ZoneColor::Purple => "#AF52DE",
            ZoneColor::Gray => "#8E8E93",
        }
    }

    /// Look up a palette entry from a stored hex string (case-insensitive, `#` optional)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let wanted = hex.trim().trim_start_matches('#');
        Self::ALL
            .into_iter()
            .find(|c| c.to_hex()[1..].eq_ignore_ascii_case(wanted))
    }

    /// Look up a palette entry by display name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Display name for list views
    pub fn name(self) -> &'static str {
        match self {
            ZoneColor::Red => "Red",
            ZoneColor::Orange => "Orange",
            ZoneColor::Yellow => "Yellow",
            ZoneColor::Green => "Green",
            ZoneColor::Blue => "Blue",
            ZoneColor::Purple => "Purple",
            ZoneColor::Gray => "Gray",
        }
    }

    /// Cycle to next colour
    pub fn next(self) -> Self {
        match self {
            ZoneColor::Red => ZoneColor::Orange,
            ZoneColor::Orange => ZoneColor::Yellow,
            ZoneColor::Yellow => ZoneColor::Green,
            ZoneColor::Green => ZoneColor::Blue,
            ZoneColor::Blue => ZoneColor::Purple,
            ZoneColor::Purple => ZoneColor::Gray,
            ZoneColor::Gray => ZoneColor::Red,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_lookup_is_lenient() {
        assert_eq!(ZoneColor::from_hex("#007aff"), Some(ZoneColor::Blue));
        assert_eq!(ZoneColor::from_hex("34C759"), Some(ZoneColor::Green));
        assert_eq!(ZoneColor::from_hex("#123456"), None);
    }

    #[test]
    fn next_visits_every_colour() {
        let mut seen = vec![ZoneColor::default()];
        let mut c = ZoneColor::default().next();
        while c != ZoneColor::default() {
            seen.push(c);
            c = c.next();
        }
        assert_eq!(seen.len(), ZoneColor::ALL.len());
    }

    #[test]
    fn name_lookup() {
        assert_eq!(ZoneColor::from_name("purple"), Some(ZoneColor::Purple));
        assert_eq!(ZoneColor::from_name("teal"), None);
    }
}
