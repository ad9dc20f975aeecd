//! Geographic primitives shared by the grid, sampler and scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{HexcoverError, Result};

/// Opaque handle of a cell in a hierarchical spatial index.
///
/// Rendered as lowercase hex, which is also the canonical H3 string form.
/// Serialises as a string so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId(pub u64);

impl CellId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for CellId {
    type Err = HexcoverError;

    fn from_str(s: &str) -> Result<Self> {
        u64::from_str_radix(s.trim(), 16)
            .map(CellId)
            .map_err(|e| HexcoverError::InvalidCell(format!("'{s}': {e}")))
    }
}

impl TryFrom<String> for CellId {
    type Error = HexcoverError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CellId> for String {
    fn from(id: CellId) -> Self {
        id.to_string()
    }
}

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(HexcoverError::InvalidInput(format!(
                "latitude {} out of range",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(HexcoverError::InvalidInput(format!(
                "longitude {} out of range",
                self.lon
            )));
        }
        Ok(())
    }

    /// "lat,lon" with 6 decimals, the form the scoring service accepts as an address.
    pub fn as_query(&self) -> String {
        format!("{:.6},{:.6}", self.lat, self.lon)
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A coordinate generated for possible submission, tagged with its fine cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidatePoint {
    pub lat: f64,
    pub lon: f64,
    pub cell: CellId,
}

impl CandidatePoint {
    pub fn new(position: LatLon, cell: CellId) -> Self {
        Self {
            lat: position.lat,
            lon: position.lon,
            cell,
        }
    }

    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}
