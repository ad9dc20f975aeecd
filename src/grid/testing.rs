//! In-memory `SpatialIndex` stubs for tests.

use std::collections::HashSet;

use super::SpatialIndex;
use crate::models::{CellId, HexcoverError, LatLon, Result};

/// A single cell (id 1) surrounded by one ring of cells with hand-picked
/// centers along the equator.
///
/// `offsets[i]` is the longitude of cell `i + 1`; cell 1 is the origin and
/// cells 2.. form ring 1.
pub struct RingStub {
    offsets: Vec<f64>,
}

impl RingStub {
    pub fn new(offsets: &[f64]) -> Self {
        Self {
            offsets: offsets.to_vec(),
        }
    }

    fn offset(&self, cell: CellId) -> Result<f64> {
        let idx = cell.raw() as usize;
        idx.checked_sub(1)
            .and_then(|i| self.offsets.get(i).copied())
            .ok_or_else(|| HexcoverError::InvalidCell(cell.to_string()))
    }
}

impl SpatialIndex for RingStub {
    fn cell_of(&self, _point: LatLon, _resolution: u8) -> Result<CellId> {
        Ok(CellId(1))
    }

    fn children_of(&self, _cell: CellId, _resolution: u8) -> Result<Vec<CellId>> {
        Ok(Vec::new())
    }

    fn parent_of(&self, cell: CellId, _resolution: u8) -> Result<CellId> {
        Ok(cell)
    }

    fn boundary_of(&self, cell: CellId) -> Result<Vec<LatLon>> {
        let lon = self.offset(cell)?;
        Ok(vec![
            LatLon::new(-0.001, lon - 0.001),
            LatLon::new(-0.001, lon + 0.001),
            LatLon::new(0.001, lon + 0.001),
            LatLon::new(0.001, lon - 0.001),
        ])
    }

    fn center_of(&self, cell: CellId) -> Result<LatLon> {
        Ok(LatLon::new(0.0, self.offset(cell)?))
    }

    fn resolution_of(&self, _cell: CellId) -> Result<u8> {
        Ok(7)
    }

    fn neighbors_at_distance(&self, _cell: CellId, k: u32) -> Result<Vec<CellId>> {
        Ok(match k {
            0 => vec![CellId(1)],
            1 => (2..=self.offsets.len() as u64).map(CellId).collect(),
            _ => Vec::new(),
        })
    }
}

/// Square lat/lon tiling: at resolution `r` cells are `2^-r` degrees wide,
/// and each cell splits into four children at `r + 1`.
///
/// Cells listed in `sealed` contain no derivable points: `cell_of` maps
/// anything inside them to `CellId(0)`, so rejection sampling never accepts.
#[derive(Default)]
pub struct SquareIndex {
    sealed: HashSet<CellId>,
}

impl SquareIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sealed(cells: impl IntoIterator<Item = CellId>) -> Self {
        Self {
            sealed: cells.into_iter().collect(),
        }
    }

    fn side(resolution: u8) -> f64 {
        1.0 / f64::from(1u32 << resolution)
    }

    fn encode(resolution: u8, row: u64, col: u64) -> CellId {
        CellId((u64::from(resolution) << 56) | (row << 28) | col)
    }

    fn decode(cell: CellId) -> Result<(u8, u64, u64)> {
        let raw = cell.raw();
        if raw == 0 {
            return Err(HexcoverError::InvalidCell(cell.to_string()));
        }
        let mask = (1u64 << 28) - 1;
        Ok(((raw >> 56) as u8, (raw >> 28) & mask, raw & mask))
    }

    pub fn cell_at(point: LatLon, resolution: u8) -> CellId {
        let side = Self::side(resolution);
        let row = ((point.lat + 90.0) / side).floor() as u64;
        let col = ((point.lon + 180.0) / side).floor() as u64;
        Self::encode(resolution, row, col)
    }
}

impl SpatialIndex for SquareIndex {
    fn cell_of(&self, point: LatLon, resolution: u8) -> Result<CellId> {
        point.validate()?;
        let cell = Self::cell_at(point, resolution);
        if self.sealed.contains(&cell) {
            return Ok(CellId(0));
        }
        Ok(cell)
    }

    fn children_of(&self, cell: CellId, resolution: u8) -> Result<Vec<CellId>> {
        let (r, row, col) = Self::decode(cell)?;
        let shift = resolution.saturating_sub(r);
        let n = 1u64 << shift;
        let mut out = Vec::with_capacity((n * n) as usize);
        for dr in 0..n {
            for dc in 0..n {
                out.push(Self::encode(resolution, (row << shift) + dr, (col << shift) + dc));
            }
        }
        Ok(out)
    }

    fn parent_of(&self, cell: CellId, resolution: u8) -> Result<CellId> {
        let (r, row, col) = Self::decode(cell)?;
        let shift = r.saturating_sub(resolution);
        Ok(Self::encode(resolution, row >> shift, col >> shift))
    }

    fn boundary_of(&self, cell: CellId) -> Result<Vec<LatLon>> {
        let (r, row, col) = Self::decode(cell)?;
        let side = Self::side(r);
        let lat0 = row as f64 * side - 90.0;
        let lon0 = col as f64 * side - 180.0;
        Ok(vec![
            LatLon::new(lat0, lon0),
            LatLon::new(lat0, lon0 + side),
            LatLon::new(lat0 + side, lon0 + side),
            LatLon::new(lat0 + side, lon0),
        ])
    }

    fn center_of(&self, cell: CellId) -> Result<LatLon> {
        let (r, row, col) = Self::decode(cell)?;
        let side = Self::side(r);
        Ok(LatLon::new(
            (row as f64 + 0.5) * side - 90.0,
            (col as f64 + 0.5) * side - 180.0,
        ))
    }

    fn resolution_of(&self, cell: CellId) -> Result<u8> {
        Ok(Self::decode(cell)?.0)
    }

    fn neighbors_at_distance(&self, cell: CellId, k: u32) -> Result<Vec<CellId>> {
        let (r, row, col) = Self::decode(cell)?;
        let k = i64::from(k);
        let mut ring = Vec::new();
        for dr in -k..=k {
            for dc in -k..=k {
                if dr.abs().max(dc.abs()) != k {
                    continue;
                }
                ring.push(Self::encode(
                    r,
                    (row as i64 + dr) as u64,
                    (col as i64 + dc) as u64,
                ));
            }
        }
        Ok(ring)
    }
}
