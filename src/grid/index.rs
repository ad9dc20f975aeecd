//! Hierarchical spatial index abstraction.
//!
//! The grid never talks to H3 directly; it goes through `SpatialIndex` so
//! any exact hierarchical tiling can be swapped in (tests use tiny stubs).

use h3o::{CellIndex, LatLng, Resolution};

use crate::models::{CellId, HexcoverError, LatLon, Result};

/// An exact hierarchical tiling of the sphere.
///
/// Implementations must guarantee that `children_of` partitions a cell with
/// no gaps or overlaps and that `cell_of` is total over valid coordinates.
pub trait SpatialIndex: Send + Sync {
    /// Cell containing `point` at `resolution`.
    fn cell_of(&self, point: LatLon, resolution: u8) -> Result<CellId>;

    /// All descendants of `cell` at `resolution`.
    fn children_of(&self, cell: CellId, resolution: u8) -> Result<Vec<CellId>>;

    /// Ancestor of `cell` at `resolution`.
    fn parent_of(&self, cell: CellId, resolution: u8) -> Result<CellId>;

    /// Ordered boundary polygon.
    fn boundary_of(&self, cell: CellId) -> Result<Vec<LatLon>>;

    fn center_of(&self, cell: CellId) -> Result<LatLon>;

    fn resolution_of(&self, cell: CellId) -> Result<u8>;

    /// Cells exactly `k` steps away (`k = 0` yields the cell itself).
    fn neighbors_at_distance(&self, cell: CellId, k: u32) -> Result<Vec<CellId>>;
}

/// `SpatialIndex` backed by Uber's H3 via `h3o`.
#[derive(Debug, Clone, Copy, Default)]
pub struct H3Index;

impl H3Index {
    pub fn new() -> Self {
        Self
    }

    fn cell(id: CellId) -> Result<CellIndex> {
        CellIndex::try_from(id.raw())
            .map_err(|e| HexcoverError::InvalidCell(format!("{id}: {e}")))
    }

    fn resolution(resolution: u8) -> Result<Resolution> {
        Resolution::try_from(resolution)
            .map_err(|e| HexcoverError::InvalidInput(format!("resolution {resolution}: {e}")))
    }

    fn disk(cell: CellIndex, k: u32) -> Vec<CellIndex> {
        cell.grid_disk_safe(k).collect()
    }
}

impl SpatialIndex for H3Index {
    fn cell_of(&self, point: LatLon, resolution: u8) -> Result<CellId> {
        let latlng = LatLng::new(point.lat, point.lon)
            .map_err(|e| HexcoverError::InvalidInput(format!("{point}: {e}")))?;
        let cell = latlng.to_cell(Self::resolution(resolution)?);
        Ok(CellId(u64::from(cell)))
    }

    fn children_of(&self, cell: CellId, resolution: u8) -> Result<Vec<CellId>> {
        let cell = Self::cell(cell)?;
        let resolution = Self::resolution(resolution)?;
        Ok(cell
            .children(resolution)
            .map(|child| CellId(u64::from(child)))
            .collect())
    }

    fn parent_of(&self, cell: CellId, resolution: u8) -> Result<CellId> {
        let index = Self::cell(cell)?;
        index
            .parent(Self::resolution(resolution)?)
            .map(|parent| CellId(u64::from(parent)))
            .ok_or_else(|| {
                HexcoverError::InvalidCell(format!("{cell} has no parent at resolution {resolution}"))
            })
    }

    fn boundary_of(&self, cell: CellId) -> Result<Vec<LatLon>> {
        let cell = Self::cell(cell)?;
        Ok(cell
            .boundary()
            .iter()
            .map(|vertex| LatLon::new(vertex.lat(), vertex.lng()))
            .collect())
    }

    fn center_of(&self, cell: CellId) -> Result<LatLon> {
        let center = LatLng::from(Self::cell(cell)?);
        Ok(LatLon::new(center.lat(), center.lng()))
    }

    fn resolution_of(&self, cell: CellId) -> Result<u8> {
        Ok(u8::from(Self::cell(cell)?.resolution()))
    }

    fn neighbors_at_distance(&self, cell: CellId, k: u32) -> Result<Vec<CellId>> {
        let index = Self::cell(cell)?;
        if k == 0 {
            return Ok(vec![cell]);
        }
        let inner: std::collections::HashSet<CellIndex> =
            Self::disk(index, k - 1).into_iter().collect();
        let mut ring: Vec<CellId> = Self::disk(index, k)
            .into_iter()
            .filter(|c| !inner.contains(c))
            .map(|c| CellId(u64::from(c)))
            .collect();
        ring.sort();
        Ok(ring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn london() -> LatLon {
        LatLon::new(51.513281, -0.117465)
    }

    #[test]
    fn test_cell_of_respects_resolution() {
        let index = H3Index::new();
        let cell = index.cell_of(london(), 9).unwrap();
        assert_eq!(index.resolution_of(cell).unwrap(), 9);
        assert!(index.cell_of(LatLon::new(95.0, 0.0), 9).is_err());
        assert!(index.cell_of(london(), 16).is_err());
    }

    #[test]
    fn test_children_partition_parent() {
        let index = H3Index::new();
        let coarse = index.cell_of(london(), 7).unwrap();
        let children = index.children_of(coarse, 8).unwrap();
        assert_eq!(children.len(), 7);
        for child in &children {
            assert_eq!(index.parent_of(*child, 7).unwrap(), coarse);
        }
    }

    #[test]
    fn test_boundary_and_center() {
        let index = H3Index::new();
        let cell = index.cell_of(london(), 9).unwrap();
        assert_eq!(index.boundary_of(cell).unwrap().len(), 6);
        let center = index.center_of(cell).unwrap();
        assert_eq!(index.cell_of(center, 9).unwrap(), cell);
    }

    #[test]
    fn test_rings() {
        let index = H3Index::new();
        let cell = index.cell_of(london(), 7).unwrap();
        assert_eq!(index.neighbors_at_distance(cell, 0).unwrap(), vec![cell]);
        let ring1 = index.neighbors_at_distance(cell, 1).unwrap();
        assert_eq!(ring1.len(), 6);
        assert!(!ring1.contains(&cell));
        assert_eq!(index.neighbors_at_distance(cell, 2).unwrap().len(), 12);
    }

    #[test]
    fn test_invalid_cell_rejected() {
        let index = H3Index::new();
        assert!(matches!(
            index.boundary_of(CellId(0)),
            Err(HexcoverError::InvalidCell(_))
        ));
    }
}
