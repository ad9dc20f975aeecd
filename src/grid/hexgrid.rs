//! Multi-resolution hexagonal tiling around a center point.
//!
//! Coarse cells are collected ring by ring around the center; medium and fine
//! cells come from the index's own hierarchy, so nesting is exact.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{H3Index, SpatialIndex};
use crate::models::{CellId, GridConfig, HexcoverError, LatLon, Result};

/// Mean Earth radius used for ranking distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Position of a cell in the three-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Coarse,
    Medium,
    Fine,
}

impl Level {
    /// The level one step up, if any.
    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Coarse => None,
            Level::Medium => Some(Level::Coarse),
            Level::Fine => Some(Level::Medium),
        }
    }
}

/// Index resolution assigned to each level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolutions {
    pub coarse: u8,
    pub medium: u8,
    pub fine: u8,
}

impl Default for Resolutions {
    fn default() -> Self {
        Self {
            coarse: 7,
            medium: 8,
            fine: 9,
        }
    }
}

impl Resolutions {
    pub fn from_config(config: &GridConfig) -> Self {
        Self {
            coarse: config.coarse_resolution,
            medium: config.medium_resolution,
            fine: config.fine_resolution,
        }
    }

    pub fn of(&self, level: Level) -> u8 {
        match level {
            Level::Coarse => self.coarse,
            Level::Medium => self.medium,
            Level::Fine => self.fine,
        }
    }

    pub fn level_of(&self, resolution: u8) -> Option<Level> {
        [Level::Coarse, Level::Medium, Level::Fine]
            .into_iter()
            .find(|level| self.of(*level) == resolution)
    }
}

/// A resolved cell with its geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub level: Level,
    pub resolution: u8,
    /// Ordered (lat, lon) polygon
    pub boundary: Vec<LatLon>,
    /// Coarse parent for medium cells, medium parent for fine cells
    pub parent: Option<CellId>,
    pub center: LatLon,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Geometry over a `SpatialIndex` at three fixed resolutions.
#[derive(Clone)]
pub struct HexGrid {
    index: Arc<dyn SpatialIndex>,
    resolutions: Resolutions,
    max_ring_distance: u32,
}

impl std::fmt::Debug for HexGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HexGrid")
            .field("resolutions", &self.resolutions)
            .field("max_ring_distance", &self.max_ring_distance)
            .finish_non_exhaustive()
    }
}

impl HexGrid {
    pub fn new(
        index: Arc<dyn SpatialIndex>,
        resolutions: Resolutions,
        max_ring_distance: u32,
    ) -> Self {
        Self {
            index,
            resolutions,
            max_ring_distance,
        }
    }

    /// H3-backed grid from the `[grid]` section.
    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(
            Arc::new(H3Index::new()),
            Resolutions::from_config(config),
            config.max_ring_distance,
        )
    }

    pub fn resolutions(&self) -> Resolutions {
        self.resolutions
    }

    pub fn index(&self) -> &Arc<dyn SpatialIndex> {
        &self.index
    }

    /// Collect `target_count` coarse cells around `center`.
    ///
    /// Rings are added whole until the target is met or the ring ceiling is
    /// reached; the result is then trimmed to the closest cells (ties broken
    /// by id). Falling short at the ceiling is not an error.
    pub fn build_coarse_cells(&self, center: LatLon, target_count: usize) -> Result<Vec<Cell>> {
        center.validate()?;
        let origin = self.index.cell_of(center, self.resolutions.coarse)?;

        let mut ids: Vec<CellId> = Vec::new();
        let mut distance = 0;
        loop {
            ids.extend(self.index.neighbors_at_distance(origin, distance)?);
            if ids.len() >= target_count || distance >= self.max_ring_distance {
                break;
            }
            distance += 1;
        }

        if ids.len() < target_count {
            warn!(
                collected = ids.len(),
                target = target_count,
                max_ring_distance = self.max_ring_distance,
                "Ring ceiling reached before coarse target"
            );
        }

        let mut ranked = ids
            .into_iter()
            .map(|id| {
                let center_of = self.index.center_of(id)?;
                Ok((haversine_km(center, center_of), id))
            })
            .collect::<Result<Vec<_>>>()?;
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.dedup_by_key(|(_, id)| *id);
        ranked.truncate(target_count);

        debug!(cells = ranked.len(), rings = distance, "Coarse cells built");

        ranked
            .into_iter()
            .map(|(_, id)| self.resolve(id, Level::Coarse, None))
            .collect()
    }

    /// Descendants of `cell` at `level`, with their direct parents set.
    pub fn children(&self, cell: &Cell, level: Level) -> Result<Vec<Cell>> {
        let resolution = self.resolutions.of(level);
        if resolution <= cell.resolution {
            return Err(HexcoverError::InvalidInput(format!(
                "{:?} is not finer than {:?} cell {}",
                level, cell.level, cell.id
            )));
        }

        let parent_resolution = level.parent().map(|p| self.resolutions.of(p));
        self.index
            .children_of(cell.id, resolution)?
            .into_iter()
            .map(|child| {
                let parent = match parent_resolution {
                    Some(r) if r == cell.resolution => Some(cell.id),
                    Some(r) => Some(self.index.parent_of(child, r)?),
                    None => None,
                };
                self.resolve(child, level, parent)
            })
            .collect()
    }

    /// Resolve a bare id into a cell at one of the grid's levels.
    pub fn cell(&self, id: CellId) -> Result<Cell> {
        let resolution = self.index.resolution_of(id)?;
        let level = self.resolutions.level_of(resolution).ok_or_else(|| {
            HexcoverError::InvalidCell(format!(
                "{id} has resolution {resolution}, not part of this grid"
            ))
        })?;
        let parent = match level.parent() {
            Some(p) => Some(self.index.parent_of(id, self.resolutions.of(p))?),
            None => None,
        };
        self.resolve(id, level, parent)
    }

    pub fn boundary(&self, cell: &Cell) -> Result<Vec<LatLon>> {
        self.index.boundary_of(cell.id)
    }

    /// Whether `point` lies in `cell`, by re-deriving the point's cell id.
    pub fn contains(&self, point: LatLon, cell: &Cell) -> bool {
        self.index
            .cell_of(point, cell.resolution)
            .map(|id| id == cell.id)
            .unwrap_or(false)
    }

    fn resolve(&self, id: CellId, level: Level, parent: Option<CellId>) -> Result<Cell> {
        Ok(Cell {
            id,
            level,
            resolution: self.resolutions.of(level),
            boundary: self.index.boundary_of(id)?,
            parent,
            center: self.index.center_of(id)?,
        })
    }
}
