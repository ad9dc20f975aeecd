//! Spatial tiling and point sampling.
//!
//! - `SpatialIndex`: polymorphic hierarchical index (H3 by default)
//! - `HexGrid`: coarse/medium/fine cells around a center
//! - `CellSampler`: rejection sampling inside a cell

mod hexgrid;
mod index;
mod sampler;

#[cfg(test)]
pub(crate) mod testing;

pub use hexgrid::{haversine_km, Cell, HexGrid, Level, Resolutions, EARTH_RADIUS_KM};
pub use index::{H3Index, SpatialIndex};
pub use sampler::{CellSampler, ATTEMPTS_PER_POINT, FILL_STREAM, PLAN_STREAM};
