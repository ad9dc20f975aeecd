//! Rejection sampling of points inside a cell.

use rand::prelude::*;
use rand::rngs::StdRng;

use super::{Cell, HexGrid};
use crate::models::{CandidatePoint, CellId, LatLon};

/// Rejection draws allowed per requested point.
pub const ATTEMPTS_PER_POINT: usize = 10;

/// Stream used for sample plan points.
pub const PLAN_STREAM: u64 = 0;

/// Stream used for extra candidates generated while filling gaps.
pub const FILL_STREAM: u64 = 1;

/// Generates candidate points that provably lie inside a cell.
#[derive(Debug, Clone)]
pub struct CellSampler {
    grid: HexGrid,
    seed: Option<u64>,
}

impl CellSampler {
    pub fn new(grid: HexGrid, seed: Option<u64>) -> Self {
        Self { grid, seed }
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Up to `count` points in `cell`, drawn from the generator for `stream`.
    pub fn sample(&self, cell: &Cell, count: usize, stream: u64) -> Vec<CandidatePoint> {
        let mut rng = self.rng_for(cell.id, stream);
        self.sample_with_rng(cell, count, &mut rng)
    }

    /// Up to `count` points in `cell`, using a caller-supplied generator.
    ///
    /// Draws uniformly in the bounding box of the boundary and keeps points
    /// whose re-derived cell id matches. At most `count * 10` draws are made,
    /// so tiny or degenerate cells may yield fewer points.
    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        cell: &Cell,
        count: usize,
        rng: &mut R,
    ) -> Vec<CandidatePoint> {
        let Some((min, max)) = bounding_box(&cell.boundary) else {
            return Vec::new();
        };

        let max_attempts = count.saturating_mul(ATTEMPTS_PER_POINT);
        let mut points = Vec::with_capacity(count);
        let mut attempts = 0;

        while points.len() < count && attempts < max_attempts {
            attempts += 1;
            let point = LatLon::new(
                rng.random_range(min.lat..=max.lat),
                rng.random_range(min.lon..=max.lon),
            );
            if self.grid.contains(point, cell) {
                points.push(CandidatePoint::new(point, cell.id));
            }
        }

        if points.len() < count {
            tracing::debug!(
                cell = %cell.id,
                requested = count,
                generated = points.len(),
                attempts,
                "Sampler budget exhausted"
            );
        }

        points
    }

    /// Generator for `(cell, stream)`; reproducible when a seed is configured.
    pub fn rng_for(&self, cell: CellId, stream: u64) -> StdRng {
        self.rng_for_run(cell, stream, 0)
    }

    /// Generator for `(cell, stream)` salted with a per-run `nonce`.
    ///
    /// Nonce 0 is the unsalted generator of `rng_for`. Distinct nonces give
    /// distinct sequences for the same seed, so repeated fills of a seeded
    /// plan try new points instead of replaying rejected ones.
    pub fn rng_for_run(&self, cell: CellId, stream: u64, nonce: u64) -> StdRng {
        let Some(seed) = self.seed else {
            return StdRng::from_os_rng();
        };
        let mut key = mix(seed ^ mix(cell.raw()) ^ mix(stream.wrapping_add(1)));
        if nonce != 0 {
            key = mix(key ^ mix(nonce));
        }
        StdRng::seed_from_u64(key)
    }
}

/// SplitMix64 finaliser.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn bounding_box(boundary: &[LatLon]) -> Option<(LatLon, LatLon)> {
    let first = boundary.first()?;
    let mut min = *first;
    let mut max = *first;
    for vertex in &boundary[1..] {
        min.lat = min.lat.min(vertex.lat);
        min.lon = min.lon.min(vertex.lon);
        max.lat = max.lat.max(vertex.lat);
        max.lon = max.lon.max(vertex.lon);
    }
    if !(min.lat.is_finite() && min.lon.is_finite() && max.lat.is_finite() && max.lon.is_finite())
    {
        return None;
    }
    Some((min, max))
}
