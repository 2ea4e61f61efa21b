//! Tile coordinates (z/x/y) and their cache locations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{TileError, TileResult};

/// Deepest zoom level whose tile indices still fit in a `u32`.
pub const MAX_SUPPORTED_ZOOM: u32 = 30;

/// A validated tile coordinate (z/x/y).
///
/// Only [`TileCoord::validate`] produces values from request input, so a
/// `TileCoord` in hand always satisfies `x, y < 2^z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    /// Bounds-check raw request values against the zoom ceiling and the
    /// world extent at the requested zoom.
    pub fn validate(x: i64, y: i64, z: i64, max_zoom: u32) -> TileResult<Self> {
        let ceiling = max_zoom.min(MAX_SUPPORTED_ZOOM);
        if z < 0 || z > i64::from(ceiling) {
            return Err(TileError::OutOfRangeZoom { zoom: z, max_zoom });
        }
        let z = z as u32;

        let world_res = world_resolution(z);
        if x < 0 || y < 0 || x as u64 >= world_res || y as u64 >= world_res {
            return Err(TileError::OutOfRangeCoordinate {
                zoom: z,
                x,
                y,
                world_res,
            });
        }

        Ok(Self {
            z,
            x: x as u32,
            y: y as u32,
        })
    }

    /// Generate a cache key string.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }

    /// Location of this tile under a cache root: `{root}/{z}/{x}/{y}.png`.
    ///
    /// Pure path composition; nothing touches the filesystem.
    pub fn cache_path(&self, cache_root: &Path) -> PathBuf {
        cache_root
            .join(self.z.to_string())
            .join(self.x.to_string())
            .join(format!("{}.png", self.y))
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Number of tiles along each axis at a zoom level (`2^z`).
pub fn world_resolution(zoom: u32) -> u64 {
    1u64 << zoom.min(MAX_SUPPORTED_ZOOM)
}
