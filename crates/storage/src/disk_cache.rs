//! File-backed tile cache laid out as `{root}/{z}/{x}/{y}.png`.
//!
//! Tiles are written by the external renderer and never evicted here.
//! Files are not locked; two renders of the same tile may race and the
//! last writer wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use tile_common::{TileCoord, TileError, TileResult};

/// Tile cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct TileDiskCache {
    root: PathBuf,
}

impl TileDiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache file for a tile.
    pub fn path(&self, coord: &TileCoord) -> PathBuf {
        coord.cache_path(&self.root)
    }

    /// Whether a regular file is cached at `path`.
    pub async fn contains(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    /// Read a cached tile.
    pub async fn read(&self, path: &Path) -> TileResult<Bytes> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| TileError::CacheReadError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Create the parent directory of a tile file.
    ///
    /// Another request creating the same directory first is not an error;
    /// only a directory that is still missing afterwards is.
    pub async fn ensure_directory(&self, tile_path: &Path) -> TileResult<PathBuf> {
        let dir = tile_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        let created = tokio::fs::create_dir_all(&dir).await;
        if let Err(e) = &created {
            debug!(dir = %dir.display(), error = %e, "create_dir_all reported an error");
        }

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(TileError::CacheDirectoryError {
                path: dir,
                message: "path exists but is not a directory".to_string(),
            }),
            Err(e) => {
                let message = match created {
                    Err(create_err) if create_err.kind() != ErrorKind::AlreadyExists => {
                        create_err.to_string()
                    }
                    _ => e.to_string(),
                };
                Err(TileError::CacheDirectoryError { path: dir, message })
            }
        }
    }
}
