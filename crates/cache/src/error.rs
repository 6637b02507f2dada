//! Error types for the quad-tree render cache

use crate::config::ConfigError;
use crate::geometry::Rect;

/// Error returned by a render callback
pub type RenderError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache parameters: {0}")]
    Config(#[from] ConfigError),
    #[error("page rectangle {0} has no area")]
    EmptyPageRect(Rect),
    #[error("failed to allocate a {width}x{height} cache bitmap")]
    SurfaceAllocation { width: u32, height: u32 },
    #[error("render callback failed: {0}")]
    Render(#[source] RenderError),
}

pub type CacheResult<T> = Result<T, CacheError>;
