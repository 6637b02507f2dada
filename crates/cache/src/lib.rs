//! Quad-tree render cache
//!
//! Caches rendered pixels of a page (or any rectangular scene) at several
//! resolutions so that pans and zooms can be repainted without re-rendering.
//! The page is covered by a quad-tree of fixed-size bitmaps; a node is split
//! when a render would magnify its bitmap more than
//! [`CacheParams::max_zoom`], and collapsed or freed again when the cache
//! grows past [`CacheParams::max_size`] pixels.
//!
//! ```no_run
//! use quadcache::{CacheParams, Canvas, QuadTreeCache, Rect};
//! use quadcache::tiny_skia::{Color, Pixmap};
//!
//! let cache = QuadTreeCache::new(
//!     |canvas: &mut Canvas<'_>, region: Rect| {
//!         canvas.fill_rect(region, Color::WHITE);
//!         Ok(())
//!     },
//!     Rect::new(0.0, 0.0, 612.0, 792.0),
//!     CacheParams::default(),
//! )?;
//!
//! let mut pixmap = Pixmap::new(306, 396).unwrap();
//! let mut canvas = Canvas::from_pixmap(&mut pixmap);
//! cache.render(
//!     &mut canvas,
//!     Rect::new(0.0, 0.0, 612.0, 792.0),
//!     Rect::new(0.0, 0.0, 306.0, 396.0),
//! )?;
//! # Ok::<(), quadcache::CacheError>(())
//! ```

pub mod budget;
pub mod canvas;
pub mod config;
pub mod error;
pub mod geometry;
pub mod stats;

mod cache;
mod node;

pub use budget::CacheState;
pub use cache::{CachedRegion, QuadTreeCache};
pub use canvas::Canvas;
pub use config::{CacheParams, ConfigError, UncachePolicy};
pub use error::{CacheError, CacheResult, RenderError};
pub use geometry::{Quadrant, Rect};
pub use stats::CacheStats;

pub use tiny_skia;
