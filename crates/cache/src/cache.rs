//! Quad-tree render cache
//!
//! [`QuadTreeCache`] sits between a slow renderer and a display. It keeps
//! rendered pixels of a page at several resolutions in a quad-tree, answers
//! repaint requests from them, and calls back into the renderer only for
//! regions that are missing or cached too coarsely. The total number of
//! cached pixels is held under [`CacheParams::max_size`] by evicting after
//! every render.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::budget::CacheState;
use crate::canvas::Canvas;
use crate::config::CacheParams;
use crate::error::{CacheError, CacheResult, RenderError};
use crate::geometry::Rect;
use crate::node::{Node, RenderFn, TreeContext};
use crate::stats::CacheStats;

/// One bitmap currently held by a cache
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CachedRegion {
    /// Source region the bitmap covers
    pub region: Rect,

    pub width: u32,
    pub height: u32,

    /// Bitmap pixels per source unit
    pub resolution: f64,
}

/// Render cache for one page
///
/// All methods take `&self` and serialize on an internal mutex, so a cache
/// can be shared between threads. The render callback runs while that lock
/// is held and must not call back into the same cache.
pub struct QuadTreeCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    page_rect: Rect,
    params: CacheParams,

    /// Pixel counter, possibly shared with other caches
    state: Arc<CacheState>,

    root: Node,
    render_fn: Box<RenderFn>,

    /// Logical clock for least-recently-used ordering
    clock: u64,

    /// Display scale of the last render, reused by cleanups that are not
    /// triggered by a render
    last_render_zoom: f64,

    stats: CacheStats,
}

impl CacheInner {
    /// Split into the root node and a context borrowing everything else
    fn tree(&mut self) -> (&mut Node, TreeContext<'_>) {
        let CacheInner {
            params,
            state,
            root,
            render_fn,
            clock,
            stats,
            ..
        } = self;

        let ctx = TreeContext {
            params: &*params,
            state: &**state,
            render_fn: &mut **render_fn,
            clock,
            stats,
        };

        (root, ctx)
    }

    fn cleanup(&mut self) -> CacheResult<usize> {
        let zoom = self.last_render_zoom;
        let (root, mut ctx) = self.tree();
        root.cleanup(&mut ctx, zoom)
    }
}

impl QuadTreeCache {
    /// Create an empty cache for `page_rect`.
    ///
    /// `render_fn` paints a region of the page onto a canvas whose transform
    /// already maps page units to canvas pixels. Fails if `page_rect` has no
    /// area or `params` are invalid.
    pub fn new<F>(render_fn: F, page_rect: Rect, params: CacheParams) -> CacheResult<Self>
    where
        F: FnMut(&mut Canvas<'_>, Rect) -> Result<(), RenderError> + Send + 'static,
    {
        params.validate()?;
        if page_rect.is_empty() {
            return Err(CacheError::EmptyPageRect(page_rect));
        }

        debug!(page = %page_rect, ?params, "creating quad-tree cache");

        let inner = CacheInner {
            page_rect,
            params,
            state: Arc::new(CacheState::new()),
            root: Node::new(page_rect, &params, 0),
            render_fn: Box::new(render_fn),
            clock: 0,
            last_render_zoom: 1.0,
            stats: CacheStats::default(),
        };

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Paint page region `src` into rectangle `dst` of `target`.
    ///
    /// `dst` is in `target`'s user space, so the target's own transform still
    /// applies. Missing pixels are rendered through the callback and kept.
    /// Afterwards the cache is trimmed back to its budget. Empty `src` or
    /// `dst` is a no-op.
    pub fn render(&self, target: &mut Canvas<'_>, src: Rect, dst: Rect) -> CacheResult<()> {
        if src.is_empty() || dst.is_empty() {
            return Ok(());
        }

        debug_assert!(
            (dst.width * src.height - dst.height * src.width).abs()
                <= 0.01 * (dst.width * src.height).abs(),
            "src {src} and dst {dst} differ in aspect ratio"
        );

        let current_zoom = dst.width / src.width;

        let mut inner = self.lock();
        let (root, mut ctx) = inner.tree();

        let rendered = root.render(&mut ctx, target, src, dst);
        // Trim even after a failed render; nodes populated before the
        // failure still count against the budget.
        let cleaned = root.cleanup(&mut ctx, current_zoom);

        inner.last_render_zoom = current_zoom;

        rendered?;
        cleaned?;
        Ok(())
    }

    /// Drop cached pixels overlapping `region`, e.g. after the page changed
    /// there. The tree's shape is kept.
    pub fn damage(&self, region: Rect) {
        let mut inner = self.lock();
        let (root, mut ctx) = inner.tree();
        root.damage(&mut ctx, &region);

        debug!(%region, cache_size = ctx.state.cache_size(), "damaged region");
    }

    /// Drop every cached pixel and collapse the tree to a single empty node
    pub fn clear(&self) {
        let mut inner = self.lock();
        let (root, mut ctx) = inner.tree();
        let freed = root.clear(&mut ctx);

        debug!(freed, "cleared cache");
    }

    /// Replace the parameters and trim to the new budget.
    ///
    /// Nodes already in the tree keep their bitmap size; `entry_size` only
    /// applies to nodes created afterwards.
    pub fn update_settings(&self, params: CacheParams) -> CacheResult<()> {
        params.validate()?;

        let mut inner = self.lock();
        inner.params = params;
        debug!(?params, "updated cache settings");

        inner.cleanup().map(|_| ())
    }

    /// Make this cache draw from the same pixel budget as `other`.
    ///
    /// This cache's pixels move from its current counter to `other`'s, then
    /// the combined total is trimmed using this cache's `max_size`. Linking
    /// a cache with itself, or with a cache it already shares with, does
    /// nothing.
    pub fn constrain_size_with(&self, other: &QuadTreeCache) -> CacheResult<()> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }

        // Lock in address order so two opposite calls cannot deadlock
        let (mut this, that) = if (self as *const Self) < (other as *const Self) {
            let this = self.lock();
            (this, other.lock())
        } else {
            let that = other.lock();
            (self.lock(), that)
        };

        if Arc::ptr_eq(&this.state, &that.state) {
            return Ok(());
        }

        let shared = Arc::clone(&that.state);
        drop(that);

        let moved = this.root.size();
        shared.record_allocation(moved);
        this.state.record_deallocation(moved);
        this.state = shared;

        debug!(
            moved,
            cache_size = this.state.cache_size(),
            "linked cache budget"
        );

        this.cleanup().map(|_| ())
    }

    /// Pixels counted by this cache's (possibly shared) counter
    pub fn cache_size(&self) -> usize {
        self.lock().state.cache_size()
    }

    /// Pixels held by this cache's own tree
    pub fn tree_size(&self) -> usize {
        self.lock().root.size()
    }

    pub fn params(&self) -> CacheParams {
        self.lock().params
    }

    pub fn page_rect(&self) -> Rect {
        self.lock().page_rect
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn reset_stats(&self) {
        self.lock().stats = CacheStats::default();
    }

    /// Number of nodes in the tree, including empty ones
    pub fn node_count(&self) -> usize {
        self.lock().root.node_count()
    }

    /// Whether the root has been split into children
    pub fn is_divided(&self) -> bool {
        self.lock().root.has_children()
    }

    /// Every bitmap currently cached
    pub fn cached_regions(&self) -> Vec<CachedRegion> {
        let inner = self.lock();
        let mut regions = Vec::with_capacity(inner.root.bitmap_count());
        inner.root.collect_cached(&mut regions);
        regions
    }
}

impl Drop for QuadTreeCache {
    fn drop(&mut self) {
        // Give the pixels back to a counter that may outlive this cache
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let (root, mut ctx) = inner.tree();
        root.clear(&mut ctx);
    }
}

impl std::fmt::Debug for QuadTreeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("QuadTreeCache")
            .field("page_rect", &inner.page_rect)
            .field("params", &inner.params)
            .field("cache_size", &inner.state.cache_size())
            .field("tree_size", &inner.root.size())
            .finish_non_exhaustive()
    }
}
