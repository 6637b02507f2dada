//! Quad-tree nodes
//!
//! Each node answers for one rectangle of source space. It can hold a single
//! fixed-resolution bitmap of that rectangle, and it can be split into four
//! children that answer for its quadrants at twice the resolution. Nodes are
//! populated lazily, the first time a render needs them.

mod eviction;

use tiny_skia::{Color, Pixmap, Transform};
use tracing::{debug, trace};

use crate::budget::CacheState;
use crate::cache::CachedRegion;
use crate::canvas::Canvas;
use crate::config::CacheParams;
use crate::error::{CacheError, CacheResult, RenderError};
use crate::geometry::{Quadrant, Rect};
use crate::stats::CacheStats;

/// Render callback: paints the given source region onto the canvas.
pub(crate) type RenderFn =
    dyn FnMut(&mut Canvas<'_>, Rect) -> Result<(), RenderError> + Send + 'static;

/// Outline for regions painted from a node's own bitmap
fn overlay_self() -> Color {
    Color::from_rgba8(255, 0, 0, 255)
}

/// Outline for regions painted from children
fn overlay_children() -> Color {
    Color::from_rgba8(0, 0, 255, 255)
}

/// Everything a node needs from its cache while recursing.
///
/// Borrowed from the owning cache for the duration of one public call, so no
/// node keeps a reference to cache-wide data.
pub(crate) struct TreeContext<'a> {
    pub params: &'a CacheParams,
    pub state: &'a CacheState,
    pub render_fn: &'a mut RenderFn,
    pub clock: &'a mut u64,
    pub stats: &'a mut CacheStats,
}

impl TreeContext<'_> {
    /// Advance the logical clock and return the new time
    fn tick(&mut self) -> u64 {
        *self.clock += 1;
        *self.clock
    }

    fn now(&self) -> u64 {
        *self.clock
    }
}

pub(crate) struct Node {
    /// Region of source space this node is responsible for
    region: Rect,

    /// Cached render of `region`, `internal_width` x `internal_height`
    rendered: Option<Pixmap>,

    internal_width: u32,
    internal_height: u32,

    /// Source units per bitmap pixel
    internal_to_src: f64,

    /// Quadrants in `Quadrant::ALL` order
    children: Option<Box<[Node; 4]>>,

    /// Logical time of the last render touching this node
    last_used: u64,
}

impl Node {
    /// Create an empty node for `region`
    ///
    /// The bitmap size is chosen so that it holds about `entry_size` pixels
    /// with the region's aspect ratio.
    pub(crate) fn new(region: Rect, params: &CacheParams, now: u64) -> Self {
        let internal_to_src = (region.area() / params.entry_size as f64).sqrt();

        let internal_width = (region.width / internal_to_src).floor().max(1.0) as u32;
        let internal_height = (region.height / internal_to_src).floor().max(1.0) as u32;

        Self {
            region,
            rendered: None,
            internal_width,
            internal_height,
            internal_to_src,
            children: None,
            last_used: now,
        }
    }

    pub(crate) fn region(&self) -> Rect {
        self.region
    }

    /// Pixels this node's bitmap occupies (whether or not it exists)
    pub(crate) fn pixel_count(&self) -> usize {
        self.internal_width as usize * self.internal_height as usize
    }

    pub(crate) fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub(crate) fn children(&self) -> Option<&[Node; 4]> {
        self.children.as_deref()
    }

    pub(crate) fn is_rendered(&self) -> bool {
        self.rendered.is_some()
    }

    /// True if neither this node nor any descendant holds a bitmap
    pub(crate) fn is_empty(&self) -> bool {
        self.rendered.is_none()
            && self
                .children
                .as_ref()
                .map_or(true, |children| children.iter().all(Node::is_empty))
    }

    /// Cached resolution in bitmap pixels per source unit; higher is finer
    ///
    /// For a node without a bitmap this is the finest resolution cached
    /// anywhere beneath it, or 0 if nothing is cached.
    pub(crate) fn zoom(&self) -> f64 {
        if self.rendered.is_some() {
            return 1.0 / self.internal_to_src;
        }

        self.children.as_ref().map_or(0.0, |children| {
            children.iter().map(Node::zoom).fold(0.0, f64::max)
        })
    }

    /// Pixels held by bitmaps in this subtree
    pub(crate) fn size(&self) -> usize {
        let own = if self.rendered.is_some() {
            self.pixel_count()
        } else {
            0
        };

        own + self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(Node::size).sum())
    }

    pub(crate) fn node_count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(Node::node_count).sum())
    }

    pub(crate) fn bitmap_count(&self) -> usize {
        usize::from(self.rendered.is_some())
            + self
                .children
                .as_ref()
                .map_or(0, |children| children.iter().map(Node::bitmap_count).sum())
    }

    /// Append every bitmap held in this subtree, in depth-first order
    pub(crate) fn collect_cached(&self, out: &mut Vec<CachedRegion>) {
        if self.is_rendered() {
            out.push(CachedRegion {
                region: self.region(),
                width: self.internal_width,
                height: self.internal_height,
                resolution: self.zoom(),
            });
        }

        for child in self.children().into_iter().flatten() {
            child.collect_cached(out);
        }
    }

    /// Render the part of `src` that lies in this node onto `canvas`.
    ///
    /// `dst` is where `src` lands on the canvas. Returns whether `src`
    /// overlapped this node at all.
    pub(crate) fn render(
        &mut self,
        ctx: &mut TreeContext<'_>,
        canvas: &mut Canvas<'_>,
        src: Rect,
        dst: Rect,
    ) -> CacheResult<bool> {
        let Some(trimmed_src) = self.region.intersects(&src) else {
            return Ok(false);
        };

        self.last_used = ctx.tick();

        let trimmed_dst = src.map_onto(&trimmed_src, &dst);

        if self.render_from_self(ctx, canvas, &trimmed_src, &trimmed_dst)? {
            return Ok(true);
        }

        self.divide(ctx);

        if let Some(children) = self.children.as_deref_mut() {
            for child in children.iter_mut() {
                child.render(ctx, canvas, trimmed_src, trimmed_dst)?;
            }
        }

        if ctx.params.debug_overlay {
            canvas.outline_rect(trimmed_dst, overlay_children());
        }

        Ok(true)
    }

    /// Paint `src` (a sub-rectangle of `region`) from this node's own bitmap,
    /// populating it first if needed.
    ///
    /// Refuses when finer data exists in the children, or when the bitmap would
    /// be magnified beyond `max_zoom`.
    fn render_from_self(
        &mut self,
        ctx: &mut TreeContext<'_>,
        canvas: &mut Canvas<'_>,
        src: &Rect,
        dst: &Rect,
    ) -> CacheResult<bool> {
        if self.rendered.is_none() && self.has_children() {
            return Ok(false);
        }

        let internal_to_dst = self.internal_to_src * (dst.width / src.width);
        if internal_to_dst > ctx.params.max_zoom {
            return Ok(false);
        }

        if self.rendered.is_none() {
            self.populate(ctx)?;
            ctx.stats.misses += 1;
        } else {
            ctx.stats.hits += 1;
        }

        let placement = self.placement(src, dst);
        if let Some(bitmap) = &self.rendered {
            canvas.draw_image_in(bitmap.as_ref(), placement, *dst);
        }

        if ctx.params.debug_overlay {
            canvas.outline_rect(*dst, overlay_self());
        }

        Ok(true)
    }

    /// Render this node's whole region into a fresh bitmap
    fn populate(&mut self, ctx: &mut TreeContext<'_>) -> CacheResult<()> {
        let mut bitmap = self.allocate_bitmap()?;

        {
            let mut target = Canvas::from_pixmap(&mut bitmap);
            target.set_transform(self.source_to_internal());

            ctx.stats.render_calls += 1;
            (ctx.render_fn)(&mut target, self.region).map_err(CacheError::Render)?;
        }

        ctx.state.record_allocation(self.pixel_count());
        self.rendered = Some(bitmap);

        trace!(
            region = %self.region,
            width = self.internal_width,
            height = self.internal_height,
            "populated node bitmap"
        );

        Ok(())
    }

    fn allocate_bitmap(&self) -> CacheResult<Pixmap> {
        Pixmap::new(self.internal_width, self.internal_height).ok_or(
            CacheError::SurfaceAllocation {
                width: self.internal_width,
                height: self.internal_height,
            },
        )
    }

    /// Maps source coordinates onto this node's bitmap
    fn source_to_internal(&self) -> Transform {
        let scale_x = self.internal_width as f64 / self.region.width;
        let scale_y = self.internal_height as f64 / self.region.height;

        Transform::from_scale(scale_x as f32, scale_y as f32)
            .pre_translate(-self.region.x as f32, -self.region.y as f32)
    }

    /// Maps bitmap pixels onto the canvas so that `src` lands on `dst`
    fn placement(&self, src: &Rect, dst: &Rect) -> Transform {
        let src_to_dst_x = dst.width / src.width;
        let src_to_dst_y = dst.height / src.height;

        let pixel_width = self.region.width / self.internal_width as f64;
        let pixel_height = self.region.height / self.internal_height as f64;

        Transform::from_row(
            (pixel_width * src_to_dst_x) as f32,
            0.0,
            0.0,
            (pixel_height * src_to_dst_y) as f32,
            (dst.x + (self.region.x - src.x) * src_to_dst_x) as f32,
            (dst.y + (self.region.y - src.y) * src_to_dst_y) as f32,
        )
    }

    /// Replace this node's bitmap with four (empty) children.
    ///
    /// Drops the bitmap even when already divided.
    pub(crate) fn divide(&mut self, ctx: &mut TreeContext<'_>) {
        self.clear_rendered(ctx);

        if self.children.is_none() {
            let now = ctx.now();
            let region = self.region;
            let params = ctx.params;

            let children =
                Quadrant::ALL.map(|quadrant| Node::new(region.quadrant(quadrant), params, now));
            debug_assert!(
                (children.iter().map(|c| c.region.area()).sum::<f64>() - region.area()).abs()
                    <= 1e-9 * region.area(),
                "children of {region} do not partition it"
            );

            self.children = Some(Box::new(children));
            ctx.stats.divisions += 1;

            debug!(region = %self.region, "divided node");
        }
    }

    /// Collapse the children into a bitmap for this node.
    ///
    /// If re-rendering the uncached parts of the children would cost more
    /// than this node's bitmap, the children are dropped without compositing.
    /// Returns the net number of pixels freed.
    pub(crate) fn join(&mut self, ctx: &mut TreeContext<'_>) -> CacheResult<usize> {
        if !self.has_children() {
            return Ok(0);
        }

        let uncached = self.uncached_px();
        if uncached > self.pixel_count() {
            let freed = self.clear_children(ctx);
            debug!(region = %self.region, uncached, freed, "dropped children instead of joining");
            return Ok(freed);
        }

        debug_assert!(self.rendered.is_none(), "divided node should not hold a bitmap");

        // Compositing can populate uncached children
        let held = self.size();

        let internal = Rect::new(
            0.0,
            0.0,
            self.internal_width as f64,
            self.internal_height as f64,
        );
        let mut bitmap = self.allocate_bitmap()?;

        if let Some(children) = self.children.as_deref_mut() {
            let mut target = Canvas::from_pixmap(&mut bitmap);

            for (child, quadrant) in children.iter_mut().zip(Quadrant::ALL) {
                let region = child.region;
                child.render(ctx, &mut target, region, internal.quadrant(quadrant))?;
            }
        }

        self.clear_children(ctx);

        ctx.state.record_allocation(self.pixel_count());
        self.rendered = Some(bitmap);
        ctx.stats.joins += 1;

        let freed = held.saturating_sub(self.pixel_count());
        debug!(region = %self.region, freed, "joined children");

        Ok(freed)
    }

    /// Pixels that would have to be rendered from scratch if this subtree were
    /// displayed: nodes holding neither a bitmap nor children.
    ///
    /// Nodes cached at a coarser resolution than ideal count as cached.
    pub(crate) fn uncached_px(&self) -> usize {
        if self.rendered.is_some() {
            return 0;
        }

        match &self.children {
            None => self.pixel_count(),
            Some(children) => children.iter().map(Node::uncached_px).sum(),
        }
    }

    /// Drop cached pixels overlapping `region`, keeping the tree's shape
    pub(crate) fn damage(&mut self, ctx: &mut TreeContext<'_>, region: &Rect) {
        if self.region.intersects(region).is_none() {
            return;
        }

        if let Some(children) = self.children.as_deref_mut() {
            for child in children.iter_mut() {
                child.damage(ctx, region);
            }
        }

        if self.clear_rendered(ctx) > 0 {
            ctx.stats.damaged += 1;
        }
    }

    /// Free this node's bitmap and destroy all children.
    ///
    /// Returns the number of pixels freed.
    pub(crate) fn clear(&mut self, ctx: &mut TreeContext<'_>) -> usize {
        self.clear_rendered(ctx) + self.clear_children(ctx)
    }

    /// Free this node's own bitmap, if any
    pub(crate) fn clear_rendered(&mut self, ctx: &mut TreeContext<'_>) -> usize {
        match self.rendered.take() {
            Some(_) => {
                let pixels = self.pixel_count();
                ctx.state.record_deallocation(pixels);
                pixels
            }
            None => 0,
        }
    }

    fn clear_children(&mut self, ctx: &mut TreeContext<'_>) -> usize {
        let Some(mut children) = self.children.take() else {
            return 0;
        };

        children.iter_mut().map(|child| child.clear(ctx)).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Owns everything a `TreeContext` borrows
    pub(crate) struct Harness {
        pub params: CacheParams,
        pub state: CacheState,
        pub render_fn: Box<RenderFn>,
        pub clock: u64,
        pub stats: CacheStats,
        pub calls: Arc<Mutex<Vec<Rect>>>,
    }

    impl Harness {
        pub(crate) fn new(params: CacheParams) -> Self {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&calls);

            Self {
                params,
                state: CacheState::new(),
                render_fn: Box::new(
                    move |canvas: &mut Canvas<'_>, region: Rect| -> Result<(), RenderError> {
                        log.lock().unwrap().push(region);
                        canvas.fill_rect(region, Color::from_rgba8(0, 128, 0, 255));
                        Ok(())
                    },
                ),
                clock: 0,
                stats: CacheStats::default(),
                calls,
            }
        }

        pub(crate) fn ctx(&mut self) -> TreeContext<'_> {
            TreeContext {
                params: &self.params,
                state: &self.state,
                render_fn: self.render_fn.as_mut(),
                clock: &mut self.clock,
                stats: &mut self.stats,
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn render(&mut self, node: &mut Node, src: Rect, dst: Rect) {
            let mut pixmap = Pixmap::new(
                (dst.right().ceil() as u32).max(1),
                (dst.bottom().ceil() as u32).max(1),
            )
            .unwrap();
            let mut canvas = Canvas::from_pixmap(&mut pixmap);
            let mut ctx = self.ctx();
            node.render(&mut ctx, &mut canvas, src, dst).unwrap();
        }
    }

    fn page_params() -> CacheParams {
        CacheParams::default()
            .with_entry_size(100 * 100)
            .with_max_zoom(2.0)
            .with_max_size(usize::MAX)
    }

    fn page() -> Rect {
        Rect::new(0.0, 0.0, 1000.0, 1000.0)
    }

    #[test]
    fn test_new_node_matches_entry_size_and_aspect() {
        let params = CacheParams::default().with_entry_size(512 * 512);

        let square = Node::new(Rect::new(0.0, 0.0, 1000.0, 1000.0), &params, 0);
        assert_eq!((square.internal_width, square.internal_height), (512, 512));

        let letter = Node::new(Rect::new(0.0, 0.0, 612.0, 792.0), &params, 0);
        assert!(letter.pixel_count() <= 512 * 512);
        assert!(letter.pixel_count() > 510 * 510);
        let aspect = letter.internal_width as f64 / letter.internal_height as f64;
        assert!((aspect - 612.0 / 792.0).abs() < 0.01);

        // Extremely thin regions still get at least one pixel per side
        let sliver = Node::new(Rect::new(0.0, 0.0, 1.0e6, 1.0e-3), &params, 0);
        assert!(sliver.internal_width >= 1);
        assert!(sliver.internal_height >= 1);
    }

    #[test]
    fn test_render_populates_once() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        // 0.1x: root bitmap is magnified 1x
        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(harness.call_count(), 1);
        assert!(root.is_rendered());
        assert_eq!(harness.state.cache_size(), 100 * 100);

        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(harness.call_count(), 1);
        assert_eq!(harness.stats.hits, 1);
        assert_eq!(harness.stats.misses, 1);
    }

    #[test]
    fn test_render_outside_region_is_noop() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        let mut pixmap = Pixmap::new(10, 10).unwrap();
        let mut canvas = Canvas::from_pixmap(&mut pixmap);
        let mut ctx = harness.ctx();
        let overlapped = root
            .render(
                &mut ctx,
                &mut canvas,
                Rect::new(2000.0, 2000.0, 10.0, 10.0),
                Rect::new(0.0, 0.0, 10.0, 10.0),
            )
            .unwrap();

        assert!(!overlapped);
        assert_eq!(root.last_used, 0);
        assert_eq!(harness.call_count(), 0);
    }

    #[test]
    fn test_zoom_in_divides_and_renders_leaves() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(root.is_rendered());

        // 0.3x into the top-left quadrant: root would be magnified 3x
        harness.render(
            &mut root,
            Rect::new(0.0, 0.0, 500.0, 500.0),
            Rect::new(0.0, 0.0, 150.0, 150.0),
        );

        assert!(!root.is_rendered());
        assert!(root.has_children());
        assert_eq!(
            harness.calls.lock().unwrap().last().copied(),
            Some(Rect::new(0.0, 0.0, 500.0, 500.0))
        );
        assert_eq!(harness.call_count(), 2);
        assert_eq!(harness.state.cache_size(), 100 * 100);
        assert_eq!(root.size(), harness.state.cache_size());
    }

    #[test]
    fn test_children_partition_parent() {
        let params = page_params();
        let mut harness = Harness::new(params);
        let mut root = Node::new(Rect::new(3.5, -2.0, 777.7, 333.3), &params, 0);

        root.divide(&mut harness.ctx());
        let children = root.children().unwrap();

        let area: f64 = children.iter().map(|c| c.region().area()).sum();
        assert!((area - root.region().area()).abs() < 1e-6);

        for (i, a) in children.iter().enumerate() {
            for b in children.iter().skip(i + 1) {
                assert!(a.region().intersects(&b.region()).is_none());
            }
        }

        // Dividing again keeps the same children
        let before: Vec<Rect> = children.iter().map(Node::region).collect();
        root.divide(&mut harness.ctx());
        let after: Vec<Rect> = root.children().unwrap().iter().map(Node::region).collect();
        assert_eq!(before, after);
        assert_eq!(harness.stats.divisions, 1);
    }

    #[test]
    fn test_paints_cached_pixels_into_destination() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        let mut pixmap = Pixmap::new(200, 200).unwrap();
        let mut canvas = Canvas::from_pixmap(&mut pixmap);
        let mut ctx = harness.ctx();
        // Top-left quarter of the page into the bottom-right of the target
        root.render(
            &mut ctx,
            &mut canvas,
            Rect::new(0.0, 0.0, 500.0, 500.0),
            Rect::new(100.0, 100.0, 100.0, 100.0),
        )
        .unwrap();

        let inside = pixmap.pixel(150, 150).unwrap();
        assert!(inside.green() >= 126 && inside.alpha() >= 254);
        let outside = pixmap.pixel(50, 50).unwrap();
        assert_eq!(outside.alpha(), 0);
    }

    #[test]
    fn test_damage_clears_overlapping_bitmaps_only() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        // 0.2x over the whole page: children are magnified exactly 1x
        root.divide(&mut harness.ctx());
        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 200.0, 200.0));
        assert_eq!(root.bitmap_count(), 4);

        root.damage(&mut harness.ctx(), &Rect::new(10.0, 10.0, 5.0, 5.0));

        assert_eq!(root.bitmap_count(), 3);
        assert!(root.has_children());
        assert!(!root.children().unwrap()[Quadrant::TopLeft.index()].is_rendered());
        assert_eq!(harness.state.cache_size(), 3 * 100 * 100);
        assert_eq!(harness.stats.damaged, 1);

        // Damage outside the page does nothing
        root.damage(&mut harness.ctx(), &Rect::new(5000.0, 0.0, 10.0, 10.0));
        assert_eq!(root.bitmap_count(), 3);
    }

    #[test]
    fn test_clear_frees_everything() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        root.divide(&mut harness.ctx());
        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 200.0, 200.0));
        assert_eq!(harness.state.cache_size(), 4 * 100 * 100);

        let freed = root.clear(&mut harness.ctx());

        assert_eq!(freed, 4 * 100 * 100);
        assert_eq!(harness.state.cache_size(), 0);
        assert!(!root.has_children());
        assert!(root.is_empty());
    }

    #[test]
    fn test_join_composites_cached_children() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        root.divide(&mut harness.ctx());
        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 200.0, 200.0));
        let calls_before = harness.call_count();

        let freed = root.join(&mut harness.ctx()).unwrap();

        assert_eq!(freed, 3 * 100 * 100);
        assert!(root.is_rendered());
        assert!(!root.has_children());
        assert_eq!(harness.state.cache_size(), 100 * 100);
        // Every child was cached, so joining needs no new renders
        assert_eq!(harness.call_count(), calls_before);

        let center = root.rendered.as_ref().unwrap().pixel(50, 50).unwrap();
        assert!(center.green() >= 126 && center.alpha() >= 254);
    }

    #[test]
    fn test_join_counts_children_filled_while_compositing() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        root.divide(&mut harness.ctx());
        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 200.0, 200.0));
        root.damage(&mut harness.ctx(), &Rect::new(600.0, 600.0, 10.0, 10.0));
        assert_eq!(root.uncached_px(), 100 * 100);
        assert_eq!(harness.state.cache_size(), 3 * 100 * 100);
        let calls_before = harness.call_count();

        let freed = root.join(&mut harness.ctx()).unwrap();

        // The bottom-right child is rendered once to composite it
        assert_eq!(harness.call_count(), calls_before + 1);
        assert_eq!(
            harness.calls.lock().unwrap().last().copied(),
            Some(Rect::new(500.0, 500.0, 500.0, 500.0))
        );
        assert_eq!(freed, 2 * 100 * 100);
        assert_eq!(harness.state.cache_size(), 100 * 100);
        assert_eq!(root.size(), harness.state.cache_size());
    }

    #[test]
    fn test_join_drops_children_when_mostly_uncached() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);

        // Only the top-left child is cached; three children are uncached
        harness.render(
            &mut root,
            Rect::new(0.0, 0.0, 500.0, 500.0),
            Rect::new(0.0, 0.0, 150.0, 150.0),
        );
        assert_eq!(root.uncached_px(), 3 * 100 * 100);

        let freed = root.join(&mut harness.ctx()).unwrap();

        assert_eq!(freed, 100 * 100);
        assert!(!root.is_rendered());
        assert!(!root.has_children());
        assert_eq!(harness.state.cache_size(), 0);
        assert_eq!(harness.stats.joins, 0);
    }

    #[test]
    fn test_zoom_reports_finest_cached_resolution() {
        let mut harness = Harness::new(page_params());
        let mut root = Node::new(page(), &harness.params, 0);
        assert_eq!(root.zoom(), 0.0);

        harness.render(&mut root, page(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!((root.zoom() - 0.1).abs() < 1e-12);

        harness.render(
            &mut root,
            Rect::new(0.0, 0.0, 500.0, 500.0),
            Rect::new(0.0, 0.0, 150.0, 150.0),
        );
        assert!((root.zoom() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_render_error_keeps_accounting() {
        let mut harness = Harness::new(page_params());
        harness.render_fn = Box::new(|_: &mut Canvas<'_>, _: Rect| -> Result<(), RenderError> {
            Err(RenderError::from("backend unavailable"))
        });

        let mut root = Node::new(page(), &harness.params, 0);
        let mut pixmap = Pixmap::new(100, 100).unwrap();
        let mut canvas = Canvas::from_pixmap(&mut pixmap);
        let mut ctx = harness.ctx();
        let result = root.render(&mut ctx, &mut canvas, page(), Rect::new(0.0, 0.0, 100.0, 100.0));

        assert!(matches!(result, Err(CacheError::Render(_))));
        assert!(!root.is_rendered());
        assert_eq!(harness.state.cache_size(), 0);
        assert_eq!(harness.stats.render_calls, 1);
    }
}
