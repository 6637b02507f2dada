//! Bringing a tree back under its pixel budget

use tracing::debug;

use super::{Node, TreeContext};
use crate::config::UncachePolicy;
use crate::error::CacheResult;

impl Node {
    /// Free pixels until the shared cache size is back within `max_size`.
    ///
    /// `current_zoom` is the display scale of the render that triggered the
    /// cleanup. Returns the number of pixels freed from this tree.
    pub(crate) fn cleanup(
        &mut self,
        ctx: &mut TreeContext<'_>,
        current_zoom: f64,
    ) -> CacheResult<usize> {
        let quota = ctx.state.excess_over(ctx.params.max_size);
        if quota == 0 {
            return Ok(0);
        }

        let bitmaps_before = self.bitmap_count();
        let mut freed = 0;

        if ctx.params.uncache_policy == UncachePolicy::ViewportThenLru {
            let target_zoom = current_zoom * ctx.params.max_zoom;
            freed += self.cleanup_by_zoom(ctx, quota, target_zoom)?;
        }

        if freed < quota {
            freed += self.cleanup_by_timestamp(ctx, quota - freed);
        }

        ctx.stats.pixels_evicted += freed as u64;
        ctx.stats.evictions += bitmaps_before.saturating_sub(self.bitmap_count()) as u64;

        debug!(
            quota,
            freed,
            cache_size = ctx.state.cache_size(),
            policy = %ctx.params.uncache_policy,
            "cache cleanup"
        );

        Ok(freed)
    }

    /// Free bitmaps cached at a finer resolution than `target_zoom`, finest
    /// first. Nodes left entirely at or below the target may be joined.
    fn cleanup_by_zoom(
        &mut self,
        ctx: &mut TreeContext<'_>,
        quota: usize,
        target_zoom: f64,
    ) -> CacheResult<usize> {
        if quota == 0 {
            return Ok(0);
        }

        if !self.has_children() {
            if self.is_rendered() && self.zoom() > target_zoom {
                return Ok(self.clear_rendered(ctx));
            }
            return Ok(0);
        }

        let mut freed = 0;
        if let Some(children) = self.children.as_deref_mut() {
            for index in children_by_zoom(children) {
                let child = &mut children[index];
                if child.zoom() <= target_zoom {
                    break;
                }

                freed += child.cleanup_by_zoom(ctx, quota - freed, target_zoom)?;
                if freed >= quota {
                    break;
                }
            }
        }

        if freed < quota && self.has_children() && self.zoom() <= target_zoom {
            freed += self.join(ctx)?;
        }

        if self.is_empty() {
            freed += self.clear(ctx);
        }

        Ok(freed)
    }

    /// Free bitmaps in least-recently-used order
    fn cleanup_by_timestamp(&mut self, ctx: &mut TreeContext<'_>, quota: usize) -> usize {
        if quota == 0 {
            return 0;
        }

        if !self.has_children() {
            return self.clear_rendered(ctx);
        }

        let mut freed = 0;
        if let Some(children) = self.children.as_deref_mut() {
            for index in children_by_timestamp(children) {
                freed += children[index].cleanup_by_timestamp(ctx, quota - freed);
                if freed >= quota {
                    break;
                }
            }
        }

        if self.is_empty() {
            freed += self.clear(ctx);
        }

        freed
    }
}

/// Child indices, finest cached resolution first
fn children_by_zoom(children: &[Node; 4]) -> [usize; 4] {
    let zooms: [f64; 4] = std::array::from_fn(|index| children[index].zoom());
    let mut order = [0, 1, 2, 3];
    order.sort_by(|&a, &b| zooms[b].total_cmp(&zooms[a]));
    order
}

/// Child indices, least recently used first
fn children_by_timestamp(children: &[Node; 4]) -> [usize; 4] {
    let mut order = [0, 1, 2, 3];
    order.sort_by_key(|&index| children[index].last_used);
    order
}
