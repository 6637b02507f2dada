//! Paint target shared by callers, render callbacks and node bitmaps
//!
//! A [`Canvas`] is a borrowed tiny-skia pixmap plus a current transform. The
//! cache hands one to the render callback with the transform already mapping
//! source units onto the node bitmap, so callbacks paint in source coordinates
//! and never deal with scale themselves.

use tiny_skia::{
    Color, FillRule, FilterQuality, Paint, Path, PathBuilder, Pattern, Pixmap, PixmapMut,
    PixmapRef, SpreadMode, Stroke, Transform,
};

use crate::geometry::Rect;

/// A pixmap being painted, with a current transform
pub struct Canvas<'a> {
    pixmap: PixmapMut<'a>,
    transform: Transform,
}

impl<'a> Canvas<'a> {
    /// Wrap a mutable pixmap view with an identity transform
    pub fn new(pixmap: PixmapMut<'a>) -> Self {
        Self {
            pixmap,
            transform: Transform::identity(),
        }
    }

    /// Wrap an owned pixmap with an identity transform
    pub fn from_pixmap(pixmap: &'a mut Pixmap) -> Self {
        Self::new(pixmap.as_mut())
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// The transform applied to everything painted through this canvas
    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Direct access to the underlying pixmap (bypasses the transform)
    pub fn pixmap_mut(&mut self) -> &mut PixmapMut<'a> {
        &mut self.pixmap
    }

    /// Fill the whole pixmap, ignoring the transform
    pub fn clear(&mut self, color: Color) {
        self.pixmap.fill(color);
    }

    /// Fill a rectangle with a solid color
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some(rect) = rect.to_skia() else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color(color);
        paint.anti_alias = false;
        self.pixmap.fill_rect(rect, &paint, self.transform, None);
    }

    pub fn fill_path(&mut self, path: &Path, paint: &Paint<'_>, fill_rule: FillRule) {
        self.pixmap
            .fill_path(path, paint, fill_rule, self.transform, None);
    }

    pub fn stroke_path(&mut self, path: &Path, paint: &Paint<'_>, stroke: &Stroke) {
        self.pixmap
            .stroke_path(path, paint, stroke, self.transform, None);
    }

    /// Outline a rectangle with a hairline
    pub fn outline_rect(&mut self, rect: Rect, color: Color) {
        let Some(path) = rect.to_skia().map(PathBuilder::from_rect) else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color(color);
        let stroke = Stroke {
            width: 0.0,
            ..Stroke::default()
        };
        self.stroke_path(&path, &paint, &stroke);
    }

    /// Paint `image` into `dst`, placed by `placement`
    ///
    /// `placement` maps image pixels into this canvas' user space. Only the
    /// part of the image that lands inside `dst` is painted.
    pub fn draw_image_in(&mut self, image: PixmapRef<'_>, placement: Transform, dst: Rect) {
        let Some(rect) = dst.to_skia() else {
            return;
        };

        let paint = Paint {
            shader: Pattern::new(
                image,
                SpreadMode::Pad,
                FilterQuality::Bilinear,
                1.0,
                placement,
            ),
            // Neighbouring nodes share fractional edges; anti-aliasing would
            // leave seams between them.
            anti_alias: false,
            ..Paint::default()
        };
        self.pixmap.fill_rect(rect, &paint, self.transform, None);
    }
}
