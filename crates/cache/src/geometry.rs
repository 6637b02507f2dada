//! Source-space geometry
//!
//! Rectangles are expressed in source (document) units as `f64`. Conversion to
//! tiny-skia's `f32` rectangles happens only at paint time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in source coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Create a rectangle from two corners (left/top and right/bottom)
    pub fn from_ltrb(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Returns true if the rectangle covers no area
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Compute the overlap of `self` and `other`
    ///
    /// Returns `None` if the rectangles are disjoint, merely touch, or if
    /// either of them has zero area.
    pub fn intersects(&self, other: &Rect) -> Option<Rect> {
        if self.is_empty() || other.is_empty() {
            return None;
        }

        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        let overlap = Rect::from_ltrb(left, top, right, bottom);
        if overlap.is_empty() {
            None
        } else {
            Some(overlap)
        }
    }

    /// Returns true if `other` lies entirely within `self`
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// The sub-rectangle covering one quadrant (half width, half height)
    pub fn quadrant(&self, quadrant: Quadrant) -> Rect {
        let half_width = self.width / 2.0;
        let half_height = self.height / 2.0;

        let x = match quadrant {
            Quadrant::TopLeft | Quadrant::BottomLeft => self.x,
            Quadrant::TopRight | Quadrant::BottomRight => self.x + half_width,
        };
        let y = match quadrant {
            Quadrant::TopLeft | Quadrant::TopRight => self.y,
            Quadrant::BottomLeft | Quadrant::BottomRight => self.y + half_height,
        };

        Rect::new(x, y, half_width, half_height)
    }

    /// Map the sub-rectangle `part` of `self` onto the same fractional
    /// position within `target`.
    ///
    /// Used to keep a destination rectangle in step with a trimmed source
    /// rectangle: offsets and sizes are scaled by the target/self ratio.
    pub fn map_onto(&self, part: &Rect, target: &Rect) -> Rect {
        let scale_x = target.width / self.width;
        let scale_y = target.height / self.height;

        Rect::new(
            target.x + (part.x - self.x) * scale_x,
            target.y + (part.y - self.y) * scale_y,
            part.width * scale_x,
            part.height * scale_y,
        )
    }

    /// Convert to a tiny-skia rectangle
    ///
    /// Returns `None` for empty or non-finite rectangles.
    pub fn to_skia(&self) -> Option<tiny_skia::Rect> {
        let (width, height) = (self.width as f32, self.height as f32);
        if !(width > 0.0 && height > 0.0) {
            return None;
        }

        tiny_skia::Rect::from_xywh(self.x as f32, self.y as f32, width, height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// One of the four children of a quad-tree node
///
/// The discriminants match the children's storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

impl Quadrant {
    /// All quadrants in visiting order
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopLeft,
        Quadrant::TopRight,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}
