//! Planar query windows.

use std::fmt;

/// Axis-aligned box in planar meters.
///
/// Renders as `minx,miny,maxx,maxy`, the order bbox query parameters use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// A square window extending `half_width` meters from a center point.
    pub fn around(x: f64, y: f64, half_width: f64) -> Self {
        Self {
            min_x: x - half_width,
            min_y: y - half_width,
            max_x: x + half_width,
            max_y: y + half_width,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
