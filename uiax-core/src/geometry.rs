//! Screen-space geometry primitives.
//!
//! Coordinates are integer screen pixels with the origin at the primary
//! display's top-left corner.  Values may be negative on multi-monitor
//! setups.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rectangle in screen coordinates.
///
/// Width and height may be zero or negative, in which case the rectangle is
/// empty and contains no points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from `left, top, right, bottom` edges (the UIA / Win32 layout).
    pub const fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
    }

    /// Midpoint, truncated toward zero and clamped to the `i32` range.
    pub const fn center(&self) -> Point {
        Point::new(
            clamp_i32(self.x as i64 + self.width as i64 / 2),
            clamp_i32(self.y as i64 + self.height as i64 / 2),
        )
    }

    /// Half-open containment: `[x, x+w) × [y, y+h)`.
    pub const fn contains(&self, p: Point) -> bool {
        let (px, py) = (p.x as i64, p.y as i64);
        let (x, y) = (self.x as i64, self.y as i64);
        px >= x && px < x + self.width as i64 && py >= y && py < y + self.height as i64
    }

    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

const fn clamp_i32(v: i64) -> i32 {
    if v > i32::MAX as i64 {
        i32::MAX
    } else if v < i32::MIN as i64 {
        i32::MIN
    } else {
        v as i32
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}×{}", self.x, self.y, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_square() {
        assert_eq!(Rect::new(0, 0, 100, 100).center(), Point::new(50, 50));
    }

    #[test]
    fn test_center_offset() {
        assert_eq!(Rect::new(100, 200, 50, 60).center(), Point::new(125, 230));
    }

    #[test]
    fn test_center_truncates() {
        for r in [
            Rect::new(0, 0, 3, 5),
            Rect::new(-7, 4, 9, 1),
            Rect::new(10, -10, -5, -3),
        ] {
            let c = r.center();
            assert_eq!(c, Point::new(r.x + r.width / 2, r.y + r.height / 2));
        }
        assert_eq!(Rect::new(0, 0, 3, 5).center(), Point::new(1, 2));
    }

    #[test]
    fn test_contains_edges() {
        let r = Rect::new(10, 20, 100, 50);
        assert!(r.contains(Point::new(10, 20)));
        assert!(r.contains(Point::new(109, 69)));
        assert!(!r.contains(Point::new(110, 40)));
        assert!(!r.contains(Point::new(50, 70)));
        assert!(!r.contains(Point::new(111, 40)));
        assert!(!r.contains(Point::new(9, 20)));
    }

    #[test]
    fn test_empty_rect_contains_nothing() {
        let r = Rect::new(0, 0, 0, 10);
        assert!(!r.contains(Point::new(0, 0)));
        let r = Rect::new(5, 5, -3, 4);
        assert!(!r.contains(Point::new(4, 6)));
    }

    #[test]
    fn test_is_empty() {
        assert!(Rect::new(0, 0, 0, 10).is_empty());
        assert!(Rect::new(0, 0, 10, 0).is_empty());
        assert!(Rect::new(0, 0, -1, 10).is_empty());
        assert!(Rect::new(0, 0, 10, -4).is_empty());
        assert!(!Rect::new(0, 0, 1, 1).is_empty());
        assert!(!Rect::new(-50, -50, 10, 10).is_empty());
    }

    #[test]
    fn test_from_ltrb() {
        let r = Rect::from_ltrb(10, 20, 110, 70);
        assert_eq!(r, Rect::new(10, 20, 100, 50));
    }

    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        let far = Rect::new(i32::MAX - 1, 0, 10, 10);
        assert_eq!(far.center(), Point::new(i32::MAX, 5));

        let edge = Rect::new(i32::MAX - 5, 0, 10, 10);
        assert!(edge.contains(Point::new(i32::MAX - 1, 5)));
        assert!(edge.contains(Point::new(i32::MAX, 9)));
        assert!(!edge.contains(Point::new(i32::MAX - 6, 5)));

        let low = Rect::new(i32::MIN, i32::MIN, -10, 4);
        assert_eq!(low.center(), Point::new(i32::MIN, i32::MIN + 2));
        assert!(!low.contains(Point::new(i32::MIN, i32::MIN)));

        let wide = Rect::from_ltrb(i32::MIN, 0, i32::MAX, 10);
        assert_eq!(wide.width, i32::MAX);
        assert_eq!(wide.height, 10);
    }

    #[test]
    fn test_display_any_magnitude() {
        assert_eq!(Rect::new(1200, -40, 1920, 1080).to_string(), "1200,-40 1920×1080");
    }
}
