//! Page geometry in CSS pixels.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn offset(self, by: Point) -> Self {
        Self::new(self.x + by.x, self.y + by.y)
    }
}

/// An axis-aligned rectangle, as returned by `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Collapsed or inverted rectangles have no area.
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn bottom_left(&self) -> Point {
        Point::new(self.left, self.bottom())
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.right(), self.bottom())
    }

    /// Convert viewport coordinates to page coordinates by adding the
    /// scroll offset.
    #[must_use]
    pub fn to_page(self, scroll: Point) -> Self {
        Self::new(self.left + scroll.x, self.top + scroll.y, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_and_area() {
        let rect = Rect::new(10.0, 20.0, 30.0, 5.0);
        assert_eq!(rect.bottom_right(), Point::new(40.0, 25.0));
        assert_eq!(rect.bottom_left(), Point::new(10.0, 25.0));
        assert!(rect.has_area());
        assert!(!Rect::new(10.0, 20.0, 0.0, 5.0).has_area());
        assert!(!Rect::new(10.0, 20.0, 4.0, -1.0).has_area());
    }

    #[test]
    fn page_coordinates_add_scroll() {
        let rect = Rect::new(10.0, 20.0, 30.0, 5.0).to_page(Point::new(0.0, 500.0));
        assert_eq!(rect, Rect::new(10.0, 520.0, 30.0, 5.0));
    }
}
