//! Bounding Box Value Object
//!
//! Rectangular region of a detected face within a frame.

use serde::{Deserialize, Serialize};

/// A bounding box defining a rectangular region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl BoundingBox {
    /// Creates a new bounding box.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Returns the center point of the bounding box.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Returns the area of the bounding box in pixels.
    pub fn area(&self) -> i32 {
        self.width * self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_calculated_correctly() {
        let bbox = BoundingBox::new(10, 20, 100, 100);
        assert_eq!(bbox.center(), (60, 70));
    }

    #[test]
    fn area_is_calculated_correctly() {
        let bbox = BoundingBox::new(0, 0, 10, 20);
        assert_eq!(bbox.area(), 200);
    }
}
