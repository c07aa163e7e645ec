//! Detector-space to device-space coordinate mapping.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::types::{BoundingBox, RelativePosition};

/// Screen rotation, clockwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Width and height trade places for quarter turns.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Number of clockwise quarter turns.
    pub fn quarter_turns(self) -> u8 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 1,
            Rotation::Deg180 => 2,
            Rotation::Deg270 => 3,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = anyhow::Error;

    fn try_from(degrees: u16) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => bail!("unsupported rotation {other}, expected 0/90/180/270"),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Inputs that stay fixed for a session once the first detection has run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub device_width: u32,
    pub device_height: u32,
    pub resize_ratio: f64,
    pub rotation: Rotation,
}

impl ScreenGeometry {
    /// Device bounds expressed in detector space.
    pub fn scaled_bounds(&self) -> (i32, i32) {
        (
            (f64::from(self.device_width) * self.resize_ratio) as i32,
            (f64::from(self.device_height) * self.resize_ratio) as i32,
        )
    }
}

/// Pixel offsets applied for relative positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchOffsets {
    pub dx: i32,
    pub dy: i32,
}

impl Default for TouchOffsets {
    fn default() -> Self {
        Self { dx: 40, dy: 60 }
    }
}

/// Detector-space touch point for a box and relative position, before rotation.
pub fn touch_point(
    bbox: &BoundingBox,
    position: RelativePosition,
    bounds: (i32, i32),
    offsets: TouchOffsets,
) -> (i32, i32) {
    let (width, height) = bounds;
    let (x, y) = bbox.center();
    match position {
        RelativePosition::Center => (x, y),
        RelativePosition::Left => ((bbox.column_min - offsets.dx).max(0), y),
        RelativePosition::Right => ((bbox.column_max + offsets.dx).min(width), y),
        RelativePosition::Up => (x, (bbox.row_min - offsets.dy).max(0)),
        RelativePosition::Down => (x, (bbox.row_max + offsets.dy).min(height)),
    }
}

/// Rotate a point inside a `width` x `height` frame.
pub fn rotate_point(point: (i32, i32), bounds: (i32, i32), rotation: Rotation) -> (i32, i32) {
    let (x, y) = point;
    let (width, height) = bounds;
    match rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (y, width - x),
        Rotation::Deg180 => (width - x, height - y),
        Rotation::Deg270 => (height - y, x),
    }
}

/// Full mapping from a target box to the physical coordinate handed to the bridge.
pub fn device_point(
    bbox: &BoundingBox,
    position: RelativePosition,
    geometry: &ScreenGeometry,
    offsets: TouchOffsets,
) -> (i32, i32) {
    let bounds = geometry.scaled_bounds();
    let point = touch_point(bbox, position, bounds, offsets);
    let (x, y) = rotate_point(point, bounds, geometry.rotation);
    to_physical((x, y), geometry.resize_ratio)
}

/// Undo the detector's resize. A non-positive ratio leaves the point unscaled.
pub fn to_physical(point: (i32, i32), resize_ratio: f64) -> (i32, i32) {
    if resize_ratio <= 0.0 {
        return point;
    }
    (
        (f64::from(point.0) / resize_ratio).floor() as i32,
        (f64::from(point.1) / resize_ratio).floor() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox::new(100, 200, 300, 260)
    }

    #[test]
    fn center_and_offsets_are_clamped_to_bounds() {
        let offsets = TouchOffsets::default();
        let bounds = (320, 480);
        assert_eq!(
            touch_point(&bbox(), RelativePosition::Center, bounds, offsets),
            (200, 230)
        );
        assert_eq!(
            touch_point(&bbox(), RelativePosition::Left, bounds, offsets),
            (60, 230)
        );
        assert_eq!(
            touch_point(&bbox(), RelativePosition::Right, bounds, offsets),
            (320, 230)
        );
        assert_eq!(
            touch_point(&bbox(), RelativePosition::Up, bounds, offsets),
            (200, 140)
        );
        assert_eq!(
            touch_point(&bbox(), RelativePosition::Down, bounds, offsets),
            (200, 320)
        );

        let edge = BoundingBox::new(10, 20, 30, 40);
        assert_eq!(
            touch_point(&edge, RelativePosition::Left, bounds, offsets),
            (0, 30)
        );
        assert_eq!(
            touch_point(&edge, RelativePosition::Up, bounds, offsets),
            (20, 0)
        );
    }

    #[test]
    fn zero_rotation_is_identity() {
        for point in [(0, 0), (12, 34), (320, 480)] {
            assert_eq!(rotate_point(point, (320, 480), Rotation::Deg0), point);
        }
    }

    /// Verifies four quarter turns return to the start on a square frame.
    #[test]
    fn four_quarter_turns_return_the_point() {
        let bounds = (500, 500);
        for start in [(0, 0), (17, 403), (250, 9), (500, 500)] {
            let mut point = start;
            for _ in 0..4 {
                point = rotate_point(point, bounds, Rotation::Deg90);
            }
            assert_eq!(point, start);
        }
    }

    #[test]
    fn half_turn_matches_two_quarter_turns() {
        let bounds = (600, 600);
        let point = (120, 45);
        let twice = rotate_point(
            rotate_point(point, bounds, Rotation::Deg90),
            bounds,
            Rotation::Deg90,
        );
        assert_eq!(twice, rotate_point(point, bounds, Rotation::Deg180));
    }

    #[test]
    fn device_point_divides_by_resize_ratio() {
        let geometry = ScreenGeometry {
            device_width: 1080,
            device_height: 1920,
            resize_ratio: 0.5,
            rotation: Rotation::Deg0,
        };
        assert_eq!(
            device_point(
                &bbox(),
                RelativePosition::Center,
                &geometry,
                TouchOffsets::default()
            ),
            (400, 460)
        );
    }

    #[test]
    fn rotation_rejects_other_angles() {
        assert_eq!(Rotation::try_from(270).expect("valid"), Rotation::Deg270);
        assert!(Rotation::try_from(45).is_err());
        assert!(Rotation::Deg90.swaps_axes());
        assert!(!Rotation::Deg180.swaps_axes());
    }
}
