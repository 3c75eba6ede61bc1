//! Screen geometry and letterbox mapping types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Parse the output of `wm size`.
    ///
    /// The tool prints `Physical size: WxH` and, when the resolution was
    /// overridden, a second `Override size: WxH` line. The override is what
    /// input coordinates are interpreted against, so it wins.
    pub fn from_wm_size(output: &str) -> Result<Self, ParseSizeError> {
        let mut physical = None;
        let mut overridden = None;
        for line in output.lines() {
            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            let label = label.trim().to_ascii_lowercase();
            if label.starts_with("override") {
                overridden = Some(value.trim().parse()?);
            } else if label.starts_with("physical") {
                physical = Some(value.trim().parse()?);
            }
        }
        if let Some(size) = overridden.or(physical) {
            return Ok(size);
        }
        output
            .split_whitespace()
            .last()
            .ok_or(ParseSizeError::Empty)?
            .parse()
    }
}

impl FromStr for Size {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseSizeError::Empty);
        }
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| ParseSizeError::Malformed(s.to_string()))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| ParseSizeError::Malformed(s.to_string()))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| ParseSizeError::Malformed(s.to_string()))?;
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSizeError {
    #[error("empty size string")]
    Empty,

    #[error("malformed size: {0:?} (expected WIDTHxHEIGHT)")]
    Malformed(String),
}

/// A pixel coordinate. Signed because pointer positions may fall outside
/// the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = f64::from(other.x) - f64::from(self.x);
        let dy = f64::from(other.y) - f64::from(self.y);
        dx.hypot(dy)
    }

    /// Squared Euclidean distance to `other`, exact for any pair of points.
    #[must_use]
    pub fn distance_squared_to(&self, other: Point) -> i64 {
        let dx = i64::from(other.x) - i64::from(self.x);
        let dy = i64::from(other.y) - i64::from(self.y);
        dx * dx + dy * dy
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Placement of an image scaled to fit a surface without cropping.
///
/// `effective` is the largest size with the image's aspect ratio that fits
/// the surface (floored); the image is centered, so `offset_x`/`offset_y` are
/// half the slack on each axis (floored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    pub effective: Size,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    /// Fit `image` into `surface`. Returns `None` when either is empty or the
    /// fitted image would collapse to zero pixels.
    #[must_use]
    pub fn fit(image: Size, surface: Size) -> Option<Self> {
        if image.is_empty() || surface.is_empty() {
            return None;
        }
        let (iw, ih) = (u64::from(image.width), u64::from(image.height));
        let (sw, sh) = (u64::from(surface.width), u64::from(surface.height));

        // Surface wider than the image (sw/sh > iw/ih): height is the limit.
        let (ew, eh) = if sw * ih > iw * sh {
            (sh * iw / ih, sh)
        } else {
            (sw, sw * ih / iw)
        };
        if ew == 0 || eh == 0 {
            return None;
        }
        // ew <= sw and eh <= sh, so both fit back into u32.
        let effective = Size::new(
            u32::try_from(ew).unwrap_or(u32::MAX),
            u32::try_from(eh).unwrap_or(u32::MAX),
        );
        Some(Self {
            effective,
            offset_x: (surface.width - effective.width) / 2,
            offset_y: (surface.height - effective.height) / 2,
        })
    }

    /// Translate a surface point into image-relative coordinates, or `None`
    /// when it lands in the padding.
    #[must_use]
    pub fn to_image(&self, point: Point) -> Option<(u32, u32)> {
        let x = i64::from(point.x) - i64::from(self.offset_x);
        let y = i64::from(point.y) - i64::from(self.offset_y);
        if x < 0
            || y < 0
            || x >= i64::from(self.effective.width)
            || y >= i64::from(self.effective.height)
        {
            return None;
        }
        Some((u32::try_from(x).ok()?, u32::try_from(y).ok()?))
    }

    /// Map a surface point to device-native pixels (floored), or `None` when
    /// the point is outside the displayed image.
    #[must_use]
    pub fn map_point(&self, point: Point, device: Size) -> Option<Point> {
        let (x, y) = self.to_image(point)?;
        let dx = u64::from(x) * u64::from(device.width) / u64::from(self.effective.width);
        let dy = u64::from(y) * u64::from(device.height) / u64::from(self.effective.height);
        Some(Point::new(i32::try_from(dx).ok()?, i32::try_from(dy).ok()?))
    }
}
