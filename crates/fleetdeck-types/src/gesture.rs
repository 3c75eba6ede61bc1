//! Pointer gesture types and classification.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::screen::Point;

/// One press-release cycle on a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    pub start: Point,
    pub started_at: Instant,
    pub end: Point,
    pub ended_at: Instant,
}

impl GestureEvent {
    #[must_use]
    pub fn new(start: Point, started_at: Instant, end: Point, ended_at: Instant) -> Self {
        Self {
            start,
            started_at,
            end,
            ended_at,
        }
    }

    /// Euclidean displacement between press and release, in surface pixels.
    #[must_use]
    pub fn displacement(&self) -> f64 {
        self.start.distance_to(self.end)
    }

    /// Time the pointer was held. Zero if the clock went backwards.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at.saturating_duration_since(self.started_at)
    }

    /// Classify this event under the given thresholds.
    #[must_use]
    pub fn classify(&self, thresholds: &GestureThresholds) -> GestureKind {
        thresholds.classify(self.start, self.end, self.duration())
    }
}

/// Classification constants. Both comparisons are strict: a displacement of
/// exactly `drag_threshold` is not a swipe, and a hold of exactly
/// `long_press` is a tap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureThresholds {
    /// Surface pixels the pointer must travel for a swipe.
    pub drag_threshold: f64,
    /// Hold time after which a stationary press is a long-press.
    pub long_press: Duration,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            drag_threshold: 20.0,
            long_press: Duration::from_millis(500),
        }
    }
}

impl GestureThresholds {
    /// Whether moving from `start` to `end` travels past the drag threshold.
    ///
    /// Compared on squared integer distance so the exact-threshold case does
    /// not depend on float rounding.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_drag(&self, start: Point, end: Point) -> bool {
        start.distance_squared_to(end) as f64 > self.drag_threshold * self.drag_threshold
    }

    #[must_use]
    pub fn classify(&self, start: Point, end: Point, duration: Duration) -> GestureKind {
        if self.is_drag(start, end) {
            GestureKind::Swipe
        } else if duration > self.long_press {
            GestureKind::LongPress
        } else {
            GestureKind::Tap
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureKind {
    Tap,
    LongPress,
    Swipe,
}

impl std::fmt::Display for GestureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tap => write!(f, "TAP"),
            Self::LongPress => write!(f, "LONG PRESS"),
            Self::Swipe => write!(f, "SWIPE"),
        }
    }
}

/// A classified gesture in device-native coordinates, ready to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gesture {
    Tap(Point),
    LongPress(Point),
    Swipe { from: Point, to: Point },
}

impl Gesture {
    #[must_use]
    pub fn kind(&self) -> GestureKind {
        match self {
            Self::Tap(_) => GestureKind::Tap,
            Self::LongPress(_) => GestureKind::LongPress,
            Self::Swipe { .. } => GestureKind::Swipe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(dx: i32, dy: i32, held_ms: u64) -> GestureEvent {
        let t0 = Instant::now();
        GestureEvent::new(
            Point::new(100, 100),
            t0,
            Point::new(100 + dx, 100 + dy),
            t0 + Duration::from_millis(held_ms),
        )
    }

    #[test]
    fn quick_still_press_is_tap() {
        let t = GestureThresholds::default();
        assert_eq!(event(0, 0, 100).classify(&t), GestureKind::Tap);
        assert_eq!(event(3, 4, 100).classify(&t), GestureKind::Tap);
    }

    #[test]
    fn held_press_is_long_press() {
        let t = GestureThresholds::default();
        assert_eq!(event(0, 0, 800).classify(&t), GestureKind::LongPress);
        assert_eq!(event(12, 16, 501).classify(&t), GestureKind::LongPress);
    }

    #[test]
    fn movement_is_swipe_regardless_of_duration() {
        let t = GestureThresholds::default();
        assert_eq!(event(0, 21, 10).classify(&t), GestureKind::Swipe);
        assert_eq!(event(-200, 0, 3000).classify(&t), GestureKind::Swipe);
    }

    #[test]
    fn displacement_exactly_at_threshold_is_not_swipe() {
        let t = GestureThresholds::default();
        // 12-16-20 triangle: exactly 20 px.
        let quick = event(12, 16, 100);
        assert!((quick.displacement() - 20.0).abs() < 1e-9);
        assert_eq!(quick.classify(&t), GestureKind::Tap);
        assert_eq!(event(0, 20, 900).classify(&t), GestureKind::LongPress);
    }

    #[test]
    fn duration_exactly_at_threshold_is_tap() {
        let t = GestureThresholds::default();
        assert_eq!(event(0, 0, 500).classify(&t), GestureKind::Tap);
    }

    #[test]
    fn backwards_clock_is_zero_duration() {
        let t0 = Instant::now() + Duration::from_secs(1);
        let ev = GestureEvent::new(Point::new(0, 0), t0, Point::new(0, 0), Instant::now());
        assert_eq!(ev.duration(), Duration::ZERO);
    }

    #[test]
    fn gesture_kind_matches_variant() {
        let p = Point::new(1, 2);
        assert_eq!(Gesture::Tap(p).kind(), GestureKind::Tap);
        assert_eq!(Gesture::LongPress(p).kind(), GestureKind::LongPress);
        assert_eq!(Gesture::Swipe { from: p, to: p }.kind(), GestureKind::Swipe);
    }
}
