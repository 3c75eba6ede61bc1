//! Turning pointer gestures on the mirrored image into device commands.

use std::time::Duration;

use fleetdeck_types::{
    CommandRequest, DeviceSerial, Gesture, GestureEvent, GestureKind, GestureThresholds,
    Letterbox, Point, Size,
};

use crate::config::GestureConfig;
use crate::error::EngineError;

/// How classified gestures are replayed on devices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureTiming {
    pub thresholds: GestureThresholds,
    /// Hold time of a replayed long-press.
    pub long_press_hold: Duration,
    pub swipe: Duration,
}

impl From<&GestureConfig> for GestureTiming {
    fn from(config: &GestureConfig) -> Self {
        Self {
            thresholds: config.thresholds(),
            long_press_hold: config.long_press_hold(),
            swipe: config.swipe(),
        }
    }
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self::from(&GestureConfig::default())
    }
}

/// Map a surface point to device pixels.
///
/// `image` is the snapshot size, `surface` the display it is letterboxed
/// into, `device` the native resolution input is interpreted against.
pub fn map_point(image: Size, surface: Size, device: Size, point: Point) -> Result<Point, EngineError> {
    Letterbox::fit(image, surface)
        .and_then(|lb| lb.map_point(point, device))
        .ok_or(EngineError::OutOfBounds(point))
}

/// Check that every point `event` would forward lies on the displayed
/// image. Needs no device resolution.
pub fn check_on_image(
    event: &GestureEvent,
    thresholds: &GestureThresholds,
    image: Size,
    surface: Size,
) -> Result<GestureKind, EngineError> {
    let letterbox = Letterbox::fit(image, surface);
    let on_image = |p: Point| {
        letterbox
            .and_then(|lb| lb.to_image(p))
            .map(|_| ())
            .ok_or(EngineError::OutOfBounds(p))
    };
    let kind = event.classify(thresholds);
    if kind == GestureKind::Swipe {
        on_image(event.start)?;
    }
    on_image(event.end)?;
    Ok(kind)
}

/// Classify `event` and map its points into device space.
///
/// A swipe maps both ends independently; taps and long-presses use the
/// release point. Any point in the padding rejects the whole gesture.
pub fn resolve_gesture(
    event: &GestureEvent,
    thresholds: &GestureThresholds,
    image: Size,
    surface: Size,
    device: Size,
) -> Result<Gesture, EngineError> {
    let map = |p| map_point(image, surface, device, p);
    Ok(match event.classify(thresholds) {
        GestureKind::Swipe => Gesture::Swipe {
            from: map(event.start)?,
            to: map(event.end)?,
        },
        GestureKind::LongPress => Gesture::LongPress(map(event.end)?),
        GestureKind::Tap => Gesture::Tap(map(event.end)?),
    })
}

/// The command that replays `gesture` on `serial`.
pub fn gesture_request(gesture: &Gesture, serial: DeviceSerial, timing: &GestureTiming) -> CommandRequest {
    match *gesture {
        Gesture::Tap(at) => CommandRequest::tap(serial, at),
        Gesture::LongPress(at) => CommandRequest::swipe(serial, at, at, timing.long_press_hold),
        Gesture::Swipe { from, to } => CommandRequest::swipe(serial, from, to, timing.swipe),
    }
}

/// Direction of a scroll action, named by where the content moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl std::str::FromStr for ScrollDirection {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(EngineError::InvalidArgument(format!(
                "scroll direction must be up or down, got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Swipe endpoints for a scroll on a `device`-sized screen: a vertical
/// stroke through the center column between one and three quarters of the
/// height.
pub fn scroll_points(direction: ScrollDirection, device: Size) -> (Point, Point) {
    let x = i32::try_from(device.width / 2).unwrap_or(i32::MAX);
    let quarter = i32::try_from(device.height / 4).unwrap_or(i32::MAX);
    let three_quarters = quarter.saturating_mul(3);
    match direction {
        ScrollDirection::Down => (Point::new(x, quarter), Point::new(x, three_quarters)),
        ScrollDirection::Up => (Point::new(x, three_quarters), Point::new(x, quarter)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const DEVICE: Size = Size {
        width: 1080,
        height: 1920,
    };
    const SURFACE: Size = Size {
        width: 600,
        height: 800,
    };

    fn event(start: (i32, i32), end: (i32, i32), held_ms: u64) -> GestureEvent {
        let t0 = Instant::now();
        GestureEvent::new(
            Point::new(start.0, start.1),
            t0,
            Point::new(end.0, end.1),
            t0 + Duration::from_millis(held_ms),
        )
    }

    #[test]
    fn center_maps_to_center() {
        let p = map_point(DEVICE, SURFACE, DEVICE, Point::new(300, 400)).unwrap();
        assert_eq!(p, Point::new(540, 960));
    }

    #[test]
    fn padding_is_out_of_bounds() {
        let err = map_point(DEVICE, SURFACE, DEVICE, Point::new(10, 400)).unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds(p) if p == Point::new(10, 400)));
    }

    #[test]
    fn tap_uses_release_point() {
        let g = resolve_gesture(
            &event((300, 400), (305, 400), 100),
            &GestureThresholds::default(),
            DEVICE,
            SURFACE,
            DEVICE,
        )
        .unwrap();
        assert_eq!(g, Gesture::Tap(Point::new(552, 960)));
    }

    #[test]
    fn swipe_maps_both_ends() {
        let g = resolve_gesture(
            &event((300, 100), (300, 700), 200),
            &GestureThresholds::default(),
            DEVICE,
            SURFACE,
            DEVICE,
        )
        .unwrap();
        assert_eq!(
            g,
            Gesture::Swipe {
                from: Point::new(540, 240),
                to: Point::new(540, 1680)
            }
        );
    }

    #[test]
    fn swipe_ending_in_padding_is_rejected() {
        let result = resolve_gesture(
            &event((300, 400), (20, 400), 200),
            &GestureThresholds::default(),
            DEVICE,
            SURFACE,
            DEVICE,
        );
        assert!(matches!(result, Err(EngineError::OutOfBounds(_))));
    }

    #[test]
    fn image_check_uses_forwarded_points_only() {
        let thresholds = GestureThresholds::default();
        // Tap released on the image after pressing in the padding is fine.
        let tap = event((20, 400), (30, 400), 50);
        assert_eq!(
            check_on_image(&tap, &thresholds, DEVICE, SURFACE).unwrap(),
            GestureKind::Tap
        );
        // A swipe starting in the padding is not.
        let swipe = event((20, 400), (300, 400), 50);
        assert!(matches!(
            check_on_image(&swipe, &thresholds, DEVICE, SURFACE),
            Err(EngineError::OutOfBounds(p)) if p == Point::new(20, 400)
        ));
    }

    #[test]
    fn replay_commands() {
        let timing = GestureTiming::default();
        let at = Point::new(5, 6);

        let tap = gesture_request(&Gesture::Tap(at), "a".into(), &timing);
        assert_eq!(tap.args, ["shell", "input", "tap", "5", "6"]);

        let hold = gesture_request(&Gesture::LongPress(at), "a".into(), &timing);
        assert_eq!(hold.args, ["shell", "input", "swipe", "5", "6", "5", "6", "1000"]);

        let swipe = gesture_request(
            &Gesture::Swipe {
                from: at,
                to: Point::new(7, 8),
            },
            "a".into(),
            &timing,
        );
        assert_eq!(swipe.args, ["shell", "input", "swipe", "5", "6", "7", "8", "300"]);
    }

    #[test]
    fn scroll_between_quarters() {
        let (from, to) = scroll_points(ScrollDirection::Down, DEVICE);
        assert_eq!((from, to), (Point::new(540, 480), Point::new(540, 1440)));
        let (from, to) = scroll_points(ScrollDirection::Up, DEVICE);
        assert_eq!((from, to), (Point::new(540, 1440), Point::new(540, 480)));
    }

    #[test]
    fn parse_direction() {
        assert_eq!("UP".parse::<ScrollDirection>().unwrap(), ScrollDirection::Up);
        assert!("left".parse::<ScrollDirection>().is_err());
    }
}
