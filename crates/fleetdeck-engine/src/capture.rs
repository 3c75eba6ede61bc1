//! Screen mirroring: a snapshot producer and a fixed-tick display consumer.
//!
//! The two loops share a single-slot `watch` channel. The producer overwrites
//! the slot with every snapshot; the consumer takes at most one frame per
//! tick, so a slow display drops frames instead of queueing them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fleetdeck_runner::CommandRunner;
use fleetdeck_types::{CommandRequest, DeviceSerial, Letterbox, Size};
use image::imageops::FilterType;
use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::EngineError;
use crate::state::CaptureState;

/// A frame scaled for display, with the geometry needed to map points back.
#[derive(Debug, Clone)]
pub struct DisplayedFrame {
    pub image: RgbaImage,
    /// Size of the snapshot as the device produced it.
    pub source: Size,
    pub letterbox: Letterbox,
}

/// Where mirrored frames are shown.
pub trait DisplaySurface: Send + Sync + 'static {
    /// Current drawable size, or `None` once the surface is gone.
    fn size(&self) -> Option<Size>;

    /// Replace the displayed image.
    fn present(&self, frame: DisplayedFrame);
}

/// Headless surface that keeps the latest frame in memory.
#[derive(Debug)]
pub struct MemorySurface {
    size: Mutex<Option<Size>>,
    latest: Mutex<Option<DisplayedFrame>>,
    presented: Mutex<usize>,
}

impl MemorySurface {
    pub fn new(size: Size) -> Self {
        Self {
            size: Mutex::new(Some(size)),
            latest: Mutex::new(None),
            presented: Mutex::new(0),
        }
    }

    pub fn resize(&self, size: Size) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner) = Some(size);
    }

    /// Mark the surface as gone; ticks skip it from now on.
    pub fn close(&self) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn latest(&self) -> Option<DisplayedFrame> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many frames were presented.
    pub fn presented(&self) -> usize {
        *self.presented.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySurface for MemorySurface {
    fn size(&self) -> Option<Size> {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn present(&self, frame: DisplayedFrame) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
        *self.presented.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// [`render`] on the blocking pool, off the capture tick's worker.
pub async fn render_blocking(
    bytes: Arc<Vec<u8>>,
    surface: Size,
) -> Result<Option<DisplayedFrame>, EngineError> {
    tokio::task::spawn_blocking(move || render(&bytes, surface)).await?
}

/// Decode `bytes` and scale them to fit `surface` without cropping.
///
/// Returns `Ok(None)` when the frame would collapse to nothing on this
/// surface.
pub fn render(bytes: &[u8], surface: Size) -> Result<Option<DisplayedFrame>, EngineError> {
    let decoded = image::load_from_memory(bytes)?;
    let source = Size::new(decoded.width(), decoded.height());
    let Some(letterbox) = Letterbox::fit(source, surface) else {
        return Ok(None);
    };
    let image = decoded
        .resize_exact(
            letterbox.effective.width,
            letterbox.effective.height,
            FilterType::Triangle,
        )
        .to_rgba8();
    Ok(Some(DisplayedFrame {
        image,
        source,
        letterbox,
    }))
}

struct Session {
    serial: DeviceSerial,
    link: SessionLink,
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

/// What a session's loops hold to report failure. Failures from a session
/// that has since been replaced are ignored.
#[derive(Clone)]
struct SessionLink {
    state: Arc<watch::Sender<CaptureState>>,
    current: Arc<AtomicU64>,
    generation: u64,
    cancel: CancellationToken,
}

impl SessionLink {
    /// Fail the session: back to `Idle` if it is still the current one, and
    /// both of its loops told to stop.
    fn fail(&self) {
        self.cancel.cancel();
        self.state.send_if_modified(|state| {
            if self.current.load(Ordering::SeqCst) != self.generation || !state.is_capturing() {
                return false;
            }
            *state = CaptureState::Idle;
            true
        });
    }
}

/// Timing for one capture session.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTiming {
    pub interval: Duration,
    pub tick: Duration,
    pub snapshot_timeout: Duration,
}

impl From<&CaptureConfig> for CaptureTiming {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            interval: config.interval(),
            tick: config.tick(),
            snapshot_timeout: config.snapshot_timeout(),
        }
    }
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// Mirrors one device at a time onto a [`DisplaySurface`].
pub struct CaptureStream {
    runner: Arc<dyn CommandRunner>,
    timing: CaptureTiming,
    state: Arc<watch::Sender<CaptureState>>,
    generation: Arc<AtomicU64>,
    session: Mutex<Option<Session>>,
    last_source: Arc<Mutex<Option<Size>>>,
}

impl CaptureStream {
    pub fn new(runner: Arc<dyn CommandRunner>, timing: CaptureTiming) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        Self {
            runner,
            timing,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            session: Mutex::new(None),
            last_source: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Device being mirrored, if capturing.
    pub fn serial(&self) -> Option<DeviceSerial> {
        if !self.state().is_capturing() {
            return None;
        }
        self.lock_session().as_ref().map(|s| s.serial.clone())
    }

    /// Source size of the most recently displayed frame.
    pub fn last_frame_size(&self) -> Option<Size> {
        *self.last_source.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin mirroring `serial` onto `surface`. Only valid from `Idle`.
    pub fn start(
        &self,
        serial: DeviceSerial,
        surface: Arc<dyn DisplaySurface>,
    ) -> Result<(), EngineError> {
        let mut session = self.lock_session();
        if !self.state().can_start() {
            return Err(EngineError::AlreadyCapturing);
        }
        if let Some(old) = session.take() {
            old.shut_down();
        }

        let link = SessionLink {
            state: Arc::clone(&self.state),
            current: Arc::clone(&self.generation),
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            cancel: CancellationToken::new(),
        };
        let (frame_tx, frame_rx) = watch::channel::<Option<Arc<Vec<u8>>>>(None);
        *self.last_source.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.send_replace(CaptureState::Capturing);

        let producer = tokio::spawn(produce(
            Arc::clone(&self.runner),
            serial.clone(),
            self.timing,
            frame_tx,
            link.clone(),
        ));
        let consumer = tokio::spawn(consume(
            frame_rx,
            surface,
            self.timing.tick,
            Arc::clone(&self.last_source),
            link.clone(),
        ));

        info!(serial = %serial, generation = link.generation, "capture started");
        *session = Some(Session {
            serial,
            link,
            producer,
            consumer,
        });
        Ok(())
    }

    /// Stop both loops and drop any undelivered frame. Idempotent.
    pub fn stop(&self) {
        let session = self.lock_session().take();
        if let Some(session) = session {
            debug!(serial = %session.serial, "capture stopping");
            session.shut_down();
        }
        self.state.send_replace(CaptureState::Idle);
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Session {
    fn shut_down(self) {
        self.link.cancel.cancel();
        self.producer.abort();
        self.consumer.abort();
    }
}

async fn produce(
    runner: Arc<dyn CommandRunner>,
    serial: DeviceSerial,
    timing: CaptureTiming,
    frames: watch::Sender<Option<Arc<Vec<u8>>>>,
    link: SessionLink,
) {
    let cancel = &link.cancel;
    let request = CommandRequest::screencap(serial.clone()).with_timeout(timing.snapshot_timeout);
    while !cancel.is_cancelled() {
        match runner.run(&request, cancel).await {
            Ok(bytes) => {
                frames.send_replace(Some(Arc::new(bytes)));
            }
            Err(e) if e.is_timeout() => {
                debug!(serial = %serial, "snapshot timed out, retrying");
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                warn!(serial = %serial, error = %e, "snapshot failed, stopping capture");
                link.fail();
                break;
            }
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(timing.interval) => {}
        }
    }
}

async fn consume(
    mut frames: watch::Receiver<Option<Arc<Vec<u8>>>>,
    surface: Arc<dyn DisplaySurface>,
    tick: Duration,
    last_source: Arc<Mutex<Option<Size>>>,
    link: SessionLink,
) {
    let cancel = &link.cancel;
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(surface_size) = surface.size() else {
            continue;
        };
        match frames.has_changed() {
            Ok(true) => {}
            Ok(false) => continue,
            Err(_) => break,
        }
        let Some(bytes) = frames.borrow_and_update().clone() else {
            continue;
        };
        match render_blocking(bytes, surface_size).await {
            Ok(Some(frame)) => {
                *last_source.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.source);
                surface.present(frame);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "undecodable frame, stopping capture");
                link.fail();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgba};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([10, 20, 30, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn render_letterboxes() {
        let frame = render(&png(108, 192), Size::new(60, 80)).unwrap().unwrap();
        assert_eq!(frame.source, Size::new(108, 192));
        assert_eq!(frame.letterbox.effective, Size::new(45, 80));
        assert_eq!(frame.image.dimensions(), (45, 80));
        assert_eq!(frame.letterbox.offset_x, 7);
    }

    #[test]
    fn render_rejects_garbage() {
        assert!(matches!(
            render(b"not a png", Size::new(10, 10)),
            Err(EngineError::Decode(_))
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_render_reports_decode_errors() {
        let frame = render_blocking(Arc::new(png(108, 192)), Size::new(60, 80))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.image.dimensions(), (45, 80));
        assert!(matches!(
            render_blocking(Arc::new(b"garbage".to_vec()), Size::new(10, 10)).await,
            Err(EngineError::Decode(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn late_failure_from_replaced_session_is_ignored() {
        let runner = fleetdeck_runner::mock::MockRunner::new();
        runner.on(&["exec-out"], fleetdeck_runner::mock::MockReply::Stdout(png(4, 4)));
        let stream = CaptureStream::new(Arc::new(runner), CaptureTiming::default());
        let surface = Arc::new(MemorySurface::new(Size::new(10, 10)));

        stream.start("a".into(), surface.clone()).unwrap();
        let old = stream.lock_session().as_ref().unwrap().link.clone();
        stream.stop();
        stream.start("a".into(), surface).unwrap();

        old.fail();
        assert_eq!(stream.state(), CaptureState::Capturing);
        assert!(old.cancel.is_cancelled());

        let current = stream.lock_session().as_ref().unwrap().link.clone();
        current.fail();
        assert_eq!(stream.state(), CaptureState::Idle);
        stream.stop();
    }

    #[test]
    fn memory_surface_tracks_frames() {
        let surface = MemorySurface::new(Size::new(10, 10));
        assert!(surface.latest().is_none());
        let frame = render(&png(4, 4), Size::new(10, 10)).unwrap().unwrap();
        surface.present(frame);
        assert_eq!(surface.presented(), 1);
        surface.close();
        assert_eq!(surface.size(), None);
    }
}
