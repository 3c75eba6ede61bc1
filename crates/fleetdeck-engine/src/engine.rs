//! Core engine orchestration.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use fleetdeck_pool::DataPool;
use fleetdeck_runner::{AdbRunner, CommandRunner};
use fleetdeck_types::{
    keycode, BatchId, CommandRequest, DeviceSerial, GestureEvent, Letterbox, Point, Size,
};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::capture::{CaptureStream, CaptureTiming, DisplaySurface};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, Job, Step};
use crate::error::EngineError;
use crate::mirror::{self, GestureTiming, ScrollDirection};
use crate::report::BatchReport;
use crate::state::{CaptureState, EngineStatus};

/// Outcome of sending pool values to the fleet.
#[derive(Debug)]
pub struct PoolSendReport {
    pub pool: String,
    pub report: BatchReport,
    /// Distinct entries left in the pool after allocation.
    pub remaining: usize,
}

impl PoolSendReport {
    pub fn status_line(&self) -> String {
        format!(
            "{}: sent to {} of {} devices, {} left",
            self.pool,
            self.report.succeeded(),
            self.report.total(),
            self.remaining
        )
    }
}

/// The fleet engine: active devices, the dispatcher, and screen mirroring.
pub struct Engine {
    config: Config,
    dispatcher: Dispatcher,
    capture: CaptureStream,
    gestures: GestureTiming,
    devices: RwLock<Vec<DeviceSerial>>,
    selected: RwLock<Option<DeviceSerial>>,
    allocation: Mutex<()>,
    status: watch::Sender<EngineStatus>,
}

impl Engine {
    /// Create an engine driving `runner`.
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        let workers = Dispatcher::workers_for(config.engine.workers_per_core);
        let (status, _) = watch::channel(EngineStatus::default());
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&runner), workers),
            capture: CaptureStream::new(runner, CaptureTiming::from(&config.capture)),
            gestures: GestureTiming::from(&config.gesture),
            devices: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
            allocation: Mutex::new(()),
            status,
            config,
        }
    }

    /// Create an engine that shells out to the configured tool.
    pub fn with_tool(config: Config) -> Self {
        let runner = AdbRunner::new(config.tool.program.clone())
            .with_poll_interval(config.tool.poll_interval());
        Self::new(config, Arc::new(runner))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn capture(&self) -> &CaptureStream {
        &self.capture
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.dispatcher.runner().as_ref()
    }

    // -----------------------------------------------------------------------
    // Devices
    // -----------------------------------------------------------------------

    /// Re-run discovery. Stops any capture and selects the first device.
    pub async fn refresh_devices(&self) -> Result<Vec<DeviceSerial>, EngineError> {
        self.capture.stop();
        let cancel = self.dispatcher.signal().token();
        let found = fleetdeck_discovery::discover(self.runner(), &cancel).await?;
        self.set_devices(found.clone());
        let line = if found.is_empty() {
            "no devices found".to_string()
        } else {
            format!("{} devices connected", found.len())
        };
        self.publish(line);
        Ok(found)
    }

    /// Replace the active set without discovery.
    pub fn set_devices(&self, devices: Vec<DeviceSerial>) {
        let first = devices.first().cloned();
        let count = devices.len();
        *self.devices.write().unwrap_or_else(PoisonError::into_inner) = devices;
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = first.clone();
        self.status.send_modify(|s| {
            s.devices = count;
            s.selected = first;
        });
    }

    pub fn devices(&self) -> Vec<DeviceSerial> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn selected(&self) -> Option<DeviceSerial> {
        self.selected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Choose the device to mirror. Stops a capture of another device.
    pub fn select(&self, serial: &DeviceSerial) -> Result<(), EngineError> {
        if !self.devices().contains(serial) {
            return Err(EngineError::UnknownDevice(serial.clone()));
        }
        if self.capture.serial().as_ref() != Some(serial) {
            self.capture.stop();
        }
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = Some(serial.clone());
        self.status.send_modify(|s| s.selected = Some(serial.clone()));
        Ok(())
    }

    fn active_devices(&self) -> Result<Vec<DeviceSerial>, EngineError> {
        let devices = self.devices();
        if devices.is_empty() {
            return Err(EngineError::NoDevices);
        }
        Ok(devices)
    }

    fn selected_device(&self) -> Result<DeviceSerial, EngineError> {
        self.selected().ok_or(EngineError::NoDeviceSelected)
    }

    fn publish(&self, message: String) {
        self.status.send_modify(|s| s.message = message);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Run arbitrary jobs, one result per job.
    pub async fn dispatch(&self, action: &str, jobs: Vec<Job>) -> BatchReport {
        let batch = BatchId::new();
        let results = self.dispatcher.dispatch_batch(batch, jobs).await;
        let report = BatchReport::new(batch, action, results);
        info!(batch = %batch, status = %report.status_line(), "fleet action done");
        self.publish(report.status_line());
        report
    }

    /// Send one job per active device.
    async fn broadcast<F>(&self, action: &str, job_for: F) -> Result<BatchReport, EngineError>
    where
        F: Fn(DeviceSerial) -> Job,
    {
        let devices = self.active_devices()?;
        let jobs = devices.into_iter().map(job_for).collect();
        Ok(self.dispatch(action, jobs).await)
    }

    fn general(&self, request: CommandRequest) -> CommandRequest {
        request.with_timeout(self.config.tool.command_timeout())
    }

    /// Cancel everything in flight and wait for it to drain.
    pub async fn stop_all(&self) {
        self.publish("terminating all active commands".to_string());
        self.dispatcher.stop_all().await;
        self.publish("all operations terminated".to_string());
    }

    // -----------------------------------------------------------------------
    // Fleet actions
    // -----------------------------------------------------------------------

    pub async fn send_key(&self, code: u32) -> Result<BatchReport, EngineError> {
        self.broadcast(keycode::name(code), |s| {
            self.general(CommandRequest::key_event(s, code)).into()
        })
        .await
    }

    pub async fn reboot(&self) -> Result<BatchReport, EngineError> {
        self.broadcast("REBOOT", |s| self.general(CommandRequest::reboot(s)).into())
            .await
    }

    pub async fn power_off(&self) -> Result<BatchReport, EngineError> {
        self.broadcast("POWER OFF", |s| {
            self.general(CommandRequest::power_off(s)).into()
        })
        .await
    }

    /// Install (or reinstall) an APK on every device.
    pub async fn install(&self, apk: &Path) -> Result<BatchReport, EngineError> {
        if !apk.is_file() {
            return Err(EngineError::InvalidArgument(format!(
                "APK not found: {}",
                apk.display()
            )));
        }
        let apk = apk.display().to_string();
        self.broadcast("INSTALL", |s| {
            self.general(CommandRequest::install(s, &apk)).into()
        })
        .await
    }

    /// Switch to manual brightness, then set `level` (clamped to 0..=255).
    pub async fn set_brightness(&self, level: i64) -> Result<BatchReport, EngineError> {
        let level = level.clamp(0, 255).to_string();
        self.broadcast("BRIGHTNESS", |s| {
            Job::sequence(
                s.clone(),
                vec![
                    Step::Run(self.general(CommandRequest::settings_put(
                        s.clone(),
                        "system",
                        "screen_brightness_mode",
                        "0",
                    ))),
                    Step::Run(self.general(CommandRequest::settings_put(
                        s,
                        "system",
                        "screen_brightness",
                        &level,
                    ))),
                ],
            )
        })
        .await
    }

    /// Run `shell <command>` on every device. Split on whitespace.
    pub async fn shell(&self, command: &str) -> Result<BatchReport, EngineError> {
        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            return Err(EngineError::InvalidArgument(
                "shell command is empty".to_string(),
            ));
        }
        self.broadcast("SHELL", |s| {
            self.general(CommandRequest::shell(s, args.iter().copied())).into()
        })
        .await
    }

    /// Tap device-native coordinates on every device.
    pub async fn tap(&self, at: Point) -> Result<BatchReport, EngineError> {
        self.broadcast("TAP", |s| self.general(CommandRequest::tap(s, at)).into())
            .await
    }

    /// Scroll every device, sized from the selected device's screen.
    pub async fn scroll(&self, direction: ScrollDirection) -> Result<BatchReport, EngineError> {
        let selected = self.selected_device()?;
        let device = self.resolve_resolution(&selected).await?;
        let (from, to) = mirror::scroll_points(direction, device);
        let swipe = self.gestures.swipe;
        self.broadcast(&format!("{direction} SCROLL"), |s| {
            self.general(CommandRequest::swipe(s, from, to, swipe)).into()
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Pools
    // -----------------------------------------------------------------------

    fn pool(&self, name: &str) -> Result<DataPool, EngineError> {
        let def = self
            .config
            .pool(name)
            .ok_or_else(|| EngineError::UnknownPool(name.to_string()))?;
        Ok(DataPool::new(&def.path, def.kind))
    }

    /// Distinct entries left in the named pool.
    pub fn pool_status(&self, name: &str) -> Result<usize, EngineError> {
        Ok(self.pool(name)?.remaining()?)
    }

    /// Give every device a distinct value from the named pool, type it, and
    /// confirm with ENTER.
    pub async fn send_pool_values(&self, name: &str) -> Result<PoolSendReport, EngineError> {
        let pool = self.pool(name)?;
        let devices = self.active_devices()?;

        let allocation = {
            let _guard = self.allocation.lock().await;
            let picked = tokio::task::spawn_blocking(move || pool.allocate(&devices)).await?;
            match picked {
                Ok(allocation) => allocation,
                Err(e) => {
                    warn!(pool = %name, error = %e, "allocation failed");
                    self.publish(format!("{name}: {e}"));
                    return Err(e.into());
                }
            }
        };

        let confirm_delay = self.config.engine.confirm_delay();
        let jobs = allocation
            .assignments
            .into_iter()
            .map(|(serial, value)| {
                Job::sequence(
                    serial.clone(),
                    vec![
                        Step::TypeText(value),
                        Step::Pause(confirm_delay),
                        Step::Run(self.general(CommandRequest::key_event(serial, keycode::ENTER))),
                    ],
                )
            })
            .collect();

        let report = self.dispatch(&name.to_uppercase(), jobs).await;
        let sent = PoolSendReport {
            pool: name.to_string(),
            report,
            remaining: allocation.remaining,
        };
        self.publish(sent.status_line());
        Ok(sent)
    }

    // -----------------------------------------------------------------------
    // Mirroring
    // -----------------------------------------------------------------------

    /// Start mirroring the selected device onto `surface`.
    pub fn start_capture(&self, surface: Arc<dyn DisplaySurface>) -> Result<(), EngineError> {
        let serial = self.selected_device()?;
        self.capture.start(serial.clone(), surface)?;
        self.publish(format!("mirroring {serial}"));
        Ok(())
    }

    pub fn stop_capture(&self) {
        self.capture.stop();
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    /// Native resolution of `serial` via `wm size`.
    pub async fn resolve_resolution(&self, serial: &DeviceSerial) -> Result<Size, EngineError> {
        let request = CommandRequest::screen_size(serial.clone())
            .with_timeout(self.config.tool.resolution_timeout());
        let cancel = self.dispatcher.signal().token();
        let unresolvable = |reason: String| EngineError::DeviceUnresolvable {
            serial: serial.clone(),
            reason,
        };
        let stdout = self
            .runner()
            .run(&request, &cancel)
            .await
            .map_err(|e| unresolvable(e.to_string()))?;
        let size = Size::from_wm_size(&String::from_utf8_lossy(&stdout))
            .map_err(|e| unresolvable(e.to_string()))?;
        if size.is_empty() {
            return Err(unresolvable(format!("reported size {size}")));
        }
        Ok(size)
    }

    /// Map a point on a `surface`-sized display of the last frame to the
    /// selected device's native pixels.
    pub async fn map_point(&self, point: Point, surface: Size) -> Result<Point, EngineError> {
        let selected = self.selected_device()?;
        let image = self.capture.last_frame_size().ok_or(EngineError::NoFrame)?;
        // Reject padding before the resolution query.
        Letterbox::fit(image, surface)
            .and_then(|lb| lb.to_image(point))
            .ok_or(EngineError::OutOfBounds(point))?;
        let device = self.resolve_resolution(&selected).await?;
        mirror::map_point(image, surface, device, point)
    }

    /// Classify a pointer gesture on the mirror and replay it on every
    /// device.
    pub async fn handle_gesture(
        &self,
        event: &GestureEvent,
        surface: Size,
    ) -> Result<BatchReport, EngineError> {
        let selected = self.selected_device()?;
        let image = self.capture.last_frame_size().ok_or(EngineError::NoFrame)?;
        let thresholds = self.gestures.thresholds;

        if let Err(e) = mirror::check_on_image(event, &thresholds, image, surface) {
            let kind = event.classify(&thresholds);
            self.publish(format!("{kind} ignored (outside screen area)"));
            return Err(e);
        }
        let device = self.resolve_resolution(&selected).await?;
        let gesture = mirror::resolve_gesture(event, &thresholds, image, surface, device)?;
        let timing = self.gestures;
        self.broadcast(&gesture.kind().to_string(), |s| {
            self.general(mirror::gesture_request(&gesture, s, &timing)).into()
        })
        .await
    }
}
