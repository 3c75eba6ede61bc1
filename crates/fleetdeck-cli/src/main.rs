//! fleetdeck CLI: drive every attached Android device at once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use fleetdeck_engine::{setup, BatchReport, Engine, EngineError, MemorySurface, ScrollDirection};
use fleetdeck_types::{keycode, DeviceSerial, GestureEvent, Point, Size};
use image::ImageFormat;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(
    name = "fleetdeck",
    about = "Control a fleet of Android devices over adb",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only address these devices (repeatable). Defaults to every connected
    /// device; the first one listed is selected for mirroring.
    #[arg(short, long = "serial", global = true)]
    serials: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected devices.
    Devices,

    /// Press a key on every device.
    Key {
        #[arg(value_enum)]
        key: KeyName,
    },

    /// Run a shell command on every device.
    Shell {
        /// Command and arguments, split on whitespace.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Install or reinstall an APK on every device.
    Install { apk: PathBuf },

    /// Reboot every device.
    Reboot,

    /// Power off every device.
    Poweroff,

    /// Set screen brightness (0 to 255) on every device.
    Brightness {
        #[arg(allow_negative_numbers = true)]
        level: i64,
    },

    /// Scroll every device, sized from the selected device's screen.
    Scroll { direction: ScrollDirection },

    /// Tap device coordinates on every device.
    Tap {
        /// Point as `X,Y` in device pixels.
        #[arg(value_parser = parse_point)]
        at: Point,
    },

    /// Type a distinct value from a pool on every device, then press ENTER.
    SendPool { pool: String },

    /// Show how many values a pool has left.
    PoolStatus { pool: String },

    /// Mirror the selected device for a while and save the last frame.
    Mirror {
        /// How long to mirror, in seconds.
        #[arg(long, default_value_t = 3)]
        seconds: u64,

        /// Size of the headless display surface.
        #[arg(long, default_value = "540x960")]
        surface: Size,

        /// Where to write the last displayed frame (always PNG).
        #[arg(short, long, default_value = "mirror.png")]
        output: PathBuf,

        /// Tap this surface point (`X,Y`) on every device once a frame is
        /// shown.
        #[arg(long, value_parser = parse_point)]
        tap: Option<Point>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyName {
    Home,
    Back,
    Recents,
    Power,
    Enter,
    Mute,
    VolUp,
    VolDown,
}

impl KeyName {
    fn code(self) -> u32 {
        match self {
            Self::Home => keycode::HOME,
            Self::Back => keycode::BACK,
            Self::Recents => keycode::RECENTS,
            Self::Power => keycode::POWER,
            Self::Enter => keycode::ENTER,
            Self::Mute => keycode::VOLUME_MUTE,
            Self::VolUp => 24,
            Self::VolDown => 25,
        }
    }
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in {s:?}: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in {s:?}: {e}"))?;
    Ok(Point::new(x, y))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = setup::load_config(cli.config.as_deref())?;

    let default_level = config.engine.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let engine = Arc::new(Engine::with_tool(config));
    spawn_status_logger(&engine);
    if !matches!(cli.command, Commands::PoolStatus { .. }) {
        select_devices(&engine, &cli.serials).await?;
    }

    tokio::select! {
        result = run(&engine, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping all operations");
            engine.stop_capture();
            engine.stop_all().await;
            bail!("interrupted")
        }
    }
}

/// Mirror status lines into the log.
fn spawn_status_logger(engine: &Engine) {
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            if !status.message.is_empty() {
                debug!(devices = status.devices, message = %status.message, "status");
            }
        }
    });
}

/// Discover devices and narrow them to `serials` when given.
async fn select_devices(engine: &Engine, serials: &[String]) -> anyhow::Result<()> {
    let found = engine.refresh_devices().await?;
    if serials.is_empty() {
        return Ok(());
    }
    let wanted: Vec<DeviceSerial> = serials.iter().map(|s| DeviceSerial::new(s.as_str())).collect();
    if let Some(missing) = wanted.iter().find(|s| !found.contains(s)) {
        return Err(EngineError::UnknownDevice(missing.clone()).into());
    }
    engine.set_devices(wanted);
    Ok(())
}

async fn run(engine: &Engine, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Devices => {
            let devices = engine.devices();
            if devices.is_empty() {
                println!("no devices found");
            }
            for serial in devices {
                println!("{serial}");
            }
            Ok(())
        }
        Commands::Key { key } => finish(engine.send_key(key.code()).await?),
        Commands::Shell { command } => finish(engine.shell(&command.join(" ")).await?),
        Commands::Install { apk } => finish(engine.install(&apk).await?),
        Commands::Reboot => finish(engine.reboot().await?),
        Commands::Poweroff => finish(engine.power_off().await?),
        Commands::Brightness { level } => finish(engine.set_brightness(level).await?),
        Commands::Scroll { direction } => finish(engine.scroll(direction).await?),
        Commands::Tap { at } => finish(engine.tap(at).await?),
        Commands::SendPool { pool } => {
            let sent = engine.send_pool_values(&pool).await?;
            print!("{}", sent.report);
            println!("{}", sent.status_line());
            ensure_success(&sent.report)
        }
        Commands::PoolStatus { pool } => {
            let remaining = engine.pool_status(&pool)?;
            println!("{pool}: {remaining} left");
            Ok(())
        }
        Commands::Mirror {
            seconds,
            surface,
            output,
            tap,
        } => mirror(engine, Duration::from_secs(seconds), surface, &output, tap).await,
    }
}

async fn mirror(
    engine: &Engine,
    duration: Duration,
    surface_size: Size,
    output: &std::path::Path,
    tap: Option<Point>,
) -> anyhow::Result<()> {
    let surface = Arc::new(MemorySurface::new(surface_size));
    engine.start_capture(surface.clone())?;
    let mut state = engine.capture().subscribe();

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut tapped = tap.is_none();
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            () = &mut deadline => break,
            changed = state.changed() => {
                if changed.is_err() || !state.borrow_and_update().is_capturing() {
                    break;
                }
            }
            _ = poll.tick() => {
                if let (false, Some(at), Some(_)) = (tapped, tap, surface.latest()) {
                    tapped = true;
                    let now = std::time::Instant::now();
                    let event = GestureEvent::new(at, now, at, now);
                    match engine.handle_gesture(&event, surface_size).await {
                        Ok(report) => print!("{report}"),
                        Err(e) => warn!(error = %e, "tap not sent"),
                    }
                }
            }
        }
    }
    let failed = !engine.capture_state().is_capturing();
    engine.stop_capture();

    let frame = surface.latest().context("no frame was displayed")?;
    save_png(&frame.image, output)?;
    info!(
        frames = surface.presented(),
        source = %frame.source,
        "mirroring finished"
    );
    println!(
        "{} frames shown, last {} saved to {}",
        surface.presented(),
        frame.source,
        output.display()
    );
    if failed {
        bail!("capture stopped early");
    }
    Ok(())
}

/// Writes PNG whatever the extension of `output` says.
fn save_png(image: &image::RgbaImage, output: &std::path::Path) -> anyhow::Result<()> {
    image
        .save_with_format(output, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", output.display()))
}

fn finish(report: BatchReport) -> anyhow::Result<()> {
    print!("{report}");
    ensure_success(&report)
}

fn ensure_success(report: &BatchReport) -> anyhow::Result<()> {
    if report.is_success() {
        Ok(())
    } else {
        bail!("{}", report.status_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("10, 20").unwrap(), Point::new(10, 20));
        assert!(parse_point("10").is_err());
        assert!(parse_point("a,b").is_err());
    }

    #[test]
    fn cli_parses_global_serials() {
        let cli = Cli::try_parse_from([
            "fleetdeck", "-s", "a", "--serial", "b", "brightness", "-5",
        ])
        .unwrap();
        assert_eq!(cli.serials, ["a", "b"]);
        assert!(matches!(cli.command, Commands::Brightness { level: -5 }));
    }

    #[test]
    fn key_names_map_to_codes() {
        assert_eq!(KeyName::Mute.code(), 164);
        assert_eq!(KeyName::Home.code(), keycode::HOME);
    }

    #[test]
    fn frame_is_saved_as_png_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let frame = image::RgbaImage::from_pixel(4, 3, image::Rgba([9, 8, 7, 255]));
        save_png(&frame, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        let back = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(back, frame);
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
