use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config::{load_settings, normalize_base_url},
    throttle::DragSample,
    ControllerEvent, DeviceCommand, DeviceController,
};
use serde_json::json;
use shared::domain::{MediaItem, MediaType};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dwarfctl", about = "Drive a DWARF II telescope through its API proxy")]
struct Args {
    /// TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the proxy API root from settings and environment.
    #[arg(long)]
    api_base_url: Option<String>,
    /// Device address on the local network.
    #[arg(long)]
    ip: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and print the device details.
    Connect,
    Camera {
        #[arg(value_enum)]
        action: CameraAction,
    },
    /// Open the camera and take one photo.
    Photo,
    Video {
        #[arg(value_enum)]
        action: Toggle,
    },
    Calibrate {
        #[arg(value_enum)]
        action: Toggle,
    },
    Stack {
        #[arg(value_enum)]
        action: Toggle,
    },
    /// Slew to a deep-sky object.
    Goto {
        #[arg(long, allow_hyphen_values = true)]
        ra: f64,
        #[arg(long, allow_hyphen_values = true)]
        dec: f64,
        #[arg(long)]
        target: String,
    },
    StopGoto,
    /// Let the device calibrate, then slew to a deep-sky object.
    OneClickGoto {
        #[arg(long, allow_hyphen_values = true)]
        ra: f64,
        #[arg(long, allow_hyphen_values = true)]
        dec: f64,
        #[arg(long)]
        target: String,
    },
    StopOneClickGoto,
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },
    /// Full-deflection motor nudge towards an angle in degrees.
    Nudge {
        #[arg(long, allow_hyphen_values = true)]
        angle: f64,
    },
    /// Replays pointer offsets `x,y` through the joystick throttler, then releases.
    Drag {
        #[arg(long, value_delimiter = ';', required = true, allow_hyphen_values = true)]
        points: Vec<String>,
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,
        #[arg(long, default_value_t = 70.0)]
        max_distance: f64,
    },
    StopMotor {
        #[arg(long, default_value_t = 0)]
        motor_id: i64,
    },
    /// Print one album page.
    Album {
        /// 0 all, 1 photos, 2 videos, 3 bursts, 4 astro, 5 panorama.
        #[arg(long)]
        media_type: Option<i64>,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Delete one album entry, then print the reloaded page.
    Delete {
        #[arg(long)]
        media_type: i64,
        #[arg(long)]
        path: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CameraAction {
    Open,
    Close,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    Start,
    Stop,
}

#[derive(Subcommand, Debug)]
enum FocusAction {
    Auto {
        #[arg(long, default_value_t = 0)]
        mode: i64,
    },
    AstroStart {
        #[arg(long)]
        fast: bool,
    },
    AstroStop,
    Step {
        #[arg(long)]
        near: bool,
    },
}

fn parse_point(raw: &str) -> Result<(f64, f64)> {
    let (x, y) = raw
        .split_once(',')
        .with_context(|| format!("point '{raw}' must look like x,y"))?;
    let x = x
        .trim()
        .parse()
        .with_context(|| format!("invalid x in point '{raw}'"))?;
    let y = y
        .trim()
        .parse()
        .with_context(|| format!("invalid y in point '{raw}'"))?;
    Ok((x, y))
}

fn log_events(controller: &DeviceController) {
    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ControllerEvent::SessionChanged(session) => info!(
                    connection = %session.connection,
                    camera = ?session.camera,
                    "session changed"
                ),
                ControllerEvent::CatalogChanged(catalog) => debug!(
                    page_index = catalog.query.page_index,
                    "album changed"
                ),
                ControllerEvent::CommandCompleted { command } => debug!(command, "command completed"),
                ControllerEvent::CommandFailed { command, message } => {
                    warn!(command, "command failed: {message}")
                }
            }
        }
    });
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(controller: Arc<DeviceController>, ip: &str, command: Command) -> Result<()> {
    let device = controller
        .connect(ip)
        .await
        .with_context(|| format!("failed to connect to {ip}"))?;

    match command {
        Command::Connect => print_json(&device)?,
        Command::Camera { action } => {
            match action {
                CameraAction::Open => controller.open_camera().await?,
                CameraAction::Close => controller.close_camera().await?,
            }
            print_json(&controller.session().await)?;
        }
        Command::Photo => {
            controller.open_camera().await?;
            controller.issue_command(DeviceCommand::TakePhoto).await?;
            print_json(&controller.catalog().await)?;
        }
        Command::Video { action } => {
            controller.open_camera().await?;
            let command = match action {
                Toggle::Start => DeviceCommand::StartVideo,
                Toggle::Stop => DeviceCommand::StopVideo,
            };
            print_json(&controller.issue_command(command).await?)?;
        }
        Command::Calibrate { action } => {
            let command = match action {
                Toggle::Start => DeviceCommand::StartCalibration,
                Toggle::Stop => DeviceCommand::StopCalibration,
            };
            print_json(&controller.issue_command(command).await?)?;
        }
        Command::Stack { action } => {
            let command = match action {
                Toggle::Start => DeviceCommand::StartStacking,
                Toggle::Stop => DeviceCommand::StopStacking,
            };
            print_json(&controller.issue_command(command).await?)?;
        }
        Command::Goto { ra, dec, target } => {
            let command = DeviceCommand::GotoDso {
                ra,
                dec,
                target_name: target,
            };
            print_json(&controller.issue_command(command).await?)?;
        }
        Command::StopGoto => print_json(&controller.issue_command(DeviceCommand::StopGoto).await?)?,
        Command::OneClickGoto { ra, dec, target } => {
            let command = DeviceCommand::OneClickGotoDso {
                ra,
                dec,
                target_name: target,
            };
            print_json(&controller.issue_command(command).await?)?;
        }
        Command::StopOneClickGoto => {
            print_json(&controller.issue_command(DeviceCommand::StopOneClickGoto).await?)?
        }
        Command::Focus { action } => {
            let command = match action {
                FocusAction::Auto { mode } => DeviceCommand::AutoFocus { mode },
                FocusAction::AstroStart { fast } => DeviceCommand::StartAstroFocus {
                    mode: i64::from(fast),
                },
                FocusAction::AstroStop => DeviceCommand::StopAstroFocus,
                FocusAction::Step { near } => DeviceCommand::ManualFocusStep {
                    direction: i64::from(near),
                },
            };
            print_json(&controller.issue_command(command).await?)?;
        }
        Command::Nudge { angle } => {
            print_json(&controller.issue_command(DeviceCommand::MoveMotor { angle }).await?)?
        }
        Command::Drag {
            points,
            interval_ms,
            max_distance,
        } => {
            let points = points
                .iter()
                .map(|raw| parse_point(raw))
                .collect::<Result<Vec<_>>>()?;
            let interval = Duration::from_millis(interval_ms);
            let mut last = None;
            for (x, y) in points {
                last = controller
                    .joystick_move(DragSample { x, y, max_distance })
                    .await?;
                tokio::time::sleep(interval).await;
            }
            // let the coalesced vector go out before stopping
            tokio::time::sleep(controller.settings().quiescence * 2).await;
            controller.joystick_release().await?;
            print_json(&json!({ "last_vector": last, "released": true }))?;
        }
        Command::StopMotor { motor_id } => {
            print_json(&controller.issue_command(DeviceCommand::StopMotor { motor_id }).await?)?
        }
        Command::Album { media_type, page } => {
            match media_type {
                Some(code) => controller.set_filter(MediaType::from(code)).await?,
                None => controller.load_page(true).await?,
            };
            while controller.catalog().await.query.page_index < page {
                if controller.next_page().await?.is_none() {
                    bail!("album has no page {page}");
                }
            }
            print_json(&controller.catalog().await)?;
        }
        Command::Delete {
            media_type,
            path,
            name,
        } => {
            let item = MediaItem {
                file_name: name,
                file_path: path,
                file_size: 0,
                media_type: MediaType::from(media_type),
                timestamp: None,
            };
            print_json(&controller.delete_item(&item).await?)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(base) = args.api_base_url.as_deref() {
        settings.api_base_url = normalize_base_url(base)?;
    }
    info!(api = %settings.api_base_url, "dwarfctl starting");

    let controller = DeviceController::new(settings);
    log_events(&controller);

    let outcome = run(controller.clone(), &args.ip, args.command).await;
    controller.disconnect().await;
    outcome
}
