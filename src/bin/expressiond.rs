//! expressiond - live expression feedback daemon
//!
//! Loads the inference gateway, opens the configured camera, runs the
//! detect/render/feedback loop and shows the status badge on stderr until
//! interrupted or `--seconds` elapse.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use expression_feedback::config::{AppConfig, BackendKind};
use expression_feedback::{
    shared_camera, shared_gateway, shared_renderer, Facing, LifecycleController, LogOverlay,
    LoopState, SharedCamera, SharedGateway, StubGateway, SyntheticCamera, SyntheticCameraConfig,
};

#[path = "../ui.rs"]
mod ui;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// FER+ classifiers take 64x64 grayscale input.
#[cfg(feature = "backend-tract")]
const TRACT_INPUT_SIDE: usize = 64;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (overrides EXPRESSION_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop after this many seconds. Runs until Ctrl-C when omitted.
    #[arg(long)]
    seconds: Option<u64>,
    /// Output mode: auto, plain, pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => AppConfig::load_from(Some(path))?,
        None => AppConfig::load()?,
    };
    let pools = cfg.load_pools()?;
    let gateway = build_gateway(cfg.backend)?;
    let camera = build_camera(&cfg)?;

    let controller = LifecycleController::new(
        gateway,
        camera,
        shared_renderer(LogOverlay::new()),
        pools,
        cfg.loop_settings(),
    )
    .on_models_ready(Arc::new(|| log::info!("models ready")));

    let stop = controller.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping");
        stop.request_stop();
    })?;

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);
    let mut badge = ui.badge();

    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));
    let status = controller.status();
    controller.start()?;

    loop {
        badge.show(&status.display_text());
        if controller
            .wait_for_state(LoopState::is_finished, POLL_INTERVAL)
            .is_some()
        {
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("run time elapsed, stopping");
            break;
        }
    }

    controller.stop();
    let final_state = controller.state();
    badge.show(&status.display_text());
    badge.finish(&format!("session {}", final_state));

    match final_state {
        LoopState::Failed(reason) => Err(anyhow!("session failed: {}", reason)),
        _ => Ok(()),
    }
}

fn build_gateway(backend: BackendKind) -> Result<SharedGateway> {
    match backend {
        BackendKind::Stub => Ok(shared_gateway(StubGateway::new())),
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => Ok(shared_gateway(expression_feedback::TractGateway::new(
            TRACT_INPUT_SIDE,
        ))),
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => Err(anyhow!(
            "tract backend requires building with --features backend-tract"
        )),
    }
}

fn build_camera(cfg: &AppConfig) -> Result<SharedCamera> {
    let device = cfg.camera.device.as_str();
    if device.starts_with("stub://") {
        return Ok(shared_camera(SyntheticCamera::new(SyntheticCameraConfig {
            name: device.to_string(),
            width: cfg.camera.width,
            height: cfg.camera.height,
            facings: vec![Facing::User, Facing::Environment],
            ..SyntheticCameraConfig::default()
        })));
    }

    #[cfg(feature = "capture-v4l2")]
    {
        if device.starts_with("/dev/") {
            return Ok(shared_camera(expression_feedback::V4l2Camera::new(
                device,
                cfg.refresh_hz.min(30),
            )));
        }
    }

    Err(anyhow!(
        "unsupported camera '{}' (use stub://<name> or a /dev/video* path with capture-v4l2)",
        device
    ))
}
