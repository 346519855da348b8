//! Session lifecycle.
//!
//! `start()` spawns one session thread that runs the startup stages in order
//! (load models, notify, acquire camera, start playback) and then the
//! detection loop inline. Cancellation is checked between every stage, so
//! `stop()` is safe at any point: it cancels, joins the thread, and the thread
//! has released the camera before it exits.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::{CaptureConstraints, CaptureSession, SharedCamera};
use crate::detect::{DetectOptions, SharedGateway};
use crate::detection_loop::{DetectionLoop, DEFAULT_REFRESH_HZ, DEFAULT_SLOW_DETECT_WARNING};
use crate::error::{LifecycleError, ModelLoadError, SessionError};
use crate::feedback::{FeedbackPoolTable, FeedbackSelector, DEFAULT_FEEDBACK_INTERVAL};
use crate::render::SharedRenderer;
use crate::scheduler::{CancelToken, VsyncTicker};
use crate::status::{StatusBoard, STATUS_DETECTING, STATUS_LOADING, STATUS_REQUESTING_CAMERA};

/// Per-session settings.
#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub model_source: String,
    pub constraints: CaptureConstraints,
    pub detect: DetectOptions,
    pub refresh_hz: u32,
    pub feedback_interval: Duration,
    /// Fixed seed for feedback message choice. Entropy when `None`.
    pub feedback_seed: Option<u64>,
    pub slow_detect_warning: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            model_source: "stub://models".to_string(),
            constraints: CaptureConstraints::default(),
            detect: DetectOptions::default(),
            refresh_hz: DEFAULT_REFRESH_HZ,
            feedback_interval: DEFAULT_FEEDBACK_INTERVAL,
            feedback_seed: None,
            slow_detect_warning: DEFAULT_SLOW_DETECT_WARNING,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed(SessionError),
}

impl LoopState {
    /// A session thread exists and may hold resources.
    pub fn is_active(&self) -> bool {
        matches!(self, LoopState::Starting | LoopState::Running)
    }

    /// The last session is over, for whatever reason.
    pub fn is_finished(&self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Failed(_))
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Idle => f.write_str("idle"),
            LoopState::Starting => f.write_str("starting"),
            LoopState::Running => f.write_str("running"),
            LoopState::Stopping => f.write_str("stopping"),
            LoopState::Stopped => f.write_str("stopped"),
            LoopState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

struct StateCell {
    state: Mutex<LoopState>,
    changed: Condvar,
}

impl StateCell {
    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn get(&self) -> LoopState {
        self.lock().clone()
    }

    fn set(&self, next: LoopState) {
        let mut state = self.lock();
        log::debug!("lifecycle: {} -> {}", *state, next);
        *state = next;
        self.changed.notify_all();
    }

    /// Apply `next` only when the current state satisfies `allowed`.
    fn set_if(&self, allowed: impl FnOnce(&LoopState) -> bool, next: LoopState) -> bool {
        let mut state = self.lock();
        if !allowed(&state) {
            return false;
        }
        log::debug!("lifecycle: {} -> {}", *state, next);
        *state = next;
        self.changed.notify_all();
        true
    }
}

struct Session {
    cancel: CancelToken,
    join: JoinHandle<()>,
}

/// Everything the session thread needs, cloned out of the controller.
struct SessionContext {
    gateway: SharedGateway,
    camera: SharedCamera,
    renderer: SharedRenderer,
    pools: Arc<FeedbackPoolTable>,
    settings: LoopSettings,
    on_models_ready: Option<Arc<dyn Fn() + Send + Sync>>,
    status: StatusBoard,
    state: Arc<StateCell>,
}

/// Stop requests from other threads, e.g. a signal handler.
#[derive(Clone)]
pub struct StopHandle {
    current: Arc<Mutex<Option<CancelToken>>>,
}

impl StopHandle {
    /// Cancel the active session, if any. The session thread tears down and
    /// marks the controller `Stopped`.
    pub fn request_stop(&self) {
        let current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(cancel) = current.as_ref() {
            cancel.cancel();
        }
    }
}

pub struct LifecycleController {
    gateway: SharedGateway,
    camera: SharedCamera,
    renderer: SharedRenderer,
    pools: Arc<FeedbackPoolTable>,
    settings: LoopSettings,
    on_models_ready: Option<Arc<dyn Fn() + Send + Sync>>,
    status: StatusBoard,
    state: Arc<StateCell>,
    current: Arc<Mutex<Option<CancelToken>>>,
    session: Mutex<Option<Session>>,
}

impl LifecycleController {
    pub fn new(
        gateway: SharedGateway,
        camera: SharedCamera,
        renderer: SharedRenderer,
        pools: Arc<FeedbackPoolTable>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            gateway,
            camera,
            renderer,
            pools,
            settings,
            on_models_ready: None,
            status: StatusBoard::new(),
            state: Arc::new(StateCell {
                state: Mutex::new(LoopState::Idle),
                changed: Condvar::new(),
            }),
            current: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
        }
    }

    /// Called once per session, after models load and before the camera is
    /// requested.
    pub fn on_models_ready(mut self, callback: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_models_ready = Some(callback);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            current: self.current.clone(),
        }
    }

    /// Begin a session. Returns once the session thread is spawned; progress is
    /// observable through `state()` and `status()`.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        {
            let mut state = self.state.lock();
            match &*state {
                LoopState::Starting => return Err(LifecycleError::AlreadyActive("starting")),
                LoopState::Running => return Err(LifecycleError::AlreadyActive("running")),
                LoopState::Stopping => return Err(LifecycleError::AlreadyActive("stopping")),
                _ => {}
            }
            *state = LoopState::Starting;
            self.state.changed.notify_all();
        }

        // The previous thread has already published its final state.
        if let Some(previous) = session.take() {
            if previous.join.join().is_err() {
                log::error!("previous session thread panicked");
            }
        }

        self.status.reset(STATUS_LOADING);
        let cancel = CancelToken::new();
        let ctx = SessionContext {
            gateway: self.gateway.clone(),
            camera: self.camera.clone(),
            renderer: self.renderer.clone(),
            pools: self.pools.clone(),
            settings: self.settings.clone(),
            on_models_ready: self.on_models_ready.clone(),
            status: self.status.clone(),
            state: self.state.clone(),
        };
        let thread_cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("expression-session".to_string())
            .spawn(move || session_main(ctx, thread_cancel));
        let join = match spawned {
            Ok(join) => join,
            Err(err) => {
                self.state.set(LoopState::Idle);
                return Err(LifecycleError::Spawn(err));
            }
        };

        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(cancel.clone());
        *session = Some(Session { cancel, join });
        log::info!("lifecycle: session started");
        Ok(())
    }

    /// Cancel the session and wait for its teardown. Never fails and may be
    /// called any number of times, in any state.
    pub fn stop(&self) {
        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        let Some(Session { cancel, join }) = session.take() else {
            return;
        };
        // Cancel first: once `Stopping` is visible, no cycle may render.
        cancel.cancel();
        let was_active = self.state.set_if(LoopState::is_active, LoopState::Stopping);

        if join.join().is_err() {
            log::error!("session thread panicked");
        }
        self.state
            .set_if(|s| *s == LoopState::Stopping, LoopState::Stopped);
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = None;
        if was_active {
            log::info!("lifecycle: session stopped");
        }
    }

    /// Wait until the state satisfies `predicate` or `timeout` passes.
    /// Returns the matching state.
    pub fn wait_for_state(
        &self,
        mut predicate: impl FnMut(&LoopState) -> bool,
        timeout: Duration,
    ) -> Option<LoopState> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if predicate(&state) {
                return Some(state.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.state.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn session_main(ctx: SessionContext, cancel: CancelToken) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| run_session(&ctx, &cancel)))
        .unwrap_or_else(|_| {
            log::error!("lifecycle: session panicked");
            Err(SessionError::Panicked)
        });

    match result {
        Err(err) if !cancel.is_cancelled() => {
            ctx.status.set_error(&err);
            ctx.state.set(LoopState::Failed(err));
        }
        Err(err) => {
            log::warn!("session error after stop request ignored: {}", err);
            ctx.state.set_if(
                |s| s.is_active() || *s == LoopState::Stopping,
                LoopState::Stopped,
            );
        }
        Ok(()) => {
            ctx.state.set_if(
                |s| s.is_active() || *s == LoopState::Stopping,
                LoopState::Stopped,
            );
        }
    }
}

fn run_session(ctx: &SessionContext, cancel: &CancelToken) -> Result<(), SessionError> {
    {
        let mut gateway = ctx
            .gateway
            .lock()
            .map_err(|_| ModelLoadError::GatewayUnavailable("gateway lock poisoned".to_string()))?;
        log::info!(
            "lifecycle: loading models from {} ({})",
            ctx.settings.model_source,
            gateway.name()
        );
        gateway.init(&ctx.settings.model_source)?;
    }
    if cancel.is_cancelled() {
        log::warn!("lifecycle: startup abandoned after model load");
        return Ok(());
    }

    if let Some(callback) = &ctx.on_models_ready {
        callback();
    }
    if cancel.is_cancelled() {
        log::warn!("lifecycle: startup abandoned after models-ready callback");
        return Ok(());
    }

    ctx.status.set_status(STATUS_REQUESTING_CAMERA);
    let mut capture = CaptureSession::new(ctx.camera.clone());
    capture.acquire(&ctx.settings.constraints)?;
    if cancel.is_cancelled() {
        log::warn!("lifecycle: startup abandoned after camera acquisition");
        capture.release();
        return Ok(());
    }
    if let Err(err) = capture.play() {
        capture.release();
        return Err(err.into());
    }

    ctx.status.set_status(STATUS_DETECTING);
    if !ctx
        .state
        .set_if(|s| *s == LoopState::Starting, LoopState::Running)
    {
        capture.release();
        return Ok(());
    }

    let selector = match ctx.settings.feedback_seed {
        Some(seed) => {
            FeedbackSelector::with_seed(ctx.pools.clone(), ctx.settings.feedback_interval, seed)
        }
        None => FeedbackSelector::new(ctx.pools.clone(), ctx.settings.feedback_interval),
    };
    let mut detection = DetectionLoop::new(
        ctx.gateway.clone(),
        ctx.renderer.clone(),
        selector,
        ctx.status.clone(),
    )
    .with_scheduler(VsyncTicker::new(ctx.settings.refresh_hz))
    .with_options(ctx.settings.detect)
    .with_slow_detect_warning(ctx.settings.slow_detect_warning);

    let result = detection.run(&mut capture, cancel);
    capture.pause();
    capture.release();

    let exit = result?;
    log::info!(
        "lifecycle: loop ended after {} cycles ({} rendered)",
        exit.cycles,
        exit.rendered
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{shared_camera, SyntheticCamera, SyntheticCameraConfig};
    use crate::detect::{shared_gateway, StubGateway};
    use crate::render::{shared_renderer, LogOverlay};

    fn controller() -> (LifecycleController, crate::capture::CameraProbe) {
        let camera = SyntheticCamera::new(SyntheticCameraConfig {
            width: 64,
            height: 48,
            ..SyntheticCameraConfig::default()
        });
        let probe = camera.probe();
        let controller = LifecycleController::new(
            shared_gateway(StubGateway::new()),
            shared_camera(camera),
            shared_renderer(LogOverlay::new()),
            Arc::new(FeedbackPoolTable::default()),
            LoopSettings {
                refresh_hz: 500,
                ..LoopSettings::default()
            },
        );
        (controller, probe)
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        let (controller, probe) = controller();
        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), LoopState::Idle);
        assert_eq!(probe.opens(), 0);
    }

    #[test]
    fn start_run_stop() {
        let (controller, probe) = controller();
        controller.start().unwrap();
        assert!(matches!(
            controller.start(),
            Err(LifecycleError::AlreadyActive(_))
        ));
        let state = controller.wait_for_state(|s| *s == LoopState::Running, Duration::from_secs(5));
        assert_eq!(state, Some(LoopState::Running));
        assert_eq!(controller.status().snapshot().status, STATUS_DETECTING);

        controller.stop();
        assert_eq!(controller.state(), LoopState::Stopped);
        assert_eq!(probe.live_tracks(), 0);
        controller.stop();
        assert_eq!(controller.state(), LoopState::Stopped);
    }

    #[test]
    fn restart_after_stop() {
        let (controller, probe) = controller();
        for _ in 0..2 {
            controller.start().unwrap();
            controller.wait_for_state(|s| *s == LoopState::Running, Duration::from_secs(5));
            controller.stop();
        }
        assert_eq!(probe.opens(), 2);
        assert_eq!(probe.live_tracks(), 0);
    }

    #[test]
    fn stopping_is_published_after_cancel() {
        let (controller, _probe) = controller();
        let controller = Arc::new(controller);
        controller.start().unwrap();
        controller.wait_for_state(|s| *s == LoopState::Running, Duration::from_secs(5));
        let token = controller
            .current
            .lock()
            .unwrap()
            .clone()
            .expect("session token");

        let stopper = {
            let controller = controller.clone();
            std::thread::spawn(move || controller.stop())
        };
        let seen = controller.wait_for_state(
            |s| *s == LoopState::Stopping || s.is_finished(),
            Duration::from_secs(5),
        );
        assert!(seen.is_some());
        assert!(token.is_cancelled());
        stopper.join().unwrap();
        assert_eq!(controller.state(), LoopState::Stopped);
    }

    #[test]
    fn stop_handle_ends_the_session() {
        let (controller, probe) = controller();
        controller.start().unwrap();
        controller.wait_for_state(|s| *s == LoopState::Running, Duration::from_secs(5));
        controller.stop_handle().request_stop();
        let state = controller.wait_for_state(LoopState::is_finished, Duration::from_secs(5));
        assert_eq!(state, Some(LoopState::Stopped));
        assert_eq!(probe.live_tracks(), 0);
    }

    #[test]
    fn state_display() {
        assert_eq!(LoopState::Running.to_string(), "running");
        assert_eq!(
            LoopState::Failed(SessionError::Panicked).to_string(),
            "failed: session thread panicked"
        );
    }
}
