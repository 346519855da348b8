use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use expression_feedback::status::STATUS_DETECTING;
use expression_feedback::{
    shared_camera, shared_gateway, shared_renderer, AcquisitionError, BoundingBox, CameraProbe,
    DetectOptions, Detection, FeedbackPoolTable, Frame, InferenceGateway, Label,
    LifecycleController, LoopSettings, LoopState, ModelLoadError, OverlayRenderer, OverlaySurface,
    PlacedDetection, ScoreMap, SessionError, SimulatedFailure, SyntheticCamera,
    SyntheticCameraConfig,
};

const WAIT: Duration = Duration::from_secs(5);

/// Blocks a gateway call until the test releases it.
struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Gate {
    fn pass(&self) {
        let _ = self.entered.send(());
        let _ = self.release.recv();
    }
}

struct GateControl {
    entered: Receiver<()>,
    release: Sender<()>,
}

fn gate() -> (Gate, GateControl) {
    let (entered_tx, entered_rx) = channel();
    let (release_tx, release_rx) = channel();
    (
        Gate {
            entered: entered_tx,
            release: release_rx,
        },
        GateControl {
            entered: entered_rx,
            release: release_tx,
        },
    )
}

#[derive(Default)]
struct ScriptedGateway {
    scores: ScoreMap,
    fail_on: Option<u64>,
    gate_init: Option<Gate>,
    gate_detect: Option<(u64, Gate)>,
    calls: u64,
}

impl InferenceGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn init(&mut self, model_source: &str) -> Result<(), ModelLoadError> {
        if let Some(gate) = &self.gate_init {
            gate.pass();
        }
        if model_source.starts_with("https://") {
            return Err(ModelLoadError::UnsupportedSource(model_source.to_string()));
        }
        Ok(())
    }

    fn detect(
        &mut self,
        _frame: &Frame,
        _options: &DetectOptions,
    ) -> anyhow::Result<Vec<Detection>> {
        self.calls += 1;
        if let Some((call, gate)) = &self.gate_detect {
            if *call == self.calls {
                gate.pass();
            }
        }
        if self.fail_on == Some(self.calls) {
            anyhow::bail!("inference engine lost its context");
        }
        Ok(vec![Detection::new(
            BoundingBox::new(0.2, 0.2, 0.4, 0.5),
            0.95,
            self.scores,
        )])
    }
}

#[derive(Clone, Default)]
struct CountingRenderer {
    renders: Arc<AtomicUsize>,
}

impl OverlayRenderer for CountingRenderer {
    fn render(&mut self, _detections: &[PlacedDetection], _surface: &mut OverlaySurface) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    controller: Arc<LifecycleController>,
    probe: CameraProbe,
    renders: Arc<AtomicUsize>,
    ready_calls: Arc<AtomicUsize>,
}

fn harness(
    gateway: ScriptedGateway,
    camera: SyntheticCameraConfig,
    settings: LoopSettings,
) -> Harness {
    let camera = SyntheticCamera::new(camera);
    let probe = camera.probe();
    let renderer = CountingRenderer::default();
    let renders = renderer.renders.clone();
    let ready_calls = Arc::new(AtomicUsize::new(0));
    let ready = ready_calls.clone();
    let controller = LifecycleController::new(
        shared_gateway(gateway),
        shared_camera(camera),
        shared_renderer(renderer),
        Arc::new(FeedbackPoolTable::default()),
        settings,
    )
    .on_models_ready(Arc::new(move || {
        ready.fetch_add(1, Ordering::SeqCst);
    }));
    Harness {
        controller: Arc::new(controller),
        probe,
        renders,
        ready_calls,
    }
}

fn fast_settings() -> LoopSettings {
    LoopSettings {
        refresh_hz: 500,
        feedback_interval: Duration::from_millis(20),
        feedback_seed: Some(42),
        ..LoopSettings::default()
    }
}

fn small_camera() -> SyntheticCameraConfig {
    SyntheticCameraConfig {
        width: 64,
        height: 48,
        ..SyntheticCameraConfig::default()
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn happy_gateway() -> ScriptedGateway {
    ScriptedGateway {
        scores: ScoreMap::new().with(Label::Happy, 0.9).with(Label::Sad, 0.1),
        ..ScriptedGateway::default()
    }
}

#[test]
fn running_loop_shows_status_then_happy_feedback() {
    let h = harness(happy_gateway(), small_camera(), fast_settings());
    let status = h.controller.status();

    h.controller.start().expect("start");
    assert!(h
        .controller
        .wait_for_state(|s| *s == LoopState::Running, WAIT)
        .is_some());
    assert!(wait_until(|| status.snapshot().feedback.is_some()));

    let feedback = status.snapshot().feedback.expect("feedback");
    assert!(FeedbackPoolTable::default()
        .pool_for(Label::Happy)
        .contains(&feedback));
    assert_eq!(status.display_text(), feedback);
    assert_eq!(status.snapshot().status, STATUS_DETECTING);
    assert_eq!(h.ready_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.probe.live_tracks(), 1);

    h.controller.stop();
    assert_eq!(h.controller.state(), LoopState::Stopped);
    assert_eq!(h.probe.live_tracks(), 0);
}

#[test]
fn feedback_is_stable_inside_the_interval() {
    let settings = LoopSettings {
        feedback_interval: Duration::from_millis(150),
        ..fast_settings()
    };
    let h = harness(happy_gateway(), small_camera(), settings);
    let status = h.controller.status();
    h.controller.start().expect("start");

    assert!(wait_until(|| status.snapshot().feedback.is_some()));
    let first = status.snapshot().feedback;
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(status.snapshot().feedback, first);

    h.controller.stop();
}

#[test]
fn denied_camera_never_starts_the_loop() {
    let camera = SyntheticCameraConfig {
        failure: Some(SimulatedFailure::Denied),
        ..small_camera()
    };
    let h = harness(happy_gateway(), camera, fast_settings());
    h.controller.start().expect("start");

    let state = h.controller.wait_for_state(LoopState::is_finished, WAIT);
    assert_eq!(
        state,
        Some(LoopState::Failed(SessionError::Acquisition(
            AcquisitionError::Denied
        )))
    );
    assert_eq!(
        h.controller.status().display_text(),
        "Error: camera permission denied"
    );
    assert_eq!(h.probe.opens(), 0);
    assert_eq!(h.probe.live_tracks(), 0);
    assert_eq!(h.renders.load(Ordering::SeqCst), 0);
    assert_eq!(h.ready_calls.load(Ordering::SeqCst), 1);

    h.controller.stop();
    assert!(matches!(h.controller.state(), LoopState::Failed(_)));
}

#[test]
fn detect_failure_on_cycle_three_tears_down() {
    let gateway = ScriptedGateway {
        fail_on: Some(3),
        ..happy_gateway()
    };
    let h = harness(gateway, small_camera(), fast_settings());
    h.controller.start().expect("start");

    let state = h
        .controller
        .wait_for_state(LoopState::is_finished, WAIT)
        .expect("session finished");
    match state {
        LoopState::Failed(SessionError::Detection(err)) => assert_eq!(err.cycle, 3),
        other => panic!("unexpected state {other:?}"),
    }
    assert_eq!(h.renders.load(Ordering::SeqCst), 2);
    assert_eq!(h.probe.live_tracks(), 0);
    let text = h.controller.status().display_text();
    assert!(text.starts_with("Error: detection failed on cycle 3"), "{text}");
}

#[test]
fn stop_during_detect_discards_the_result() {
    let (gate, control) = gate();
    let gateway = ScriptedGateway {
        gate_detect: Some((1, gate)),
        ..happy_gateway()
    };
    let settings = LoopSettings {
        feedback_interval: Duration::ZERO,
        ..fast_settings()
    };
    let h = harness(gateway, small_camera(), settings);
    h.controller.start().expect("start");
    control.entered.recv_timeout(WAIT).expect("detect entered");

    let controller = h.controller.clone();
    let stopper = std::thread::spawn(move || controller.stop());
    assert!(h
        .controller
        .wait_for_state(|s| *s == LoopState::Stopping, WAIT)
        .is_some());
    control.release.send(()).expect("release detect");
    stopper.join().expect("stop thread");

    assert_eq!(h.controller.state(), LoopState::Stopped);
    assert_eq!(h.renders.load(Ordering::SeqCst), 0);
    assert!(h.controller.status().snapshot().feedback.is_none());
    assert_eq!(h.probe.live_tracks(), 0);
}

#[test]
fn stop_during_model_load_skips_everything_after() {
    let (gate, control) = gate();
    let gateway = ScriptedGateway {
        gate_init: Some(gate),
        ..happy_gateway()
    };
    let h = harness(gateway, small_camera(), fast_settings());
    h.controller.start().expect("start");
    control.entered.recv_timeout(WAIT).expect("init entered");

    let controller = h.controller.clone();
    let stopper = std::thread::spawn(move || controller.stop());
    assert!(h
        .controller
        .wait_for_state(|s| *s == LoopState::Stopping, WAIT)
        .is_some());
    control.release.send(()).expect("release init");
    stopper.join().expect("stop thread");

    assert_eq!(h.controller.state(), LoopState::Stopped);
    assert_eq!(h.ready_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.probe.opens(), 0);
    assert_eq!(h.probe.live_tracks(), 0);
}

#[test]
fn model_load_failure_is_reported() {
    let settings = LoopSettings {
        model_source: "https://cdn.example/models".to_string(),
        ..fast_settings()
    };
    let h = harness(happy_gateway(), small_camera(), settings);
    h.controller.start().expect("start");

    let state = h.controller.wait_for_state(LoopState::is_finished, WAIT);
    assert!(matches!(
        state,
        Some(LoopState::Failed(SessionError::ModelLoad(
            ModelLoadError::UnsupportedSource(_)
        )))
    ));
    assert!(h.controller.status().display_text().starts_with("Error: "));
    assert_eq!(h.ready_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.probe.opens(), 0);
}

#[test]
fn playback_failure_releases_the_camera() {
    let camera = SyntheticCameraConfig {
        fail_play: true,
        ..small_camera()
    };
    let h = harness(happy_gateway(), camera, fast_settings());
    h.controller.start().expect("start");

    let state = h.controller.wait_for_state(LoopState::is_finished, WAIT);
    assert!(matches!(
        state,
        Some(LoopState::Failed(SessionError::Acquisition(
            AcquisitionError::Playback(_)
        )))
    ));
    assert_eq!(h.probe.opens(), 1);
    assert_eq!(h.probe.live_tracks(), 0);
}

#[test]
fn restart_after_failure_clears_the_error() {
    let gateway = ScriptedGateway {
        fail_on: Some(1),
        ..happy_gateway()
    };
    let h = harness(gateway, small_camera(), fast_settings());
    h.controller.start().expect("start");
    h.controller.wait_for_state(LoopState::is_finished, WAIT);
    assert!(h.controller.status().display_text().starts_with("Error: "));

    // The scripted gateway only fails on its first call.
    h.controller.start().expect("restart");
    assert!(h
        .controller
        .wait_for_state(|s| *s == LoopState::Running, WAIT)
        .is_some());
    assert!(!h.controller.status().display_text().starts_with("Error: "));
    h.controller.stop();
    assert_eq!(h.controller.state(), LoopState::Stopped);
    assert_eq!(h.probe.live_tracks(), 0);
}

#[test]
fn repeated_stop_at_any_point_leaves_nothing_live() {
    let h = harness(happy_gateway(), small_camera(), fast_settings());
    h.controller.stop();

    h.controller.start().expect("start");
    h.controller.stop();
    h.controller.stop();
    assert_eq!(h.probe.live_tracks(), 0);

    h.controller.start().expect("start");
    assert!(wait_until(|| h.renders.load(Ordering::SeqCst) > 0));
    let stoppers: Vec<_> = (0..3)
        .map(|_| {
            let controller = h.controller.clone();
            std::thread::spawn(move || controller.stop())
        })
        .collect();
    for stopper in stoppers {
        stopper.join().expect("stop thread");
    }
    assert_eq!(h.controller.state(), LoopState::Stopped);
    assert_eq!(h.probe.live_tracks(), 0);

    let renders = h.renders.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(h.renders.load(Ordering::SeqCst), renders);
}

#[test]
fn stop_handle_stops_a_running_session() {
    let h = harness(happy_gateway(), small_camera(), fast_settings());
    let stop = h.controller.stop_handle();
    h.controller.start().expect("start");
    assert!(h
        .controller
        .wait_for_state(|s| *s == LoopState::Running, WAIT)
        .is_some());

    stop.request_stop();
    let state = h.controller.wait_for_state(LoopState::is_finished, WAIT);
    assert_eq!(state, Some(LoopState::Stopped));
    assert_eq!(h.probe.live_tracks(), 0);
}

#[test]
fn start_while_active_is_rejected() {
    let h = harness(happy_gateway(), small_camera(), fast_settings());
    h.controller.start().expect("start");
    assert!(h.controller.start().is_err());
    h.controller.stop();
}

#[test]
fn controller_can_be_shared_across_threads() {
    fn shareable<T: Send + Sync>() {}
    shareable::<LifecycleController>();
}
