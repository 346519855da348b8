//! The detect -> render -> feedback cycle.
//!
//! One cycle per refresh tick, never two in flight. Cancellation is checked
//! while waiting for the tick and right after `detect` returns; a result that
//! arrives after cancellation is dropped without rendering or feedback.

use std::time::{Duration, Instant};

use crate::capture::CaptureSession;
use crate::detect::{DetectOptions, SharedGateway};
use crate::error::DetectionError;
use crate::feedback::FeedbackSelector;
use crate::render::{OverlaySurface, PlacedDetection, SharedRenderer};
use crate::scheduler::{CancelToken, RefreshScheduler, VsyncTicker};
use crate::status::StatusBoard;

pub const DEFAULT_REFRESH_HZ: u32 = 60;
pub const DEFAULT_SLOW_DETECT_WARNING: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Running,
    Cancelled,
}

/// How a loop run ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopExit {
    /// Cycles that reached `detect`.
    pub cycles: u64,
    /// Cycles that rendered a result.
    pub rendered: u64,
    /// True when a completed `detect` result was dropped because of cancellation.
    pub discarded_result: bool,
}

pub struct DetectionLoop {
    gateway: SharedGateway,
    renderer: SharedRenderer,
    selector: FeedbackSelector,
    status: StatusBoard,
    scheduler: Box<dyn RefreshScheduler>,
    options: DetectOptions,
    slow_detect_warning: Duration,
    surface: OverlaySurface,
    phase: LoopPhase,
    cycles: u64,
    rendered: u64,
}

impl DetectionLoop {
    pub fn new(
        gateway: SharedGateway,
        renderer: SharedRenderer,
        selector: FeedbackSelector,
        status: StatusBoard,
    ) -> Self {
        Self {
            gateway,
            renderer,
            selector,
            status,
            scheduler: Box::new(VsyncTicker::new(DEFAULT_REFRESH_HZ)),
            options: DetectOptions::default(),
            slow_detect_warning: DEFAULT_SLOW_DETECT_WARNING,
            surface: OverlaySurface::new(),
            phase: LoopPhase::Idle,
            cycles: 0,
            rendered: 0,
        }
    }

    pub fn with_scheduler(mut self, scheduler: impl RefreshScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    pub fn with_options(mut self, options: DetectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_slow_detect_warning(mut self, threshold: Duration) -> Self {
        self.slow_detect_warning = threshold;
        self
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    fn exit(&mut self, discarded_result: bool) -> LoopExit {
        self.phase = LoopPhase::Cancelled;
        LoopExit {
            cycles: self.cycles,
            rendered: self.rendered,
            discarded_result,
        }
    }

    /// Run cycles on the calling thread until `cancel` fires or a cycle fails.
    ///
    /// A loop that has been cancelled does not run again.
    pub fn run(
        &mut self,
        capture: &mut CaptureSession,
        cancel: &CancelToken,
    ) -> Result<LoopExit, DetectionError> {
        if self.phase == LoopPhase::Cancelled {
            return Ok(self.exit(false));
        }
        self.phase = LoopPhase::Running;
        log::info!("detection loop running");

        loop {
            if !self.scheduler.wait_for_refresh(cancel) {
                log::info!("detection loop cancelled after {} cycles", self.cycles);
                return Ok(self.exit(false));
            }
            match self.cycle(capture, cancel) {
                Ok(true) => {}
                Ok(false) => {
                    log::info!(
                        "detection loop cancelled during cycle {}, result discarded",
                        self.cycles
                    );
                    return Ok(self.exit(true));
                }
                Err(err) => {
                    self.phase = LoopPhase::Cancelled;
                    log::error!("{}", err);
                    return Err(err);
                }
            }
        }
    }

    /// One cycle. Returns false when cancellation arrived during `detect`.
    fn cycle(
        &mut self,
        capture: &mut CaptureSession,
        cancel: &CancelToken,
    ) -> Result<bool, DetectionError> {
        self.cycles += 1;
        let cycle = self.cycles;

        let (width, height) = capture
            .dimensions()
            .ok_or_else(|| DetectionError::new(cycle, "capture stream released"))?;
        if self.surface.resize_to(width, height) {
            log::debug!("overlay resized to {}x{}", width, height);
        }

        let frame = capture
            .read_frame()
            .map_err(|e| DetectionError::new(cycle, format!("{e:#}")))?;

        let started = Instant::now();
        let result = {
            let mut gateway = self
                .gateway
                .lock()
                .map_err(|_| DetectionError::new(cycle, "inference gateway lock poisoned"))?;
            gateway.detect(&frame, &self.options)
        };
        drop(frame);
        let elapsed = started.elapsed();
        if elapsed > self.slow_detect_warning {
            log::warn!(
                "detect call on cycle {} took {} ms",
                cycle,
                elapsed.as_millis()
            );
        }

        if cancel.is_cancelled() {
            return Ok(false);
        }
        let detections = result.map_err(|e| DetectionError::new(cycle, format!("{e:#}")))?;

        let (width, height) = self.surface.size();
        let placed: Vec<PlacedDetection> = detections
            .iter()
            .map(|detection| PlacedDetection::place(detection, width, height))
            .collect();
        {
            let mut renderer = self.renderer.lock().unwrap_or_else(|p| p.into_inner());
            renderer.render(&placed, &mut self.surface);
        }
        self.rendered += 1;

        if let Some(first) = detections.first() {
            if let Some(message) = self.selector.update(&first.expressions) {
                self.status.set_feedback(message);
            }
        }
        log::debug!("cycle {}: {} detections", cycle, detections.len());
        Ok(true)
    }
}
