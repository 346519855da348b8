//! Throttled, randomized feedback text.
//!
//! `FeedbackSelector::update` picks the dominant label of a score map and,
//! at most once per interval, replaces the current message with a random
//! entry from that label's pool.

mod pools;

pub use pools::FeedbackPoolTable;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::{Label, ScoreMap};

pub const DEFAULT_FEEDBACK_INTERVAL: Duration = Duration::from_millis(5000);

/// Current message and the time it last changed.
#[derive(Clone, Debug)]
pub struct FeedbackState {
    message: Option<String>,
    dominant: Option<Label>,
    last_change: Instant,
}

impl FeedbackState {
    fn new(now: Instant) -> Self {
        Self {
            message: None,
            dominant: None,
            last_change: now,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Label the current message was drawn for.
    pub fn dominant(&self) -> Option<Label> {
        self.dominant
    }

    pub fn last_change(&self) -> Instant {
        self.last_change
    }
}

pub struct FeedbackSelector {
    pools: Arc<FeedbackPoolTable>,
    interval: Duration,
    state: FeedbackState,
    rng: StdRng,
}

impl FeedbackSelector {
    pub fn new(pools: Arc<FeedbackPoolTable>, interval: Duration) -> Self {
        Self::with_rng(pools, interval, StdRng::from_entropy())
    }

    /// Deterministic message choice for a given seed.
    pub fn with_seed(pools: Arc<FeedbackPoolTable>, interval: Duration, seed: u64) -> Self {
        Self::with_rng(pools, interval, StdRng::seed_from_u64(seed))
    }

    fn with_rng(pools: Arc<FeedbackPoolTable>, interval: Duration, rng: StdRng) -> Self {
        Self {
            pools,
            interval,
            state: FeedbackState::new(Instant::now()),
            rng,
        }
    }

    pub fn state(&self) -> &FeedbackState {
        &self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn update(&mut self, scores: &ScoreMap) -> Option<&str> {
        self.update_at(scores, Instant::now())
    }

    /// Returns the new message when one was chosen, `None` when the state was
    /// left unchanged (inside the interval, or no dominant label).
    pub fn update_at(&mut self, scores: &ScoreMap, now: Instant) -> Option<&str> {
        let dominant = scores.dominant()?;
        let elapsed = now.checked_duration_since(self.state.last_change)?;
        if elapsed < self.interval {
            return None;
        }

        let message = self.pools.pool_for(dominant).choose(&mut self.rng)?.clone();
        log::debug!("feedback: {} -> {:?}", dominant, message);
        self.state.dominant = Some(dominant);
        self.state.last_change = now;
        self.state.message = Some(message);
        self.state.message.as_deref()
    }
}
