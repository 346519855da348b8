//! Display-refresh pacing and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Source of refresh ticks for the detection loop.
pub trait RefreshScheduler: Send {
    /// Block until the next refresh. Returns false if cancelled while waiting.
    fn wait_for_refresh(&mut self, cancel: &CancelToken) -> bool;
}

/// Longest single sleep, so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Refresh ticks paced at a fixed display rate.
///
/// A tick that is late is not made up for: the next deadline is measured from
/// the late tick, so the loop never bursts.
#[derive(Debug)]
pub struct VsyncTicker {
    period: Duration,
    next: Option<Instant>,
    ticks: u64,
}

impl VsyncTicker {
    pub fn new(refresh_hz: u32) -> Self {
        let hz = refresh_hz.max(1);
        Self {
            period: Duration::from_secs_f64(1.0 / hz as f64),
            next: None,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl RefreshScheduler for VsyncTicker {
    fn wait_for_refresh(&mut self, cancel: &CancelToken) -> bool {
        let deadline = *self.next.get_or_insert_with(Instant::now);
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }

        let now = Instant::now();
        let next = deadline + self.period;
        self.next = Some(if next <= now { now + self.period } else { next });
        self.ticks += 1;
        !cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn first_tick_is_immediate() {
        let mut ticker = VsyncTicker::new(1);
        let started = Instant::now();
        assert!(ticker.wait_for_refresh(&CancelToken::new()));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(ticker.ticks(), 1);
    }

    #[test]
    fn ticks_are_paced_by_refresh_rate() {
        let mut ticker = VsyncTicker::new(100);
        let cancel = CancelToken::new();
        let started = Instant::now();
        for _ in 0..6 {
            assert!(ticker.wait_for_refresh(&cancel));
        }
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn late_ticks_do_not_burst() {
        let mut ticker = VsyncTicker::new(100);
        let cancel = CancelToken::new();
        assert!(ticker.wait_for_refresh(&cancel));
        std::thread::sleep(Duration::from_millis(60));

        assert!(ticker.wait_for_refresh(&cancel));
        let started = Instant::now();
        assert!(ticker.wait_for_refresh(&cancel));
        assert!(started.elapsed() >= Duration::from_millis(8));
    }

    #[test]
    fn cancel_interrupts_a_long_wait() {
        let mut ticker = VsyncTicker::new(1);
        let cancel = CancelToken::new();
        assert!(ticker.wait_for_refresh(&cancel));

        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let started = Instant::now();
        assert!(!ticker.wait_for_refresh(&cancel));
        assert!(started.elapsed() < Duration::from_millis(900));
        canceller.join().unwrap();
    }

    #[test]
    fn zero_hz_is_clamped() {
        assert_eq!(VsyncTicker::new(0).period(), Duration::from_secs(1));
    }
}
