use std::time::{Duration, Instant};

use crate::Mode;

/// Monotonic clock anchored at the start of a streaming session.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Cubic ease-in-out over normalised time. Inputs outside `[0, 1]` are clamped.
pub fn ease_in_out_cubic(u: f32) -> f32 {
    let u = u.clamp(0.0, 1.0);
    if u < 0.5 {
        4.0 * u * u * u
    } else {
        1.0 - (-2.0 * u + 2.0).powi(3) / 2.0
    }
}

/// Where a ramp is relative to its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    Transitioning,
    Holding,
    Settled,
}

/// Timed, eased interpolation between two value vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Ramp {
    pub mode: Mode,
    pub start: Vec<f32>,
    pub end: Vec<f32>,
    pub started_at: Duration,
    pub duration: Duration,
    pub hold: Duration,
}

impl Ramp {
    pub fn new(
        mode: Mode,
        start: Vec<f32>,
        end: Vec<f32>,
        started_at: Duration,
        duration: Duration,
        hold: Duration,
    ) -> Self {
        debug_assert_eq!(start.len(), end.len(), "ramp endpoints differ in length");
        Self {
            mode,
            start,
            end,
            started_at,
            duration,
            hold,
        }
    }

    fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started_at)
    }

    /// Normalised time in `[0, 1]`. A zero duration is already complete.
    pub fn progress(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed(now).as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn phase(&self, now: Duration) -> RampPhase {
        let elapsed = self.elapsed(now);
        if elapsed < self.duration {
            RampPhase::Transitioning
        } else if elapsed < self.duration + self.hold {
            RampPhase::Holding
        } else {
            RampPhase::Settled
        }
    }

    pub fn sample(&self, now: Duration) -> Vec<f32> {
        self.sample_at(self.progress(now))
    }

    /// Blended vector at normalised time `u`. The endpoints are returned
    /// verbatim so `u = 0` and `u = 1` carry no rounding error.
    pub fn sample_at(&self, u: f32) -> Vec<f32> {
        if u <= 0.0 {
            return self.start.clone();
        }
        if u >= 1.0 {
            return self.end.clone();
        }
        let eased = ease_in_out_cubic(u);
        self.start
            .iter()
            .zip(&self.end)
            .map(|(start, end)| start + (end - start) * eased)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(duration_ms: u64, hold_ms: u64) -> Ramp {
        Ramp::new(
            Mode::TurnLeft,
            vec![0.0, 10.0, -3.0],
            vec![1.0, -10.0, -3.0],
            Duration::from_secs(2),
            Duration::from_millis(duration_ms),
            Duration::from_millis(hold_ms),
        )
    }

    #[test]
    fn easing_hits_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() <= f32::EPSILON);
        assert!((ease_in_out_cubic(0.25) - 0.0625).abs() <= f32::EPSILON);
        assert_eq!(ease_in_out_cubic(-1.0), 0.0);
        assert_eq!(ease_in_out_cubic(2.0), 1.0);
    }

    #[test]
    fn sample_is_exact_at_endpoints() {
        let ramp = ramp(1500, 0);
        assert_eq!(ramp.sample(Duration::from_secs(2)), ramp.start);
        assert_eq!(ramp.sample(Duration::from_millis(3500)), ramp.end);
        assert_eq!(ramp.sample(Duration::from_secs(10)), ramp.end);
    }

    #[test]
    fn approach_is_monotonic() {
        let ramp = ramp(1000, 0);
        let mut previous = ramp.sample_at(0.0);
        for step in 1..=100 {
            let current = ramp.sample_at(step as f32 / 100.0);
            assert!(current[0] >= previous[0]);
            assert!(current[1] <= previous[1]);
            assert_eq!(current[2], -3.0);
            previous = current;
        }
    }

    #[test]
    fn phases_follow_duration_then_hold() {
        let ramp = ramp(1000, 500);
        assert_eq!(ramp.phase(Duration::from_millis(2500)), RampPhase::Transitioning);
        assert_eq!(ramp.phase(Duration::from_millis(3000)), RampPhase::Holding);
        assert_eq!(ramp.phase(Duration::from_millis(3499)), RampPhase::Holding);
        assert_eq!(ramp.phase(Duration::from_millis(3500)), RampPhase::Settled);
    }

    #[test]
    fn zero_duration_jumps_immediately() {
        let ramp = ramp(0, 0);
        assert_eq!(ramp.progress(Duration::from_secs(2)), 1.0);
        assert_eq!(ramp.sample(Duration::from_secs(2)), ramp.end);
        assert_eq!(ramp.phase(Duration::from_secs(2)), RampPhase::Settled);
    }

    #[test]
    fn session_clock_advances() {
        let clock = SessionClock::start();
        assert!(clock.elapsed() >= Duration::ZERO);
    }
}
