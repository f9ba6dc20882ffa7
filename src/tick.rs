use std::time::{Duration, Instant};

/// Fixed rate loop timer.
///
/// Deadlines are kept on a grid anchored at creation so sleeping never accumulates
/// drift. A tick that overruns skips the deadlines it missed rather than firing
/// them back to back.
pub struct FixedTicker {
    period: Duration,
    next: Instant,
}

impl FixedTicker {
    /// `hz` is validated by the config loader
    pub fn new(hz: f32) -> Self {
        let period = Duration::from_secs_f32(1.0 / hz.max(f32::EPSILON));
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Blocks until the next deadline. Returns the number of deadlines skipped.
    pub fn wait(&mut self) -> u32 {
        let now = Instant::now();
        let skipped = self.advance(now);
        if let Some(wait_time) = self.next.checked_duration_since(now) {
            std::thread::sleep(wait_time);
        }
        self.next += self.period;
        skipped
    }

    /// Moves a stale deadline forward onto the first grid point not before `now`
    fn advance(&mut self, now: Instant) -> u32 {
        if now <= self.next {
            return 0;
        }
        let behind = (now - self.next).as_nanos();
        let period = self.period.as_nanos().max(1);
        let missed = (behind + period - 1) / period;
        self.next += self.period * missed as u32;
        missed as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_rate() {
        let ticker = FixedTicker::new(50.0);
        assert!((ticker.period().as_secs_f64() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn on_time_skips_nothing() {
        let mut ticker = FixedTicker::new(100.0);
        let next = ticker.next;
        assert_eq!(ticker.advance(next - Duration::from_millis(1)), 0);
        assert_eq!(ticker.next, next);
    }

    #[test]
    fn late_tick_skips_missed_deadlines() {
        let mut ticker = FixedTicker::new(100.0);
        let next = ticker.next;
        let skipped = ticker.advance(next + Duration::from_millis(25));
        assert_eq!(skipped, 3);
        assert_eq!(ticker.next, next + ticker.period() * 3);
    }

    #[test]
    fn wait_keeps_cadence() {
        let mut ticker = FixedTicker::new(200.0);
        let start = Instant::now();
        for _ in 0..4 {
            ticker.wait();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(15));
        assert!(elapsed < Duration::from_millis(200));
    }
}
