//! Pacing policies — per-conversation cooldown and a fixed one-minute
//! global rate window.
//!
//! Both are pure over an injected "now" so callers decide how to wait and
//! tests never have to sleep. The worker sleeps whatever remainder these
//! return, which serializes the whole queue through one pacing gate.

use std::time::Duration;

/// Fixed window length for the rate counter.
const WINDOW_MS: i64 = 60_000;
/// Floor for rate-limit rechecks, so a wait never degenerates to a spin.
const MIN_RATE_WAIT_MS: i64 = 500;

/// How long to wait before acting in a conversation, given the anchor of
/// its last dispatched action. `None` means the cooldown has elapsed.
pub fn cooldown_wait(anchor_ms: i64, now_ms: i64, cooldown_secs: u64) -> Option<Duration> {
    if cooldown_secs == 0 || anchor_ms <= 0 {
        return None;
    }
    let elapsed = now_ms.saturating_sub(anchor_ms);
    let needed = (cooldown_secs as i64) * 1000;
    if elapsed >= needed {
        None
    } else {
        Some(Duration::from_millis((needed - elapsed) as u64))
    }
}

/// Count of actions in the current fixed one-minute window. The window is
/// anchored at the first action after a reset, not rolling.
#[derive(Debug)]
pub struct RateWindow {
    window_start_ms: Option<i64>,
    count: u32,
}

impl RateWindow {
    pub fn new() -> Self {
        Self { window_start_ms: None, count: 0 }
    }

    fn roll(&mut self, now_ms: i64) -> i64 {
        match self.window_start_ms {
            Some(start) if now_ms - start < WINDOW_MS => start,
            _ => {
                self.window_start_ms = Some(now_ms);
                self.count = 0;
                now_ms
            }
        }
    }

    /// `None` when budget remains; otherwise how long to sleep before
    /// rechecking (bounded by the time left until the window resets).
    pub fn wait_hint(&mut self, now_ms: i64, limit: u32) -> Option<Duration> {
        let start = self.roll(now_ms);
        if self.count < limit.max(1) {
            return None;
        }
        let remaining = (WINDOW_MS - (now_ms - start)).max(MIN_RATE_WAIT_MS);
        Some(Duration::from_millis(remaining as u64))
    }

    /// Record one dispatched action.
    pub fn record(&mut self, now_ms: i64) {
        self.roll(now_ms);
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_elapsed() {
        assert_eq!(cooldown_wait(0, 10_000, 3), None);
        assert_eq!(cooldown_wait(1_000, 10_000, 3), None);
        assert_eq!(cooldown_wait(9_000, 10_000, 0), None);
    }

    #[test]
    fn test_cooldown_remainder() {
        // last action at t=9s, now t=10s, cooldown 3s -> wait 2s
        assert_eq!(cooldown_wait(9_000, 10_000, 3), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_rate_window_counts_within_minute() {
        let mut rw = RateWindow::new();
        assert_eq!(rw.wait_hint(1_000, 2), None);
        rw.record(1_000);
        assert_eq!(rw.wait_hint(2_000, 2), None);
        rw.record(2_000);
        // budget spent: wait until window reset at t=61s
        let wait = rw.wait_hint(5_000, 2).unwrap();
        assert_eq!(wait, Duration::from_millis(56_000));
    }

    #[test]
    fn test_rate_window_resets_after_minute() {
        let mut rw = RateWindow::new();
        rw.record(1_000);
        rw.record(1_500);
        assert!(rw.wait_hint(2_000, 2).is_some());
        // 60s after the window opened, the counter resets
        assert_eq!(rw.wait_hint(61_000, 2), None);
        assert_eq!(rw.count(), 0);
    }

    #[test]
    fn test_rate_wait_has_floor() {
        let mut rw = RateWindow::new();
        rw.record(1_000);
        // near the end of the window the hint never drops below the floor
        let wait = rw.wait_hint(60_900, 1).unwrap();
        assert_eq!(wait, Duration::from_millis(500));
    }

    #[test]
    fn test_scenario_three_events_budget_two() {
        // settings {ratePerMinute: 2}: E1 and E2 pass, E3 must wait for the
        // window reset, after which it passes.
        let mut rw = RateWindow::new();
        assert_eq!(rw.wait_hint(0, 2), None);
        rw.record(0);
        assert_eq!(rw.wait_hint(100, 2), None);
        rw.record(100);
        let wait = rw.wait_hint(200, 2).expect("E3 must be delayed");
        let resumed_at = 200 + wait.as_millis() as i64;
        assert_eq!(rw.wait_hint(resumed_at, 2), None);
    }
}
