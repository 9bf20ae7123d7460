//! Per-speaker playback scheduler
//!
//! Concurrent requests for one speaker compete for a single "next to play"
//! slot. Lower priority values win; at equal priority the voice port that
//! was played least recently wins, and a port never played beats any port
//! that has been. A port that keeps being requested is cut off once its
//! window exceeds the speaker's max time; a port not requested within its
//! regen interval plus the margin starts a fresh window.
//!
//! All methods take `now` so the policy can be driven by tests.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Bookkeeping for one voice port
#[derive(Debug, Clone)]
pub struct EventAlertState {
    pub voice_port: String,
    pub priority: i64,
    /// Expected re-request cadence
    pub interval: Duration,
    /// Last time the port was actually played; `None` sorts before any instant
    pub last_alert: Option<Instant>,
    /// Last time a request for the port arrived
    pub last_detected: Option<Instant>,
    /// Start of the current continuous window
    pub start_time: Instant,
}

/// Why an event was not placed in the next-to-play slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The port has been requested continuously for longer than the max time
    MaxTimeExceeded,
    /// The pending candidate has a lower priority value
    OutrankedByPriority,
    /// Same priority, but the pending candidate waited longer since its last play
    OutrankedByRecency,
}

#[derive(Debug)]
pub struct AlertManager {
    max_time: Duration,
    pause_time: Duration,
    margin: Duration,
    alert_states: HashMap<String, EventAlertState>,
    /// Snapshot of the winning port's state at acceptance time
    next_alert: Option<EventAlertState>,
}

impl AlertManager {
    pub fn new(max_time_secs: i64, pause_time_secs: i64, margin: Duration) -> Self {
        let mut manager = Self {
            max_time: Duration::ZERO,
            pause_time: Duration::ZERO,
            margin,
            alert_states: HashMap::new(),
            next_alert: None,
        };
        manager.set_settings(max_time_secs, pause_time_secs);
        manager
    }

    /// Update timing from the latest sensor configuration; negatives clamp to zero
    pub fn set_settings(&mut self, max_time_secs: i64, pause_time_secs: i64) {
        self.max_time = Duration::from_secs(max_time_secs.max(0) as u64);
        self.pause_time = Duration::from_secs(pause_time_secs.max(0) as u64);
    }

    pub fn pause_time(&self) -> Duration {
        self.pause_time
    }

    pub fn has_pending(&self) -> bool {
        self.next_alert.is_some()
    }

    pub fn pending_port(&self) -> Option<&str> {
        self.next_alert.as_ref().map(|s| s.voice_port.as_str())
    }

    pub fn state(&self, voice_port: &str) -> Option<&EventAlertState> {
        self.alert_states.get(voice_port)
    }

    fn is_stale(&self, state: &EventAlertState, now: Instant) -> bool {
        match state.last_detected {
            Some(seen) => seen + state.interval + self.margin < now,
            None => true,
        }
    }

    fn is_over_max_time(&self, state: &EventAlertState, now: Instant) -> bool {
        state.start_time + self.max_time < now
    }

    /// Register a request for `voice_port` and let it compete for the next slot
    pub fn add_event(
        &mut self,
        voice_port: &str,
        priority: i64,
        interval: Duration,
        now: Instant,
    ) -> Result<(), Rejection> {
        let mut state = self
            .alert_states
            .remove(voice_port)
            .unwrap_or_else(|| EventAlertState {
                voice_port: voice_port.to_string(),
                priority,
                interval,
                last_alert: None,
                last_detected: None,
                start_time: now,
            });
        state.priority = priority;
        state.interval = interval;

        if self.is_stale(&state, now) {
            state.start_time = now;
        }
        state.last_detected = Some(now);

        let verdict = if self.is_over_max_time(&state, now) {
            Err(Rejection::MaxTimeExceeded)
        } else {
            match &self.next_alert {
                Some(next) if next.priority < priority => Err(Rejection::OutrankedByPriority),
                Some(next) if next.priority == priority && next.last_alert < state.last_alert => {
                    Err(Rejection::OutrankedByRecency)
                },
                _ => Ok(()),
            }
        };

        if verdict.is_ok() {
            self.next_alert = Some(state.clone());
        }
        self.alert_states.insert(voice_port.to_string(), state);
        verdict
    }

    /// Take the next voice port to play
    ///
    /// The slot is cleared either way; a candidate that went stale or ran
    /// past the max time since it was accepted yields `None`.
    pub fn pop_next(&mut self, now: Instant) -> Option<String> {
        let next = self.next_alert.take()?;
        if self.is_stale(&next, now) || self.is_over_max_time(&next, now) {
            return None;
        }

        if let Some(state) = self.alert_states.get_mut(&next.voice_port) {
            state.last_alert = Some(now);
        }
        Some(next.voice_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARGIN: Duration = Duration::from_millis(2000);
    const INTERVAL: Duration = Duration::from_millis(1000);

    fn manager() -> AlertManager {
        AlertManager::new(120, 2, MARGIN)
    }

    #[test]
    fn test_first_event_takes_empty_slot() {
        let now = Instant::now();
        let mut m = manager();
        assert!(!m.has_pending());
        assert_eq!(m.add_event("3", 5, INTERVAL, now), Ok(()));
        assert_eq!(m.pending_port(), Some("3"));
        assert_eq!(m.pop_next(now), Some("3".to_string()));
        assert!(!m.has_pending());
        assert_eq!(m.state("3").and_then(|s| s.last_alert), Some(now));
    }

    #[test]
    fn test_lower_value_priority_wins() {
        let now = Instant::now();
        let mut m = manager();
        m.add_event("1", 5, INTERVAL, now).ok();
        assert_eq!(
            m.add_event("2", 7, INTERVAL, now),
            Err(Rejection::OutrankedByPriority)
        );
        assert_eq!(m.pending_port(), Some("1"));

        assert_eq!(m.add_event("3", 2, INTERVAL, now), Ok(()));
        assert_eq!(m.pending_port(), Some("3"));
    }

    #[test]
    fn test_tie_goes_to_least_recently_played() {
        let t0 = Instant::now();
        let mut m = manager();

        // A played at t0, B played later at t0+1s
        m.add_event("A", 1, INTERVAL, t0).ok();
        m.pop_next(t0);
        let t1 = t0 + Duration::from_secs(1);
        m.add_event("B", 1, INTERVAL, t1).ok();
        m.pop_next(t1);

        // Arrival order B then A: A takes over
        let t2 = t1 + Duration::from_millis(500);
        m.add_event("B", 1, INTERVAL, t2).ok();
        assert_eq!(m.add_event("A", 1, INTERVAL, t2), Ok(()));
        assert_eq!(m.pop_next(t2).as_deref(), Some("A"));

        // A was just played at t2, so B is now the one waiting longest
        let t3 = t2 + Duration::from_millis(500);
        m.add_event("A", 1, INTERVAL, t3).ok();
        assert_eq!(m.add_event("B", 1, INTERVAL, t3), Ok(()));
        assert_eq!(m.pop_next(t3).as_deref(), Some("B"));
    }

    #[test]
    fn test_tie_rejects_more_recent_port() {
        let t0 = Instant::now();
        let mut m = manager();
        m.add_event("A", 1, INTERVAL, t0).ok();
        m.pop_next(t0);
        let t1 = t0 + Duration::from_secs(1);
        m.add_event("B", 1, INTERVAL, t1).ok();
        m.pop_next(t1);

        let t2 = t1 + Duration::from_millis(500);
        m.add_event("A", 1, INTERVAL, t2).ok();
        assert_eq!(
            m.add_event("B", 1, INTERVAL, t2),
            Err(Rejection::OutrankedByRecency)
        );
        assert_eq!(m.pending_port(), Some("A"));
    }

    #[test]
    fn test_never_played_port_beats_played_one() {
        let t0 = Instant::now();
        let mut m = manager();
        m.add_event("old", 4, INTERVAL, t0).ok();
        m.pop_next(t0);

        let t1 = t0 + Duration::from_millis(200);
        m.add_event("new", 4, INTERVAL, t1).ok();
        assert_eq!(
            m.add_event("old", 4, INTERVAL, t1),
            Err(Rejection::OutrankedByRecency)
        );
        assert_eq!(m.pending_port(), Some("new"));
    }

    #[test]
    fn test_max_time_cuts_off_continuous_port() {
        let t0 = Instant::now();
        let mut m = AlertManager::new(3, 0, MARGIN);
        let mut now = t0;
        // Requested every second, never stale
        while now <= t0 + Duration::from_secs(3) {
            assert_eq!(m.add_event("9", 1, INTERVAL, now), Ok(()));
            m.pop_next(now);
            now += Duration::from_secs(1);
        }
        assert_eq!(
            m.add_event("9", 1, INTERVAL, now),
            Err(Rejection::MaxTimeExceeded)
        );
        assert!(!m.has_pending());
    }

    #[test]
    fn test_stale_port_restarts_window() {
        let t0 = Instant::now();
        let mut m = AlertManager::new(3, 0, MARGIN);
        m.add_event("9", 1, INTERVAL, t0).ok();
        m.pop_next(t0);

        // Quiet for longer than interval + margin
        let t1 = t0 + Duration::from_secs(10);
        assert_eq!(m.add_event("9", 1, INTERVAL, t1), Ok(()));
        assert_eq!(m.state("9").map(|s| s.start_time), Some(t1));
    }

    #[test]
    fn test_pop_drops_stale_candidate() {
        let t0 = Instant::now();
        let mut m = manager();
        m.add_event("5", 1, INTERVAL, t0).ok();

        let late = t0 + INTERVAL + MARGIN + Duration::from_millis(1);
        assert_eq!(m.pop_next(late), None);
        assert!(!m.has_pending());
        assert_eq!(m.state("5").and_then(|s| s.last_alert), None);
    }

    #[test]
    fn test_settings_update() {
        let mut m = manager();
        assert_eq!(m.pause_time(), Duration::from_secs(2));
        m.set_settings(60, -1);
        assert_eq!(m.pause_time(), Duration::ZERO);
    }
}
