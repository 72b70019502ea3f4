use std::time::{Duration, Instant};
use log::warn;

use crate::config::anti_spam::{BAN_DURATION_SECONDS, MAX_REQUESTS_PER_SECOND, MAX_RESPONSES_PER_SECOND};

/// Per-connection flood limiter for the host channel.
///
/// Frames in and frames out are counted in one-second windows. Crossing either
/// budget bans the connection for `BAN_DURATION_SECONDS`. Every error is
/// counted and delivered; a host has to see each failed heartbeat.
pub struct AntiSpamState {
    window_start: Instant,
    responses_in_window: u32,
    requests_in_window: u32,
    banned_until: Option<Instant>,
}

impl AntiSpamState {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            responses_in_window: 0,
            requests_in_window: 0,
            banned_until: None,
        }
    }

    /// Count an incoming frame. Returns true if the connection is banned.
    pub fn record_request(&mut self, player: &str, now: Instant) -> bool {
        self.roll_window(now);
        self.requests_in_window += 1;
        if self.requests_in_window > MAX_REQUESTS_PER_SECOND {
            self.ban(player, "too many requests per second", now);
        }
        self.is_banned(now)
    }

    /// Count an outgoing frame, errors included. Returns true if the connection is banned.
    pub fn record_response(&mut self, player: &str, now: Instant) -> bool {
        self.roll_window(now);
        self.responses_in_window += 1;
        if self.responses_in_window > MAX_RESPONSES_PER_SECOND {
            self.ban(player, "too many responses per second", now);
        }
        self.is_banned(now)
    }

    pub fn is_banned(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| now < until)
    }

    /// Seconds left on the ban, 0 if not banned.
    pub fn ban_remaining_secs(&self, now: Instant) -> u64 {
        self.banned_until
            .map_or(0, |until| until.saturating_duration_since(now).as_secs())
    }

    fn ban(&mut self, player: &str, reason: &str, now: Instant) {
        if self.is_banned(now) {
            return;
        }
        self.banned_until = Some(now + Duration::from_secs(BAN_DURATION_SECONDS));
        warn!(
            "[AntiSpam] Banned player={} for {}s: {}",
            player, BAN_DURATION_SECONDS, reason
        );
    }

    fn roll_window(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.responses_in_window = 0;
            self.requests_in_window = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_flood_bans() {
        let t0 = Instant::now();
        let mut state = AntiSpamState::new(t0);
        for _ in 0..MAX_REQUESTS_PER_SECOND {
            assert!(!state.record_request("p", t0));
        }
        assert!(state.record_request("p", t0));
        assert!(state.is_banned(t0));
        assert_eq!(state.ban_remaining_secs(t0), BAN_DURATION_SECONDS);

        let after = t0 + Duration::from_secs(BAN_DURATION_SECONDS);
        assert!(!state.is_banned(after));
        assert!(!state.record_request("p", after));
    }

    #[test]
    fn repeated_errors_count_toward_the_response_budget() {
        let t0 = Instant::now();
        let mut state = AntiSpamState::new(t0);
        for _ in 0..MAX_RESPONSES_PER_SECOND {
            assert!(!state.record_response("p", t0), "each error goes out");
        }
        assert!(state.record_response("p", t0));
    }

    #[test]
    fn budgets_reset_every_second() {
        let t0 = Instant::now();
        let mut state = AntiSpamState::new(t0);
        for second in 0..3 {
            let now = t0 + Duration::from_secs(second);
            for _ in 0..MAX_RESPONSES_PER_SECOND {
                assert!(!state.record_response("p", now));
            }
        }
        assert!(!state.is_banned(t0 + Duration::from_secs(3)));
    }
}
