//! Rate limiting primitives for credential-issuing endpoints.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    Register,
    Login,
}

impl RateLimitAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// In-memory fixed-window limiter keyed by IP or email per action.
///
/// Requests without a resolvable IP are allowed; the email check still
/// applies to them.
pub struct FixedWindowRateLimiter {
    window: Duration,
    max_attempts: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(window: Duration, max_attempts: u32) -> Self {
        Self {
            window,
            max_attempts,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, key: String) -> RateLimitDecision {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned lock should not lock everyone out.
            return RateLimitDecision::Allowed;
        };
        windows.retain(|_, window| now.duration_since(window.started_at) < self.window);

        let window = windows.entry(key).or_insert(Window {
            started_at: now,
            count: 0,
        });
        window.count += 1;
        if window.count > self.max_attempts {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        match ip {
            Some(ip) => self.check(format!("ip:{}:{ip}", action.as_str())),
            None => RateLimitDecision::Allowed,
        }
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.check(format!("email:{}:{email}", action.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Register),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn fixed_window_limits_after_max_attempts() {
        let limiter = FixedWindowRateLimiter::new(Duration::from_secs(60), 3);
        for _ in 0..3 {
            assert_eq!(
                limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
            RateLimitDecision::Limited
        );
        // A different key is unaffected.
        assert_eq!(
            limiter.check_ip(Some("5.6.7.8"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn actions_are_limited_independently() {
        let limiter = FixedWindowRateLimiter::new(Duration::from_secs(60), 1);
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::Register),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::Login),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn missing_ip_is_allowed() {
        let limiter = FixedWindowRateLimiter::new(Duration::from_secs(60), 0);
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }
}
