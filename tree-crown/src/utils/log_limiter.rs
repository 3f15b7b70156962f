use crate::common::*;

/// Admits at most one log event per time window.
#[derive(Debug)]
pub struct LogEveryN {
    last: Option<Instant>,
    interval: Duration,
}

impl LogEveryN {
    pub fn new(interval: Duration) -> Self {
        Self {
            last: None,
            interval,
        }
    }

    pub fn with_five_second_interval() -> Self {
        Self::new(Duration::from_secs(5))
    }

    /// Returns true if an event may be logged now.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_event_per_window() {
        let mut limiter = LogEveryN::with_five_second_interval();
        let start = Instant::now();

        assert!(limiter.ready_at(start));
        assert!(!limiter.ready_at(start + Duration::from_secs(1)));
        assert!(!limiter.ready_at(start + Duration::from_millis(4999)));
        assert!(limiter.ready_at(start + Duration::from_secs(5)));
        assert!(!limiter.ready_at(start + Duration::from_secs(9)));
        assert!(limiter.ready_at(start + Duration::from_secs(11)));
    }
}
