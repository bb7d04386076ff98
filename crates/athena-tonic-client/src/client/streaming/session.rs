use crate::client::batch::SourceExhausted;
use core::time::Duration;
use tokio::time::Instant;

/// Timing state for one `classify` call.
///
/// The idle cutoff is measured from the last response, not from the start of
/// the stream, and is disarmed for good once the batch source is exhausted.
#[derive(Debug)]
pub struct StreamSession {
    start_time: Instant,
    last_response_time: Instant,
    exhausted: SourceExhausted,
    idle_timeout: Option<Duration>,
}

impl StreamSession {
    pub fn new(exhausted: SourceExhausted, idle_timeout: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_response_time: now,
            exhausted,
            idle_timeout,
        }
    }

    pub const fn start_time(&self) -> Instant {
        self.start_time
    }

    pub const fn last_response_time(&self) -> Instant {
        self.last_response_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// `true` if the idle cutoff has passed at `now` while input is active.
    pub fn is_idle_at(&self, now: Instant) -> bool {
        if self.exhausted.get() {
            return false;
        }
        self.idle_timeout
            .is_some_and(|idle| now.saturating_duration_since(self.last_response_time) >= idle)
    }

    /// When the idle cutoff fires, or `None` while disarmed.
    pub fn idle_deadline(&self) -> Option<Instant> {
        if self.exhausted.get() {
            return None;
        }
        self.idle_timeout.map(|idle| self.last_response_time + idle)
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_response_time = now;
    }
}
