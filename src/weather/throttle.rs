// Minimum spacing between outbound calls to a third-party API.
//
// Shared by every zone of a tick: concurrent callers queue on the mutex and
// are released one at a time, each at least `min_interval` after the
// previous release. State is in-memory only (resets on restart).

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

pub struct Throttle {
    min_interval: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_release: Mutex::new(None),
        }
    }

    /// Wait until a call is allowed, then claim the slot.
    ///
    /// Returns the instant the slot was claimed at.
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_release.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        let now = Instant::now();
        *last = Some(now);
        now
    }
}
