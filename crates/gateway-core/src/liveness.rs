use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Last-activity clock shared between the read loop (writer) and the
/// heartbeat loop (reader). `fetch_max` keeps the timestamp non-decreasing
/// even if the wall clock steps backwards.
#[derive(Debug)]
pub struct Liveness {
    last_seen: AtomicU64,
}

impl Liveness {
    pub fn now() -> Self {
        Self {
            last_seen: AtomicU64::new(now_millis()),
        }
    }

    pub fn touch(&self) {
        self.last_seen.fetch_max(now_millis(), Ordering::Relaxed);
    }

    pub fn idle(&self) -> Duration {
        let last = self.last_seen.load(Ordering::Relaxed);
        Duration::from_millis(now_millis().saturating_sub(last))
    }

    pub fn expired(&self, timeout: Duration) -> bool {
        self.idle() > timeout
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
