//! Per-device push rate limiting (spec §4.4): absorbs poll/command echo
//! by allowing at most one accessory state push per device per interval.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hvac_core::model::DeviceId;
use tokio::sync::Mutex;

pub struct Cooldown {
    interval: Duration,
    last_push: Mutex<HashMap<DeviceId, Instant>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_push: Mutex::new(HashMap::new()) }
    }

    /// True if a push for `id` is allowed right now, in which case the
    /// cooldown clock for that device is reset. False if one was pushed
    /// within the interval and this push should be skipped.
    pub async fn allow(&self, id: &DeviceId, now: Instant) -> bool {
        let mut guard = self.last_push.lock().await;
        match guard.get(id) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                guard.insert(id.clone(), now);
                true
            }
        }
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
