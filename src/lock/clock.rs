use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::utils::time::get_now_as_u64;

/// Wall-clock source for lock holder markers
pub trait Clock: Send + Sync + 'static {
    /// Seconds since the unix epoch
    fn now_unix_secs(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_secs(&self) -> i64 {
        get_now_as_u64() as i64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_unix_secs: i64) -> Self {
        Self {
            now: AtomicI64::new(start_unix_secs),
        }
    }

    pub fn advance(
        &self,
        by: Duration,
    ) {
        self.now.fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }

    pub fn set(
        &self,
        unix_secs: i64,
    ) {
        self.now.store(unix_secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
