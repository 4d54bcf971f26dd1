use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Coalescing delayed runner.
///
/// `trigger` schedules the job to run once after `delay` plus a random
/// fuzz; triggers arriving while a run is already scheduled are absorbed.
/// A trigger that arrives while the job is running schedules one more run.
pub struct Throttle {
    name: String,
    delay: Duration,
    max_fuzz: Duration,
    scheduled: Arc<AtomicBool>,
    job: Arc<dyn Fn() + Send + Sync>,
}

impl Throttle {
    pub fn new<F>(name: impl Into<String>, delay: Duration, max_fuzz: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            delay,
            max_fuzz,
            scheduled: Arc::new(AtomicBool::new(false)),
            job: Arc::new(job),
        }
    }

    /// Schedule a run. Returns `false` if one was already pending.
    pub fn trigger(&self) -> bool {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let wait = self.delay + self.fuzz();
        let scheduled = Arc::clone(&self.scheduled);
        let job = Arc::clone(&self.job);
        let name = self.name.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-throttle", self.name))
            .spawn(move || {
                thread::sleep(wait);
                scheduled.store(false, Ordering::SeqCst);
                debug!(throttle = %name, "running throttled job");
                job();
            });
        if let Err(e) = spawned {
            warn!(throttle = %self.name, error = %e, "failed to spawn throttled job");
            self.scheduled.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    fn fuzz(&self) -> Duration {
        let max = self.max_fuzz.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}
