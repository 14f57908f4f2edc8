use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use rand::Rng;
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_secs(60);

type Bucket = Arc<Mutex<VecDeque<Instant>>>;

/// Sliding one-minute request budget, one bucket per logical source.
///
/// Each bucket has its own lock, held only while pruning and counting. Callers sleep
/// outside the lock, so a slow source never blocks another.
#[derive(Debug)]
pub struct RateGovernor {
    default_per_minute: u32,
    budgets: HashMap<String, u32>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateGovernor {
    pub fn new(default_per_minute: u32) -> Self {
        Self {
            default_per_minute: default_per_minute.max(1),
            budgets: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_budget(mut self, source: &str, per_minute: u32) -> Self {
        self.budgets.insert(source.to_string(), per_minute.max(1));
        self
    }

    pub fn budget(&self, source: &str) -> u32 {
        self.budgets
            .get(source)
            .copied()
            .unwrap_or(self.default_per_minute)
    }

    pub fn can_proceed(&self, source: &str) -> bool {
        self.wait_time(source).is_none()
    }

    pub fn record(&self, source: &str) {
        self.bucket(source).lock().push_back(Instant::now());
    }

    pub fn wait_time(&self, source: &str) -> Option<Duration> {
        let bucket = self.bucket(source);
        let mut stamps = bucket.lock();
        let now = Instant::now();
        prune(&mut stamps, now);
        if stamps.len() < self.budget(source) as usize {
            return None;
        }
        stamps
            .front()
            .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)))
    }

    pub async fn block_until_ready(&self, source: &str) {
        while let Some(wait) = self.wait_time(source) {
            tracing::debug!(target: "rate", source, wait_ms = wait.as_millis() as u64, "rate budget exhausted");
            sleep(wait).await;
        }
    }

    pub async fn acquire(&self, source: &str) {
        loop {
            let wait = {
                let bucket = self.bucket(source);
                let mut stamps = bucket.lock();
                let now = Instant::now();
                prune(&mut stamps, now);
                if stamps.len() < self.budget(source) as usize {
                    stamps.push_back(now);
                    return;
                }
                stamps
                    .front()
                    .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)))
                    .unwrap_or_default()
            };
            tracing::debug!(target: "rate", source, wait_ms = wait.as_millis() as u64, "rate budget exhausted");
            sleep(wait).await;
        }
    }

    fn bucket(&self, source: &str) -> Bucket {
        self.buckets
            .lock()
            .entry(source.to_string())
            .or_default()
            .clone()
    }
}

pub fn jitter(min: Duration, max: Duration) -> Duration {
    let (low, high) = (min.as_millis() as u64, max.as_millis() as u64);
    if high <= low {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = stamps.front() {
        if now.duration_since(*oldest) >= WINDOW {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_budget_then_blocks() {
        let governor = RateGovernor::new(2);
        assert!(governor.can_proceed("google"));
        governor.record("google");
        governor.record("google");
        assert!(!governor.can_proceed("google"));
        let wait = governor.wait_time("google").unwrap();
        assert!(wait <= WINDOW && wait > Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn extra_request_waits_out_the_window() {
        let governor = RateGovernor::new(30).with_budget("darkweb", 3);
        let started = Instant::now();
        for _ in 0..3 {
            governor.acquire("darkweb").await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        governor.acquire("darkweb").await;
        assert!(started.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn block_until_ready_returns_after_oldest_expires() {
        let governor = RateGovernor::new(1);
        governor.record("paste");
        tokio::time::advance(Duration::from_secs(20)).await;
        let started = Instant::now();
        governor.block_until_ready("paste").await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(40));
        assert!(governor.can_proceed("paste"));
    }

    #[test]
    fn jitter_stays_in_range() {
        let min = Duration::from_millis(1_000);
        let max = Duration::from_millis(3_000);
        for _ in 0..100 {
            let delay = jitter(min, max);
            assert!(delay >= min && delay <= max);
        }
        assert_eq!(jitter(max, max), max);
    }

    #[tokio::test(start_paused = true)]
    async fn buckets_are_independent() {
        let governor = RateGovernor::new(1);
        governor.record("google");
        assert!(!governor.can_proceed("google"));
        assert!(governor.can_proceed("darkweb"));
        assert_eq!(governor.budget("darkweb"), 1);
    }
}
