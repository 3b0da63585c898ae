use std::thread;
use std::time::{Duration, Instant};

/// Enforces a minimum interval between the start of successive operations.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last: None }
    }

    /// Block until `min_interval` has passed since the previous call. The first call never blocks.
    pub fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spaces_out_calls() {
        let mut throttle = Throttle::new(Duration::from_millis(30));
        let start = Instant::now();
        throttle.wait();
        assert!(start.elapsed() < Duration::from_millis(30));
        throttle.wait();
        throttle.wait();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_zero_interval_never_sleeps() {
        let mut throttle = Throttle::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            throttle.wait();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
