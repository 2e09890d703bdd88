use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::errors::ConfigError;

/// Slowest accepted rate: one tick every 1000 seconds.
pub const MIN_RATE_HZ: f64 = 1e-3;

/// Calls a closure at a fixed rate until shut down or out of ticks.
///
/// Ticks never overlap: a tick that overruns its period delays the next one
/// and missed deadlines are not replayed.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    max_ticks: Option<u64>,
    shutdown: Arc<AtomicBool>,
}

impl TickScheduler {
    pub fn new(rate_hz: f64) -> Result<Self, ConfigError> {
        if !rate_hz.is_finite() || rate_hz < MIN_RATE_HZ {
            return Err(ConfigError::Invalid(format!(
                "rate_hz must be at least {MIN_RATE_HZ}, got {rate_hz}"
            )));
        }
        let period = Duration::try_from_secs_f64(rate_hz.recip())
            .map_err(|e| ConfigError::Invalid(format!("rate_hz {rate_hz}: {e}")))?;
        Ok(Self {
            period,
            max_ticks: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Stops after `ticks` calls.
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Flag that ends [`TickScheduler::run`] before its next tick when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs `tick(index)` once per period. Returns the number of ticks run.
    pub fn run<F: FnMut(u64)>(&self, mut tick: F) -> u64 {
        info!(
            "Scheduler running at {:.1} Hz",
            1.0 / self.period.as_secs_f64()
        );
        let mut deadline = Instant::now();
        let mut ticks = 0u64;

        while !self.shutdown.load(Ordering::Acquire) {
            if self.max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            tick(ticks);
            ticks += 1;

            deadline += self.period;
            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
            } else {
                debug!(
                    "Tick {} overran its period by {:.2}ms",
                    ticks - 1,
                    (now - deadline).as_secs_f64() * 1e3
                );
                deadline = now;
            }
        }

        info!("Scheduler stopped after {ticks} ticks");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_rate() {
        assert!(TickScheduler::new(0.0).is_err());
        assert!(TickScheduler::new(-5.0).is_err());
        assert!(TickScheduler::new(f64::NAN).is_err());
    }

    #[test]
    fn rejects_rate_with_unrepresentable_period() {
        assert!(matches!(
            TickScheduler::new(1e-300),
            Err(ConfigError::Invalid(_))
        ));
        assert!(TickScheduler::new(f64::MIN_POSITIVE).is_err());
        assert!(TickScheduler::new(MIN_RATE_HZ).is_ok());
    }

    #[test]
    fn stops_after_tick_budget() {
        let scheduler = TickScheduler::new(1000.0).unwrap().with_max_ticks(5);
        let mut seen = Vec::new();
        assert_eq!(scheduler.run(|i| seen.push(i)), 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn shutdown_flag_stops_the_loop() {
        let scheduler = TickScheduler::new(1000.0).unwrap();
        let shutdown = scheduler.shutdown_handle();
        let ticks = scheduler.run(|i| {
            if i == 2 {
                shutdown.store(true, Ordering::Release);
            }
        });
        assert_eq!(ticks, 3);
    }

    #[test]
    fn paces_ticks_at_the_requested_rate() {
        let scheduler = TickScheduler::new(100.0).unwrap().with_max_ticks(5);
        let start = Instant::now();
        scheduler.run(|_| {});
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
