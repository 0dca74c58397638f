//! Background world tick, running beside the dispatch loop
//!
//! The ticker only advances a counter today. It shares nothing with the
//! dispatch loop; anything it grows to do over the registry must take a lock
//! around the whole read-modify-write of an entry.

use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub struct WorldTicker {
    tick_duration: Duration,
    ticks: Arc<AtomicU64>,
}

impl WorldTicker {
    /// Ticker running `tick_rate` times per second; a rate of zero is treated as one
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Starts ticking on the runtime; the returned handle observes and stops it
    pub fn spawn(self) -> TickerHandle {
        let ticks = Arc::clone(&self.ticks);
        let tick_duration = self.tick_duration;

        let task = tokio::spawn(async move {
            let mut tick_interval = interval(tick_duration);
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("World ticker started at {:?} per tick", tick_duration);

            loop {
                tick_interval.tick().await;
                let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
                if tick % 600 == 0 {
                    debug!("World tick {}", tick);
                }
            }
        });

        TickerHandle { ticks, task }
    }
}

pub struct TickerHandle {
    ticks: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn shutdown(self) {
        self.task.abort();
        info!("World ticker stopped after {} ticks", self.ticks());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_tick_duration_from_rate() {
        assert_approx_eq!(WorldTicker::new(20).tick_duration().as_secs_f64(), 0.05);
        assert_eq!(WorldTicker::new(0).tick_duration(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_ticker_advances() {
        let handle = WorldTicker::new(100).spawn();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let ticks = handle.ticks();
        assert!(ticks >= 3, "expected ticks to advance, got {}", ticks);

        handle.shutdown();
    }
}
