//! # timer
//!
//! why: randomized election timeouts and a fixed-period leader heartbeat
//! relations: owned and polled by runner.rs inside its select loop
//! what: ElectionTimer, HeartbeatScheduler

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use rand::Rng;
use raft_core::RaftConfig;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};

/// One-shot election timer, re-armed with a fresh random duration on every reset
///
/// while disarmed (leaders) `fired` never completes.
pub struct ElectionTimer {
    min: Duration,
    max: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl ElectionTimer {
    /// armed right away with a random duration
    pub fn new(config: &RaftConfig) -> Self {
        let min = Duration::from_millis(config.election_timeout_min);
        let max = Duration::from_millis(config.election_timeout_max);
        let mut timer = Self {
            min,
            max,
            sleep: Box::pin(sleep(min)),
            armed: false,
        };
        timer.reset();
        timer
    }

    /// uniform in [min, max)
    pub fn random_timeout(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..self.max)
    }

    /// re-arm, discarding whatever was pending
    pub fn reset(&mut self) {
        let deadline = Instant::now() + self.random_timeout();
        self.sleep.as_mut().reset(deadline);
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// completes once when the armed deadline passes, then disarms
    pub async fn fired(&mut self) {
        if !self.armed {
            pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

/// Periodic tick while this node leads
pub struct HeartbeatScheduler {
    period: Duration,
    interval: Option<Interval>,
}

impl HeartbeatScheduler {
    pub fn new(config: &RaftConfig) -> Self {
        Self {
            period: config.heartbeat(),
            interval: None,
        }
    }

    /// first tick lands one period from now; the caller broadcasts immediately itself
    pub fn start(&mut self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// next tick, or never while stopped
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    fn config() -> RaftConfig {
        RaftConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn election_timer_fires_within_window() {
        let cfg = config();
        let mut timer = ElectionTimer::new(&cfg);
        let started = Instant::now();

        timer.fired().await;

        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(cfg.election_timeout_min));
        assert!(waited <= Duration::from_millis(cfg.election_timeout_max));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_pushes_deadline_out() {
        let cfg = config();
        let mut timer = ElectionTimer::new(&cfg);

        advance(Duration::from_millis(cfg.election_timeout_min - 10)).await;
        timer.reset();
        let started = Instant::now();
        timer.fired().await;

        assert!(started.elapsed() >= Duration::from_millis(cfg.election_timeout_min));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let cfg = config();
        let mut timer = ElectionTimer::new(&cfg);
        timer.cancel();

        let res = timeout(Duration::from_millis(cfg.election_timeout_max * 4), timer.fired()).await;

        assert!(res.is_err());
    }

    #[test]
    fn random_timeouts_stay_in_range() {
        let cfg = config();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = rt.enter();
        let timer = ElectionTimer::new(&cfg);
        for _ in 0..200 {
            let t = timer.random_timeout();
            assert!(t >= Duration::from_millis(cfg.election_timeout_min));
            assert!(t < Duration::from_millis(cfg.election_timeout_max));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_every_period() {
        let cfg = config();
        let mut hb = HeartbeatScheduler::new(&cfg);
        hb.start();
        let started = Instant::now();

        hb.tick().await;
        hb.tick().await;

        let waited = started.elapsed();
        assert!(waited >= cfg.heartbeat() * 2);
        assert!(waited < cfg.heartbeat() * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_heartbeat_is_silent() {
        let cfg = config();
        let mut hb = HeartbeatScheduler::new(&cfg);
        hb.start();
        hb.stop();

        assert!(!hb.is_running());
        let res = timeout(cfg.heartbeat() * 5, hb.tick()).await;
        assert!(res.is_err());
    }
}
