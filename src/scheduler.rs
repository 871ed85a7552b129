//! Periodic and delayed task scheduling with cooperative cancellation
//!
//! A [`Scheduler`] is cheap to clone; every clone shares one cancellation
//! token and one task tracker. Each periodic task awaits its own callback
//! before waiting for the next tick, so a timer never overlaps itself.
//! On shutdown in-flight callbacks are dropped at their next await point
//! and whatever they were computing is discarded.

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period`, starting immediately
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, ?period, "Periodic task started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = task() => {}
                }
            }

            debug!(task = name, "Periodic task stopped");
        });
    }

    /// Run `task` once after `delay` unless cancelled first
    pub fn spawn_delayed<Fut>(&self, name: &'static str, delay: Duration, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(task = name, "Delayed task cancelled before running");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => debug!(task = name, "Delayed task cancelled while running"),
                _ = task => {}
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by every task of this scheduler
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every task and wait for all of them to finish
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Scheduler stopped");
    }
}
