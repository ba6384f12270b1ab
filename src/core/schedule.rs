use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Source of ticks for a periodic loop.
///
/// `tick` resolves when the next round should run and returns `false` once
/// the schedule is exhausted, which ends the loop driving it.
#[async_trait]
pub trait Schedule: Send {
    async fn tick(&mut self) -> bool;
}

/// Fixed-period wall clock schedule. The first tick fires one full period
/// after creation; late ticks are delayed rather than bursted.
pub struct IntervalSchedule {
    interval: Interval,
}

impl IntervalSchedule {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Schedule for IntervalSchedule {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Schedule driven by hand through a channel, for deterministic tests
pub struct ManualSchedule {
    ticks: mpsc::UnboundedReceiver<()>,
}

/// Handle used to fire ticks on a [`ManualSchedule`]; dropping it ends the schedule
#[derive(Clone)]
pub struct ManualTrigger {
    ticks: mpsc::UnboundedSender<()>,
}

impl ManualSchedule {
    pub fn channel() -> (ManualTrigger, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ManualTrigger { ticks: tx }, Self { ticks: rx })
    }
}

impl ManualTrigger {
    pub fn fire(&self) {
        let _ = self.ticks.send(());
    }
}

#[async_trait]
impl Schedule for ManualSchedule {
    async fn tick(&mut self) -> bool {
        self.ticks.recv().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_schedule_ends_when_trigger_dropped() {
        let (trigger, mut schedule) = ManualSchedule::channel();
        trigger.fire();
        trigger.fire();
        drop(trigger);

        assert!(schedule.tick().await);
        assert!(schedule.tick().await);
        assert!(!schedule.tick().await);
    }

    #[tokio::test]
    async fn test_interval_schedule_waits_one_period() {
        let period = Duration::from_millis(20);
        let mut schedule = IntervalSchedule::new(period);

        let started = std::time::Instant::now();
        assert!(schedule.tick().await);
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
