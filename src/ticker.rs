//! A periodic tick source with overrun detection.
//!
//! Wraps [`tokio::time::Interval`] configured to never silently catch up:
//! if the executor falls more than one period behind (GC pause, a blocked
//! thread, an overloaded host), `tick` reports exactly how many periods
//! were skipped instead of quietly bursting through them. A caller that
//! treats every overrun as fatal — which the scheduler does — gets a
//! clean, single failure instead of a stream of silently-compressed RTP
//! spacing.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::{Result, RtpError};

pub struct Ticker {
    interval: Interval,
    period: Duration,
    last: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            period,
            last: None,
        }
    }

    /// Wait for the next tick. Returns `Ok(())` on a normal, on-time tick.
    /// If more than one period elapsed since the previous tick, returns
    /// [`RtpError::TimerOverrun`] carrying the number of periods skipped.
    pub async fn tick(&mut self) -> Result<()> {
        let now = self.interval.tick().await;

        if let Some(last) = self.last {
            let elapsed = now.duration_since(last);
            let periods = elapsed.as_secs_f64() / self.period.as_secs_f64();
            let skipped = periods.round() as u64;
            self.last = Some(now);
            if skipped > 1 {
                return Err(RtpError::TimerOverrun(skipped - 1));
            }
        } else {
            self.last = Some(now);
        }

        Ok(())
    }
}
