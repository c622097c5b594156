use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::{Connect, LineSource, Record};
use crate::error::{Error, SourceError};

/// The rate the simulation runs at if nothing else is configured.
pub const DEFAULT_RPM: f64 = 9.44;

/// Produces a record every period, as if the sensor saw a revolution.
///
/// Never disconnects.
#[derive(Debug, Clone)]
pub struct Simulated {
    period: Duration,
    line: Record,
}

/// The time between records at the given revolutions per minute.
///
/// `None` unless the rpm gives a period which is representable and above zero.
pub fn period_from_rpm(rpm: f64) -> Option<Duration> {
    if !rpm.is_finite() || rpm <= 0.0 {
        return None;
    }

    Duration::try_from_secs_f64(60.0 / rpm)
        .ok()
        .filter(|period| !period.is_zero())
}

impl Simulated {
    /// Simulate the given revolutions per minute.
    /// Each revolution produces one record, so the period is `60 / rpm` seconds.
    pub fn from_rpm(rpm: f64) -> Result<Self, Error> {
        period_from_rpm(rpm).map(Self::from_period).ok_or_else(|| {
            Error::BadConfig(format!(
                "The simulated rpm must give a period above zero, got `{rpm}`."
            ))
        })
    }

    /// Produce one record each period.
    pub fn from_period(period: Duration) -> Self {
        Self {
            period,
            line: Record::from("."),
        }
    }

    /// Set the line emitted each period.
    pub fn with_line(mut self, line: impl Into<Record>) -> Self {
        self.line = line.into();
        self
    }

    /// The time between records.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for Simulated {
    fn default() -> Self {
        Self::from_period(Duration::from_secs_f64(60.0 / DEFAULT_RPM))
    }
}

struct SimulatedLines {
    interval: Interval,
    line: Record,
}

#[async_trait]
impl Connect for Simulated {
    async fn connect(&self) -> Result<Box<dyn LineSource>, SourceError> {
        if self.period.is_zero() {
            return Err(SourceError::Unavailable {
                device: self.describe(),
                problem: "a zero period would never yield".into(),
            });
        }

        // The first record arrives one full period from now, not immediately.
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Box::new(SimulatedLines {
            interval,
            line: self.line.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("simulation, one record every {:?}", self.period)
    }
}

#[async_trait]
impl LineSource for SimulatedLines {
    async fn next_record(&mut self) -> Result<Record, SourceError> {
        self.interval.tick().await;
        Ok(self.line.clone())
    }
}
