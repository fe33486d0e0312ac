//! Dispatch profiling on top of the plain queue.
//!
//! A [`ProfilingCommandQueue`] is a [`CommandQueue`] created with the
//! driver's profiling property plus a record of every profiled dispatch.
//! Records are tagged: a plain dispatch keeps its one event, a repeated
//! dispatch keeps only the first and last events of the batch and divides
//! the spanned time by the launch count.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dims::NdRange;
use crate::driver::{Driver, DriverEvent};
use crate::error::Result;
use crate::queue::CommandQueue;

/// Records are reserved up front so steady-state profiling does not
/// reallocate mid-measurement.
const RECORD_CAPACITY: usize = 128;

/// Timing evidence for one profiled dispatch.
pub(crate) enum DispatchTiming<D: Driver> {
    /// One launch, one event.
    Single(D::Event),
    /// `count` launches; only the first and last were event-producing.
    Batched {
        first: D::Event,
        last: D::Event,
        count: usize,
    },
}

pub(crate) struct DispatchRecord<D: Driver> {
    pub(crate) label: String,
    pub(crate) timing: DispatchTiming<D>,
}

impl<D: Driver> DispatchRecord<D> {
    pub(crate) fn first_event(&self) -> &D::Event {
        match &self.timing {
            DispatchTiming::Single(event) => event,
            DispatchTiming::Batched { first, .. } => first,
        }
    }

    pub(crate) fn last_event(&self) -> &D::Event {
        match &self.timing {
            DispatchTiming::Single(event) => event,
            DispatchTiming::Batched { last, .. } => last,
        }
    }

    /// Average time per launch, as reported to [`ProfilingInfo`].
    fn per_launch_duration(&self) -> Result<Duration> {
        match &self.timing {
            DispatchTiming::Single(event) => event.elapsed(),
            DispatchTiming::Batched { first, last, count } => {
                let span = last
                    .finished_ns()?
                    .saturating_sub(first.started_ns()?);
                Ok(Duration::from_nanos(span) / (*count).max(1) as u32)
            }
        }
    }

    /// Summed duration of the events this record materialized.
    fn events_duration(&self) -> Result<Duration> {
        match &self.timing {
            DispatchTiming::Single(event) => event.elapsed(),
            DispatchTiming::Batched { first, last, .. } => {
                Ok(first.elapsed()? + last.elapsed()?)
            }
        }
    }
}

/// A command queue that measures its dispatches through driver events.
pub struct ProfilingCommandQueue<D: Driver> {
    pub(crate) inner: CommandQueue<D>,
    pub(crate) records: Vec<DispatchRecord<D>>,
    current_label: String,
}

impl<D: Driver> ProfilingCommandQueue<D> {
    /// Create a queue with the driver's profiling property enabled.
    pub fn create(driver: Arc<D>, device: &D::Device, context: &D::Context) -> Result<Self> {
        let queue = driver.create_queue(device, context, true)?;
        Ok(Self {
            inner: CommandQueue::wrap(driver, queue, true),
            records: Vec::with_capacity(RECORD_CAPACITY),
            current_label: String::new(),
        })
    }

    /// The plain queue underneath, for transfers and synchronization.
    pub fn queue(&self) -> &CommandQueue<D> {
        &self.inner
    }

    /// Label stamped on subsequent records. Survives
    /// [`reset_measurements`](Self::reset_measurements).
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.current_label = label.into();
    }

    /// Drop all recorded measurements. The current label is kept, so a
    /// reset starts an independent session under the same name.
    pub fn reset_measurements(&mut self) {
        self.records.clear();
    }

    /// Submit one profiled launch and record its event under the current
    /// label.
    pub fn dispatch(&mut self, kernel: &D::Kernel, range: NdRange) -> Result<()> {
        let event = self.inner.dispatch_with_event(kernel, range)?;
        self.records.push(DispatchRecord {
            label: self.current_label.clone(),
            timing: DispatchTiming::Single(event),
        });
        Ok(())
    }

    /// Submit the same launch `n` times as one record.
    ///
    /// Only the first and last launches produce events; the middle ones are
    /// submitted bare to keep event bookkeeping off the measured path. With
    /// a non-zero `flush_period` the middle of the batch is flushed after
    /// every `flush_period`-th launch, and the batch always ends with a
    /// flush so the device starts draining immediately. `n == 0` records
    /// nothing.
    pub fn dispatch_n_times(
        &mut self,
        kernel: &D::Kernel,
        range: NdRange,
        n: usize,
        flush_period: usize,
    ) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if n == 1 {
            return self.dispatch(kernel, range);
        }

        let first = self.inner.dispatch_with_event(kernel, range)?;
        for i in 1..n - 1 {
            self.inner.dispatch(kernel, range)?;
            if flush_period != 0 && i % flush_period == 0 {
                self.inner.flush()?;
            }
        }
        let last = self.inner.dispatch_with_event(kernel, range)?;
        self.inner.flush()?;

        self.records.push(DispatchRecord {
            label: self.current_label.clone(),
            timing: DispatchTiming::Batched { first, last, count: n },
        });
        Ok(())
    }

    /// Per-dispatch timings, in submission order.
    ///
    /// A batched record reports `(last.finish − first.start) / count`: the
    /// average per launch including inter-launch gaps.
    pub fn get_profiling_info(&self) -> Result<ProfilingInfo> {
        let mut dispatches = Vec::with_capacity(self.records.len());
        for record in &self.records {
            dispatches.push(DispatchInfo {
                label: record.label.clone(),
                duration: record.per_launch_duration()?,
            });
        }
        Ok(ProfilingInfo { dispatches })
    }

    /// Wall span from the start of the first recorded event to the finish
    /// of the last one. Zero when nothing has been recorded.
    pub fn queue_execution_time(&self) -> Result<Duration> {
        let (Some(first), Some(last)) = (self.records.first(), self.records.last()) else {
            return Ok(Duration::ZERO);
        };
        let start = first.first_event().started_ns()?;
        let end = last.last_event().finished_ns()?;
        Ok(Duration::from_nanos(end.saturating_sub(start)))
    }

    /// Sum of the durations of the materialized events only. For batched
    /// records that is the first and last launch, not the whole batch.
    pub fn sum_of_events_time(&self) -> Result<Duration> {
        let mut sum = Duration::ZERO;
        for record in &self.records {
            sum += record.events_duration()?;
        }
        Ok(sum)
    }

    /// Submit buffered commands without waiting for them.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    /// Block until every submitted command has completed.
    pub fn wait_for_completion(&self) -> Result<()> {
        self.inner.wait_for_completion()
    }
}

/// Timing of one profiled dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchInfo {
    pub label: String,
    pub duration: Duration,
}

/// Per-dispatch timings for one measurement session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilingInfo {
    pub dispatches: Vec<DispatchInfo>,
}

impl ProfilingInfo {
    /// Sum of all per-dispatch durations.
    pub fn total_time(&self) -> Duration {
        self.dispatches.iter().map(|d| d.duration).sum()
    }
}

impl fmt::Display for ProfilingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for dispatch in &self.dispatches {
            let label = if dispatch.label.is_empty() {
                "<unlabeled>"
            } else {
                &dispatch.label
            };
            writeln!(
                f,
                "  {label:<32} {:10.3} ms",
                dispatch.duration.as_secs_f64() * 1e3
            )?;
        }
        write!(
            f,
            "  total {:.3} ms over {} dispatches",
            self.total_time().as_secs_f64() * 1e3,
            self.dispatches.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiling_info_total() {
        let info = ProfilingInfo {
            dispatches: vec![
                DispatchInfo {
                    label: "conv".into(),
                    duration: Duration::from_millis(3),
                },
                DispatchInfo {
                    label: "relu".into(),
                    duration: Duration::from_millis(1),
                },
            ],
        };
        assert_eq!(info.total_time(), Duration::from_millis(4));
    }

    #[test]
    fn test_profiling_info_display() {
        let info = ProfilingInfo {
            dispatches: vec![DispatchInfo {
                label: String::new(),
                duration: Duration::from_micros(1500),
            }],
        };
        let report = info.to_string();
        assert!(report.contains("<unlabeled>"));
        assert!(report.contains("1.500 ms"));
        assert!(report.contains("1 dispatches"));
    }

    #[test]
    fn test_empty_profiling_info() {
        let info = ProfilingInfo::default();
        assert_eq!(info.total_time(), Duration::ZERO);
        assert!(info.to_string().contains("0 dispatches"));
    }
}
