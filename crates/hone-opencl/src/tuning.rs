//! Work-group autotuning: run every candidate launch shape once, read the
//! event timers, pick the fastest.
//!
//! The measurement loop carries workarounds for two classes of mobile
//! driver defects. Mali drivers leak kernel-pool memory per launch, so the
//! search throttles submissions by waiting on an old event every few
//! candidates and recreates the kernel afterwards. Some Adreno 3xx parts
//! report garbage event timestamps, so their readings go through a
//! two-sided anomaly filter before the argmin.

use hone_device::GpuInfo;
use log::{debug, info};

use crate::cache::TuningCache;
use crate::dims::NdRange;
use crate::driver::{Driver, DriverEvent};
use crate::error::{QueueError, Result};
use crate::profiling::{DispatchRecord, DispatchTiming, ProfilingCommandQueue};

/// Readings at or above this many milliseconds are glitched timer values;
/// they are excluded from the anomaly filter's mean.
const ANOMALY_CEILING_MS: f64 = 100.0 * 1000.0;

/// Readings below this fraction of the mean are equally implausible and are
/// skipped by the argmin.
const ANOMALY_FLOOR_FACTOR: f64 = 0.1;

/// While searching on Mali, wait on the event from this many submissions
/// back once per this many submissions.
const MALI_WAIT_STRIDE: usize = 8;

impl<D: Driver> ProfilingCommandQueue<D> {
    /// Measure every candidate launch shape once and return the index of
    /// the fastest.
    ///
    /// Replaces the recorded measurements with one entry per candidate, so
    /// the profiling accessors describe the search afterwards. Any failed
    /// submission, wait or drain aborts the whole search.
    pub fn best_work_group_index(
        &mut self,
        kernel: &mut D::Kernel,
        gpu_info: &GpuInfo,
        candidates: &[NdRange],
    ) -> Result<usize> {
        if candidates.is_empty() {
            return Err(QueueError::NoCandidates);
        }
        let unreliable_timers = gpu_info.is_adreno() && gpu_info.adreno.is_adreno3xx();

        self.reset_measurements();
        for (i, range) in candidates.iter().enumerate() {
            let event = self.inner.dispatch_with_event(kernel, *range)?;
            self.records.push(DispatchRecord {
                label: range.to_string(),
                timing: DispatchTiming::Single(event),
            });

            // Keeps the submission backlog short; slows the per-launch
            // kernel-pool leak in Mali drivers.
            if gpu_info.is_mali() && i % MALI_WAIT_STRIDE == MALI_WAIT_STRIDE - 1 {
                self.records[i - (MALI_WAIT_STRIDE - 1)].first_event().wait()?;
            }
            // Draining after every candidate raises the chance of getting
            // sane timestamps out of the unreliable timers.
            if unreliable_timers {
                self.inner.wait_for_completion()?;
            }
        }
        self.inner.wait_for_completion()?;

        // Recreating the kernel releases the pool the Mali driver grew
        // during the search.
        if gpu_info.is_mali() {
            self.inner.driver().reinit_kernel(kernel)?;
        }

        let mut times_ms = Vec::with_capacity(candidates.len());
        for (range, record) in candidates.iter().zip(&self.records) {
            let time_ms = record.first_event().elapsed_ms()?;
            debug!("work-group candidate {range}: {time_ms:.3} ms");
            times_ms.push(time_ms);
        }

        let best = pick_best_index(&times_ms, unreliable_timers);
        info!(
            "work-group search over {} candidates on {}: best {} ({:.3} ms)",
            candidates.len(),
            gpu_info,
            candidates[best],
            times_ms[best]
        );
        Ok(best)
    }
}

/// Argmin over per-candidate milliseconds; strict `<`, so the first minimum
/// wins ties.
///
/// With `filter_anomalies` set the readings first go through the two-sided
/// filter: the mean is taken over readings below [`ANOMALY_CEILING_MS`],
/// and the argmin skips readings below [`ANOMALY_FLOOR_FACTOR`] of that
/// mean. When every reading sits above the ceiling the mean is NaN, every
/// comparison fails, and index 0 stands.
fn pick_best_index(times_ms: &[f64], filter_anomalies: bool) -> usize {
    let mut best_index = 0;
    let mut best_time = f64::MAX;

    if filter_anomalies {
        let mut mean = 0.0;
        let mut samples = 0usize;
        for &time in times_ms {
            if time < ANOMALY_CEILING_MS {
                mean += time;
                samples += 1;
            }
        }
        mean /= samples as f64;
        for (i, &time) in times_ms.iter().enumerate() {
            if time < best_time && time >= ANOMALY_FLOOR_FACTOR * mean {
                best_index = i;
                best_time = time;
            }
        }
    } else {
        for (i, &time) in times_ms.iter().enumerate() {
            if time < best_time {
                best_index = i;
                best_time = time;
            }
        }
    }
    best_index
}

/// Cache-backed work-group selection.
///
/// Wraps a [`TuningCache`] around the queue search: a cached shape is
/// returned without touching the device, otherwise the search runs and its
/// winner is stored under the device + kernel key.
pub struct Autotuner {
    cache: TuningCache,
}

impl Autotuner {
    pub fn new(cache: TuningCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &TuningCache {
        &self.cache
    }

    /// The best launch shape for `kernel_name`, from cache or from a fresh
    /// search on `queue`.
    pub fn best_work_group<D: Driver>(
        &mut self,
        queue: &mut ProfilingCommandQueue<D>,
        kernel: &mut D::Kernel,
        kernel_name: &str,
        gpu_info: &GpuInfo,
        candidates: &[NdRange],
    ) -> Result<NdRange> {
        let key = TuningCache::key(gpu_info, kernel_name);
        if let Some(range) = self.cache.get(&key) {
            debug!("tuning cache hit for '{key}': {range}");
            return Ok(range);
        }
        let index = queue.best_work_group_index(kernel, gpu_info, candidates)?;
        let best = candidates[index];
        self.cache.insert(key, best);
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- plain argmin --

    #[test]
    fn test_first_minimum_wins() {
        assert_eq!(pick_best_index(&[5.0, 3.0, 9.0, 3.0], false), 1);
    }

    #[test]
    fn test_tie_keeps_earliest() {
        assert_eq!(pick_best_index(&[3.0, 5.0, 3.0], false), 0);
    }

    #[test]
    fn test_single_candidate() {
        assert_eq!(pick_best_index(&[42.0], false), 0);
    }

    #[test]
    fn test_empty_defaults_to_zero() {
        // The public search rejects empty candidate lists before this runs.
        assert_eq!(pick_best_index(&[], false), 0);
        assert_eq!(pick_best_index(&[], true), 0);
    }

    // -- anomaly filter --

    #[test]
    fn test_filter_rejects_glitched_extremes() {
        // 200000 is excluded from the mean; 0.05 falls below a tenth of it;
        // the sane 1 ms reading at index 0 wins.
        assert_eq!(pick_best_index(&[1.0, 200_000.0, 2.0, 0.05], true), 0);
    }

    #[test]
    fn test_ceiling_only_shields_the_mean() {
        // Mean over {5} = 5, floor 0.5; the glitched reading is excluded
        // from the mean but still participates in the argmin, where it
        // loses on magnitude alone.
        assert_eq!(pick_best_index(&[200_000.0, 5.0], true), 1);
    }

    #[test]
    fn test_filter_floor_excludes_tiny_reading() {
        // Mean ≈ 0.5005, floor ≈ 0.05; 0.001 is skipped, 1.0 wins.
        assert_eq!(pick_best_index(&[1.0, 0.001], true), 0);
    }

    #[test]
    fn test_all_anomalous_falls_back_to_first() {
        // Every reading is above the ceiling: the mean is NaN, every
        // comparison fails, and index 0 stands.
        assert_eq!(pick_best_index(&[200_000.0, 150_000.0, 500_000.0], true), 0);
    }

    #[test]
    fn test_filter_with_sane_readings_only() {
        assert_eq!(pick_best_index(&[5.0, 3.0, 9.0, 3.0], true), 1);
    }
}
