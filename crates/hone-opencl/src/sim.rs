//! Simulated driver with scripted timings.
//!
//! Stands in for the OpenCL runtime in tests and benchmarks: launches take
//! whatever durations a test scripts, events carry timestamps from an
//! advancing device clock, and every driver call is counted so tests can
//! assert on the exact traffic the queue layer produces.
//!
//! ```
//! use std::sync::Arc;
//! use hone_opencl::sim::{SimContext, SimDevice, SimDriver, SimKernel};
//! use hone_opencl::{CommandQueue, Dim3, NdRange};
//!
//! let driver = Arc::new(SimDriver::new());
//! let queue = CommandQueue::create(Arc::clone(&driver), &SimDevice, &SimContext)?;
//! let kernel = SimKernel::new("scale");
//! queue.dispatch(&kernel, NdRange::new(Dim3::new(4, 1, 1), Dim3::new(64, 1, 1)))?;
//! assert_eq!(driver.stats().launches, 1);
//! # Ok::<(), hone_opencl::QueueError>(())
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::driver::{Driver, DriverEvent};
use crate::error::{QueueError, Result};

const DEFAULT_LAUNCH_NS: u64 = 1_000_000; // 1 ms

// ── Handles ────────────────────────────────────────────────────────────────

pub struct SimDevice;

pub struct SimContext;

#[derive(Debug)]
pub struct SimQueue {
    pub id: usize,
    pub profiling: bool,
}

/// A launchable kernel; counts how often the driver re-created it.
#[derive(Debug)]
pub struct SimKernel {
    pub name: String,
    pub reinit_count: usize,
}

impl SimKernel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reinit_count: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SimBuffer {
    pub data: Vec<u8>,
}

impl SimBuffer {
    pub fn new(len: usize) -> Self {
        Self { data: vec![0; len] }
    }
}

#[derive(Debug, Default)]
pub struct SimImage {
    pub data: Vec<u8>,
}

impl SimImage {
    pub fn new(len: usize) -> Self {
        Self { data: vec![0; len] }
    }
}

// ── Events ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SimEventState {
    start_ns: u64,
    end_ns: u64,
    waits: AtomicUsize,
}

/// An event with fixed timestamps stamped at submission.
#[derive(Debug, Clone)]
pub struct SimEvent {
    state: Arc<SimEventState>,
}

impl SimEvent {
    fn new(start_ns: u64, end_ns: u64) -> Self {
        Self {
            state: Arc::new(SimEventState {
                start_ns,
                end_ns,
                waits: AtomicUsize::new(0),
            }),
        }
    }

    /// How often [`DriverEvent::wait`] ran against this event.
    pub fn wait_count(&self) -> usize {
        self.state.waits.load(Ordering::SeqCst)
    }
}

impl DriverEvent for SimEvent {
    fn wait(&self) -> Result<()> {
        self.state.waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn started_ns(&self) -> Result<u64> {
        Ok(self.state.start_ns)
    }

    fn finished_ns(&self) -> Result<u64> {
        Ok(self.state.end_ns)
    }
}

// ── Call recording ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Buffer,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
}

/// One buffer/image transfer as it reached the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRecord {
    pub kind: TransferKind,
    pub direction: TransferDirection,
    /// The blocking flag the driver was actually handed.
    pub blocking: bool,
    pub bytes: usize,
}

/// One ND-range submission as it reached the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRecord {
    pub global: [usize; 3],
    pub local: [usize; 3],
    pub want_event: bool,
}

/// Driver call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub queues_created: usize,
    pub queues_released: usize,
    /// Launch attempts, including ones that were failed by fault injection.
    pub launches: usize,
    /// Events materialized for launches and markers.
    pub events_created: usize,
    pub markers: usize,
    pub flushes: usize,
    pub finishes: usize,
    pub kernel_reinits: usize,
}

#[derive(Default)]
struct SimState {
    stats: SimStats,
    clock_ns: u64,
    idle_gap_ns: u64,
    scripted_ns: VecDeque<u64>,
    events: Vec<SimEvent>,
    transfers: Vec<TransferRecord>,
    launch_log: Vec<LaunchRecord>,
    fail_launch_at: Option<usize>,
}

// ── Driver ─────────────────────────────────────────────────────────────────

/// Deterministic in-process driver.
///
/// Launch durations come from the script (falling back to 1 ms), the device
/// clock advances by each launch's duration plus the configured idle gap,
/// and events are stamped with the resulting start/finish times.
pub struct SimDriver {
    state: Mutex<SimState>,
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
        }
    }

    /// Append per-launch durations, in milliseconds, to the script.
    pub fn script_launch_times_ms(&self, times_ms: &[f64]) {
        let mut state = self.lock();
        state
            .scripted_ns
            .extend(times_ms.iter().map(|ms| (ms * 1e6) as u64));
    }

    /// Device idle time inserted before every launch, so event spans and
    /// wall spans can differ in tests.
    pub fn set_idle_gap(&self, gap: Duration) {
        self.lock().idle_gap_ns = gap.as_nanos() as u64;
    }

    /// Fail the `index`-th launch attempt (0-based) with a driver error.
    pub fn fail_launch_at(&self, index: usize) {
        self.lock().fail_launch_at = Some(index);
    }

    pub fn stats(&self) -> SimStats {
        self.lock().stats
    }

    /// Every event materialized so far, in creation order.
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.lock().transfers.clone()
    }

    /// Every launch attempt so far, in submission order.
    pub fn launch_log(&self) -> Vec<LaunchRecord> {
        self.lock().launch_log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        // A poisoned lock means a test already panicked; propagate the data.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for SimDriver {
    type Device = SimDevice;
    type Context = SimContext;
    type Queue = SimQueue;
    type Event = SimEvent;
    type Kernel = SimKernel;
    type Buffer = SimBuffer;
    type Image = SimImage;

    fn create_queue(
        &self,
        _device: &SimDevice,
        _context: &SimContext,
        enable_profiling: bool,
    ) -> Result<SimQueue> {
        let mut state = self.lock();
        let id = state.stats.queues_created;
        state.stats.queues_created += 1;
        Ok(SimQueue {
            id,
            profiling: enable_profiling,
        })
    }

    fn release_queue(&self, queue: SimQueue) {
        let mut state = self.lock();
        state.stats.queues_released += 1;
        drop(queue);
    }

    fn launch_kernel(
        &self,
        _queue: &SimQueue,
        _kernel: &SimKernel,
        global: [usize; 3],
        local: [usize; 3],
        want_event: bool,
    ) -> Result<Option<SimEvent>> {
        let mut state = self.lock();
        let index = state.stats.launches;
        state.stats.launches += 1;
        state.launch_log.push(LaunchRecord {
            global,
            local,
            want_event,
        });
        if state.fail_launch_at == Some(index) {
            return Err(QueueError::EnqueueKernel("simulated launch failure".into()));
        }

        let duration = state
            .scripted_ns
            .pop_front()
            .unwrap_or(DEFAULT_LAUNCH_NS);
        let start = state.clock_ns + state.idle_gap_ns;
        let end = start + duration;
        state.clock_ns = end;

        if want_event {
            let event = SimEvent::new(start, end);
            state.stats.events_created += 1;
            state.events.push(event.clone());
            Ok(Some(event))
        } else {
            Ok(None)
        }
    }

    fn enqueue_marker(&self, _queue: &SimQueue) -> Result<SimEvent> {
        let mut state = self.lock();
        let now = state.clock_ns;
        let event = SimEvent::new(now, now);
        state.stats.markers += 1;
        state.stats.events_created += 1;
        state.events.push(event.clone());
        Ok(event)
    }

    fn flush(&self, _queue: &SimQueue) -> Result<()> {
        self.lock().stats.flushes += 1;
        Ok(())
    }

    fn finish(&self, _queue: &SimQueue) -> Result<()> {
        self.lock().stats.finishes += 1;
        Ok(())
    }

    unsafe fn write_buffer(
        &self,
        _queue: &SimQueue,
        buffer: &mut SimBuffer,
        data: &[u8],
        blocking: bool,
    ) -> Result<()> {
        if buffer.data.len() < data.len() {
            buffer.data.resize(data.len(), 0);
        }
        buffer.data[..data.len()].copy_from_slice(data);
        self.lock().transfers.push(TransferRecord {
            kind: TransferKind::Buffer,
            direction: TransferDirection::HostToDevice,
            blocking,
            bytes: data.len(),
        });
        Ok(())
    }

    unsafe fn read_buffer(
        &self,
        _queue: &SimQueue,
        buffer: &SimBuffer,
        out: &mut [u8],
        blocking: bool,
    ) -> Result<()> {
        let n = out.len().min(buffer.data.len());
        out[..n].copy_from_slice(&buffer.data[..n]);
        self.lock().transfers.push(TransferRecord {
            kind: TransferKind::Buffer,
            direction: TransferDirection::DeviceToHost,
            blocking,
            bytes: out.len(),
        });
        Ok(())
    }

    unsafe fn write_image(
        &self,
        _queue: &SimQueue,
        image: &mut SimImage,
        _region: [usize; 3],
        data: &[u8],
        blocking: bool,
    ) -> Result<()> {
        if image.data.len() < data.len() {
            image.data.resize(data.len(), 0);
        }
        image.data[..data.len()].copy_from_slice(data);
        self.lock().transfers.push(TransferRecord {
            kind: TransferKind::Image,
            direction: TransferDirection::HostToDevice,
            blocking,
            bytes: data.len(),
        });
        Ok(())
    }

    unsafe fn read_image(
        &self,
        _queue: &SimQueue,
        image: &mut SimImage,
        _region: [usize; 3],
        out: &mut [u8],
        blocking: bool,
    ) -> Result<()> {
        let n = out.len().min(image.data.len());
        out[..n].copy_from_slice(&image.data[..n]);
        self.lock().transfers.push(TransferRecord {
            kind: TransferKind::Image,
            direction: TransferDirection::DeviceToHost,
            blocking,
            bytes: out.len(),
        });
        Ok(())
    }

    fn reinit_kernel(&self, kernel: &mut SimKernel) -> Result<()> {
        kernel.reinit_count += 1;
        self.lock().stats.kernel_reinits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(driver: &SimDriver, queue: &SimQueue, want_event: bool) -> Option<SimEvent> {
        let kernel = SimKernel::new("k");
        driver
            .launch_kernel(queue, &kernel, [64, 1, 1], [8, 1, 1], want_event)
            .unwrap()
    }

    #[test]
    fn test_clock_advances_per_launch() {
        let driver = SimDriver::new();
        driver.script_launch_times_ms(&[2.0, 3.0]);
        let queue = driver.create_queue(&SimDevice, &SimContext, true).unwrap();

        let first = launch(&driver, &queue, true).unwrap();
        let second = launch(&driver, &queue, true).unwrap();

        assert_eq!(first.started_ns().unwrap(), 0);
        assert_eq!(first.finished_ns().unwrap(), 2_000_000);
        assert_eq!(second.started_ns().unwrap(), 2_000_000);
        assert_eq!(second.finished_ns().unwrap(), 5_000_000);
    }

    #[test]
    fn test_default_duration_when_script_runs_out() {
        let driver = SimDriver::new();
        let queue = driver.create_queue(&SimDevice, &SimContext, true).unwrap();
        let event = launch(&driver, &queue, true).unwrap();
        assert_eq!(event.elapsed().unwrap(), Duration::from_millis(1));
    }

    #[test]
    fn test_idle_gap_separates_launches() {
        let driver = SimDriver::new();
        driver.script_launch_times_ms(&[1.0, 1.0]);
        driver.set_idle_gap(Duration::from_millis(5));
        let queue = driver.create_queue(&SimDevice, &SimContext, true).unwrap();

        let first = launch(&driver, &queue, true).unwrap();
        let second = launch(&driver, &queue, true).unwrap();
        assert_eq!(first.started_ns().unwrap(), 5_000_000);
        assert_eq!(second.started_ns().unwrap(), 11_000_000);
    }

    #[test]
    fn test_unwanted_event_still_consumes_time() {
        let driver = SimDriver::new();
        driver.script_launch_times_ms(&[2.0, 3.0]);
        let queue = driver.create_queue(&SimDevice, &SimContext, true).unwrap();

        assert!(launch(&driver, &queue, false).is_none());
        let event = launch(&driver, &queue, true).unwrap();
        assert_eq!(event.started_ns().unwrap(), 2_000_000);
        assert_eq!(driver.stats().events_created, 1);
        assert_eq!(driver.stats().launches, 2);
    }

    #[test]
    fn test_fault_injection() {
        let driver = SimDriver::new();
        driver.fail_launch_at(1);
        let queue = driver.create_queue(&SimDevice, &SimContext, true).unwrap();

        assert!(launch(&driver, &queue, true).is_some());
        let kernel = SimKernel::new("k");
        let err = driver
            .launch_kernel(&queue, &kernel, [1, 1, 1], [1, 1, 1], true)
            .unwrap_err();
        assert!(matches!(err, QueueError::EnqueueKernel(_)));
        assert_eq!(driver.stats().launches, 2);
    }

    #[test]
    fn test_wait_counting() {
        let driver = SimDriver::new();
        let queue = driver.create_queue(&SimDevice, &SimContext, true).unwrap();
        let event = launch(&driver, &queue, true).unwrap();
        assert_eq!(event.wait_count(), 0);
        event.wait().unwrap();
        event.wait().unwrap();
        assert_eq!(event.wait_count(), 2);
        // The driver's copy observes the same state.
        assert_eq!(driver.events()[0].wait_count(), 2);
    }

    #[test]
    fn test_marker_has_zero_span() {
        let driver = SimDriver::new();
        driver.script_launch_times_ms(&[4.0]);
        let queue = driver.create_queue(&SimDevice, &SimContext, true).unwrap();
        launch(&driver, &queue, false);

        let marker = driver.enqueue_marker(&queue).unwrap();
        assert_eq!(marker.started_ns().unwrap(), 4_000_000);
        assert_eq!(marker.elapsed().unwrap(), Duration::ZERO);
        assert_eq!(driver.stats().markers, 1);
    }

    #[test]
    fn test_buffer_content_round_trip() {
        let driver = SimDriver::new();
        let queue = driver.create_queue(&SimDevice, &SimContext, false).unwrap();
        let mut buffer = SimBuffer::new(4);
        // SAFETY: blocking transfers against the in-process driver.
        unsafe {
            driver
                .write_buffer(&queue, &mut buffer, &[1, 2, 3, 4], true)
                .unwrap();
            let mut out = [0u8; 4];
            driver.read_buffer(&queue, &buffer, &mut out, true).unwrap();
            assert_eq!(out, [1, 2, 3, 4]);
        }
    }
}
