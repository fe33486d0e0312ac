//! The narrow slice of the OpenCL driver the queue layer depends on.
//!
//! Everything above this trait ([`CommandQueue`](crate::CommandQueue),
//! [`ProfilingCommandQueue`](crate::ProfilingCommandQueue) and the
//! work-group search) is driver-agnostic. Two implementations ship:
//! `opencl::OpenClDriver` maps straight onto `opencl3` calls (feature
//! `opencl`), and [`SimDriver`](crate::sim::SimDriver) replays scripted
//! timings so the whole layer can be exercised without hardware.

use std::time::Duration;

use crate::error::Result;

/// A driver event with profiling timestamps.
///
/// Timestamps are device-clock nanoseconds for the command-start and
/// command-end transitions; they are only meaningful on queues created with
/// profiling enabled, and only after the command has completed.
pub trait DriverEvent {
    /// Block until the associated command has completed.
    fn wait(&self) -> Result<()>;

    /// Device timestamp (ns) when the command started executing.
    fn started_ns(&self) -> Result<u64>;

    /// Device timestamp (ns) when the command finished executing.
    fn finished_ns(&self) -> Result<u64>;

    /// Execution span of the command.
    fn elapsed(&self) -> Result<Duration> {
        let start = self.started_ns()?;
        let end = self.finished_ns()?;
        Ok(Duration::from_nanos(end.saturating_sub(start)))
    }

    /// Execution span in milliseconds. The tuning heuristics operate in this
    /// unit because their thresholds are defined in it.
    fn elapsed_ms(&self) -> Result<f64> {
        Ok(self.elapsed()?.as_nanos() as f64 / 1_000_000.0)
    }
}

/// Driver entry points consumed by the queue layer.
///
/// Handles are associated types so each implementation keeps its native
/// representations; the queue layer never inspects them.
pub trait Driver: Send + Sync {
    type Device;
    type Context;
    type Queue;
    type Event: DriverEvent;
    type Kernel;
    type Buffer;
    type Image;

    /// Create a command queue on `device`. Profiling queues are created with
    /// the driver's profiling property enabled, plain queues with none.
    fn create_queue(
        &self,
        device: &Self::Device,
        context: &Self::Context,
        enable_profiling: bool,
    ) -> Result<Self::Queue>;

    /// Give a queue handle back to the driver.
    fn release_queue(&self, queue: Self::Queue);

    /// Submit a 3-D ND-range launch. Returns an event only when `want_event`
    /// is set; otherwise none is retained.
    fn launch_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global: [usize; 3],
        local: [usize; 3],
        want_event: bool,
    ) -> Result<Option<Self::Event>>;

    /// Enqueue a marker and return its event.
    fn enqueue_marker(&self, queue: &Self::Queue) -> Result<Self::Event>;

    /// Submit buffered commands to the device without waiting.
    fn flush(&self, queue: &Self::Queue) -> Result<()>;

    /// Block until every command in the queue has completed.
    fn finish(&self, queue: &Self::Queue) -> Result<()>;

    /// # Safety
    ///
    /// With `blocking` false the transfer may still be in flight when the
    /// call returns; `data` must stay valid until the queue synchronizes.
    unsafe fn write_buffer(
        &self,
        queue: &Self::Queue,
        buffer: &mut Self::Buffer,
        data: &[u8],
        blocking: bool,
    ) -> Result<()>;

    /// # Safety
    ///
    /// With `blocking` false the transfer may still be in flight when the
    /// call returns; `out` must stay valid and unaliased until the queue
    /// synchronizes.
    unsafe fn read_buffer(
        &self,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        out: &mut [u8],
        blocking: bool,
    ) -> Result<()>;

    /// Write an image region starting at origin (0,0,0) with tight pitches.
    ///
    /// # Safety
    ///
    /// Same contract as [`Driver::write_buffer`].
    unsafe fn write_image(
        &self,
        queue: &Self::Queue,
        image: &mut Self::Image,
        region: [usize; 3],
        data: &[u8],
        blocking: bool,
    ) -> Result<()>;

    /// Read an image region starting at origin (0,0,0) with tight pitches.
    ///
    /// # Safety
    ///
    /// Same contract as [`Driver::read_buffer`].
    unsafe fn read_image(
        &self,
        queue: &Self::Queue,
        image: &mut Self::Image,
        region: [usize; 3],
        out: &mut [u8],
        blocking: bool,
    ) -> Result<()>;

    /// Drop and recreate the driver-side kernel object. Used after a tuning
    /// search on drivers that grow a kernel pool per launch.
    fn reinit_kernel(&self, kernel: &mut Self::Kernel) -> Result<()>;
}
