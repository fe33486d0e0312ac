//! GPU command-queue, profiling, and work-group autotuning layer.
//!
//! This crate wraps an ordered device queue with three layers:
//!
//! - [`CommandQueue`]: kernel dispatch and host↔device buffer/image
//!   transfers on a single queue, with exactly-once handle release.
//! - [`ProfilingCommandQueue`]: the same queue created with profiling
//!   enabled, recording per-dispatch events so labelled GPU timings can be
//!   aggregated and reported after a run.
//! - Work-group autotuning (`best_work_group_index`, [`Autotuner`]): times
//!   a kernel across candidate work-group shapes and picks the fastest,
//!   with anomaly filtering for devices whose timers misreport, and a
//!   JSON-backed [`TuningCache`] so the search runs once per device/kernel
//!   pair.
//!
//! Everything above the [`Driver`] trait is backend-agnostic. The `opencl`
//! feature enables `opencl::OpenClDriver`, which maps onto `opencl3` calls;
//! [`sim::SimDriver`] replays scripted timings so the full stack can run in
//! tests without a GPU.
//!
//! ```
//! use std::sync::Arc;
//! use hone_device::GpuInfo;
//! use hone_opencl::sim::{SimContext, SimDevice, SimDriver, SimKernel};
//! use hone_opencl::{Dim3, NdRange, ProfilingCommandQueue};
//!
//! let driver = Arc::new(SimDriver::new());
//! driver.script_launch_times_ms(&[5.0, 3.0, 9.0, 3.0]);
//!
//! let mut queue = ProfilingCommandQueue::create(Arc::clone(&driver), &SimDevice, &SimContext)?;
//! let mut kernel = SimKernel::new("vec_add");
//! let gpu = GpuInfo::from_device_strings("NVIDIA GeForce RTX 3080", "NVIDIA Corporation");
//!
//! let candidates: Vec<NdRange> = [(8, 1, 1), (8, 4, 1), (16, 1, 1), (8, 8, 1)]
//!     .into_iter()
//!     .map(|(x, y, z)| NdRange::new(Dim3::new(64, 64, 1), Dim3::new(x, y, z)))
//!     .collect();
//! let best = queue.best_work_group_index(&mut kernel, &gpu, &candidates)?;
//! assert_eq!(best, 1);
//! # Ok::<(), hone_opencl::QueueError>(())
//! ```

pub mod cache;
pub mod dims;
pub mod driver;
pub mod error;
pub mod profiling;
pub mod queue;
pub mod sim;
pub mod tuning;

#[cfg(feature = "opencl")]
pub mod opencl;

// Re-exports for convenience.
pub use cache::{CacheError, TuningCache, CACHE_PATH_ENV};
pub use dims::{Dim3, NdRange};
pub use driver::{Driver, DriverEvent};
pub use error::{QueueError, Result};
pub use hone_device::GpuInfo;
pub use profiling::{DispatchInfo, ProfilingCommandQueue, ProfilingInfo};
pub use queue::CommandQueue;
pub use tuning::Autotuner;
