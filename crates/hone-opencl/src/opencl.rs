//! OpenCL backend built on the `opencl3` crate.
//!
//! Compiled only with the `opencl` feature, because it links against the
//! system OpenCL ICD loader. [`OpenClDriver`] maps each driver call onto
//! the corresponding `clEnqueue*` entry point, so the queue and profiling
//! layers behave on real hardware exactly as they do against the simulated
//! driver.
//!
//! ```no_run
//! use std::sync::Arc;
//! use opencl3::context::Context;
//! use hone_opencl::opencl::{build_program, find_gpu_device, gpu_info_for, ClKernel, OpenClDriver};
//! use hone_opencl::ProfilingCommandQueue;
//!
//! let device = find_gpu_device()?;
//! let gpu = gpu_info_for(&device);
//! let context = Context::from_device(&device)
//!     .map_err(|e| hone_opencl::QueueError::CreateQueue(e.to_string()))?;
//! let program = build_program(&context, "__kernel void noop() {}", "")?;
//! let mut kernel = ClKernel::new(program, "noop")?;
//! let mut queue = ProfilingCommandQueue::create(Arc::new(OpenClDriver), &device, &context)?;
//! # let _ = (&gpu, &mut kernel, &mut queue);
//! # Ok::<(), hone_opencl::QueueError>(())
//! ```

use std::ptr;
use std::sync::Arc;

use log::debug;
use opencl3::command_queue::{CommandQueue as ClCommandQueue, CL_QUEUE_PROFILING_ENABLE};
use opencl3::context::Context;
use opencl3::device::{Device, CL_DEVICE_TYPE_GPU};
use opencl3::event::Event;
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, Image};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{cl_bool, CL_BLOCKING, CL_NON_BLOCKING};

use hone_device::GpuInfo;

use crate::driver::{Driver, DriverEvent};
use crate::error::{QueueError, Result};

// ── Device discovery ───────────────────────────────────────────────────────

/// Pick the first GPU device any OpenCL platform reports.
pub fn find_gpu_device() -> Result<Device> {
    let platforms = get_platforms().map_err(|e| QueueError::NoDevice(e.to_string()))?;
    for platform in &platforms {
        let device_ids = platform.get_devices(CL_DEVICE_TYPE_GPU).unwrap_or_default();
        if let Some(&id) = device_ids.first() {
            let device = Device::new(id);
            debug!(
                "selected OpenCL device: {}",
                device.name().unwrap_or_default().trim()
            );
            return Ok(device);
        }
    }
    Err(QueueError::NoDevice(
        "no GPU device reported by any OpenCL platform".into(),
    ))
}

/// Classify a device into the vendor/series info the tuning layer consumes.
pub fn gpu_info_for(device: &Device) -> GpuInfo {
    let name = device.name().unwrap_or_default();
    let vendor = device.vendor().unwrap_or_default();
    GpuInfo::from_device_strings(name.trim(), vendor.trim())
}

// ── Programs and kernels ───────────────────────────────────────────────────

/// Compile a program from OpenCL C source.
pub fn build_program(context: &Context, source: &str, options: &str) -> Result<Arc<Program>> {
    Program::create_and_build_from_source(context, source, options)
        .map(Arc::new)
        .map_err(|e| QueueError::ProgramBuild(e.to_string()))
}

/// A compiled kernel together with the program it came from, so the kernel
/// object can be re-created in place after a tuning pass has cycled its
/// arguments through many work-group shapes.
pub struct ClKernel {
    kernel: Kernel,
    program: Arc<Program>,
    name: String,
}

impl ClKernel {
    pub fn new(program: Arc<Program>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let kernel =
            Kernel::create(&program, &name).map_err(|e| QueueError::KernelCreate(e.to_string()))?;
        Ok(Self {
            kernel,
            program,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying kernel object, for binding arguments.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn reinit(&mut self) -> Result<()> {
        self.kernel = Kernel::create(&self.program, &self.name)
            .map_err(|e| QueueError::KernelReinit(e.to_string()))?;
        Ok(())
    }
}

impl std::fmt::Debug for ClKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClKernel").field("name", &self.name).finish()
    }
}

// ── Events ─────────────────────────────────────────────────────────────────

impl DriverEvent for Event {
    fn wait(&self) -> Result<()> {
        Event::wait(self).map_err(|e| QueueError::EventWait(e.to_string()))
    }

    fn started_ns(&self) -> Result<u64> {
        self.profiling_command_start()
            .map_err(|e| QueueError::EventProfile(e.to_string()))
    }

    fn finished_ns(&self) -> Result<u64> {
        self.profiling_command_end()
            .map_err(|e| QueueError::EventProfile(e.to_string()))
    }
}

// ── Driver ─────────────────────────────────────────────────────────────────

/// Driver backed by a real OpenCL runtime.
pub struct OpenClDriver;

impl OpenClDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenClDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn cl_blocking(blocking: bool) -> cl_bool {
    if blocking {
        CL_BLOCKING
    } else {
        CL_NON_BLOCKING
    }
}

impl Driver for OpenClDriver {
    type Device = Device;
    type Context = Context;
    type Queue = ClCommandQueue;
    type Event = Event;
    type Kernel = ClKernel;
    type Buffer = Buffer<u8>;
    type Image = Image;

    fn create_queue(
        &self,
        device: &Device,
        context: &Context,
        enable_profiling: bool,
    ) -> Result<ClCommandQueue> {
        let properties = if enable_profiling {
            CL_QUEUE_PROFILING_ENABLE
        } else {
            0
        };
        // SAFETY: the caller supplies a device belonging to `context`.
        unsafe {
            ClCommandQueue::create_with_properties(context, device.id(), properties, 0)
                .map_err(|e| QueueError::CreateQueue(e.to_string()))
        }
    }

    fn release_queue(&self, queue: ClCommandQueue) {
        // Dropping the wrapper releases the underlying handle.
        drop(queue);
    }

    fn launch_kernel(
        &self,
        queue: &ClCommandQueue,
        kernel: &ClKernel,
        global: [usize; 3],
        local: [usize; 3],
        want_event: bool,
    ) -> Result<Option<Event>> {
        // SAFETY: the kernel's arguments were bound by the caller, the size
        // arrays hold exactly three elements, and both handles stay valid
        // for the duration of the call.
        let event = unsafe {
            queue
                .enqueue_nd_range_kernel(
                    kernel.kernel().get(),
                    3,
                    ptr::null(),
                    global.as_ptr(),
                    local.as_ptr(),
                    &[],
                )
                .map_err(|e| QueueError::EnqueueKernel(e.to_string()))?
        };
        if want_event {
            Ok(Some(event))
        } else {
            // Dropping the event releases it without waiting.
            Ok(None)
        }
    }

    fn enqueue_marker(&self, queue: &ClCommandQueue) -> Result<Event> {
        // SAFETY: the wait list is empty and the queue handle is valid.
        unsafe {
            queue
                .enqueue_marker_with_wait_list(&[])
                .map_err(|e| QueueError::EnqueueMarker(e.to_string()))
        }
    }

    fn flush(&self, queue: &ClCommandQueue) -> Result<()> {
        queue.flush().map_err(|e| QueueError::Flush(e.to_string()))
    }

    fn finish(&self, queue: &ClCommandQueue) -> Result<()> {
        queue
            .finish()
            .map_err(|e| QueueError::Finish(e.to_string()))
    }

    unsafe fn write_buffer(
        &self,
        queue: &ClCommandQueue,
        buffer: &mut Buffer<u8>,
        data: &[u8],
        blocking: bool,
    ) -> Result<()> {
        // SAFETY: the caller upholds the trait's lifetime contract for
        // non-blocking transfers; a blocking transfer completes before
        // `data`'s borrow ends.
        unsafe {
            queue
                .enqueue_write_buffer(buffer, cl_blocking(blocking), 0, data, &[])
                .map_err(|e| QueueError::WriteBuffer(e.to_string()))?;
        }
        Ok(())
    }

    unsafe fn read_buffer(
        &self,
        queue: &ClCommandQueue,
        buffer: &Buffer<u8>,
        out: &mut [u8],
        blocking: bool,
    ) -> Result<()> {
        // SAFETY: as for `write_buffer`, with `out` writable for the span
        // the contract requires.
        unsafe {
            queue
                .enqueue_read_buffer(buffer, cl_blocking(blocking), 0, out, &[])
                .map_err(|e| QueueError::ReadBuffer(e.to_string()))?;
        }
        Ok(())
    }

    unsafe fn write_image(
        &self,
        queue: &ClCommandQueue,
        image: &mut Image,
        region: [usize; 3],
        data: &[u8],
        blocking: bool,
    ) -> Result<()> {
        let origin = [0usize, 0, 0];
        // SAFETY: origin/region hold three elements each, pitch 0 lets the
        // runtime derive row/slice strides, and the caller upholds the
        // trait's lifetime contract for non-blocking transfers.
        unsafe {
            queue
                .enqueue_write_image(
                    image,
                    cl_blocking(blocking),
                    origin.as_ptr(),
                    region.as_ptr(),
                    0,
                    0,
                    data.as_ptr() as *mut _,
                    &[],
                )
                .map_err(|e| QueueError::WriteImage(e.to_string()))?;
        }
        Ok(())
    }

    unsafe fn read_image(
        &self,
        queue: &ClCommandQueue,
        image: &mut Image,
        region: [usize; 3],
        out: &mut [u8],
        blocking: bool,
    ) -> Result<()> {
        let origin = [0usize, 0, 0];
        // SAFETY: same contract as `write_image`, with `out` writable for
        // the span the contract requires.
        unsafe {
            queue
                .enqueue_read_image(
                    image,
                    cl_blocking(blocking),
                    origin.as_ptr(),
                    region.as_ptr(),
                    0,
                    0,
                    out.as_mut_ptr() as *mut _,
                    &[],
                )
                .map_err(|e| QueueError::ReadImage(e.to_string()))?;
        }
        Ok(())
    }

    fn reinit_kernel(&self, kernel: &mut ClKernel) -> Result<()> {
        kernel.reinit()
    }
}
