//! The plain command queue.

use std::sync::Arc;

use crate::dims::{Dim3, NdRange};
use crate::driver::Driver;
use crate::error::{QueueError, Result};

/// A command queue on one device.
///
/// The queue owns its driver handle by default and releases it exactly once
/// when dropped; moving the queue moves the handle with it. A queue built
/// with [`wrap`](CommandQueue::wrap) can instead borrow a handle that some
/// other component owns.
pub struct CommandQueue<D: Driver> {
    driver: Arc<D>,
    queue: Option<D::Queue>,
    owns_queue: bool,
}

impl<D: Driver> CommandQueue<D> {
    /// Create a queue with no special properties on `device`.
    pub fn create(driver: Arc<D>, device: &D::Device, context: &D::Context) -> Result<Self> {
        let queue = driver.create_queue(device, context, false)?;
        Ok(Self {
            driver,
            queue: Some(queue),
            owns_queue: true,
        })
    }

    /// Adopt an existing driver handle.
    ///
    /// With `owns_queue` set the handle is released on drop; without it the
    /// caller remains responsible for the handle's lifetime.
    pub fn wrap(driver: Arc<D>, queue: D::Queue, owns_queue: bool) -> Self {
        Self {
            driver,
            queue: Some(queue),
            owns_queue,
        }
    }

    pub fn owns_queue(&self) -> bool {
        self.owns_queue
    }

    pub(crate) fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub(crate) fn handle(&self) -> Result<&D::Queue> {
        self.queue.as_ref().ok_or(QueueError::QueueReleased)
    }

    /// Submit a kernel launch without retaining an event.
    ///
    /// The global size is the elementwise product of the candidate's group
    /// count and group size, always submitted as a 3-D launch.
    pub fn dispatch(&self, kernel: &D::Kernel, range: NdRange) -> Result<()> {
        self.driver
            .launch_kernel(
                self.handle()?,
                kernel,
                range.global_size(),
                range.local_size(),
                false,
            )
            .map(|_| ())
    }

    /// Submit a kernel launch and return its event.
    pub fn dispatch_with_event(&self, kernel: &D::Kernel, range: NdRange) -> Result<D::Event> {
        let event = self.driver.launch_kernel(
            self.handle()?,
            kernel,
            range.global_size(),
            range.local_size(),
            true,
        )?;
        // The driver contract guarantees an event when one was requested.
        event.ok_or_else(|| QueueError::EnqueueKernel("driver returned no event".into()))
    }

    /// Enqueue a marker and return its event.
    pub fn enqueue_marker(&self) -> Result<D::Event> {
        self.driver.enqueue_marker(self.handle()?)
    }

    /// Copy host memory into a device buffer.
    ///
    /// `non_blocking` is accepted for symmetry with the image transfers but
    /// ignored: buffer transfers always block. Blocking is also what makes
    /// this method safe to call; honoring the flag would require the image
    /// transfers' unsafe contract.
    pub fn enqueue_write_buffer(
        &self,
        buffer: &mut D::Buffer,
        data: &[u8],
        non_blocking: bool,
    ) -> Result<()> {
        let _ = non_blocking;
        // SAFETY: the transfer is forced blocking, so `data` cannot be
        // released while the driver still reads it.
        unsafe {
            self.driver
                .write_buffer(self.handle()?, buffer, data, true)
        }
    }

    /// Copy a device buffer into host memory. Always blocks; see
    /// [`enqueue_write_buffer`](Self::enqueue_write_buffer).
    pub fn enqueue_read_buffer(
        &self,
        buffer: &D::Buffer,
        out: &mut [u8],
        non_blocking: bool,
    ) -> Result<()> {
        let _ = non_blocking;
        // SAFETY: forced blocking, as for `enqueue_write_buffer`.
        unsafe { self.driver.read_buffer(self.handle()?, buffer, out, true) }
    }

    /// Copy host memory into an image region (origin (0,0,0), tight
    /// pitches). Unlike buffers, images honor `non_blocking`.
    ///
    /// # Safety
    ///
    /// With `non_blocking` set the call may return while the copy is still
    /// in flight; `data` must stay valid until the queue synchronizes, e.g.
    /// via [`wait_for_completion`](Self::wait_for_completion).
    pub unsafe fn enqueue_write_image(
        &self,
        image: &mut D::Image,
        region: Dim3,
        data: &[u8],
        non_blocking: bool,
    ) -> Result<()> {
        // SAFETY: the caller upholds the lifetime contract when
        // `non_blocking` is set; otherwise the transfer blocks.
        unsafe {
            self.driver.write_image(
                self.handle()?,
                image,
                region.as_array(),
                data,
                !non_blocking,
            )
        }
    }

    /// Copy an image region into host memory. Honors `non_blocking`.
    ///
    /// # Safety
    ///
    /// With `non_blocking` set, `out` must stay valid and unaliased until
    /// the queue synchronizes.
    pub unsafe fn enqueue_read_image(
        &self,
        image: &mut D::Image,
        region: Dim3,
        out: &mut [u8],
        non_blocking: bool,
    ) -> Result<()> {
        // SAFETY: as for `enqueue_write_image`.
        unsafe {
            self.driver.read_image(
                self.handle()?,
                image,
                region.as_array(),
                out,
                !non_blocking,
            )
        }
    }

    /// Submit buffered commands without waiting for them.
    pub fn flush(&self) -> Result<()> {
        self.driver.flush(self.handle()?)
    }

    /// Block until every submitted command has completed.
    pub fn wait_for_completion(&self) -> Result<()> {
        self.driver.finish(self.handle()?)
    }
}

impl<D: Driver> Drop for CommandQueue<D> {
    fn drop(&mut self) {
        if self.owns_queue {
            if let Some(queue) = self.queue.take() {
                self.driver.release_queue(queue);
            }
        }
    }
}
