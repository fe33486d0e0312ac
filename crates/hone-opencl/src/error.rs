//! Error types for the queue layer.

use thiserror::Error;

/// Errors produced by queue operations.
///
/// Variants that wrap a failed driver call carry the driver's readable error
/// text (for OpenCL, the error-code name such as `CL_OUT_OF_RESOURCES`).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to create a command queue: {0}")]
    CreateQueue(String),

    #[error("failed to enqueue ND-range kernel: {0}")]
    EnqueueKernel(String),

    #[error("failed to enqueue marker: {0}")]
    EnqueueMarker(String),

    #[error("failed to upload data to GPU (write buffer): {0}")]
    WriteBuffer(String),

    #[error("failed to read data from GPU (read buffer): {0}")]
    ReadBuffer(String),

    #[error("failed to upload data to GPU (write image): {0}")]
    WriteImage(String),

    #[error("failed to read data from GPU (read image): {0}")]
    ReadImage(String),

    #[error("failed to flush command queue: {0}")]
    Flush(String),

    #[error("failed to finish command queue: {0}")]
    Finish(String),

    #[error("failed to wait for event: {0}")]
    EventWait(String),

    #[error("failed to query event profiling info: {0}")]
    EventProfile(String),

    #[error("failed to build program: {0}")]
    ProgramBuild(String),

    #[error("failed to create kernel: {0}")]
    KernelCreate(String),

    #[error("failed to re-initialize kernel: {0}")]
    KernelReinit(String),

    #[error("command queue handle already released")]
    QueueReleased,

    #[error("work-group autotuning requires at least one candidate")]
    NoCandidates,

    #[error("no OpenCL GPU device available: {0}")]
    NoDevice(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, QueueError>;
