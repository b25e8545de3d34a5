//! GPU Compute Backend
//!
//! Runs passes as WGSL compute shaders over `Rgba32Float` storage textures
//! using WebGPU (wgpu).

mod device;
pub mod wgsl;

pub use device::{GpuDevice, GpuPipeline, GpuSurface, WgslProgram};

/// Error type for GPU operations.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Buffer mapping callback was dropped")]
    MapCallbackDropped,

    #[error("Synchronous readback is unavailable on this target; use read_async")]
    SyncReadback,
}
