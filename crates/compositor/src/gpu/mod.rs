//! `wgpu` implementation of [`GpuBackend`](crate::GpuBackend).

mod backend;
mod device;
mod pipeline;
mod shaders;
mod target;
mod uniforms;

pub use backend::WgpuBackend;
pub use device::{GpuOptions, PowerPreference};
pub use target::{FrameSink, WgpuSurface, WgpuTarget, WindowTarget};
