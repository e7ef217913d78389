//! Real-time video compositing core.
//!
//! A [`StreamCompositor`] owns one shared GPU context and fans every camera
//! frame out to up to four render destinations: an internal composition
//! buffer, an encoder surface, a one-shot photo target and a live preview.
//! A queued chain of filters runs over the composition buffer, and each
//! destination gets its own rotation, flips and (for the preview) aspect fit.
//!
//! All GPU work happens on a single render worker thread. The facade is safe
//! to call from any thread; attach/detach requests are marshaled onto the
//! worker, plain settings are relaxed atomics read at the start of each tick.
//!
//! The GPU API sits behind [`GpuBackend`]; [`gpu::WgpuBackend`] is the
//! production implementation.

pub mod backend;
mod compositor;
mod driver;
mod error;
pub mod filters;
pub mod frame;
pub mod gpu;
mod limiter;
pub mod orientation;
pub mod settings;
mod stats;
mod stream;
mod target;
pub mod types;

pub use backend::{BackendError, GpuBackend, OffscreenPass};
pub use compositor::PhotoCallback;
pub use error::StreamError;
pub use filters::{
    FilterChain, FilterCommand, FilterError, FilterHandle, FilterId, FilterRender, ShaderFilter,
};
pub use frame::{FrameAvailableListener, FrameInput, VideoFrame};
pub use orientation::{ScreenDraw, ScreenTransform, Viewport};
pub use settings::{Flip, FrameSettings};
pub use stats::RenderStats;
pub use stream::StreamCompositor;
pub use types::{AspectRatioMode, Destination, OrientationForced, Size};
