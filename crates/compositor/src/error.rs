use crate::backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to initialise main render target: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to spawn render worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("render worker panicked")]
    WorkerPanicked,
    /// `start` was called from a photo callback or frame sink.
    #[error("the stream cannot be started from its own render worker")]
    OnRenderWorker,
    /// A previous worker failure took the backend with it.
    #[error("compositor is no longer available")]
    Unavailable,
}
