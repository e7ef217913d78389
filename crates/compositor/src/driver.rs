use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::backend::{BackendError, GpuBackend};
use crate::compositor::{Compositor, Shared};
use crate::error::StreamError;
use crate::frame::FrameAvailableListener;
use crate::limiter::frame_interval;
use crate::types::Destination;

const FORCE_RENDER_FALLBACK_FPS: u32 = 30;

pub(crate) enum DriverCommand<S> {
    Draw,
    Attach(Destination, S),
    Detach(Destination),
    Shutdown,
}

/// Why the worker could not be brought up.
pub(crate) enum StartFailure<B: GpuBackend> {
    /// Setup failed; the worker handed the compositor back.
    Setup(Box<Compositor<B>>, BackendError),
    /// The compositor did not survive.
    Lost(StreamError),
}

/// Handle to the render worker thread.
///
/// The worker owns the [`Compositor`] and therefore every GPU object. All
/// requests reach it through one FIFO command channel, so attach, detach and
/// draw ticks execute strictly in submission order. Shutting down returns
/// the compositor so the stream can be started again.
pub(crate) struct RenderDriver<B: GpuBackend> {
    commands: Sender<DriverCommand<B::Surface>>,
    join_handle: Option<JoinHandle<Compositor<B>>>,
    shared: Arc<Shared>,
}

impl<B: GpuBackend> RenderDriver<B> {
    pub fn spawn(compositor: Compositor<B>, shared: Arc<Shared>) -> Result<Self, StartFailure<B>> {
        let (ready_tx, ready_rx) = bounded(1);
        let (command_tx, command_rx) = unbounded();
        let input = compositor.input().clone();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("framecast-render".into())
            .spawn(move || run_render_thread(compositor, worker_shared, command_rx, ready_tx))
            .map_err(|err| StartFailure::Lost(StreamError::WorkerSpawn(err)))?;

        let setup = match ready_rx.recv() {
            Ok(result) => result,
            // The worker dropped the handshake without answering; it panicked.
            Err(_) => {
                return Err(match handle.join() {
                    Ok(compositor) => StartFailure::Setup(
                        Box::new(compositor),
                        BackendError::Context("render worker exited during setup".into()),
                    ),
                    Err(_) => StartFailure::Lost(StreamError::WorkerPanicked),
                });
            }
        };

        if let Err(error) = setup {
            return Err(match handle.join() {
                Ok(compositor) => StartFailure::Setup(Box::new(compositor), error),
                Err(_) => StartFailure::Lost(StreamError::WorkerPanicked),
            });
        }

        input.set_listener(Some(Arc::new(DrawSignal {
            commands: command_tx.clone(),
            shared: Arc::clone(&shared),
        })));

        Ok(Self {
            commands: command_tx,
            join_handle: Some(handle),
            shared,
        })
    }

    pub fn attach(&self, destination: Destination, surface: B::Surface) {
        self.submit(DriverCommand::Attach(destination, surface));
    }

    pub fn detach(&self, destination: Destination) {
        self.submit(DriverCommand::Detach(destination));
    }

    /// Queues one draw tick, as a frame-available signal would.
    pub fn request_draw(&self) {
        self.submit(DriverCommand::Draw);
    }

    fn submit(&self, command: DriverCommand<B::Surface>) {
        if self.commands.send(command).is_err() {
            tracing::debug!("render worker gone; command dropped");
        }
    }

    /// Stops drawing, waits for the tick in progress and the teardown of
    /// every target, and returns the compositor.
    pub fn shutdown(mut self) -> Result<Compositor<B>, StreamError> {
        self.shared.set_running(false);
        let Some(handle) = self.join_handle.take() else {
            return Err(StreamError::Unavailable);
        };
        let _ = self.commands.send(DriverCommand::Shutdown);
        let compositor = handle.join().map_err(|_| StreamError::WorkerPanicked)?;
        compositor.input().set_listener(None);
        Ok(compositor)
    }
}

impl<B: GpuBackend> Drop for RenderDriver<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            self.shared.set_running(false);
            let _ = self.commands.send(DriverCommand::Shutdown);
            // Dropped from a callback on the worker itself: it cannot be
            // joined, it tears down once the current tick returns.
            if handle.thread().id() == thread::current().id() {
                tracing::debug!("render worker detached from its own thread");
                return;
            }
            if let Ok(compositor) = handle.join() {
                compositor.input().set_listener(None);
            }
        }
    }
}

/// Frame listener that turns every signal into one queued draw tick.
struct DrawSignal<S> {
    commands: Sender<DriverCommand<S>>,
    shared: Arc<Shared>,
}

impl<S: Send + 'static> FrameAvailableListener for DrawSignal<S> {
    fn on_frame_available(&self) {
        if !self.shared.is_running() {
            return;
        }
        let _ = self.commands.send(DriverCommand::Draw);
    }
}

fn force_render_interval(fps: u32) -> Duration {
    frame_interval(fps)
        .or_else(|| frame_interval(FORCE_RENDER_FALLBACK_FPS))
        .unwrap_or(Duration::from_millis(33))
}

fn run_render_thread<B: GpuBackend>(
    mut compositor: Compositor<B>,
    shared: Arc<Shared>,
    commands: Receiver<DriverCommand<B::Surface>>,
    ready_tx: Sender<Result<(), BackendError>>,
) -> Compositor<B> {
    shared.set_worker(thread::current().id());
    if let Err(error) = compositor.setup() {
        tracing::warn!(%error, "render worker setup failed");
        let _ = ready_tx.send(Err(error));
        return compositor;
    }
    shared.set_running(true);
    let _ = ready_tx.send(Ok(()));
    tracing::debug!("render worker running");

    loop {
        let command = if shared.settings.force_render() {
            match commands.recv_timeout(force_render_interval(shared.settings.fps())) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => DriverCommand::Draw,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            }
        };

        match command {
            DriverCommand::Draw => {
                if shared.is_running() {
                    let report = compositor.tick(Instant::now());
                    tracing::trace!(
                        composed = report.composed,
                        limited = report.limited,
                        encoder = report.encoder,
                        photo = report.photo,
                        preview = report.preview,
                        "draw tick"
                    );
                }
            }
            DriverCommand::Attach(destination, surface) => {
                compositor.attach_surface(destination, surface);
            }
            DriverCommand::Detach(destination) => compositor.detach(destination),
            DriverCommand::Shutdown => break,
        }
        // Cleared without a Shutdown command when stop ran on this thread.
        if !shared.is_running() {
            break;
        }
    }

    compositor.teardown();
    tracing::debug!("render worker stopped");
    compositor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_render_falls_back_to_thirty_fps() {
        assert_eq!(Some(force_render_interval(0)), frame_interval(30));
        assert_eq!(Some(force_render_interval(10)), frame_interval(10));
        assert!(force_render_interval(60) < force_render_interval(0));
    }
}
