use crate::backend::{BackendError, GpuBackend};
use crate::types::{Destination, Size};

#[derive(Debug, thiserror::Error)]
pub(crate) enum AttachError {
    #[error("main render target is not ready")]
    MainNotReady,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Owns the four render targets and enforces their lifecycle.
///
/// The main target is the base every dependent target is built from, so
/// dependents can only be attached while it is live, and [`release_all`]
/// tears them down before the main target. A slot holding `Some` is "ready".
///
/// [`release_all`]: TargetSet::release_all
pub(crate) struct TargetSet<B: GpuBackend> {
    main: Option<B::Target>,
    encoder: Option<B::Target>,
    photo: Option<B::Target>,
    preview: Option<B::Target>,
}

impl<B: GpuBackend> TargetSet<B> {
    pub fn new() -> Self {
        Self {
            main: None,
            encoder: None,
            photo: None,
            preview: None,
        }
    }

    pub fn is_ready(&self, destination: Destination) -> bool {
        match destination {
            Destination::Main => self.main.is_some(),
            Destination::Encoder => self.encoder.is_some(),
            Destination::Photo => self.photo.is_some(),
            Destination::Preview => self.preview.is_some(),
        }
    }

    pub fn main(&self) -> Option<&B::Target> {
        self.main.as_ref()
    }

    pub fn get_mut(&mut self, destination: Destination) -> Option<&mut B::Target> {
        self.slot_mut(destination).as_mut()
    }

    /// Rebuilds the main target. Existing dependents are released first since
    /// they were derived from the old base.
    pub fn setup_main(&mut self, backend: &mut B, size: Size) -> Result<(), BackendError> {
        self.release_all(backend);
        let main = backend.create_main(size)?;
        tracing::debug!(%size, "main render target ready");
        self.main = Some(main);
        Ok(())
    }

    pub fn attach_surface(
        &mut self,
        backend: &mut B,
        destination: Destination,
        surface: B::Surface,
    ) -> Result<(), AttachError> {
        self.attach_with(backend, destination, |backend, main| {
            backend.create_surface_target(main, surface)
        })
    }

    pub fn attach_offscreen(
        &mut self,
        backend: &mut B,
        destination: Destination,
        size: Size,
    ) -> Result<(), AttachError> {
        self.attach_with(backend, destination, |backend, main| {
            backend.create_offscreen_target(main, size)
        })
    }

    fn attach_with<F>(
        &mut self,
        backend: &mut B,
        destination: Destination,
        create: F,
    ) -> Result<(), AttachError>
    where
        F: FnOnce(&mut B, &B::Target) -> Result<B::Target, BackendError>,
    {
        debug_assert_ne!(destination, Destination::Main);
        if self.main.is_none() {
            return Err(AttachError::MainNotReady);
        }
        self.release(backend, destination);
        let Some(main) = self.main.as_ref() else {
            return Err(AttachError::MainNotReady);
        };
        let target = create(backend, main)?;
        *self.slot_mut(destination) = Some(target);
        tracing::debug!(%destination, "render target attached");
        Ok(())
    }

    pub fn release(&mut self, backend: &mut B, destination: Destination) {
        if let Some(target) = self.slot_mut(destination).take() {
            backend.release_target(target);
            tracing::debug!(%destination, "render target released");
        }
    }

    /// Releases dependents (photo, encoder, preview) and then the main target.
    pub fn release_all(&mut self, backend: &mut B) {
        for destination in [
            Destination::Photo,
            Destination::Encoder,
            Destination::Preview,
            Destination::Main,
        ] {
            self.release(backend, destination);
        }
    }

    fn slot_mut(&mut self, destination: Destination) -> &mut Option<B::Target> {
        match destination {
            Destination::Main => &mut self.main,
            Destination::Encoder => &mut self.encoder,
            Destination::Photo => &mut self.photo,
            Destination::Preview => &mut self.preview,
        }
    }
}
