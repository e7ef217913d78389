use std::fmt;

use crate::backend::BackendError;
use crate::types::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    #[default]
    Low,
    High,
}

impl std::str::FromStr for PowerPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "low-power" => Ok(Self::Low),
            "high" | "high-performance" => Ok(Self::High),
            other => Err(format!("unknown power preference '{other}'")),
        }
    }
}

/// Knobs for creating the shared device.
#[derive(Debug, Clone, Default)]
pub struct GpuOptions {
    pub power: PowerPreference,
    /// Use the software fallback adapter (useful on CI machines without a GPU).
    pub force_fallback_adapter: bool,
}

/// The shared device every render target draws with.
///
/// Owned by the main render target; dependents hold weak references and
/// fail with [`BackendError::Released`] once it is gone.
pub(crate) struct GpuDevice {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuDevice")
            .field("adapter", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

impl GpuDevice {
    /// Creates a headless device; window surfaces are created later against
    /// the same instance.
    pub fn new(options: &GpuOptions) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power {
            PowerPreference::Low => wgpu::PowerPreference::LowPower,
            PowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: options.force_fallback_adapter,
        }))
        .map_err(|err| BackendError::Context(format!("no suitable GPU adapter: {err}")))?;

        let info = adapter.get_info();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("framecast device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| BackendError::Context(format!("failed to create GPU device: {err}")))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            adapter_name: info.name,
        })
    }

    pub fn max_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Rejects texture sizes the device cannot allocate.
    pub fn check_size(&self, size: Size, what: &str) -> Result<(), BackendError> {
        let max = self.max_dimension();
        if size.width > max || size.height > max {
            return Err(BackendError::Draw(format!(
                "{what} size {size} exceeds the {max}px texture limit"
            )));
        }
        Ok(())
    }

    /// Runs `work` inside a validation error scope so that invalid GPU
    /// usage comes back as [`BackendError::Draw`] instead of reaching the
    /// device's uncaptured error handler.
    pub fn validated<T>(
        &self,
        work: impl FnOnce() -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = work();
        let captured = pollster::block_on(self.device.pop_error_scope());
        match (result, captured) {
            (Err(error), _) => Err(error),
            (Ok(_), Some(error)) => Err(BackendError::Draw(error.to_string())),
            (Ok(value), None) => Ok(value),
        }
    }

    /// Blocks until queued work completes.
    pub fn wait_idle(&self) -> Result<(), BackendError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|err| BackendError::Draw(format!("device poll failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_power_preference() {
        assert_eq!("low".parse::<PowerPreference>(), Ok(PowerPreference::Low));
        assert_eq!(
            "High-Performance".parse::<PowerPreference>(),
            Ok(PowerPreference::High)
        );
        assert!("turbo".parse::<PowerPreference>().is_err());
    }
}
