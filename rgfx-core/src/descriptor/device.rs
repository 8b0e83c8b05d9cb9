use crate::flags::QueueFlags;
use crate::types::{AdapterPreference, AdapterType, BackendKind};

/// Instance-level optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceExtension {
    /// Presentation to platform windows.
    Surface,
    /// Validation layers and debug messengers where available.
    Debug,
}

impl InstanceExtension {
    pub const ALL: [InstanceExtension; 2] =
        [InstanceExtension::Surface, InstanceExtension::Debug];

    pub fn name(self) -> &'static str {
        match self {
            InstanceExtension::Surface => "gfx_surface",
            InstanceExtension::Debug => "gfx_debug",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

/// Device-level optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceExtension {
    Swapchain,
    TimelineSemaphore,
    AnisotropicFiltering,
}

impl DeviceExtension {
    pub const ALL: [DeviceExtension; 3] = [
        DeviceExtension::Swapchain,
        DeviceExtension::TimelineSemaphore,
        DeviceExtension::AnisotropicFiltering,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceExtension::Swapchain => "gfx_swapchain",
            DeviceExtension::TimelineSemaphore => "gfx_timeline_semaphore",
            DeviceExtension::AnisotropicFiltering => {
                "gfx_anisotropic_filtering"
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstanceDescriptor<'a> {
    pub backend: BackendKind,
    pub application_name: Option<&'a str>,
    pub application_version: u32,
    pub enabled_extensions: &'a [InstanceExtension],
}

impl Default for InstanceDescriptor<'_> {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            application_name: None,
            application_version: 0,
            enabled_extensions: &[],
        }
    }
}

impl InstanceDescriptor<'_> {
    pub fn wants(&self, extension: InstanceExtension) -> bool {
        self.enabled_extensions.contains(&extension)
    }
}

/// Adapter selection. An explicit index wins over the preference.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterDescriptor {
    pub adapter_index: Option<u32>,
    pub preference: AdapterPreference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub driver_description: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub adapter_type: AdapterType,
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceLimits {
    pub min_uniform_buffer_offset_alignment: u32,
    pub min_storage_buffer_offset_alignment: u32,
    pub max_uniform_buffer_binding_size: u32,
    pub max_storage_buffer_binding_size: u32,
    pub max_buffer_size: u64,
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_array_layers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyProperties {
    pub flags: QueueFlags,
    pub queue_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueRequest {
    pub queue_family_index: u32,
    pub queue_index: u32,
    pub priority: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceDescriptor<'a> {
    pub label: Option<&'a str>,
    /// Empty selects one graphics queue automatically.
    pub queue_requests: &'a [QueueRequest],
    pub enabled_extensions: &'a [DeviceExtension],
}

impl DeviceDescriptor<'_> {
    pub fn wants(&self, extension: DeviceExtension) -> bool {
        self.enabled_extensions.contains(&extension)
    }
}

/// How strongly `preference` favours an adapter of type `ty`.
pub fn preference_score(ty: AdapterType, preference: AdapterPreference) -> u32 {
    use AdapterType as T;
    match preference {
        AdapterPreference::Undefined | AdapterPreference::HighPerformance => {
            match ty {
                T::DiscreteGpu => 3,
                T::IntegratedGpu => 2,
                T::Unknown => 1,
                T::Cpu => 0,
            }
        }
        AdapterPreference::LowPower => match ty {
            T::IntegratedGpu => 3,
            T::DiscreteGpu => 2,
            T::Unknown => 1,
            T::Cpu => 0,
        },
        AdapterPreference::Software => match ty {
            T::Cpu => 3,
            T::Unknown => 2,
            T::IntegratedGpu => 1,
            T::DiscreteGpu => 0,
        },
    }
}

/// Index of the best-scoring adapter. Ties go to the lowest index.
pub fn select_adapter(
    types: impl Iterator<Item = AdapterType>,
    preference: AdapterPreference,
) -> Option<usize> {
    types
        .enumerate()
        .map(|(i, ty)| (i, preference_score(ty, preference)))
        .max_by(|(i1, s1), (i2, s2)| s1.cmp(s2).then(i2.cmp(i1)))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: [AdapterType; 4] = [
        AdapterType::Cpu,
        AdapterType::IntegratedGpu,
        AdapterType::DiscreteGpu,
        AdapterType::Unknown,
    ];

    #[test]
    fn high_performance_prefers_discrete() {
        for preference in
            [AdapterPreference::Undefined, AdapterPreference::HighPerformance]
        {
            assert_eq!(select_adapter(MIXED.into_iter(), preference), Some(2));
        }
    }

    #[test]
    fn low_power_prefers_integrated() {
        assert_eq!(
            select_adapter(MIXED.into_iter(), AdapterPreference::LowPower),
            Some(1)
        );
    }

    #[test]
    fn software_prefers_cpu() {
        assert_eq!(
            select_adapter(MIXED.into_iter(), AdapterPreference::Software),
            Some(0)
        );
    }

    #[test]
    fn ties_go_to_first_adapter() {
        let types = [AdapterType::DiscreteGpu, AdapterType::DiscreteGpu];
        assert_eq!(
            select_adapter(types.into_iter(), AdapterPreference::Undefined),
            Some(0)
        );
        assert_eq!(
            select_adapter(std::iter::empty(), AdapterPreference::Undefined),
            None
        );
    }

    #[test]
    fn extension_names_round_trip() {
        for extension in InstanceExtension::ALL {
            assert_eq!(InstanceExtension::from_name(extension.name()), Some(extension));
        }
        assert_eq!(InstanceExtension::from_name("gfx_unknown"), None);
    }
}
