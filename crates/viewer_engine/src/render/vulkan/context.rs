//! Vulkan context management
//!
//! Owns the instance, the optional debug messenger, the selected adapter, the
//! window surface and the logical device with its single graphics+present queue.
//! Construction is phased: [`GraphicsContext::new`] selects the adapter,
//! [`GraphicsContext::create_surface`] attaches the window, and
//! [`GraphicsContext::create_logical_device`] opens the device.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::ffi::{c_char, CStr, CString};

use super::window::SurfaceWindow;
use super::{VulkanError, VulkanResult};

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// How frames are attached to the swapchain images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingBackend {
    /// Render pass and framebuffer objects, Vulkan 1.1
    LegacyRenderPass,
    /// `vkCmdBeginRendering` with image barriers, Vulkan 1.3
    DynamicRendering,
}

impl RenderingBackend {
    /// Pick the backend from the compatibility flag
    pub fn from_compatibility(compatibility_mode: bool) -> Self {
        if compatibility_mode {
            Self::LegacyRenderPass
        } else {
            Self::DynamicRendering
        }
    }

    /// Minimum adapter API version
    pub fn required_api_version(self) -> u32 {
        match self {
            Self::LegacyRenderPass => vk::API_VERSION_1_1,
            Self::DynamicRendering => vk::API_VERSION_1_3,
        }
    }

    /// Device extensions the backend cannot run without
    pub fn required_device_extensions(self) -> Vec<&'static CStr> {
        let mut extensions = vec![SwapchainLoader::name()];
        if self == Self::DynamicRendering {
            extensions.extend([
                vk::KhrSpirv14Fn::name(),
                vk::KhrSynchronization2Fn::name(),
                vk::KhrCreateRenderpass2Fn::name(),
            ]);
        }
        if cfg!(target_os = "macos") {
            extensions.push(vk::KhrPortabilitySubsetFn::name());
        }
        extensions
    }
}

/// What an adapter offers, gathered before selection
#[derive(Debug, Clone, Default)]
pub struct AdapterCapabilities {
    /// Packed `apiVersion` from the device properties
    pub api_version: u32,
    /// At least one queue family supports graphics
    pub has_graphics_queue: bool,
    /// Supported device extension names
    pub extensions: Vec<String>,
    pub sampler_anisotropy: bool,
    pub shader_draw_parameters: bool,
    pub synchronization2: bool,
    pub dynamic_rendering: bool,
    pub extended_dynamic_state: bool,
}

/// Whether an adapter can drive the given backend
///
/// Compatibility mode skips the feature checks.
pub fn adapter_is_suitable(caps: &AdapterCapabilities, backend: RenderingBackend) -> bool {
    if caps.api_version < backend.required_api_version() || !caps.has_graphics_queue {
        return false;
    }

    let required: Vec<String> = backend
        .required_device_extensions()
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    let required: Vec<&str> = required.iter().map(String::as_str).collect();
    if find_missing(&required, &caps.extensions).is_some() {
        return false;
    }

    match backend {
        RenderingBackend::LegacyRenderPass => true,
        RenderingBackend::DynamicRendering => {
            caps.sampler_anisotropy
                && caps.shader_draw_parameters
                && caps.synchronization2
                && caps.dynamic_rendering
                && caps.extended_dynamic_state
        }
    }
}

/// First requested name that is not available
pub fn find_missing<'a>(requested: &[&'a str], available: &[String]) -> Option<&'a str> {
    requested
        .iter()
        .copied()
        .find(|name| !available.iter().any(|have| have == name))
}

/// Linear scan for a memory type allowed by `type_bits` with all of `flags`
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0 && memory.memory_types[i as usize].property_flags.contains(flags)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// First candidate whose properties for `tiling` contain `features`
pub fn find_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties_of: F,
) -> VulkanResult<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties_of(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or(VulkanError::NoSupportedFormat)
}

fn c_strings(names: &[String]) -> VulkanResult<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str())
                .map_err(|_| VulkanError::InitializationFailed(format!("invalid name {name:?}")))
        })
        .collect()
}

fn extension_names(properties: &[vk::ExtensionProperties]) -> Vec<String> {
    properties
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_string_lossy().into_owned())
        .collect()
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Instance, adapter, surface and logical device
pub struct GraphicsContext {
    entry: Entry,
    instance: Instance,
    debug_messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: Option<Device>,
    swapchain_loader: Option<SwapchainLoader>,
    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    backend: RenderingBackend,
    destroyed: bool,
}

impl GraphicsContext {
    /// Create the instance and select an adapter
    pub fn new(
        app_name: &str,
        validation_layers: &[String],
        enable_validation: bool,
        required_extensions: &[String],
        backend: RenderingBackend,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let layers: &[String] = if enable_validation { validation_layers } else { &[] };
        let available_layers: Vec<String> = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_string_lossy().into_owned())
            .collect();
        let requested_layers: Vec<&str> = layers.iter().map(String::as_str).collect();
        if let Some(missing) = find_missing(&requested_layers, &available_layers) {
            return Err(VulkanError::LayerNotSupported(missing.to_string()));
        }

        let available_extensions = extension_names(
            &entry.enumerate_instance_extension_properties(None).map_err(VulkanError::Api)?,
        );

        let mut extensions: Vec<String> = required_extensions.to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().to_string_lossy().into_owned());
        }
        let requested_extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();
        if let Some(missing) = find_missing(&requested_extensions, &available_extensions) {
            return Err(VulkanError::ExtensionNotSupported(missing.to_string()));
        }

        let portability = vk::KhrPortabilityEnumerationFn::name().to_string_lossy().into_owned();
        let mut create_flags = vk::InstanceCreateFlags::empty();
        if available_extensions.contains(&portability) {
            extensions.push(portability);
            create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("application name contains NUL".to_string()))?;
        let engine_name_cstr = CString::new("No Engine")
            .map_err(|_| VulkanError::InitializationFailed("engine name contains NUL".to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(backend.required_api_version());

        let layer_cstrs = c_strings(layers)?;
        let layer_ptrs: Vec<*const c_char> = layer_cstrs.iter().map(|name| name.as_ptr()).collect();
        let extension_cstrs = c_strings(&extensions)?;
        let extension_ptrs: Vec<*const c_char> = extension_cstrs.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .flags(create_flags)
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        let debug_messenger = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);

        let mut context = Self {
            entry,
            instance,
            debug_messenger,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
            physical_device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties::default(),
            features: vk::PhysicalDeviceFeatures::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            device: None,
            swapchain_loader: None,
            graphics_queue: vk::Queue::null(),
            graphics_queue_family: 0,
            backend,
            destroyed: false,
        };

        context.pick_physical_device()?;
        Ok(context)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn adapter_capabilities(&self, device: vk::PhysicalDevice) -> VulkanResult<AdapterCapabilities> {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        let queue_families = unsafe { self.instance.get_physical_device_queue_family_properties(device) };
        let extensions = unsafe {
            self.instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        let mut caps = AdapterCapabilities {
            api_version: properties.api_version,
            has_graphics_queue: queue_families
                .iter()
                .any(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS)),
            extensions: extension_names(&extensions),
            ..AdapterCapabilities::default()
        };

        // Newer feature structs may only be queried on a device that reports 1.3
        if self.backend == RenderingBackend::DynamicRendering && caps.api_version >= vk::API_VERSION_1_3 {
            let mut vulkan11 = vk::PhysicalDeviceVulkan11Features::default();
            let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default();
            let mut extended = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default();
            let mut features2 = vk::PhysicalDeviceFeatures2::builder()
                .push_next(&mut vulkan11)
                .push_next(&mut vulkan13)
                .push_next(&mut extended);
            unsafe { self.instance.get_physical_device_features2(device, &mut features2) };
            let base = features2.features;

            caps.sampler_anisotropy = base.sampler_anisotropy == vk::TRUE;
            caps.shader_draw_parameters = vulkan11.shader_draw_parameters == vk::TRUE;
            caps.synchronization2 = vulkan13.synchronization2 == vk::TRUE;
            caps.dynamic_rendering = vulkan13.dynamic_rendering == vk::TRUE;
            caps.extended_dynamic_state = extended.extended_dynamic_state == vk::TRUE;
        }

        Ok(caps)
    }

    fn pick_physical_device(&mut self) -> VulkanResult<()> {
        let devices = unsafe { self.instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        for device in devices {
            let caps = self.adapter_capabilities(device)?;
            if !adapter_is_suitable(&caps, self.backend) {
                continue;
            }

            self.physical_device = device;
            self.properties = unsafe { self.instance.get_physical_device_properties(device) };
            self.features = unsafe { self.instance.get_physical_device_features(device) };
            self.memory_properties = unsafe { self.instance.get_physical_device_memory_properties(device) };

            log::info!(
                "Selected GPU: {} ({:?})",
                unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }.to_string_lossy(),
                self.backend
            );
            return Ok(());
        }

        Err(VulkanError::NoSuitableGpu)
    }

    /// Attach the window surface
    pub fn create_surface<W: SurfaceWindow + ?Sized>(&mut self, window: &mut W) -> VulkanResult<()> {
        if self.surface != vk::SurfaceKHR::null() {
            return Err(VulkanError::InvalidOperation {
                reason: "surface already created".to_string(),
            });
        }
        self.surface = window.create_surface(self.instance.handle())?;
        log::debug!("Created window surface");
        Ok(())
    }

    /// Open the logical device on the first graphics+present queue family
    pub fn create_logical_device(&mut self) -> VulkanResult<()> {
        if self.surface == vk::SurfaceKHR::null() {
            return Err(VulkanError::InvalidOperation {
                reason: "surface must be created before the logical device".to_string(),
            });
        }
        if self.device.is_some() {
            return Err(VulkanError::InvalidOperation {
                reason: "logical device already created".to_string(),
            });
        }

        let queue_families = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(self.physical_device)
        };

        let mut family = None;
        for (index, properties) in queue_families.iter().enumerate() {
            let index = index as u32;
            let present = unsafe {
                self.surface_loader
                    .get_physical_device_surface_support(self.physical_device, index, self.surface)
                    .map_err(VulkanError::Api)?
            };
            if present && properties.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                family = Some(index);
                break;
            }
        }
        let family = family.ok_or(VulkanError::NoGraphicsPresentQueue)?;

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(family)
            .queue_priorities(&priorities)
            .build()];

        let extension_ptrs: Vec<*const c_char> = self
            .backend
            .required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let mut vulkan11 = vk::PhysicalDeviceVulkan11Features::builder().shader_draw_parameters(true);
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::builder()
            .synchronization2(true)
            .dynamic_rendering(true);
        let mut extended = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::builder().extended_dynamic_state(true);

        let device = match self.backend {
            RenderingBackend::DynamicRendering => {
                let mut features2 = vk::PhysicalDeviceFeatures2::builder()
                    .features(vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true).build())
                    .push_next(&mut vulkan11)
                    .push_next(&mut vulkan13)
                    .push_next(&mut extended);
                let create_info = vk::DeviceCreateInfo::builder()
                    .push_next(&mut features2)
                    .queue_create_infos(&queue_infos)
                    .enabled_extension_names(&extension_ptrs);
                unsafe {
                    self.instance
                        .create_device(self.physical_device, &create_info, None)
                        .map_err(VulkanError::Api)?
                }
            }
            RenderingBackend::LegacyRenderPass => {
                let create_info = vk::DeviceCreateInfo::builder()
                    .queue_create_infos(&queue_infos)
                    .enabled_extension_names(&extension_ptrs)
                    .enabled_features(&self.features);
                unsafe {
                    self.instance
                        .create_device(self.physical_device, &create_info, None)
                        .map_err(VulkanError::Api)?
                }
            }
        };

        self.graphics_queue = unsafe { device.get_device_queue(family, 0) };
        self.graphics_queue_family = family;
        self.swapchain_loader = Some(SwapchainLoader::new(&self.instance, &device));
        self.device = Some(device);

        log::info!("Created logical device on queue family {}", family);
        Ok(())
    }

    /// Memory type on the selected adapter
    pub fn find_memory_type(&self, type_bits: u32, flags: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(&self.memory_properties, type_bits, flags)
    }

    /// First candidate format the adapter supports for `tiling` and `features`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        find_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        })
    }

    /// Preferred depth attachment format
    pub fn find_depth_format(&self) -> VulkanResult<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Logical device, once created
    pub fn device(&self) -> VulkanResult<&Device> {
        self.device.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "logical device not created".to_string(),
        })
    }

    pub fn swapchain_loader(&self) -> VulkanResult<&SwapchainLoader> {
        self.swapchain_loader.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "logical device not created".to_string(),
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Adapter properties, including limits
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Base features reported by the adapter
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    pub fn backend(&self) -> RenderingBackend {
        self.backend
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        if let Some(device) = &self.device {
            unsafe { device.device_wait_idle().map_err(VulkanError::Api)? };
        }
        Ok(())
    }

    /// Destroy device, surface, messenger and instance in that order
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        unsafe {
            self.swapchain_loader = None;
            if let Some(device) = self.device.take() {
                report_teardown_wait(device.device_wait_idle());
                device.destroy_device(None);
            }
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("Graphics context destroyed");
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Log a failed idle wait during teardown; returns whether the device settled
fn report_teardown_wait(result: Result<(), vk::Result>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Device wait failed during teardown: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_wait_failure_is_reported() {
        crate::foundation::logging::init_for_tests();
        assert!(report_teardown_wait(Ok(())));
        assert!(!report_teardown_wait(Err(vk::Result::ERROR_DEVICE_LOST)));
    }

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = property_flags;
        }
        props
    }

    fn full_caps() -> AdapterCapabilities {
        AdapterCapabilities {
            api_version: vk::API_VERSION_1_3,
            has_graphics_queue: true,
            extensions: RenderingBackend::DynamicRendering
                .required_device_extensions()
                .iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect(),
            sampler_anisotropy: true,
            shader_draw_parameters: true,
            synchronization2: true,
            dynamic_rendering: true,
            extended_dynamic_state: true,
        }
    }

    #[test]
    fn test_memory_type_mask_zero_fails() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&props, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }

    #[test]
    fn test_memory_type_respects_mask_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        assert!(find_memory_type(&props, 0b001, host).is_err());
    }

    #[test]
    fn test_supported_format_empty_candidates_fails() {
        let result = find_supported_format(
            &[],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties::default(),
        );
        assert!(matches!(result, Err(VulkanError::NoSupportedFormat)));
    }

    #[test]
    fn test_supported_format_returns_first_match() {
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        let result = find_supported_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::OPTIMAL, depth, |format| {
            if format == vk::Format::D32_SFLOAT {
                // Only linear tiling: must be skipped for OPTIMAL
                vk::FormatProperties {
                    linear_tiling_features: depth,
                    ..Default::default()
                }
            } else {
                vk::FormatProperties {
                    optimal_tiling_features: depth,
                    ..Default::default()
                }
            }
        });
        assert_eq!(result.unwrap(), vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn test_find_missing_names_first_gap() {
        let available = vec!["VK_KHR_surface".to_string(), "VK_KHR_xcb_surface".to_string()];
        assert_eq!(find_missing(&["VK_KHR_surface"], &available), None);
        assert_eq!(
            find_missing(&["VK_KHR_surface", "VK_EXT_debug_utils"], &available),
            Some("VK_EXT_debug_utils")
        );
    }

    #[test]
    fn test_backend_api_versions() {
        assert_eq!(RenderingBackend::LegacyRenderPass.required_api_version(), vk::API_VERSION_1_1);
        assert_eq!(RenderingBackend::DynamicRendering.required_api_version(), vk::API_VERSION_1_3);
        assert_eq!(RenderingBackend::from_compatibility(true), RenderingBackend::LegacyRenderPass);
        assert_eq!(RenderingBackend::from_compatibility(false), RenderingBackend::DynamicRendering);
    }

    #[test]
    fn test_full_mode_requires_features() {
        let caps = full_caps();
        assert!(adapter_is_suitable(&caps, RenderingBackend::DynamicRendering));

        let missing_feature = AdapterCapabilities {
            dynamic_rendering: false,
            ..full_caps()
        };
        assert!(!adapter_is_suitable(&missing_feature, RenderingBackend::DynamicRendering));
    }

    #[test]
    fn test_compatibility_mode_skips_feature_checks() {
        let caps = AdapterCapabilities {
            api_version: vk::API_VERSION_1_1,
            has_graphics_queue: true,
            extensions: RenderingBackend::LegacyRenderPass
                .required_device_extensions()
                .iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect(),
            ..Default::default()
        };
        assert!(adapter_is_suitable(&caps, RenderingBackend::LegacyRenderPass));
        assert!(!adapter_is_suitable(&caps, RenderingBackend::DynamicRendering));
    }

    #[test]
    fn test_adapter_without_graphics_or_swapchain_rejected() {
        let no_graphics = AdapterCapabilities {
            has_graphics_queue: false,
            ..full_caps()
        };
        assert!(!adapter_is_suitable(&no_graphics, RenderingBackend::DynamicRendering));

        let no_extensions = AdapterCapabilities {
            extensions: Vec::new(),
            ..full_caps()
        };
        assert!(!adapter_is_suitable(&no_extensions, RenderingBackend::LegacyRenderPass));
    }
}
