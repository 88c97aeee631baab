//! Vulkan swapchain management
//!
//! [`PresentationSurface`] owns the swapchain, one view per image and, for the
//! legacy backend, the render pass and per-image framebuffers. It is rebuilt in
//! place when the surface goes stale.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use super::context::{GraphicsContext, RenderingBackend};
use super::framebuffer::{create_framebuffers, Framebuffer};
use super::image::create_image_view;
use super::render_pass::RenderPass;
use super::{VulkanError, VulkanResult};

/// Preferred number of swapchain images
pub const PREFERRED_IMAGE_COUNT: u32 = 3;

/// Surface properties queried from the adapter
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(context: &GraphicsContext) -> VulkanResult<Self> {
        let loader = context.surface_loader();
        let (physical_device, surface) = (context.physical_device(), context.surface());
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }
}

/// B8G8R8A8_SRGB with SRGB_NONLINEAR, else the first offered format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or(VulkanError::NoSupportedFormat)
}

/// MAILBOX when offered, otherwise FIFO
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the framebuffer size clamped to the allowed range
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: framebuffer
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: framebuffer
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// At least three images when allowed; a zero maximum means unbounded
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = PREFERRED_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Swapchain, views and (legacy backend) render pass plus framebuffers
pub struct PresentationSurface {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    depth_format: vk::Format,
    render_pass: Option<RenderPass>,
    framebuffers: Vec<Framebuffer>,
}

impl PresentationSurface {
    pub fn new(context: &GraphicsContext, framebuffer_extent: vk::Extent2D, depth_format: vk::Format) -> VulkanResult<Self> {
        let mut surface = Self {
            device: context.device()?.clone(),
            loader: context.swapchain_loader()?.clone(),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            depth_format,
            render_pass: None,
            framebuffers: Vec::new(),
        };
        surface.build(context, framebuffer_extent)?;
        Ok(surface)
    }

    fn build(&mut self, context: &GraphicsContext, framebuffer_extent: vk::Extent2D) -> VulkanResult<()> {
        let support = SwapchainSupport::query(context)?;
        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_extent);
        let image_count = choose_image_count(&support.capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        self.swapchain = unsafe { self.loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };
        self.images = unsafe { self.loader.get_swapchain_images(self.swapchain).map_err(VulkanError::Api)? };
        self.format = format;
        self.extent = extent;

        for &image in &self.images {
            let view = create_image_view(&self.device, image, format.format, vk::ImageAspectFlags::COLOR)?;
            self.views.push(view);
        }

        if context.backend() == RenderingBackend::LegacyRenderPass {
            let reusable = self
                .render_pass
                .as_ref()
                .is_some_and(|pass| pass.color_format() == format.format);
            if !reusable {
                self.render_pass = Some(RenderPass::new(self.device.clone(), format.format, self.depth_format)?);
            }
        }

        log::info!(
            "Swapchain ready: {} images, {}x{}, {:?}, {:?}",
            self.images.len(),
            extent.width,
            extent.height,
            format.format,
            present_mode
        );
        Ok(())
    }

    /// Acquire the next presentable image
    ///
    /// Returns the raw result (SUCCESS, SUBOPTIMAL_KHR or an error code) and the image index.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore, fence: vk::Fence) -> (vk::Result, u32) {
        match unsafe { self.loader.acquire_next_image(self.swapchain, timeout, semaphore, fence) } {
            Ok((index, false)) => (vk::Result::SUCCESS, index),
            Ok((index, true)) => (vk::Result::SUBOPTIMAL_KHR, index),
            Err(result) => (result, 0),
        }
    }

    /// Queue `image_index` for presentation after `wait_semaphore` signals
    pub fn present(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore, image_index: u32) -> vk::Result {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => vk::Result::SUCCESS,
            Ok(true) => vk::Result::SUBOPTIMAL_KHR,
            Err(result) => result,
        }
    }

    /// Wait for the device, then tear down and rebuild for the new extent
    ///
    /// Framebuffers are left empty until [`Self::rebuild_framebuffers`] is called
    /// with the matching depth view.
    pub fn recreate(&mut self, context: &GraphicsContext, framebuffer_extent: vk::Extent2D) -> VulkanResult<()> {
        context.wait_idle()?;
        self.release_swapchain();
        self.build(context, framebuffer_extent)
    }

    /// Rebuild one framebuffer per image around `depth_view` (legacy backend only)
    pub fn rebuild_framebuffers(&mut self, depth_view: vk::ImageView) -> VulkanResult<()> {
        self.framebuffers.clear();
        if let Some(render_pass) = &self.render_pass {
            self.framebuffers =
                create_framebuffers(&self.device, render_pass.handle(), &self.views, depth_view, self.extent)?;
        }
        Ok(())
    }

    fn release_swapchain(&mut self) {
        self.framebuffers.clear();
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Render pass, present only for the legacy backend
    pub fn render_pass(&self) -> Option<vk::RenderPass> {
        self.render_pass.as_ref().map(RenderPass::handle)
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).map(Framebuffer::handle)
    }

    /// Release everything; safe to call more than once
    pub fn destroy(&mut self) {
        self.release_swapchain();
        if let Some(mut render_pass) = self.render_pass.take() {
            render_pass.destroy();
        }
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}
