//! Frame orchestration
//!
//! [`FrameOrchestrator`] owns every GPU resource and runs the per-frame
//! protocol through [`FrameCycle`]. Resources are created in the order
//! context, presentation surface, pipeline, command dispatcher, per-frame
//! uniforms and descriptors, then synchronization; `destroy` walks that order
//! backwards.

use ash::{vk, Device};
use std::path::Path;

use crate::assets::{read_spirv, ImageData};
use crate::config::ViewerConfig;
use crate::foundation::time::AnimationClock;
use crate::render::frame::{FrameBackend, FrameCycle, FrameStatus};
use crate::render::frame_pass::FramePass;
use crate::render::mesh::RenderableMesh;
use crate::render::uniform::UniformBufferObject;
use crate::render::vulkan::pipeline::PipelineTarget;
use crate::render::vulkan::window::wait_for_nonzero_extent;
use crate::render::vulkan::{
    CommandDispatcher, DescriptorPool, FrameSynchronizer, GpuBuffer, GpuImage, GraphicsContext,
    PipelineState, PresentationSurface, RenderingBackend, SurfaceWindow, VulkanError, VulkanResult,
};

/// Format textures are uploaded in
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Texture bound until a real one is loaded
const PLACEHOLDER_TEXEL: [u8; 4] = [255, 255, 255, 255];

fn depth_image(context: &GraphicsContext, extent: vk::Extent2D, format: vk::Format) -> VulkanResult<GpuImage> {
    GpuImage::new(
        context,
        extent.width,
        extent.height,
        format,
        vk::ImageTiling::OPTIMAL,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::ImageAspectFlags::DEPTH,
    )
}

/// Upload RGBA8 pixels into a sampled, shader-readable image
///
/// Staging copy, both layout transitions and the buffer-to-image copy share
/// one blocking command buffer.
fn upload_texture(context: &GraphicsContext, commands: &CommandDispatcher, pixels: &ImageData) -> VulkanResult<GpuImage> {
    let mut staging = GpuBuffer::new(
        context,
        pixels.size_bytes() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    staging.map()?;
    staging.copy_data(&pixels.data)?;
    staging.unmap();

    let mut texture = GpuImage::new(
        context,
        pixels.width,
        pixels.height,
        TEXTURE_FORMAT,
        vk::ImageTiling::OPTIMAL,
        vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::ImageAspectFlags::COLOR,
    )?;

    let command_buffer = commands.begin_one_shot()?;
    texture.transition_layout(
        command_buffer,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    texture.copy_from_buffer(command_buffer, &staging);
    texture.transition_layout(
        command_buffer,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;
    commands.end_one_shot(command_buffer)?;

    texture.create_sampler(vk::Filter::LINEAR, vk::Filter::LINEAR, vk::SamplerAddressMode::REPEAT)?;
    Ok(texture)
}

/// Everything the frame protocol touches
///
/// Fields are declared in reverse creation order so an implicit drop also
/// releases the device last.
/// Uniforms for the current frame, animated by `clock`
fn frame_uniforms(clock: &AnimationClock, extent: vk::Extent2D) -> UniformBufferObject {
    UniformBufferObject::for_frame(clock.elapsed_secs(), extent)
}

struct RenderState {
    sync: FrameSynchronizer,
    texture: GpuImage,
    mesh: RenderableMesh,
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    uniform_buffers: Vec<GpuBuffer>,
    commands: CommandDispatcher,
    pipeline: PipelineState,
    depth: GpuImage,
    surface: PresentationSurface,
    context: GraphicsContext,
    clock: AnimationClock,
    resize_requested: bool,
}

impl RenderState {
    fn device(&self) -> VulkanResult<&Device> {
        self.context.device()
    }

    fn write_descriptor_sets(&self) -> VulkanResult<()> {
        let sampler = self.texture.sampler().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "texture has no sampler".to_string(),
        })?;
        for (set, buffer) in self.descriptor_sets.iter().zip(&self.uniform_buffers) {
            self.descriptor_pool.write_frame_set(
                *set,
                buffer.handle(),
                UniformBufferObject::SIZE,
                self.texture.view(),
                sampler,
            );
        }
        Ok(())
    }

    fn frame_pass(&self, image_index: u32) -> VulkanResult<FramePass> {
        match self.context.backend() {
            RenderingBackend::LegacyRenderPass => {
                let render_pass = self.surface.render_pass().ok_or_else(|| VulkanError::InvalidOperation {
                    reason: "legacy backend without a render pass".to_string(),
                })?;
                let framebuffer = self
                    .surface
                    .framebuffer(image_index)
                    .ok_or_else(|| VulkanError::InvalidOperation {
                        reason: format!("no framebuffer for image {image_index}"),
                    })?;
                Ok(FramePass::LegacyRenderPass {
                    render_pass,
                    framebuffer,
                })
            }
            RenderingBackend::DynamicRendering => {
                let index = image_index as usize;
                let missing = || VulkanError::InvalidOperation {
                    reason: format!("swapchain image {index} out of range"),
                };
                Ok(FramePass::DynamicRendering {
                    color_image: *self.surface.images().get(index).ok_or_else(missing)?,
                    color_view: *self.surface.image_views().get(index).ok_or_else(missing)?,
                    depth_image: self.depth.handle(),
                    depth_view: self.depth.view(),
                })
            }
        }
    }

    fn rebuild_for_extent(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
        self.surface.recreate(&self.context, extent)?;

        self.depth.destroy();
        self.depth = depth_image(&self.context, self.surface.extent(), self.surface.depth_format())?;
        self.surface.rebuild_framebuffers(self.depth.view())?;

        self.sync.resize_image_semaphores(self.surface.image_count())?;
        self.resize_requested = false;

        let extent = self.surface.extent();
        log::info!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }
}

/// Vulkan implementation of the frame steps, bound to the window for the
/// duration of one frame
struct WindowedFrame<'a, W: SurfaceWindow + ?Sized> {
    state: &'a mut RenderState,
    window: &'a mut W,
}

impl<W: SurfaceWindow + ?Sized> FrameBackend for WindowedFrame<'_, W> {
    fn wait_for_frame(&mut self, frame: usize) -> VulkanResult<()> {
        self.state.sync.wait_for_fence(frame)
    }

    fn acquire_image(&mut self, frame: usize) -> VulkanResult<(vk::Result, u32)> {
        let semaphore = self.state.sync.acquire_semaphore(frame)?;
        Ok(self
            .state
            .surface
            .acquire_next_image(u64::MAX, semaphore, vk::Fence::null()))
    }

    fn recreate_surface(&mut self) -> VulkanResult<()> {
        match wait_for_nonzero_extent(&mut *self.window) {
            Some(extent) => self.state.rebuild_for_extent(extent),
            None => {
                log::debug!("Window closed while minimized, skipping swapchain rebuild");
                Ok(())
            }
        }
    }

    fn update_uniforms(&mut self, frame: usize) -> VulkanResult<()> {
        let ubo = frame_uniforms(&self.state.clock, self.state.surface.extent());
        let buffer = self
            .state
            .uniform_buffers
            .get_mut(frame)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no uniform buffer for frame {frame}"),
            })?;
        buffer.copy_data(ubo.as_bytes())
    }

    fn reset_frame(&mut self, frame: usize) -> VulkanResult<()> {
        self.state.sync.reset_fence(frame)?;
        let command_buffer = self.state.commands.command_buffer(frame)?;
        unsafe {
            self.state
                .device()?
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    fn record_frame(&mut self, frame: usize, image_index: u32) -> VulkanResult<()> {
        let state = &*self.state;
        let device = state.device()?;
        let command_buffer = state.commands.command_buffer(frame)?;
        let extent = state.surface.extent();
        let pass = state.frame_pass(image_index)?;

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        pass.begin(device, command_buffer, extent);
        state.pipeline.bind(command_buffer);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }

        if state.mesh.has_data() {
            let descriptor_set = *state
                .descriptor_sets
                .get(frame)
                .ok_or_else(|| VulkanError::InvalidOperation {
                    reason: format!("no descriptor set for frame {frame}"),
                })?;

            state.mesh.bind(command_buffer)?;
            unsafe {
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    state.pipeline.layout(),
                    0,
                    &[descriptor_set],
                    &[],
                );
            }
            state.mesh.draw(command_buffer)?;
        }

        pass.end(device, command_buffer);

        unsafe { device.end_command_buffer(command_buffer).map_err(VulkanError::Api) }
    }

    fn submit_frame(&mut self, frame: usize, image_index: u32) -> VulkanResult<()> {
        let state = &*self.state;
        let wait_semaphores = [state.sync.acquire_semaphore(frame)?];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [state.commands.command_buffer(frame)?];
        let signal_semaphores = [state.sync.render_complete_semaphore(image_index)?];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            state
                .device()?
                .queue_submit(
                    state.context.graphics_queue(),
                    &[submit_info.build()],
                    state.sync.fence(frame)?,
                )
                .map_err(VulkanError::Api)
        }
    }

    fn present_image(&mut self, image_index: u32) -> VulkanResult<vk::Result> {
        let wait_semaphore = self.state.sync.render_complete_semaphore(image_index)?;
        Ok(self
            .state
            .surface
            .present(self.state.context.graphics_queue(), wait_semaphore, image_index))
    }

    fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.state.resize_requested)
    }
}

/// Owner of the renderer's GPU resources and driver of the frame loop
pub struct FrameOrchestrator {
    cycle: FrameCycle,
    state: RenderState,
    destroyed: bool,
}

impl FrameOrchestrator {
    /// Bring up Vulkan for `window` using the renderer and asset settings in `config`
    pub fn new<W: SurfaceWindow + ?Sized>(window: &mut W, config: &ViewerConfig) -> VulkanResult<Self> {
        Self::with_clock(window, config, AnimationClock::start())
    }

    /// Like [`FrameOrchestrator::new`], animating from `clock` instead of wall time
    pub fn with_clock<W: SurfaceWindow + ?Sized>(
        window: &mut W,
        config: &ViewerConfig,
        clock: AnimationClock,
    ) -> VulkanResult<Self> {
        let renderer = &config.renderer;
        let frames_in_flight = renderer.max_frames_in_flight.max(1);
        let backend = RenderingBackend::from_compatibility(renderer.compatibility_enabled());
        log::info!("Initializing renderer ({:?}, {} frames in flight)", backend, frames_in_flight);

        let extensions = window.required_instance_extensions()?;
        let mut context = GraphicsContext::new(
            &renderer.application_name,
            &renderer.validation_layers,
            renderer.validation_enabled(),
            &extensions,
            backend,
        )?;
        context.create_surface(window)?;
        context.create_logical_device()?;

        let depth_format = context.find_depth_format()?;
        let extent = wait_for_nonzero_extent(window)
            .ok_or_else(|| VulkanError::InitializationFailed("window closed before the first frame".to_string()))?;
        let mut surface = PresentationSurface::new(&context, extent, depth_format)?;
        let depth = depth_image(&context, surface.extent(), depth_format)?;
        surface.rebuild_framebuffers(depth.view())?;

        let target = match backend {
            RenderingBackend::LegacyRenderPass => {
                PipelineTarget::RenderPass(surface.render_pass().ok_or_else(|| {
                    VulkanError::InitializationFailed("legacy backend without a render pass".to_string())
                })?)
            }
            RenderingBackend::DynamicRendering => PipelineTarget::Dynamic {
                color_format: surface.format().format,
                depth_format,
            },
        };
        let spirv = read_spirv(&config.assets.shader_path)?;
        let pipeline = PipelineState::new(&context, &spirv, target)?;

        let commands = CommandDispatcher::new(&context, frames_in_flight)?;

        let mut uniform_buffers = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            let mut buffer = GpuBuffer::new(
                &context,
                UniformBufferObject::SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            // Stays mapped until destroy
            buffer.map()?;
            uniform_buffers.push(buffer);
        }

        let device = context.device()?.clone();
        let descriptor_pool = DescriptorPool::new(device.clone(), frames_in_flight as u32)?;
        let descriptor_sets = descriptor_pool.allocate_sets(pipeline.descriptor_set_layout(), frames_in_flight)?;

        let texture = upload_texture(&context, &commands, &ImageData::solid_color(1, 1, PLACEHOLDER_TEXEL))?;

        let sync = FrameSynchronizer::new(device, frames_in_flight, surface.image_count())?;

        let state = RenderState {
            sync,
            texture,
            mesh: RenderableMesh::new(),
            descriptor_sets,
            descriptor_pool,
            uniform_buffers,
            commands,
            pipeline,
            depth,
            surface,
            context,
            clock,
            resize_requested: false,
        };
        state.write_descriptor_sets()?;

        log::info!("Renderer ready");
        Ok(Self {
            cycle: FrameCycle::new(frames_in_flight),
            state,
            destroyed: false,
        })
    }

    /// Render and present one frame
    ///
    /// A stale surface is rebuilt in place; `window` is needed to read the new
    /// framebuffer size.
    pub fn draw_frame<W: SurfaceWindow + ?Sized>(&mut self, window: &mut W) -> VulkanResult<FrameStatus> {
        let mut backend = WindowedFrame {
            state: &mut self.state,
            window,
        };
        self.cycle.draw_frame(&mut backend)
    }

    /// Replace the mesh with the contents of an OBJ file
    pub fn load_model<P: AsRef<Path>>(&mut self, path: P) -> VulkanResult<()> {
        let state = &mut self.state;
        state.mesh.load_from_source(&state.context, &state.commands, path)
    }

    /// Replace the texture with an image file and repoint every descriptor set at it
    pub fn load_texture<P: AsRef<Path>>(&mut self, path: P) -> VulkanResult<()> {
        let pixels = ImageData::from_file(path)?;
        let texture = upload_texture(&self.state.context, &self.state.commands, &pixels)?;

        // The old texture may still be sampled by in-flight frames
        self.state.context.wait_idle()?;
        self.state.texture = texture;
        self.state.write_descriptor_sets()
    }

    /// Note that the framebuffer changed size; the surface is rebuilt after the next present
    pub fn handle_framebuffer_resize(&mut self) {
        self.state.resize_requested = true;
    }

    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.state.context.wait_idle()
    }

    /// Frame-in-flight slot the next frame will use
    pub fn current_frame(&self) -> usize {
        self.cycle.current()
    }

    pub fn backend(&self) -> RenderingBackend {
        self.state.context.backend()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.state.surface.extent()
    }

    pub fn mesh(&self) -> &RenderableMesh {
        &self.state.mesh
    }

    /// Wait for the device, then release everything in reverse creation order
    ///
    /// Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = self.state.context.wait_idle() {
            log::warn!("Device wait failed during teardown: {}", e);
        }

        let state = &mut self.state;
        state.sync.destroy();
        state.texture.destroy();
        state.mesh.destroy();
        state.descriptor_pool.destroy();
        for buffer in &mut state.uniform_buffers {
            buffer.destroy();
        }
        state.uniform_buffers.clear();
        state.commands.destroy();
        state.pipeline.destroy();
        state.depth.destroy();
        state.surface.destroy();
        state.context.destroy();

        self.destroyed = true;
        log::info!("Renderer destroyed");
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::time::TimeSource;
    use crate::render::vulkan::Window;
    use approx::assert_relative_eq;
    use std::time::Instant;

    /// Time source that never advances
    struct FrozenTime(Instant);

    impl TimeSource for FrozenTime {
        fn now(&self) -> Instant {
            self.0
        }
    }

    #[test]
    fn test_injected_clock_drives_frame_uniforms() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let clock = AnimationClock::with_source(Box::new(FrozenTime(Instant::now())));

        let first = frame_uniforms(&clock, extent);
        let second = frame_uniforms(&clock, extent);

        assert_eq!(first, second);
        assert_eq!(first, UniformBufferObject::for_frame(0.0, extent));
        assert_relative_eq!(clock.elapsed_secs(), 0.0);
    }

    // Needs a display, a Vulkan driver and the stock assets
    #[test]
    #[ignore]
    fn test_renders_first_frames() {
        crate::foundation::logging::init_for_tests();
        let config = ViewerConfig::default();
        let mut window = Window::new(&config.window.title, config.window.width, config.window.height).unwrap();
        let clock = AnimationClock::with_source(Box::new(FrozenTime(Instant::now())));
        let mut renderer = FrameOrchestrator::with_clock(&mut window, &config, clock).unwrap();
        renderer.load_model(&config.assets.model_path).unwrap();
        renderer.load_texture(&config.assets.texture_path).unwrap();

        let mut observed = Vec::new();
        for _ in 0..5 {
            observed.push(renderer.current_frame());
            renderer.draw_frame(&mut window).unwrap();
        }

        assert!(renderer.mesh().has_data());
        assert_eq!(observed, vec![0, 1, 0, 1, 0]);
        renderer.wait_idle().unwrap();
        renderer.destroy();
    }
}
