//! Shader modules and the graphics pipeline
//!
//! One SPIR-V module supplies both stages through the `vertMain` and
//! `fragMain` entry points.

use ash::{vk, Device};
use std::ffi::CStr;

use super::context::GraphicsContext;
use super::descriptor::{DescriptorSetLayout, DescriptorSetLayoutBuilder};
use super::{VulkanError, VulkanResult};
use crate::render::Vertex;

const VERTEX_ENTRY: &[u8] = b"vertMain\0";
const FRAGMENT_ENTRY: &[u8] = b"fragMain\0";

fn entry_point(name: &'static [u8]) -> VulkanResult<&'static CStr> {
    CStr::from_bytes_with_nul(name)
        .map_err(|e| VulkanError::InitializationFailed(format!("invalid shader entry point: {e}")))
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        crate::assets::validate_spirv(bytes)?;
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to read SPIR-V: {e}")))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, module })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags, entry_point: &CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Where the pipeline's output goes
#[derive(Debug, Clone, Copy)]
pub enum PipelineTarget {
    /// Subpass 0 of a render pass
    RenderPass(vk::RenderPass),
    /// Dynamic rendering with these attachment formats
    Dynamic {
        color_format: vk::Format,
        depth_format: vk::Format,
    },
}

/// Binding 0: uniform buffer (vertex); binding 1: combined image sampler (fragment)
pub fn frame_descriptor_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
        .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
}

fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false)
        .line_width(1.0)
        .build()
}

fn depth_stencil_state() -> vk::PipelineDepthStencilStateCreateInfo {
    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
        .build()
}

/// Descriptor layout, pipeline layout and graphics pipeline
pub struct PipelineState {
    device: Device,
    descriptor_layout: DescriptorSetLayout,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl PipelineState {
    pub fn new(context: &GraphicsContext, spirv: &[u8], target: PipelineTarget) -> VulkanResult<Self> {
        let device = context.device()?.clone();

        let descriptor_layout = frame_descriptor_layout().build(&device)?;

        let set_layouts = [descriptor_layout.handle()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None).map_err(VulkanError::Api)? };

        let mut state = Self {
            device: device.clone(),
            descriptor_layout,
            layout,
            pipeline: vk::Pipeline::null(),
        };

        let shader = ShaderModule::from_bytes(device, spirv)?;
        let stages = [
            shader.stage_info(vk::ShaderStageFlags::VERTEX, entry_point(VERTEX_ENTRY)?),
            shader.stage_info(vk::ShaderStageFlags::FRAGMENT, entry_point(FRAGMENT_ENTRY)?),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; viewport and scissor are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = rasterization_state();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = depth_stencil_state();

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let color_formats;
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder();

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout);

        match target {
            PipelineTarget::RenderPass(render_pass) => {
                pipeline_info = pipeline_info.render_pass(render_pass).subpass(0);
            }
            PipelineTarget::Dynamic {
                color_format,
                depth_format,
            } => {
                color_formats = [color_format];
                rendering_info = rendering_info
                    .color_attachment_formats(&color_formats)
                    .depth_attachment_format(depth_format);
                pipeline_info = pipeline_info.push_next(&mut rendering_info);
            }
        }

        let pipelines = unsafe {
            state
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, result)| VulkanError::Api(result))?
        };
        state.pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("no pipeline returned".to_string()))?;

        log::info!("Graphics pipeline created for {:?}", target);
        Ok(state)
    }

    /// Record a pipeline bind
    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        }
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_layout.handle()
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn destroy(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(self.pipeline, None);
                self.pipeline = vk::Pipeline::null();
            }
            if self.layout != vk::PipelineLayout::null() {
                self.device.destroy_pipeline_layout(self.layout, None);
                self.layout = vk::PipelineLayout::null();
            }
        }
        self.descriptor_layout.destroy();
    }
}

impl Drop for PipelineState {
    fn drop(&mut self) {
        self.destroy();
    }
}
