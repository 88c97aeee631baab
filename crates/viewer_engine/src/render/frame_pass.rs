//! Per-frame attachment setup for the two rendering backends

use ash::{vk, Device};

/// Clear values: opaque black colour, depth 1.0, stencil 0
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

fn subresource(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Swapchain image UNDEFINED to COLOR_ATTACHMENT_OPTIMAL
///
/// Source stage matches the acquire semaphore wait so the transition runs
/// after the presentation engine releases the image.
pub fn color_attachment_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2 {
    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::empty())
        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource(vk::ImageAspectFlags::COLOR))
        .build()
}

/// Depth image UNDEFINED to DEPTH_STENCIL_ATTACHMENT_OPTIMAL
pub fn depth_attachment_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2 {
    let fragment_tests =
        vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(fragment_tests)
        .src_access_mask(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(fragment_tests)
        .dst_access_mask(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource(vk::ImageAspectFlags::DEPTH))
        .build()
}

/// Swapchain image COLOR_ATTACHMENT_OPTIMAL to PRESENT_SRC_KHR
pub fn present_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2 {
    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
        .dst_access_mask(vk::AccessFlags2::empty())
        .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource(vk::ImageAspectFlags::COLOR))
        .build()
}

/// Attachment begin/end for one frame
#[derive(Debug, Clone, Copy)]
pub enum FramePass {
    /// Render pass with the framebuffer for the acquired image
    LegacyRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
    },
    /// Barriers around `vkCmdBeginRendering`
    DynamicRendering {
        color_image: vk::Image,
        color_view: vk::ImageView,
        depth_image: vk::Image,
        depth_view: vk::ImageView,
    },
}

impl FramePass {
    /// Transition attachments as needed and begin rendering over `extent`
    pub fn begin(&self, device: &Device, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clears = clear_values();

        match *self {
            Self::LegacyRenderPass {
                render_pass,
                framebuffer,
            } => {
                let begin_info = vk::RenderPassBeginInfo::builder()
                    .render_pass(render_pass)
                    .framebuffer(framebuffer)
                    .render_area(render_area)
                    .clear_values(&clears);
                unsafe {
                    device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
                }
            }
            Self::DynamicRendering {
                color_image,
                color_view,
                depth_image,
                depth_view,
            } => {
                let barriers = [color_attachment_barrier(color_image), depth_attachment_barrier(depth_image)];
                let dependency = vk::DependencyInfo::builder().image_memory_barriers(&barriers);

                let color_attachments = [vk::RenderingAttachmentInfo::builder()
                    .image_view(color_view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clears[0])
                    .build()];
                let depth_attachment = vk::RenderingAttachmentInfo::builder()
                    .image_view(depth_view)
                    .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .clear_value(clears[1]);

                let rendering_info = vk::RenderingInfo::builder()
                    .render_area(render_area)
                    .layer_count(1)
                    .color_attachments(&color_attachments)
                    .depth_attachment(&depth_attachment);

                unsafe {
                    device.cmd_pipeline_barrier2(command_buffer, &dependency);
                    device.cmd_begin_rendering(command_buffer, &rendering_info);
                }
            }
        }
    }

    /// End rendering and hand the colour image to presentation
    pub fn end(&self, device: &Device, command_buffer: vk::CommandBuffer) {
        match *self {
            Self::LegacyRenderPass { .. } => unsafe {
                device.cmd_end_render_pass(command_buffer);
            },
            Self::DynamicRendering { color_image, .. } => {
                let barriers = [present_barrier(color_image)];
                let dependency = vk::DependencyInfo::builder().image_memory_barriers(&barriers);
                unsafe {
                    device.cmd_end_rendering(command_buffer);
                    device.cmd_pipeline_barrier2(command_buffer, &dependency);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clear_values() {
        let clears = clear_values();
        unsafe {
            assert_eq!(clears[0].color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_relative_eq!(clears[1].depth_stencil.depth, 1.0);
            assert_eq!(clears[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_color_barrier_masks() {
        let barrier = color_attachment_barrier(vk::Image::null());
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::empty());
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_barrier_targets_depth_aspect() {
        let barrier = depth_attachment_barrier(vk::Image::null());
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert!(barrier
            .dst_stage_mask
            .contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS));
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_present_barrier_masks() {
        let barrier = present_barrier(vk::Image::null());
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::BOTTOM_OF_PIPE);
        assert!(barrier.dst_access_mask.is_empty());
    }
}
