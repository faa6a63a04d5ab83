//! Per-frame command recording.
//!
//! The recorder is generic over [`CommandEncoder`] so the exact command
//! sequence can be checked without a device.

use ash::vk;

use framepace_rhi::RhiResult;
use framepace_rhi::command::CommandBuffer;

/// Sink for the commands of one frame.
pub trait CommandEncoder {
    /// Resets the buffer and starts a one-time-submit recording.
    fn begin(&mut self) -> RhiResult<()>;
    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    );
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn set_viewport(&mut self, viewport: vk::Viewport);
    fn set_scissor(&mut self, scissor: vk::Rect2D);
    fn draw(&mut self, vertex_count: u32);
    fn end_render_pass(&mut self);
    fn image_barrier(&mut self, barrier: &ImageBarrier);
    fn end(&mut self) -> RhiResult<()>;
}

/// Queue family ownership transfer of a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTransfer {
    pub src_family: u32,
    pub dst_family: u32,
}

/// One image memory barrier plus the stages it sits between.
#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub barrier: vk::ImageMemoryBarrier<'static>,
}

impl ImageBarrier {
    /// Releases `image` from the graphics family after the render pass has
    /// left it in `PRESENT_SRC_KHR`.
    pub fn release_for_present(image: vk::Image, transfer: QueueTransfer) -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            barrier: present_transfer_barrier(image, transfer)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        }
    }

    /// The matching acquire on the present family.
    pub fn acquire_for_present(image: vk::Image, transfer: QueueTransfer) -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            barrier: present_transfer_barrier(image, transfer),
        }
    }
}

fn present_transfer_barrier(
    image: vk::Image,
    transfer: QueueTransfer,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(transfer.src_family)
        .dst_queue_family_index(transfer.dst_family)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
}

/// Everything the recorder needs about the image being rendered.
#[derive(Debug, Clone, Copy)]
pub struct RecordTarget {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub framebuffer: vk::Framebuffer,
    pub image: vk::Image,
    /// Current swapchain extent; viewport and scissor cover all of it.
    pub extent: vk::Extent2D,
    /// Present-family handoff when the queue families differ.
    pub transfer: Option<QueueTransfer>,
}

/// Records the fixed clear-and-draw frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandRecorder {
    clear_color: [f32; 4],
    vertex_count: u32,
}

impl CommandRecorder {
    pub fn new(clear_color: [f32; 4], vertex_count: u32) -> Self {
        Self {
            clear_color,
            vertex_count,
        }
    }

    /// Fully re-records `encoder` for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be reset, begun or ended.
    pub fn record<E: CommandEncoder>(&self, encoder: &mut E, target: &RecordTarget) -> RhiResult<()> {
        let area = full_scissor(target.extent);

        encoder.begin()?;
        encoder.begin_render_pass(target.render_pass, target.framebuffer, area, self.clear_color);
        encoder.bind_pipeline(target.pipeline);
        encoder.set_viewport(full_viewport(target.extent));
        encoder.set_scissor(area);
        encoder.draw(self.vertex_count);
        encoder.end_render_pass();

        if let Some(transfer) = target.transfer {
            encoder.image_barrier(&ImageBarrier::release_for_present(target.image, transfer));
        }

        encoder.end()
    }

    #[inline]
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Viewport covering `extent` with the default depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor rectangle covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

impl CommandEncoder for CommandBuffer {
    fn begin(&mut self) -> RhiResult<()> {
        self.reset()?;
        CommandBuffer::begin(self, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        CommandBuffer::begin_render_pass(self, &begin_info);
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.bind_graphics_pipeline(pipeline);
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        CommandBuffer::set_viewport(self, &viewport);
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        CommandBuffer::set_scissor(self, &scissor);
    }

    fn draw(&mut self, vertex_count: u32) {
        CommandBuffer::draw(self, vertex_count, 1, 0, 0);
    }

    fn end_render_pass(&mut self) {
        CommandBuffer::end_render_pass(self);
    }

    fn image_barrier(&mut self, barrier: &ImageBarrier) {
        self.pipeline_barrier(
            barrier.src_stage,
            barrier.dst_stage,
            std::slice::from_ref(&barrier.barrier),
        );
    }

    fn end(&mut self) -> RhiResult<()> {
        CommandBuffer::end(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, PartialEq)]
    enum Command {
        Begin,
        BeginRenderPass { extent: vk::Extent2D, clear: [f32; 4] },
        BindPipeline(u64),
        Viewport { width: f32, height: f32 },
        Scissor(vk::Extent2D),
        Draw(u32),
        EndRenderPass,
        Barrier { src_family: u32, dst_family: u32 },
        End,
    }

    #[derive(Default)]
    struct Log(Vec<Command>);

    impl CommandEncoder for Log {
        fn begin(&mut self) -> RhiResult<()> {
            self.0.push(Command::Begin);
            Ok(())
        }
        fn begin_render_pass(
            &mut self,
            _render_pass: vk::RenderPass,
            _framebuffer: vk::Framebuffer,
            render_area: vk::Rect2D,
            clear_color: [f32; 4],
        ) {
            self.0.push(Command::BeginRenderPass {
                extent: render_area.extent,
                clear: clear_color,
            });
        }
        fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.0.push(Command::BindPipeline(pipeline.as_raw()));
        }
        fn set_viewport(&mut self, viewport: vk::Viewport) {
            self.0.push(Command::Viewport {
                width: viewport.width,
                height: viewport.height,
            });
        }
        fn set_scissor(&mut self, scissor: vk::Rect2D) {
            self.0.push(Command::Scissor(scissor.extent));
        }
        fn draw(&mut self, vertex_count: u32) {
            self.0.push(Command::Draw(vertex_count));
        }
        fn end_render_pass(&mut self) {
            self.0.push(Command::EndRenderPass);
        }
        fn image_barrier(&mut self, barrier: &ImageBarrier) {
            self.0.push(Command::Barrier {
                src_family: barrier.barrier.src_queue_family_index,
                dst_family: barrier.barrier.dst_queue_family_index,
            });
        }
        fn end(&mut self) -> RhiResult<()> {
            self.0.push(Command::End);
            Ok(())
        }
    }

    fn target(extent: vk::Extent2D, transfer: Option<QueueTransfer>) -> RecordTarget {
        RecordTarget {
            render_pass: vk::RenderPass::from_raw(1),
            pipeline: vk::Pipeline::from_raw(7),
            framebuffer: vk::Framebuffer::from_raw(3),
            image: vk::Image::from_raw(4),
            extent,
            transfer,
        }
    }

    #[test]
    fn test_records_clear_and_draw() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let recorder = CommandRecorder::new([0.0, 0.0, 0.0, 1.0], 3);
        let mut log = Log::default();
        recorder.record(&mut log, &target(extent, None)).unwrap();

        assert_eq!(
            log.0,
            vec![
                Command::Begin,
                Command::BeginRenderPass {
                    extent,
                    clear: [0.0, 0.0, 0.0, 1.0]
                },
                Command::BindPipeline(7),
                Command::Viewport {
                    width: 800.0,
                    height: 600.0
                },
                Command::Scissor(extent),
                Command::Draw(3),
                Command::EndRenderPass,
                Command::End,
            ]
        );
    }

    #[test]
    fn test_split_families_release_after_pass() {
        let extent = vk::Extent2D {
            width: 64,
            height: 32,
        };
        let transfer = QueueTransfer {
            src_family: 0,
            dst_family: 2,
        };
        let recorder = CommandRecorder::new([0.1, 0.2, 0.3, 1.0], 3);
        let mut log = Log::default();
        recorder
            .record(&mut log, &target(extent, Some(transfer)))
            .unwrap();

        let n = log.0.len();
        assert_eq!(log.0[n - 3], Command::EndRenderPass);
        assert_eq!(
            log.0[n - 2],
            Command::Barrier {
                src_family: 0,
                dst_family: 2
            }
        );
        assert_eq!(log.0[n - 1], Command::End);
    }

    #[test]
    fn test_full_viewport_and_scissor() {
        let extent = vk::Extent2D {
            width: 400,
            height: 320,
        };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.width, viewport.height), (400.0, 320.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = full_scissor(extent);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_transfer_barriers() {
        let transfer = QueueTransfer {
            src_family: 1,
            dst_family: 0,
        };
        let image = vk::Image::from_raw(9);

        let release = ImageBarrier::release_for_present(image, transfer);
        assert_eq!(
            release.barrier.src_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(release.barrier.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(release.barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let acquire = ImageBarrier::acquire_for_present(image, transfer);
        assert!(acquire.barrier.src_access_mask.is_empty());
        assert_eq!(acquire.barrier.src_queue_family_index, 1);
        assert_eq!(acquire.barrier.dst_queue_family_index, 0);
        assert_eq!(acquire.barrier.image, image);
    }
}
