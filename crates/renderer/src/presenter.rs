//! Vulkan implementation of [`FrameBackend`].
//!
//! [`VulkanPresenter`] owns every GPU object of the presenter, from the
//! instance down to the per-slot fences. Objects are created in
//! [`CreationStage::ALL`] order and released in exactly the reverse order,
//! either through [`FrameBackend::release`] (driven by the sequencer's
//! shutdown) or from `Drop`.
//!
//! # Resource Destruction Order
//!
//! ```text
//! sync primitives → command pools → framebuffers → pipeline →
//! pipeline layout → render pass → shader modules → swapchain (+ views) →
//! device → debug messenger → surface → instance
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use framepace_core::{Config, PresentModePreference};
use framepace_platform::{Surface, Window};
use framepace_rhi::command::{CommandBuffer, CommandPool};
use framepace_rhi::debug::{DebugMessenger, TracingSink};
use framepace_rhi::device::Device;
use framepace_rhi::instance::{Instance, InstanceDesc};
use framepace_rhi::physical_device::select_physical_device;
use framepace_rhi::pipeline::{
    CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout, PolygonMode,
    PrimitiveTopology,
};
use framepace_rhi::render_pass::{Framebuffers, RenderPass};
use framepace_rhi::shader::{Shader, ShaderStage};
use framepace_rhi::swapchain::{Swapchain, SwapchainDesc};
use framepace_rhi::sync::{Fence, Semaphore, SemaphorePair, semaphore_pair_count};
use framepace_rhi::{RhiError, RhiResult};

use crate::backend::{AcquireOutcome, FrameBackend, PresentOutcome, SubmitPlan};
use crate::error::{FrameError, FrameResult};
use crate::lifecycle::{CreationStage, ReleaseLedger};
use crate::recorder::{CommandRecorder, ImageBarrier, QueueTransfer, RecordTarget};

/// Fence and acquire waits block without a deadline.
const UNBOUNDED_TIMEOUT: u64 = u64::MAX;

/// Pre-recorded present-family acquire barriers, one per swapchain image.
struct OwnershipCommands {
    buffers: Vec<CommandBuffer>,
    /// Frees `buffers` when dropped.
    _pool: CommandPool,
}

impl OwnershipCommands {
    fn new(device: &Arc<Device>, transfer: QueueTransfer, images: &[vk::Image]) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), transfer.dst_family)?;
        let buffers = pool.allocate(images.len() as u32)?;

        for (buffer, &image) in buffers.iter().zip(images) {
            let barrier = ImageBarrier::acquire_for_present(image, transfer);
            buffer.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
            buffer.pipeline_barrier(
                barrier.src_stage,
                barrier.dst_stage,
                std::slice::from_ref(&barrier.barrier),
            );
            buffer.end()?;
        }

        debug!(
            "Recorded {} ownership acquire buffer(s) for family {} -> {}",
            buffers.len(),
            transfer.src_family,
            transfer.dst_family
        );

        Ok(Self {
            buffers,
            _pool: pool,
        })
    }

    fn buffer(&self, image_index: u32) -> RhiResult<vk::CommandBuffer> {
        self.buffers
            .get(image_index as usize)
            .map(CommandBuffer::handle)
            .ok_or_else(|| missing("ownership command buffer", image_index as usize))
    }
}

/// Owns the device, the swapchain and all per-frame state.
pub struct VulkanPresenter {
    // Sync primitives
    /// One fence per frame slot, created signaled.
    slot_fences: Vec<Fence>,
    /// `max(image_count, N)` acquire/render-finished pairs.
    semaphores: Vec<SemaphorePair>,
    /// Per-image semaphores signaled by the ownership acquire submission.
    ownership_ready: Vec<Semaphore>,

    // Command pools
    slot_buffers: Vec<CommandBuffer>,
    ownership: Option<OwnershipCommands>,
    command_pool: ManuallyDrop<CommandPool>,

    framebuffers: ManuallyDrop<Framebuffers>,
    pipeline: ManuallyDrop<Pipeline>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    render_pass: ManuallyDrop<RenderPass>,
    vertex_shader: ManuallyDrop<Shader>,
    fragment_shader: ManuallyDrop<Shader>,
    swapchain: ManuallyDrop<Swapchain>,
    device: ManuallyDrop<Arc<Device>>,
    debug_messenger: Option<DebugMessenger>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    recorder: CommandRecorder,
    /// Set when the graphics and present families differ.
    transfer: Option<QueueTransfer>,
    preferred_present_mode: vk::PresentModeKHR,
    released: ReleaseLedger,
}

impl VulkanPresenter {
    /// Builds every GPU object for `window`.
    ///
    /// A failure at any stage drops whatever was already created, in reverse
    /// order, and reports the failing stage.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Setup`] naming the stage that failed, or
    /// [`FrameError::Core`] if the window cannot provide a surface.
    pub fn new(window: &Window, config: &Config) -> FrameResult<Self> {
        use CreationStage as Stage;

        let (width, height) = window.framebuffer_size();
        let frames_in_flight = config.render.frames_in_flight.max(1);
        info!(
            "Initializing presenter ({}x{}, {} frame(s) in flight)",
            width, height, frames_in_flight
        );

        // Locals drop in reverse declaration order if a later stage fails.
        let instance = Instance::new(&InstanceDesc {
            application_name: config.window.title.clone(),
            enable_validation: config.render.validation_enabled(),
            extensions: window.required_extensions()?,
        })
        .map_err(FrameError::setup(Stage::Instance))?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let debug_messenger = DebugMessenger::new(&instance, Arc::new(TracingSink))
            .map_err(FrameError::setup(Stage::DebugMessenger))?;

        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())
            .map_err(FrameError::setup(Stage::Device))?;
        let device = Device::new(&instance, &physical).map_err(FrameError::setup(Stage::Device))?;
        let (graphics_family, present_family) = device
            .queue_families()
            .resolved()
            .map_err(FrameError::setup(Stage::Device))?;

        let preferred_present_mode = present_mode_for(config.render.present_mode);
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            &SwapchainDesc {
                surface: surface.handle(),
                extent: vk::Extent2D { width, height },
                preferred_present_mode,
            },
        )
        .map_err(FrameError::setup(Stage::Swapchain))?;

        let shaders = &config.shaders;
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &shaders.vertex,
            ShaderStage::Vertex,
            &shaders.entry_point,
        )
        .map_err(FrameError::setup(Stage::Shaders))?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &shaders.fragment,
            ShaderStage::Fragment,
            &shaders.entry_point,
        )
        .map_err(FrameError::setup(Stage::Shaders))?;

        let render_pass = RenderPass::new_single_color(device.clone(), swapchain.format())
            .map_err(FrameError::setup(Stage::RenderPass))?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[], &[])
            .map_err(FrameError::setup(Stage::PipelineLayout))?;
        let pipeline = build_pipeline(
            &device,
            &vertex_shader,
            &fragment_shader,
            &pipeline_layout,
            &render_pass,
        )
        .map_err(FrameError::setup(Stage::Pipeline))?;

        let framebuffers = Framebuffers::new(
            device.clone(),
            &render_pass,
            swapchain.image_views(),
            swapchain.extent(),
        )
        .map_err(FrameError::setup(Stage::Framebuffers))?;

        let transfer = (graphics_family != present_family).then_some(QueueTransfer {
            src_family: graphics_family,
            dst_family: present_family,
        });
        let command_pool = CommandPool::new(device.clone(), graphics_family)
            .map_err(FrameError::setup(Stage::CommandPool))?;
        let slot_buffers = command_pool
            .allocate(frames_in_flight as u32)
            .map_err(FrameError::setup(Stage::CommandPool))?;
        let ownership = transfer
            .map(|transfer| OwnershipCommands::new(&device, transfer, swapchain.images()))
            .transpose()
            .map_err(FrameError::setup(Stage::CommandPool))?;

        let slot_fences = (0..frames_in_flight)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<RhiResult<Vec<_>>>()
            .map_err(FrameError::setup(Stage::SyncPrimitives))?;
        let semaphores = SemaphorePair::create_many(
            &device,
            semaphore_pair_count(swapchain.image_count(), frames_in_flight),
        )
        .map_err(FrameError::setup(Stage::SyncPrimitives))?;
        let ownership_ready = if transfer.is_some() {
            create_semaphores(&device, swapchain.image_count() as usize)
                .map_err(FrameError::setup(Stage::SyncPrimitives))?
        } else {
            Vec::new()
        };

        info!(
            "Presenter ready: {:?} {}x{}, {} image(s), {} semaphore pair(s){}",
            swapchain.format(),
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count(),
            semaphores.len(),
            if transfer.is_some() {
                ", queue family ownership transfer enabled"
            } else {
                ""
            }
        );

        Ok(Self {
            slot_fences,
            semaphores,
            ownership_ready,
            slot_buffers,
            ownership,
            command_pool: ManuallyDrop::new(command_pool),
            framebuffers: ManuallyDrop::new(framebuffers),
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            render_pass: ManuallyDrop::new(render_pass),
            vertex_shader: ManuallyDrop::new(vertex_shader),
            fragment_shader: ManuallyDrop::new(fragment_shader),
            swapchain: ManuallyDrop::new(swapchain),
            device: ManuallyDrop::new(device),
            debug_messenger,
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            recorder: CommandRecorder::new(config.render.clear_color, config.render.vertex_count),
            transfer,
            preferred_present_mode,
            released: ReleaseLedger::default(),
        })
    }

    /// Number of frame slots.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slot_fences.len()
    }

    /// Swapchain format, or `UNDEFINED` once torn down.
    pub fn format(&self) -> vk::Format {
        if self.released.is_released(CreationStage::Swapchain) {
            return vk::Format::UNDEFINED;
        }
        self.swapchain.format()
    }

    /// Number of times the swapchain has been rebuilt.
    pub fn generation(&self) -> u64 {
        if self.released.is_released(CreationStage::Swapchain) {
            return 0;
        }
        self.swapchain.generation()
    }

    /// Queue family handoff in use, if the families differ.
    #[inline]
    pub fn queue_transfer(&self) -> Option<QueueTransfer> {
        self.transfer
    }

    /// True once any stage has been released.
    #[inline]
    pub fn is_torn_down(&self) -> bool {
        !self.released.is_empty()
    }

    fn ensure_live(&self) -> RhiResult<()> {
        if self.released.is_empty() {
            Ok(())
        } else {
            Err(RhiError::InvalidHandle(
                "presenter resources have been released".to_string(),
            ))
        }
    }

    fn fence(&self, slot: usize) -> RhiResult<&Fence> {
        self.slot_fences
            .get(slot)
            .ok_or_else(|| missing("frame slot", slot))
    }

    fn pair(&self, index: usize) -> RhiResult<&SemaphorePair> {
        self.semaphores
            .get(index)
            .ok_or_else(|| missing("semaphore pair", index))
    }

    /// Releases one stage's objects. The caller guarantees every stage
    /// created after it is already gone.
    fn release_one(&mut self, stage: CreationStage) {
        if !self.released.mark(stage) {
            return;
        }

        // SAFETY (all arms): the ledger admits each stage once, every later
        // stage has been released first, and no method touches a field after
        // `ensure_live` has started failing.
        match stage {
            CreationStage::SyncPrimitives => {
                self.ownership_ready.clear();
                self.semaphores.clear();
                self.slot_fences.clear();
            }
            CreationStage::CommandPool => {
                self.slot_buffers.clear();
                self.ownership = None;
                unsafe { ManuallyDrop::drop(&mut self.command_pool) };
            }
            CreationStage::Framebuffers => unsafe { ManuallyDrop::drop(&mut self.framebuffers) },
            CreationStage::Pipeline => unsafe { ManuallyDrop::drop(&mut self.pipeline) },
            CreationStage::PipelineLayout => unsafe {
                ManuallyDrop::drop(&mut self.pipeline_layout)
            },
            CreationStage::RenderPass => unsafe { ManuallyDrop::drop(&mut self.render_pass) },
            CreationStage::Shaders => unsafe {
                ManuallyDrop::drop(&mut self.fragment_shader);
                ManuallyDrop::drop(&mut self.vertex_shader);
            },
            CreationStage::Swapchain => unsafe { ManuallyDrop::drop(&mut self.swapchain) },
            CreationStage::Device => unsafe { ManuallyDrop::drop(&mut self.device) },
            CreationStage::DebugMessenger => self.debug_messenger = None,
            CreationStage::Surface => unsafe { ManuallyDrop::drop(&mut self.surface) },
            CreationStage::Instance => unsafe { ManuallyDrop::drop(&mut self.instance) },
        }

        debug!("Released {}", stage);
    }

    /// Recreates the per-image ownership state for the current swapchain.
    fn rebuild_ownership(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        self.ownership = None;
        self.ownership_ready.clear();

        if let Some(transfer) = self.transfer {
            self.ownership = Some(OwnershipCommands::new(
                device,
                transfer,
                self.swapchain.images(),
            )?);
            self.ownership_ready = create_semaphores(device, self.swapchain.image_count() as usize)?;
        }
        Ok(())
    }
}

impl FrameBackend for VulkanPresenter {
    fn image_count(&self) -> u32 {
        if self.released.is_released(CreationStage::Swapchain) {
            return 0;
        }
        self.swapchain.image_count()
    }

    fn extent(&self) -> vk::Extent2D {
        if self.released.is_released(CreationStage::Swapchain) {
            return vk::Extent2D::default();
        }
        self.swapchain.extent()
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.ensure_live()?;
        self.fence(slot)?.wait(UNBOUNDED_TIMEOUT)
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.ensure_live()?;
        self.fence(slot)?.reset()
    }

    fn acquire_image(&mut self, semaphore: usize) -> RhiResult<AcquireOutcome> {
        self.ensure_live()?;
        let image_acquired = self.pair(semaphore)?.image_acquired();
        self.swapchain.acquire(UNBOUNDED_TIMEOUT, image_acquired)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.ensure_live()?;

        let index = image_index as usize;
        let target = RecordTarget {
            render_pass: self.render_pass.handle(),
            pipeline: self.pipeline.handle(),
            framebuffer: self
                .framebuffers
                .get(index)
                .ok_or_else(|| missing("framebuffer", index))?,
            image: *self
                .swapchain
                .images()
                .get(index)
                .ok_or_else(|| missing("swapchain image", index))?,
            extent: self.swapchain.extent(),
            transfer: self.transfer,
        };

        let recorder = self.recorder;
        let buffer = self
            .slot_buffers
            .get_mut(slot)
            .ok_or_else(|| missing("command buffer", slot))?;
        recorder.record(buffer, &target)
    }

    fn submit(&mut self, plan: &SubmitPlan) -> RhiResult<()> {
        self.ensure_live()?;

        let wait_semaphores = [self.pair(plan.wait_semaphore)?.image_acquired()];
        let wait_stages = [plan.wait_stage];
        let signal_semaphores = [self.pair(plan.signal_semaphore)?.render_finished()];
        let command_buffers = [self
            .slot_buffers
            .get(plan.slot)
            .ok_or_else(|| missing("command buffer", plan.slot))?
            .handle()];
        let fence = self.fence(plan.slot)?.handle();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the buffer was recorded this tick and the fence was reset
        // after the slot's previous submission completed.
        unsafe { self.device.submit_graphics(&[submit_info], fence) }
    }

    fn present(&mut self, image_index: u32, wait_semaphore: usize) -> RhiResult<PresentOutcome> {
        self.ensure_live()?;

        let render_finished = self.pair(wait_semaphore)?.render_finished();

        let present_wait = match &self.ownership {
            Some(ownership) => {
                let ready = self
                    .ownership_ready
                    .get(image_index as usize)
                    .ok_or_else(|| missing("ownership semaphore", image_index as usize))?
                    .handle();

                let wait_semaphores = [render_finished];
                let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
                let command_buffers = [ownership.buffer(image_index)?];
                let signal_semaphores = [ready];
                let submit_info = vk::SubmitInfo::default()
                    .wait_semaphores(&wait_semaphores)
                    .wait_dst_stage_mask(&wait_stages)
                    .command_buffers(&command_buffers)
                    .signal_semaphores(&signal_semaphores);

                // SAFETY: the buffer was recorded once at build time from a
                // present-family pool and allows simultaneous use.
                unsafe { self.device.submit_present(&[submit_info])? };
                ready
            }
            None => render_finished,
        };

        self.swapchain
            .present(self.device.present_queue(), image_index, &[present_wait])
    }

    fn surface_extent(&mut self, requested: vk::Extent2D) -> RhiResult<vk::Extent2D> {
        self.ensure_live()?;
        self.swapchain
            .surface_extent(self.surface.handle(), requested)
    }

    fn rebuild(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.ensure_live()?;
        self.device.wait_idle()?;

        let device = Arc::clone(&self.device);
        let old_format = self.swapchain.format();

        // Nothing may reference the old views when the swapchain drops them.
        *self.framebuffers = Framebuffers::new(device.clone(), &self.render_pass, &[], extent)?;
        self.ownership = None;

        self.swapchain.recreate(&SwapchainDesc {
            surface: self.surface.handle(),
            extent,
            preferred_present_mode: self.preferred_present_mode,
        })?;

        if self.swapchain.format() != old_format {
            info!(
                "Surface format changed from {:?} to {:?}, rebuilding render pass and pipeline",
                old_format,
                self.swapchain.format()
            );
            let render_pass = RenderPass::new_single_color(device.clone(), self.swapchain.format())?;
            let pipeline = build_pipeline(
                &device,
                &self.vertex_shader,
                &self.fragment_shader,
                &self.pipeline_layout,
                &render_pass,
            )?;
            *self.pipeline = pipeline;
            *self.render_pass = render_pass;
        }

        *self.framebuffers = Framebuffers::new(
            device.clone(),
            &self.render_pass,
            self.swapchain.image_views(),
            self.swapchain.extent(),
        )?;

        self.semaphores = SemaphorePair::create_many(
            &device,
            semaphore_pair_count(self.swapchain.image_count(), self.slot_fences.len()),
        )?;
        self.rebuild_ownership(&device)?;

        debug!(
            "Rebuilt swapchain generation {} with {} semaphore pair(s)",
            self.swapchain.generation(),
            self.semaphores.len()
        );
        Ok(())
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        if self.released.is_released(CreationStage::Device) {
            return Ok(());
        }
        self.device.wait_idle()
    }

    /// Releases `stage` after every stage created later than it.
    fn release(&mut self, stage: CreationStage) {
        let later: Vec<_> = CreationStage::teardown_order()
            .take_while(|&s| s != stage)
            .collect();
        for s in later {
            self.release_one(s);
        }
        self.release_one(stage);
    }
}

impl Drop for VulkanPresenter {
    fn drop(&mut self) {
        if self.released.is_complete() {
            return;
        }

        if let Err(e) = self.wait_idle() {
            error!("Failed to wait for device idle before teardown: {}", e);
        }
        self.release(CreationStage::Instance);

        info!("Presenter destroyed");
    }
}

/// Maps the configured preference to a Vulkan present mode.
pub fn present_mode_for(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
    }
}

fn build_pipeline(
    device: &Arc<Device>,
    vertex_shader: &Shader,
    fragment_shader: &Shader,
    layout: &PipelineLayout,
    render_pass: &RenderPass,
) -> RhiResult<Pipeline> {
    GraphicsPipelineBuilder::new()
        .vertex_shader(vertex_shader)
        .fragment_shader(fragment_shader)
        .topology(PrimitiveTopology::TriangleList)
        .polygon_mode(PolygonMode::Fill)
        .cull_mode(CullMode::None)
        .front_face(FrontFace::Clockwise)
        .build(device.clone(), layout, render_pass)
}

fn create_semaphores(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Semaphore>> {
    (0..count).map(|_| Semaphore::new(device.clone())).collect()
}

fn missing(what: &str, index: usize) -> RhiError {
    RhiError::InvalidHandle(format!("no {} at index {}", what, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_mode_mapping() {
        assert_eq!(
            present_mode_for(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            present_mode_for(PresentModePreference::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_missing_names_index() {
        let err = missing("framebuffer", 5);
        assert!(err.to_string().contains("framebuffer"));
        assert!(err.to_string().contains('5'));
    }
}
