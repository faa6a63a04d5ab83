//! Creation and teardown ordering of the presenter's GPU objects.
//!
//! Every object is created in [`CreationStage::ALL`] order and released in
//! exactly the reverse order, after the device has gone idle.

use std::fmt;

/// One step of presenter construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreationStage {
    Instance,
    Surface,
    DebugMessenger,
    Device,
    /// Swapchain together with its image views.
    Swapchain,
    Shaders,
    RenderPass,
    PipelineLayout,
    Pipeline,
    Framebuffers,
    /// Command pools and the buffers allocated from them.
    CommandPool,
    /// Fences and semaphores.
    SyncPrimitives,
}

impl CreationStage {
    /// Stages in creation order.
    pub const ALL: [CreationStage; 12] = [
        CreationStage::Instance,
        CreationStage::Surface,
        CreationStage::DebugMessenger,
        CreationStage::Device,
        CreationStage::Swapchain,
        CreationStage::Shaders,
        CreationStage::RenderPass,
        CreationStage::PipelineLayout,
        CreationStage::Pipeline,
        CreationStage::Framebuffers,
        CreationStage::CommandPool,
        CreationStage::SyncPrimitives,
    ];

    /// Stages in release order.
    pub fn teardown_order() -> impl Iterator<Item = CreationStage> {
        Self::ALL.into_iter().rev()
    }

    /// Position in creation order.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CreationStage::Instance => "instance",
            CreationStage::Surface => "surface",
            CreationStage::DebugMessenger => "debug messenger",
            CreationStage::Device => "device",
            CreationStage::Swapchain => "swapchain",
            CreationStage::Shaders => "shader modules",
            CreationStage::RenderPass => "render pass",
            CreationStage::PipelineLayout => "pipeline layout",
            CreationStage::Pipeline => "pipeline",
            CreationStage::Framebuffers => "framebuffers",
            CreationStage::CommandPool => "command pool",
            CreationStage::SyncPrimitives => "sync primitives",
        }
    }
}

impl fmt::Display for CreationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tracks which stages have been released so each is released once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseLedger {
    released: u16,
}

impl ReleaseLedger {
    /// Marks `stage` released. Returns `false` if it already was.
    pub fn mark(&mut self, stage: CreationStage) -> bool {
        let bit = 1u16 << stage.index();
        let fresh = self.released & bit == 0;
        self.released |= bit;
        fresh
    }

    pub fn is_released(&self, stage: CreationStage) -> bool {
        self.released & (1u16 << stage.index()) != 0
    }

    /// True while nothing has been released.
    pub fn is_empty(&self) -> bool {
        self.released == 0
    }

    /// True once every stage has been released.
    pub fn is_complete(&self) -> bool {
        CreationStage::ALL.iter().all(|&stage| self.is_released(stage))
    }
}
