//! Image layout states and aspects used by image barriers.

use bitflags::bitflags;

/// Image layout states that barriers can transition between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents undefined. Can transition to any layout.
    #[default]
    Undefined,
    /// General layout (least optimal but most flexible).
    General,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachment,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Ready to be handed to the presentation engine.
    PresentSrc,
}

bitflags! {
    /// Image aspects affected by a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl Default for ImageAspect {
    fn default() -> Self {
        Self::COLOR
    }
}
