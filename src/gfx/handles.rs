//! Resource Handles and Flag Sets
//!
//! Plain-data vocabulary of the graphics-device contract: `u16` handle
//! newtypes with an invalid sentinel, texture formats, and the flag sets
//! used for texture creation, view clearing, and draw state.

use bitflags::bitflags;

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u16);

        impl $name {
            /// The invalid sentinel handle.
            pub const INVALID: Self = Self(u16::MAX);

            /// Returns `true` if this handle refers to a live resource slot.
            #[inline]
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 != u16::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

handle_type!(
    /// Handle to a 2D (or cube) texture owned by the device.
    TextureHandle
);
handle_type!(
    /// Handle to a framebuffer (a set of texture attachments).
    FrameBufferHandle
);
handle_type!(
    /// Handle to a linked shader program.
    ShaderHandle
);
handle_type!(
    /// Handle to a named shader uniform.
    UniformHandle
);
handle_type!(
    /// Handle to a vertex buffer created by the external mesh system.
    VertexBufferHandle
);
handle_type!(
    /// Handle to an index buffer created by the external mesh system.
    IndexBufferHandle
);

/// Texture pixel formats used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit BGRA, the canvas-sized color format.
    Bgra8,
    /// 8-bit RGBA.
    Rgba8,
    /// 16-bit float RGBA (HDR accumulation).
    Rgba16F,
    /// 16-bit float single channel (OIT weight).
    R16F,
    /// 16-bit depth.
    D16,
    /// 24-bit depth + 8-bit stencil.
    D24S8,
    /// 32-bit float depth.
    D32F,
}

impl TextureFormat {
    /// Returns `true` for depth/stencil formats.
    #[inline]
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::D16 | Self::D24S8 | Self::D32F)
    }
}

/// Kinds of shader uniforms the pipeline creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    /// A single `vec4`.
    Vec4,
    /// A single 4x4 matrix.
    Mat4,
}

/// Identifies the backend's coordinate conventions.
///
/// OpenGL-family backends sample render targets with a flipped Y axis,
/// which the cascade bias matrix has to compensate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// No-op / headless backend (tests, tooling).
    #[default]
    Noop,
    /// Direct3D 11.
    Direct3D11,
    /// Direct3D 12.
    Direct3D12,
    /// Metal.
    Metal,
    /// Desktop OpenGL.
    OpenGl,
    /// OpenGL ES.
    OpenGlEs,
    /// Vulkan.
    Vulkan,
}

impl Backend {
    /// Returns `true` when sampled render targets are Y-flipped relative
    /// to the NDC convention the pipeline assumes.
    #[inline]
    #[must_use]
    pub const fn flips_texture_y(self) -> bool {
        matches!(self, Self::OpenGl | Self::OpenGlEs)
    }
}

bitflags! {
    /// Texture creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// The texture can be attached to a framebuffer.
        const RENDER_TARGET = 1 << 0;
        /// Render-target storage that is never sampled (e.g. throwaway depth).
        const RT_WRITE_ONLY = 1 << 1;
        /// Point minification filter.
        const MIN_POINT = 1 << 2;
        /// Point magnification filter.
        const MAG_POINT = 1 << 3;
        /// Point mip filter.
        const MIP_POINT = 1 << 4;
        /// Clamp addressing on U.
        const U_CLAMP = 1 << 5;
        /// Clamp addressing on V.
        const V_CLAMP = 1 << 6;
    }
}

impl TextureFlags {
    /// The sampler flag combination every screen-sized target in this
    /// pipeline uses: render target, point-filtered, clamped.
    #[must_use]
    pub const fn render_target_nearest_clamp() -> Self {
        Self::RENDER_TARGET
            .union(Self::MIN_POINT)
            .union(Self::MAG_POINT)
            .union(Self::MIP_POINT)
            .union(Self::U_CLAMP)
            .union(Self::V_CLAMP)
    }
}

bitflags! {
    /// Per-view clear flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        /// Clear color attachments.
        const COLOR = 1 << 0;
        /// Clear the depth attachment.
        const DEPTH = 1 << 1;
        /// Clear the stencil attachment.
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// Draw state flags, consumed by `submit`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateFlags: u32 {
        /// Write RGB channels.
        const WRITE_RGB = 1 << 0;
        /// Write the alpha channel.
        const WRITE_ALPHA = 1 << 1;
        /// Write depth.
        const WRITE_DEPTH = 1 << 2;
        /// Depth test: less.
        const DEPTH_TEST_LESS = 1 << 3;
        /// Cull counter-clockwise faces.
        const CULL_CCW = 1 << 4;
        /// Multisample rasterization.
        const MSAA = 1 << 5;
    }
}

impl StateFlags {
    /// Color-only write state used by every full-screen composition pass.
    #[must_use]
    pub const fn composite() -> Self {
        Self::WRITE_RGB.union(Self::WRITE_ALPHA)
    }

    /// Depth-tested opaque state used when rendering shadow casters.
    #[must_use]
    pub const fn shadow_caster() -> Self {
        Self::WRITE_RGB
            .union(Self::WRITE_ALPHA)
            .union(Self::WRITE_DEPTH)
            .union(Self::DEPTH_TEST_LESS)
            .union(Self::CULL_CCW)
            .union(Self::MSAA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handles_are_invalid() {
        assert!(!TextureHandle::default().is_valid());
        assert!(!FrameBufferHandle::default().is_valid());
        assert!(TextureHandle(0).is_valid());
    }

    #[test]
    fn depth_format_classification() {
        assert!(TextureFormat::D16.is_depth());
        assert!(TextureFormat::D32F.is_depth());
        assert!(!TextureFormat::Bgra8.is_depth());
    }

    #[test]
    fn only_gl_backends_flip_y() {
        assert!(Backend::OpenGl.flips_texture_y());
        assert!(Backend::OpenGlEs.flips_texture_y());
        assert!(!Backend::Vulkan.flips_texture_y());
        assert!(!Backend::Noop.flips_texture_y());
    }
}
