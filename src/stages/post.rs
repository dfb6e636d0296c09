//! Post-Processing Chain
//!
//! A priority-ordered list of [`PostFeature`]s ping-ponging between two
//! canvas-sized color buffers, bracketed by a begin pass (priority 4000)
//! that copies the scene into the chain and a finish pass (5000) that
//! writes the final source to the backbuffer.
//!
//! Ping-pong contract: [`source_framebuffer`](PostChain::source_framebuffer)
//! is the buffer last written, [`target_framebuffer`](PostChain::target_framebuffer)
//! the other one. Every pass that writes the target must call
//! [`flip`](PostChain::flip) so the next consumer's source is correct; the
//! chain flips automatically after the begin pass and after every feature.
//!
//! A feature that wants to own the begin or finish pass calls
//! [`override_begin`](PostChain::override_begin) /
//! [`override_finish`](PostChain::override_finish), which returns the
//! reserved view and permanently disables the chain's default pass on it.

use crate::errors::Result;
use crate::frame::{screen_projection, FrameContext, RenderFeature};
use crate::gfx::{
    FrameBufferHandle, GraphicsDevice, ShaderHandle, ShaderLibrary, StateFlags, TextureFlags,
    TextureFormat, TextureHandle, ViewId, ViewRegistry,
};
use crate::targets::{AttachmentDesc, TargetSet};

/// What one post feature sees while rendering.
pub struct PostContext<'a, 'b> {
    /// The frame being rendered.
    pub frame: &'a mut FrameContext<'b>,
    /// Framebuffer holding the chain's current contents.
    pub source: FrameBufferHandle,
    /// Color texture behind `source`, for sampling.
    pub source_texture: TextureHandle,
    /// Framebuffer the feature must write into.
    pub target: FrameBufferHandle,
}

/// A registered post-processing effect.
///
/// Features read the chain's source and write its target; the chain flips
/// the buffers after each feature on its own.
pub trait PostFeature {
    /// Feature name; used for removal and logs.
    fn name(&self) -> &'static str;

    /// Execution priority. Lower runs earlier; ties run in registration
    /// order.
    fn priority(&self) -> u16;

    /// Renders the effect from `ctx.source` into `ctx.target`.
    fn render(&mut self, ctx: &mut PostContext<'_, '_>);
}

/// The post-processing chain stage.
pub struct PostChain {
    buffers: [TargetSet; 2],
    index: usize,
    features: Vec<Box<dyn PostFeature>>,

    begin_view: ViewId,
    finish_view: ViewId,
    begin_shader: ShaderHandle,
    finish_shader: ShaderHandle,
    begin_enabled: bool,
    finish_enabled: bool,
}

impl PostChain {
    /// Registers the begin/finish views and builds the ping-pong buffers.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures from the initial buffer build.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        shaders: &mut dyn ShaderLibrary,
        views: &mut ViewRegistry,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let mut chain = Self {
            buffers: [TargetSet::invalid("post0"), TargetSet::invalid("post1")],
            index: 0,
            features: Vec::new(),
            begin_view: views.get_view("Post_Begin", Some(4000)),
            finish_view: views.get_view("Post_Finish", Some(5000)),
            begin_shader: shaders.shader("rendering/begin_vs", "rendering/begin_fs"),
            finish_shader: shaders.shader("rendering/finish_vs", "rendering/finish_fs"),
            begin_enabled: true,
            finish_enabled: true,
        };
        chain.rebuild(device, width, height)?;
        Ok(chain)
    }

    /// Rebuilds both ping-pong buffers at the new canvas size.
    ///
    /// # Errors
    ///
    /// Returns the first allocation failure; both buffers are attempted.
    pub fn rebuild(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<()> {
        let desc = [AttachmentDesc::Owned {
            format: TextureFormat::Bgra8,
            flags: TextureFlags::render_target_nearest_clamp(),
        }];
        let a = self.buffers[0].rebuild(device, width, height, &desc);
        let b = self.buffers[1].rebuild(device, width, height, &desc);
        a.and(b)
    }

    /// Tears down both buffers.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for buffer in &mut self.buffers {
            buffer.destroy(device);
        }
    }

    /// The buffer last written: what the next pass should read.
    #[must_use]
    pub fn source_framebuffer(&self) -> FrameBufferHandle {
        self.buffers[self.index].framebuffer()
    }

    /// The color texture behind the current source.
    #[must_use]
    pub fn source_texture(&self) -> TextureHandle {
        self.buffers[self.index].texture(0)
    }

    /// The buffer the next pass should write.
    #[must_use]
    pub fn target_framebuffer(&self) -> FrameBufferHandle {
        self.buffers[self.index ^ 1].framebuffer()
    }

    /// Swaps source and target. Must follow every write into the target.
    pub fn flip(&mut self) {
        self.index ^= 1;
    }

    /// Registers a feature and re-sorts the list by ascending priority.
    /// Equal priorities keep their registration order.
    pub fn add_feature(&mut self, feature: Box<dyn PostFeature>) {
        log::debug!(
            "post: adding feature '{}' (priority {})",
            feature.name(),
            feature.priority()
        );
        self.features.push(feature);
        self.features.sort_by_key(|f| f.priority());
    }

    /// Removes a feature by name, returning it if present.
    pub fn remove_feature(&mut self, name: &str) -> Option<Box<dyn PostFeature>> {
        let pos = self.features.iter().position(|f| f.name() == name)?;
        Some(self.features.remove(pos))
    }

    /// Names of registered features in execution order.
    #[must_use]
    pub fn feature_order(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    /// Claims the begin view. The chain's default begin pass is disabled
    /// from now on; the caller owns copying the scene into the chain.
    pub fn override_begin(&mut self) -> ViewId {
        self.begin_enabled = false;
        self.begin_view
    }

    /// Claims the finish view. The chain's default finish pass is disabled
    /// from now on; the caller owns presenting the final source.
    pub fn override_finish(&mut self) -> ViewId {
        self.finish_enabled = false;
        self.finish_view
    }
}

impl RenderFeature for PostChain {
    fn name(&self) -> &'static str {
        "post"
    }

    fn pre_render(&mut self, _ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {}

    fn render(&mut self, _ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {}

    fn post_render(&mut self, ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        let width = ctx.state.canvas_width;
        let height = ctx.state.canvas_height;
        let proj = screen_projection();

        if self.begin_enabled {
            ctx.device
                .set_view_frame_buffer(self.begin_view, self.target_framebuffer());
            ctx.device.set_view_transform(self.begin_view, None, &proj);
            ctx.device
                .set_view_rect(self.begin_view, 0, 0, width as u16, height as u16);
            ctx.device.set_texture(0, self.source_texture());
            ctx.device.set_state(StateFlags::composite());
            ctx.device.full_screen_quad(width as f32, height as f32);
            ctx.device.submit(self.begin_view, self.begin_shader);
            self.flip();
        }

        let mut index = self.index;
        for n in 0..self.features.len() {
            let mut post_ctx = PostContext {
                frame: &mut *ctx,
                source: self.buffers[index].framebuffer(),
                source_texture: self.buffers[index].texture(0),
                target: self.buffers[index ^ 1].framebuffer(),
            };
            self.features[n].render(&mut post_ctx);
            index ^= 1;
        }
        self.index = index;

        if self.finish_enabled {
            ctx.device.set_view_transform(self.finish_view, None, &proj);
            ctx.device
                .set_view_rect(self.finish_view, 0, 0, width as u16, height as u16);
            ctx.device.set_texture(0, self.source_texture());
            ctx.device.set_state(StateFlags::composite());
            ctx.device.full_screen_quad(width as f32, height as f32);
            ctx.device.submit(self.finish_view, self.finish_shader);
        }
    }
}
