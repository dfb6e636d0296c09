//! Weighted-Blended Order-Independent Transparency
//!
//! Transparent geometry accumulates premultiplied color into an RGBA16F
//! buffer and coverage into an R16F weight buffer, sharing the opaque depth
//! plane for testing (never writing it). The composite pass then resolves
//! accumulation against the opaque color into the post chain's source
//! buffer, handing the finished frame to post-processing.

use crate::errors::Result;
use crate::frame::{screen_projection, FrameContext, RenderFeature};
use crate::gfx::{
    ClearFlags, GraphicsDevice, ShaderHandle, ShaderLibrary, StateFlags, TextureFlags,
    TextureFormat, ViewId, ViewRegistry,
};
use crate::common::SharedTargets;
use crate::targets::{AttachmentDesc, TargetSet};

/// The order-independent transparency stage.
pub struct TransparencyStage {
    buffer_view: ViewId,
    final_view: ViewId,
    buffer: TargetSet,
    combine_shader: ShaderHandle,
}

impl TransparencyStage {
    /// Registers views and builds the accumulation buffer.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures from the initial target build.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        shaders: &mut dyn ShaderLibrary,
        views: &mut ViewRegistry,
        shared: &SharedTargets,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let mut stage = Self {
            buffer_view: views.get_view("TransparencyBuffer", Some(3000)),
            final_view: views.get_view("TransparencyFinal", None),
            buffer: TargetSet::invalid("transparency"),
            combine_shader: shaders.shader("rendering/oit_combine_vs", "rendering/oit_combine_fs"),
        };
        stage.rebuild(device, shared, width, height)?;
        Ok(stage)
    }

    /// Rebuilds the accumulation buffer, borrowing the shared depth plane.
    ///
    /// # Errors
    ///
    /// [`crate::errors::RenderError::ResourceAllocation`] on failure.
    pub fn rebuild(
        &mut self,
        device: &mut dyn GraphicsDevice,
        shared: &SharedTargets,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let sampler = TextureFlags::render_target_nearest_clamp();
        self.buffer.rebuild(
            device,
            width,
            height,
            &[
                AttachmentDesc::Owned {
                    format: TextureFormat::Rgba16F,
                    flags: sampler,
                },
                AttachmentDesc::Owned {
                    format: TextureFormat::R16F,
                    flags: sampler,
                },
                AttachmentDesc::Borrowed(shared.depth()),
            ],
        )
    }

    /// Tears down the accumulation buffer.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.buffer.destroy(device);
    }

    /// The view transparent scene objects submit geometry to.
    #[must_use]
    pub fn buffer_view(&self) -> ViewId {
        self.buffer_view
    }
}

impl RenderFeature for TransparencyStage {
    fn name(&self) -> &'static str {
        "transparency"
    }

    fn pre_render(&mut self, ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        // Color accumulator clears to transparent black, the weight
        // accumulator to one.
        ctx.device.set_clear_color(0, [0.0, 0.0, 0.0, 0.0]);
        ctx.device.set_clear_color(1, [1.0, 1.0, 1.0, 1.0]);

        ctx.device
            .set_view_clear_palette(self.buffer_view, ClearFlags::COLOR, 1.0, 0, &[0, 1]);
        ctx.device
            .set_view_clear_palette(self.final_view, ClearFlags::COLOR, 1.0, 0, &[0]);
        ctx.device.touch(self.buffer_view);
        ctx.device.touch(self.final_view);

        let width = ctx.state.canvas_width as u16;
        let height = ctx.state.canvas_height as u16;
        let view_matrix = ctx.state.view_matrix;
        let projection = ctx.state.projection_matrix;

        ctx.device
            .set_view_frame_buffer(self.buffer_view, self.buffer.framebuffer());
        ctx.device.set_view_rect(self.buffer_view, 0, 0, width, height);
        ctx.device
            .set_view_transform(self.buffer_view, Some(&view_matrix), &projection);

        // Composite straight into the post chain's source.
        ctx.device
            .set_view_frame_buffer(self.final_view, ctx.post_source);
    }

    fn render(&mut self, _ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        // Transparent scene objects submit their own geometry.
    }

    fn post_render(&mut self, ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        if !self.buffer.is_valid() {
            log::warn!("transparency: skipping composite, buffer invalid");
            return;
        }

        let width = ctx.state.canvas_width;
        let height = ctx.state.canvas_height;
        let proj = screen_projection();

        ctx.device.set_view_transform(self.final_view, None, &proj);
        ctx.device
            .set_view_rect(self.final_view, 0, 0, width as u16, height as u16);

        ctx.device.set_texture(0, ctx.shared.color());
        ctx.device.set_texture(1, self.buffer.texture(0));
        ctx.device.set_texture(2, self.buffer.texture(1));
        ctx.device.set_state(StateFlags::composite());
        ctx.device.full_screen_quad(width as f32, height as f32);
        ctx.device.submit(self.final_view, self.combine_shader);
    }
}
