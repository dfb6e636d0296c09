//! Deferred Geometry and Lighting
//!
//! Owns the G-Buffer, the light accumulation buffer, and the final buffer
//! the combine pass writes the lit opaque scene into. Geometry draws into
//! `DeferredGeometry` (priority 1000), lights accumulate into
//! `DeferredLight` (1500), and the full-screen combine runs in
//! `RenderLayer0` (2000), after which transparency and post take over.

use crate::common::SharedTargets;
use crate::errors::Result;
use crate::frame::{screen_projection, FrameContext, RenderFeature};
use crate::gfx::{
    ClearFlags, GraphicsDevice, ShaderHandle, ShaderLibrary, StateFlags, TextureFlags,
    TextureFormat, TextureHandle, ViewId, ViewRegistry,
};
use crate::targets::{AttachmentDesc, TargetSet};

/// The deferred G-Buffer/lighting stage.
pub struct DeferredStage {
    clear_color: [f32; 4],
    geometry_view: ViewId,
    light_view: ViewId,
    combine_view: ViewId,

    gbuffer: TargetSet,
    light_buffer: TargetSet,
    final_buffer: TargetSet,

    combine_shader: ShaderHandle,
    ambient_cubemap: TextureHandle,
    ambient_irr_cubemap: TextureHandle,
}

impl DeferredStage {
    /// Registers the stage's views and builds its canvas-sized targets.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures from the initial target build.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        shaders: &mut dyn ShaderLibrary,
        views: &mut ViewRegistry,
        shared: &SharedTargets,
        clear_color: [f32; 4],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let mut stage = Self {
            clear_color,
            geometry_view: views.get_view("DeferredGeometry", Some(1000)),
            light_view: views.get_view("DeferredLight", Some(1500)),
            combine_view: views.get_view("RenderLayer0", Some(2000)),
            gbuffer: TargetSet::invalid("gbuffer"),
            light_buffer: TargetSet::invalid("light"),
            final_buffer: TargetSet::invalid("final"),
            combine_shader: shaders.shader("rendering/combine_vs", "rendering/combine_fs"),
            ambient_cubemap: TextureHandle::INVALID,
            ambient_irr_cubemap: TextureHandle::INVALID,
        };
        stage.rebuild(device, shared, width, height)?;
        Ok(stage)
    }

    /// Sets the ambient radiance/irradiance cubemaps bound by the combine
    /// pass. Invalid handles are accepted; the combine then runs without
    /// ambient contribution.
    pub fn set_ambient_cubemaps(&mut self, radiance: TextureHandle, irradiance: TextureHandle) {
        self.ambient_cubemap = radiance;
        self.ambient_irr_cubemap = irradiance;
    }

    /// Rebuilds all canvas-sized targets, borrowing the shared planes.
    ///
    /// # Errors
    ///
    /// Returns the first allocation failure; every set is still attempted
    /// so a later resize can recover all of them.
    pub fn rebuild(
        &mut self,
        device: &mut dyn GraphicsDevice,
        shared: &SharedTargets,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let sampler = TextureFlags::render_target_nearest_clamp();

        let gbuffer = self.gbuffer.rebuild(
            device,
            width,
            height,
            &[
                AttachmentDesc::Owned {
                    format: TextureFormat::Bgra8,
                    flags: sampler,
                },
                AttachmentDesc::Borrowed(shared.normal()),
                AttachmentDesc::Borrowed(shared.mat_info()),
                AttachmentDesc::Borrowed(shared.depth()),
            ],
        );
        let light = self.light_buffer.rebuild(
            device,
            width,
            height,
            &[AttachmentDesc::Owned {
                format: TextureFormat::Bgra8,
                flags: sampler,
            }],
        );
        let fin = self.final_buffer.rebuild(
            device,
            width,
            height,
            &[
                AttachmentDesc::Borrowed(shared.color()),
                AttachmentDesc::Owned {
                    format: TextureFormat::D16,
                    flags: TextureFlags::RENDER_TARGET.union(TextureFlags::RT_WRITE_ONLY),
                },
            ],
        );

        gbuffer.and(light).and(fin)
    }

    /// Tears down the stage's targets.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.gbuffer.destroy(device);
        self.light_buffer.destroy(device);
        self.final_buffer.destroy(device);
    }

    /// The view opaque scene objects submit geometry to.
    #[must_use]
    pub fn geometry_view(&self) -> ViewId {
        self.geometry_view
    }

    /// The view light volumes accumulate into.
    #[must_use]
    pub fn light_view(&self) -> ViewId {
        self.light_view
    }
}

impl RenderFeature for DeferredStage {
    fn name(&self) -> &'static str {
        "deferred"
    }

    fn pre_render(&mut self, ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        let width = ctx.state.canvas_width as u16;
        let height = ctx.state.canvas_height as u16;
        let view_matrix = ctx.state.view_matrix;
        let projection = ctx.state.projection_matrix;

        ctx.device.set_clear_color(0, self.clear_color);

        // G-Buffer
        ctx.device.set_view_clear_palette(
            self.geometry_view,
            ClearFlags::COLOR | ClearFlags::DEPTH,
            1.0,
            0,
            &[0, 0, 0],
        );
        ctx.device.set_view_rect(self.geometry_view, 0, 0, width, height);
        ctx.device
            .set_view_frame_buffer(self.geometry_view, self.gbuffer.framebuffer());
        ctx.device
            .set_view_transform(self.geometry_view, Some(&view_matrix), &projection);
        ctx.device.touch(self.geometry_view);

        // Light accumulation
        ctx.device.set_view_clear_palette(
            self.light_view,
            ClearFlags::COLOR | ClearFlags::DEPTH,
            1.0,
            0,
            &[0],
        );
        ctx.device.set_view_rect(self.light_view, 0, 0, width, height);
        ctx.device
            .set_view_frame_buffer(self.light_view, self.light_buffer.framebuffer());
        ctx.device
            .set_view_transform(self.light_view, Some(&view_matrix), &projection);
        ctx.device.touch(self.light_view);

        // Combine output
        ctx.device
            .set_view_frame_buffer(self.combine_view, self.final_buffer.framebuffer());
    }

    fn render(&mut self, _ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        // Scene objects submit their own geometry to the views above.
    }

    fn post_render(&mut self, ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        if !self.gbuffer.is_valid() || !self.final_buffer.is_valid() {
            log::warn!("deferred: skipping combine, targets invalid");
            return;
        }

        let width = ctx.state.canvas_width as f32;
        let height = ctx.state.canvas_height as f32;
        let proj = screen_projection();

        ctx.device.set_view_transform(self.combine_view, None, &proj);
        ctx.device.set_view_rect(
            self.combine_view,
            0,
            0,
            ctx.state.canvas_width as u16,
            ctx.state.canvas_height as u16,
        );

        ctx.device.set_texture(0, self.gbuffer.texture(0)); // albedo
        ctx.device.set_texture(1, ctx.shared.normal());
        ctx.device.set_texture(2, ctx.shared.mat_info());
        ctx.device.set_texture(3, ctx.shared.depth());
        ctx.device.set_texture(4, self.light_buffer.texture(0));
        ctx.device.set_texture(5, self.ambient_cubemap);
        ctx.device.set_texture(6, self.ambient_irr_cubemap);

        ctx.device.set_state(StateFlags::composite());
        ctx.device.full_screen_quad(width, height);
        ctx.device.submit(self.combine_view, self.combine_shader);
    }
}
