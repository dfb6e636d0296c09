//! Directional Light with Cascaded Shadow Maps
//!
//! Renders shadow casters into four variance shadow map cascades, blurs
//! each cascade, composites them into a canvas-sized shadow buffer (with
//! its own blur), and finally accumulates the directional light into the
//! deferred light buffer using the shadow buffer as occlusion.
//!
//! View layout: the four cascades start at priority 500 and run
//! sequentially with their blur views, the shadow-buffer composite sits at
//! 1100 (between the G-Buffer at 1000 and the light accumulation at 1500),
//! and the light pass itself shares `DeferredLight` (1500).

use glam::{Mat4, Vec4};

use crate::cascade::{
    base_projection, bias_matrix, crop_matrix, fit_crop, frustum_corners_world,
    light_space_bounds, light_view_matrix, split_frustum, CASCADE_COUNT,
};
use crate::errors::Result;
use crate::frame::{screen_projection, FrameContext, FrameState, RenderFeature};
use crate::gfx::{
    ClearFlags, GraphicsDevice, ShaderHandle, ShaderLibrary, StateFlags, TextureFlags,
    TextureFormat, TextureHandle, UniformHandle, UniformKind, ViewId, ViewRegistry,
};
use crate::settings::ShadowSettings;
use crate::targets::{AttachmentDesc, TargetSet};

// Pure white regions break the variance blur, so cascades clear to
// just-under-white.
const CASCADE_CLEAR: u32 = 0xfefe_fefe;

/// The directional-light shadow stage.
pub struct DirectionalLightStage {
    enabled: bool,
    settings: ShadowSettings,

    cascade_views: [ViewId; CASCADE_COUNT],
    cascade_vblur_views: [ViewId; CASCADE_COUNT],
    cascade_hblur_views: [ViewId; CASCADE_COUNT],
    shadow_view: ViewId,
    shadow_vblur_view: ViewId,
    shadow_hblur_view: ViewId,
    light_view: ViewId,

    cascades: [TargetSet; CASCADE_COUNT],
    blur: TargetSet,
    shadow: TargetSet,
    shadow_blur: TargetSet,

    vsm_shader: ShaderHandle,
    vsm_skinned_shader: ShaderHandle,
    vblur_shader: ShaderHandle,
    hblur_shader: ShaderHandle,
    shadow_combine_shader: ShaderHandle,
    shadow_vblur_shader: ShaderHandle,
    shadow_hblur_shader: ShaderHandle,
    light_shader: ShaderHandle,

    cascade_mtx_uniforms: [UniformHandle; CASCADE_COUNT],
    blur_params_uniform: UniformHandle,
    light_dir_uniform: UniformHandle,
    light_color_uniform: UniformHandle,

    // Per-frame cascade math output.
    light_view_matrix: Mat4,
    cascade_projections: [Mat4; CASCADE_COUNT],
    cascade_matrices: [Mat4; CASCADE_COUNT],
}

impl DirectionalLightStage {
    /// Registers views, creates shaders and uniforms, and builds the
    /// cascade and shadow-buffer targets.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures from the initial target build.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        shaders: &mut dyn ShaderLibrary,
        views: &mut ViewRegistry,
        settings: ShadowSettings,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let cascade_views = [
            views.get_view("ShadowMap_Cascade0", Some(500)),
            views.get_view("ShadowMap_Cascade1", None),
            views.get_view("ShadowMap_Cascade2", None),
            views.get_view("ShadowMap_Cascade3", None),
        ];
        let mut cascade_vblur_views = [ViewId(0); CASCADE_COUNT];
        let mut cascade_hblur_views = [ViewId(0); CASCADE_COUNT];
        for i in 0..CASCADE_COUNT {
            cascade_vblur_views[i] = views.get_view(CASCADE_VBLUR_NAMES[i], None);
            cascade_hblur_views[i] = views.get_view(CASCADE_HBLUR_NAMES[i], None);
        }

        let mut stage = Self {
            enabled: true,
            settings,
            cascade_views,
            cascade_vblur_views,
            cascade_hblur_views,
            shadow_view: views.get_view("ShadowBuffer", Some(1100)),
            shadow_vblur_view: views.get_view("ShadowBuffer_VBlur", None),
            shadow_hblur_view: views.get_view("ShadowBuffer_HBlur", None),
            light_view: views.get_view("DeferredLight", Some(1500)),
            cascades: [
                TargetSet::invalid("cascade0"),
                TargetSet::invalid("cascade1"),
                TargetSet::invalid("cascade2"),
                TargetSet::invalid("cascade3"),
            ],
            blur: TargetSet::invalid("cascade_blur"),
            shadow: TargetSet::invalid("shadow"),
            shadow_blur: TargetSet::invalid("shadow_blur"),
            vsm_shader: shaders.shader("shadow/vsm_vs", "shadow/vsm_fs"),
            vsm_skinned_shader: shaders.shader("shadow/vsm_skinned_vs", "shadow/vsm_fs"),
            vblur_shader: shaders.shader("shadow/vblur_vs", "shadow/vblur_vsm_fs"),
            hblur_shader: shaders.shader("shadow/hblur_vs", "shadow/hblur_vsm_fs"),
            shadow_combine_shader: shaders.shader("shadow/buffer_vs", "shadow/buffer_fs"),
            shadow_vblur_shader: shaders.shader("shadow/buffer_vblur_vs", "shadow/buffer_vblur_fs"),
            shadow_hblur_shader: shaders.shader("shadow/buffer_hblur_vs", "shadow/buffer_hblur_fs"),
            light_shader: shaders.shader("shadow/dirlight_vs", "shadow/dirlight_fs"),
            cascade_mtx_uniforms: [
                device.create_uniform("u_cascadeMtx0", UniformKind::Mat4),
                device.create_uniform("u_cascadeMtx1", UniformKind::Mat4),
                device.create_uniform("u_cascadeMtx2", UniformKind::Mat4),
                device.create_uniform("u_cascadeMtx3", UniformKind::Mat4),
            ],
            blur_params_uniform: device.create_uniform("u_blurParams", UniformKind::Vec4),
            light_dir_uniform: device.create_uniform("u_dirLightDirection", UniformKind::Vec4),
            light_color_uniform: device.create_uniform("u_dirLightColor", UniformKind::Vec4),
            light_view_matrix: Mat4::IDENTITY,
            cascade_projections: [Mat4::IDENTITY; CASCADE_COUNT],
            cascade_matrices: [Mat4::IDENTITY; CASCADE_COUNT],
        };

        let params = stage.settings.blur_params;
        device.set_uniform_vec4(stage.blur_params_uniform, Vec4::from_array(params));

        stage.rebuild(device, width, height)?;
        Ok(stage)
    }

    /// Enables or disables the whole stage. When disabled, no shadow or
    /// light passes are submitted.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Rebuilds the cascade targets (fixed resolution) and the
    /// canvas-sized shadow buffers.
    ///
    /// # Errors
    ///
    /// Returns the first allocation failure; all sets are attempted.
    pub fn rebuild(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<()> {
        let size = self.settings.cascade_resolution;
        let cascade_desc = [
            AttachmentDesc::Owned {
                format: TextureFormat::Rgba8,
                flags: TextureFlags::RENDER_TARGET,
            },
            AttachmentDesc::Owned {
                format: TextureFormat::D16,
                flags: TextureFlags::RENDER_TARGET,
            },
        ];

        let mut result = Ok(());
        for cascade in &mut self.cascades {
            let r = cascade.rebuild(device, size, size, &cascade_desc);
            result = result.and(r);
        }
        let r = self.blur.rebuild(
            device,
            size,
            size,
            &[AttachmentDesc::Owned {
                format: TextureFormat::Rgba8,
                flags: TextureFlags::RENDER_TARGET,
            }],
        );
        result = result.and(r);

        let canvas_desc = [AttachmentDesc::Owned {
            format: TextureFormat::Bgra8,
            flags: TextureFlags::render_target_nearest_clamp(),
        }];
        let r = self.shadow.rebuild(device, width, height, &canvas_desc);
        result = result.and(r);
        let r = self.shadow_blur.rebuild(device, width, height, &canvas_desc);
        result = result.and(r);
        result
    }

    /// Tears down all targets.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for cascade in &mut self.cascades {
            cascade.destroy(device);
        }
        self.blur.destroy(device);
        self.shadow.destroy(device);
        self.shadow_blur.destroy(device);
    }

    /// The canvas-sized occlusion texture the light pass samples. Other
    /// lighting features may sample it as well.
    #[must_use]
    pub fn shadow_texture(&self) -> TextureHandle {
        self.shadow.texture(0)
    }

    /// Recomputes the cascade split/crop matrices from the frame's camera
    /// and light. Runs every frame; cameras move every frame anyway.
    fn refresh(&mut self, backend_flips_y: bool, state: &FrameState) {
        let bias = bias_matrix(backend_flips_y);
        self.light_view_matrix = light_view_matrix(state.light_direction);

        let inv_view = state.view_matrix.inverse();
        let splits = split_frustum(
            state.near_plane,
            state.far_plane,
            self.settings.split_lambda,
        );
        let proj = base_projection(state.far_plane);
        let stabilize = self
            .settings
            .stabilize
            .then_some(self.settings.cascade_resolution);

        for i in 0..CASCADE_COUNT {
            let corners = frustum_corners_world(
                splits[i * 2],
                splits[i * 2 + 1],
                state.projection_width,
                state.projection_height,
                &inv_view,
            );
            let (min, max) = light_space_bounds(&corners, &self.light_view_matrix);
            let crop = fit_crop(min, max, &proj, stabilize);

            self.cascade_projections[i] = proj * crop_matrix(crop);
            self.cascade_matrices[i] =
                bias * self.cascade_projections[i] * self.light_view_matrix;
        }
    }
}

const CASCADE_VBLUR_NAMES: [&str; CASCADE_COUNT] = [
    "ShadowMap_Cascade0_VBlur",
    "ShadowMap_Cascade1_VBlur",
    "ShadowMap_Cascade2_VBlur",
    "ShadowMap_Cascade3_VBlur",
];
const CASCADE_HBLUR_NAMES: [&str; CASCADE_COUNT] = [
    "ShadowMap_Cascade0_HBlur",
    "ShadowMap_Cascade1_HBlur",
    "ShadowMap_Cascade2_HBlur",
    "ShadowMap_Cascade3_HBlur",
];

impl RenderFeature for DirectionalLightStage {
    fn name(&self) -> &'static str {
        "directional_light"
    }

    fn pre_render(&mut self, ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        if !self.enabled {
            return;
        }

        self.refresh(ctx.device.backend().flips_texture_y(), ctx.state);

        let size = self.settings.cascade_resolution as u16;
        let screen_proj = screen_projection();

        for i in 0..CASCADE_COUNT {
            let view = self.cascade_views[i];
            ctx.device.set_view_rect(view, 0, 0, size, size);
            ctx.device
                .set_view_frame_buffer(view, self.cascades[i].framebuffer());
            ctx.device.set_view_transform(
                view,
                Some(&self.light_view_matrix),
                &self.cascade_projections[i],
            );
            ctx.device.set_view_clear(
                view,
                ClearFlags::COLOR | ClearFlags::DEPTH,
                CASCADE_CLEAR,
                1.0,
                0,
            );
            ctx.device.touch(view);

            ctx.device
                .set_uniform_mat4(self.cascade_mtx_uniforms[i], &self.cascade_matrices[i]);

            ctx.device
                .set_view_rect(self.cascade_vblur_views[i], 0, 0, size, size);
            ctx.device
                .set_view_rect(self.cascade_hblur_views[i], 0, 0, size, size);
            ctx.device.set_view_transform(
                self.cascade_vblur_views[i],
                Some(&Mat4::IDENTITY),
                &screen_proj,
            );
            ctx.device.set_view_transform(
                self.cascade_hblur_views[i],
                Some(&Mat4::IDENTITY),
                &screen_proj,
            );
            ctx.device
                .set_view_frame_buffer(self.cascade_vblur_views[i], self.blur.framebuffer());
            ctx.device
                .set_view_frame_buffer(self.cascade_hblur_views[i], self.cascades[i].framebuffer());
        }

        let width = ctx.state.canvas_width as u16;
        let height = ctx.state.canvas_height as u16;

        ctx.device.set_view_rect(self.shadow_view, 0, 0, width, height);
        ctx.device
            .set_view_frame_buffer(self.shadow_view, self.shadow.framebuffer());
        ctx.device.set_view_transform(self.shadow_view, None, &screen_proj);
        ctx.device.touch(self.shadow_view);

        ctx.device
            .set_view_rect(self.shadow_vblur_view, 0, 0, width, height);
        ctx.device
            .set_view_frame_buffer(self.shadow_vblur_view, self.shadow_blur.framebuffer());
        ctx.device
            .set_view_transform(self.shadow_vblur_view, None, &screen_proj);

        ctx.device
            .set_view_rect(self.shadow_hblur_view, 0, 0, width, height);
        ctx.device
            .set_view_frame_buffer(self.shadow_hblur_view, self.shadow.framebuffer());
        ctx.device
            .set_view_transform(self.shadow_hblur_view, None, &screen_proj);
    }

    fn render(&mut self, ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {
        if !self.enabled {
            return;
        }
        if self.cascades.iter().any(|c| !c.is_valid()) || !self.shadow.is_valid() {
            log::warn!("directional_light: skipping frame, targets invalid");
            return;
        }

        let size = self.settings.cascade_resolution as f32;
        let width = ctx.state.canvas_width as f32;
        let height = ctx.state.canvas_height as f32;

        // Render casters into every cascade.
        for item in ctx.items.iter().filter(|i| i.casts_shadow) {
            for view in self.cascade_views {
                ctx.device.set_transform(&item.transforms);
                ctx.device.set_vertex_buffer(item.vertex_buffer);
                ctx.device.set_index_buffer(item.index_buffer);
                ctx.device.set_state(StateFlags::shadow_caster());
                let shader = if item.is_skinned() {
                    self.vsm_skinned_shader
                } else {
                    self.vsm_shader
                };
                ctx.device.submit(view, shader);
            }
        }

        // Separable blur per cascade: vertical into the scratch buffer,
        // horizontal back into the cascade.
        let blur_state = StateFlags::composite() | StateFlags::MSAA;
        for i in 0..CASCADE_COUNT {
            ctx.device.set_texture(0, self.cascades[i].texture(0));
            ctx.device.set_state(blur_state);
            ctx.device.full_screen_quad(size, size);
            ctx.device.submit(self.cascade_vblur_views[i], self.vblur_shader);

            ctx.device.set_texture(0, self.blur.texture(0));
            ctx.device.set_state(blur_state);
            ctx.device.full_screen_quad(size, size);
            ctx.device.submit(self.cascade_hblur_views[i], self.hblur_shader);
        }

        // Composite the cascades into the canvas-sized shadow buffer.
        ctx.device.set_texture(0, ctx.shared.depth());
        for i in 0..CASCADE_COUNT {
            ctx.device.set_texture(1 + i as u8, self.cascades[i].texture(0));
        }
        ctx.device.set_state(StateFlags::composite());
        ctx.device.full_screen_quad(width, height);
        ctx.device.submit(self.shadow_view, self.shadow_combine_shader);

        // Blur the shadow buffer.
        ctx.device.set_texture(0, self.shadow.texture(0));
        ctx.device.set_state(blur_state);
        ctx.device.full_screen_quad(width, height);
        ctx.device
            .submit(self.shadow_vblur_view, self.shadow_vblur_shader);

        ctx.device.set_texture(0, self.shadow_blur.texture(0));
        ctx.device.set_state(blur_state);
        ctx.device.full_screen_quad(width, height);
        ctx.device
            .submit(self.shadow_hblur_view, self.shadow_hblur_shader);

        // Accumulate the directional light.
        ctx.device.set_uniform_vec4(
            self.light_dir_uniform,
            (ctx.state.light_direction, 0.0).into(),
        );
        ctx.device
            .set_uniform_vec4(self.light_color_uniform, ctx.state.light_color);

        ctx.device.set_texture(0, ctx.shared.normal());
        ctx.device.set_texture(1, ctx.shared.mat_info());
        ctx.device.set_texture(2, ctx.shared.depth());
        ctx.device.set_texture(3, self.shadow.texture(0));

        ctx.device.set_state(StateFlags::composite());
        ctx.device.full_screen_quad(width, height);
        ctx.device.submit(self.light_view, self.light_shader);
    }

    fn post_render(&mut self, _ctx: &mut FrameContext<'_>, _views: &mut ViewRegistry) {}
}
