//! Renderer
//!
//! Owns the graphics device, the view registry, the shared targets, and
//! the four pipeline stages, and drives them through the three-phase frame
//! sequence. Everything the stages share travels through explicit
//! arguments; the renderer holds no global state.

use glam::{Mat4, Vec3, Vec4};

use crate::common::SharedTargets;
use crate::errors::{RenderError, Result};
use crate::frame::{DrawItem, FrameContext, FrameState, RenderFeature};
use crate::gfx::{GraphicsDevice, ShaderLibrary, TextureHandle, ViewRegistry};
use crate::settings::RendererSettings;
use crate::stages::{DeferredStage, DirectionalLightStage, PostChain, TransparencyStage};

/// The deferred rendering pipeline.
pub struct Renderer<D: GraphicsDevice> {
    device: D,
    views: ViewRegistry,
    state: FrameState,
    shared: SharedTargets,

    deferred: DeferredStage,
    light: DirectionalLightStage,
    transparency: TransparencyStage,
    post: PostChain,
}

impl<D: GraphicsDevice> Renderer<D> {
    /// Builds the pipeline at the given canvas size.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidDimensions`] for a zero-sized canvas, or
    /// [`RenderError::ResourceAllocation`] if a stage's targets fail to
    /// allocate.
    pub fn new(
        mut device: D,
        shaders: &mut dyn ShaderLibrary,
        width: u32,
        height: u32,
        settings: RendererSettings,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }

        let mut views = ViewRegistry::new();
        let shared = SharedTargets::new(&mut device, width, height)?;
        let deferred = DeferredStage::new(
            &mut device,
            shaders,
            &mut views,
            &shared,
            settings.clear_color,
            width,
            height,
        )?;
        let light = DirectionalLightStage::new(
            &mut device,
            shaders,
            &mut views,
            settings.shadow,
            width,
            height,
        )?;
        let transparency =
            TransparencyStage::new(&mut device, shaders, &mut views, &shared, width, height)?;
        let post = PostChain::new(&mut device, shaders, &mut views, width, height)?;

        log::info!("renderer initialized at {width}x{height} ({} views)", views.len());

        Ok(Self {
            device,
            views,
            state: FrameState::new(width, height),
            shared,
            deferred,
            light,
            transparency,
            post,
        })
    }

    /// Rebuilds every resolution-sized target at the new canvas size.
    ///
    /// Every stage is rebuilt even if an earlier one fails, so a later
    /// resize can bring the whole pipeline back. Returns the first error.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidDimensions`] for a zero-sized canvas, or the
    /// first [`RenderError::ResourceAllocation`] encountered.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }

        log::info!("resizing to {width}x{height}");
        self.state.canvas_width = width;
        self.state.canvas_height = height;

        let mut result = self.shared.rebuild(&mut self.device, width, height);

        let r = self
            .deferred
            .rebuild(&mut self.device, &self.shared, width, height);
        result = result.and(r);
        let r = self.light.rebuild(&mut self.device, width, height);
        result = result.and(r);
        let r = self
            .transparency
            .rebuild(&mut self.device, &self.shared, width, height);
        result = result.and(r);
        let r = self.post.rebuild(&mut self.device, width, height);
        result = result.and(r);
        result
    }

    /// Releases all GPU resources, consuming the renderer and returning
    /// the device.
    pub fn shutdown(mut self) -> D {
        self.deferred.destroy(&mut self.device);
        self.light.destroy(&mut self.device);
        self.transparency.destroy(&mut self.device);
        self.post.destroy(&mut self.device);
        self.shared.destroy(&mut self.device);
        self.device
    }

    /// Sets the camera for subsequent frames.
    pub fn set_camera(&mut self, view: Mat4, projection: Mat4, near: f32, far: f32) {
        self.state.set_camera(view, projection, near, far);
    }

    /// Sets the directional light for subsequent frames.
    pub fn set_directional_light(&mut self, direction: Vec3, color: Vec4) {
        self.state.set_directional_light(direction, color);
    }

    /// Sets the ambient cubemaps sampled by the deferred combine pass.
    pub fn set_ambient_cubemaps(&mut self, radiance: TextureHandle, irradiance: TextureHandle) {
        self.deferred.set_ambient_cubemaps(radiance, irradiance);
    }

    /// The graphics device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The graphics device, mutable.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The view registry.
    #[must_use]
    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    /// The current frame state.
    #[must_use]
    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// The deferred stage.
    #[must_use]
    pub fn deferred(&self) -> &DeferredStage {
        &self.deferred
    }

    /// The directional-light stage.
    #[must_use]
    pub fn light(&self) -> &DirectionalLightStage {
        &self.light
    }

    /// The directional-light stage, mutable.
    pub fn light_mut(&mut self) -> &mut DirectionalLightStage {
        &mut self.light
    }

    /// The transparency stage.
    #[must_use]
    pub fn transparency(&self) -> &TransparencyStage {
        &self.transparency
    }

    /// The post chain.
    #[must_use]
    pub fn post(&self) -> &PostChain {
        &self.post
    }

    /// The post chain, mutable (feature registration, overrides).
    pub fn post_mut(&mut self) -> &mut PostChain {
        &mut self.post
    }

    /// Renders one frame from the given draw list.
    ///
    /// Runs all stages through `pre_render`, then `render`, then
    /// `post_render`; GPU-side pass ordering comes from view priorities.
    pub fn render_frame(&mut self, items: &[DrawItem]) {
        // Captured once: transparency composites into the buffer that is
        // the post chain's source when the frame starts.
        let post_source = self.post.source_framebuffer();

        let mut stages: [&mut dyn RenderFeature; 4] = [
            &mut self.deferred,
            &mut self.light,
            &mut self.transparency,
            &mut self.post,
        ];
        let mut ctx = FrameContext {
            device: &mut self.device,
            state: &self.state,
            shared: &self.shared,
            items,
            post_source,
        };

        for stage in &mut stages {
            stage.pre_render(&mut ctx, &mut self.views);
        }
        for stage in &mut stages {
            stage.render(&mut ctx, &mut self.views);
        }
        for stage in &mut stages {
            stage.post_render(&mut ctx, &mut self.views);
        }
    }
}
