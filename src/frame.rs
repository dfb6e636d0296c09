//! Frame Model
//!
//! Per-frame inputs ([`FrameState`]), the draw list ([`DrawItem`]), the
//! context handed to stages ([`FrameContext`]), and the [`RenderFeature`]
//! lifecycle every stage implements.
//!
//! A frame runs in three phases over the stage list: `pre_render` (target
//! validation, view configuration, per-frame math), `render` (geometry
//! submission), `post_render` (full-screen composition). All `pre_render`
//! calls complete before any `render`, and all `render` before any
//! `post_render`, so composition passes may rely on every stage's targets
//! being configured.

use glam::{Mat4, Vec3, Vec4};
use smallvec::SmallVec;

use crate::common::SharedTargets;
use crate::gfx::{
    FrameBufferHandle, GraphicsDevice, IndexBufferHandle, VertexBufferHandle, ViewRegistry,
};

/// Camera and lighting inputs for one frame.
#[derive(Debug, Clone)]
pub struct FrameState {
    /// Canvas width in pixels.
    pub canvas_width: u32,
    /// Canvas height in pixels.
    pub canvas_height: u32,
    /// World-to-camera matrix.
    pub view_matrix: Mat4,
    /// Camera projection matrix.
    pub projection_matrix: Mat4,
    /// Camera near plane distance.
    pub near_plane: f32,
    /// Camera far plane distance.
    pub far_plane: f32,
    /// Frustum half-width scale at unit distance (1 / m00).
    pub projection_width: f32,
    /// Frustum half-height scale at unit distance (1 / m11).
    pub projection_height: f32,
    /// Direction the directional light shines *towards* (normalized).
    pub light_direction: Vec3,
    /// Directional light color; `w` carries intensity.
    pub light_color: Vec4,
}

impl FrameState {
    /// Creates a neutral state at the given canvas size.
    #[must_use]
    pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            canvas_width,
            canvas_height,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            near_plane: 0.1,
            far_plane: 1000.0,
            projection_width: 1.0,
            projection_height: 1.0,
            light_direction: Vec3::new(0.0, -1.0, 0.0),
            light_color: Vec4::ONE,
        }
    }

    /// Sets the camera for subsequent frames. Derives the frustum scales
    /// from the projection's diagonal.
    pub fn set_camera(&mut self, view: Mat4, projection: Mat4, near: f32, far: f32) {
        self.view_matrix = view;
        self.projection_matrix = projection;
        self.near_plane = near;
        self.far_plane = far;
        let m00 = projection.x_axis.x;
        let m11 = projection.y_axis.y;
        self.projection_width = if m00.abs() > f32::EPSILON { 1.0 / m00 } else { 1.0 };
        self.projection_height = if m11.abs() > f32::EPSILON { 1.0 / m11 } else { 1.0 };
    }

    /// Sets the directional light for subsequent frames.
    pub fn set_directional_light(&mut self, direction: Vec3, color: Vec4) {
        self.light_direction = direction.normalize_or_zero();
        self.light_color = color;
    }
}

/// One renderable item for the frame.
///
/// More than one transform means a skinned transform palette; stages pick
/// the skinned shader variant accordingly.
#[derive(Debug, Clone)]
pub struct DrawItem {
    /// Model transform(s). One matrix for rigid geometry, a palette for
    /// skinned geometry.
    pub transforms: SmallVec<[Mat4; 2]>,
    /// Geometry vertex buffer.
    pub vertex_buffer: VertexBufferHandle,
    /// Geometry index buffer.
    pub index_buffer: IndexBufferHandle,
    /// Whether the item renders into the shadow cascades.
    pub casts_shadow: bool,
}

impl DrawItem {
    /// Returns `true` when the item carries a skinning palette.
    #[must_use]
    pub fn is_skinned(&self) -> bool {
        self.transforms.len() > 1
    }
}

/// Everything a stage sees while rendering one frame.
pub struct FrameContext<'a> {
    /// The graphics backend.
    pub device: &'a mut dyn GraphicsDevice,
    /// Camera and lighting inputs.
    pub state: &'a FrameState,
    /// Shared canvas-sized planes.
    pub shared: &'a SharedTargets,
    /// The frame's draw list.
    pub items: &'a [DrawItem],
    /// The framebuffer opaque and transparent output composite into: the
    /// post chain's source at the start of the frame.
    pub post_source: FrameBufferHandle,
}

/// Stage lifecycle. Called in three full sweeps per frame.
pub trait RenderFeature {
    /// Stage name, used in logs.
    fn name(&self) -> &'static str;

    /// Per-frame setup: view state, uniforms, target validation.
    fn pre_render(&mut self, ctx: &mut FrameContext<'_>, views: &mut ViewRegistry);

    /// Geometry submission.
    fn render(&mut self, ctx: &mut FrameContext<'_>, views: &mut ViewRegistry);

    /// Full-screen composition.
    fn post_render(&mut self, ctx: &mut FrameContext<'_>, views: &mut ViewRegistry);
}

/// Orthographic projection mapping the unit square to a full-screen view
/// with a top-left origin.
#[must_use]
pub fn screen_projection() -> Mat4 {
    Mat4::from_cols(
        Vec4::new(2.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -2.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 0.01, 0.0),
        Vec4::new(-1.0, 1.0, 0.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_camera_derives_frustum_scales() {
        let mut state = FrameState::new(1920, 1080);
        let proj = Mat4::perspective_lh(std::f32::consts::FRAC_PI_2, 16.0 / 9.0, 0.1, 1000.0);
        state.set_camera(Mat4::IDENTITY, proj, 0.1, 1000.0);
        let expected_w = 1.0 / proj.x_axis.x;
        let expected_h = 1.0 / proj.y_axis.y;
        assert!((state.projection_width - expected_w).abs() < 1e-6);
        assert!((state.projection_height - expected_h).abs() < 1e-6);
    }

    #[test]
    fn skinned_items_have_palettes() {
        let rigid = DrawItem {
            transforms: SmallVec::from_slice(&[Mat4::IDENTITY]),
            vertex_buffer: VertexBufferHandle(0),
            index_buffer: IndexBufferHandle(0),
            casts_shadow: true,
        };
        let skinned = DrawItem {
            transforms: SmallVec::from_slice(&[Mat4::IDENTITY; 3]),
            ..rigid.clone()
        };
        assert!(!rigid.is_skinned());
        assert!(skinned.is_skinned());
    }

    #[test]
    fn screen_projection_maps_unit_square() {
        let proj = screen_projection();
        let top_left = proj.project_point3(glam::Vec3::new(0.0, 0.0, 0.0));
        let bottom_right = proj.project_point3(glam::Vec3::new(1.0, 1.0, 0.0));
        assert!((top_left.x + 1.0).abs() < 1e-6);
        assert!((top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y + 1.0).abs() < 1e-6);
    }
}
