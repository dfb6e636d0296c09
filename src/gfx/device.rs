//! Graphics Device and Shader Library Traits
//!
//! [`GraphicsDevice`] is the per-call contract the rendering core consumes
//! from the GPU backend. It follows a submission model: per-view state
//! (`set_view_*`) persists across the frame, while draw state
//! (`set_transform`, buffers, textures, `set_state`) is transient and
//! consumed by the next [`submit`](GraphicsDevice::submit).
//!
//! The backend guarantees that within a frame, draws submitted to different
//! views execute in ascending view-priority order; the core relies on this
//! instead of explicit synchronization.

use glam::{Mat4, Vec4};

use super::handles::{
    Backend, ClearFlags, FrameBufferHandle, IndexBufferHandle, ShaderHandle, StateFlags,
    TextureFlags, TextureFormat, TextureHandle, UniformHandle, UniformKind, VertexBufferHandle,
};
use super::view::ViewId;

/// The narrow contract between the rendering core and the GPU backend.
///
/// # Failure Model
///
/// `create_*` may return an invalid handle on allocation failure; no call
/// panics. `destroy_*` are idempotent no-ops on invalid handles. Calls that
/// reference an invalid handle (e.g. binding an invalid texture) are
/// accepted and produce undefined sampling results, not errors — degraded
/// visuals are the host's problem to surface.
pub trait GraphicsDevice {
    /// The backend's coordinate conventions.
    fn backend(&self) -> Backend;

    // ── Resources ───────────────────────────────────────────────────────

    /// Creates a 2D texture. Returns [`TextureHandle::INVALID`] on failure.
    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        mip_count: u8,
        format: TextureFormat,
        flags: TextureFlags,
    ) -> TextureHandle;

    /// Creates a framebuffer from the given attachments.
    ///
    /// Returns an invalid handle if any attachment is invalid. When
    /// `owns_textures` is `true` the backend destroys the attachments
    /// together with the framebuffer.
    fn create_frame_buffer(
        &mut self,
        attachments: &[TextureHandle],
        owns_textures: bool,
    ) -> FrameBufferHandle;

    /// Destroys a texture. No-op on invalid handles.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroys a framebuffer. No-op on invalid handles.
    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle);

    // ── Uniforms ────────────────────────────────────────────────────────

    /// Creates (or looks up) a named shader uniform.
    fn create_uniform(&mut self, name: &str, kind: UniformKind) -> UniformHandle;

    /// Destroys a uniform. No-op on invalid handles.
    fn destroy_uniform(&mut self, uniform: UniformHandle);

    /// Sets a `vec4` uniform value.
    fn set_uniform_vec4(&mut self, uniform: UniformHandle, value: Vec4);

    /// Sets a 4x4 matrix uniform value.
    fn set_uniform_mat4(&mut self, uniform: UniformHandle, value: &Mat4);

    // ── Per-view state ──────────────────────────────────────────────────

    /// Sets a clear-color palette entry, referenced by
    /// [`set_view_clear_palette`](Self::set_view_clear_palette).
    fn set_clear_color(&mut self, palette_index: u8, color: [f32; 4]);

    /// Sets the viewport rectangle of a view.
    fn set_view_rect(&mut self, view: ViewId, x: u16, y: u16, width: u16, height: u16);

    /// Sets the clear state of a view with a packed RGBA clear value.
    fn set_view_clear(&mut self, view: ViewId, flags: ClearFlags, rgba: u32, depth: f32, stencil: u8);

    /// Sets the clear state of a view with per-attachment palette indices.
    fn set_view_clear_palette(
        &mut self,
        view: ViewId,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
        palette: &[u8],
    );

    /// Routes a view's output into a framebuffer. An invalid handle routes
    /// to the backbuffer.
    fn set_view_frame_buffer(&mut self, view: ViewId, frame_buffer: FrameBufferHandle);

    /// Sets the view and projection matrices of a view. `None` for the view
    /// matrix means identity (full-screen passes).
    fn set_view_transform(&mut self, view: ViewId, view_matrix: Option<&Mat4>, projection: &Mat4);

    /// Marks a view as in-use so its clear executes even without draws.
    fn touch(&mut self, view: ViewId);

    // ── Draw state (consumed by submit) ─────────────────────────────────

    /// Stages the model transform table for the next submit. More than one
    /// matrix means a skinned transform palette.
    fn set_transform(&mut self, transforms: &[Mat4]);

    /// Stages a vertex buffer for the next submit.
    fn set_vertex_buffer(&mut self, buffer: VertexBufferHandle);

    /// Stages an index buffer for the next submit.
    fn set_index_buffer(&mut self, buffer: IndexBufferHandle);

    /// Binds a texture to a sampler slot for the next submit.
    fn set_texture(&mut self, slot: u8, texture: TextureHandle);

    /// Stages the render state flags for the next submit.
    fn set_state(&mut self, state: StateFlags);

    /// Stages a transient full-screen quad covering `width` × `height`
    /// for the next submit.
    fn full_screen_quad(&mut self, width: f32, height: f32);

    /// Enqueues the staged draw state into the named view and resets the
    /// draw state.
    fn submit(&mut self, view: ViewId, program: ShaderHandle);
}

/// Lookup/compilation of shader programs.
///
/// The asset pipeline behind this trait (source loading, variant
/// compilation, caching) is an external collaborator; the rendering core
/// only ever asks for a `(vertex, fragment)` pair by path.
pub trait ShaderLibrary {
    /// Returns the program for the given vertex/fragment shader pair.
    /// Repeated calls with the same pair return the same handle.
    fn shader(&mut self, vs_path: &str, fs_path: &str) -> ShaderHandle;
}
