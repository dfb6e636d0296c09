//! Recording Device
//!
//! A headless [`GraphicsDevice`] that executes nothing and records
//! everything: resource lifecycles, per-view state, and an ordered log of
//! submissions with the draw state each one consumed. Used by the test
//! suite and by offscreen tooling that wants to inspect a frame without a
//! GPU.
//!
//! Allocation failure is injectable via
//! [`fail_next_texture_creates`](RecordingDevice::fail_next_texture_creates),
//! which makes the degraded-rendering path (invalid target sets, skipped
//! passes) testable.

use glam::{Mat4, Vec4};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::device::{GraphicsDevice, ShaderLibrary};
use super::handles::{
    Backend, ClearFlags, FrameBufferHandle, IndexBufferHandle, ShaderHandle, StateFlags,
    TextureFlags, TextureFormat, TextureHandle, UniformHandle, UniformKind, VertexBufferHandle,
};
use super::view::ViewId;

/// Record of a created texture.
#[derive(Debug, Clone)]
pub struct TextureRecord {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: TextureFormat,
    /// Creation flags.
    pub flags: TextureFlags,
    /// `false` once destroyed.
    pub alive: bool,
}

/// Record of a created framebuffer.
#[derive(Debug, Clone)]
pub struct FrameBufferRecord {
    /// Attachment textures in order.
    pub attachments: SmallVec<[TextureHandle; 4]>,
    /// Whether the device owns (and destroys) the attachments.
    pub owns_textures: bool,
    /// `false` once destroyed.
    pub alive: bool,
}

/// Per-view state as last configured.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// Viewport rectangle (x, y, width, height).
    pub rect: Option<(u16, u16, u16, u16)>,
    /// Routed framebuffer, if any.
    pub frame_buffer: Option<FrameBufferHandle>,
    /// Clear flags from the last `set_view_clear*` call.
    pub clear_flags: Option<ClearFlags>,
    /// View/projection matrices from the last `set_view_transform` call.
    pub transform: Option<(Option<Mat4>, Mat4)>,
    /// Whether the view was touched this run.
    pub touched: bool,
}

/// One recorded submit with the draw state it consumed.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Target view.
    pub view: ViewId,
    /// Submitted shader program.
    pub program: ShaderHandle,
    /// Textures bound at submit time, as (slot, handle) pairs.
    pub textures: SmallVec<[(u8, TextureHandle); 8]>,
    /// Number of staged model transforms (0 for full-screen passes).
    pub transform_count: u32,
    /// Staged vertex buffer, if any.
    pub vertex_buffer: Option<VertexBufferHandle>,
    /// Staged index buffer, if any.
    pub index_buffer: Option<IndexBufferHandle>,
    /// Render state flags.
    pub state: StateFlags,
    /// Whether a transient full-screen quad was staged.
    pub full_screen_quad: bool,
}

#[derive(Default)]
struct DrawState {
    textures: SmallVec<[(u8, TextureHandle); 8]>,
    transform_count: u32,
    vertex_buffer: Option<VertexBufferHandle>,
    index_buffer: Option<IndexBufferHandle>,
    state: StateFlags,
    full_screen_quad: bool,
}

/// Headless recording implementation of [`GraphicsDevice`].
pub struct RecordingDevice {
    backend: Backend,
    textures: Vec<TextureRecord>,
    frame_buffers: Vec<FrameBufferRecord>,
    uniforms: Vec<(String, UniformKind)>,
    uniform_mat4: FxHashMap<UniformHandle, Mat4>,
    uniform_vec4: FxHashMap<UniformHandle, Vec4>,
    clear_palette: [[f32; 4]; 8],
    views: FxHashMap<ViewId, ViewState>,
    submissions: Vec<Submission>,
    staged: DrawState,
    fail_texture_creates: u32,
    textures_created: u32,
    textures_destroyed: u32,
    frame_buffers_created: u32,
    frame_buffers_destroyed: u32,
}

impl RecordingDevice {
    /// Creates a recording device reporting the given backend.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            textures: Vec::new(),
            frame_buffers: Vec::new(),
            uniforms: Vec::new(),
            uniform_mat4: FxHashMap::default(),
            uniform_vec4: FxHashMap::default(),
            clear_palette: [[0.0; 4]; 8],
            views: FxHashMap::default(),
            submissions: Vec::new(),
            staged: DrawState::default(),
            fail_texture_creates: 0,
            textures_created: 0,
            textures_destroyed: 0,
            frame_buffers_created: 0,
            frame_buffers_destroyed: 0,
        }
    }

    /// Makes the next `count` texture allocations return an invalid handle.
    pub fn fail_next_texture_creates(&mut self, count: u32) {
        self.fail_texture_creates = count;
    }

    // ── Inspection ──────────────────────────────────────────────────────

    /// All submissions in CPU submission order.
    #[must_use]
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Submissions targeting one view.
    pub fn submissions_to(&self, view: ViewId) -> impl Iterator<Item = &Submission> {
        self.submissions.iter().filter(move |s| s.view == view)
    }

    /// Clears the submission log (typically between frames under test).
    pub fn clear_submissions(&mut self) {
        self.submissions.clear();
    }

    /// Number of textures ever created (failed creations excluded).
    #[must_use]
    pub fn textures_created(&self) -> u32 {
        self.textures_created
    }

    /// Number of textures destroyed.
    #[must_use]
    pub fn textures_destroyed(&self) -> u32 {
        self.textures_destroyed
    }

    /// Number of framebuffers ever created.
    #[must_use]
    pub fn frame_buffers_created(&self) -> u32 {
        self.frame_buffers_created
    }

    /// Number of framebuffers destroyed.
    #[must_use]
    pub fn frame_buffers_destroyed(&self) -> u32 {
        self.frame_buffers_destroyed
    }

    /// Count of currently alive textures.
    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.iter().filter(|t| t.alive).count()
    }

    /// Count of currently alive framebuffers.
    #[must_use]
    pub fn live_frame_buffer_count(&self) -> usize {
        self.frame_buffers.iter().filter(|f| f.alive).count()
    }

    /// Returns `true` if the texture exists and has not been destroyed.
    #[must_use]
    pub fn is_texture_alive(&self, texture: TextureHandle) -> bool {
        texture.is_valid()
            && self
                .textures
                .get(texture.0 as usize)
                .is_some_and(|t| t.alive)
    }

    /// Record of a created texture.
    #[must_use]
    pub fn texture_record(&self, texture: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(texture.0 as usize)
    }

    /// Record of a created framebuffer.
    #[must_use]
    pub fn frame_buffer_record(&self, fb: FrameBufferHandle) -> Option<&FrameBufferRecord> {
        self.frame_buffers.get(fb.0 as usize)
    }

    /// Per-view state as last configured.
    #[must_use]
    pub fn view_state(&self, view: ViewId) -> Option<&ViewState> {
        self.views.get(&view)
    }

    /// Current value of a clear-color palette slot.
    #[must_use]
    pub fn clear_color(&self, palette_index: u8) -> [f32; 4] {
        self.clear_palette
            .get(palette_index as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Last value written to a mat4 uniform.
    #[must_use]
    pub fn uniform_mat4_value(&self, uniform: UniformHandle) -> Option<&Mat4> {
        self.uniform_mat4.get(&uniform)
    }

    /// Last value written to a vec4 uniform.
    #[must_use]
    pub fn uniform_vec4_value(&self, uniform: UniformHandle) -> Option<Vec4> {
        self.uniform_vec4.get(&uniform).copied()
    }

    fn view_mut(&mut self, view: ViewId) -> &mut ViewState {
        self.views.entry(view).or_default()
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(Backend::Noop)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        _mip_count: u8,
        format: TextureFormat,
        flags: TextureFlags,
    ) -> TextureHandle {
        if self.fail_texture_creates > 0 {
            self.fail_texture_creates -= 1;
            return TextureHandle::INVALID;
        }
        let handle = TextureHandle(self.textures.len() as u16);
        self.textures.push(TextureRecord {
            width,
            height,
            format,
            flags,
            alive: true,
        });
        self.textures_created += 1;
        handle
    }

    fn create_frame_buffer(
        &mut self,
        attachments: &[TextureHandle],
        owns_textures: bool,
    ) -> FrameBufferHandle {
        // A framebuffer is unusable until every backing texture is valid.
        if attachments.iter().any(|t| !self.is_texture_alive(*t)) {
            return FrameBufferHandle::INVALID;
        }
        let handle = FrameBufferHandle(self.frame_buffers.len() as u16);
        self.frame_buffers.push(FrameBufferRecord {
            attachments: attachments.iter().copied().collect(),
            owns_textures,
            alive: true,
        });
        self.frame_buffers_created += 1;
        handle
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if !texture.is_valid() {
            return;
        }
        if let Some(record) = self.textures.get_mut(texture.0 as usize)
            && record.alive
        {
            record.alive = false;
            self.textures_destroyed += 1;
        }
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        if !frame_buffer.is_valid() {
            return;
        }
        let Some(record) = self.frame_buffers.get_mut(frame_buffer.0 as usize) else {
            return;
        };
        if !record.alive {
            return;
        }
        record.alive = false;
        self.frame_buffers_destroyed += 1;
        if record.owns_textures {
            let attachments: SmallVec<[TextureHandle; 4]> = record.attachments.clone();
            for t in attachments {
                self.destroy_texture(t);
            }
        }
    }

    fn create_uniform(&mut self, name: &str, kind: UniformKind) -> UniformHandle {
        if let Some(index) = self.uniforms.iter().position(|(n, _)| n == name) {
            return UniformHandle(index as u16);
        }
        let handle = UniformHandle(self.uniforms.len() as u16);
        self.uniforms.push((name.to_owned(), kind));
        handle
    }

    fn destroy_uniform(&mut self, _uniform: UniformHandle) {}

    fn set_uniform_vec4(&mut self, uniform: UniformHandle, value: Vec4) {
        if uniform.is_valid() {
            self.uniform_vec4.insert(uniform, value);
        }
    }

    fn set_uniform_mat4(&mut self, uniform: UniformHandle, value: &Mat4) {
        if uniform.is_valid() {
            self.uniform_mat4.insert(uniform, *value);
        }
    }

    fn set_clear_color(&mut self, palette_index: u8, color: [f32; 4]) {
        if let Some(slot) = self.clear_palette.get_mut(palette_index as usize) {
            *slot = color;
        }
    }

    fn set_view_rect(&mut self, view: ViewId, x: u16, y: u16, width: u16, height: u16) {
        self.view_mut(view).rect = Some((x, y, width, height));
    }

    fn set_view_clear(
        &mut self,
        view: ViewId,
        flags: ClearFlags,
        _rgba: u32,
        _depth: f32,
        _stencil: u8,
    ) {
        self.view_mut(view).clear_flags = Some(flags);
    }

    fn set_view_clear_palette(
        &mut self,
        view: ViewId,
        flags: ClearFlags,
        _depth: f32,
        _stencil: u8,
        _palette: &[u8],
    ) {
        self.view_mut(view).clear_flags = Some(flags);
    }

    fn set_view_frame_buffer(&mut self, view: ViewId, frame_buffer: FrameBufferHandle) {
        self.view_mut(view).frame_buffer = Some(frame_buffer);
    }

    fn set_view_transform(&mut self, view: ViewId, view_matrix: Option<&Mat4>, projection: &Mat4) {
        self.view_mut(view).transform = Some((view_matrix.copied(), *projection));
    }

    fn touch(&mut self, view: ViewId) {
        self.view_mut(view).touched = true;
    }

    fn set_transform(&mut self, transforms: &[Mat4]) {
        self.staged.transform_count = transforms.len() as u32;
    }

    fn set_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        self.staged.vertex_buffer = Some(buffer);
    }

    fn set_index_buffer(&mut self, buffer: IndexBufferHandle) {
        self.staged.index_buffer = Some(buffer);
    }

    fn set_texture(&mut self, slot: u8, texture: TextureHandle) {
        self.staged.textures.push((slot, texture));
    }

    fn set_state(&mut self, state: StateFlags) {
        self.staged.state = state;
    }

    fn full_screen_quad(&mut self, _width: f32, _height: f32) {
        self.staged.full_screen_quad = true;
    }

    fn submit(&mut self, view: ViewId, program: ShaderHandle) {
        let staged = std::mem::take(&mut self.staged);
        self.submissions.push(Submission {
            view,
            program,
            textures: staged.textures,
            transform_count: staged.transform_count,
            vertex_buffer: staged.vertex_buffer,
            index_buffer: staged.index_buffer,
            state: staged.state,
            full_screen_quad: staged.full_screen_quad,
        });
    }
}

/// A [`ShaderLibrary`] that hands out stable placeholder handles.
///
/// Each distinct `(vs, fs)` pair maps to a distinct handle, so tests can
/// tell shader variants apart without any asset pipeline.
#[derive(Default)]
pub struct NullShaderLibrary {
    by_pair: FxHashMap<(String, String), ShaderHandle>,
}

impl NullShaderLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShaderLibrary for NullShaderLibrary {
    fn shader(&mut self, vs_path: &str, fs_path: &str) -> ShaderHandle {
        let next = ShaderHandle(self.by_pair.len() as u16);
        *self
            .by_pair
            .entry((vs_path.to_owned(), fs_path.to_owned()))
            .or_insert(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroy_is_idempotent_and_skips_invalid() {
        let mut device = RecordingDevice::default();
        let t = device.create_texture_2d(8, 8, 1, TextureFormat::Rgba8, TextureFlags::RENDER_TARGET);
        device.destroy_texture(t);
        device.destroy_texture(t);
        device.destroy_texture(TextureHandle::INVALID);
        assert_eq!(device.textures_destroyed(), 1);
    }

    #[test]
    fn frame_buffer_with_invalid_attachment_is_invalid() {
        let mut device = RecordingDevice::default();
        let t = device.create_texture_2d(8, 8, 1, TextureFormat::Rgba8, TextureFlags::RENDER_TARGET);
        let fb = device.create_frame_buffer(&[t, TextureHandle::INVALID], false);
        assert!(!fb.is_valid());
    }

    #[test]
    fn submit_consumes_staged_draw_state() {
        let mut device = RecordingDevice::default();
        let t = device.create_texture_2d(8, 8, 1, TextureFormat::Rgba8, TextureFlags::RENDER_TARGET);
        device.set_texture(0, t);
        device.set_state(StateFlags::composite());
        device.full_screen_quad(8.0, 8.0);
        device.submit(ViewId(0), ShaderHandle(0));
        device.submit(ViewId(0), ShaderHandle(0));

        let subs = device.submissions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].textures.as_slice(), &[(0, t)]);
        assert!(subs[0].full_screen_quad);
        // The second submit saw a clean slate.
        assert!(subs[1].textures.is_empty());
        assert!(!subs[1].full_screen_quad);
    }

    #[test]
    fn injected_allocation_failure() {
        let mut device = RecordingDevice::default();
        device.fail_next_texture_creates(1);
        let bad = device.create_texture_2d(8, 8, 1, TextureFormat::Rgba8, TextureFlags::RENDER_TARGET);
        let good = device.create_texture_2d(8, 8, 1, TextureFormat::Rgba8, TextureFlags::RENDER_TARGET);
        assert!(!bad.is_valid());
        assert!(good.is_valid());
    }

    #[test]
    fn null_shader_library_is_stable_per_pair() {
        let mut lib = NullShaderLibrary::new();
        let a = lib.shader("post/begin_vs", "post/begin_fs");
        let b = lib.shader("post/finish_vs", "post/finish_fs");
        let a2 = lib.shader("post/begin_vs", "post/begin_fs");
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }
}
