//! Graphics-Device Contract
//!
//! The rendering core never talks to a GPU API directly. Everything it needs
//! from the backend is expressed through the [`GraphicsDevice`] trait: handle
//! creation/destruction, per-view state, and draw submission. A backend
//! implementation (bgfx-style, wgpu, Vulkan, ...) lives with the host
//! application; this crate ships [`RecordingDevice`], a headless
//! implementation used by the test suite and offscreen tooling.
//!
//! # Handle Model
//!
//! Handles are plain `u16` newtypes with an invalid sentinel. Creation may
//! fail by returning an invalid handle — no panics, no exceptions. All
//! `destroy_*` operations are idempotent no-ops on invalid handles.
//!
//! # View Model
//!
//! A *view* is a named, priority-ordered submission slot. Within a frame the
//! backend executes views in ascending priority order regardless of the CPU
//! submission order; intra-frame pass dependencies are expressed purely by
//! the priorities chosen at registration.

pub mod device;
pub mod handles;
pub mod recording;
pub mod view;

pub use device::{GraphicsDevice, ShaderLibrary};
pub use handles::{
    Backend, ClearFlags, FrameBufferHandle, IndexBufferHandle, ShaderHandle, StateFlags,
    TextureFlags, TextureFormat, TextureHandle, UniformHandle, UniformKind, VertexBufferHandle,
};
pub use recording::{NullShaderLibrary, RecordingDevice, Submission};
pub use view::{ViewId, ViewRegistry};
