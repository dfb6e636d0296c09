//! # Ember Render
//!
//! The deferred-rendering and post-processing core of a real-time 3D engine:
//! a priority-ordered sequence of named GPU passes built over a narrow
//! graphics-device contract.
//!
//! # Pipeline Overview
//!
//! ```text
//! ShadowMap cascades (500..)      4× VSM cascades + separable blurs
//! DeferredGeometry   (1000)       G-Buffer fill (scene submits here)
//! ShadowBuffer       (1100)       screen-space shadow composite + blur
//! DeferredLight      (1500)       light accumulation + directional light
//! RenderLayer0       (2000)       G-Buffer × light combine → color buffer
//! TransparencyBuffer (3000)       weighted OIT accumulation
//! TransparencyFinal  (3001)       opaque + transparency → post source
//! Post_Begin         (4000)       copy into the ping-pong chain
//! ...features...                  priority-ordered post effects
//! Post_Finish        (5000)       final resolve to the backbuffer
//! ```
//!
//! Ordering between passes is enforced purely by view priority; the frame
//! driver ([`Renderer`]) runs each stage's `pre_render` / `render` /
//! `post_render` callbacks in a strict single-threaded sequence.
//!
//! The GPU backend itself is an external collaborator consumed through the
//! [`gfx::GraphicsDevice`] trait; [`gfx::RecordingDevice`] provides a
//! headless implementation for tests and offscreen tooling.

pub mod cascade;
pub mod common;
pub mod errors;
pub mod features;
pub mod frame;
pub mod gfx;
pub mod renderer;
pub mod settings;
pub mod stages;
pub mod targets;

pub use errors::{RenderError, Result};
pub use frame::{DrawItem, FrameContext, FrameState, RenderFeature};
pub use renderer::Renderer;
pub use settings::{RendererSettings, ShadowSettings};
pub use stages::post::{PostChain, PostContext, PostFeature};
pub use targets::{AttachmentDesc, TargetSet};
