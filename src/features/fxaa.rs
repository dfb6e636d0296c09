//! FXAA Anti-Aliasing
//!
//! Runs as the last post feature and takes over the chain's finish pass:
//! instead of the default copy-to-backbuffer, the FXAA shader resolves the
//! final source directly into the presented view. Construct it with the
//! view returned by [`PostChain::override_finish`](crate::stages::PostChain::override_finish).

use crate::frame::screen_projection;
use crate::gfx::{ShaderHandle, ShaderLibrary, StateFlags, ViewId};
use crate::stages::{PostContext, PostFeature};

/// FXAA post feature.
pub struct Fxaa {
    view: ViewId,
    shader: ShaderHandle,
}

impl Fxaa {
    /// Priority placing FXAA after every other feature, in the finish slot.
    pub const PRIORITY: u16 = 5000;

    /// Creates the feature rendering into `view` (the claimed finish view).
    pub fn new(view: ViewId, shaders: &mut dyn ShaderLibrary) -> Self {
        Self {
            view,
            shader: shaders.shader("fxaa/final_vs", "fxaa/final_fxaa_fs"),
        }
    }
}

impl PostFeature for Fxaa {
    fn name(&self) -> &'static str {
        "fxaa"
    }

    fn priority(&self) -> u16 {
        Self::PRIORITY
    }

    fn render(&mut self, ctx: &mut PostContext<'_, '_>) {
        let width = ctx.frame.state.canvas_width;
        let height = ctx.frame.state.canvas_height;
        let source = ctx.source_texture;
        let proj = screen_projection();

        let device = &mut *ctx.frame.device;
        device.set_view_transform(self.view, None, &proj);
        device.set_view_rect(self.view, 0, 0, width as u16, height as u16);
        device.set_texture(0, source);
        device.set_state(StateFlags::composite());
        device.full_screen_quad(width as f32, height as f32);
        device.submit(self.view, self.shader);
    }
}
