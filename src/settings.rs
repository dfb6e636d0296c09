//! Renderer Settings
//!
//! Configuration consumed once during [`Renderer::new`](crate::Renderer::new).
//! All values have sensible defaults; hosts typically deserialize these from
//! a config file and tweak a handful of fields.
//!
//! ```rust,ignore
//! use ember_render::{RendererSettings, ShadowSettings};
//!
//! let settings = RendererSettings {
//!     shadow: ShadowSettings {
//!         cascade_resolution: 2048,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

/// Configuration for the cascaded shadow map stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    /// Edge length of each cascade's shadow map in pixels.
    pub cascade_resolution: u32,

    /// Blend factor between uniform (`0.0`) and logarithmic (`1.0`)
    /// cascade split distribution.
    pub split_lambda: f32,

    /// Snap cascade crop scale/offset to the texel grid so that sub-texel
    /// camera movement cannot make shadow edges shimmer.
    pub stabilize: bool,

    /// Parameters for the variance-shadow-map blur shaders
    /// (x/y: kernel radius in texels, z/w: falloff).
    pub blur_params: [f32; 4],
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            cascade_resolution: 1024,
            split_lambda: 0.8,
            stabilize: true,
            blur_params: [2.0, 2.0, 0.2, 0.2],
        }
    }
}

/// Global configuration for the rendering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererSettings {
    /// Cascaded shadow map configuration.
    pub shadow: ShadowSettings,

    /// Clear color for the G-Buffer and light accumulation views,
    /// written into clear-color palette slot 0.
    pub clear_color: [f32; 4],
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            shadow: ShadowSettings::default(),
            clear_color: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_defaults_match_pipeline_constants() {
        let s = ShadowSettings::default();
        assert_eq!(s.cascade_resolution, 1024);
        assert!((s.split_lambda - 0.8).abs() < f32::EPSILON);
        assert!(s.stabilize);
    }
}
