//! Shared Canvas-Sized Targets
//!
//! The G-Buffer planes every stage reads or writes: scene color, world
//! normals, material parameters, and scene depth. [`SharedTargets`] owns
//! these textures directly (they are attached to stage framebuffers as
//! borrowed attachments) and rebuilds them on resize before any stage
//! rebuilds its own sets.

use crate::errors::{RenderError, Result};
use crate::gfx::{GraphicsDevice, TextureFlags, TextureFormat, TextureHandle};

/// The canvas-sized textures shared across stages.
pub struct SharedTargets {
    color: TextureHandle,
    normal: TextureHandle,
    mat_info: TextureHandle,
    depth: TextureHandle,
}

impl SharedTargets {
    /// Creates the shared targets at the given canvas size.
    ///
    /// # Errors
    ///
    /// [`RenderError::ResourceAllocation`] if any plane fails to allocate;
    /// partially created planes are destroyed first.
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        let mut targets = Self {
            color: TextureHandle::INVALID,
            normal: TextureHandle::INVALID,
            mat_info: TextureHandle::INVALID,
            depth: TextureHandle::INVALID,
        };
        targets.rebuild(device, width, height)?;
        Ok(targets)
    }

    /// Destroys and recreates all planes at `width` × `height`.
    ///
    /// # Errors
    ///
    /// [`RenderError::ResourceAllocation`] on any failed plane; the set is
    /// left fully destroyed in that case.
    pub fn rebuild(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<()> {
        self.destroy(device);

        let flags = TextureFlags::render_target_nearest_clamp();
        self.color = device.create_texture_2d(width, height, 1, TextureFormat::Bgra8, flags);
        self.normal = device.create_texture_2d(width, height, 1, TextureFormat::Rgba16F, flags);
        self.mat_info = device.create_texture_2d(width, height, 1, TextureFormat::Rgba8, flags);
        self.depth = device.create_texture_2d(width, height, 1, TextureFormat::D32F, flags);

        if !self.color.is_valid()
            || !self.normal.is_valid()
            || !self.mat_info.is_valid()
            || !self.depth.is_valid()
        {
            log::error!("shared target allocation failed at {width}x{height}");
            self.destroy(device);
            return Err(RenderError::ResourceAllocation {
                label: "shared",
                width,
                height,
            });
        }
        Ok(())
    }

    /// Destroys all planes. Idempotent.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for texture in [self.color, self.normal, self.mat_info, self.depth] {
            device.destroy_texture(texture);
        }
        self.color = TextureHandle::INVALID;
        self.normal = TextureHandle::INVALID;
        self.mat_info = TextureHandle::INVALID;
        self.depth = TextureHandle::INVALID;
    }

    /// Scene color plane (BGRA8).
    #[must_use]
    pub fn color(&self) -> TextureHandle {
        self.color
    }

    /// World-space normal plane (RGBA16F).
    #[must_use]
    pub fn normal(&self) -> TextureHandle {
        self.normal
    }

    /// Material parameter plane (RGBA8).
    #[must_use]
    pub fn mat_info(&self) -> TextureHandle {
        self.mat_info
    }

    /// Scene depth plane (D32F), sampled by lighting and transparency.
    #[must_use]
    pub fn depth(&self) -> TextureHandle {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{Backend, RecordingDevice};

    #[test]
    fn rebuild_swaps_all_planes() {
        let mut device = RecordingDevice::new(Backend::Noop);
        let mut shared = SharedTargets::new(&mut device, 640, 480).unwrap();
        let old_depth = shared.depth();

        shared.rebuild(&mut device, 1280, 960).unwrap();
        assert_ne!(shared.depth(), old_depth);
        assert!(!device.is_texture_alive(old_depth));
        assert_eq!(device.live_texture_count(), 4);
    }

    #[test]
    fn failed_rebuild_destroys_partial_planes() {
        let mut device = RecordingDevice::new(Backend::Noop);
        let mut shared = SharedTargets::new(&mut device, 640, 480).unwrap();

        device.fail_next_texture_creates(2);
        let result = shared.rebuild(&mut device, 1280, 960);
        assert!(result.is_err());
        assert_eq!(device.live_texture_count(), 0);
    }
}
