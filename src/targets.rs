//! Render Target Sets
//!
//! A [`TargetSet`] bundles a framebuffer with the textures behind it and
//! knows how to tear the bundle down and rebuild it at a new size. Sets
//! distinguish *owned* attachments (created and destroyed by the set) from
//! *borrowed* ones (created elsewhere, e.g. the shared G-Buffer planes, and
//! never destroyed here).
//!
//! Rebuild is destroy-then-create and fails recoverably: on any allocation
//! failure the partial work is torn down, the set is left invalid, and the
//! caller gets a [`RenderError::ResourceAllocation`]. Stages check
//! [`is_valid`](TargetSet::is_valid) before using a set, so a failed rebuild
//! degrades output instead of crashing the frame loop.

use smallvec::SmallVec;

use crate::errors::{RenderError, Result};
use crate::gfx::{FrameBufferHandle, GraphicsDevice, TextureFlags, TextureFormat, TextureHandle};

/// One attachment in a [`TargetSet`] rebuild description.
#[derive(Debug, Clone, Copy)]
pub enum AttachmentDesc {
    /// A texture the set creates at the rebuild size and destroys on
    /// teardown.
    Owned {
        /// Pixel format.
        format: TextureFormat,
        /// Creation flags.
        flags: TextureFlags,
    },
    /// A texture owned elsewhere; attached but never destroyed by the set.
    Borrowed(TextureHandle),
}

/// A framebuffer plus its attachments, rebuildable at a new size.
pub struct TargetSet {
    label: &'static str,
    framebuffer: FrameBufferHandle,
    // (handle, owned)
    textures: SmallVec<[(TextureHandle, bool); 4]>,
}

impl TargetSet {
    /// Creates an empty, invalid set. [`rebuild`](Self::rebuild) gives it
    /// substance.
    #[must_use]
    pub fn invalid(label: &'static str) -> Self {
        Self {
            label,
            framebuffer: FrameBufferHandle::INVALID,
            textures: SmallVec::new(),
        }
    }

    /// Label used in logs and errors.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Returns `true` when the framebuffer is usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.framebuffer.is_valid()
    }

    /// The framebuffer handle (invalid if the last rebuild failed).
    #[must_use]
    pub fn framebuffer(&self) -> FrameBufferHandle {
        self.framebuffer
    }

    /// The `index`-th attachment texture.
    #[must_use]
    pub fn texture(&self, index: usize) -> TextureHandle {
        self.textures
            .get(index)
            .map_or(TextureHandle::INVALID, |(t, _)| *t)
    }

    /// Destroys current resources and recreates them at `width` × `height`.
    ///
    /// Owned attachments are created in `attachments` order; borrowed ones
    /// are attached as-is. On any failed creation the partial resources are
    /// destroyed and the set is left invalid.
    ///
    /// # Errors
    ///
    /// [`RenderError::ResourceAllocation`] if an owned texture or the
    /// framebuffer could not be created.
    pub fn rebuild(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        attachments: &[AttachmentDesc],
    ) -> Result<()> {
        self.destroy(device);

        let mut handles: SmallVec<[TextureHandle; 4]> = SmallVec::new();
        for desc in attachments {
            match *desc {
                AttachmentDesc::Owned { format, flags } => {
                    let texture = device.create_texture_2d(width, height, 1, format, flags);
                    if !texture.is_valid() {
                        log::error!(
                            "target set '{}': texture allocation failed ({width}x{height}, {format:?})",
                            self.label
                        );
                        self.textures.push((texture, true));
                        self.destroy(device);
                        return Err(self.allocation_error(width, height));
                    }
                    handles.push(texture);
                    self.textures.push((texture, true));
                }
                AttachmentDesc::Borrowed(texture) => {
                    handles.push(texture);
                    self.textures.push((texture, false));
                }
            }
        }

        self.framebuffer = device.create_frame_buffer(&handles, false);
        if !self.framebuffer.is_valid() {
            log::error!(
                "target set '{}': framebuffer creation failed ({width}x{height})",
                self.label
            );
            self.destroy(device);
            return Err(self.allocation_error(width, height));
        }

        log::debug!("target set '{}' rebuilt at {width}x{height}", self.label);
        Ok(())
    }

    /// Destroys the framebuffer and the owned attachments. Safe to call on
    /// an already-invalid set.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        // Framebuffer first; it references the textures.
        device.destroy_frame_buffer(self.framebuffer);
        self.framebuffer = FrameBufferHandle::INVALID;
        for (texture, owned) in self.textures.drain(..) {
            if owned {
                device.destroy_texture(texture);
            }
        }
    }

    fn allocation_error(&self, width: u32, height: u32) -> RenderError {
        RenderError::ResourceAllocation {
            label: self.label,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{Backend, RecordingDevice};

    const COLOR: AttachmentDesc = AttachmentDesc::Owned {
        format: TextureFormat::Bgra8,
        flags: TextureFlags::render_target_nearest_clamp(),
    };
    const DEPTH: AttachmentDesc = AttachmentDesc::Owned {
        format: TextureFormat::D16,
        flags: TextureFlags::RENDER_TARGET,
    };

    #[test]
    fn rebuild_replaces_previous_resources() {
        let mut device = RecordingDevice::new(Backend::Noop);
        let mut set = TargetSet::invalid("scratch");

        set.rebuild(&mut device, 640, 480, &[COLOR, DEPTH]).unwrap();
        assert!(set.is_valid());
        let first = set.texture(0);

        set.rebuild(&mut device, 1280, 960, &[COLOR, DEPTH]).unwrap();
        assert!(set.is_valid());
        assert_ne!(set.texture(0), first);
        assert!(!device.is_texture_alive(first));
        assert_eq!(device.live_texture_count(), 2);
        assert_eq!(device.live_frame_buffer_count(), 1);
    }

    #[test]
    fn borrowed_attachments_survive_destroy() {
        let mut device = RecordingDevice::new(Backend::Noop);
        let shared = device.create_texture_2d(
            640,
            480,
            1,
            TextureFormat::D32F,
            TextureFlags::render_target_nearest_clamp(),
        );

        let mut set = TargetSet::invalid("gbuffer");
        set.rebuild(
            &mut device,
            640,
            480,
            &[COLOR, AttachmentDesc::Borrowed(shared)],
        )
        .unwrap();
        let owned = set.texture(0);

        set.destroy(&mut device);
        assert!(device.is_texture_alive(shared));
        assert!(!device.is_texture_alive(owned));
    }

    #[test]
    fn failed_allocation_leaves_set_invalid_and_leak_free() {
        let mut device = RecordingDevice::new(Backend::Noop);
        let mut set = TargetSet::invalid("scratch");

        device.fail_next_texture_creates(1);
        let err = set.rebuild(&mut device, 640, 480, &[COLOR, DEPTH]);
        assert!(matches!(
            err,
            Err(RenderError::ResourceAllocation { label: "scratch", .. })
        ));
        assert!(!set.is_valid());
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_frame_buffer_count(), 0);
    }

    #[test]
    fn failed_rebuild_still_releases_previous_resources() {
        let mut device = RecordingDevice::new(Backend::Noop);
        let mut set = TargetSet::invalid("scratch");
        set.rebuild(&mut device, 640, 480, &[COLOR, DEPTH]).unwrap();

        device.fail_next_texture_creates(1);
        assert!(set.rebuild(&mut device, 1280, 960, &[COLOR, DEPTH]).is_err());
        assert!(!set.is_valid());
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_frame_buffer_count(), 0);
    }
}
