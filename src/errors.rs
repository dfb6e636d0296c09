//! Error Types
//!
//! This module defines the error types used throughout the rendering core.
//!
//! # Failure Model
//!
//! GPU resource allocation is the only fallible operation inside the core:
//! the device contract reports failure by returning an invalid handle, and
//! the target-set layer converts that into [`RenderError::ResourceAllocation`].
//! A failed (re)build leaves the affected target set invalid; the passes
//! that would write through it are skipped for subsequent frames instead of
//! crashing. Deciding whether a degraded renderer is fatal belongs to the
//! host application, never to this crate.

use thiserror::Error;

/// The main error type for the rendering core.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A GPU texture or framebuffer allocation returned an invalid handle.
    ///
    /// The owning target set has been torn down and left invalid; passes
    /// depending on it will skip their output until a later rebuild succeeds.
    #[error("GPU resource allocation failed: {label} ({width}x{height})")]
    ResourceAllocation {
        /// Label of the target set that failed to build.
        label: &'static str,
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },

    /// The renderer was created or resized with a zero-sized canvas.
    #[error("Invalid canvas dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
