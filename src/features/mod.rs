//! Built-in Post Features

pub mod fxaa;

pub use fxaa::Fxaa;
