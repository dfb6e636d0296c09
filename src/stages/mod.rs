//! Pipeline Stages
//!
//! The fixed stages of the frame, each a [`RenderFeature`](crate::frame::RenderFeature):
//! deferred geometry and lighting, the directional-light shadow cascades,
//! order-independent transparency, and the post-processing chain. The
//! renderer runs them in a fixed order; the GPU-side order comes from the
//! view priorities each stage registers.

pub mod deferred;
pub mod post;
pub mod shadow;
pub mod transparency;

pub use deferred::DeferredStage;
pub use post::{PostChain, PostContext, PostFeature};
pub use shadow::DirectionalLightStage;
pub use transparency::TransparencyStage;
