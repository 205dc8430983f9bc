//! Frame-level compositing: the canvas model, blending, background blur,
//! per-scene normalization, and the output timeline.

pub mod blend;
pub mod blur;
pub mod frame;
pub mod normalize;
pub mod timeline;

pub use frame::Frame;
pub use normalize::{BlurSettings, MotionEffect, NormalizedClip, Normalizer, RenderTier};
pub use timeline::{CompositionReport, CompositionSettings, Timeline, compose_video};
