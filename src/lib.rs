#![forbid(unsafe_code)]

pub mod acquire;
pub mod captions;
pub mod compose;
pub mod encode;
pub mod error;
pub mod job;
pub mod media;
pub mod scene;

pub use compose::{CompositionReport, CompositionSettings, Frame, compose_video};
pub use error::{ReelError, ReelResult};
pub use scene::Scene;
