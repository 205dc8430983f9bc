//! Caption timing, SRT serialization, and burn-in rendering.

pub mod draw;
pub mod srt;
pub mod timing;

pub use draw::{CaptionPainter, CaptionStyle};
pub use srt::{parse_srt, render_srt, write_srt};
pub use timing::{CaptionChunk, allocate_captions, chunk_at};
