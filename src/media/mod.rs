pub mod probe;
pub mod validate;

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use image::{AnimationDecoder as _, ImageDecoder as _};

use crate::error::{ReelError, ReelResult};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv"];
const GIF_EXTENSIONS: &[&str] = &["gif"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// What a media file is, as far as the composer cares: a still, a short
/// looping animation, or a proper video clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    AnimatedLoop,
    Video,
    /// Unrecognized extension. Treated as an image downstream rather than
    /// rejected; obscure formats should not block composition.
    Unknown,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else if GIF_EXTENSIONS.contains(&ext.as_str()) {
            Self::AnimatedLoop
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else {
            Self::Unknown
        }
    }
}

/// A validated visual source for one scene.
#[derive(Clone, Debug)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub native_width: u32,
    pub native_height: u32,
    /// Seconds; `0.0` for static images.
    pub native_duration: f64,
}

impl MediaAsset {
    /// Probe a file on disk into an asset record. Images are probed with the
    /// `image` crate; videos and GIFs go through ffprobe so duration comes
    /// from the container.
    pub fn probe(path: &Path) -> ReelResult<Self> {
        let kind = MediaKind::from_path(path);
        match kind {
            MediaKind::Image | MediaKind::Unknown => {
                let (width, height) = image::image_dimensions(path).map_err(|e| {
                    ReelError::media(format!("read image dimensions '{}': {e}", path.display()))
                })?;
                Ok(Self {
                    path: path.to_path_buf(),
                    kind,
                    native_width: width,
                    native_height: height,
                    native_duration: 0.0,
                })
            }
            MediaKind::AnimatedLoop if !probe::is_ffprobe_on_path() => {
                // The validator accepted this GIF without ffprobe; probing
                // must extend the same leniency and read it directly.
                let (width, height, duration) = probe_gif(path)?;
                Ok(Self {
                    path: path.to_path_buf(),
                    kind,
                    native_width: width,
                    native_height: height,
                    native_duration: duration,
                })
            }
            MediaKind::AnimatedLoop | MediaKind::Video => {
                let info = probe::probe_video_stream(path)?;
                Ok(Self {
                    path: path.to_path_buf(),
                    kind,
                    native_width: info.width,
                    native_height: info.height,
                    native_duration: info.duration_sec,
                })
            }
        }
    }
}

/// Dimensions and total play time of a GIF via the `image` crate. Near-zero
/// frame delays count as 100ms, as in the compositor's loop decode.
fn probe_gif(path: &Path) -> ReelResult<(u32, u32, f64)> {
    let file = File::open(path)
        .map_err(|e| ReelError::media(format!("open gif '{}': {e}", path.display())))?;
    let decoder = image::codecs::gif::GifDecoder::new(BufReader::new(file))
        .map_err(|e| ReelError::media(format!("parse gif '{}': {e}", path.display())))?;
    let (width, height) = decoder.dimensions();

    let mut duration = 0.0f64;
    for frame in decoder.into_frames() {
        let frame = frame.map_err(|e| ReelError::media(format!("decode gif frame: {e}")))?;
        let (num, den) = frame.delay().numer_denom_ms();
        let delay_ms = if den == 0 {
            100.0
        } else {
            f64::from(num) / f64::from(den)
        };
        duration += if delay_ms < 10.0 { 100.0 } else { delay_ms } / 1000.0;
    }
    Ok((width, height, duration))
}
