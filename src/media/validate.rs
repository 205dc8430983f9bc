use std::path::Path;

use tracing::debug;

use crate::media::{MediaKind, probe};

/// Downloads smaller than this are almost always truncated or an HTML error
/// page, not media.
pub const MIN_FILE_BYTES: u64 = 1000;

/// Either dimension below this and the asset is unusable on any canvas.
pub const MIN_DIMENSION_PX: u32 = 10;

/// Check that a downloaded media file is decodable and big enough to use.
///
/// Read-only; never touches the filesystem beyond reads. Video containers are
/// probed via ffprobe; a *missing* ffprobe binary fails open (accept) so an
/// unprovisioned host degrades to attempting composition rather than blocking
/// every acquisition. Images and GIFs are fully decoded, not header-sniffed.
/// Unknown extensions are accepted.
pub fn validate_media_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if meta.len() < MIN_FILE_BYTES {
        debug!(path = %path.display(), bytes = meta.len(), "rejecting undersized media file");
        return false;
    }

    match MediaKind::from_path(path) {
        MediaKind::Video => validate_video(path),
        MediaKind::AnimatedLoop | MediaKind::Image => validate_image(path),
        MediaKind::Unknown => true,
    }
}

fn validate_video(path: &Path) -> bool {
    if !probe::is_ffprobe_on_path() {
        // Documented leniency: no probing capability means accept, not block.
        debug!("ffprobe unavailable, accepting video without probing");
        return true;
    }
    match probe::probe_video_stream(path) {
        Ok(info) => {
            if info.width < MIN_DIMENSION_PX || info.height < MIN_DIMENSION_PX {
                debug!(
                    path = %path.display(),
                    width = info.width,
                    height = info.height,
                    "rejecting video with degenerate dimensions"
                );
                return false;
            }
            true
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "rejecting unprobeable video");
            false
        }
    }
}

fn validate_image(path: &Path) -> bool {
    match image::open(path) {
        Ok(img) => {
            if img.width() < MIN_DIMENSION_PX || img.height() < MIN_DIMENSION_PX {
                debug!(
                    path = %path.display(),
                    width = img.width(),
                    height = img.height(),
                    "rejecting image with degenerate dimensions"
                );
                return false;
            }
            true
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "rejecting undecodable image");
            false
        }
    }
}
