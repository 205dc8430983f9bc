use std::{fs::File, io::BufReader, path::Path};

use image::AnimationDecoder as _;
use rand::Rng as _;
use tracing::{debug, warn};

use crate::{
    compose::{
        blur,
        frame::{Frame, contain_fit, coverage},
    },
    error::{ReelError, ReelResult},
    media::{MediaAsset, MediaKind, probe},
};

/// Cap on frames decoded per looping source. A 10s GIF at 30fps stays within
/// this; anything longer is trimmed rather than ballooning memory.
const MAX_LOOP_FRAMES: usize = 450;

/// Fallback duration for animated sources whose container reports none.
const DEFAULT_LOOP_SECS: f64 = 2.0;

/// Pre-upscale applied to still images before the motion-effect crop window
/// runs over them, so pans have somewhere to go.
const MOTION_UPSCALE: f64 = 1.2;

/// Zoom travel across a motion clip: 1.0 -> 1.15 (or the reverse).
const MOTION_ZOOM_SPAN: f64 = 0.15;

/// Blur-background behavior. Defaults match the production tuning: sources
/// that contain-fit to less than 70% of the canvas get a blurred, darkened,
/// overscaled copy of themselves behind them instead of black bars.
#[derive(Clone, Debug)]
pub struct BlurSettings {
    pub enabled: bool,
    pub radius: u32,
    pub darken_factor: f64,
    pub scale_factor: f64,
    pub min_coverage: f64,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: blur::BACKGROUND_BLUR_RADIUS,
            darken_factor: 0.6,
            scale_factor: 1.5,
            min_coverage: 0.7,
        }
    }
}

impl BlurSettings {
    /// Build settings with out-of-range values clamped to their useful bands
    /// (radius 10..=100, factors 0..=1).
    pub fn clamped(
        enabled: bool,
        radius: u32,
        darken_factor: f64,
        min_coverage: f64,
    ) -> Self {
        Self {
            enabled,
            radius: radius.clamp(10, 100),
            darken_factor: darken_factor.clamp(0.0, 1.0),
            scale_factor: Self::default().scale_factor,
            min_coverage: min_coverage.clamp(0.0, 1.0),
        }
    }
}

/// Pseudo-motion applied to otherwise static images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionEffect {
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
}

impl MotionEffect {
    pub const ALL: [MotionEffect; 4] = [
        MotionEffect::ZoomIn,
        MotionEffect::ZoomOut,
        MotionEffect::PanLeft,
        MotionEffect::PanRight,
    ];

    /// Uniform pick from an injectable rng, so tests can pin the effect by
    /// seeding.
    pub fn pick(rng: &mut impl rand::RngCore) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// Which rendering strategy actually produced the clip, in ladder order.
/// `BlurComposite` and `Letterbox` are the two healthy paths;
/// `ExtractedFrame` means the source container was broken but a single frame
/// was salvaged; `BlackFill` is the bottom rung.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTier {
    BlurComposite,
    Letterbox,
    ExtractedFrame,
    BlackFill,
}

/// A fixed-duration, fixed-resolution renderable segment. Produces one canvas
/// frame per sample time; all placement and looping decisions were made at
/// construction.
pub struct NormalizedClip {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub tier: RenderTier,
    /// Human-readable degradation note, present for the degraded tiers.
    pub note: Option<String>,
    body: ClipBody,
}

enum ClipBody {
    /// Optional blurred background with a contain-fit foreground centered on
    /// top. `background: None` is the plain letterbox path.
    Layered {
        background: Option<Frame>,
        foreground: Foreground,
        offset: (i64, i64),
    },
    /// Animated crop window over a pre-upscaled still.
    Motion(MotionClip),
    Black,
}

enum Foreground {
    Still(Frame),
    Loop {
        frames: Vec<Frame>,
        source_duration: f64,
    },
}

struct MotionClip {
    scaled: Frame,
    effect: MotionEffect,
    background: Option<Frame>,
    fit: (u32, u32),
}

impl NormalizedClip {
    pub fn black(width: u32, height: u32, duration: f64, note: impl Into<String>) -> Self {
        Self {
            width,
            height,
            duration,
            tier: RenderTier::BlackFill,
            note: Some(note.into()),
            body: ClipBody::Black,
        }
    }

    /// Render the canvas frame at clip-local time `t` (clamped to the clip's
    /// range). Always returns an opaque frame of the clip's dimensions.
    pub fn frame_at(&self, t: f64) -> Frame {
        let t = t.clamp(0.0, self.duration);
        match &self.body {
            ClipBody::Black => Frame::black(self.width, self.height),
            ClipBody::Layered {
                background,
                foreground,
                offset,
            } => {
                let mut canvas = match background {
                    Some(bg) => bg.clone(),
                    None => Frame::black(self.width, self.height),
                };
                let fg = match foreground {
                    Foreground::Still(frame) => frame,
                    Foreground::Loop {
                        frames,
                        source_duration,
                    } => loop_frame(frames, *source_duration, t),
                };
                canvas.paste_over(fg, offset.0, offset.1);
                canvas.flattened()
            }
            ClipBody::Motion(motion) => motion.frame_at(t, self.width, self.height, self.duration),
        }
    }
}

impl MotionClip {
    fn frame_at(&self, t: f64, width: u32, height: u32, duration: f64) -> Frame {
        let progress = if duration > 0.0 { t / duration } else { 0.0 };
        let zoom = match self.effect {
            MotionEffect::ZoomIn => 1.0 + MOTION_ZOOM_SPAN * progress,
            MotionEffect::ZoomOut => 1.0 + MOTION_ZOOM_SPAN * (1.0 - progress),
            MotionEffect::PanLeft | MotionEffect::PanRight => 1.0,
        };

        let crop_w = (f64::from(width) / zoom).round().max(1.0) as u32;
        let crop_h = (f64::from(height) / zoom).round().max(1.0) as u32;
        let span_x = i64::from(self.scaled.width) - i64::from(crop_w);
        let span_y = i64::from(self.scaled.height) - i64::from(crop_h);

        let x = match self.effect {
            MotionEffect::PanLeft if span_x > 0 => ((span_x as f64) * (1.0 - progress)) as i64,
            MotionEffect::PanRight if span_x > 0 => ((span_x as f64) * progress) as i64,
            _ => span_x / 2,
        };
        let y = span_y / 2;

        let window = padded_crop(&self.scaled, x, y, crop_w, crop_h);
        match &self.background {
            None => window.resized(width, height).flattened(),
            Some(bg) => {
                // The moving crop stays a centered foreground; the blurred
                // background does not pan with it.
                let (fit_w, fit_h) = self.fit;
                let fg = window.resized(fit_w, fit_h);
                let mut canvas = bg.clone();
                canvas.paste_over(
                    &fg,
                    i64::from((width - fit_w) / 2),
                    i64::from((height - fit_h) / 2),
                );
                canvas.flattened()
            }
        }
    }
}

/// Crop that pads with black instead of clamping when the window leaves the
/// source, so the window's aspect ratio is always exact.
fn padded_crop(src: &Frame, x: i64, y: i64, width: u32, height: u32) -> Frame {
    let mut canvas = Frame::black(width, height);
    canvas.paste_over(src, -x, -y);
    canvas
}

fn loop_frame<'a>(frames: &'a [Frame], source_duration: f64, t: f64) -> &'a Frame {
    debug_assert!(!frames.is_empty());
    let source_duration = if source_duration > 0.0 {
        source_duration
    } else {
        DEFAULT_LOOP_SECS
    };
    let local = t.rem_euclid(source_duration);
    let idx = ((local / source_duration) * frames.len() as f64) as usize;
    &frames[idx.min(frames.len() - 1)]
}

/// Decoded source pixels, independent of where they came from. Keeping this
/// separate from file loading lets the compositing math run in tests without
/// ffmpeg.
pub enum SourceClip {
    Still(Frame),
    Animated { frames: Vec<Frame>, duration: f64 },
}

impl SourceClip {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            SourceClip::Still(f) => (f.width, f.height),
            SourceClip::Animated { frames, .. } => (frames[0].width, frames[0].height),
        }
    }

    fn first_frame(&self) -> &Frame {
        match self {
            SourceClip::Still(f) => f,
            SourceClip::Animated { frames, .. } => &frames[0],
        }
    }
}

/// The media normalizer: turns one asset into a clip of exactly the requested
/// duration and canvas size, degrading instead of failing.
#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    pub blur: BlurSettings,
}

impl Normalizer {
    pub fn new(blur: BlurSettings) -> Self {
        Self { blur }
    }

    /// Normalize `asset` into a `target_w x target_h` clip of
    /// `target_duration` seconds.
    ///
    /// Never returns an error: decode or transform failures walk the ladder
    /// blur composite -> letterbox -> extracted frame -> solid black, and the
    /// resulting tier is recorded on the clip. A missing scene visual must
    /// never abort the whole video.
    #[tracing::instrument(skip(self, asset, motion), fields(path = %asset.path.display()))]
    pub fn normalize(
        &self,
        asset: &MediaAsset,
        target_w: u32,
        target_h: u32,
        target_duration: f64,
        motion: Option<MotionEffect>,
    ) -> NormalizedClip {
        match self.load_source(asset, target_w, target_h, target_duration) {
            Ok(source) => {
                self.compose_source(source, target_w, target_h, target_duration, motion, None)
            }
            Err(load_err) => {
                debug!(error = %load_err, "source decode failed, trying frame extraction");
                match probe::extract_representative_frame(&asset.path) {
                    Ok(frame) => {
                        let note = format!("extracted single frame: {load_err}");
                        let mut clip = self.compose_source(
                            SourceClip::Still(frame),
                            target_w,
                            target_h,
                            target_duration,
                            motion,
                            Some(note),
                        );
                        clip.tier = RenderTier::ExtractedFrame;
                        clip
                    }
                    Err(extract_err) => {
                        warn!(
                            error = %extract_err,
                            "no frame recoverable, substituting black clip"
                        );
                        NormalizedClip::black(
                            target_w,
                            target_h,
                            target_duration,
                            format!("undecodable source: {load_err}"),
                        )
                    }
                }
            }
        }
    }

    /// Compose an already-decoded source. Public for tests and for callers
    /// that hold pixels rather than files.
    pub fn compose_source(
        &self,
        source: SourceClip,
        target_w: u32,
        target_h: u32,
        target_duration: f64,
        motion: Option<MotionEffect>,
        note: Option<String>,
    ) -> NormalizedClip {
        let (src_w, src_h) = source.dimensions();
        let cov = coverage(src_w, src_h, target_w, target_h);
        let use_blur = self.blur.enabled && cov < self.blur.min_coverage;
        let (fit_w, fit_h) = contain_fit(src_w, src_h, target_w, target_h);

        let (background, tier) = if use_blur {
            match self.blur_background(source.first_frame(), target_w, target_h) {
                Ok(bg) => (Some(bg), RenderTier::BlurComposite),
                Err(e) => {
                    warn!(error = %e, "blur background failed, letterboxing instead");
                    (None, RenderTier::Letterbox)
                }
            }
        } else {
            (None, RenderTier::Letterbox)
        };
        debug!(coverage = cov, blur = background.is_some(), "normalizing source");

        let body = match (source, motion) {
            (SourceClip::Still(frame), Some(effect)) => {
                let base_w = (f64::from(target_w) * MOTION_UPSCALE) as u32;
                let base_h = (f64::from(target_h) * MOTION_UPSCALE) as u32;
                let (scaled_w, scaled_h) = contain_fit(frame.width, frame.height, base_w, base_h);
                ClipBody::Motion(MotionClip {
                    scaled: frame.resized(scaled_w, scaled_h),
                    effect,
                    background,
                    fit: (fit_w, fit_h),
                })
            }
            (SourceClip::Still(frame), None) => ClipBody::Layered {
                background,
                foreground: Foreground::Still(frame.resized(fit_w, fit_h)),
                offset: centered_offset(target_w, target_h, fit_w, fit_h),
            },
            (SourceClip::Animated { frames, duration }, _) => {
                let scaled: Vec<Frame> = frames.iter().map(|f| f.resized(fit_w, fit_h)).collect();
                ClipBody::Layered {
                    background,
                    foreground: Foreground::Loop {
                        frames: scaled,
                        source_duration: if duration > 0.0 {
                            duration
                        } else {
                            DEFAULT_LOOP_SECS
                        },
                    },
                    offset: centered_offset(target_w, target_h, fit_w, fit_h),
                }
            }
        };

        NormalizedClip {
            width: target_w,
            height: target_h,
            duration: target_duration,
            tier,
            note,
            body,
        }
    }

    /// Full-bleed blurred backdrop: overscale past "cover", center-crop to the
    /// canvas, blur hard, then dim so the foreground reads on top.
    fn blur_background(&self, frame: &Frame, target_w: u32, target_h: u32) -> ReelResult<Frame> {
        if frame.width == 0 || frame.height == 0 {
            return Err(ReelError::compose("degenerate source for blur background"));
        }
        let cover = (f64::from(target_w) / f64::from(frame.width))
            .max(f64::from(target_h) / f64::from(frame.height));
        let scale = cover * self.blur.scale_factor;
        let scaled = frame.resized(
            (f64::from(frame.width) * scale) as u32,
            (f64::from(frame.height) * scale) as u32,
        );
        let cropped = scaled.center_cropped(target_w, target_h);
        let blurred = blur::blur_frame(&cropped.flattened(), self.blur.radius)?;
        Ok(blurred.darkened(self.blur.darken_factor))
    }

    fn load_source(
        &self,
        asset: &MediaAsset,
        target_w: u32,
        target_h: u32,
        target_duration: f64,
    ) -> ReelResult<SourceClip> {
        match asset.kind {
            MediaKind::Image | MediaKind::Unknown => {
                let img = image::open(&asset.path).map_err(|e| {
                    ReelError::media(format!("decode image '{}': {e}", asset.path.display()))
                })?;
                Ok(SourceClip::Still(Frame::from_rgba_image(img.to_rgba8())))
            }
            MediaKind::AnimatedLoop => load_gif(&asset.path),
            MediaKind::Video => {
                let info = probe::probe_video_stream(&asset.path)?;
                if info.width == 0 || info.height == 0 {
                    return Err(ReelError::media("video reports zero dimensions"));
                }
                let (fit_w, fit_h) = contain_fit(info.width, info.height, target_w, target_h);
                let sample_fps = match info.fps() {
                    f if f > 0.0 => f.min(30.0),
                    _ => 15.0,
                };
                let span = if info.duration_sec > 0.0 {
                    info.duration_sec.min(target_duration.max(0.1))
                } else {
                    target_duration.max(0.1)
                };
                let count = ((span * sample_fps).ceil() as usize)
                    .clamp(1, MAX_LOOP_FRAMES) as u32;
                let frames =
                    probe::decode_video_frames(&asset.path, fit_w, fit_h, sample_fps, count)?;
                let duration = frames.len() as f64 / sample_fps;
                Ok(SourceClip::Animated { frames, duration })
            }
        }
    }
}

fn centered_offset(target_w: u32, target_h: u32, fit_w: u32, fit_h: u32) -> (i64, i64) {
    (
        (i64::from(target_w) - i64::from(fit_w)) / 2,
        (i64::from(target_h) - i64::from(fit_h)) / 2,
    )
}

/// Decode a GIF into frames plus total duration from the per-frame delays.
fn load_gif(path: &Path) -> ReelResult<SourceClip> {
    let file = File::open(path)
        .map_err(|e| ReelError::media(format!("open gif '{}': {e}", path.display())))?;
    let decoder = image::codecs::gif::GifDecoder::new(BufReader::new(file))
        .map_err(|e| ReelError::media(format!("parse gif '{}': {e}", path.display())))?;

    let mut frames = Vec::new();
    let mut duration = 0.0f64;
    for frame in decoder.into_frames() {
        let frame =
            frame.map_err(|e| ReelError::media(format!("decode gif frame: {e}")))?;
        let (num, den) = frame.delay().numer_denom_ms();
        let delay_ms = if den == 0 {
            100.0
        } else {
            f64::from(num) / f64::from(den)
        };
        // Browsers treat near-zero delays as 100ms; do the same.
        duration += if delay_ms < 10.0 { 100.0 } else { delay_ms } / 1000.0;
        frames.push(Frame::from_rgba_image(frame.into_buffer()));
        if frames.len() >= MAX_LOOP_FRAMES {
            break;
        }
    }
    if frames.is_empty() {
        return Err(ReelError::media(format!(
            "gif '{}' contains no frames",
            path.display()
        )));
    }
    Ok(SourceClip::Animated { frames, duration })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;

    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let mut f = Frame::black(width, height);
        for px in f.data.chunks_exact_mut(4) {
            px[..3].copy_from_slice(&rgb);
        }
        f
    }

    #[test]
    fn full_coverage_source_takes_letterbox_path() {
        let n = Normalizer::default();
        let clip = n.compose_source(
            SourceClip::Still(solid_frame(540, 960, [200, 10, 10])),
            1080,
            1920,
            2.0,
            None,
            None,
        );
        assert_eq!(clip.tier, RenderTier::Letterbox);

        let frame = clip.frame_at(1.0);
        assert_eq!((frame.width, frame.height), (1080, 1920));
        // No blur band: source scales to full bleed, so corners carry source
        // color, not black bars or dimmed blur.
        let [r, ..] = frame.pixel(2, 2);
        assert!(r > 150);
    }

    #[test]
    fn low_coverage_source_triggers_blur_composite() {
        let n = Normalizer::default();
        let clip = n.compose_source(
            SourceClip::Still(solid_frame(200, 200, [10, 200, 10])),
            1080,
            1920,
            2.0,
            None,
            None,
        );
        assert_eq!(clip.tier, RenderTier::BlurComposite);

        // A blurred+darkened duplicate sits behind the foreground: corners are
        // neither pure black (letterbox) nor full source brightness.
        let frame = clip.frame_at(0.0);
        let [_, g, _, _] = frame.pixel(5, 5);
        assert!(g > 0, "blur background should not be pure black");
        assert!(g < 200, "blur background should be darkened");
    }

    #[test]
    fn blur_disabled_forces_letterbox() {
        let n = Normalizer::new(BlurSettings {
            enabled: false,
            ..BlurSettings::default()
        });
        let clip = n.compose_source(
            SourceClip::Still(solid_frame(200, 200, [10, 200, 10])),
            1080,
            1920,
            2.0,
            None,
            None,
        );
        assert_eq!(clip.tier, RenderTier::Letterbox);
        let frame = clip.frame_at(0.0);
        assert_eq!(frame.pixel(5, 5), [0, 0, 0, 255]);
    }

    #[test]
    fn short_loop_covers_full_duration_by_repeating() {
        let n = Normalizer::new(BlurSettings {
            enabled: false,
            ..BlurSettings::default()
        });
        let frames = vec![
            solid_frame(1080, 1920, [250, 0, 0]),
            solid_frame(1080, 1920, [0, 250, 0]),
        ];
        let clip = n.compose_source(
            SourceClip::Animated {
                frames,
                duration: 2.0,
            },
            1080,
            1920,
            5.0,
            None,
            None,
        );
        assert_eq!(clip.duration, 5.0);

        // t=0.5 -> first half of the loop (red); t=2.5 -> wrapped back to red;
        // t=1.5 and t=3.5 -> second half (green).
        let center = |t: f64| clip.frame_at(t).pixel(540, 960);
        assert!(center(0.5)[0] > 200);
        assert!(center(2.5)[0] > 200);
        assert!(center(1.5)[1] > 200);
        assert!(center(3.5)[1] > 200);
    }

    #[test]
    fn black_clip_has_exact_geometry_and_tier() {
        let clip = NormalizedClip::black(640, 360, 3.5, "test");
        assert_eq!(clip.tier, RenderTier::BlackFill);
        assert_eq!(clip.duration, 3.5);
        let f = clip.frame_at(1.0);
        assert_eq!((f.width, f.height), (640, 360));
        assert_eq!(f.pixel(320, 180), [0, 0, 0, 255]);
    }

    #[test]
    fn undecodable_file_falls_back_to_black() {
        let dir = std::env::temp_dir().join(format!("reelforge-norm-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("busted.gif");
        std::fs::write(&path, b"definitely not a gif").unwrap();

        let asset = MediaAsset {
            path,
            kind: MediaKind::AnimatedLoop,
            native_width: 0,
            native_height: 0,
            native_duration: 0.0,
        };
        let clip = Normalizer::default().normalize(&asset, 320, 240, 4.0, None);
        // With no extractable frame, the ladder must bottom out at black and
        // never raise.
        assert_eq!(clip.tier, RenderTier::BlackFill);
        assert_eq!(clip.duration, 4.0);
        assert_eq!(clip.frame_at(0.0).pixel(10, 10), [0, 0, 0, 255]);
    }

    #[test]
    fn motion_effect_pick_is_seed_deterministic() {
        let mut a = rand::rngs::StdRng::seed_from_u64(7);
        let mut b = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..8 {
            assert_eq!(MotionEffect::pick(&mut a), MotionEffect::pick(&mut b));
        }
    }

    #[test]
    fn zoom_in_crop_window_shrinks_over_time() {
        let n = Normalizer::new(BlurSettings {
            enabled: false,
            ..BlurSettings::default()
        });
        // Image with a bright left edge and dark right edge; zoom-in keeps the
        // center, pan-right moves toward the dark side.
        let mut img = solid_frame(400, 400, [0, 0, 0]);
        for y in 0..400u32 {
            for x in 0..40u32 {
                let i = ((y * 400 + x) as usize) * 4;
                img.data[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let clip = n.compose_source(
            SourceClip::Still(img),
            200,
            200,
            2.0,
            Some(MotionEffect::PanRight),
            None,
        );
        let early = clip.frame_at(0.0);
        let late = clip.frame_at(2.0);
        // The bright stripe is visible at the start of a right pan and gone by
        // the end.
        assert!(early.pixel(4, 100)[0] > late.pixel(4, 100)[0]);
    }

    #[test]
    fn padded_crop_keeps_window_geometry() {
        let src = solid_frame(50, 50, [9, 9, 9]);
        let window = padded_crop(&src, -10, -10, 100, 100);
        assert_eq!((window.width, window.height), (100, 100));
        assert_eq!(window.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(window.pixel(15, 15), [9, 9, 9, 255]);
    }

    #[test]
    fn blur_settings_clamp_ranges() {
        let s = BlurSettings::clamped(true, 5, 2.0, -1.0);
        assert_eq!(s.radius, 10);
        assert_eq!(s.darken_factor, 1.0);
        assert_eq!(s.min_coverage, 0.0);
    }
}
