use std::path::{Path, PathBuf};

use rand::SeedableRng as _;
use tracing::{info, warn};

use crate::{
    captions::{
        self, CaptionPainter, CaptionStyle,
        timing::DEFAULT_WORDS_PER_CHUNK,
    },
    compose::{
        blend,
        frame::Frame,
        normalize::{BlurSettings, MotionEffect, NormalizedClip, Normalizer, RenderTier},
    },
    encode::{EncodeConfig, FfmpegEncoder},
    error::{ReelError, ReelResult},
    media::{MediaAsset, MediaKind, probe},
    scene::Scene,
};

/// Overlap between consecutive scene clips. Long enough to read as a
/// transition, short enough not to eat narration time.
pub const CROSSFADE_SECS: f64 = 0.3;

/// Placement of uniform-duration scene clips on the output time axis.
///
/// Narration audio is the clock: every scene gets `total / n` seconds, and
/// clip `i` starts at `i * (d - crossfade)` so neighbours overlap by the
/// crossfade. The overlapped layout is shorter than `total`; sampling past
/// its end holds the final clip's last frame so the emitted video still runs
/// exactly as long as the audio.
#[derive(Clone, Debug)]
pub struct Timeline {
    pub clip_duration: f64,
    pub crossfade: f64,
    pub total_duration: f64,
    starts: Vec<f64>,
}

impl Timeline {
    pub fn plan(total_duration: f64, scene_count: usize, crossfade: f64) -> ReelResult<Self> {
        if scene_count == 0 {
            return Err(ReelError::validation("cannot compose a video with zero scenes"));
        }
        if !total_duration.is_finite() || total_duration <= 0.0 {
            return Err(ReelError::validation(format!(
                "narration duration must be positive, got {total_duration}"
            )));
        }
        if !crossfade.is_finite() || crossfade < 0.0 {
            return Err(ReelError::validation("crossfade must be >= 0"));
        }

        let clip_duration = total_duration / scene_count as f64;
        let crossfade = if scene_count > 1 {
            crossfade.min(clip_duration)
        } else {
            0.0
        };
        let starts = (0..scene_count)
            .map(|i| i as f64 * (clip_duration - crossfade))
            .collect();
        Ok(Self {
            clip_duration,
            crossfade,
            total_duration,
            starts,
        })
    }

    pub fn scene_count(&self) -> usize {
        self.starts.len()
    }

    pub fn start_of(&self, index: usize) -> f64 {
        self.starts[index]
    }

    /// End of the overlapped layout; always <= `total_duration`.
    pub fn composed_end(&self) -> f64 {
        self.starts[self.starts.len() - 1] + self.clip_duration
    }

    /// Sample the output frame at time `t`. Times past the overlapped layout
    /// hold the final clip's last frame.
    pub fn frame_at(&self, clips: &[NormalizedClip], t: f64) -> ReelResult<Frame> {
        if clips.len() != self.starts.len() {
            return Err(ReelError::compose(format!(
                "timeline has {} scenes but {} clips were supplied",
                self.starts.len(),
                clips.len()
            )));
        }
        let t = t.clamp(0.0, self.composed_end());
        let cur = self
            .starts
            .iter()
            .rposition(|&s| s <= t)
            .unwrap_or(0);
        let mut frame = clips[cur].frame_at(t - self.starts[cur]);

        if cur > 0 && self.crossfade > 0.0 {
            let prev_end = self.starts[cur - 1] + self.clip_duration;
            if t < prev_end {
                let prev = clips[cur - 1].frame_at(t - self.starts[cur - 1]);
                let alpha = ((t - self.starts[cur]) / self.crossfade).clamp(0.0, 1.0) as f32;
                let mut mixed = prev.data.clone();
                blend::crossfade_into(&mut mixed, &prev.data, &frame.data, alpha)?;
                frame = Frame::new(frame.width, frame.height, mixed)?;
            }
        }
        Ok(frame)
    }
}

#[derive(Clone, Debug)]
pub struct CompositionSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crossfade: f64,
    pub blur: BlurSettings,
    pub caption_style: CaptionStyle,
    pub burn_captions: bool,
    /// Pins motion-effect selection for reproducible output.
    pub motion_seed: Option<u64>,
}

impl Default for CompositionSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            crossfade: CROSSFADE_SECS,
            blur: BlurSettings::default(),
            caption_style: CaptionStyle::default(),
            burn_captions: true,
            motion_seed: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompositionReport {
    pub output: PathBuf,
    pub srt_path: PathBuf,
    pub duration: f64,
    pub frames: u64,
    pub captions_burned: bool,
    /// Rendering tier of each timeline slot, in slot order.
    pub tiers: Vec<RenderTier>,
}

/// Render a full narrated video: one timeline slot per acquired asset on the
/// narration clock, crossfaded, captioned, encoded with the audio muxed in.
/// An SRT sidecar is written next to the output regardless of whether burn-in
/// succeeds.
///
/// Unreadable narration audio and an empty scene list are hard errors; a bad
/// visual asset only degrades its own slot.
#[tracing::instrument(skip_all, fields(output = %output.display()))]
pub fn compose_video(
    scenes: &[Scene],
    assets: &[MediaAsset],
    audio: &Path,
    output: &Path,
    settings: &CompositionSettings,
) -> ReelResult<CompositionReport> {
    if scenes.is_empty() {
        return Err(ReelError::validation("cannot compose a video with zero scenes"));
    }
    let total = probe::audio_duration(audio)?;
    if !total.is_finite() || total <= 0.0 {
        return Err(ReelError::media(format!(
            "narration audio '{}' has no usable duration",
            audio.display()
        )));
    }
    let slots = slot_count(scenes.len(), assets.len());
    let timeline = Timeline::plan(total, slots, settings.crossfade)?;
    if !assets.is_empty() && assets.len() < scenes.len() {
        warn!(
            assets = assets.len(),
            scenes = scenes.len(),
            "fewer assets than scenes, composing one longer slot per asset"
        );
    }
    info!(
        scenes = scenes.len(),
        slots,
        duration = total,
        clip_duration = timeline.clip_duration,
        "planned timeline"
    );

    // Holds the resampled copy (if one was made) and removes it when the
    // composition exits, on the error paths included.
    let audio = probe::normalize_audio(audio, probe::NARRATION_SAMPLE_RATE);

    let narration: Vec<&str> = scenes.iter().map(|s| s.text.as_str()).collect();
    let chunks =
        captions::allocate_captions(&narration.join(" "), total, DEFAULT_WORDS_PER_CHUNK)?;
    let srt_path = output.with_extension("srt");
    captions::write_srt(&chunks, &srt_path)?;

    let normalizer = Normalizer::new(settings.blur.clone());
    let mut rng = match settings.motion_seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    let mut clips = Vec::with_capacity(slots);
    let mut tiers = Vec::with_capacity(slots);
    for i in 0..slots {
        let clip = match assets.get(i) {
            None => NormalizedClip::black(
                settings.width,
                settings.height,
                timeline.clip_duration,
                "no visual asset available",
            ),
            Some(asset) => {
                let motion = (asset.kind == MediaKind::Image)
                    .then(|| MotionEffect::pick(&mut rng));
                normalizer.normalize(
                    asset,
                    settings.width,
                    settings.height,
                    timeline.clip_duration,
                    motion,
                )
            }
        };
        if clip.tier != RenderTier::BlurComposite && clip.tier != RenderTier::Letterbox {
            warn!(slot = i, tier = ?clip.tier, note = clip.note.as_deref(), "slot degraded");
        }
        tiers.push(clip.tier);
        clips.push(clip);
    }

    let mut painter = if settings.burn_captions {
        match CaptionPainter::from_system_fonts(settings.caption_style.clone()) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "caption burn-in disabled, srt sidecar still written");
                None
            }
        }
    } else {
        None
    };

    let cfg = EncodeConfig::new(output, settings.width, settings.height, settings.fps)
        .with_audio(audio.path());
    let mut encoder = FfmpegEncoder::new(cfg)?;

    // One frame per tick of the audio clock, so video and narration end
    // together to the frame.
    let frame_count = ((total * f64::from(settings.fps)).round() as u64).max(1);
    for n in 0..frame_count {
        let t = n as f64 / f64::from(settings.fps);
        let mut frame = timeline.frame_at(&clips, t)?;
        if let Some(painter) = painter.as_mut()
            && let Some(chunk) = captions::chunk_at(&chunks, t)
        {
            painter.draw_caption(&mut frame, &chunk.text);
        }
        encoder.encode_frame(&frame)?;
    }
    let frames = encoder.frames_written();
    encoder.finish()?;
    info!(frames, srt = %srt_path.display(), "composition finished");

    Ok(CompositionReport {
        output: output.to_path_buf(),
        srt_path,
        duration: total,
        frames,
        captions_burned: painter.is_some(),
        tiers,
    })
}

/// Each acquired asset gets exactly one slot; no asset appears twice. When
/// fewer assets than scenes survived acquisition, the narration is split over
/// the assets that exist, so each slot simply runs longer. Only a job with no
/// assets at all falls back to one black slot per scene.
fn slot_count(scene_count: usize, asset_count: usize) -> usize {
    if asset_count == 0 {
        scene_count
    } else {
        asset_count
    }
}

#[cfg(test)]
mod tests {
    use crate::compose::normalize::SourceClip;

    use super::*;

    fn solid_clip(rgb: [u8; 3], width: u32, height: u32, duration: f64) -> NormalizedClip {
        let mut frame = Frame::black(width, height);
        for px in frame.data.chunks_exact_mut(4) {
            px[..3].copy_from_slice(&rgb);
        }
        let normalizer = Normalizer::new(BlurSettings {
            enabled: false,
            ..BlurSettings::default()
        });
        normalizer.compose_source(
            SourceClip::Still(frame),
            width,
            height,
            duration,
            None,
            None,
        )
    }

    #[test]
    fn plan_rejects_degenerate_inputs() {
        assert!(Timeline::plan(10.0, 0, 0.3).is_err());
        assert!(Timeline::plan(0.0, 3, 0.3).is_err());
        assert!(Timeline::plan(f64::NAN, 3, 0.3).is_err());
        assert!(Timeline::plan(10.0, 3, -1.0).is_err());
    }

    #[test]
    fn starts_overlap_by_the_crossfade() {
        let tl = Timeline::plan(6.0, 3, 0.3).unwrap();
        assert!((tl.clip_duration - 2.0).abs() < 1e-9);
        assert!((tl.start_of(0) - 0.0).abs() < 1e-9);
        assert!((tl.start_of(1) - 1.7).abs() < 1e-9);
        assert!((tl.start_of(2) - 3.4).abs() < 1e-9);
        assert!((tl.composed_end() - 5.4).abs() < 1e-9);
    }

    #[test]
    fn single_scene_has_no_crossfade() {
        let tl = Timeline::plan(5.0, 1, 0.3).unwrap();
        assert_eq!(tl.crossfade, 0.0);
        assert!((tl.composed_end() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_region_blends_neighbours() {
        let tl = Timeline::plan(4.0, 2, 1.0).unwrap();
        // d = 2, starts = [0, 1], overlap spans [1, 2).
        let clips = vec![
            solid_clip([250, 0, 0], 8, 8, tl.clip_duration),
            solid_clip([0, 250, 0], 8, 8, tl.clip_duration),
        ];

        let before = tl.frame_at(&clips, 0.5).unwrap().pixel(4, 4);
        assert!(before[0] > 200 && before[1] < 20);

        let mid = tl.frame_at(&clips, 1.5).unwrap().pixel(4, 4);
        assert!(mid[0] > 100 && mid[0] < 150, "red should be half faded, got {mid:?}");
        assert!(mid[1] > 100 && mid[1] < 150, "green should be half in, got {mid:?}");

        let after = tl.frame_at(&clips, 2.5).unwrap().pixel(4, 4);
        assert!(after[1] > 200 && after[0] < 20);
    }

    #[test]
    fn sampling_past_layout_end_holds_last_clip() {
        let tl = Timeline::plan(4.0, 2, 1.0).unwrap();
        let clips = vec![
            solid_clip([250, 0, 0], 8, 8, tl.clip_duration),
            solid_clip([0, 250, 0], 8, 8, tl.clip_duration),
        ];
        // composed_end = 3.0 but the audio clock runs to 4.0.
        let held = tl.frame_at(&clips, 3.9).unwrap().pixel(4, 4);
        assert!(held[1] > 200);
    }

    #[test]
    fn clip_count_mismatch_is_an_error() {
        let tl = Timeline::plan(4.0, 2, 0.3).unwrap();
        let clips = vec![solid_clip([1, 1, 1], 8, 8, tl.clip_duration)];
        assert!(tl.frame_at(&clips, 0.0).is_err());
    }

    #[test]
    fn slots_follow_assets_not_scenes() {
        // Two surviving assets for five scenes: two longer slots, each asset
        // used exactly once.
        assert_eq!(slot_count(5, 2), 2);
        assert_eq!(slot_count(3, 7), 7);
        // No assets at all: a black slate per scene.
        assert_eq!(slot_count(4, 0), 4);
    }

    #[test]
    fn short_asset_pool_splits_narration_into_longer_slots() {
        let slots = slot_count(5, 2);
        let tl = Timeline::plan(20.0, slots, CROSSFADE_SECS).unwrap();
        assert_eq!(tl.scene_count(), 2);
        assert!((tl.clip_duration - 10.0).abs() < 1e-9);
        assert!((tl.start_of(1) - 9.7).abs() < 1e-9);
    }

    #[test]
    fn frame_count_tracks_audio_duration() {
        // 7.21s at 30fps rounds to 216 frames, not 217 or a truncated 216.3.
        let frames = ((7.21f64 * 30.0).round() as u64).max(1);
        assert_eq!(frames, 216);
    }
}
