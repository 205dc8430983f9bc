//! Normalizer and timeline working together over in-memory sources.

use reelforge::compose::{
    BlurSettings, Frame, MotionEffect, Normalizer, RenderTier, Timeline,
    normalize::SourceClip,
};

fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
    let mut f = Frame::black(width, height);
    for px in f.data.chunks_exact_mut(4) {
        px[..3].copy_from_slice(&rgb);
    }
    f
}

fn plain_normalizer() -> Normalizer {
    Normalizer::new(BlurSettings {
        enabled: false,
        ..BlurSettings::default()
    })
}

#[test]
fn scenes_crossfade_and_output_runs_to_the_audio_clock() {
    let total = 6.0;
    let fps = 10u32;
    let tl = Timeline::plan(total, 3, 0.3).unwrap();
    let n = plain_normalizer();

    let colors = [[240u8, 0, 0], [0u8, 240, 0], [0u8, 0, 240]];
    let clips: Vec<_> = colors
        .iter()
        .map(|&rgb| {
            n.compose_source(
                SourceClip::Still(solid(64, 64, rgb)),
                64,
                64,
                tl.clip_duration,
                None,
                None,
            )
        })
        .collect();

    // Emit exactly round(total * fps) frames; every sample must succeed even
    // though the overlapped layout ends before the audio does.
    let frame_count = ((total * f64::from(fps)).round() as u64).max(1);
    assert_eq!(frame_count, 60);

    let mut last = None;
    for i in 0..frame_count {
        let t = i as f64 / f64::from(fps);
        let frame = tl.frame_at(&clips, t).unwrap();
        assert_eq!((frame.width, frame.height), (64, 64));
        last = Some(frame);
    }
    // The tail holds the final scene.
    assert!(last.unwrap().pixel(32, 32)[2] > 200);
}

#[test]
fn four_scene_twenty_second_narration_lines_up() {
    // Ten words of narration over 20s split across four scenes: five 2-word
    // chunks tiling [0, 20] exactly, and four 5s slots overlapped by the
    // standard crossfade.
    let total = 20.0;
    let chunks = reelforge::captions::allocate_captions(
        "the quick brown fox jumps over the lazy dog today",
        total,
        2,
    )
    .unwrap();
    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[0].start, 0.0);
    for pair in chunks.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert_eq!(chunks.last().unwrap().end, total);

    let tl = Timeline::plan(total, 4, 0.3).unwrap();
    assert!((tl.clip_duration - 5.0).abs() < 1e-9);
    for i in 0..4 {
        assert!((tl.start_of(i) - i as f64 * 4.7).abs() < 1e-9);
    }
    assert!((tl.composed_end() - 19.1).abs() < 1e-9);

    // Every chunk midpoint lands inside the audio clock, so each caption is
    // visible during playback.
    for chunk in &chunks {
        let mid = (chunk.start + chunk.end) / 2.0;
        assert!(mid < total);
        assert!(reelforge::captions::chunk_at(&chunks, mid).is_some());
    }
}

#[test]
fn crossfade_midpoint_mixes_adjacent_scenes() {
    let tl = Timeline::plan(4.0, 2, 1.0).unwrap();
    let n = plain_normalizer();
    let clips = vec![
        n.compose_source(
            SourceClip::Still(solid(32, 32, [200, 0, 0])),
            32,
            32,
            tl.clip_duration,
            None,
            None,
        ),
        n.compose_source(
            SourceClip::Still(solid(32, 32, [0, 200, 0])),
            32,
            32,
            tl.clip_duration,
            None,
            None,
        ),
    ];

    let mid = tl.frame_at(&clips, tl.start_of(1) + 0.5).unwrap().pixel(16, 16);
    assert!(mid[0] > 60 && mid[0] < 140, "red half gone, got {mid:?}");
    assert!(mid[1] > 60 && mid[1] < 140, "green half in, got {mid:?}");
}

#[test]
fn small_source_gets_blur_background_behind_contain_fit() {
    let n = Normalizer::default();
    let clip = n.compose_source(
        SourceClip::Still(solid(100, 100, [0, 220, 0])),
        540,
        960,
        2.0,
        None,
        None,
    );
    assert_eq!(clip.tier, RenderTier::BlurComposite);

    let frame = clip.frame_at(1.0);
    // Center: the contain-fit foreground at full brightness.
    assert!(frame.pixel(270, 480)[1] > 200);
    // Top band: blurred, darkened copy, neither black nor full brightness.
    let band = frame.pixel(270, 40);
    assert!(band[1] > 10 && band[1] < 200, "expected dimmed blur, got {band:?}");
}

#[test]
fn wide_source_on_tall_canvas_letterboxes_when_coverage_is_high() {
    let n = Normalizer::default();
    // 16:9 source on a 16:10-ish canvas covers > 70%, so no blur.
    let clip = n.compose_source(
        SourceClip::Still(solid(1600, 900, [220, 220, 0])),
        800,
        500,
        2.0,
        None,
        None,
    );
    assert_eq!(clip.tier, RenderTier::Letterbox);

    let frame = clip.frame_at(0.0);
    assert_eq!(frame.pixel(400, 5), [0, 0, 0, 255]);
    assert!(frame.pixel(400, 250)[0] > 200);
}

#[test]
fn motion_clip_stays_on_canvas_for_all_effects() {
    let n = plain_normalizer();
    for effect in MotionEffect::ALL {
        let clip = n.compose_source(
            SourceClip::Still(solid(300, 300, [50, 60, 70])),
            100,
            100,
            2.0,
            Some(effect),
            None,
        );
        for &t in &[0.0, 0.5, 1.0, 1.5, 2.0] {
            let frame = clip.frame_at(t);
            assert_eq!((frame.width, frame.height), (100, 100), "{effect:?} at {t}");
        }
    }
}

#[test]
fn animated_source_loops_for_the_whole_scene() {
    let n = plain_normalizer();
    let clip = n.compose_source(
        SourceClip::Animated {
            frames: vec![solid(32, 32, [255, 0, 0]), solid(32, 32, [0, 0, 255])],
            duration: 1.0,
        },
        32,
        32,
        4.5,
        None,
        None,
    );
    // Red in the first half of every loop iteration.
    for &t in &[0.1, 1.1, 2.1, 3.1, 4.1] {
        assert!(clip.frame_at(t).pixel(16, 16)[0] > 200, "at {t}");
    }
    for &t in &[0.6, 1.6, 3.6] {
        assert!(clip.frame_at(t).pixel(16, 16)[2] > 200, "at {t}");
    }
}
