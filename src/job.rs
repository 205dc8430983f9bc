//! End-to-end job orchestration: script, narration, media, composition,
//! optional publishing, and working-directory lifecycle.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::{
    acquire::{Acquirer, AcquisitionState, MediaProvider},
    compose::{self, CompositionSettings},
    error::{ReelError, ReelResult},
    media::MediaAsset,
    scene::Scene,
};

/// A target platform rendition: canvas geometry plus how many scenes a script
/// should have to fill it well.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputProfile {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub scene_count: usize,
}

pub const PROFILES: &[OutputProfile] = &[
    OutputProfile { name: "short", width: 1080, height: 1920, fps: 30, scene_count: 5 },
    OutputProfile { name: "reels", width: 1080, height: 1920, fps: 30, scene_count: 5 },
    OutputProfile { name: "tiktok", width: 1080, height: 1920, fps: 30, scene_count: 5 },
    OutputProfile { name: "story", width: 1080, height: 1920, fps: 30, scene_count: 3 },
    OutputProfile { name: "youtube", width: 1920, height: 1080, fps: 30, scene_count: 8 },
    OutputProfile { name: "youtube_hd", width: 1280, height: 720, fps: 30, scene_count: 8 },
    OutputProfile { name: "square", width: 1080, height: 1080, fps: 30, scene_count: 5 },
];

pub fn profile_named(name: &str) -> Option<&'static OutputProfile> {
    PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Lookup that never fails: unrecognized names render as `short`.
pub fn profile_or_default(name: &str) -> &'static OutputProfile {
    profile_named(name).unwrap_or_else(|| {
        warn!(profile = name, "unknown output profile, using 'short'");
        &PROFILES[0]
    })
}

/// A generated script: the scene list plus the style hint that shapes media
/// search terms.
#[derive(Clone, Debug)]
pub struct Script {
    pub topic: String,
    pub style: Option<String>,
    pub scenes: Vec<Scene>,
}

pub trait ScriptGenerator {
    fn generate(&self, topic: &str, scene_count: usize) -> ReelResult<Script>;
}

pub trait SpeechSynthesizer {
    /// Synthesize narration for `text` into an audio file at `out_path`.
    fn synthesize(&self, text: &str, out_path: &Path) -> ReelResult<()>;
}

pub trait Publisher {
    /// Upload the finished video; returns a platform identifier or URL.
    fn publish(&self, video: &Path, caption: &str) -> ReelResult<String>;
}

pub struct JobDeps<'a> {
    pub script: &'a dyn ScriptGenerator,
    pub speech: &'a dyn SpeechSynthesizer,
    pub primary_media: &'a dyn MediaProvider,
    pub secondary_media: Option<&'a dyn MediaProvider>,
    pub publisher: Option<&'a dyn Publisher>,
}

#[derive(Clone, Debug)]
pub struct JobConfig {
    pub topic: String,
    pub profile: OutputProfile,
    /// Parent of per-job working directories.
    pub work_root: PathBuf,
    pub output: PathBuf,
    pub motion_seed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct JobReport {
    pub output: PathBuf,
    pub srt_path: PathBuf,
    pub duration: f64,
    pub scenes: usize,
    pub assets: usize,
    pub published: Option<String>,
}

/// A job is not worth rendering below this much usable media; mostly-black
/// videos read as broken, not stylistic.
pub fn min_media_required(scene_count: usize) -> usize {
    (scene_count / 3).max(3)
}

/// Run one full generation job.
///
/// The working directory (`work_root/job_<epoch>_<pid>`) holds narration and
/// downloaded media. It is removed after a successful render and deliberately
/// left in place on failure so the inputs can be inspected.
#[tracing::instrument(skip_all, fields(topic = %cfg.topic, profile = cfg.profile.name))]
pub fn run_job(cfg: &JobConfig, deps: &JobDeps<'_>) -> ReelResult<JobReport> {
    let workdir = cfg.work_root.join(format!(
        "job_{}_{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        std::process::id()
    ));
    std::fs::create_dir_all(&workdir)
        .map_err(|e| ReelError::job(format!("create workdir '{}': {e}", workdir.display())))?;

    match execute(cfg, deps, &workdir) {
        Ok(report) => {
            if let Err(e) = std::fs::remove_dir_all(&workdir) {
                warn!(workdir = %workdir.display(), error = %e, "could not remove workdir");
            }
            Ok(report)
        }
        Err(e) => {
            info!(workdir = %workdir.display(), "job failed, workdir kept for inspection");
            Err(e)
        }
    }
}

fn execute(cfg: &JobConfig, deps: &JobDeps<'_>, workdir: &Path) -> ReelResult<JobReport> {
    let script = deps
        .script
        .generate(&cfg.topic, cfg.profile.scene_count)?;
    if script.scenes.is_empty() {
        return Err(ReelError::job("script generator returned no scenes"));
    }
    info!(scenes = script.scenes.len(), "script ready");

    let narration: Vec<&str> = script.scenes.iter().map(|s| s.text.as_str()).collect();
    let audio_path = workdir.join("narration.wav");
    deps.speech.synthesize(&narration.join(" "), &audio_path)?;

    let acquirer = Acquirer::new(
        deps.primary_media,
        deps.secondary_media,
        workdir.join("media"),
        script.style.clone(),
    );
    let mut state = AcquisitionState::new();
    let files = acquirer.acquire_all(&script.scenes, &script.topic, &mut state)?;

    let mut assets = Vec::with_capacity(files.len());
    for file in &files {
        match MediaAsset::probe(file) {
            Ok(asset) => assets.push(asset),
            Err(e) => warn!(file = %file.display(), error = %e, "dropping unprobeable asset"),
        }
    }
    let needed = min_media_required(script.scenes.len());
    if assets.len() < needed {
        return Err(ReelError::job(format!(
            "only {} usable media assets for {} scenes, need at least {needed}",
            assets.len(),
            script.scenes.len()
        )));
    }

    let settings = CompositionSettings {
        width: cfg.profile.width,
        height: cfg.profile.height,
        fps: cfg.profile.fps,
        motion_seed: cfg.motion_seed,
        ..CompositionSettings::default()
    };
    let report = compose::compose_video(
        &script.scenes,
        &assets,
        &audio_path,
        &cfg.output,
        &settings,
    )?;

    let published = match deps.publisher {
        Some(publisher) => Some(publisher.publish(&report.output, &cfg.topic)?),
        None => None,
    };

    Ok(JobReport {
        output: report.output,
        srt_path: report.srt_path,
        duration: report.duration,
        scenes: script.scenes.len(),
        assets: assets.len(),
        published,
    })
}
