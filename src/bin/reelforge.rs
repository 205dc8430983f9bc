use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use reelforge::{
    CompositionSettings, Scene,
    captions,
    compose::BlurSettings,
    job::profile_or_default,
    media::{MediaAsset, validate::validate_media_file},
};

#[derive(Parser, Debug)]
#[command(name = "reelforge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a narrated video from a script, an audio track, and a media
    /// directory (requires `ffmpeg` on PATH).
    Compose(ComposeArgs),
    /// Generate an SRT caption file from narration text.
    Captions(CaptionsArgs),
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Script JSON: an array of scenes, each a string or `{text, search_term}`.
    #[arg(long)]
    script: PathBuf,

    /// Narration audio file; its duration drives the whole timeline.
    #[arg(long)]
    audio: PathBuf,

    /// Directory of media files to cycle across scenes.
    #[arg(long)]
    media: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Output profile name (short, reels, tiktok, story, youtube, youtube_hd, square).
    #[arg(long, default_value = "short")]
    profile: String,

    /// Pin motion-effect selection for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Skip caption burn-in (the SRT sidecar is still written).
    #[arg(long)]
    no_captions: bool,

    /// Disable the blurred-background treatment for small sources.
    #[arg(long)]
    no_blur: bool,
}

#[derive(Parser, Debug)]
struct CaptionsArgs {
    /// Plain text file with the narration.
    #[arg(long)]
    text: PathBuf,

    /// Total narration duration in seconds.
    #[arg(long)]
    duration: f64,

    /// Output SRT path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Compose(args) => cmd_compose(args),
        Command::Captions(args) => cmd_captions(args),
    }
}

fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    let profile = profile_or_default(&args.profile);

    let script_json = std::fs::read_to_string(&args.script)
        .with_context(|| format!("read script '{}'", args.script.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&script_json).context("parse script JSON")?;
    let scenes = Scene::parse_script(&value)?;

    let assets = load_media_dir(&args.media)?;

    let settings = CompositionSettings {
        width: profile.width,
        height: profile.height,
        fps: profile.fps,
        burn_captions: !args.no_captions,
        blur: BlurSettings {
            enabled: !args.no_blur,
            ..BlurSettings::default()
        },
        motion_seed: args.seed,
        ..CompositionSettings::default()
    };

    let report = reelforge::compose_video(&scenes, &assets, &args.audio, &args.out, &settings)?;
    eprintln!(
        "wrote {} ({} frames, {:.2}s) and {}",
        report.output.display(),
        report.frames,
        report.duration,
        report.srt_path.display()
    );
    Ok(())
}

fn cmd_captions(args: CaptionsArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.text)
        .with_context(|| format!("read narration '{}'", args.text.display()))?;
    let chunks = captions::allocate_captions(
        &text,
        args.duration,
        captions::timing::DEFAULT_WORDS_PER_CHUNK,
    )?;
    captions::write_srt(&chunks, &args.out)?;
    eprintln!("wrote {} ({} captions)", args.out.display(), chunks.len());
    Ok(())
}

/// Every valid, probeable media file in a directory, in name order so runs
/// are deterministic.
fn load_media_dir(dir: &Path) -> anyhow::Result<Vec<MediaAsset>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read media dir '{}'", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut assets = Vec::new();
    for path in paths {
        if !validate_media_file(&path) {
            eprintln!("skipping invalid media file {}", path.display());
            continue;
        }
        match MediaAsset::probe(&path) {
            Ok(asset) => assets.push(asset),
            Err(e) => eprintln!("skipping {}: {e}", path.display()),
        }
    }
    anyhow::ensure!(!assets.is_empty(), "no usable media in '{}'", dir.display());
    Ok(assets)
}
