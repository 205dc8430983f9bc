use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use tracing::warn;

use crate::{
    compose::frame::Frame,
    error::{ReelError, ReelResult},
};

/// Canonical sample rate for narration audio. Mismatched rates have been
/// observed to desynchronize playback speed from the intended narration pace,
/// so everything is resampled here before composition.
pub const NARRATION_SAMPLE_RATE: u32 = 44_100;

/// Per-call cap on ffprobe wall time.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
}

impl VideoStreamInfo {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    tool_responds("ffmpeg")
}

pub fn is_ffprobe_on_path() -> bool {
    tool_responds("ffprobe")
}

fn tool_responds(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Probe the first video stream of a container via ffprobe.
pub fn probe_video_stream(path: &Path) -> ReelResult<VideoStreamInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_streams",
        "-show_format",
    ])
    .arg(path);
    let stdout = run_probe(cmd, path)?;

    let parsed: ProbeOut = serde_json::from_slice(&stdout)
        .map_err(|e| ReelError::media(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ReelError::media(format!("no video stream in '{}'", path.display())))?;
    let width = video
        .width
        .ok_or_else(|| ReelError::media("missing video width from ffprobe"))?;
    let height = video
        .height
        .ok_or_else(|| ReelError::media("missing video height from ffprobe"))?;
    let (fps_num, fps_den) =
        parse_ratio(video.r_frame_rate.as_deref().unwrap_or("0/1")).unwrap_or((0, 1));
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoStreamInfo {
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
    })
}

/// Total duration of an audio file in seconds.
pub fn audio_duration(path: &Path) -> ReelResult<f64> {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(path);
    let stdout = run_probe(cmd, path)?;
    let text = String::from_utf8_lossy(&stdout);
    text.trim()
        .parse::<f64>()
        .map_err(|_| ReelError::media(format!("unreadable audio duration for '{}'", path.display())))
}

/// Sample rate of the first audio stream, or `None` if it cannot be read.
pub fn audio_sample_rate(path: &Path) -> Option<u32> {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-select_streams",
        "a:0",
        "-show_entries",
        "stream=sample_rate",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(path);
    let stdout = run_probe(cmd, path).ok()?;
    String::from_utf8_lossy(&stdout).trim().parse::<u32>().ok()
}

/// Narration audio handle for the encoder. When normalization had to write a
/// resampled copy, that copy is an intermediate and is deleted when the
/// handle drops; a caller's original file is never touched.
#[derive(Debug)]
pub struct NormalizedAudio {
    path: PathBuf,
    owned: bool,
}

impl NormalizedAudio {
    fn original(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            owned: false,
        }
    }

    fn resampled(path: PathBuf) -> Self {
        Self { path, owned: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NormalizedAudio {
    fn drop(&mut self) {
        if self.owned {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "could not remove resampled audio");
            }
        }
    }
}

/// Resample narration audio to the canonical rate as stereo PCM WAV.
///
/// Returns a handle to the original file when the rate already matches or
/// when resampling fails; normalization is a best-effort correctness pass,
/// not a gate.
pub fn normalize_audio(path: &Path, target_rate: u32) -> NormalizedAudio {
    match audio_sample_rate(path) {
        Some(rate) if rate == target_rate => return NormalizedAudio::original(path),
        Some(rate) => {
            tracing::info!(from = rate, to = target_rate, "resampling narration audio")
        }
        None => warn!(
            path = %path.display(),
            "could not read narration sample rate, resampling anyway"
        ),
    }

    let normalized = path.with_extension("normalized.wav");
    let out = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-i"])
        .arg(path)
        .args(["-ar", &target_rate.to_string(), "-ac", "2", "-acodec", "pcm_s16le"])
        .arg(&normalized)
        .output();

    match out {
        Ok(out) if out.status.success() && normalized.exists() => {
            NormalizedAudio::resampled(normalized)
        }
        Ok(out) => {
            warn!(
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "audio resample failed, keeping original"
            );
            NormalizedAudio::original(path)
        }
        Err(e) => {
            warn!(error = %e, "could not run ffmpeg for audio resample, keeping original");
            NormalizedAudio::original(path)
        }
    }
}

/// Decode up to `max_frames` frames from a video, sampled at `sample_fps` and
/// scaled to `width x height`, as straight-alpha RGBA8.
pub fn decode_video_frames(
    path: &Path,
    width: u32,
    height: u32,
    sample_fps: f64,
    max_frames: u32,
) -> ReelResult<Vec<Frame>> {
    if max_frames == 0 {
        return Ok(Vec::new());
    }

    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vf",
            &format!("fps={sample_fps:.4},scale={width}:{height}"),
            "-frames:v",
            &max_frames.to_string(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| ReelError::media(format!("failed to run ffmpeg for video decode: {e}")))?;

    if !out.status.success() {
        return Err(ReelError::media(format!(
            "ffmpeg video decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let frame_len = width as usize * height as usize * 4;
    if frame_len == 0 || out.stdout.len() < frame_len {
        return Err(ReelError::media(format!(
            "ffmpeg produced no full frames for '{}'",
            path.display()
        )));
    }

    let mut frames = Vec::with_capacity(out.stdout.len() / frame_len);
    for chunk in out.stdout.chunks_exact(frame_len) {
        frames.push(Frame::new(width, height, chunk.to_vec())?);
    }
    Ok(frames)
}

/// Pull a single representative frame out of a (possibly damaged) container.
/// Used as the second rung of the normalizer's fallback ladder.
pub fn extract_representative_frame(path: &Path) -> ReelResult<Frame> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-frames:v", "1", "-f", "image2", "-c:v", "png", "pipe:1"])
        .output()
        .map_err(|e| ReelError::media(format!("failed to run ffmpeg for frame extract: {e}")))?;

    if !out.status.success() || out.stdout.is_empty() {
        return Err(ReelError::media(format!(
            "could not extract a frame from '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let img = image::load_from_memory(&out.stdout)
        .map_err(|e| ReelError::media(format!("decode extracted frame: {e}")))?;
    Ok(Frame::from_rgba_image(img.to_rgba8()))
}

/// Run an ffprobe invocation with a wall-clock cap. ffprobe output is tiny,
/// so polling before reading stdout cannot deadlock on a full pipe.
fn run_probe(mut cmd: Command, subject: &Path) -> ReelResult<Vec<u8>> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| ReelError::media(format!("failed to run ffprobe: {e}")))?;

    let deadline = Instant::now() + PROBE_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ReelError::media(format!(
                        "ffprobe timed out for '{}'",
                        subject.display()
                    )));
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                return Err(ReelError::media(format!("ffprobe wait failed: {e}")));
            }
        }
    }

    let out = child
        .wait_with_output()
        .map_err(|e| ReelError::media(format!("ffprobe output read failed: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::media(format!(
            "ffprobe failed for '{}': {}",
            subject.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(out.stdout)
}

fn parse_ratio(s: &str) -> Option<(u32, u32)> {
    let (a, b) = s.split_once('/')?;
    let a = a.parse::<u32>().ok()?;
    let b = b.parse::<u32>().ok()?;
    if b == 0 { None } else { Some((a, b)) }
}
