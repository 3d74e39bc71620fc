use crate::encode::sink::{ArtifactAssembler, AudioTrack, validate_frames};
use crate::foundation::core::Fps;
use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::frame::Frame;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Options for [`FfmpegAssembler`] MP4 output.
#[derive(Clone, Debug)]
pub struct FfmpegAssemblerOpts {
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    /// Output frame rate.
    pub fps: Fps,
}

impl FfmpegAssemblerOpts {
    /// Create options for outputting an MP4 to `out_path` at the default frame rate.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            fps: Fps::default(),
        }
    }
}

/// Assembler that spawns the system `ffmpeg` and streams raw RGB frames to stdin.
///
/// Output is H.264 `yuv420p`, so frame width and height must be even.
pub struct FfmpegAssembler {
    opts: FfmpegAssemblerOpts,
}

impl FfmpegAssembler {
    /// Create a new assembler that streams into `ffmpeg`.
    pub fn new(opts: FfmpegAssemblerOpts) -> Self {
        Self { opts }
    }
}

impl ArtifactAssembler for FfmpegAssembler {
    #[tracing::instrument(
        skip_all,
        fields(frames = frames.len(), out = %self.opts.out_path.display())
    )]
    fn assemble(
        &mut self,
        frames: &[Frame],
        audio: Option<&AudioTrack>,
    ) -> HeadcastResult<PathBuf> {
        let (width, height) = validate_frames(frames)?;
        let mut pipe = FfmpegPipe::begin(&self.opts, width, height, audio)?;
        for frame in frames {
            if let Err(e) = pipe.push(frame) {
                // Reap the child so a failed write does not leave a zombie behind.
                let _ = pipe.end();
                return Err(e);
            }
        }
        pipe.end()?;
        tracing::info!("assembled video artifact");
        Ok(self.opts.out_path.clone())
    }
}

struct FfmpegPipe {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegPipe {
    fn begin(
        opts: &FfmpegAssemblerOpts,
        width: u32,
        height: u32,
        audio: Option<&AudioTrack>,
    ) -> HeadcastResult<Self> {
        if opts.fps.num == 0 || opts.fps.den == 0 {
            return Err(HeadcastError::assembly("fps must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(HeadcastError::assembly(
                "ffmpeg width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        ensure_parent_dir(&opts.out_path)?;
        if !opts.overwrite && opts.out_path.exists() {
            return Err(HeadcastError::assembly(format!(
                "output file '{}' already exists",
                opts.out_path.display()
            )));
        }
        if let Some(audio) = audio
            && !audio.path().exists()
        {
            return Err(HeadcastError::assembly(format!(
                "audio file '{}' does not exist",
                audio.path().display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(HeadcastError::assembly(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if opts.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{width}x{height}"),
        ]);
        push_input_fps(&mut cmd, opts.fps);
        cmd.args(["-i", "pipe:0"]);
        push_audio_args(&mut cmd, audio)?;
        cmd.arg(&opts.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            HeadcastError::assembly(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HeadcastError::assembly("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| HeadcastError::assembly("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
        })
    }

    fn push(&mut self, frame: &Frame) -> HeadcastResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(HeadcastError::assembly("ffmpeg pipe is already finalized"));
        };
        let rgb = frame.image().to_rgb8();

        use std::io::Write as _;
        stdin.write_all(&rgb).map_err(|e| {
            HeadcastError::assembly(format!("failed to write frame to ffmpeg stdin: {e}"))
        })
    }

    fn end(&mut self) -> HeadcastResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| HeadcastError::assembly("ffmpeg pipe not started"))?;

        let status = child.wait().map_err(|e| {
            HeadcastError::assembly(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| HeadcastError::assembly("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| HeadcastError::assembly(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(HeadcastError::assembly(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, `-r` goes before `-i`.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

fn push_audio_args(cmd: &mut Command, audio: Option<&AudioTrack>) -> HeadcastResult<()> {
    match audio {
        None => {
            cmd.args([
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
            return Ok(());
        }
        Some(AudioTrack::File(path)) => {
            cmd.arg("-i").arg(path);
        }
        Some(AudioTrack::RawF32le {
            path,
            sample_rate,
            channels,
        }) => {
            if *sample_rate == 0 {
                return Err(HeadcastError::assembly("audio sample_rate must be non-zero"));
            }
            if *channels == 0 {
                return Err(HeadcastError::assembly("audio channels must be non-zero"));
            }
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &sample_rate.to_string(),
                "-ac",
                &channels.to_string(),
                "-i",
            ])
            .arg(path);
        }
    }
    cmd.args([
        "-map",
        "0:v:0",
        "-map",
        "1:a:0",
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-shortest",
        "-movflags",
        "+faststart",
    ]);
    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> HeadcastResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
