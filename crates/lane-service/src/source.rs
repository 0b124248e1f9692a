//! Per-camera frame sources.
//!
//! A source hands out decoded RGB frames one at a time. The processing loop
//! owns each source exclusively and drops it when the camera leaves the
//! active window.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

#[async_trait]
pub trait FrameSource: Send {
    /// Next decoded frame, `None` once the stream has ended
    async fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Resolves a camera id to a fresh frame source
pub trait FrameSourceFactory: Send + Sync {
    fn open(&self, camera_id: &str) -> Result<Box<dyn FrameSource>>;
}

/// Opens `<video_dir>/<camera id>.<extension>` through ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegSourceFactory {
    video_dir: PathBuf,
    extension: String,
}

impl FfmpegSourceFactory {
    pub fn new(video_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            video_dir: video_dir.into(),
            extension: extension.into(),
        }
    }

    pub fn path_for(&self, camera_id: &str) -> PathBuf {
        self.video_dir
            .join(format!("{}.{}", camera_id, self.extension))
    }
}

impl FrameSourceFactory for FfmpegSourceFactory {
    fn open(&self, camera_id: &str) -> Result<Box<dyn FrameSource>> {
        let path = self.path_for(camera_id);
        if !path.is_file() {
            anyhow::bail!("no media for camera '{}' at {}", camera_id, path.display());
        }
        Ok(Box::new(FfmpegSource::new(path)))
    }
}

struct Decoder {
    // held so the child is reaped (and killed) with the source
    _child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

/// Raw RGB24 frames piped out of an `ffmpeg` child process.
///
/// The process is spawned lazily on the first read and killed when the
/// source is dropped.
pub struct FfmpegSource {
    path: PathBuf,
    decoder: Option<Decoder>,
    finished: bool,
}

impl FfmpegSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            decoder: None,
            finished: false,
        }
    }

    async fn start(path: &Path) -> Result<Decoder> {
        let source = path.to_string_lossy();
        let (width, height) = probe_dimensions(&source).await?;

        let mut child = Command::new("ffmpeg")
            .args([
                "-loglevel",
                "error",
                "-i",
                source.as_ref(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn ffmpeg")?;

        let stdout = child
            .stdout
            .take()
            .context("ffmpeg stdout was not captured")?;

        info!(source = %source, width, height, "started ffmpeg decoder");
        Ok(Decoder {
            _child: child,
            stdout,
            width,
            height,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        if self.decoder.is_none() {
            match Self::start(&self.path).await {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(e) => {
                    // unreadable media stays unreadable; report it once
                    self.finished = true;
                    return Err(e);
                }
            }
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        let (width, height) = (decoder.width, decoder.height);

        let mut buf = vec![0u8; width as usize * height as usize * 3];
        match decoder.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(source = %self.path.display(), "ffmpeg stream ended");
                self.finished = true;
                self.decoder = None;
                return Ok(None);
            }
            Err(e) => return Err(e).context("failed to read frame from ffmpeg"),
        }

        RgbImage::from_raw(width, height, buf)
            .map(Some)
            .context("decoded frame does not match probed dimensions")
    }
}

/// Width and height of the first video stream, via ffprobe
pub async fn probe_dimensions(source: &str) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0",
            source,
        ])
        .output()
        .await
        .context("failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed on {}: {:?}", source, output.status);
    }

    let text = String::from_utf8(output.stdout).context("ffprobe output is not valid UTF-8")?;
    parse_dimensions(&text)
}

fn parse_dimensions(text: &str) -> Result<(u32, u32)> {
    let line = text.lines().next().unwrap_or_default().trim();
    let mut parts = line.split(',').map(str::trim).filter(|p| !p.is_empty());

    let (Some(width), Some(height), None) = (parts.next(), parts.next(), parts.next()) else {
        anyhow::bail!("unexpected ffprobe output format: {:?}", text);
    };

    let width: u32 = width.parse().context("failed to parse width")?;
    let height: u32 = height.parse().context("failed to parse height")?;
    if width == 0 || height == 0 {
        anyhow::bail!("ffprobe reported an empty frame size {}x{}", width, height);
    }
    Ok((width, height))
}
