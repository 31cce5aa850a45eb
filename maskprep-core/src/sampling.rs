//! Frame sampling: which frames of a video to keep and how to write them.
//!
//! Frames `start, start + interval, start + 2*interval, ...` are saved,
//! up to and including `end` when one is given. Output names follow
//! `<video-stem>_<frame>f_RAW.<ext>`.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::RgbImage;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;
pub const DEFAULT_PNG_COMPRESSION: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Compression level 0..=9.
    Png { compression: u8 },
    /// Quality 1..=100.
    Jpeg { quality: u8 },
}

impl FrameFormat {
    /// Parse "png", "jpeg" or "jpg" along with the level for that format.
    pub fn parse(name: &str, jpeg_quality: u8, png_compression: u8) -> Result<Self> {
        let format = match name.to_lowercase().as_str() {
            "png" => FrameFormat::Png {
                compression: png_compression,
            },
            "jpg" | "jpeg" => FrameFormat::Jpeg {
                quality: jpeg_quality,
            },
            other => {
                return Err(Error::InvalidSampling(format!(
                    "unknown image format '{}', expected png, jpeg or jpg",
                    other
                )))
            }
        };
        format.validate()?;
        Ok(format)
    }

    pub fn validate(self) -> Result<()> {
        match self {
            FrameFormat::Png { compression } if compression > 9 => Err(Error::InvalidSampling(
                format!("PNG compression level {} is outside 0..=9", compression),
            )),
            FrameFormat::Jpeg { quality } if quality == 0 || quality > 100 => {
                Err(Error::InvalidSampling(format!(
                    "JPEG quality {} is outside 1..=100",
                    quality
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Png { .. } => "png",
            FrameFormat::Jpeg { .. } => "jpg",
        }
    }
}

/// Map a 0..=9 level onto the PNG encoder's presets.
fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    interval: u64,
    start_frame: u64,
    end_frame: Option<u64>,
}

impl SamplingPlan {
    pub fn new(interval: u64, start_frame: u64, end_frame: Option<u64>) -> Result<Self> {
        if interval == 0 {
            return Err(Error::InvalidSampling(
                "sampling interval must be at least 1".to_string(),
            ));
        }
        if let Some(end) = end_frame {
            if end < start_frame {
                return Err(Error::InvalidSampling(format!(
                    "end frame {} is before start frame {}",
                    end, start_frame
                )));
            }
        }
        Ok(Self {
            interval,
            start_frame,
            end_frame,
        })
    }

    /// Negative end frame means the whole video, as on the command line.
    pub fn from_signed_end(interval: u64, start_frame: u64, end_frame: i64) -> Result<Self> {
        let end = u64::try_from(end_frame).ok();
        Self::new(interval, start_frame, end)
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn end_frame(&self) -> Option<u64> {
        self.end_frame
    }

    pub fn is_sampled(&self, index: u64) -> bool {
        index >= self.start_frame
            && (index - self.start_frame) % self.interval == 0
            && !self.is_past_end(index)
    }

    pub fn is_past_end(&self, index: u64) -> bool {
        self.end_frame.is_some_and(|end| index > end)
    }
}

/// `videos/run1.mp4`, frame 30, PNG -> `run1_30f_RAW.png`
pub fn frame_file_name(video: &Path, frame: u64, format: FrameFormat) -> String {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}f_RAW.{}", stem, frame, format.extension())
}

pub fn frame_path(save_dir: &Path, video: &Path, frame: u64, format: FrameFormat) -> PathBuf {
    save_dir.join(frame_file_name(video, frame, format))
}

/// Only existing `.mp4` files are sampled.
pub fn validate_video_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::InvalidVideo {
            path: path.to_path_buf(),
            reason: "cannot be found".to_string(),
        });
    }
    let is_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    if !is_mp4 {
        return Err(Error::InvalidVideo {
            path: path.to_path_buf(),
            reason: "is not a MP4 video".to_string(),
        });
    }
    Ok(())
}

pub fn write_frame(frame: &RgbImage, format: FrameFormat, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    match format {
        FrameFormat::Png { compression } => {
            let encoder =
                PngEncoder::new_with_quality(writer, png_compression(compression), FilterType::Adaptive);
            frame.write_with_encoder(encoder)?;
        }
        FrameFormat::Jpeg { quality } => {
            let encoder = JpegEncoder::new_with_quality(writer, quality);
            frame.write_with_encoder(encoder)?;
        }
    }
    Ok(())
}

/// Outcome of sampling one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleReport {
    pub video: PathBuf,
    pub saved: Vec<PathBuf>,
    /// Index of the last frame decoded, if any.
    pub last_frame: Option<u64>,
}

/// Walk decoded frames in order, numbering them from 0, and write the ones
/// `plan` selects into `save_dir`. Stops pulling frames once past the end
/// frame, so the rest of the video is never decoded.
pub fn sample_frames<I>(
    frames: I,
    video: &Path,
    plan: &SamplingPlan,
    format: FrameFormat,
    save_dir: &Path,
) -> Result<SampleReport>
where
    I: IntoIterator<Item = Result<RgbImage>>,
{
    let mut report = SampleReport {
        video: video.to_path_buf(),
        saved: Vec::new(),
        last_frame: None,
    };

    for (index, frame) in (0u64..).zip(frames) {
        let frame = frame?;
        report.last_frame = Some(index);

        if index % 100 == 0 {
            log::debug!("{}: {} frames decoded", video.display(), index + 1);
        }
        if plan.is_past_end(index) {
            break;
        }
        if !plan.is_sampled(index) {
            continue;
        }

        let path = frame_path(save_dir, video, index, format);
        write_frame(&frame, format, &path)?;
        log::info!("Saved frame {} of {} to {}", index, video.display(), path.display());
        report.saved.push(path);
    }

    log::info!(
        "Sampling finished for {} at frame {}",
        video.display(),
        report.last_frame.unwrap_or(0)
    );
    Ok(report)
}
