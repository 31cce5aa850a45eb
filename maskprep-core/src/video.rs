//! Video decoding and frame sampling via FFmpeg.
//!
//! Frames are decoded in order and counted from zero; the frames picked by
//! a [`SamplingPlan`] are converted to RGB and written to disk.

use ffmpeg_next as ffmpeg;
use image::RgbImage;
use log::info;
use std::path::Path;

use crate::error::{Error, Result};
use crate::sampling::{
    sample_frames, validate_video_path, FrameFormat, SampleReport, SamplingPlan,
};

/// Decodes a video file frame by frame into RGB images.
pub struct VideoReader {
    input_ctx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    scaler: ffmpeg::software::scaling::Context,
    frames_read: u64,
    eof_sent: bool,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init()?;

        let input_ctx = ffmpeg::format::input(&path)?;
        let (stream_index, parameters) = {
            let stream = input_ctx
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| Error::InvalidVideo {
                    path: path.to_path_buf(),
                    reason: "has no video stream".to_string(),
                })?;
            (stream.index(), stream.parameters())
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;

        let (width, height) = (decoder.width(), decoder.height());
        info!("Opened {}: {}x{}", path.display(), width, height);

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            input_ctx,
            decoder,
            stream_index,
            scaler,
            frames_read: 0,
            eof_sent: false,
        })
    }

    /// Number of frames returned so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Next decoded frame, or `None` at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match receive_status(self.decoder.receive_frame(&mut decoded))? {
                Receive::Frame => {
                    let image = self.convert_frame(&decoded)?;
                    self.frames_read += 1;
                    return Ok(Some(image));
                }
                Receive::Drained => return Ok(None),
                Receive::NeedInput if self.eof_sent => return Ok(None),
                Receive::NeedInput => {}
            }

            match self.next_packet() {
                Some(packet) => self.decoder.send_packet(&packet)?,
                None => {
                    // Drain whatever the decoder still buffers.
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        let stream_index = self.stream_index;
        self.input_ctx
            .packets()
            .find(|(stream, _)| stream.index() == stream_index)
            .map(|(_, packet)| packet)
    }

    fn convert_frame(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RgbImage> {
        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler.run(decoded, &mut rgb)?;

        let (width, height) = (rgb.width(), rgb.height());
        let stride = rgb.stride(0);
        let row_len = width as usize * 3;
        let data = rgb.data(0);

        // Rows may be padded past width * 3.
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_len]);
        }
        RgbImage::from_raw(width, height, pixels).ok_or(Error::Video(ffmpeg::Error::InvalidData))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receive {
    Frame,
    /// Decoder wants another packet first.
    NeedInput,
    /// Fully flushed after EOF.
    Drained,
}

/// Sort a `receive_frame` result; decode errors other than EAGAIN/EOF
/// are passed on rather than read as end of stream.
fn receive_status(result: std::result::Result<(), ffmpeg::Error>) -> Result<Receive> {
    match result {
        Ok(()) => Ok(Receive::Frame),
        Err(ffmpeg::Error::Eof) => Ok(Receive::Drained),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
            Ok(Receive::NeedInput)
        }
        Err(e) => Err(e.into()),
    }
}

/// Sample one video into `save_dir` according to `plan`.
pub fn sample_video(
    video: &Path,
    plan: &SamplingPlan,
    format: FrameFormat,
    save_dir: &Path,
) -> Result<SampleReport> {
    validate_video_path(video)?;
    format.validate()?;

    let mut reader = VideoReader::open(video)?;
    let frames = std::iter::from_fn(|| reader.read_frame().transpose());
    sample_frames(frames, video, plan, format, save_dir)
}
