//! Animated GIF sink.
//!
//! Frames are queued as they arrive. On [`FrameSink::finish`] palette
//! quantization runs on a pool of blocking workers, then the quantized
//! frames are assembled in order into one looping GIF. The whole encode is
//! bounded by a timeout.

use std::time::Duration;

use async_trait::async_trait;
use clipweave_common::config::GifEncoderConfig;
use clipweave_common::error::{ClipweaveError, ClipweaveResult};
use clipweave_sequence_model::settings::{ExportSettings, MediaType};
use image::RgbaImage;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::capture::FrameSink;
use crate::progress::{ProgressReporter, ENCODE_BAND};
use crate::schedule::FrameSlot;

/// Share of the encode band spent quantizing; assembly takes the rest.
const QUANTIZE_SHARE: f64 = 0.9;

/// Per-frame delay in milliseconds for `fps`.
pub fn frame_delay_ms(fps: u32) -> u32 {
    (1000.0 / fps.max(1) as f64).round() as u32
}

/// GIF frame delays are stored in centiseconds; never zero.
pub fn frame_delay_cs(fps: u32) -> u16 {
    let cs = (frame_delay_ms(fps) as f64 / 10.0).round() as u16;
    cs.max(1)
}

/// Queues frames and encodes them into an animated GIF.
#[derive(Debug)]
pub struct GifSink {
    width: u16,
    height: u16,
    delay_cs: u16,
    workers: usize,
    quantize_speed: i32,
    timeout: Duration,
    frames: Vec<RgbaImage>,
}

impl GifSink {
    pub fn new(config: &GifEncoderConfig, timeout: Duration) -> Self {
        Self {
            width: 0,
            height: 0,
            delay_cs: 1,
            workers: config.worker_count(),
            quantize_speed: config.quantize_speed.clamp(1, 30),
            timeout,
            frames: Vec::new(),
        }
    }

    /// Number of frames queued so far.
    pub fn queued(&self) -> usize {
        self.frames.len()
    }

    async fn encode(&mut self, progress: &mut ProgressReporter) -> ClipweaveResult<Vec<u8>> {
        let frames = std::mem::take(&mut self.frames);
        let total = frames.len();
        if total == 0 {
            return Err(ClipweaveError::encode("no frames to encode"));
        }

        let (width, height, delay, speed) =
            (self.width, self.height, self.delay_cs, self.quantize_speed);
        let workers = self.workers.clamp(1, total);
        let chunk_size = total.div_ceil(workers);

        tracing::debug!(frames = total, workers, delay_cs = delay, "Quantizing GIF frames");

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut set = JoinSet::new();
        let mut indexed = frames.into_iter().enumerate().peekable();
        while indexed.peek().is_some() {
            let chunk: Vec<(usize, RgbaImage)> = indexed.by_ref().take(chunk_size).collect();
            let tx = tx.clone();
            set.spawn_blocking(move || {
                chunk
                    .into_iter()
                    .map(|(index, image)| {
                        let mut rgba = image.into_raw();
                        let mut frame =
                            gif::Frame::from_rgba_speed(width, height, &mut rgba, speed);
                        frame.delay = delay;
                        let _ = tx.send(());
                        (index, frame)
                    })
                    .collect::<Vec<_>>()
            });
        }
        drop(tx);

        let mut quantized = 0usize;
        while rx.recv().await.is_some() {
            quantized += 1;
            progress.report_in(ENCODE_BAND, QUANTIZE_SHARE * quantized as f64 / total as f64);
        }

        let mut ordered = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            let frames = joined
                .map_err(|e| ClipweaveError::encode(format!("GIF quantization worker failed: {e}")))?;
            ordered.extend(frames);
        }
        ordered.sort_by_key(|(index, _)| *index);

        let bytes = tokio::task::spawn_blocking(move || assemble(width, height, ordered))
            .await
            .map_err(|e| ClipweaveError::encode(format!("GIF assembly worker failed: {e}")))??;

        progress.report_in(ENCODE_BAND, 1.0);
        Ok(bytes)
    }
}

fn assemble(
    width: u16,
    height: u16,
    frames: Vec<(usize, gif::Frame<'static>)>,
) -> ClipweaveResult<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut bytes, width, height, &[])
            .map_err(|e| ClipweaveError::encode(format!("GIF header write failed: {e}")))?;
        encoder
            .set_repeat(gif::Repeat::Infinite)
            .map_err(|e| ClipweaveError::encode(format!("GIF loop extension failed: {e}")))?;
        for (_, frame) in &frames {
            encoder
                .write_frame(frame)
                .map_err(|e| ClipweaveError::encode(format!("GIF frame write failed: {e}")))?;
        }
    }
    Ok(bytes)
}

#[async_trait]
impl FrameSink for GifSink {
    fn name(&self) -> &str {
        "gif"
    }

    fn media_type(&self) -> MediaType {
        MediaType::ImageGif
    }

    async fn begin(&mut self, settings: &ExportSettings, total_frames: u64) -> ClipweaveResult<()> {
        let dims = (u16::try_from(settings.width), u16::try_from(settings.height));
        let (Ok(width), Ok(height)) = dims else {
            return Err(ClipweaveError::invalid_settings(
                "gif dimensions must not exceed 65535",
            ));
        };
        self.width = width;
        self.height = height;
        self.delay_cs = frame_delay_cs(settings.fps);
        self.frames = Vec::with_capacity(total_frames.min(1 << 16) as usize);
        Ok(())
    }

    async fn accept(&mut self, frame: &RgbaImage, _slot: &FrameSlot) -> ClipweaveResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    async fn finish(&mut self, progress: &mut ProgressReporter) -> ClipweaveResult<Vec<u8>> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.encode(progress)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout_secs = timeout.as_secs(), "GIF encoding timed out");
                Err(ClipweaveError::EncodeTimeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn abort(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipweave_sequence_model::settings::ExportFormat;
    use image::Rgba;

    #[test]
    fn test_frame_delay() {
        assert_eq!(frame_delay_ms(30), 33);
        assert_eq!(frame_delay_cs(30), 3);
        assert_eq!(frame_delay_ms(10), 100);
        assert_eq!(frame_delay_cs(10), 10);
        assert_eq!(frame_delay_cs(24), 4);
        // 1000 fps would round to zero centiseconds.
        assert_eq!(frame_delay_cs(1000), 1);
    }

    fn slot(index: u64) -> FrameSlot {
        FrameSlot {
            index,
            global_time: index as f64 / 10.0,
            clip_index: 0,
            relative_time: index as f64 / 10.0,
            local_time: index as f64 / 10.0,
        }
    }

    fn entered_encoding_reporter() -> ProgressReporter {
        let mut reporter = ProgressReporter::new(ExportFormat::Gif, None);
        for stage in [
            crate::state::ExportStage::Initializing,
            crate::state::ExportStage::Rendering,
            crate::state::ExportStage::Encoding,
        ] {
            reporter.enter(stage).unwrap();
        }
        reporter
    }

    #[tokio::test]
    async fn test_encodes_frames_in_order() {
        let config = GifEncoderConfig {
            workers: 3,
            quantize_speed: 30,
        };
        let mut sink = GifSink::new(&config, Duration::from_secs(30));
        let settings = ExportSettings::new(8, 6, 10, ExportFormat::Gif, 80);
        sink.begin(&settings, 7).await.unwrap();

        for i in 0..7u8 {
            let frame = RgbaImage::from_pixel(8, 6, Rgba([i * 30, 0, 255 - i * 30, 255]));
            sink.accept(&frame, &slot(i as u64)).await.unwrap();
        }
        assert_eq!(sink.queued(), 7);

        let mut reporter = entered_encoding_reporter();
        let bytes = sink.finish(&mut reporter).await.unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");
        assert_eq!(reporter.last_percent(), 100.0);

        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let mut decoder = options.read_info(bytes.as_slice()).unwrap();
        assert_eq!((decoder.width(), decoder.height()), (8, 6));

        let mut reds = Vec::new();
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            assert_eq!(frame.delay, 10);
            reds.push(frame.buffer[0]);
        }
        assert_eq!(reds.len(), 7);
        assert!(reds.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_rejects_oversized_dimensions() {
        let mut sink = GifSink::new(&GifEncoderConfig::default(), Duration::from_secs(1));
        let settings = ExportSettings::new(70_000, 10, 10, ExportFormat::Gif, 80);
        assert!(sink.begin(&settings, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_queue_is_an_encode_error() {
        let mut sink = GifSink::new(&GifEncoderConfig::default(), Duration::from_secs(1));
        let settings = ExportSettings::new(4, 4, 10, ExportFormat::Gif, 80);
        sink.begin(&settings, 0).await.unwrap();

        let mut reporter = entered_encoding_reporter();
        let err = sink.finish(&mut reporter).await.unwrap_err();
        assert!(matches!(err, ClipweaveError::Encode { .. }));
    }

    #[tokio::test]
    async fn test_zero_timeout_surfaces_encode_timeout() {
        let mut sink = GifSink::new(&GifEncoderConfig::default(), Duration::ZERO);
        let settings = ExportSettings::new(256, 256, 10, ExportFormat::Gif, 80);
        sink.begin(&settings, 8).await.unwrap();
        for i in 0..8 {
            let frame = RgbaImage::from_fn(256, 256, |x, y| Rgba([x as u8, y as u8, i as u8, 255]));
            sink.accept(&frame, &slot(i)).await.unwrap();
        }

        let mut reporter = entered_encoding_reporter();
        let err = sink.finish(&mut reporter).await.unwrap_err();
        assert!(matches!(err, ClipweaveError::EncodeTimeout { timeout_secs: 0 }));
    }
}
