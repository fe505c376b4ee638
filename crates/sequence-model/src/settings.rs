//! Export settings and output media types.

use serde::{Deserialize, Serialize};

/// Output container/format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Gif,
    Mp4,
    Webm,
}

/// Media type tag attached to exported bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "video/mp4")]
    VideoMp4,
    #[serde(rename = "video/webm")]
    VideoWebm,
    #[serde(rename = "image/gif")]
    ImageGif,
}

/// Parameters of a single export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub fps: u32,
    /// Output format.
    pub format: ExportFormat,
    /// Quality in `[0, 100]`; higher spends more bits.
    pub quality: u8,
}

impl ExportFormat {
    pub fn media_type(self) -> MediaType {
        match self {
            ExportFormat::Gif => MediaType::ImageGif,
            ExportFormat::Mp4 => MediaType::VideoMp4,
            ExportFormat::Webm => MediaType::VideoWebm,
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Gif => "gif",
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Webm => "webm",
        }
    }

    /// Whether this is one of the encoded video formats.
    pub fn is_video(self) -> bool {
        matches!(self, ExportFormat::Mp4 | ExportFormat::Webm)
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gif" => Ok(ExportFormat::Gif),
            "mp4" => Ok(ExportFormat::Mp4),
            "webm" => Ok(ExportFormat::Webm),
            other => Err(format!("Unknown format: {other}. Use: gif, mp4, webm")),
        }
    }
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::VideoMp4 => "video/mp4",
            MediaType::VideoWebm => "video/webm",
            MediaType::ImageGif => "image/gif",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            format: ExportFormat::Mp4,
            quality: 80,
        }
    }
}

impl ExportSettings {
    pub fn new(width: u32, height: u32, fps: u32, format: ExportFormat, quality: u8) -> Self {
        Self {
            width,
            height,
            fps,
            format,
            quality,
        }
    }

    /// Check settings against the constraints of the chosen format.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be positive".to_string());
        }
        if self.fps == 0 {
            return Err("fps must be positive".to_string());
        }
        if self.quality > 100 {
            return Err(format!("quality must be within 0..=100, got {}", self.quality));
        }
        match self.format {
            ExportFormat::Mp4 | ExportFormat::Webm => {
                if self.width % 2 != 0 || self.height % 2 != 0 {
                    return Err(
                        "width/height must be even (required for yuv420p video output)".to_string(),
                    );
                }
            }
            ExportFormat::Gif => {
                if self.width > u16::MAX as u32 || self.height > u16::MAX as u32 {
                    return Err("gif dimensions must not exceed 65535".to_string());
                }
            }
        }
        Ok(())
    }
}
