//! Remote photo inspection intake
//!
//! Accepts geo-tagged photos, checks the file is a recognised image and
//! keeps a record of everything uploaded in this process.

use async_trait::async_trait;
use openpermit_core::effects::{GeoPoint, MediaError, MediaStore, StoredMedia};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::info;

const SIGNATURE_LEN: usize = 12;

/// Image formats accepted for inspections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// JPEG
    Jpeg,
    /// PNG
    Png,
    /// GIF87a / GIF89a
    Gif,
    /// Windows bitmap
    Bmp,
    /// TIFF, either byte order
    Tiff,
    /// WebP
    Webp,
}

impl ImageFormat {
    /// Identify a format from the first bytes of a file
    pub fn sniff(header: &[u8]) -> Option<Self> {
        match header {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'B', b'M', ..] => Some(Self::Bmp),
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(Self::Tiff),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    /// Lower-case format name
    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
        }
    }
}

/// Photo inspection API
#[derive(Debug, Default)]
pub struct PhotoInspection {
    records: Mutex<Vec<StoredMedia>>,
}

impl PhotoInspection {
    /// Create an intake with no records
    pub fn new() -> Self {
        Self::default()
    }

    /// Every photo accepted so far
    pub fn records(&self) -> Vec<StoredMedia> {
        self.records.lock().clone()
    }

    // Vision model inference is not wired in yet; analysis stays null.
    fn analyse(_path: &Path) -> Value {
        Value::Null
    }
}

#[async_trait]
impl MediaStore for PhotoInspection {
    async fn upload_photo(
        &self,
        path: &Path,
        lat: f64,
        lon: f64,
    ) -> Result<StoredMedia, MediaError> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(MediaError::Io(e.to_string())),
        };

        let mut header = Vec::with_capacity(SIGNATURE_LEN);
        (&mut file)
            .take(SIGNATURE_LEN as u64)
            .read_to_end(&mut header)
            .await
            .map_err(|e| MediaError::Io(e.to_string()))?;

        let format = ImageFormat::sniff(&header)
            .ok_or_else(|| MediaError::UnsupportedFormat(path.to_path_buf()))?;

        let record = StoredMedia {
            stored_path: path.to_path_buf(),
            location: GeoPoint { lat, lon },
            analysis: json!({
                "validation": { "valid": true, "format": format.name() },
                "ai": Self::analyse(path),
            }),
        };
        self.records.lock().push(record.clone());
        info!(path = %path.display(), format = format.name(), lat, lon, "Accepted inspection photo");
        Ok(record)
    }
}
