//! # Local media storage
//!
//! Stores uploads on the local filesystem under
//! `<root>/images/<kind>/YYYY/MM/DD/<name>.<ext>` and hands back the path
//! relative to `root` as the reference.

use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::slug::slugify;
use domains::validation::image_extension;
use domains::{DomainError, MediaKind, MediaStorage, MediaUpload, Result};
use image::{ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("`{0}` is not a readable image")]
    NotAnImage(String),

    #[error("image format {0:?} is not accepted")]
    Format(ImageFormat),

    #[error("media i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for DomainError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotAnImage(_) | MediaError::Format(_) => {
                DomainError::validation("file", err.to_string())
            }
            MediaError::Io(_) => DomainError::Storage(err.to_string()),
        }
    }
}

pub struct LocalMediaStorage {
    /// Root directory for all uploads (e.g., "./data/media")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/media")
    url_prefix: String,
}

impl LocalMediaStorage {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix,
        }
    }

    /// Reads just enough of the upload to know it is an image in one of the
    /// accepted formats.
    fn check_image(upload: &MediaUpload) -> std::result::Result<(), MediaError> {
        let not_an_image = || MediaError::NotAnImage(upload.file_name.clone());
        let reader = ImageReader::new(Cursor::new(upload.data.as_ref()))
            .with_guessed_format()
            .map_err(|_| not_an_image())?;
        let format = reader.format().ok_or_else(not_an_image)?;
        if !ACCEPTED_FORMATS.contains(&format) {
            return Err(MediaError::Format(format));
        }
        reader.into_dimensions().map_err(|_| not_an_image())?;
        Ok(())
    }
}

fn content_tag(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..4])
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn store(&self, kind: MediaKind, upload: MediaUpload, at: DateTime<Utc>) -> Result<String> {
        // 1. Validate name and content
        let ext = image_extension(&upload.file_name)?;
        Self::check_image(&upload)?;

        let stem = upload
            .file_name
            .rsplit_once('.')
            .map_or(upload.file_name.as_str(), |(stem, _)| stem);
        let mut stem = slugify(stem);
        if stem.is_empty() {
            stem = "image".to_string();
        }

        // 2. Pick a free name in the day's directory
        let dir = format!("{}/{}", kind.directory(), at.format("%Y/%m/%d"));
        fs::create_dir_all(self.root_path.join(&dir))
            .await
            .map_err(MediaError::from)?;

        let mut reference = format!("{dir}/{stem}.{ext}");
        if fs::try_exists(self.root_path.join(&reference))
            .await
            .map_err(MediaError::from)?
        {
            reference = format!("{dir}/{stem}_{}.{ext}", content_tag(&upload.data));
            if fs::try_exists(self.root_path.join(&reference))
                .await
                .map_err(MediaError::from)?
            {
                debug!(%reference, "identical upload already stored");
                return Ok(reference);
            }
        }

        // 3. Write
        fs::write(self.root_path.join(&reference), &upload.data)
            .await
            .map_err(MediaError::from)?;
        debug!(%reference, bytes = upload.data.len(), "media stored");
        Ok(reference)
    }

    fn url_for(&self, reference: &str) -> String {
        format!("{}/{}", self.url_prefix.trim_end_matches('/'), reference)
    }
}
