// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page image sources: ordered image listing, content-file locations and
// luminance decoding for the detector.

use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::{debug, instrument};
use trennblatt_core::error::{Result, TrennblattError};

/// Ordered page images of one document.
pub trait ImageSource {
    /// Human-readable origin, used in error messages.
    fn describe(&self) -> String;

    /// Image identifiers in scan order.
    fn image_names(&self) -> Result<Vec<String>>;

    /// Location recorded as the page's content file.
    fn location(&self, name: &str) -> String;

    /// Raw encoded bytes of one image.
    fn read(&self, name: &str) -> Result<Vec<u8>>;
}

/// Images stored as files in one directory, ordered by file name.
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    root: PathBuf,
}

impl DirectoryImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageSource for DirectoryImageSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    #[instrument(skip_all, fields(root = %self.root.display()))]
    fn image_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // Hidden files (.DS_Store, editor swap files) are never pages.
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        debug!(count = names.len(), "images listed");
        Ok(names)
    }

    fn location(&self, name: &str) -> String {
        file_uri(&self.root.join(name))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        std::fs::read(self.root.join(name)).map_err(|e| TrennblattError::ImageRead {
            image: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// `file://` URI for an absolute path (`file:/` on Windows).
pub fn file_uri(path: &Path) -> String {
    if cfg!(windows) {
        format!("file:/{}", path.display())
    } else {
        format!("file://{}", path.display())
    }
}

/// Images held in memory, e.g. received from an upload.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageSource {
    base_location: String,
    images: Vec<(String, Vec<u8>)>,
}

impl MemoryImageSource {
    /// `base_location` is prefixed to each image name to form its location.
    pub fn new(base_location: impl Into<String>) -> Self {
        Self {
            base_location: base_location.into(),
            images: Vec::new(),
        }
    }

    /// Append an image after the existing ones.
    pub fn push(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.images.push((name.into(), bytes));
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageSource for MemoryImageSource {
    fn describe(&self) -> String {
        format!("in-memory images at {}", self.base_location)
    }

    fn image_names(&self) -> Result<Vec<String>> {
        Ok(self.images.iter().map(|(name, _)| name.clone()).collect())
    }

    fn location(&self, name: &str) -> String {
        format!("{}{}", self.base_location, name)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.images
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| TrennblattError::ImageRead {
                image: name.to_string(),
                reason: "no such image".into(),
            })
    }
}

/// Decode an encoded image (TIFF, PNG, JPEG, ...) into 8-bit luminance.
pub fn decode_luminance(name: &str, bytes: &[u8]) -> Result<GrayImage> {
    let image = image::load_from_memory(bytes).map_err(|e| TrennblattError::ImageRead {
        image: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(image.to_luma8())
}
