// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Barcode detection seam.
//
// Optical decoding is delegated to a `BarcodeDetector`. This module owns
// what happens around it: decoding the page image to luminance, filtering
// the detector's output by the configured reader, and limiting it to one
// barcode per page unless multiple barcodes are enabled.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::GrayImage;
use tracing::{debug, instrument};
use trennblatt_core::config::ScannerConfig;
use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::types::{Barcode, ReaderKind};

use crate::source::{ImageSource, decode_luminance};

/// One page image as handed to a detector.
#[derive(Debug, Clone, Copy)]
pub struct ScannedPage<'a> {
    pub name: &'a str,
    pub image: &'a GrayImage,
}

/// Finds barcodes on a page image.
///
/// Returns them in reading order. An empty list means nothing was found;
/// errors are reserved for failures of the detector itself.
pub trait BarcodeDetector {
    fn detect(&self, page: &ScannedPage<'_>) -> Result<Vec<Barcode>>;
}

impl<T: BarcodeDetector + ?Sized> BarcodeDetector for &T {
    fn detect(&self, page: &ScannedPage<'_>) -> Result<Vec<Barcode>> {
        (**self).detect(page)
    }
}

impl<T: BarcodeDetector + ?Sized> BarcodeDetector for Box<T> {
    fn detect(&self, page: &ScannedPage<'_>) -> Result<Vec<Barcode>> {
        (**self).detect(page)
    }
}

impl<T: BarcodeDetector + ?Sized> BarcodeDetector for Arc<T> {
    fn detect(&self, page: &ScannedPage<'_>) -> Result<Vec<Barcode>> {
        (**self).detect(page)
    }
}

/// Which detections a job accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionPolicy {
    pub reader: ReaderKind,
    pub multiple: bool,
}

impl DetectionPolicy {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            reader: config.reader,
            multiple: config.multiple_barcodes,
        }
    }

    /// Drop symbologies the reader does not accept, then keep only the first
    /// barcode unless multiple barcodes are enabled.
    pub fn apply(&self, detected: Vec<Barcode>) -> Vec<Barcode> {
        let mut accepted: Vec<Barcode> = detected
            .into_iter()
            .filter(|barcode| self.reader.accepts(barcode.format))
            .collect();
        if !self.multiple {
            accepted.truncate(1);
        }
        accepted
    }
}

/// Read, decode, and scan one page.
#[instrument(skip(images, detector, policy))]
pub fn detect_page<I, D>(
    images: &I,
    detector: &D,
    policy: DetectionPolicy,
    name: &str,
) -> Result<Vec<Barcode>>
where
    I: ImageSource + ?Sized,
    D: BarcodeDetector + ?Sized,
{
    let bytes = images.read(name)?;
    let luma = decode_luminance(name, &bytes)?;
    let detected = detector.detect(&ScannedPage { name, image: &luma })?;
    let accepted = policy.apply(detected);
    if accepted.is_empty() {
        debug!("no barcode found on image");
    }
    Ok(accepted)
}

/// Detector backed by barcodes decoded ahead of time by an external tool.
///
/// The manifest is a JSON object mapping image names to barcode lists:
///
/// ```json
/// { "00000002.tif": [{ "text": "222", "format": "EAN_13" }] }
/// ```
///
/// Images missing from the manifest carry no barcode.
#[derive(Debug, Clone, Default)]
pub struct ManifestDetector {
    barcodes: HashMap<String, Vec<Barcode>>,
}

impl ManifestDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let barcodes = serde_json::from_str(content)?;
        Ok(Self { barcodes })
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrennblattError::Config(format!("cannot read barcode manifest {}: {e}", path.display()))
        })?;
        let detector = Self::from_json_str(&content)?;
        debug!(images = detector.barcodes.len(), "barcode manifest loaded");
        Ok(detector)
    }

    /// Record the barcodes of one image, replacing earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, barcodes: Vec<Barcode>) {
        self.barcodes.insert(name.into(), barcodes);
    }

    pub fn with(mut self, name: impl Into<String>, barcodes: Vec<Barcode>) -> Self {
        self.insert(name, barcodes);
        self
    }
}

impl BarcodeDetector for ManifestDetector {
    fn detect(&self, page: &ScannedPage<'_>) -> Result<Vec<Barcode>> {
        Ok(self.barcodes.get(page.name).cloned().unwrap_or_default())
    }
}
