// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanner job configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrennblattError};
use crate::types::{BarcodeFormat, ClassifyMode, ReaderKind};

/// One configured barcode → structure type association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Top-level document type this entry applies to. `None` applies to all.
    #[serde(default)]
    pub parent_struct: Option<String>,
    /// Key used when classifying by text.
    #[serde(default)]
    pub barcode: Option<String>,
    /// Key used when classifying by format (`EAN_13`, `QR_CODE`, ...).
    #[serde(default)]
    pub format: Option<String>,
    /// Structure type name, or `DocStructEnd` in the multi-page table.
    pub docstruct: String,
}

impl MappingEntry {
    /// Whether this entry is active for a document whose top-level type is
    /// `parent_struct`.
    pub fn applies_to(&self, parent_struct: &str) -> bool {
        self.parent_struct
            .as_deref()
            .is_none_or(|parent| parent == parent_struct)
    }

    /// The key of this entry under `mode`, if it has one.
    pub fn key(&self, mode: ClassifyMode) -> Option<&str> {
        match mode {
            ClassifyMode::Text => self.barcode.as_deref(),
            ClassifyMode::Format => self.format.as_deref(),
        }
    }
}

/// Settings for one barcode structuring job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Leave documents that already have pages untouched.
    pub skip_when_data_exists: bool,
    /// Key mappings on barcode text or on barcode format.
    pub classify_by: ClassifyMode,
    /// Symbologies accepted from the detector.
    pub reader: ReaderKind,
    /// Use every barcode found on an image rather than only the first.
    pub multiple_barcodes: bool,
    /// Metadata type receiving the text of the barcode that created a unit.
    pub uuid_metadatum: Option<String>,
    /// Value for each page's logical page number. Unset when absent.
    pub logical_page_label: Option<String>,
    /// Barcodes that create a unit holding just their own page.
    pub single_page_structures: Vec<MappingEntry>,
    /// Barcodes that open (or, via `DocStructEnd`, close) a page group.
    pub multipage_structures: Vec<MappingEntry>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            skip_when_data_exists: false,
            classify_by: ClassifyMode::Text,
            reader: ReaderKind::Multi,
            multiple_barcodes: false,
            uuid_metadatum: None,
            logical_page_label: None,
            single_page_structures: Vec::new(),
            multipage_structures: Vec::new(),
        }
    }
}

impl ScannerConfig {
    /// Parse and validate a TOML configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrennblattError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject entries that can never resolve to a structure.
    pub fn validate(&self) -> Result<()> {
        let tables = [
            ("single_page_structures", &self.single_page_structures),
            ("multipage_structures", &self.multipage_structures),
        ];
        for (table, entries) in tables {
            for (index, entry) in entries.iter().enumerate() {
                if entry.docstruct.trim().is_empty() {
                    return Err(TrennblattError::Config(format!(
                        "{table}[{index}] has an empty docstruct"
                    )));
                }
                if entry.barcode.is_none() && entry.format.is_none() {
                    return Err(TrennblattError::Config(format!(
                        "{table}[{index}] needs a barcode or a format key"
                    )));
                }
                if let Some(format) = entry.format.as_deref() {
                    format.parse::<BarcodeFormat>().map_err(|e| {
                        TrennblattError::Config(format!("{table}[{index}]: {e}"))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Whether the uuid metadatum copy is configured.
    pub fn copies_barcode_text(&self) -> bool {
        self.uuid_metadatum
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }
}
