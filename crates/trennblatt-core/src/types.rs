// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Trennblatt.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved multi-page mapping value that closes the open group instead of
/// naming a structure type.
pub const DOC_STRUCT_END: &str = "DocStructEnd";

// ---------------------------------------------------------------------------
// Structure handles
// ---------------------------------------------------------------------------

/// Opaque handle to a node owned by a structure store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a structure type defined in the active ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructTypeId(pub usize);

/// Handle to a metadata type defined in the active ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataTypeId(pub usize);

/// Kind of cross-reference between two structure nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Logical unit → physical page.
    LogicalPhysical,
}

// ---------------------------------------------------------------------------
// Barcodes
// ---------------------------------------------------------------------------

/// Barcode symbology as reported by a detector.
///
/// The string forms (`EAN_13`, `QR_CODE`, ...) are the keys used by
/// format-based mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeFormat {
    #[serde(rename = "AZTEC")]
    Aztec,
    #[serde(rename = "CODABAR")]
    Codabar,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[serde(rename = "CODE_128")]
    Code128,
    #[serde(rename = "DATA_MATRIX")]
    DataMatrix,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "EAN_13")]
    Ean13,
    #[serde(rename = "ITF")]
    Itf,
    #[serde(rename = "MAXICODE")]
    MaxiCode,
    #[serde(rename = "PDF_417")]
    Pdf417,
    #[serde(rename = "QR_CODE")]
    QrCode,
    #[serde(rename = "RSS_14")]
    Rss14,
    #[serde(rename = "RSS_EXPANDED")]
    RssExpanded,
    #[serde(rename = "UPC_A")]
    UpcA,
    #[serde(rename = "UPC_E")]
    UpcE,
    #[serde(rename = "UPC_EAN_EXTENSION")]
    UpcEanExtension,
}

impl BarcodeFormat {
    pub const ALL: [BarcodeFormat; 17] = [
        Self::Aztec,
        Self::Codabar,
        Self::Code39,
        Self::Code93,
        Self::Code128,
        Self::DataMatrix,
        Self::Ean8,
        Self::Ean13,
        Self::Itf,
        Self::MaxiCode,
        Self::Pdf417,
        Self::QrCode,
        Self::Rss14,
        Self::RssExpanded,
        Self::UpcA,
        Self::UpcE,
        Self::UpcEanExtension,
    ];

    /// Mapping key for this symbology.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aztec => "AZTEC",
            Self::Codabar => "CODABAR",
            Self::Code39 => "CODE_39",
            Self::Code93 => "CODE_93",
            Self::Code128 => "CODE_128",
            Self::DataMatrix => "DATA_MATRIX",
            Self::Ean8 => "EAN_8",
            Self::Ean13 => "EAN_13",
            Self::Itf => "ITF",
            Self::MaxiCode => "MAXICODE",
            Self::Pdf417 => "PDF_417",
            Self::QrCode => "QR_CODE",
            Self::Rss14 => "RSS_14",
            Self::RssExpanded => "RSS_EXPANDED",
            Self::UpcA => "UPC_A",
            Self::UpcE => "UPC_E",
            Self::UpcEanExtension => "UPC_EAN_EXTENSION",
        }
    }
}

impl std::fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BarcodeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|format| format.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown barcode format: {s}"))
    }
}

/// A decoded barcode. Produced per image, consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barcode {
    pub text: String,
    pub format: BarcodeFormat,
}

impl Barcode {
    pub fn new(text: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }
}

/// Which property of a barcode is used as the mapping key.
///
/// Chosen once per job; never mixed within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyMode {
    /// Key on the decoded text.
    #[default]
    Text,
    /// Key on the symbology, regardless of content.
    Format,
}

impl ClassifyMode {
    /// The mapping key of `barcode` under this mode.
    pub fn key<'a>(&self, barcode: &'a Barcode) -> &'a str {
        match self {
            Self::Text => &barcode.text,
            Self::Format => barcode.format.as_str(),
        }
    }
}

/// Symbologies a job is willing to accept from the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderKind {
    Ean13,
    #[serde(alias = "UPCA")]
    Upca,
    Qr,
    /// Every symbology. Slower and more prone to false positives on real
    /// scanners, but the most versatile.
    #[default]
    Multi,
}

impl ReaderKind {
    pub fn accepts(&self, format: BarcodeFormat) -> bool {
        match self {
            Self::Ean13 => format == BarcodeFormat::Ean13,
            Self::Upca => format == BarcodeFormat::UpcA,
            Self::Qr => format == BarcodeFormat::QrCode,
            Self::Multi => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

/// A structure type resolved against the ruleset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureTarget {
    pub name: String,
    pub ty: StructTypeId,
}

/// Structural instruction derived from one barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Create a unit holding only the current page.
    CreateSinglePageUnit(StructureTarget),
    /// Open a group that collects this and the following pages.
    OpenMultiPageGroup(StructureTarget),
    /// Stop collecting pages into the open group.
    CloseMultiPageGroup,
}

// ---------------------------------------------------------------------------
// Outcomes and tickets
// ---------------------------------------------------------------------------

/// Terminal status reported to the host for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Finished,
    /// Existing pages were found and the job is configured to leave them.
    Skipped,
    Error(String),
    /// Queued for asynchronous execution.
    Deferred,
}

/// Unique identifier for a queued barcode ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a barcode ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Queued, waiting for a worker.
    Pending,
    /// Picked up by a worker.
    Processing,
    /// Structure was built.
    Finished,
    /// Pages already existed and the job skipped them.
    Skipped,
    /// The run aborted; the ticket carries the error message.
    Failed,
}

/// A unit of deferred work: build the structure of one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarcodeTicket {
    pub id: TicketId,
    pub process_id: i64,
    pub process_name: String,
    pub step_id: Option<i64>,
    pub step_name: Option<String>,
    /// Free-form handler inputs (paths, document type, ...).
    pub properties: BTreeMap<String, String>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl BarcodeTicket {
    pub fn new(process_id: i64, process_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TicketId::new(),
            process_id,
            process_name: process_name.into(),
            step_id: None,
            step_name: None,
            properties: BTreeMap::new(),
            status: TicketStatus::Pending,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
