// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trennblatt-scan: turns scanned divider sheets into document structure.
//
// Page images are read in scan order, barcodes on each page are detected and
// classified against the configured mapping tables, and the resulting
// directives are folded into a `StructureStore`. Jobs can run directly or be
// queued as tickets for a worker.

pub mod builder;
pub mod classify;
pub mod detect;
pub mod prefetch;
pub mod source;
pub mod ticket;

pub use builder::{BuildRun, BuildState, GroupState, RunReport, StructureBuilder, reset_structure};
pub use classify::{BarcodeClassifier, Classification, Diagnostic, MappingTable, StructureMapping};
pub use detect::{BarcodeDetector, DetectionPolicy, ManifestDetector, ScannedPage, detect_page};
pub use source::{DirectoryImageSource, ImageSource, MemoryImageSource, decode_luminance, file_uri};
pub use ticket::TicketQueue;
