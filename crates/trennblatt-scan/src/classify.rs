// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Barcode classification. Translates one decoded barcode into structural
// directives using the single-page and multi-page mapping tables.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;
use trennblatt_core::config::{MappingEntry, ScannerConfig};
use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::types::{Barcode, ClassifyMode, DOC_STRUCT_END, Directive, StructureTarget};
use trennblatt_structure::SchemaLookup;

/// Ordered `key → structure type name` table with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: IndexMap<String, String>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. A key may appear only once per table.
    pub fn insert(&mut self, key: impl Into<String>, docstruct: impl Into<String>) -> Result<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(TrennblattError::Config(format!(
                "barcode key {key} is mapped more than once"
            )));
        }
        self.entries.insert(key, docstruct.into());
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The two mapping tables active for one document, plus the key mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureMapping {
    pub mode: ClassifyMode,
    pub single_page: MappingTable,
    pub multi_page: MappingTable,
}

impl StructureMapping {
    pub fn new(mode: ClassifyMode) -> Self {
        Self {
            mode,
            single_page: MappingTable::new(),
            multi_page: MappingTable::new(),
        }
    }

    /// Build the tables for a document whose top-level type is `parent_struct`.
    ///
    /// Entries scoped to another parent type, or lacking a key for the
    /// configured mode, are left out.
    pub fn from_config(config: &ScannerConfig, parent_struct: &str) -> Result<Self> {
        let mode = config.classify_by;
        let mapping = Self {
            mode,
            single_page: table_for(&config.single_page_structures, mode, parent_struct)?,
            multi_page: table_for(&config.multipage_structures, mode, parent_struct)?,
        };
        debug!(
            parent_struct,
            single_page = mapping.single_page.len(),
            multi_page = mapping.multi_page.len(),
            "barcode mapping resolved"
        );
        Ok(mapping)
    }
}

fn table_for(
    entries: &[MappingEntry],
    mode: ClassifyMode,
    parent_struct: &str,
) -> Result<MappingTable> {
    let mut table = MappingTable::new();
    for entry in entries.iter().filter(|e| e.applies_to(parent_struct)) {
        if let Some(key) = entry.key(mode) {
            table.insert(key, entry.docstruct.as_str())?;
        }
    }
    Ok(table)
}

/// Soft problem found while classifying. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Diagnostic {
    /// A mapping names a structure type the ruleset does not define.
    UnknownStructureType { key: String, docstruct: String },
    /// The configured uuid metadatum is not defined in the ruleset.
    UnknownMetadataType { name: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStructureType { key, docstruct } => {
                write!(f, "barcode {key} maps to {docstruct}, which is not in the ruleset")
            }
            Self::UnknownMetadataType { name } => {
                write!(f, "metadata type {name} is not in the ruleset")
            }
        }
    }
}

/// Result of classifying one barcode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Single-page directive first, then the multi-page one.
    pub directives: Vec<Directive>,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the key was found in either table.
    pub matched: bool,
}

/// Maps decoded barcodes to directives. Holds no per-run state.
#[derive(Debug, Clone)]
pub struct BarcodeClassifier {
    mapping: StructureMapping,
}

impl BarcodeClassifier {
    pub fn new(mapping: StructureMapping) -> Self {
        Self { mapping }
    }

    /// Classify `barcode`, resolving structure type names through `schema`.
    pub fn classify(&self, barcode: &Barcode, schema: &impl SchemaLookup) -> Classification {
        let key = self.mapping.mode.key(barcode);
        let mut result = Classification::default();

        if let Some(docstruct) = self.mapping.single_page.get(key) {
            result.matched = true;
            debug!(key, docstruct, "barcode maps to single-page structure");
            match resolve(key, docstruct, schema) {
                Ok(target) => result.directives.push(Directive::CreateSinglePageUnit(target)),
                Err(diagnostic) => result.diagnostics.push(diagnostic),
            }
        }

        if let Some(docstruct) = self.mapping.multi_page.get(key) {
            result.matched = true;
            if docstruct == DOC_STRUCT_END {
                debug!(key, "barcode closes the multi-page structure");
                result.directives.push(Directive::CloseMultiPageGroup);
            } else {
                debug!(key, docstruct, "barcode maps to multi-page structure");
                match resolve(key, docstruct, schema) {
                    Ok(target) => result.directives.push(Directive::OpenMultiPageGroup(target)),
                    Err(diagnostic) => result.diagnostics.push(diagnostic),
                }
            }
        }

        result
    }
}

fn resolve(
    key: &str,
    docstruct: &str,
    schema: &impl SchemaLookup,
) -> std::result::Result<StructureTarget, Diagnostic> {
    schema
        .lookup_structure_type(docstruct)
        .map(|ty| StructureTarget {
            name: docstruct.to_string(),
            ty,
        })
        .ok_or_else(|| Diagnostic::UnknownStructureType {
            key: key.to_string(),
            docstruct: docstruct.to_string(),
        })
}
