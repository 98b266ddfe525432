// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ruleset: the schema of structure and metadata types a document may use.
//
// A ruleset is a TOML document:
//
//   [[structure]]
//   name = "Monograph"
//   children = ["Chapter", "TableOfContents"]
//   metadata = ["CatalogIDDigital"]
//
//   [[structure]]
//   name = "page"
//   metadata = ["physPageNumber", "logicalPageNumber"]
//
//   [[metadata]]
//   name = "physPageNumber"

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::types::{MetadataTypeId, StructTypeId};

use crate::store::SchemaLookup;

/// Structure type name every ruleset must define for physical pages.
pub const PAGE_TYPE: &str = "page";
/// Metadata type carrying the 1-based physical page number.
pub const PHYS_PAGE_NUMBER: &str = "physPageNumber";
/// Metadata type carrying the logical (printed) page number.
pub const LOGICAL_PAGE_NUMBER: &str = "logicalPageNumber";

/// Definition of one structure type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructTypeDef {
    pub name: String,
    /// Anchors (periodicals, multi-volume works) hold their content in their
    /// first child rather than directly.
    #[serde(default)]
    pub anchor: bool,
    /// Structure types allowed as direct children.
    #[serde(default)]
    pub children: Vec<String>,
    /// Metadata types allowed on nodes of this type.
    #[serde(default)]
    pub metadata: Vec<String>,
}

/// Definition of one metadata type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTypeDef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RulesetFile {
    #[serde(default, rename = "structure")]
    structures: Vec<StructTypeDef>,
    #[serde(default, rename = "metadata")]
    metadata: Vec<MetadataTypeDef>,
}

/// Validated set of structure and metadata types.
#[derive(Debug, Clone)]
pub struct Ruleset {
    structures: Vec<StructTypeDef>,
    metadata: Vec<MetadataTypeDef>,
}

impl Ruleset {
    /// Build a ruleset, checking that every referenced name is defined.
    pub fn new(structures: Vec<StructTypeDef>, metadata: Vec<MetadataTypeDef>) -> Result<Self> {
        let mut struct_names = HashSet::new();
        for def in &structures {
            if !struct_names.insert(def.name.as_str()) {
                return Err(TrennblattError::Config(format!(
                    "structure type {} is defined twice",
                    def.name
                )));
            }
        }
        let mut metadata_names = HashSet::new();
        for def in &metadata {
            if !metadata_names.insert(def.name.as_str()) {
                return Err(TrennblattError::Config(format!(
                    "metadata type {} is defined twice",
                    def.name
                )));
            }
        }

        for def in &structures {
            if let Some(child) = def.children.iter().find(|c| !struct_names.contains(c.as_str())) {
                return Err(TrennblattError::Config(format!(
                    "structure type {} allows undefined child {child}",
                    def.name
                )));
            }
            if let Some(md) = def.metadata.iter().find(|m| !metadata_names.contains(m.as_str())) {
                return Err(TrennblattError::Config(format!(
                    "structure type {} allows undefined metadata {md}",
                    def.name
                )));
            }
        }

        Ok(Self {
            structures,
            metadata,
        })
    }

    /// Parse and validate a TOML ruleset document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RulesetFile = toml::from_str(content)?;
        Self::new(file.structures, file.metadata)
    }

    /// Read, parse, and validate the ruleset file at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrennblattError::Config(format!("cannot read ruleset {}: {e}", path.display()))
        })?;
        let ruleset = Self::from_toml_str(&content)?;
        debug!(
            structures = ruleset.structures.len(),
            metadata = ruleset.metadata.len(),
            "ruleset loaded"
        );
        Ok(ruleset)
    }

    pub fn structure(&self, id: StructTypeId) -> Option<&StructTypeDef> {
        self.structures.get(id.0)
    }

    pub fn metadata(&self, id: MetadataTypeId) -> Option<&MetadataTypeDef> {
        self.metadata.get(id.0)
    }

    /// Whether a node of type `child` may be appended to a node of type `parent`.
    pub fn allows_child(&self, parent: StructTypeId, child: StructTypeId) -> bool {
        match (self.structure(parent), self.structure(child)) {
            (Some(parent), Some(child)) => parent.children.iter().any(|c| *c == child.name),
            _ => false,
        }
    }

    /// Whether metadata of type `md` may be set on a node of type `structure`.
    pub fn allows_metadata(&self, structure: StructTypeId, md: MetadataTypeId) -> bool {
        match (self.structure(structure), self.metadata(md)) {
            (Some(structure), Some(md)) => structure.metadata.iter().any(|m| *m == md.name),
            _ => false,
        }
    }
}

impl SchemaLookup for Ruleset {
    fn lookup_structure_type(&self, name: &str) -> Option<StructTypeId> {
        self.structures
            .iter()
            .position(|def| def.name == name)
            .map(StructTypeId)
    }

    fn lookup_metadata_type(&self, name: &str) -> Option<MetadataTypeId> {
        self.metadata
            .iter()
            .position(|def| def.name == name)
            .map(MetadataTypeId)
    }
}
