// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability traits for the document structure model.
//
// The tree of logical units and physical pages is an arena owned by the
// store. Callers only ever hold `NodeId` handles; cross-references between
// logical units and pages are edges inside the store, never Rust references.

use trennblatt_core::error::Result;
use trennblatt_core::types::{MetadataTypeId, NodeId, ReferenceKind, StructTypeId};

/// Name → type resolution against the active schema.
pub trait SchemaLookup {
    /// Resolve a structure type by exact, case-sensitive name.
    fn lookup_structure_type(&self, name: &str) -> Option<StructTypeId>;

    /// Resolve a metadata type by exact, case-sensitive name.
    fn lookup_metadata_type(&self, name: &str) -> Option<MetadataTypeId>;
}

/// The document structure of one process.
///
/// Mutating methods enforce the schema: appending a child the parent type
/// does not allow, or setting a metadatum the node type does not allow, is an
/// error.
pub trait StructureStore: SchemaLookup {
    // -- Roots ----------------------------------------------------------------

    /// Top-level logical node (possibly an anchor).
    fn logical_root(&self) -> NodeId;

    /// Physical root holding the page nodes.
    fn physical_root(&self) -> NodeId;

    // -- Reading --------------------------------------------------------------

    fn type_name(&self, node: NodeId) -> Result<&str>;

    fn is_anchor(&self, node: NodeId) -> Result<bool>;

    /// Direct children in order.
    fn children(&self, node: NodeId) -> Result<Vec<NodeId>>;

    /// Targets of references going out of `node`.
    fn references_from(&self, node: NodeId) -> Result<Vec<NodeId>>;

    /// Sources of references pointing at `node`.
    fn references_to(&self, node: NodeId) -> Result<Vec<NodeId>>;

    /// Locations of the content files attached to `node`.
    fn content_files(&self, node: NodeId) -> Result<Vec<String>>;

    // -- Mutation -------------------------------------------------------------

    /// Create a detached node of type `ty`.
    fn create_node(&mut self, ty: StructTypeId) -> Result<NodeId>;

    fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()>;

    /// Detach `child` from `parent`. Detaching a non-child is a no-op.
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()>;

    fn add_reference(&mut self, from: NodeId, to: NodeId, kind: ReferenceKind) -> Result<()>;

    /// Drop the reference `from → to`. Dropping a missing reference is a no-op.
    fn remove_reference(&mut self, from: NodeId, to: NodeId) -> Result<()>;

    /// Attach a content file and register it in the document's file set.
    fn attach_content_file(&mut self, node: NodeId, location: &str) -> Result<()>;

    /// Detach a content file and remove it from the document's file set.
    fn remove_content_file(&mut self, node: NodeId, location: &str) -> Result<()>;

    /// Set (or replace) the metadatum of type `ty` on `node`.
    fn set_metadatum(
        &mut self,
        node: NodeId,
        ty: MetadataTypeId,
        value: Option<&str>,
    ) -> Result<()>;
}
