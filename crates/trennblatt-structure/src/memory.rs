// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory arena implementation of `StructureStore`.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::types::{MetadataTypeId, NodeId, ReferenceKind, StructTypeId};

use crate::ruleset::Ruleset;
use crate::store::{SchemaLookup, StructureStore};

#[derive(Debug, Clone)]
struct Node {
    ty: StructTypeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    references: Vec<(NodeId, ReferenceKind)>,
    referenced_by: Vec<NodeId>,
    content_files: Vec<String>,
    metadata: Vec<(MetadataTypeId, Option<String>)>,
}

impl Node {
    fn new(ty: StructTypeId) -> Self {
        Self {
            ty,
            parent: None,
            children: Vec::new(),
            references: Vec::new(),
            referenced_by: Vec::new(),
            content_files: Vec::new(),
            metadata: Vec::new(),
        }
    }
}

/// Document structure held entirely in memory.
///
/// Nodes live in a flat arena indexed by `NodeId`. Removing a child only
/// detaches it; the slot stays allocated so outstanding handles never
/// alias a different node.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    ruleset: Ruleset,
    nodes: Vec<Node>,
    logical_root: NodeId,
    physical_root: NodeId,
    file_set: Vec<String>,
}

impl MemoryStore {
    /// Create an empty document with the given root types.
    pub fn new(ruleset: Ruleset, logical_type: &str, physical_type: &str) -> Result<Self> {
        let logical_ty = ruleset
            .lookup_structure_type(logical_type)
            .ok_or_else(|| TrennblattError::UnknownStructureType(logical_type.to_string()))?;
        let physical_ty = ruleset
            .lookup_structure_type(physical_type)
            .ok_or_else(|| TrennblattError::UnknownStructureType(physical_type.to_string()))?;

        debug!(logical_type, physical_type, "empty structure created");
        Ok(Self {
            ruleset,
            nodes: vec![Node::new(logical_ty), Node::new(physical_ty)],
            logical_root: NodeId(0),
            physical_root: NodeId(1),
            file_set: Vec::new(),
        })
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Every content file location registered for the document.
    pub fn file_set(&self) -> &[String] {
        &self.file_set
    }

    /// Value of the metadatum named `name` on `node`.
    ///
    /// Returns `None` when the metadatum is absent; `Some(None)` when it is
    /// present without a value.
    pub fn metadatum(&self, node: NodeId, name: &str) -> Option<Option<&str>> {
        let ty = self.ruleset.lookup_metadata_type(name)?;
        self.nodes
            .get(node.0)?
            .metadata
            .iter()
            .find(|(md, _)| *md == ty)
            .map(|(_, value)| value.as_deref())
    }

    /// Serializable view of the current tree.
    pub fn snapshot(&self) -> StructureSnapshot {
        let pages: Vec<NodeId> = self.nodes[self.physical_root.0].children.clone();
        let order_of = |page: NodeId| pages.iter().position(|p| *p == page).map(|i| i + 1);

        let page_snapshots = pages
            .iter()
            .enumerate()
            .map(|(index, page)| PageSnapshot {
                order: index + 1,
                files: self.nodes[page.0].content_files.clone(),
                metadata: self.metadata_map(*page),
            })
            .collect();

        StructureSnapshot {
            logical: self.logical_snapshot(self.logical_root, &order_of),
            pages: page_snapshots,
        }
    }

    fn logical_snapshot(
        &self,
        node: NodeId,
        order_of: &dyn Fn(NodeId) -> Option<usize>,
    ) -> LogicalSnapshot {
        let entry = &self.nodes[node.0];
        LogicalSnapshot {
            ty: self.type_label(entry.ty),
            metadata: self.metadata_map(node),
            pages: entry
                .references
                .iter()
                .filter_map(|(target, _)| order_of(*target))
                .collect(),
            children: entry
                .children
                .iter()
                .map(|child| self.logical_snapshot(*child, order_of))
                .collect(),
        }
    }

    fn metadata_map(&self, node: NodeId) -> BTreeMap<String, Option<String>> {
        self.nodes[node.0]
            .metadata
            .iter()
            .filter_map(|(ty, value)| {
                self.ruleset
                    .metadata(*ty)
                    .map(|def| (def.name.clone(), value.clone()))
            })
            .collect()
    }

    fn type_label(&self, ty: StructTypeId) -> String {
        self.ruleset
            .structure(ty)
            .map(|def| def.name.clone())
            .unwrap_or_default()
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(TrennblattError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(TrennblattError::UnknownNode(id))
    }
}

impl SchemaLookup for MemoryStore {
    fn lookup_structure_type(&self, name: &str) -> Option<StructTypeId> {
        self.ruleset.lookup_structure_type(name)
    }

    fn lookup_metadata_type(&self, name: &str) -> Option<MetadataTypeId> {
        self.ruleset.lookup_metadata_type(name)
    }
}

impl StructureStore for MemoryStore {
    fn logical_root(&self) -> NodeId {
        self.logical_root
    }

    fn physical_root(&self) -> NodeId {
        self.physical_root
    }

    fn type_name(&self, node: NodeId) -> Result<&str> {
        let ty = self.node(node)?.ty;
        self.ruleset
            .structure(ty)
            .map(|def| def.name.as_str())
            .ok_or(TrennblattError::UnknownNode(node))
    }

    fn is_anchor(&self, node: NodeId) -> Result<bool> {
        let ty = self.node(node)?.ty;
        Ok(self.ruleset.structure(ty).is_some_and(|def| def.anchor))
    }

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.node(node)?.children.clone())
    }

    fn references_from(&self, node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self
            .node(node)?
            .references
            .iter()
            .map(|(target, _)| *target)
            .collect())
    }

    fn references_to(&self, node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.node(node)?.referenced_by.clone())
    }

    fn content_files(&self, node: NodeId) -> Result<Vec<String>> {
        Ok(self.node(node)?.content_files.clone())
    }

    fn create_node(&mut self, ty: StructTypeId) -> Result<NodeId> {
        if self.ruleset.structure(ty).is_none() {
            return Err(TrennblattError::UnknownStructureType(format!("{ty:?}")));
        }
        self.nodes.push(Node::new(ty));
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_ty = self.node(parent)?.ty;
        let child_ty = self.node(child)?.ty;
        if !self.ruleset.allows_child(parent_ty, child_ty) {
            return Err(TrennblattError::ChildNotAllowed {
                parent: self.type_label(parent_ty),
                child: self.type_label(child_ty),
            });
        }

        let previous = self.node(child)?.parent;
        if let Some(previous) = previous {
            self.remove_child(previous, child)?;
        }
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(child)?;
        let children = &mut self.node_mut(parent)?.children;
        let before = children.len();
        children.retain(|c| *c != child);
        if children.len() != before {
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }

    fn add_reference(&mut self, from: NodeId, to: NodeId, kind: ReferenceKind) -> Result<()> {
        self.node(to)?;
        let source = self.node_mut(from)?;
        if source.references.iter().any(|(target, _)| *target == to) {
            return Ok(());
        }
        source.references.push((to, kind));
        self.node_mut(to)?.referenced_by.push(from);
        Ok(())
    }

    fn remove_reference(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.node(to)?;
        self.node_mut(from)?
            .references
            .retain(|(target, _)| *target != to);
        self.node_mut(to)?.referenced_by.retain(|source| *source != from);
        Ok(())
    }

    fn attach_content_file(&mut self, node: NodeId, location: &str) -> Result<()> {
        self.node_mut(node)?.content_files.push(location.to_string());
        if !self.file_set.iter().any(|f| f == location) {
            self.file_set.push(location.to_string());
        }
        Ok(())
    }

    fn remove_content_file(&mut self, node: NodeId, location: &str) -> Result<()> {
        self.node_mut(node)?.content_files.retain(|f| f != location);
        self.file_set.retain(|f| f != location);
        Ok(())
    }

    fn set_metadatum(
        &mut self,
        node: NodeId,
        ty: MetadataTypeId,
        value: Option<&str>,
    ) -> Result<()> {
        let node_ty = self.node(node)?.ty;
        if !self.ruleset.allows_metadata(node_ty, ty) {
            return Err(TrennblattError::MetadataNotAllowed {
                metadata: self
                    .ruleset
                    .metadata(ty)
                    .map(|def| def.name.clone())
                    .unwrap_or_else(|| format!("{ty:?}")),
                structure: self.type_label(node_ty),
            });
        }

        let metadata = &mut self.node_mut(node)?.metadata;
        let value = value.map(str::to_string);
        match metadata.iter_mut().find(|(md, _)| *md == ty) {
            Some(entry) => entry.1 = value,
            None => metadata.push((ty, value)),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only, serializable view of a document structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureSnapshot {
    pub logical: LogicalSnapshot,
    pub pages: Vec<PageSnapshot>,
}

/// A logical unit with the physical order (1-based) of the pages it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalSnapshot {
    #[serde(rename = "type")]
    pub ty: String,
    pub metadata: BTreeMap<String, Option<String>>,
    pub pages: Vec<usize>,
    pub children: Vec<LogicalSnapshot>,
}

/// A physical page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSnapshot {
    pub order: usize,
    pub files: Vec<String>,
    pub metadata: BTreeMap<String, Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::tests::sample;
    use crate::ruleset::{PAGE_TYPE, PHYS_PAGE_NUMBER};

    fn store() -> MemoryStore {
        MemoryStore::new(sample(), "Monograph", "BoundBook").expect("store")
    }

    fn page(store: &mut MemoryStore) -> NodeId {
        let ty = store.lookup_structure_type(PAGE_TYPE).expect("page type");
        let page = store.create_node(ty).expect("create page");
        let root = store.physical_root();
        store.add_child(root, page).expect("append page");
        page
    }

    #[test]
    fn unknown_root_type_is_rejected() {
        let result = MemoryStore::new(sample(), "Newspaper", "BoundBook");
        assert!(matches!(result, Err(TrennblattError::UnknownStructureType(_))));
    }

    #[test]
    fn schema_rejects_disallowed_child() {
        let mut store = store();
        let chapter_ty = store.lookup_structure_type("Chapter").expect("Chapter");
        let chapter = store.create_node(chapter_ty).expect("create");
        let physical = store.physical_root();

        let result = store.add_child(physical, chapter);
        assert!(matches!(
            result,
            Err(TrennblattError::ChildNotAllowed { ref parent, ref child })
                if parent == "BoundBook" && child == "Chapter"
        ));
    }

    #[test]
    fn schema_rejects_disallowed_metadatum() {
        let mut store = store();
        let chapter_ty = store.lookup_structure_type("Chapter").expect("Chapter");
        let chapter = store.create_node(chapter_ty).expect("create");
        let phys = store.lookup_metadata_type(PHYS_PAGE_NUMBER).expect("phys");

        let result = store.set_metadatum(chapter, phys, Some("1"));
        assert!(matches!(result, Err(TrennblattError::MetadataNotAllowed { .. })));
    }

    #[test]
    fn references_are_tracked_both_ways() {
        let mut store = store();
        let page = page(&mut store);
        let root = store.logical_root();

        store
            .add_reference(root, page, ReferenceKind::LogicalPhysical)
            .expect("reference");
        store
            .add_reference(root, page, ReferenceKind::LogicalPhysical)
            .expect("duplicate reference");
        assert_eq!(store.references_from(root).expect("from"), vec![page]);
        assert_eq!(store.references_to(page).expect("to"), vec![root]);

        store.remove_reference(root, page).expect("remove");
        assert!(store.references_to(page).expect("to").is_empty());
        store.remove_reference(root, page).expect("remove again");
    }

    #[test]
    fn content_files_join_the_file_set() {
        let mut store = store();
        let page = page(&mut store);

        store
            .attach_content_file(page, "file:///scans/00000001.tif")
            .expect("attach");
        assert_eq!(store.file_set(), ["file:///scans/00000001.tif"]);

        store
            .remove_content_file(page, "file:///scans/00000001.tif")
            .expect("remove");
        assert!(store.file_set().is_empty());
        assert!(store.content_files(page).expect("files").is_empty());
    }

    #[test]
    fn set_metadatum_replaces_previous_value() {
        let mut store = store();
        let page = page(&mut store);
        let phys = store.lookup_metadata_type(PHYS_PAGE_NUMBER).expect("phys");

        store.set_metadatum(page, phys, Some("1")).expect("set");
        store.set_metadatum(page, phys, Some("2")).expect("replace");
        assert_eq!(store.metadatum(page, PHYS_PAGE_NUMBER), Some(Some("2")));
    }

    #[test]
    fn remove_child_detaches_and_is_idempotent() {
        let mut store = store();
        let page = page(&mut store);
        let physical = store.physical_root();

        store.remove_child(physical, page).expect("remove");
        store.remove_child(physical, page).expect("remove again");
        assert!(store.children(physical).expect("children").is_empty());
    }

    #[test]
    fn unknown_node_is_an_error() {
        let store = store();
        assert!(matches!(
            store.children(NodeId(99)),
            Err(TrennblattError::UnknownNode(NodeId(99)))
        ));
    }

    #[test]
    fn snapshot_reports_page_orders() {
        let mut store = store();
        let first = page(&mut store);
        let second = page(&mut store);
        let root = store.logical_root();
        let chapter_ty = store.lookup_structure_type("Chapter").expect("Chapter");
        let chapter = store.create_node(chapter_ty).expect("chapter");
        store.add_child(root, chapter).expect("append chapter");
        store
            .add_reference(chapter, second, ReferenceKind::LogicalPhysical)
            .expect("reference");
        store
            .add_reference(root, first, ReferenceKind::LogicalPhysical)
            .expect("reference");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.pages.len(), 2);
        assert_eq!(snapshot.logical.ty, "Monograph");
        assert_eq!(snapshot.logical.pages, vec![1]);
        assert_eq!(snapshot.logical.children[0].ty, "Chapter");
        assert_eq!(snapshot.logical.children[0].pages, vec![2]);

        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json["logical"]["type"], "Monograph");
    }
}
