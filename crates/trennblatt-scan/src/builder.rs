// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structure builder. Walks the pages of a document in scan order and turns
// the barcode stream into logical structure.
//
// For each page the builder:
//
// 1. creates the physical page node, attaches its image, numbers it, and
//    links it from the logical root,
// 2. classifies every barcode found on it and applies the directives
//    (single-page units, opening or closing a multi-page group),
// 3. links the page to the open multi-page group, if any.
//
// Because step 3 runs after step 2, the page carrying a terminator is not
// part of the group it closes, while the page carrying an opener is part of
// the group it opens.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use trennblatt_core::config::ScannerConfig;
use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::types::{
    Barcode, Directive, MetadataTypeId, NodeId, ReferenceKind, StepOutcome, StructTypeId,
};
use trennblatt_structure::{LOGICAL_PAGE_NUMBER, PAGE_TYPE, PHYS_PAGE_NUMBER, StructureStore};

use crate::classify::{BarcodeClassifier, Diagnostic, StructureMapping};
use crate::detect::{BarcodeDetector, DetectionPolicy, detect_page};
use crate::source::ImageSource;

// ---------------------------------------------------------------------------
// Build state
// ---------------------------------------------------------------------------

/// Whether pages are currently being collected into a multi-page group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Idle,
    InGroup(NodeId),
}

/// Mutable state of one run. Never shared between runs.
#[derive(Debug, Clone)]
pub struct BuildState {
    group: GroupState,
    logical_root: NodeId,
    physical_root: NodeId,
    page_index: usize,
}

impl BuildState {
    pub fn new(logical_root: NodeId, physical_root: NodeId) -> Self {
        Self {
            group: GroupState::Idle,
            logical_root,
            physical_root,
            page_index: 0,
        }
    }

    pub fn group(&self) -> GroupState {
        self.group
    }

    /// Logical node pages are attached to (the first child of an anchor).
    pub fn logical_root(&self) -> NodeId {
        self.logical_root
    }

    pub fn physical_root(&self) -> NodeId {
        self.physical_root
    }

    /// 0-based index of the next page.
    pub fn page_index(&self) -> usize {
        self.page_index
    }
}

/// Types every page needs, resolved once per run.
#[derive(Debug, Clone)]
struct PageTemplate {
    page: StructTypeId,
    phys_page_number: MetadataTypeId,
    logical_page_number: MetadataTypeId,
    logical_page_label: Option<String>,
    uuid_metadatum: Option<MetadataTypeId>,
}

impl PageTemplate {
    fn resolve<S: StructureStore>(
        store: &S,
        config: &ScannerConfig,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Self> {
        let page = store
            .lookup_structure_type(PAGE_TYPE)
            .ok_or_else(|| TrennblattError::UnknownStructureType(PAGE_TYPE.into()))?;
        let phys_page_number = store
            .lookup_metadata_type(PHYS_PAGE_NUMBER)
            .ok_or_else(|| TrennblattError::UnknownMetadataType(PHYS_PAGE_NUMBER.into()))?;
        let logical_page_number = store
            .lookup_metadata_type(LOGICAL_PAGE_NUMBER)
            .ok_or_else(|| TrennblattError::UnknownMetadataType(LOGICAL_PAGE_NUMBER.into()))?;

        let uuid_metadatum = match config.uuid_metadatum.as_deref() {
            Some(name) if config.copies_barcode_text() => {
                let ty = store.lookup_metadata_type(name);
                if ty.is_none() {
                    let diagnostic = Diagnostic::UnknownMetadataType { name: name.into() };
                    warn!(%diagnostic, "barcode text will not be recorded");
                    diagnostics.push(diagnostic);
                }
                ty
            }
            _ => None,
        };

        Ok(Self {
            page,
            phys_page_number,
            logical_page_number,
            logical_page_label: config.logical_page_label.clone(),
            uuid_metadatum,
        })
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Summary of a completed (or skipped) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Existing pages were left untouched.
    pub skipped: bool,
    pub pages: usize,
    pub single_page_units: usize,
    pub groups_opened: usize,
    /// A multi-page group was still open after the last page.
    pub open_group_at_end: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> StepOutcome {
        if self.skipped {
            StepOutcome::Skipped
        } else {
            StepOutcome::Finished
        }
    }

    /// Collapse a run result into the single status reported to the host.
    pub fn outcome_of(result: &Result<RunReport>) -> StepOutcome {
        match result {
            Ok(report) => report.outcome(),
            Err(e) => StepOutcome::Error(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// A run in progress: the state machine plus everything resolved at start.
#[derive(Debug)]
pub struct BuildRun {
    state: BuildState,
    classifier: BarcodeClassifier,
    template: PageTemplate,
    report: RunReport,
}

impl BuildRun {
    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Add the page `image` and apply the barcodes found on it.
    pub fn fold_page<S: StructureStore>(
        &mut self,
        store: &mut S,
        image: &str,
        location: &str,
        barcodes: &[Barcode],
    ) -> Result<NodeId> {
        let page = self.add_page(store, location)?;

        for barcode in barcodes {
            debug!(image, barcode = %barcode.text, format = %barcode.format, "barcode found");
            let classification = self.classifier.classify(barcode, &*store);
            for diagnostic in classification.diagnostics {
                warn!(image, %diagnostic, "mapping ignored");
                self.report.diagnostics.push(diagnostic);
            }
            for directive in classification.directives {
                self.apply(store, page, barcode, directive)?;
            }
        }

        if let GroupState::InGroup(group) = self.state.group {
            store.add_reference(group, page, ReferenceKind::LogicalPhysical)?;
        }

        self.state.page_index += 1;
        self.report.pages += 1;
        Ok(page)
    }

    /// End the run. An open group stays open.
    pub fn finish(mut self) -> RunReport {
        self.report.open_group_at_end = matches!(self.state.group, GroupState::InGroup(_));
        if self.report.open_group_at_end {
            debug!("multi-page structure left open after the last page");
        }
        self.report
    }

    fn add_page<S: StructureStore>(&mut self, store: &mut S, location: &str) -> Result<NodeId> {
        let page = store.create_node(self.template.page)?;
        store.attach_content_file(page, location)?;
        store.add_child(self.state.physical_root, page)?;

        let number = (self.state.page_index + 1).to_string();
        store.set_metadatum(page, self.template.phys_page_number, Some(&number))?;
        store.set_metadatum(
            page,
            self.template.logical_page_number,
            self.template.logical_page_label.as_deref(),
        )?;

        store.add_reference(self.state.logical_root, page, ReferenceKind::LogicalPhysical)?;
        Ok(page)
    }

    fn apply<S: StructureStore>(
        &mut self,
        store: &mut S,
        page: NodeId,
        barcode: &Barcode,
        directive: Directive,
    ) -> Result<()> {
        match directive {
            Directive::CreateSinglePageUnit(target) => {
                let unit = store.create_node(target.ty)?;
                self.record_barcode(store, unit, barcode)?;
                store.add_child(self.state.logical_root, unit)?;
                store.add_reference(unit, page, ReferenceKind::LogicalPhysical)?;
                self.report.single_page_units += 1;
                debug!(docstruct = %target.name, "single-page structure created");
            }
            Directive::OpenMultiPageGroup(target) => {
                let group = store.create_node(target.ty)?;
                store.add_child(self.state.logical_root, group)?;
                self.record_barcode(store, group, barcode)?;
                if let GroupState::InGroup(previous) = self.state.group {
                    debug!(%previous, "open multi-page structure replaced without terminator");
                }
                self.state.group = GroupState::InGroup(group);
                self.report.groups_opened += 1;
                debug!(docstruct = %target.name, "multi-page structure opened");
            }
            Directive::CloseMultiPageGroup => {
                self.state.group = GroupState::Idle;
            }
        }
        Ok(())
    }

    fn record_barcode<S: StructureStore>(
        &self,
        store: &mut S,
        unit: NodeId,
        barcode: &Barcode,
    ) -> Result<()> {
        if let Some(ty) = self.template.uuid_metadatum {
            store.set_metadatum(unit, ty, Some(&barcode.text))?;
        }
        Ok(())
    }
}

/// Remove every page, its content files, and the references pointing at it,
/// then every logical child of `logical_root`.
///
/// References are dropped before the pages are detached so no logical unit
/// is left pointing at a removed page. Resetting an empty structure does
/// nothing.
#[instrument(skip(store))]
pub fn reset_structure<S: StructureStore>(
    store: &mut S,
    logical_root: NodeId,
    physical_root: NodeId,
) -> Result<()> {
    let pages = store.children(physical_root)?;
    for page in &pages {
        for location in store.content_files(*page)? {
            store.remove_content_file(*page, &location)?;
        }
        for source in store.references_to(*page)? {
            store.remove_reference(source, *page)?;
        }
    }
    for page in pages {
        store.remove_child(physical_root, page)?;
    }
    for child in store.children(logical_root)? {
        store.remove_child(logical_root, child)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Drives one structuring job over a document's pages.
#[derive(Debug, Clone)]
pub struct StructureBuilder<D> {
    pub(crate) config: ScannerConfig,
    pub(crate) detector: D,
}

impl<D: BarcodeDetector> StructureBuilder<D> {
    pub fn new(config: ScannerConfig, detector: D) -> Self {
        Self { config, detector }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn policy(&self) -> DetectionPolicy {
        DetectionPolicy::from_config(&self.config)
    }

    /// Build the structure of `store` from the pages of `images`.
    ///
    /// On error the store may hold a partial tree; the caller must not
    /// persist it.
    #[instrument(skip_all, fields(images = %images.describe()))]
    pub fn run<S, I>(&self, store: &mut S, images: &I) -> Result<RunReport>
    where
        S: StructureStore,
        I: ImageSource + ?Sized,
    {
        let names = images.image_names()?;
        if names.is_empty() {
            return Err(TrennblattError::NoImages(images.describe()));
        }

        let Some(mut run) = self.begin(store)? else {
            return Ok(RunReport::skipped());
        };

        let policy = self.policy();
        for name in &names {
            let barcodes = detect_page(images, &self.detector, policy, name)?;
            run.fold_page(store, name, &images.location(name), &barcodes)?;
        }

        let report = run.finish();
        info!(
            pages = report.pages,
            single_page_units = report.single_page_units,
            groups_opened = report.groups_opened,
            "structure built"
        );
        Ok(report)
    }

    /// Resolve mapping and types, then skip or reset existing pages.
    ///
    /// Returns `None` when existing pages are kept and the run is skipped.
    /// Nothing is mutated unless the mapping and every required type resolve.
    pub fn begin<S: StructureStore>(&self, store: &mut S) -> Result<Option<BuildRun>> {
        let top = store.logical_root();
        let parent_struct = store.type_name(top)?.to_string();
        let mapping = StructureMapping::from_config(&self.config, &parent_struct)?;

        let mut diagnostics = Vec::new();
        let template = PageTemplate::resolve(store, &self.config, &mut diagnostics)?;

        let logical_root = if store.is_anchor(top)? {
            store
                .children(top)?
                .first()
                .copied()
                .ok_or_else(|| TrennblattError::EmptyAnchor(parent_struct.clone()))?
        } else {
            top
        };
        let physical_root = store.physical_root();

        if !store.children(physical_root)?.is_empty() {
            if self.config.skip_when_data_exists {
                info!(%parent_struct, "pages already exist, skipping");
                return Ok(None);
            }
            info!(%parent_struct, "removing existing pages");
            reset_structure(store, logical_root, physical_root)?;
        }

        Ok(Some(BuildRun {
            state: BuildState::new(logical_root, physical_root),
            classifier: BarcodeClassifier::new(mapping),
            template,
            report: RunReport {
                diagnostics,
                ..RunReport::default()
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ManifestDetector;
    use crate::source::MemoryImageSource;
    use crate::testing::{images, store};
    use trennblatt_core::types::{BarcodeFormat, ClassifyMode};
    use trennblatt_structure::{MemoryStore, SchemaLookup};

    const CONFIG: &str = r#"
        uuid_metadatum = "CatalogIDDigital"

        [[single_page_structures]]
        barcode = "111"
        docstruct = "Chapter"

        [[single_page_structures]]
        barcode = "555"
        docstruct = "Volume"

        [[multipage_structures]]
        barcode = "222"
        docstruct = "Book"

        [[multipage_structures]]
        barcode = "333"
        docstruct = "Chapter"

        [[multipage_structures]]
        barcode = "999"
        docstruct = "DocStructEnd"
    "#;

    fn ean(text: &str) -> Vec<Barcode> {
        vec![Barcode::new(text, BarcodeFormat::Ean13)]
    }

    fn builder(detector: ManifestDetector) -> StructureBuilder<ManifestDetector> {
        let config = ScannerConfig::from_toml_str(CONFIG).expect("config");
        StructureBuilder::new(config, detector)
    }

    /// Pages of the logical child at `index`, as 1-based physical orders.
    fn unit_pages(store: &MemoryStore, index: usize) -> Vec<usize> {
        store.snapshot().logical.children[index].pages.clone()
    }

    #[test]
    fn worked_example() {
        let detector = ManifestDetector::new()
            .with("p2", ean("222"))
            .with("p4", ean("111"))
            .with("p5", ean("999"));
        let mut store = store("Monograph");
        let report = builder(detector)
            .run(&mut store, &images(&["p1", "p2", "p3", "p4", "p5"]))
            .expect("run");

        assert_eq!(report.pages, 5);
        assert_eq!(report.groups_opened, 1);
        assert_eq!(report.single_page_units, 1);
        assert!(!report.open_group_at_end);
        assert!(report.diagnostics.is_empty());

        let snapshot = store.snapshot();
        let children = &snapshot.logical.children;
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].ty, "Book");
        assert_eq!(children[0].pages, vec![2, 3, 4]);
        assert_eq!(children[1].ty, "Chapter");
        assert_eq!(children[1].pages, vec![4]);
        assert_eq!(snapshot.logical.pages, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn pages_are_numbered_in_scan_order() {
        let mut store = store("Monograph");
        builder(ManifestDetector::new())
            .run(&mut store, &images(&["a", "b", "c"]))
            .expect("run");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.pages.len(), 3);
        for (index, page) in snapshot.pages.iter().enumerate() {
            assert_eq!(page.order, index + 1);
            let number = (index + 1).to_string();
            assert_eq!(page.metadata["physPageNumber"], Some(number));
            assert_eq!(page.metadata["logicalPageNumber"], None);
        }
        assert_eq!(snapshot.pages[1].files, vec!["file:///scans/b".to_string()]);
        assert!(snapshot.logical.children.is_empty());
    }

    #[test]
    fn logical_page_label_is_applied() {
        let mut config = ScannerConfig::from_toml_str(CONFIG).expect("config");
        config.logical_page_label = Some("uncounted".into());
        let mut store = store("Monograph");
        StructureBuilder::new(config, ManifestDetector::new())
            .run(&mut store, &images(&["a"]))
            .expect("run");

        let page = store.snapshot().pages[0].clone();
        assert_eq!(page.metadata["logicalPageNumber"].as_deref(), Some("uncounted"));
    }

    #[test]
    fn unmatched_barcode_changes_nothing() {
        let detector = ManifestDetector::new().with("b", ean("4006381333931"));
        let mut store = store("Monograph");
        let report = builder(detector)
            .run(&mut store, &images(&["a", "b", "c"]))
            .expect("run");

        assert_eq!(report.single_page_units + report.groups_opened, 0);
        assert!(store.snapshot().logical.children.is_empty());
    }

    #[test]
    fn open_replaces_previous_group() {
        let detector = ManifestDetector::new()
            .with("p1", ean("222"))
            .with("p2", ean("333"));
        let mut store = store("Monograph");
        let report = builder(detector)
            .run(&mut store, &images(&["p1", "p2", "p3", "p4"]))
            .expect("run");

        assert!(report.open_group_at_end);
        assert_eq!(unit_pages(&store, 0), vec![1]);
        assert_eq!(unit_pages(&store, 1), vec![2, 3, 4]);
    }

    #[test]
    fn close_while_idle_is_a_no_op() {
        let detector = ManifestDetector::new()
            .with("p1", ean("999"))
            .with("p2", ean("222"))
            .with("p3", ean("999"))
            .with("p4", ean("999"));
        let mut store = store("Monograph");
        let report = builder(detector)
            .run(&mut store, &images(&["p1", "p2", "p3", "p4", "p5"]))
            .expect("run");

        assert_eq!(report.groups_opened, 1);
        assert!(!report.open_group_at_end);
        assert_eq!(unit_pages(&store, 0), vec![2]);
    }

    #[test]
    fn single_page_unit_inside_open_group() {
        let detector = ManifestDetector::new()
            .with("p1", ean("222"))
            .with("p3", ean("111"));
        let mut store = store("Monograph");
        builder(detector)
            .run(&mut store, &images(&["p1", "p2", "p3", "p4"]))
            .expect("run");

        assert_eq!(unit_pages(&store, 0), vec![1, 2, 3, 4]);
        assert_eq!(unit_pages(&store, 1), vec![3]);
    }

    #[test]
    fn barcode_text_is_copied_to_created_units() {
        let detector = ManifestDetector::new()
            .with("p1", ean("222"))
            .with("p2", ean("111"));
        let mut store = store("Monograph");
        builder(detector)
            .run(&mut store, &images(&["p1", "p2"]))
            .expect("run");

        let children = store.snapshot().logical.children;
        assert_eq!(children[0].metadata["CatalogIDDigital"].as_deref(), Some("222"));
        assert_eq!(children[1].metadata["CatalogIDDigital"].as_deref(), Some("111"));
    }

    #[test]
    fn empty_uuid_metadatum_disables_the_copy() {
        let mut config = ScannerConfig::from_toml_str(CONFIG).expect("config");
        config.uuid_metadatum = Some(String::new());
        let detector = ManifestDetector::new().with("p1", ean("111"));
        let mut store = store("Monograph");
        let report = StructureBuilder::new(config, detector)
            .run(&mut store, &images(&["p1"]))
            .expect("run");

        assert!(report.diagnostics.is_empty());
        let children = store.snapshot().logical.children;
        assert!(children[0].metadata.is_empty());
    }

    #[test]
    fn unknown_structure_type_is_a_diagnostic() {
        let detector = ManifestDetector::new().with("p1", ean("555"));
        let mut store = store("Monograph");
        let report = builder(detector)
            .run(&mut store, &images(&["p1", "p2"]))
            .expect("run");

        assert_eq!(report.outcome(), StepOutcome::Finished);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::UnknownStructureType {
                key: "555".into(),
                docstruct: "Volume".into(),
            }]
        );
        assert!(store.snapshot().logical.children.is_empty());
    }

    #[test]
    fn unknown_uuid_metadatum_is_a_diagnostic() {
        let mut config = ScannerConfig::from_toml_str(CONFIG).expect("config");
        config.uuid_metadatum = Some("BarcodeUUID".into());
        let detector = ManifestDetector::new().with("p1", ean("111"));
        let mut store = store("Monograph");
        let report = StructureBuilder::new(config, detector)
            .run(&mut store, &images(&["p1"]))
            .expect("run");

        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::UnknownMetadataType {
                name: "BarcodeUUID".into()
            }]
        );
        assert_eq!(report.single_page_units, 1);
    }

    #[test]
    fn multiple_barcodes_on_one_page_apply_in_order() {
        let mut config = ScannerConfig::from_toml_str(CONFIG).expect("config");
        config.multiple_barcodes = true;
        let detector = ManifestDetector::new()
            .with("p1", ean("222"))
            .with(
                "p3",
                vec![
                    Barcode::new("999", BarcodeFormat::Ean13),
                    Barcode::new("333", BarcodeFormat::Ean13),
                ],
            );
        let mut store = store("Monograph");
        StructureBuilder::new(config, detector)
            .run(&mut store, &images(&["p1", "p2", "p3", "p4"]))
            .expect("run");

        // Close then reopen on p3: p3 starts the second group.
        assert_eq!(unit_pages(&store, 0), vec![1, 2]);
        assert_eq!(unit_pages(&store, 1), vec![3, 4]);
    }

    #[test]
    fn only_first_barcode_without_multiple_mode() {
        let detector = ManifestDetector::new().with(
            "p1",
            vec![
                Barcode::new("111", BarcodeFormat::Ean13),
                Barcode::new("222", BarcodeFormat::Ean13),
            ],
        );
        let mut store = store("Monograph");
        let report = builder(detector)
            .run(&mut store, &images(&["p1", "p2"]))
            .expect("run");

        assert_eq!(report.single_page_units, 1);
        assert_eq!(report.groups_opened, 0);
    }

    #[test]
    fn format_mode_classifies_by_symbology() {
        let config = ScannerConfig::from_toml_str(
            r#"
            classify_by = "format"

            [[multipage_structures]]
            format = "QR_CODE"
            docstruct = "Book"

            [[multipage_structures]]
            format = "CODE_128"
            docstruct = "DocStructEnd"
            "#,
        )
        .expect("config");
        assert_eq!(config.classify_by, ClassifyMode::Format);

        let detector = ManifestDetector::new()
            .with("p1", vec![Barcode::new("vol-1", BarcodeFormat::QrCode)])
            .with("p3", vec![Barcode::new("end", BarcodeFormat::Code128)]);
        let mut store = store("Monograph");
        StructureBuilder::new(config, detector)
            .run(&mut store, &images(&["p1", "p2", "p3"]))
            .expect("run");

        assert_eq!(unit_pages(&store, 0), vec![1, 2]);
    }

    #[test]
    fn anchor_documents_build_under_first_child() {
        let mut store = store("Periodical");
        let volume_ty = store
            .lookup_structure_type("PeriodicalVolume")
            .expect("PeriodicalVolume");
        let volume = store.create_node(volume_ty).expect("volume");
        let top = store.logical_root();
        store.add_child(top, volume).expect("append volume");

        let detector = ManifestDetector::new().with("p1", ean("222"));
        let mut config = ScannerConfig::from_toml_str(CONFIG).expect("config");
        config.uuid_metadatum = None;
        StructureBuilder::new(config, detector)
            .run(&mut store, &images(&["p1", "p2"]))
            .expect("run");

        let snapshot = store.snapshot();
        assert!(snapshot.logical.pages.is_empty());
        let volume = &snapshot.logical.children[0];
        assert_eq!(volume.ty, "PeriodicalVolume");
        assert_eq!(volume.pages, vec![1, 2]);
        assert_eq!(volume.children[0].ty, "Book");
        assert_eq!(volume.children[0].pages, vec![1, 2]);
    }

    #[test]
    fn empty_anchor_is_an_error() {
        let mut store = store("Periodical");
        let result = builder(ManifestDetector::new()).run(&mut store, &images(&["p1"]));
        assert!(matches!(result, Err(TrennblattError::EmptyAnchor(_))));
    }

    #[test]
    fn parent_struct_scopes_the_mapping() {
        let config = ScannerConfig::from_toml_str(
            r#"
            [[single_page_structures]]
            parent_struct = "Periodical"
            barcode = "111"
            docstruct = "Chapter"
            "#,
        )
        .expect("config");
        let detector = ManifestDetector::new().with("p1", ean("111"));
        let mut store = store("Monograph");
        let report = StructureBuilder::new(config, detector)
            .run(&mut store, &images(&["p1"]))
            .expect("run");

        assert_eq!(report.single_page_units, 0);
    }

    #[test]
    fn skip_when_data_exists_leaves_tree_unchanged() {
        let detector = ManifestDetector::new().with("p1", ean("111"));
        let mut store = store("Monograph");
        builder(detector.clone())
            .run(&mut store, &images(&["p1", "p2"]))
            .expect("first run");
        let before = store.snapshot();

        let mut config = ScannerConfig::from_toml_str(CONFIG).expect("config");
        config.skip_when_data_exists = true;
        let report = StructureBuilder::new(config, detector)
            .run(&mut store, &images(&["p1", "p2", "p3"]))
            .expect("second run");

        assert_eq!(report.outcome(), StepOutcome::Skipped);
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn rerun_replaces_existing_structure() {
        let detector = ManifestDetector::new().with("p1", ean("111"));
        let mut store = store("Monograph");
        let builder = builder(detector);
        builder
            .run(&mut store, &images(&["p1", "p2", "p3"]))
            .expect("first run");
        builder
            .run(&mut store, &images(&["p1", "p2"]))
            .expect("second run");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.pages.len(), 2);
        assert_eq!(snapshot.logical.pages, vec![1, 2]);
        assert_eq!(snapshot.logical.children.len(), 1);
        assert_eq!(store.file_set().len(), 2);
    }

    #[test]
    fn reset_detaches_references_before_removal() {
        let detector = ManifestDetector::new().with("p1", ean("222"));
        let mut store = store("Monograph");
        builder(detector)
            .run(&mut store, &images(&["p1", "p2"]))
            .expect("run");
        let physical = store.physical_root();
        let pages = store.children(physical).expect("pages");

        let logical = store.logical_root();
        reset_structure(&mut store, logical, physical).expect("reset");

        for page in pages {
            assert!(store.references_to(page).expect("refs").is_empty());
            assert!(store.content_files(page).expect("files").is_empty());
        }
        assert!(store.children(physical).expect("pages").is_empty());
        assert!(store.children(logical).expect("children").is_empty());
        assert!(store.file_set().is_empty());
    }

    #[test]
    fn reset_twice_on_empty_structure_is_a_no_op() {
        let mut store = store("Monograph");
        let logical = store.logical_root();
        let physical = store.physical_root();
        let before = store.snapshot();

        reset_structure(&mut store, logical, physical).expect("first reset");
        reset_structure(&mut store, logical, physical).expect("second reset");
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn no_images_is_an_error() {
        let mut store = store("Monograph");
        let empty = MemoryImageSource::new("file:///scans/");
        let result = builder(ManifestDetector::new()).run(&mut store, &empty);
        assert!(matches!(result, Err(TrennblattError::NoImages(_))));
        assert!(store.snapshot().pages.is_empty());
    }

    #[test]
    fn unreadable_image_aborts_the_run() {
        let mut source = images(&["p1"]);
        source.push("p2", b"not an image".to_vec());
        let mut store = store("Monograph");

        let result = builder(ManifestDetector::new()).run(&mut store, &source);
        assert!(matches!(
            result,
            Err(TrennblattError::ImageRead { ref image, .. }) if image == "p2"
        ));
        assert_eq!(
            RunReport::outcome_of(&result),
            StepOutcome::Error(result.as_ref().expect_err("error").to_string())
        );
    }

    #[test]
    fn missing_page_type_aborts_before_mutation() {
        let ruleset = trennblatt_structure::Ruleset::from_toml_str(
            r#"
            [[structure]]
            name = "Monograph"

            [[structure]]
            name = "BoundBook"
            "#,
        )
        .expect("ruleset");
        let mut store = MemoryStore::new(ruleset, "Monograph", "BoundBook").expect("store");

        let result = builder(ManifestDetector::new()).run(&mut store, &images(&["p1"]));
        assert!(matches!(
            result,
            Err(TrennblattError::UnknownStructureType(ref name)) if name == "page"
        ));
        assert!(store.snapshot().pages.is_empty());
    }

    #[test]
    fn schema_violation_aborts_the_run() {
        // BoundBook is a known type but may not nest under a Monograph.
        let config = ScannerConfig::from_toml_str(
            r#"
            [[single_page_structures]]
            barcode = "111"
            docstruct = "BoundBook"
            "#,
        )
        .expect("config");
        let detector = ManifestDetector::new().with("p1", ean("111"));
        let mut store = store("Monograph");

        let result = StructureBuilder::new(config, detector).run(&mut store, &images(&["p1"]));
        assert!(matches!(result, Err(TrennblattError::ChildNotAllowed { .. })));
    }

    #[test]
    fn fold_page_tracks_group_state() {
        let mut store = store("Monograph");
        let builder = builder(ManifestDetector::new());
        let mut run = builder.begin(&mut store).expect("begin").expect("not skipped");
        assert_eq!(run.state().group(), GroupState::Idle);

        run.fold_page(&mut store, "p1", "file:///scans/p1", &ean("222"))
            .expect("p1");
        assert!(matches!(run.state().group(), GroupState::InGroup(_)));
        assert_eq!(run.state().page_index(), 1);

        run.fold_page(&mut store, "p2", "file:///scans/p2", &ean("999"))
            .expect("p2");
        assert_eq!(run.state().group(), GroupState::Idle);

        let report = run.finish();
        assert_eq!(report.pages, 2);
        assert_eq!(unit_pages(&store, 0), vec![1]);
    }
}
