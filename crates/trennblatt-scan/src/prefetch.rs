// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Prefetching runner. Image decoding and barcode detection for upcoming pages
// run on the blocking pool while earlier pages are folded into the structure.
// Results are consumed strictly in scan order, so the built structure is the
// same as with `StructureBuilder::run`.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::types::Barcode;
use trennblatt_structure::StructureStore;

use crate::builder::{RunReport, StructureBuilder};
use crate::detect::{BarcodeDetector, DetectionPolicy, detect_page};
use crate::source::ImageSource;

type Detection = (String, JoinHandle<Result<Vec<Barcode>>>);

impl<D> StructureBuilder<Arc<D>>
where
    D: BarcodeDetector + Send + Sync + 'static,
{
    /// Like [`StructureBuilder::run`], with up to `depth` pages detected ahead.
    ///
    /// A `depth` of zero is treated as one.
    #[instrument(skip_all, fields(images = %images.describe(), depth))]
    pub async fn run_prefetched<S, I>(
        &self,
        store: &mut S,
        images: Arc<I>,
        depth: usize,
    ) -> Result<RunReport>
    where
        S: StructureStore,
        I: ImageSource + Send + Sync + 'static,
    {
        let names = images.image_names()?;
        if names.is_empty() {
            return Err(TrennblattError::NoImages(images.describe()));
        }

        let Some(mut run) = self.begin(store)? else {
            return Ok(RunReport::skipped());
        };

        let policy = self.policy();
        let mut names = names.into_iter();
        let mut in_flight: VecDeque<Detection> = names
            .by_ref()
            .take(depth.max(1))
            .map(|name| spawn_detection(&images, &self.detector, policy, name))
            .collect();

        while let Some((name, handle)) = in_flight.pop_front() {
            if let Some(next) = names.next() {
                in_flight.push_back(spawn_detection(&images, &self.detector, policy, next));
            }
            let folded = match handle.await {
                Ok(Ok(barcodes)) => run
                    .fold_page(store, &name, &images.location(&name), &barcodes)
                    .map(|_| ()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(TrennblattError::Detection {
                    image: name.clone(),
                    reason: e.to_string(),
                }),
            };
            if let Err(e) = folded {
                cancel_detections(in_flight).await;
                return Err(e);
            }
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
}

/// Abort detections that have not started and wait for the running ones, so
/// no work outlives a failed run.
async fn cancel_detections(in_flight: VecDeque<Detection>) {
    for (_, handle) in &in_flight {
        handle.abort();
    }
    for (name, handle) in in_flight {
        if handle.await.is_err() {
            debug!(image = %name, "detection cancelled");
        }
    }
}

fn spawn_detection<I, D>(
    images: &Arc<I>,
    detector: &Arc<D>,
    policy: DetectionPolicy,
    name: String,
) -> Detection
where
    I: ImageSource + Send + Sync + 'static,
    D: BarcodeDetector + Send + Sync + 'static,
{
    let images = Arc::clone(images);
    let detector = Arc::clone(detector);
    let page = name.clone();
    let handle =
        tokio::task::spawn_blocking(move || detect_page(&*images, &*detector, policy, &page));
    (name, handle)
}
