// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Trennblatt command line.
//
// `run` builds the structure of one document immediately, `submit` queues the
// same job as a ticket, and `work` drains the ticket queue.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::{BarcodeTicket, ScannerConfig};
use trennblatt_scan::{
    DirectoryImageSource, ManifestDetector, RunReport, StructureBuilder, TicketQueue,
};
use trennblatt_structure::{MemoryStore, Ruleset, SchemaLookup, StructureSnapshot, StructureStore};

#[derive(Parser, Debug)]
#[command(name = "trennblatt")]
#[command(about = "Build document structure from divider-sheet barcodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the structure of one document now.
    ///
    /// The structure is built into a new, empty document, so
    /// `skip_when_data_exists` and the removal of existing pages never
    /// apply here; they matter to hosts that hand the builder an existing
    /// document.
    Run {
        #[command(flatten)]
        job: JobArgs,

        /// Detect this many pages ahead on the blocking pool.
        #[arg(long)]
        prefetch: Option<usize>,
    },
    /// Queue a job for a worker.
    Submit {
        #[arg(long, env = "TRENNBLATT_QUEUE")]
        queue: PathBuf,

        #[arg(long, default_value_t = 0)]
        process_id: i64,

        /// Defaults to the image folder name.
        #[arg(long)]
        process_name: Option<String>,

        #[command(flatten)]
        job: JobArgs,
    },
    /// Run every pending ticket, oldest first.
    ///
    /// Like `run`, each ticket is built into a new, empty document, so
    /// `skip_when_data_exists` and the removal of existing pages never apply.
    Work {
        #[arg(long, env = "TRENNBLATT_QUEUE")]
        queue: PathBuf,
    },
    /// Print all tickets as JSON.
    Tickets {
        #[arg(long, env = "TRENNBLATT_QUEUE")]
        queue: PathBuf,
    },
}

/// Inputs of one structuring job.
#[derive(Args, Debug, Clone)]
struct JobArgs {
    /// Scanner configuration (TOML). Built-in defaults when omitted.
    #[arg(long, env = "TRENNBLATT_CONFIG")]
    config: Option<PathBuf>,

    /// Ruleset defining structure and metadata types (TOML).
    #[arg(long, env = "TRENNBLATT_RULESET")]
    ruleset: PathBuf,

    /// Folder holding the page images.
    #[arg(long)]
    images: PathBuf,

    /// Barcode manifest (JSON) decoded by the external reader.
    #[arg(long)]
    barcodes: PathBuf,

    #[arg(long, default_value = "Monograph")]
    doc_type: String,

    #[arg(long, default_value = "BoundBook")]
    physical_type: String,

    /// Child created under an anchor document type (e.g. a periodical's
    /// volume). Defaults to the first child type the ruleset allows.
    #[arg(long)]
    volume_type: Option<String>,

    /// Write the structure here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

const PROP_CONFIG: &str = "config";
const PROP_RULESET: &str = "ruleset";
const PROP_IMAGES: &str = "images";
const PROP_BARCODES: &str = "barcodes";
const PROP_DOC_TYPE: &str = "doc_type";
const PROP_PHYSICAL_TYPE: &str = "physical_type";
const PROP_VOLUME_TYPE: &str = "volume_type";
const PROP_OUTPUT: &str = "output";

impl JobArgs {
    fn to_ticket(&self, process_id: i64, process_name: String) -> BarcodeTicket {
        let path = |p: &Path| p.display().to_string();
        let mut ticket = BarcodeTicket::new(process_id, process_name)
            .with_property(PROP_RULESET, path(&self.ruleset))
            .with_property(PROP_IMAGES, path(&self.images))
            .with_property(PROP_BARCODES, path(&self.barcodes))
            .with_property(PROP_DOC_TYPE, self.doc_type.as_str())
            .with_property(PROP_PHYSICAL_TYPE, self.physical_type.as_str());
        if let Some(config) = &self.config {
            ticket = ticket.with_property(PROP_CONFIG, path(config));
        }
        if let Some(volume_type) = &self.volume_type {
            ticket = ticket.with_property(PROP_VOLUME_TYPE, volume_type.as_str());
        }
        if let Some(output) = &self.output {
            ticket = ticket.with_property(PROP_OUTPUT, path(output));
        }
        ticket
    }

    fn from_ticket(ticket: &BarcodeTicket) -> Result<Self> {
        let required = |key: &str| {
            ticket.property(key).map(str::to_string).ok_or_else(|| {
                TrennblattError::Config(format!("ticket {} has no {key} property", ticket.id))
            })
        };
        Ok(Self {
            config: ticket.property(PROP_CONFIG).map(PathBuf::from),
            ruleset: required(PROP_RULESET)?.into(),
            images: required(PROP_IMAGES)?.into(),
            barcodes: required(PROP_BARCODES)?.into(),
            doc_type: required(PROP_DOC_TYPE)?,
            physical_type: ticket
                .property(PROP_PHYSICAL_TYPE)
                .unwrap_or("BoundBook")
                .to_string(),
            volume_type: ticket.property(PROP_VOLUME_TYPE).map(str::to_string),
            output: ticket.property(PROP_OUTPUT).map(PathBuf::from),
        })
    }

    fn prepare(&self) -> Result<Job> {
        let config = match &self.config {
            Some(path) => ScannerConfig::load(path)?,
            None => ScannerConfig::default(),
        };
        let ruleset = Ruleset::load(&self.ruleset)?;
        let detector = ManifestDetector::load(&self.barcodes)?;
        let mut store = MemoryStore::new(ruleset, &self.doc_type, &self.physical_type)?;
        open_volume(&mut store, self.volume_type.as_deref())?;
        Ok(Job {
            builder: StructureBuilder::new(config, Arc::new(detector)),
            store,
            images: DirectoryImageSource::new(&self.images),
        })
    }
}

/// Give an anchor document the child its pages are built under.
fn open_volume(store: &mut MemoryStore, volume_type: Option<&str>) -> Result<()> {
    let root = store.logical_root();
    if !store.is_anchor(root)? {
        return Ok(());
    }
    let doc_type = store.type_name(root)?.to_string();
    let volume_type = match volume_type {
        Some(name) => name.to_string(),
        None => store
            .ruleset()
            .lookup_structure_type(&doc_type)
            .and_then(|ty| store.ruleset().structure(ty))
            .and_then(|def| def.children.first().cloned())
            .ok_or_else(|| TrennblattError::EmptyAnchor(doc_type.clone()))?,
    };
    let ty = store
        .lookup_structure_type(&volume_type)
        .ok_or_else(|| TrennblattError::UnknownStructureType(volume_type.clone()))?;
    let volume = store.create_node(ty)?;
    store.add_child(root, volume)?;
    info!(%doc_type, %volume_type, "anchor child created");
    Ok(())
}

struct Job {
    builder: StructureBuilder<Arc<ManifestDetector>>,
    store: MemoryStore,
    images: DirectoryImageSource,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    report: &'a RunReport,
    structure: StructureSnapshot,
}

fn write_output(report: &RunReport, store: &MemoryStore, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&RunOutput {
        report,
        structure: store.snapshot(),
    })?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(path = %path.display(), "structure written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn run(job: JobArgs, prefetch: Option<usize>) -> Result<()> {
    let Job {
        builder,
        mut store,
        images,
    } = job.prepare()?;
    let report = match prefetch {
        Some(depth) => {
            builder
                .run_prefetched(&mut store, Arc::new(images), depth)
                .await?
        }
        None => builder.run(&mut store, &images)?,
    };
    for diagnostic in &report.diagnostics {
        warn!(%diagnostic, "configuration problem");
    }
    write_output(&report, &store, job.output.as_deref())
}

/// Build the structure for one ticket. Output goes to stdout unless the
/// ticket names a file.
fn work_ticket(ticket: &BarcodeTicket) -> Result<RunReport> {
    let job = JobArgs::from_ticket(ticket)?;
    let Job {
        builder,
        mut store,
        images,
    } = job.prepare()?;
    let report = builder.run(&mut store, &images)?;
    if !report.skipped {
        write_output(&report, &store, job.output.as_deref())?;
    }
    Ok(report)
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { job, prefetch } => run(job, prefetch).await,
        Command::Submit {
            queue,
            process_id,
            process_name,
            job,
        } => {
            let process_name = process_name.unwrap_or_else(|| {
                job.images
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let ticket = job.to_ticket(process_id, process_name);
            let outcome = TicketQueue::open(&queue)?.submit(&ticket)?;
            println!("{} {outcome:?}", ticket.id);
            Ok(())
        }
        Command::Work { queue } => {
            let queue = TicketQueue::open(&queue)?;
            let completed = queue.process_pending(|ticket| {
                let result = work_ticket(ticket);
                if let Err(e) = &result {
                    error!(ticket_id = %ticket.id, error = %e, "structuring failed");
                }
                RunReport::outcome_of(&result)
            })?;
            info!(completed, "queue drained");
            Ok(())
        }
        Command::Tickets { queue } => {
            let tickets = TicketQueue::open(&queue)?.all_tickets()?;
            println!("{}", serde_json::to_string_pretty(&tickets)?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "trennblatt failed");
            ExitCode::FAILURE
        }
    }
}
