// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Trennblatt.

use thiserror::Error;

use crate::types::NodeId;

/// Top-level error type for all Trennblatt operations.
///
/// Every variant is fatal for the run that produced it. Soft conditions
/// (unknown mapping targets, images without barcodes) are reported as
/// diagnostics on the run report instead.
#[derive(Debug, Error)]
pub enum TrennblattError {
    // -- Configuration errors --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("configuration could not be parsed: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // -- Image errors --
    #[error("unable to read image {image}: {reason}")]
    ImageRead { image: String, reason: String },

    #[error("barcode detection failed on image {image}: {reason}")]
    Detection { image: String, reason: String },

    #[error("no images found in {0}")]
    NoImages(String),

    // -- Structure errors --
    #[error("structure type {0} is not defined in the ruleset")]
    UnknownStructureType(String),

    #[error("metadata type {0} is not defined in the ruleset")]
    UnknownMetadataType(String),

    #[error("structure type {child} is not allowed as a child of {parent}")]
    ChildNotAllowed { parent: String, child: String },

    #[error("metadata type {metadata} is not allowed for structure type {structure}")]
    MetadataNotAllowed { metadata: String, structure: String },

    #[error("structure node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("anchor structure {0} has no child to attach pages to")]
    EmptyAnchor(String),

    // -- Ticket queue --
    #[error("database error: {0}")]
    Database(String),

    #[error("ticket {0} not found")]
    TicketNotFound(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TrennblattError>;
