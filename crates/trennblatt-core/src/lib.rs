// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trennblatt-core: types, errors and configuration shared by the other crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{MappingEntry, ScannerConfig};
pub use error::TrennblattError;
pub use types::*;
