// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trennblatt-structure: the document structure model.
//
// Defines the `StructureStore` capability the structure builder mutates, the
// ruleset schema that decides which types exist and how they nest, and an
// in-memory arena store used by the command line tool and the tests.

pub mod memory;
pub mod ruleset;
pub mod store;

pub use memory::{LogicalSnapshot, MemoryStore, PageSnapshot, StructureSnapshot};
pub use ruleset::{LOGICAL_PAGE_NUMBER, PAGE_TYPE, PHYS_PAGE_NUMBER, Ruleset};
pub use store::{SchemaLookup, StructureStore};
