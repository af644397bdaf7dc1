//! XSD Helper
//!
//! Derives two artifacts from a compiled W3C XML Schema:
//!
//! - a directed graph of structural dependencies between named declarations,
//!   with topological ordering and root detection
//! - a flat list of path-qualified fields for CSV export
//!
//! ## Architecture
//!
//! ```text
//! .xsd files ──▶ SchemaLoader ──▶ SchemaSet
//!                                    │
//!                 ┌──────────────────┴──────────────────┐
//!                 ▼                                     ▼
//!        DependencyVisitor                        XPathEmitter
//!                 │                                     │
//!                 ▼                                     ▼
//!   DependencyGraph ──▶ TopologicalSorter        RecordWriter (CSV)
//! ```
//!
//! Both visitors implement [`visit::SchemaVisitor`] and share its structural
//! recursion. They differ in how they stop on cycles: the dependency visitor
//! expands each element declaration once, the emitter refuses to enter an
//! element whose name is already on the current path.

pub mod config;
pub mod edge;
pub mod error;
pub mod export;
pub mod schema;
pub mod topo;
pub mod visit;

pub use config::HelperConfig;
pub use edge::Edge;
pub use error::{ReferenceKind, Result, XsdError};
pub use export::{extract_xpaths, AttributeLayout, ExportOptions, Record, RecordWriter};
pub use schema::{LoadConfig, QName, RootDecl, SchemaLoader, SchemaSet};
pub use topo::{CyclePolicy, TopologicalSorter};
pub use visit::{DependencyGraph, DependencyVisitor, SchemaVisitor, XPathEmitter};
