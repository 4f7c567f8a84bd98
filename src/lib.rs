// src/lib.rs

//! stocktake SBOM cataloging engine
//!
//! Produces a Software Bill of Materials for a software artifact: a layered
//! image filesystem, a directory tree, or an archive.
//!
//! # Architecture
//!
//! - Sources: any input presented behind a uniform, content-addressed file
//!   resolver with a selectable visibility scope (squashed vs. all layers)
//! - Catalogers: a pluggable fleet that claims files by glob or MIME type
//!   and emits packages with typed, ecosystem-specific metadata
//! - File catalog: per-file digests, MIME, license evidence, and
//!   executable hardening analysis, coordinated with package cataloging
//! - Relationships: file-ownership, overlap, and evidence edges with
//!   precise elision semantics for classifier-found binaries
//! - Formats: bidirectional codecs for the native document plus SPDX and
//!   CycloneDX in their JSON, tag-value, and XML serializations
//!
//! The main execution path:
//!
//! 1. Resolve a user input string to a [`source::Source`]
//! 2. Run the selected catalogers against its resolver, merging discovered
//!    packages into a single collection
//! 3. Encode the assembled [`sbom::Sbom`] with one or more format encoders

pub mod archive;
pub mod artifact;
pub mod bus;
pub mod cancel;
pub mod catalog;
pub mod cataloging;
mod error;
pub mod event;
pub mod file;
pub mod filecatalog;
pub mod format;
pub mod hash;
pub mod linux;
pub mod pkg;
pub mod sbom;
pub mod source;

pub use artifact::{ArtifactId, Identifiable, Relationship, RelationshipNode, RelationshipType};
pub use cancel::CancelToken;
pub use catalog::{catalog_source, catalog_source_with_scanner, CatalogConfig, CatalogOutcome};
pub use error::{Error, Result};
pub use sbom::{Artifacts, Descriptor, Sbom};
pub use source::{get_source, GetSourceConfig, Scope, Source};

/// Install the process-wide event sink for all engine progress events
/// (in-library subscriptions are not supported).
pub fn set_bus(sink: Box<dyn bus::Sink>) {
    bus::set(sink);
}

/// Remove the installed event sink.
pub fn reset_bus() {
    bus::reset();
}
