// src/filecatalog/mod.rs

//! File-level cataloging
//!
//! Produces the per-file artifact maps of the SBOM: metadata, digests,
//! contents, license evidence, and executable analysis. Which files are
//! visited is governed by the selection policy: none, only files owned by
//! some package, or everything the resolver can enumerate.
//!
//! Each file is read once; all configured hashers consume the same pass
//! and the leading bytes feed MIME classification. Files shorter than the
//! classification head fall back to extension-based MIME and are excluded
//! from executable analysis.
//!
//! Progress is a two-phase task (indexing, then analysis) with per-file
//! stage updates.

pub mod executable;
pub mod license;

pub use license::{BuiltinLicenseScanner, LicenseScanner, NoopLicenseScanner};

use crate::bus;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::event::{Event, TaskDescription, TaskProgress};
use crate::file::{mime, Coordinates, Digest, Executable, License, Location, Metadata, Selection};
use crate::hash::{normalize_hashers, HashAlgorithm, MultiHasher};
use crate::pkg::Collection;
use crate::source::resolver::{compile_globs, glob_match, Resolver};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

/// Executable-analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableConfig {
    /// Path filter; empty means every executable-MIME file is analyzed
    pub globs: Vec<String>,
}

impl Default for ExecutableConfig {
    fn default() -> Self {
        ExecutableConfig { globs: Vec::new() }
    }
}

/// Content-capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Paths whose contents are embedded into the SBOM
    pub globs: Vec<String>,
    /// Files above this size are never embedded
    #[serde(rename = "skip-files-above-size")]
    pub skip_files_above_size: i64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            globs: Vec::new(),
            skip_files_above_size: 1024 * 1024,
        }
    }
}

/// File cataloging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCatalogConfig {
    pub selection: Selection,
    pub hashers: Vec<HashAlgorithm>,
    pub executable: ExecutableConfig,
    pub content: ContentConfig,
}

impl Default for FileCatalogConfig {
    fn default() -> Self {
        FileCatalogConfig {
            selection: Selection::OwnedByPackage,
            hashers: vec![HashAlgorithm::Sha256],
            executable: ExecutableConfig::default(),
            content: ContentConfig::default(),
        }
    }
}

impl FileCatalogConfig {
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_hashers(mut self, hashers: &[HashAlgorithm]) -> Self {
        self.hashers = normalize_hashers(hashers);
        self
    }
}

/// The per-file artifact maps
#[derive(Debug, Default)]
pub struct FileArtifacts {
    pub metadata: HashMap<Coordinates, Metadata>,
    pub digests: HashMap<Coordinates, Vec<Digest>>,
    pub contents: HashMap<Coordinates, String>,
    pub licenses: HashMap<Coordinates, Vec<License>>,
    pub executables: HashMap<Coordinates, Executable>,
}

impl FileArtifacts {
    /// Every coordinate appearing in any artifact map.
    pub fn coordinates(&self) -> Vec<Coordinates> {
        let mut out: Vec<Coordinates> = self.metadata.keys().cloned().collect();
        for key in self
            .digests
            .keys()
            .chain(self.contents.keys())
            .chain(self.licenses.keys())
            .chain(self.executables.keys())
        {
            if !out.contains(key) {
                out.push(key.clone());
            }
        }
        out
    }
}

/// Run file cataloging for the given selection.
pub fn catalog_files(
    resolver: &dyn Resolver,
    packages: &Collection,
    config: &FileCatalogConfig,
    scanner: &dyn LicenseScanner,
    token: &CancelToken,
) -> Result<FileArtifacts> {
    let mut artifacts = FileArtifacts::default();
    if config.selection == Selection::None {
        return Ok(artifacts);
    }

    // phase one: index the candidate locations
    let index_progress = TaskProgress::new(-1);
    bus::publish(Event::CatalogerTaskStarted {
        description: TaskDescription {
            id: "file-cataloging".to_string(),
            parent_id: String::new(),
            title: "Indexing files".to_string(),
            context: String::new(),
        },
        progress: index_progress.clone(),
    });

    let locations = match config.selection {
        Selection::None => Vec::new(),
        Selection::All => {
            let mut out = Vec::new();
            for location in resolver.all_locations(token) {
                index_progress.set_stage(location.real_path());
                index_progress.increment(1);
                out.push(location);
            }
            out
        }
        Selection::OwnedByPackage => owned_locations(resolver, packages, token, &index_progress),
    };
    index_progress.set_completed();
    token.check()?;

    // phase two: analyze each file
    let analysis_progress = TaskProgress::new(locations.len() as i64);
    bus::publish(Event::CatalogerTaskStarted {
        description: TaskDescription {
            id: "file-analysis".to_string(),
            parent_id: "file-cataloging".to_string(),
            title: "Cataloging file contents".to_string(),
            context: String::new(),
        },
        progress: analysis_progress.clone(),
    });

    let hashers = normalize_hashers(&config.hashers);
    let executable_globs = compile_globs(
        &config
            .executable
            .globs
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
    )?;
    let content_globs = compile_globs(
        &config
            .content
            .globs
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
    )?;

    let mut seen: Vec<Coordinates> = Vec::new();
    for location in locations {
        token.check()?;
        if seen.contains(&location.coordinates) {
            continue;
        }
        seen.push(location.coordinates.clone());
        analysis_progress.set_stage(location.real_path());
        analysis_progress.increment(1);

        let mut metadata = match resolver.file_metadata_by_location(&location) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = location.real_path(), error = %e, "no metadata for location");
                continue;
            }
        };
        if metadata.file_type != crate::file::FileType::RegularFile {
            artifacts.metadata.insert(location.coordinates.clone(), metadata);
            continue;
        }

        let mut data = Vec::new();
        match resolver.file_contents_by_location(&location) {
            Ok(mut reader) => {
                if let Err(e) = reader.read_to_end(&mut data) {
                    debug!(path = location.real_path(), error = %e, "unreadable file skipped");
                    continue;
                }
            }
            Err(e) => {
                debug!(path = location.real_path(), error = %e, "unopenable file skipped");
                continue;
            }
        }

        // digests: every configured hasher over the single buffered read
        let mut hasher = MultiHasher::new(&hashers);
        hasher.update(&data);
        artifacts
            .digests
            .insert(location.coordinates.clone(), hasher.finalize());

        let head = &data[..data.len().min(mime::HEAD_LENGTH)];
        let detected = mime::classify(head, location.real_path());
        metadata.mime_type = detected.clone();
        artifacts
            .metadata
            .insert(location.coordinates.clone(), metadata);

        // short reads disable executable analysis for the file
        let full_head = data.len() >= mime::HEAD_LENGTH;
        if full_head
            && mime::executable_mime_types().contains(&detected.as_str())
            && matches_any(&executable_globs, location.real_path())
        {
            match executable::analyze(location.real_path(), &data) {
                Some(exe) => {
                    artifacts
                        .executables
                        .insert(location.coordinates.clone(), exe);
                }
                None => debug!(
                    path = location.real_path(),
                    "executable MIME but no recognizable format"
                ),
            }
        }

        let found = scanner.scan(location.real_path(), &data);
        if !found.is_empty() {
            artifacts
                .licenses
                .insert(location.coordinates.clone(), found);
        }

        if !content_globs.is_empty()
            && matches_any_strict(&content_globs, location.real_path())
            && (data.len() as i64) <= config.content.skip_files_above_size
        {
            artifacts.contents.insert(
                location.coordinates.clone(),
                String::from_utf8_lossy(&data).into_owned(),
            );
        }
    }
    analysis_progress.set_completed();

    Ok(artifacts)
}

fn matches_any(globs: &[glob::Pattern], path: &str) -> bool {
    globs.is_empty() || globs.iter().any(|p| glob_match(p, path))
}

fn matches_any_strict(globs: &[glob::Pattern], path: &str) -> bool {
    globs.iter().any(|p| glob_match(p, path))
}

/// Locations for the owned-by-package selection: every package evidence
/// location plus every metadata-claimed path that resolves.
fn owned_locations(
    resolver: &dyn Resolver,
    packages: &Collection,
    token: &CancelToken,
    progress: &TaskProgress,
) -> Vec<Location> {
    let mut out: Vec<Location> = Vec::new();
    let mut push = |location: Location| {
        if !out.contains(&location) {
            out.push(location);
        }
    };

    for package in packages.sorted() {
        if token.is_canceled() {
            break;
        }
        for location in package.locations.iter() {
            progress.set_stage(location.real_path());
            progress.increment(1);
            push(location.clone());
        }
        let owned = package.owned_files();
        if owned.is_empty() {
            continue;
        }
        let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
        if let Ok(found) = resolver.files_by_path(&refs) {
            for location in found {
                progress.set_stage(location.real_path());
                progress.increment(1);
                push(location);
            }
        }
    }
    out
}
