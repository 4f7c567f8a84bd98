// src/source/resolver.rs

//! Uniform file resolution over indexed sources
//!
//! A [`Resolver`] answers path, glob, and MIME queries against a source and
//! opens file contents. All implementations are safe for concurrent reads;
//! [`Resolver::all_locations`] yields lazily and honors cancellation.
//!
//! [`TreeResolver`] is the shared implementation over one or more indexed
//! [`FileTree`] views: simple sources have exactly one view, layered
//! sources have one view per layer (each a squash of the stack up to and
//! including that layer).

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::file::{mime, FileType, Location, Metadata};
use crate::source::tree::{ContentRef, FileTree, NodeId, NodeKind};
use glob::{MatchOptions, Pattern};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Query interface over a source's virtual filesystem
pub trait Resolver: Send + Sync {
    /// Existence check with full symlink resolution (files or directories).
    fn has_path(&self, path: &str) -> bool;

    /// Locations for the given paths, symlinks followed, files only.
    fn files_by_path(&self, paths: &[&str]) -> Result<Vec<Location>>;

    /// Locations matching the given glob patterns; deduplicated with the
    /// best single match per target file.
    fn files_by_glob(&self, patterns: &[&str]) -> Result<Vec<Location>>;

    /// Locations whose contents classify as one of the given MIME types.
    fn files_by_mime_type(&self, types: &[&str]) -> Result<Vec<Location>>;

    /// Resolve `path` relative to the layer squash visible at `anchor`.
    fn relative_file_by_path(&self, anchor: &Location, path: &str) -> Option<Location>;

    /// Every indexed location (files and directories), no symlink
    /// resolution. The iterator stops early when the token is canceled.
    fn all_locations(&self, token: &CancelToken) -> Box<dyn Iterator<Item = Location> + Send>;

    /// Open a file's contents for reading.
    fn file_contents_by_location(&self, location: &Location) -> Result<Box<dyn Read + Send>>;

    /// Metadata for an indexed location.
    fn file_metadata_by_location(&self, location: &Location) -> Result<Metadata>;
}

/// A resolver that can also write content back (in-memory test fixtures)
pub trait WritableResolver: Resolver {
    fn write(&self, location: &Location, reader: &mut dyn Read) -> Result<()>;
}

/// One indexed view of a source
#[derive(Debug, Clone)]
pub struct LayerView {
    /// The layer digest this view represents (empty for simple sources)
    pub file_system_id: String,
    pub tree: Arc<FileTree>,
    /// When set, enumeration and matching only report nodes contributed by
    /// this view's own layer (the tree itself is the squash up to it, so
    /// path and symlink resolution still see the whole stack below).
    pub own_only: bool,
}

impl LayerView {
    fn owns(&self, node: &crate::source::tree::Node) -> bool {
        !self.own_only || node.file_system_id() == self.file_system_id
    }
}

/// Shared resolver over one or more tree views
pub struct TreeResolver {
    views: Vec<LayerView>,
    /// When true, queries run against every view (all-layers scope);
    /// otherwise only the last (top) view is consulted.
    all_views: bool,
}

impl TreeResolver {
    /// A resolver over a single tree (directory and archive sources).
    pub fn single(tree: Arc<FileTree>) -> Self {
        TreeResolver {
            views: vec![LayerView {
                file_system_id: String::new(),
                tree,
                own_only: false,
            }],
            all_views: false,
        }
    }

    pub fn layered(views: Vec<LayerView>, all_views: bool) -> Self {
        TreeResolver { views, all_views }
    }

    fn query_views(&self) -> &[LayerView] {
        if self.all_views || self.views.len() <= 1 {
            &self.views
        } else {
            std::slice::from_ref(self.views.last().expect("resolver has at least one view"))
        }
    }

    fn location_for(&self, view: &LayerView, real_path: &str, access_path: &str, id: NodeId) -> Location {
        let node = view.tree.node(id);
        let file_system_id = if node.file_system_id().is_empty() {
            view.file_system_id.clone()
        } else {
            node.file_system_id().to_string()
        };
        let mut location = Location::virtual_path(real_path, access_path);
        location.coordinates.file_system_id = file_system_id;
        location
    }

    fn find_node(&self, location: &Location) -> Option<(&LayerView, NodeId)> {
        let fsid = &location.coordinates.file_system_id;
        // prefer the top view so squashed reads see the winning copy
        for view in self.views.iter().rev() {
            if let Some(id) = view.tree.get(&location.coordinates.real_path) {
                let node = view.tree.node(id);
                if fsid.is_empty()
                    || node.file_system_id() == fsid
                    || view.file_system_id == *fsid
                {
                    return Some((view, id));
                }
            }
        }
        None
    }

    /// Peek at leading file bytes for MIME classification.
    fn head_bytes(&self, view: &LayerView, id: NodeId) -> Result<Vec<u8>> {
        let node = view.tree.node(id);
        let content = match node.content() {
            Some(c) => c.clone(),
            None => return Ok(Vec::new()),
        };
        let mut reader = open_content(&content)?;
        let mut buffer = vec![0u8; mime::HEAD_LENGTH];
        let mut filled = 0;
        while filled < buffer.len() {
            let n = reader.read(&mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buffer.truncate(filled);
        Ok(buffer)
    }
}

impl Resolver for TreeResolver {
    fn has_path(&self, path: &str) -> bool {
        self.query_views().iter().any(|v| v.tree.resolve(path).is_some())
    }

    fn files_by_path(&self, paths: &[&str]) -> Result<Vec<Location>> {
        let mut out: Vec<Location> = Vec::new();
        for path in paths {
            for view in self.query_views() {
                if let Some((real_path, id)) = view.tree.resolve(path) {
                    if view.tree.node(id).is_file() && view.owns(view.tree.node(id)) {
                        let location = self.location_for(view, &real_path, path, id);
                        if !out.contains(&location) {
                            out.push(location);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn files_by_glob(&self, patterns: &[&str]) -> Result<Vec<Location>> {
        let compiled = compile_globs(patterns)?;
        let mut out: Vec<Location> = Vec::new();

        for view in self.query_views() {
            // candidates keyed by resolved real path; best access path wins
            let mut best: Vec<(String, String, NodeId)> = Vec::new();
            for path in view.tree.all_paths() {
                if !compiled.iter().any(|p| glob_match(p, &path)) {
                    continue;
                }
                let Some((real_path, id)) = view.tree.resolve(&path) else {
                    continue;
                };
                if !view.tree.node(id).is_file() || !view.owns(view.tree.node(id)) {
                    continue;
                }
                match best.iter_mut().find(|(real, _, _)| *real == real_path) {
                    Some((_, access, _)) => {
                        if path.len() < access.len() || (path.len() == access.len() && path < *access)
                        {
                            *access = path;
                        }
                    }
                    None => best.push((real_path, path, id)),
                }
            }
            for (real_path, access_path, id) in best {
                let location = self.location_for(view, &real_path, &access_path, id);
                if !out.contains(&location) {
                    out.push(location);
                }
            }
        }

        out.sort_by(|a, b| {
            (a.real_path(), &a.coordinates.file_system_id)
                .cmp(&(b.real_path(), &b.coordinates.file_system_id))
        });
        Ok(out)
    }

    fn files_by_mime_type(&self, types: &[&str]) -> Result<Vec<Location>> {
        let mut out = Vec::new();
        for view in self.query_views() {
            for path in view.tree.all_paths() {
                let Some(id) = view.tree.get(&path) else {
                    continue;
                };
                if !view.tree.node(id).is_file() || !view.owns(view.tree.node(id)) {
                    continue;
                }
                let head = match self.head_bytes(view, id) {
                    Ok(head) => head,
                    Err(e) => {
                        debug!(path = path.as_str(), error = %e, "unable to read head bytes");
                        continue;
                    }
                };
                let detected = mime::classify(&head, &path);
                if types.iter().any(|t| *t == detected) {
                    let location = self.location_for(view, &path, &path, id);
                    if !out.contains(&location) {
                        out.push(location);
                    }
                }
            }
        }
        Ok(out)
    }

    fn relative_file_by_path(&self, anchor: &Location, path: &str) -> Option<Location> {
        let fsid = &anchor.coordinates.file_system_id;
        let view = if fsid.is_empty() {
            self.views.last()?
        } else {
            self.views
                .iter()
                .find(|v| {
                    v.file_system_id == *fsid
                        || v.tree
                            .get(&anchor.coordinates.real_path)
                            .map(|id| v.tree.node(id).file_system_id() == *fsid)
                            .unwrap_or(false)
                })
                .or_else(|| self.views.last())?
        };

        let (real_path, id) = view.tree.resolve(path)?;
        if !view.tree.node(id).is_file() {
            return None;
        }
        Some(self.location_for(view, &real_path, path, id))
    }

    fn all_locations(&self, token: &CancelToken) -> Box<dyn Iterator<Item = Location> + Send> {
        let token = token.clone();
        let views: Vec<LayerView> = self.query_views().to_vec();
        let iter = views.into_iter().flat_map(move |view| {
            let token = token.clone();
            let paths = view.tree.all_paths();
            paths.into_iter().filter_map(move |path| {
                if token.is_canceled() {
                    return None;
                }
                let id = view.tree.get(&path)?;
                let node = view.tree.node(id);
                if !view.owns(node) {
                    return None;
                }
                let file_system_id = if node.file_system_id().is_empty() {
                    view.file_system_id.clone()
                } else {
                    node.file_system_id().to_string()
                };
                let mut location = Location::new(path);
                location.coordinates.file_system_id = file_system_id;
                Some(location)
            })
        });
        Box::new(iter)
    }

    fn file_contents_by_location(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        let (view, id) = self.find_node(location).ok_or_else(|| Error::ResolverIo {
            path: location.real_path().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such indexed file"),
        })?;
        let node = view.tree.node(id);
        let content = node.content().ok_or_else(|| Error::ResolverIo {
            path: location.real_path().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        })?;
        open_content_with_retry(content, location.real_path())
    }

    fn file_metadata_by_location(&self, location: &Location) -> Result<Metadata> {
        let (view, id) = self.find_node(location).ok_or_else(|| Error::ResolverIo {
            path: location.real_path().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such indexed file"),
        })?;
        let node = view.tree.node(id);
        let file_type = match node.kind() {
            NodeKind::Directory => FileType::Directory,
            NodeKind::File { .. } => FileType::RegularFile,
            NodeKind::Symlink { .. } => FileType::SymbolicLink,
        };
        Ok(Metadata {
            file_type,
            mode: node.mode(),
            link_destination: node.link_target().unwrap_or_default().to_string(),
            size: node.size() as i64,
            mime_type: String::new(),
        })
    }
}

/// Open a content reference, retrying transient failures once.
fn open_content_with_retry(content: &ContentRef, path: &str) -> Result<Box<dyn Read + Send>> {
    match open_content(content) {
        Ok(reader) => Ok(reader),
        Err(first) => {
            debug!(path, error = %first, "retrying file open after I/O failure");
            open_content(content).map_err(|source| Error::ResolverIo {
                path: path.to_string(),
                source,
            })
        }
    }
}

fn open_content(content: &ContentRef) -> std::io::Result<Box<dyn Read + Send>> {
    match content {
        ContentRef::None => Ok(Box::new(std::io::empty())),
        ContentRef::Disk(path) => Ok(Box::new(File::open(path)?)),
        ContentRef::TarSegment {
            archive,
            offset,
            size,
        } => {
            let mut file = File::open(archive.as_path())?;
            file.seek(SeekFrom::Start(*offset))?;
            Ok(Box::new(file.take(*size)))
        }
        ContentRef::Inline(bytes) => Ok(Box::new(ArcReader {
            bytes: bytes.clone(),
            position: 0,
        })),
    }
}

struct ArcReader {
    bytes: Arc<Vec<u8>>,
    position: usize,
}

impl Read for ArcReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.bytes[self.position.min(self.bytes.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

/// Expand `{a,b}` alternation groups into plain glob patterns.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let mut depth = 0;
    let mut close = None;
    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let body = &pattern[open + 1..close];

    let mut alternatives = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                alternatives.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    alternatives.push(&body[start..]);

    let mut out = Vec::new();
    for alternative in alternatives {
        let candidate = format!("{}{}{}", prefix, alternative, suffix);
        out.extend(expand_braces(&candidate));
    }
    out
}

/// Compile user glob patterns, expanding brace alternation.
pub fn compile_globs(patterns: &[&str]) -> Result<Vec<Pattern>> {
    let mut out = Vec::new();
    for pattern in patterns {
        for expanded in expand_braces(pattern) {
            let compiled = Pattern::new(&expanded)
                .map_err(|e| Error::Configuration(format!("bad glob {:?}: {}", expanded, e)))?;
            out.push(compiled);
        }
    }
    Ok(out)
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Match an absolute path against a compiled pattern.
///
/// Paths are matched both with and without their leading slash, and a
/// leading `**/` in the pattern also matches files at the root.
pub fn glob_match(pattern: &Pattern, path: &str) -> bool {
    let trimmed = path.trim_start_matches('/');
    if pattern.matches_with(path, GLOB_OPTIONS) || pattern.matches_with(trimmed, GLOB_OPTIONS) {
        return true;
    }
    if let Some(rest) = pattern.as_str().strip_prefix("**/") {
        if let Ok(inner) = Pattern::new(rest) {
            return inner.matches_with(trimmed, GLOB_OPTIONS);
        }
    }
    false
}

/// An in-memory, writable resolver used by tests and synthetic sources
pub struct MemoryResolver {
    tree: RwLock<FileTree>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        MemoryResolver {
            tree: RwLock::new(FileTree::new()),
        }
    }

    pub fn with_file(self, path: &str, bytes: &[u8]) -> Self {
        self.add_file(path, bytes);
        self
    }

    pub fn with_symlink(self, path: &str, target: &str) -> Self {
        self.add_symlink(path, target);
        self
    }

    pub fn add_file(&self, path: &str, bytes: &[u8]) {
        let mut tree = self.tree.write().expect("memory tree poisoned");
        tree.insert(
            path,
            NodeKind::File {
                size: bytes.len() as u64,
                content: ContentRef::Inline(Arc::new(bytes.to_vec())),
            },
            0o644,
            "",
        );
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        let mut tree = self.tree.write().expect("memory tree poisoned");
        tree.insert(
            path,
            NodeKind::Symlink {
                target: target.to_string(),
            },
            0o777,
            "",
        );
    }

    fn snapshot(&self) -> TreeResolver {
        let tree = self.tree.read().expect("memory tree poisoned");
        // the arena is cloned so readers observe a consistent snapshot
        TreeResolver::single(Arc::new(clone_tree(&tree)))
    }
}

impl Default for MemoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_tree(tree: &FileTree) -> FileTree {
    let mut out = FileTree::new();
    for path in tree.all_paths() {
        if path == "/" {
            continue;
        }
        if let Some(id) = tree.get(&path) {
            let node = tree.node(id);
            out.insert(&path, node.kind().clone(), node.mode(), node.file_system_id());
        }
    }
    out
}

impl Resolver for MemoryResolver {
    fn has_path(&self, path: &str) -> bool {
        self.snapshot().has_path(path)
    }

    fn files_by_path(&self, paths: &[&str]) -> Result<Vec<Location>> {
        self.snapshot().files_by_path(paths)
    }

    fn files_by_glob(&self, patterns: &[&str]) -> Result<Vec<Location>> {
        self.snapshot().files_by_glob(patterns)
    }

    fn files_by_mime_type(&self, types: &[&str]) -> Result<Vec<Location>> {
        self.snapshot().files_by_mime_type(types)
    }

    fn relative_file_by_path(&self, anchor: &Location, path: &str) -> Option<Location> {
        self.snapshot().relative_file_by_path(anchor, path)
    }

    fn all_locations(&self, token: &CancelToken) -> Box<dyn Iterator<Item = Location> + Send> {
        self.snapshot().all_locations(token)
    }

    fn file_contents_by_location(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        self.snapshot().file_contents_by_location(location)
    }

    fn file_metadata_by_location(&self, location: &Location) -> Result<Metadata> {
        self.snapshot().file_metadata_by_location(location)
    }
}

impl WritableResolver for MemoryResolver {
    fn write(&self, location: &Location, reader: &mut dyn Read) -> Result<()> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.add_file(location.real_path(), &bytes);
        Ok(())
    }
}
