// src/source/directory.rs

//! Directory source: indexes a filesystem tree from local disk

use crate::artifact::{self, ArtifactId};
use crate::bus;
use crate::error::{Error, Result};
use crate::event::{Event, TaskProgress};
use crate::source::resolver::{compile_globs, glob_match, Resolver, TreeResolver};
use crate::source::tree::{ContentRef, FileTree, NodeKind};
use crate::source::{Description, Scope, Source, SourceMetadata};
use glob::Pattern;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Options controlling directory indexing
#[derive(Debug, Clone, Default)]
pub struct DirectoryConfig {
    /// Glob patterns excluded from the index
    pub exclude: Vec<String>,
    /// Name override for the source description
    pub alias_name: String,
    /// Version override for the source description
    pub alias_version: String,
}

/// A source over a directory on the local filesystem
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    tree: Arc<FileTree>,
    id: ArtifactId,
    config: DirectoryConfig,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(root, DirectoryConfig::default())
    }

    pub fn with_config(root: impl AsRef<Path>, config: DirectoryConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such directory: {}", root.display()),
            )));
        }

        let exclude: Vec<&str> = config.exclude.iter().map(String::as_str).collect();
        let tree = index_directory(&root, &exclude)?;
        let id = artifact::id_of(&("directory", root.display().to_string()));

        Ok(DirectorySource {
            root,
            tree: Arc::new(tree),
            id,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Source for DirectorySource {
    fn id(&self) -> ArtifactId {
        self.id.clone()
    }

    fn describe(&self) -> Description {
        let name = if self.config.alias_name.is_empty() {
            self.root.display().to_string()
        } else {
            self.config.alias_name.clone()
        };
        Description {
            id: self.id.to_string(),
            name,
            version: self.config.alias_version.clone(),
            metadata: SourceMetadata::Directory {
                path: self.root.display().to_string(),
            },
        }
    }

    fn file_resolver(&self, _scope: Scope) -> Result<Box<dyn Resolver>> {
        // a directory has a single filesystem; scope does not change the view
        Ok(Box::new(TreeResolver::single(self.tree.clone())))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn index_directory(root: &Path, exclude: &[&str]) -> Result<FileTree> {
    let excluded: Vec<Pattern> = compile_globs(exclude)?;

    let progress = TaskProgress::new(-1);
    bus::publish(Event::FileIndexingStarted {
        path: root.display().to_string(),
        progress: progress.clone(),
    });

    let mut tree = FileTree::new();
    let mut count: i64 = 0;

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let root_owned = root.to_path_buf();
    for entry in walker.filter_entry(|e| {
        let rel = virtual_path(&root_owned, e.path());
        !excluded.iter().any(|p| glob_match(p, &rel))
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if entry.path() == root {
            continue;
        }

        let path = virtual_path(root, entry.path());
        progress.set_stage(&path);

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .map(|t| t.to_string_lossy().into_owned())
                .unwrap_or_default();
            tree.insert(&path, NodeKind::Symlink { target }, 0o777, "");
        } else if file_type.is_dir() {
            tree.insert(&path, NodeKind::Directory, mode_of(entry.path()), "");
        } else if file_type.is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            tree.insert(
                &path,
                NodeKind::File {
                    size,
                    content: ContentRef::Disk(entry.path().to_path_buf()),
                },
                mode_of(entry.path()),
                "",
            );
        }

        count += 1;
        progress.increment(1);
    }

    progress.set_total(count);
    progress.set_completed();
    Ok(tree)
}

/// Map an on-disk path to its absolute virtual path within the source.
fn virtual_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let joined = rel.to_string_lossy().replace('\\', "/");
    if joined.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", joined.trim_start_matches('/'))
    }
}

#[cfg(unix)]
fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::symlink_metadata(path)
        .map(|m| m.permissions().mode())
        .unwrap_or(0)
}

#[cfg(not(unix))]
fn mode_of(_path: &Path) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use std::fs;
    use std::io::Read;

    fn scratch_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::create_dir_all(dir.path().join("usr/bin")).unwrap();
        fs::write(dir.path().join("etc/os-release"), "ID=fedora\n").unwrap();
        fs::write(dir.path().join("usr/bin/tool"), b"#!/bin/sh\necho hi\n").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("tool", dir.path().join("usr/bin/t")).unwrap();
        dir
    }

    #[test]
    fn test_indexes_files_and_directories() {
        let dir = scratch_tree();
        let source = DirectorySource::new(dir.path()).unwrap();
        let resolver = source.file_resolver(Scope::Squashed).unwrap();

        assert!(resolver.has_path("/etc/os-release"));
        assert!(resolver.has_path("/usr/bin"));

        let token = CancelToken::new();
        let all: Vec<_> = resolver.all_locations(&token).collect();
        assert!(all.iter().any(|l| l.real_path() == "/usr/bin/tool"));
    }

    #[test]
    fn test_contents_read_from_disk() {
        let dir = scratch_tree();
        let source = DirectorySource::new(dir.path()).unwrap();
        let resolver = source.file_resolver(Scope::Squashed).unwrap();

        let found = resolver.files_by_path(&["/etc/os-release"]).unwrap();
        let mut content = String::new();
        resolver
            .file_contents_by_location(&found[0])
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "ID=fedora\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_resolve_to_real_paths() {
        let dir = scratch_tree();
        let source = DirectorySource::new(dir.path()).unwrap();
        let resolver = source.file_resolver(Scope::Squashed).unwrap();

        let found = resolver.files_by_path(&["/usr/bin/t"]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].real_path(), "/usr/bin/tool");
    }

    #[test]
    fn test_exclusions_are_skipped() {
        let dir = scratch_tree();
        let source = DirectorySource::with_config(
            dir.path(),
            DirectoryConfig {
                exclude: vec!["**/etc/**".to_string(), "**/etc".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
        let resolver = source.file_resolver(Scope::Squashed).unwrap();
        assert!(!resolver.has_path("/etc/os-release"));
        assert!(resolver.has_path("/usr/bin/tool"));
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let err = DirectorySource::new("/definitely/not/here").unwrap_err();
        assert!(err.is_not_found());
    }
}
