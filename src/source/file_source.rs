// src/source/file_source.rs

//! Archive file source: a single zip or tar presented as a filesystem

use crate::archive::ZipArchive;
use crate::artifact::{self, ArtifactId};
use crate::error::{Error, Result};
use crate::hash::{digests_from_reader, Digest, HashAlgorithm};
use crate::source::directory::{DirectoryConfig, DirectorySource};
use crate::source::resolver::Resolver;
use crate::source::{Description, Scope, Source, SourceMetadata};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A source over a single archive file (zip, jar, tar, tar.gz)
///
/// The archive is extracted into a scratch directory (with path-traversal
/// defense) and indexed like a directory. The scratch directory lives as
/// long as the source.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    digests: Vec<Digest>,
    inner: DirectorySource,
    id: ArtifactId,
    _scratch: TempDir,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut magic = [0u8; 4];
        let read = file.read(&mut magic)?;
        drop(file);

        let scratch = TempDir::new()?;
        extract_archive(&path, &magic[..read], scratch.path())?;

        let mut file = File::open(&path)?;
        let digests = digests_from_reader(&[HashAlgorithm::Sha256], &mut file)?;

        let inner = DirectorySource::with_config(scratch.path(), DirectoryConfig::default())?;
        let id = artifact::id_of(&("file", path.display().to_string(), &digests));

        Ok(FileSource {
            path,
            digests,
            inner,
            id,
            _scratch: scratch,
        })
    }
}

fn extract_archive(path: &Path, magic: &[u8], target: &Path) -> Result<()> {
    if magic.starts_with(b"PK") {
        let archive = ZipArchive::open(path)?;
        return archive.extract_to(target);
    }
    if magic.starts_with(&[0x1F, 0x8B]) {
        let file = File::open(path)?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        return archive.unpack(target).map_err(Error::Io);
    }
    // check for a shell prefix hiding a zip (self-extracting archives)
    if ZipArchive::open(path).is_ok() {
        let archive = ZipArchive::open(path)?;
        return archive.extract_to(target);
    }
    // plain tar as the fallback
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(file);
    archive.unpack(target).map_err(|e| Error::Archive {
        path: path.display().to_string(),
        reason: format!("unrecognized archive format: {}", e),
    })
}

impl Source for FileSource {
    fn id(&self) -> ArtifactId {
        self.id.clone()
    }

    fn describe(&self) -> Description {
        Description {
            id: self.id.to_string(),
            name: self.path.display().to_string(),
            version: String::new(),
            metadata: SourceMetadata::File {
                path: self.path.display().to_string(),
                digests: self.digests.clone(),
            },
        }
    }

    fn file_resolver(&self, scope: Scope) -> Result<Box<dyn Resolver>> {
        self.inner.file_resolver(scope)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
