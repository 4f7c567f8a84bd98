// src/source/layered.rs

//! Layered image source
//!
//! Presents an ordered stack of layer archives (plain or gzipped tars, as
//! found in OCI image layouts) as a filesystem. Each layer is indexed into
//! a squash view of the stack up to and including it: the final view is
//! what the squashed scope resolves against, while the all-layers scope
//! consults every view and reports each layer's own files even when
//! shadowed above.
//!
//! Whiteout entries follow the OCI layer spec: a `.wh.<name>` entry deletes
//! `<name>` from the stack, and `.wh..wh..opq` clears the directory it
//! appears in.

use crate::artifact::{self, ArtifactId};
use crate::error::{Error, Result};
use crate::hash::{digests_from_reader, HashAlgorithm};
use crate::source::resolver::{LayerView, Resolver, TreeResolver};
use crate::source::tree::{ContentRef, FileTree, NodeKind};
use crate::source::{Description, Scope, Source, SourceMetadata};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// One layer of the image: its digest and the uncompressed tar backing it
#[derive(Debug, Clone)]
pub struct Layer {
    pub digest: String,
    tar_path: Arc<PathBuf>,
}

/// A source over an ordered stack of filesystem layers
#[derive(Debug)]
pub struct LayeredSource {
    name: String,
    version: String,
    layers: Vec<Layer>,
    /// squash views, one per layer, bottom to top
    views: Vec<LayerView>,
    id: ArtifactId,
    _scratch: TempDir,
}

impl LayeredSource {
    /// Build from layer archives on disk, ordered bottom to top.
    pub fn from_layer_archives(name: &str, archives: &[PathBuf]) -> Result<Self> {
        let scratch = TempDir::new()?;
        let mut layers = Vec::new();
        for (index, archive) in archives.iter().enumerate() {
            layers.push(prepare_layer(archive, index, scratch.path())?);
        }
        Self::assemble(name.to_string(), String::new(), layers, scratch)
    }

    /// Build from an OCI image layout directory.
    pub fn from_oci_layout(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.join("oci-layout").is_file() || !dir.join("index.json").is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not an OCI image layout", dir.display()),
            )));
        }

        let index: serde_json::Value = serde_json::from_reader(File::open(dir.join("index.json"))?)?;
        let manifest_digest = index["manifests"][0]["digest"]
            .as_str()
            .ok_or_else(|| Error::Configuration("OCI index has no manifests".to_string()))?;
        let manifest: serde_json::Value =
            serde_json::from_reader(File::open(blob_path(dir, manifest_digest)?)?)?;

        let scratch = TempDir::new()?;
        let mut layers = Vec::new();
        let layer_entries = manifest["layers"]
            .as_array()
            .ok_or_else(|| Error::Configuration("OCI manifest has no layers".to_string()))?;
        for (index, entry) in layer_entries.iter().enumerate() {
            let digest = entry["digest"]
                .as_str()
                .ok_or_else(|| Error::Configuration("OCI layer missing digest".to_string()))?;
            layers.push(prepare_layer(&blob_path(dir, digest)?, index, scratch.path())?);
        }

        let name = dir.display().to_string();
        Self::assemble(name, String::new(), layers, scratch)
    }

    fn assemble(
        name: String,
        version: String,
        layers: Vec<Layer>,
        scratch: TempDir,
    ) -> Result<Self> {
        let mut views: Vec<LayerView> = Vec::new();
        let mut squash = FileTree::new();

        for layer in &layers {
            apply_layer(&mut squash, layer)?;
            views.push(LayerView {
                file_system_id: layer.digest.clone(),
                tree: Arc::new(squash.clone()),
                own_only: true,
            });
        }

        if views.is_empty() {
            return Err(Error::Configuration(
                "layered source requires at least one layer".to_string(),
            ));
        }

        let digests: Vec<&String> = layers.iter().map(|l| &l.digest).collect();
        let id = artifact::id_of(&("layered", &name, digests));

        Ok(LayeredSource {
            name,
            version,
            layers,
            views,
            id,
            _scratch: scratch,
        })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl Source for LayeredSource {
    fn id(&self) -> ArtifactId {
        self.id.clone()
    }

    fn describe(&self) -> Description {
        Description {
            id: self.id.to_string(),
            name: self.name.clone(),
            version: self.version.clone(),
            metadata: SourceMetadata::Image {
                layers: self.layers.iter().map(|l| l.digest.clone()).collect(),
            },
        }
    }

    fn file_resolver(&self, scope: Scope) -> Result<Box<dyn Resolver>> {
        match scope {
            Scope::AllLayers => Ok(Box::new(TreeResolver::layered(self.views.clone(), true))),
            Scope::Squashed | Scope::Unknown => {
                let top = self
                    .views
                    .last()
                    .expect("layered source has at least one view");
                let squashed = LayerView {
                    file_system_id: top.file_system_id.clone(),
                    tree: top.tree.clone(),
                    own_only: false,
                };
                Ok(Box::new(TreeResolver::layered(vec![squashed], false)))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn blob_path(layout: &Path, digest: &str) -> Result<PathBuf> {
    let (algorithm, hex) = digest.split_once(':').ok_or_else(|| {
        Error::Configuration(format!("malformed OCI digest {:?}", digest))
    })?;
    Ok(layout.join("blobs").join(algorithm).join(hex))
}

/// Decompress (if needed) and digest a layer archive.
fn prepare_layer(archive: &Path, index: usize, scratch: &Path) -> Result<Layer> {
    let mut file = File::open(archive)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    drop(file);

    let tar_path = scratch.join(format!("layer-{}.tar", index));
    if read >= 2 && magic == [0x1F, 0x8B] {
        let mut decoder = GzDecoder::new(File::open(archive)?);
        let mut out = File::create(&tar_path)?;
        std::io::copy(&mut decoder, &mut out)?;
    } else {
        std::fs::copy(archive, &tar_path)?;
    }

    let mut tar_file = File::open(&tar_path)?;
    let digests = digests_from_reader(&[HashAlgorithm::Sha256], &mut tar_file)?;
    let digest = format!("sha256:{}", digests[0].value);

    Ok(Layer {
        digest,
        tar_path: Arc::new(tar_path),
    })
}

/// Apply one layer's entries (including whiteouts) onto the squash tree.
fn apply_layer(squash: &mut FileTree, layer: &Layer) -> Result<()> {
    let file = File::open(layer.tar_path.as_path())?;
    let mut archive = tar::Archive::new(file);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.to_string_lossy().into_owned();
        let path = format!("/{}", raw_path.trim_start_matches('/'));

        let base_name = path.rsplit('/').next().unwrap_or_default().to_string();
        if base_name == OPAQUE_WHITEOUT {
            let parent = path.trim_end_matches(&base_name).trim_end_matches('/');
            squash.clear_children(if parent.is_empty() { "/" } else { parent });
            continue;
        }
        if let Some(hidden) = base_name.strip_prefix(WHITEOUT_PREFIX) {
            let parent = path.trim_end_matches(&base_name).trim_end_matches('/');
            squash.remove(&format!("{}/{}", parent, hidden));
            continue;
        }

        let mode = entry.header().mode().unwrap_or(0);
        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                squash.insert(&path, NodeKind::Directory, mode, &layer.digest);
            }
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name()?
                    .map(|t| t.to_string_lossy().into_owned())
                    .unwrap_or_default();
                squash.insert(&path, NodeKind::Symlink { target }, mode, &layer.digest);
            }
            tar::EntryType::Link => {
                // hardlinks resolve to their target's content
                let target = entry
                    .link_name()?
                    .map(|t| format!("/{}", t.to_string_lossy().trim_start_matches('/')))
                    .unwrap_or_default();
                squash.insert(&path, NodeKind::Symlink { target }, mode, &layer.digest);
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                let size = entry.size();
                let offset = entry.raw_file_position();
                squash.insert(
                    &path,
                    NodeKind::File {
                        size,
                        content: ContentRef::TarSegment {
                            archive: layer.tar_path.clone(),
                            offset,
                            size,
                        },
                    },
                    mode,
                    &layer.digest,
                );
            }
            other => {
                debug!(path = path.as_str(), kind = ?other, "skipping unsupported tar entry");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Layer tar fixtures for layered-source tests

    use std::path::PathBuf;

    pub struct LayerSpec {
        pub files: Vec<(&'static str, Vec<u8>)>,
        pub whiteouts: Vec<&'static str>,
    }

    /// Write layer tars into `dir` and return their paths.
    pub fn build_layers(dir: &std::path::Path, specs: &[LayerSpec]) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for (i, spec) in specs.iter().enumerate() {
            let path = dir.join(format!("layer{}.tar", i));
            let mut builder = tar::Builder::new(Vec::new());
            for (name, data) in &spec.files {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, name.trim_start_matches('/'), data.as_slice())
                    .unwrap();
            }
            for hidden in &spec.whiteouts {
                let (parent, name) = match hidden.rsplit_once('/') {
                    Some((p, n)) => (p.trim_start_matches('/'), n),
                    None => ("", *hidden),
                };
                let whiteout = if parent.is_empty() {
                    format!(".wh.{}", name)
                } else {
                    format!("{}/.wh.{}", parent, name)
                };
                let mut header = tar::Header::new_gnu();
                header.set_size(0);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, whiteout, std::io::empty())
                    .unwrap();
            }
            let bytes = builder.into_inner().unwrap();
            std::fs::write(&path, bytes).unwrap();
            out.push(path);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{build_layers, LayerSpec};
    use super::*;
    use crate::cancel::CancelToken;
    use std::io::Read as _;

    fn two_layer_source(dir: &Path) -> LayeredSource {
        let layers = build_layers(
            dir,
            &[
                LayerSpec {
                    files: vec![
                        ("/bin/sh", b"lower shell".to_vec()),
                        ("/etc/motd", b"welcome".to_vec()),
                    ],
                    whiteouts: vec![],
                },
                LayerSpec {
                    files: vec![("/bin/sh", b"upper shell!".to_vec())],
                    whiteouts: vec!["/etc/motd"],
                },
            ],
        );
        LayeredSource::from_layer_archives("demo:latest", &layers).unwrap()
    }

    #[test]
    fn test_squashed_scope_sees_top_of_stack() {
        let dir = tempfile::tempdir().unwrap();
        let source = two_layer_source(dir.path());
        let resolver = source.file_resolver(Scope::Squashed).unwrap();

        // the whiteout removed /etc/motd from the squash
        assert!(!resolver.has_path("/etc/motd"));

        let found = resolver.files_by_path(&["/bin/sh"]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].coordinates.file_system_id,
            source.layers()[1].digest
        );

        let mut content = String::new();
        resolver
            .file_contents_by_location(&found[0])
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "upper shell!");
    }

    #[test]
    fn test_all_layers_scope_sees_shadowed_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = two_layer_source(dir.path());
        let resolver = source.file_resolver(Scope::AllLayers).unwrap();

        let found = resolver.files_by_path(&["/bin/sh"]).unwrap();
        assert_eq!(found.len(), 2);
        let ids: Vec<&str> = found
            .iter()
            .map(|l| l.coordinates.file_system_id.as_str())
            .collect();
        assert!(ids.contains(&source.layers()[0].digest.as_str()));
        assert!(ids.contains(&source.layers()[1].digest.as_str()));

        // whiteout victims are still visible in their own layer
        let motd = resolver.files_by_path(&["/etc/motd"]).unwrap();
        assert_eq!(motd.len(), 1);
        assert_eq!(
            motd[0].coordinates.file_system_id,
            source.layers()[0].digest
        );
    }

    #[test]
    fn test_all_locations_attributes_layers() {
        let dir = tempfile::tempdir().unwrap();
        let source = two_layer_source(dir.path());
        let resolver = source.file_resolver(Scope::AllLayers).unwrap();

        let token = CancelToken::new();
        let all: Vec<_> = resolver.all_locations(&token).collect();
        let sh_copies = all.iter().filter(|l| l.real_path() == "/bin/sh").count();
        assert_eq!(sh_copies, 2);
    }

    #[test]
    fn test_layer_contents_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let source = two_layer_source(dir.path());
        let resolver = source.file_resolver(Scope::AllLayers).unwrap();

        let found = resolver.files_by_path(&["/etc/motd"]).unwrap();
        let mut content = String::new();
        resolver
            .file_contents_by_location(&found[0])
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "welcome");
    }
}
