// src/source/mod.rs

//! Source abstraction: anything that can be cataloged
//!
//! A [`Source`] presents an input (layered image filesystem, directory, or
//! archive) behind a uniform [`Resolver`]. The provider chain in
//! [`get_source`] resolves a user-input string by trying each configured
//! provider in order; "not found" errors are withheld and reported only if
//! every provider fails.

pub mod directory;
pub mod file_source;
pub mod layered;
pub mod resolver;
pub mod tree;

pub use directory::{DirectoryConfig, DirectorySource};
pub use file_source::FileSource;
pub use layered::LayeredSource;
pub use resolver::{LayerView, MemoryResolver, Resolver, TreeResolver, WritableResolver};

use crate::artifact::ArtifactId;
use crate::error::{Error, Result};
use crate::hash::Digest;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Visibility policy over layered filesystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Sentinel default
    #[default]
    #[serde(rename = "unknown-scope")]
    Unknown,
    /// Only content visible at the top of the final layer stack
    Squashed,
    /// Content on every layer, even when shadowed above
    AllLayers,
}

impl Scope {
    pub fn parse(input: &str) -> Scope {
        match input.to_lowercase().as_str() {
            "squashed" => Scope::Squashed,
            "all-layers" | "alllayers" => Scope::AllLayers,
            _ => Scope::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scope::Unknown => "unknown-scope",
            Scope::Squashed => "squashed",
            Scope::AllLayers => "all-layers",
        }
    }
}

/// Describes where the cataloged data came from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Description {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default)]
    pub metadata: SourceMetadata,
}

/// Typed source metadata carried in the SBOM
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceMetadata {
    #[default]
    Unknown,
    Directory {
        path: String,
    },
    File {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        digests: Vec<Digest>,
    },
    Image {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        layers: Vec<String>,
    },
}

/// Anything that can be cataloged
pub trait Source: Send + Sync + std::fmt::Debug {
    fn id(&self) -> ArtifactId;
    fn describe(&self) -> Description;
    fn file_resolver(&self, scope: Scope) -> Result<Box<dyn Resolver>>;
    fn close(&mut self) -> Result<()>;
}

/// A source reconstructed from a description only (an SBOM loaded from
/// disk); its resolver always fails.
#[derive(Debug)]
pub struct DescriptionSource {
    description: Description,
}

/// Wrap an existing description as a [`Source`].
pub fn from_description(description: Description) -> DescriptionSource {
    DescriptionSource { description }
}

impl Source for DescriptionSource {
    fn id(&self) -> ArtifactId {
        ArtifactId(self.description.id.clone())
    }

    fn describe(&self) -> Description {
        self.description.clone()
    }

    fn file_resolver(&self, _scope: Scope) -> Result<Box<dyn Resolver>> {
        Err(Error::Configuration(
            "no file resolver available for description-only source".to_string(),
        ))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Configuration for resolving a user input string to a source
#[derive(Debug, Clone)]
pub struct GetSourceConfig {
    /// Provider names tried in order
    pub providers: Vec<String>,
    /// Required image platform; an error when the source is not an image
    pub platform: Option<String>,
    /// Glob patterns excluded from directory indexing
    pub exclude: Vec<String>,
    /// Name/version overrides for the source description
    pub alias_name: String,
    pub alias_version: String,
}

impl Default for GetSourceConfig {
    fn default() -> Self {
        GetSourceConfig {
            providers: vec![
                "oci-layout".to_string(),
                "file".to_string(),
                "directory".to_string(),
            ],
            platform: None,
            exclude: Vec::new(),
            alias_name: String::new(),
            alias_version: String::new(),
        }
    }
}

/// Resolve a user input to a usable source by trying each provider in the
/// configured order. The first provider to produce a source wins.
pub fn get_source(input: &str, config: &GetSourceConfig) -> Result<Box<dyn Source>> {
    let mut errors: Vec<String> = Vec::new();
    let mut not_found: Option<String> = None;

    for provider in &config.providers {
        let attempt: Result<Box<dyn Source>> = match provider.as_str() {
            "oci-layout" => LayeredSource::from_oci_layout(input)
                .map(|s| Box::new(s) as Box<dyn Source>),
            "file" => provide_file(input),
            "directory" => provide_directory(input, config),
            other => {
                errors.push(format!("unknown source provider {:?}", other));
                continue;
            }
        };

        match attempt {
            Ok(source) => {
                if config.platform.is_some() {
                    let is_image =
                        matches!(source.describe().metadata, SourceMetadata::Image { .. });
                    if !is_image {
                        return Err(Error::Configuration(
                            "platform specified with non-image source".to_string(),
                        ));
                    }
                }
                return Ok(source);
            }
            Err(e) if e.is_not_found() => {
                debug!(provider = provider.as_str(), "source provider found nothing");
                if not_found.is_none() {
                    not_found = Some(e.to_string());
                }
            }
            Err(e) => errors.push(format!("{}: {}", provider, e)),
        }
    }

    // not-found errors are reported first, and only when nothing resolved
    if let Some(nf) = not_found {
        errors.insert(0, nf);
    }
    Err(Error::SourceResolution {
        input: input.to_string(),
        errors,
    })
}

fn provide_file(input: &str) -> Result<Box<dyn Source>> {
    let path = Path::new(input);
    if !path.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no such file: {}", input),
        )));
    }
    Ok(Box::new(FileSource::new(path)?))
}

fn provide_directory(input: &str, config: &GetSourceConfig) -> Result<Box<dyn Source>> {
    let source = DirectorySource::with_config(
        input,
        DirectoryConfig {
            exclude: config.exclude.clone(),
            alias_name: config.alias_name.clone(),
            alias_version: config.alias_version.clone(),
        },
    )?;
    Ok(Box::new(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parse() {
        assert_eq!(Scope::parse("squashed"), Scope::Squashed);
        assert_eq!(Scope::parse("all-layers"), Scope::AllLayers);
        assert_eq!(Scope::parse("AllLayers"), Scope::AllLayers);
        assert_eq!(Scope::parse("bogus"), Scope::Unknown);
    }

    #[test]
    fn test_description_only_source_has_no_resolver() {
        let mut source = from_description(Description {
            id: "abcd".to_string(),
            name: "loaded.sbom".to_string(),
            ..Default::default()
        });
        assert_eq!(source.id().as_str(), "abcd");
        assert!(source.file_resolver(Scope::Squashed).is_err());
        source.close().unwrap();
    }

    #[test]
    fn test_get_source_resolves_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();

        let source = get_source(
            dir.path().to_str().unwrap(),
            &GetSourceConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            source.describe().metadata,
            SourceMetadata::Directory { .. }
        ));
    }

    #[test]
    fn test_get_source_reports_all_failures() {
        let err = get_source("/definitely/missing", &GetSourceConfig::default()).unwrap_err();
        match err {
            Error::SourceResolution { input, errors } => {
                assert_eq!(input, "/definitely/missing");
                assert!(!errors.is_empty());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_platform_with_non_image_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = GetSourceConfig {
            platform: Some("linux/amd64".to_string()),
            ..Default::default()
        };
        let err = get_source(dir.path().to_str().unwrap(), &config).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("platform specified"));
    }

    #[test]
    fn test_scope_serde_names() {
        assert_eq!(serde_json::to_string(&Scope::Squashed).unwrap(), "\"squashed\"");
        assert_eq!(
            serde_json::from_str::<Scope>("\"all-layers\"").unwrap(),
            Scope::AllLayers
        );
    }
}
