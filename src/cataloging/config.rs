// src/cataloging/config.rs

//! Cataloging configuration values
//!
//! The core receives these resolved; loading them from files or the
//! environment is the embedding application's concern. The `with_*`
//! builders exist so callers can derive variants without mutation
//! boilerplate.

use crate::source::Scope;
use serde::{Deserialize, Serialize};

/// Where package search looks within a layered source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub scope: Scope,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            scope: Scope::Squashed,
        }
    }
}

impl SearchConfig {
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// Which relationship passes run after cataloging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipsConfig {
    /// Package-to-file edges for files claimed by package metadata
    #[serde(rename = "package-file-ownership")]
    pub package_file_ownership: bool,

    /// Package-to-package edges where one package's claimed files were
    /// another package's discovery evidence
    #[serde(rename = "package-file-ownership-overlap")]
    pub package_file_ownership_overlap: bool,

    /// Drop binary-classifier packages whose evidence is owned by another
    /// package
    #[serde(rename = "exclude-binary-packages-with-file-ownership-overlap")]
    pub exclude_binary_packages_with_file_ownership_overlap: bool,
}

impl Default for RelationshipsConfig {
    fn default() -> Self {
        RelationshipsConfig {
            package_file_ownership: true,
            package_file_ownership_overlap: true,
            exclude_binary_packages_with_file_ownership_overlap: true,
        }
    }
}

impl RelationshipsConfig {
    pub fn with_package_file_ownership(mut self, enabled: bool) -> Self {
        self.package_file_ownership = enabled;
        self
    }

    pub fn with_package_file_ownership_overlap(mut self, enabled: bool) -> Self {
        self.package_file_ownership_overlap = enabled;
        self
    }

    pub fn with_exclude_binary_packages_with_file_ownership_overlap(
        mut self,
        enabled: bool,
    ) -> Self {
        self.exclude_binary_packages_with_file_ownership_overlap = enabled;
        self
    }
}

/// Derived-data generation toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGenerationConfig {
    #[serde(rename = "generate-cpes")]
    pub generate_cpes: bool,
}

impl Default for DataGenerationConfig {
    fn default() -> Self {
        DataGenerationConfig {
            generate_cpes: true,
        }
    }
}

impl DataGenerationConfig {
    pub fn with_generate_cpes(mut self, enabled: bool) -> Self {
        self.generate_cpes = enabled;
        self
    }
}

/// Bounded parallelism for the cataloger runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Worker count; zero means the number of available cores
    pub parallelism: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig { parallelism: 0 }
    }
}

impl ExecutorConfig {
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism > 0 {
            self.parallelism
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }
}
