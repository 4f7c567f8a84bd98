// src/cataloging/select.rs

//! Cataloger registry, tags, and selection
//!
//! Catalogers register with a tag set describing what they find and where
//! they apply. A [`SelectionRequest`] resolves against the registry in five
//! steps: seed from defaults (names or tags; empty defaults impose no
//! restriction and seed the whole registry), intersect with sub-select
//! tags (all must be present), union in explicit name additions, remove by
//! name or tag, then force-add the always-enabled set.

use crate::pkg::cataloger::Cataloger;
use std::sync::Arc;

/// Packages found to be positively installed
pub const INSTALLED_TAG: &str = "installed";
/// Packages described but not necessarily installed
pub const DECLARED_TAG: &str = "declared";
/// Applies when cataloging images
pub const IMAGE_TAG: &str = "image";
/// Applies when cataloging directories
pub const DIRECTORY_TAG: &str = "directory";
/// Package-based catalogers
pub const PACKAGE_TAG: &str = "package";
/// Operating-system package catalogers
pub const OS_TAG: &str = "os";
/// Language-ecosystem package catalogers
pub const LANGUAGE_TAG: &str = "language";

/// A registered cataloger with its tags
#[derive(Clone)]
pub struct CatalogerReference {
    pub cataloger: Arc<Cataloger>,
    pub tags: Vec<String>,
    pub always_enabled: bool,
}

impl CatalogerReference {
    pub fn new(cataloger: Cataloger, tags: &[&str]) -> Self {
        CatalogerReference {
            cataloger: Arc::new(cataloger),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            always_enabled: false,
        }
    }

    pub fn always_enabled(mut self) -> Self {
        self.always_enabled = true;
        self
    }

    pub fn name(&self) -> &str {
        self.cataloger.name()
    }

    /// Names are matched exactly, with the `-cataloger` suffix optional.
    fn matches_name(&self, token: &str) -> bool {
        self.name() == token || self.name() == format!("{}-cataloger", token)
    }

    fn matches_tag(&self, token: &str) -> bool {
        self.tags.iter().any(|t| t == token)
    }

    fn matches_name_or_tag(&self, token: &str) -> bool {
        self.matches_name(token) || self.matches_tag(token)
    }
}

/// The built-in cataloger fleet with its registered tags
pub fn default_catalogers() -> Vec<CatalogerReference> {
    use crate::pkg::cataloger as catalogers;

    vec![
        CatalogerReference::new(
            catalogers::rpm::db_cataloger(),
            &[DIRECTORY_TAG, IMAGE_TAG, INSTALLED_TAG, OS_TAG, PACKAGE_TAG, "rpm"],
        ),
        CatalogerReference::new(
            catalogers::rpm::archive_cataloger(),
            &[DECLARED_TAG, DIRECTORY_TAG, OS_TAG, PACKAGE_TAG, "rpm"],
        ),
        CatalogerReference::new(
            catalogers::dpkg::db_cataloger(),
            &[DIRECTORY_TAG, IMAGE_TAG, INSTALLED_TAG, OS_TAG, PACKAGE_TAG, "dpkg"],
        ),
        CatalogerReference::new(
            catalogers::alpm::db_cataloger(),
            &[DIRECTORY_TAG, IMAGE_TAG, INSTALLED_TAG, OS_TAG, PACKAGE_TAG, "alpm"],
        ),
        CatalogerReference::new(
            catalogers::java::archive_cataloger(),
            &[DECLARED_TAG, DIRECTORY_TAG, IMAGE_TAG, LANGUAGE_TAG, PACKAGE_TAG, "java", "maven"],
        ),
        CatalogerReference::new(
            catalogers::javascript::package_cataloger(),
            &[DECLARED_TAG, DIRECTORY_TAG, IMAGE_TAG, LANGUAGE_TAG, PACKAGE_TAG, "javascript", "npm"],
        ),
        CatalogerReference::new(
            catalogers::python::installed_cataloger(),
            &[DIRECTORY_TAG, IMAGE_TAG, INSTALLED_TAG, LANGUAGE_TAG, PACKAGE_TAG, "python"],
        ),
        CatalogerReference::new(
            catalogers::golang::module_file_cataloger(),
            &[DECLARED_TAG, DIRECTORY_TAG, LANGUAGE_TAG, PACKAGE_TAG, "go", "golang"],
        ),
        CatalogerReference::new(
            catalogers::kernel::module_cataloger(),
            &[DIRECTORY_TAG, IMAGE_TAG, INSTALLED_TAG, PACKAGE_TAG, "linux-kernel"],
        ),
        CatalogerReference::new(
            catalogers::binary::classifier_cataloger(),
            &[IMAGE_TAG, "binary"],
        ),
    ]
}

/// The four-part selection request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRequest {
    pub default_names_or_tags: Vec<String>,
    pub sub_select_tags: Vec<String>,
    pub add_names: Vec<String>,
    pub remove_names_or_tags: Vec<String>,
}

impl SelectionRequest {
    pub fn new() -> Self {
        SelectionRequest::default()
    }

    pub fn with_defaults(mut self, names_or_tags: &[&str]) -> Self {
        self.default_names_or_tags
            .extend(names_or_tags.iter().map(|t| t.to_string()));
        self
    }

    /// Route comma-separated expressions by prefix: `+name` adds, `-token`
    /// removes, anything else sub-selects by tag.
    pub fn with_expression(mut self, expressions: &[&str]) -> Self {
        for expression in clean_expressions(expressions) {
            if let Some(name) = expression.strip_prefix('+') {
                self.add_names.push(name.to_string());
            } else if let Some(token) = expression.strip_prefix('-') {
                self.remove_names_or_tags.push(token.to_string());
            } else {
                self.sub_select_tags.push(expression);
            }
        }
        self
    }

    pub fn with_sub_selections(mut self, tags: &[&str]) -> Self {
        self.sub_select_tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_additions(mut self, names: &[&str]) -> Self {
        self.add_names.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_removals(mut self, names_or_tags: &[&str]) -> Self {
        self.remove_names_or_tags
            .extend(names_or_tags.iter().map(|t| t.to_string()));
        self
    }
}

fn clean_expressions(expressions: &[&str]) -> Vec<String> {
    expressions
        .iter()
        .flat_map(|e| e.split(','))
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve a selection request against a registry.
pub fn select(
    registry: &[CatalogerReference],
    request: &SelectionRequest,
) -> Vec<CatalogerReference> {
    // 1. seed: anything whose name or tags intersect the defaults; empty
    // defaults mean no restriction, so the whole registry seeds
    let mut selected: Vec<&CatalogerReference> = if request.default_names_or_tags.is_empty() {
        registry.iter().collect()
    } else {
        registry
            .iter()
            .filter(|r| {
                request
                    .default_names_or_tags
                    .iter()
                    .any(|token| r.matches_name_or_tag(token))
            })
            .collect()
    };

    // 2. sub-select: keep only catalogers carrying every requested tag
    if !request.sub_select_tags.is_empty() {
        selected.retain(|r| request.sub_select_tags.iter().all(|tag| r.matches_tag(tag)));
    }

    // 3. additions by name are authoritative, tags are not consulted
    for name in &request.add_names {
        if selected.iter().any(|r| r.matches_name(name)) {
            continue;
        }
        if let Some(reference) = registry.iter().find(|r| r.matches_name(name)) {
            selected.push(reference);
        }
    }

    // 4. removals match either name or tag
    selected.retain(|r| {
        !request
            .remove_names_or_tags
            .iter()
            .any(|token| r.matches_name_or_tag(token))
    });

    // 5. always-enabled catalogers cannot be deselected
    for reference in registry.iter().filter(|r| r.always_enabled) {
        if !selected.iter().any(|r| r.name() == reference.name()) {
            selected.push(reference);
        }
    }

    selected.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(selected: &[CatalogerReference]) -> Vec<&str> {
        let mut out: Vec<&str> = selected.iter().map(|r| r.name()).collect();
        out.sort();
        out
    }

    #[test]
    fn test_default_tag_seeding() {
        let registry = default_catalogers();
        let request = SelectionRequest::new().with_defaults(&[INSTALLED_TAG]);
        let selected = select(&registry, &request);

        assert!(names(&selected).contains(&"rpm-db-cataloger"));
        assert!(names(&selected).contains(&"dpkg-db-cataloger"));
        assert!(!names(&selected).contains(&"go-module-file-cataloger"));
    }

    #[test]
    fn test_installed_minus_os() {
        let registry = default_catalogers();
        let request = SelectionRequest::new()
            .with_defaults(&[INSTALLED_TAG])
            .with_removals(&[OS_TAG]);
        let selected = select(&registry, &request);

        // all installed-tagged catalogers minus any OS-tagged ones
        assert!(selected.iter().all(|r| !r.tags.contains(&OS_TAG.to_string())));
        assert!(names(&selected).contains(&"python-installed-package-cataloger"));
        assert!(!names(&selected).contains(&"rpm-db-cataloger"));
    }

    #[test]
    fn test_expression_binary_minus_os_language() {
        // a bare expression carries no defaults, only sub-selections,
        // additions, and removals
        let registry = default_catalogers();
        let request = SelectionRequest::new().with_expression(&["+binary, -os, language"]);
        let selected = select(&registry, &request);

        // language-tagged union the binary cataloger, minus os-tagged
        assert_eq!(
            names(&selected),
            vec![
                "binary-cataloger",
                "go-module-file-cataloger",
                "java-archive-cataloger",
                "javascript-package-cataloger",
                "python-installed-package-cataloger",
            ]
        );
    }

    #[test]
    fn test_empty_defaults_seed_the_whole_registry() {
        let registry = default_catalogers();
        let selected = select(&registry, &SelectionRequest::new());
        assert_eq!(selected.len(), registry.len());

        // removals still apply against the unrestricted seed
        let request = SelectionRequest::new().with_removals(&[OS_TAG]);
        let selected = select(&registry, &request);
        assert!(selected
            .iter()
            .all(|r| !r.tags.contains(&OS_TAG.to_string())));
        assert!(names(&selected).contains(&"binary-cataloger"));
    }

    #[test]
    fn test_sub_select_requires_all_tags() {
        let registry = default_catalogers();
        let request = SelectionRequest::new()
            .with_defaults(&[PACKAGE_TAG])
            .with_sub_selections(&[INSTALLED_TAG, LANGUAGE_TAG]);
        let selected = select(&registry, &request);

        assert_eq!(names(&selected), vec!["python-installed-package-cataloger"]);
    }

    #[test]
    fn test_addition_by_name_needs_no_tags() {
        let registry = default_catalogers();
        let request = SelectionRequest::new()
            .with_defaults(&[OS_TAG])
            .with_sub_selections(&["rpm"])
            .with_additions(&["go-module-file-cataloger"]);
        let selected = select(&registry, &request);

        assert!(names(&selected).contains(&"go-module-file-cataloger"));
        assert!(names(&selected).contains(&"rpm-db-cataloger"));
        assert!(!names(&selected).contains(&"dpkg-db-cataloger"));
    }

    #[test]
    fn test_removal_by_name() {
        let registry = default_catalogers();
        let request = SelectionRequest::new()
            .with_defaults(&[OS_TAG])
            .with_removals(&["rpm-archive-cataloger"]);
        let selected = select(&registry, &request);

        assert!(names(&selected).contains(&"rpm-db-cataloger"));
        assert!(!names(&selected).contains(&"rpm-archive-cataloger"));
    }

    #[test]
    fn test_expression_parsing_trims_and_splits() {
        let request = SelectionRequest::new().with_expression(&[" +binary ,  -os ", "language"]);
        assert_eq!(request.add_names, vec!["binary"]);
        assert_eq!(request.remove_names_or_tags, vec!["os"]);
        assert_eq!(request.sub_select_tags, vec!["language"]);
    }
}
