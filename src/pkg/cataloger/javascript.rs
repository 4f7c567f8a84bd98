// src/pkg/cataloger/javascript.rs

//! javascript package cataloger (`package.json`)

use crate::file::License;
use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{Language, NpmPackage, Package, PackageMetadata, PackageType, PackageUrl};
use serde_json::Value;
use std::io::Read;

/// Cataloger over declared npm package manifests
pub fn package_cataloger() -> Cataloger {
    Cataloger::new("javascript-package-cataloger")
        .with_parser_by_globs(parse_package_json, &["**/package.json"])
}

fn parse_package_json(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let value: Value = serde_json::from_reader(reader).map_err(|e| crate::error::Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: format!("invalid package.json: {}", e),
    })?;

    let Some(name) = value["name"].as_str().filter(|n| !n.is_empty()) else {
        // fragments without a name (e.g. jest haste maps) are not packages
        return Ok((Vec::new(), Vec::new()));
    };
    let version = value["version"].as_str().unwrap_or_default();

    let dependencies: Vec<String> = value["dependencies"]
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();

    let metadata = NpmPackage {
        name: name.to_string(),
        version: version.to_string(),
        author: author_of(&value),
        homepage: value["homepage"].as_str().unwrap_or_default().to_string(),
        description: value["description"].as_str().unwrap_or_default().to_string(),
        private: value["private"].as_bool().unwrap_or(false),
        dependencies,
    };

    let mut package = Package {
        name: name.to_string(),
        version: version.to_string(),
        package_type: PackageType::Npm,
        language: Language::Javascript,
        purl: npm_purl(name, version),
        metadata: Some(PackageMetadata::NpmPackage(metadata)),
        ..Default::default()
    };
    for license in licenses_of(&value) {
        package.licenses.add(License::from_value(license));
    }
    package
        .locations
        .add(ctx.location.clone().with_primary_evidence());

    Ok((vec![package], Vec::new()))
}

/// `author` may be a string or an object with a name.
fn author_of(value: &Value) -> String {
    match &value["author"] {
        Value::String(s) => s.clone(),
        Value::Object(o) => o
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// `license` may be a string, `licenses` an array of objects.
fn licenses_of(value: &Value) -> Vec<String> {
    if let Some(license) = value["license"].as_str() {
        return vec![license.to_string()];
    }
    if let Some(entries) = value["licenses"].as_array() {
        return entries
            .iter()
            .filter_map(|e| e["type"].as_str().map(str::to_string))
            .collect();
    }
    Vec::new()
}

fn npm_purl(name: &str, version: &str) -> String {
    let (namespace, bare) = match name.split_once('/') {
        Some((scope, bare)) if scope.starts_with('@') => (scope, bare),
        _ => ("", name),
    };
    PackageUrl::new("npm", bare)
        .with_namespace(namespace)
        .with_version(version)
        .to_string()
}
