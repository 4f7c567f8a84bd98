// src/pkg/cataloger/golang.rs

//! go module-file cataloger (`go.mod`)
//!
//! Declared dependencies only: each `require` directive becomes a package.
//! Replaced modules take their replacement's path and version.

use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{GoModuleEntry, Language, Package, PackageMetadata, PackageType, PackageUrl};
use std::collections::HashMap;
use std::io::Read;

/// Cataloger over declared go module files
pub fn module_file_cataloger() -> Cataloger {
    Cataloger::new("go-module-file-cataloger").with_parser_by_globs(parse_go_mod, &["**/go.mod"])
}

#[derive(Debug, Clone)]
struct Requirement {
    path: String,
    version: String,
    indirect: bool,
}

fn parse_go_mod(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let mut requirements: Vec<Requirement> = Vec::new();
    let mut replacements: HashMap<String, (String, String)> = HashMap::new();
    let mut block: Option<&str> = None;

    for raw_line in content.lines() {
        let line = strip_comment(raw_line).trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(kind) = block {
            if line == ")" {
                block = None;
                continue;
            }
            apply_directive(kind, &line, raw_line, &mut requirements, &mut replacements);
            continue;
        }

        for kind in ["require", "replace", "exclude"] {
            if let Some(rest) = line.strip_prefix(kind) {
                let rest = rest.trim();
                if rest == "(" {
                    block = Some(kind);
                } else if !rest.is_empty() {
                    apply_directive(kind, rest, raw_line, &mut requirements, &mut replacements);
                }
                break;
            }
        }
    }

    let mut packages = Vec::new();
    for requirement in requirements {
        let (path, version) = match replacements.get(&requirement.path) {
            Some((new_path, new_version)) => (
                new_path.clone(),
                if new_version.is_empty() {
                    requirement.version.clone()
                } else {
                    new_version.clone()
                },
            ),
            None => (requirement.path.clone(), requirement.version.clone()),
        };

        let (namespace, name) = match path.rsplit_once('/') {
            Some((ns, name)) => (ns.to_string(), name.to_string()),
            None => (String::new(), path.clone()),
        };

        let mut package = Package {
            name: path.clone(),
            version: version.clone(),
            package_type: PackageType::GoModule,
            language: Language::Go,
            purl: PackageUrl::new("golang", &name)
                .with_namespace(&namespace)
                .with_version(&version)
                .to_string(),
            metadata: Some(PackageMetadata::GoModuleEntry(GoModuleEntry {
                module_path: path,
                indirect: requirement.indirect,
            })),
            ..Default::default()
        };
        package
            .locations
            .add(ctx.location.clone().with_primary_evidence());
        packages.push(package);
    }

    Ok((packages, Vec::new()))
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(at) => &line[..at],
        None => line,
    }
}

fn apply_directive(
    kind: &str,
    line: &str,
    raw_line: &str,
    requirements: &mut Vec<Requirement>,
    replacements: &mut HashMap<String, (String, String)>,
) {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match kind {
        "require" if fields.len() >= 2 => {
            requirements.push(Requirement {
                path: fields[0].to_string(),
                version: fields[1].to_string(),
                indirect: raw_line.contains("// indirect"),
            });
        }
        "replace" if fields.len() >= 3 => {
            // `old [version] => new [version]`
            if let Some(arrow) = fields.iter().position(|f| *f == "=>") {
                let old_path = fields[0];
                let new_path = fields.get(arrow + 1).unwrap_or(&"");
                let new_version = fields.get(arrow + 2).unwrap_or(&"");
                if !new_path.is_empty() {
                    replacements.insert(
                        old_path.to_string(),
                        (new_path.to_string(), new_version.to_string()),
                    );
                }
            }
        }
        _ => {}
    }
}
