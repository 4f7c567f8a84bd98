// src/pkg/cataloger/kernel.rs

//! linux kernel-module cataloger (`*.ko`)
//!
//! Reads the `.modinfo` ELF section: NUL-separated `key=value` records
//! carrying the module name, version, license, and build metadata.

use crate::error::Error;
use crate::file::License;
use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{Language, LinuxKernelModule, Package, PackageMetadata, PackageType, PackageUrl};
use goblin::elf::Elf;
use std::collections::HashMap;
use std::io::Read;

/// Cataloger over kernel modules
pub fn module_cataloger() -> Cataloger {
    Cataloger::new("linux-kernel-module-cataloger")
        .with_parser_by_globs(parse_kernel_module, &["**/*.ko"])
}

fn parse_kernel_module(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    let elf = Elf::parse(&data).map_err(|e| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: format!("not an ELF object: {}", e),
    })?;

    let modinfo = elf
        .section_headers
        .iter()
        .find(|section| elf.shdr_strtab.get_at(section.sh_name) == Some(".modinfo"))
        .ok_or_else(|| Error::Parse {
            path: ctx.location.real_path().to_string(),
            reason: "object has no .modinfo section".to_string(),
        })?;

    let start = modinfo.sh_offset as usize;
    let end = start + modinfo.sh_size as usize;
    let section = data.get(start..end).ok_or_else(|| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: ".modinfo section extends past the file".to_string(),
    })?;

    let fields = parse_modinfo(section);
    let Some(name) = fields.get("name").filter(|n| !n.is_empty()) else {
        return Err(Error::Parse {
            path: ctx.location.real_path().to_string(),
            reason: ".modinfo carries no module name".to_string(),
        });
    };

    let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
    let metadata = LinuxKernelModule {
        name: name.clone(),
        version: get("version"),
        author: get("author"),
        license: get("license"),
        description: get("description"),
        kernel_version: get("vermagic")
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string(),
        source_version: get("srcversion"),
        path: ctx.location.real_path().to_string(),
        parameters: fields
            .iter()
            .filter(|(k, _)| k.as_str() == "parm")
            .map(|(_, v)| v.clone())
            .collect(),
    };

    let version = metadata.version.clone();
    let mut package = Package {
        name: name.clone(),
        version: version.clone(),
        package_type: PackageType::LinuxKernelModule,
        language: Language::None,
        purl: PackageUrl::new("generic", name)
            .with_version(&version)
            .to_string(),
        metadata: None,
        ..Default::default()
    };
    if !metadata.license.is_empty() {
        package
            .licenses
            .add(License::from_value(metadata.license.clone()));
    }
    package.metadata = Some(PackageMetadata::LinuxKernelModule(metadata));
    package
        .locations
        .add(ctx.location.clone().with_primary_evidence());

    Ok((vec![package], Vec::new()))
}

/// NUL-separated `key=value` records. Repeated keys (`parm`) keep their
/// last value in the map; callers that need all values re-scan.
fn parse_modinfo(section: &[u8]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for record in section.split(|b| *b == 0) {
        if record.is_empty() {
            continue;
        }
        let text = String::from_utf8_lossy(record);
        if let Some((key, value)) = text.split_once('=') {
            fields.insert(key.to_string(), value.to_string());
        }
    }
    fields
}
