// src/format/table.rs

//! Human-readable table output (encode only)

use crate::error::Result;
use crate::format::{FormatEncoder, FormatId};
use crate::sbom::Sbom;
use std::io::Write;

pub const FORMAT_ID: &str = "table";

/// Column-aligned package listing
pub struct Encoder;

impl FormatEncoder for Encoder {
    fn id(&self) -> FormatId {
        FormatId::from(FORMAT_ID)
    }

    fn version(&self) -> String {
        String::new()
    }

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()> {
        let mut rows: Vec<[String; 3]> = vec![[
            "NAME".to_string(),
            "VERSION".to_string(),
            "TYPE".to_string(),
        ]];
        for package in sbom.packages_sorted() {
            rows.push([
                package.name.clone(),
                package.version.clone(),
                package.package_type.name().to_string(),
            ]);
        }

        let mut widths = [0usize; 3];
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        for row in &rows {
            writeln!(
                writer,
                "{:<name_width$}  {:<version_width$}  {}",
                row[0],
                row[1],
                row[2],
                name_width = widths[0],
                version_width = widths[1],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::{Collection, Package, PackageType};
    use crate::sbom::Artifacts;

    #[test]
    fn test_table_alignment() {
        let mut packages = Collection::default();
        packages.add(
            Package {
                name: "coreutils".to_string(),
                version: "9.0-1.el9".to_string(),
                package_type: PackageType::Rpm,
                ..Default::default()
            }
            .with_id(),
        );
        packages.add(
            Package {
                name: "sh".to_string(),
                version: "1".to_string(),
                package_type: PackageType::Binary,
                ..Default::default()
            }
            .with_id(),
        );
        let sbom = Sbom {
            artifacts: Artifacts {
                packages,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut out = Vec::new();
        Encoder.encode(&mut out, &sbom).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        // binary sorts before rpm by type
        assert!(lines[1].starts_with("sh"));
        assert!(lines[2].starts_with("coreutils"));
    }
}
