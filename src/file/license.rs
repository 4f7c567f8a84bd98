// src/file/license.rs

//! License evidence discovered in file contents
//!
//! Classification itself is performed by an external scanner (see
//! `filecatalog::LicenseScanner`); this module holds the resulting model and
//! the best-effort normalization of raw license text into an SPDX
//! expression. When the text does not parse as an SPDX expression the raw
//! value is retained and the expression left empty.

use serde::{Deserialize, Serialize};

/// How a license assertion was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseType {
    /// Stated by package metadata or file contents
    #[default]
    Declared,
    /// Determined by inspection of contents
    Concluded,
}

/// A license discovered for a file or package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct License {
    /// The raw license value as found
    pub value: String,

    /// The SPDX form of the value; empty when parsing failed
    #[serde(rename = "spdxExpression", default)]
    pub spdx_expression: String,

    #[serde(rename = "type", default)]
    pub license_type: LicenseType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<LicenseEvidence>,
}

impl License {
    /// Build a license from raw text, normalizing to SPDX where possible.
    pub fn from_value(value: impl Into<String>) -> Self {
        let value = value.into();
        let spdx_expression = parse_spdx_expression(&value).unwrap_or_default();
        License {
            value,
            spdx_expression,
            license_type: LicenseType::Declared,
            evidence: None,
        }
    }

    pub fn concluded(mut self) -> Self {
        self.license_type = LicenseType::Concluded;
        self
    }

    pub fn with_evidence(mut self, evidence: LicenseEvidence) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// Where and how confidently license content was matched
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LicenseEvidence {
    /// Match confidence in percent
    pub confidence: i32,
    /// Byte offset of the matched region
    pub offset: i64,
    /// Length of the matched region
    pub extent: i64,
}

// License identifiers recognized by the expression validator. This is the
// working set seen in the wild, not the full SPDX list.
const KNOWN_LICENSE_IDS: &[&str] = &[
    "0BSD",
    "AGPL-3.0-only",
    "AGPL-3.0-or-later",
    "Apache-1.1",
    "Apache-2.0",
    "Artistic-1.0",
    "Artistic-2.0",
    "BSD-1-Clause",
    "BSD-2-Clause",
    "BSD-3-Clause",
    "BSD-4-Clause",
    "BSL-1.0",
    "CC-BY-4.0",
    "CC-BY-SA-4.0",
    "CC0-1.0",
    "CDDL-1.0",
    "EPL-1.0",
    "EPL-2.0",
    "GFDL-1.3-only",
    "GPL-1.0-only",
    "GPL-2.0-only",
    "GPL-2.0-or-later",
    "GPL-3.0-only",
    "GPL-3.0-or-later",
    "ISC",
    "LGPL-2.0-only",
    "LGPL-2.1-only",
    "LGPL-2.1-or-later",
    "LGPL-3.0-only",
    "LGPL-3.0-or-later",
    "MIT",
    "MIT-0",
    "MPL-1.1",
    "MPL-2.0",
    "OpenSSL",
    "PSF-2.0",
    "Python-2.0",
    "Unlicense",
    "UPL-1.0",
    "WTFPL",
    "Zlib",
];

// Common non-SPDX spellings mapped to their SPDX identifier.
const LICENSE_ID_ALIASES: &[(&str, &str)] = &[
    ("apache 2.0", "Apache-2.0"),
    ("apache license 2.0", "Apache-2.0"),
    ("apache-2", "Apache-2.0"),
    ("bsd", "BSD-3-Clause"),
    ("gpl-2.0", "GPL-2.0-only"),
    ("gpl-2.0+", "GPL-2.0-or-later"),
    ("gpl-3.0", "GPL-3.0-only"),
    ("gpl-3.0+", "GPL-3.0-or-later"),
    ("gplv2", "GPL-2.0-only"),
    ("gplv2+", "GPL-2.0-or-later"),
    ("gplv3", "GPL-3.0-only"),
    ("gplv3+", "GPL-3.0-or-later"),
    ("lgpl-2.1", "LGPL-2.1-only"),
    ("lgpl-2.1+", "LGPL-2.1-or-later"),
    ("lgplv2", "LGPL-2.0-only"),
    ("lgplv2+", "LGPL-2.1-or-later"),
    ("lgplv3", "LGPL-3.0-only"),
    ("mit license", "MIT"),
    ("mit/x11", "MIT"),
    ("mplv2.0", "MPL-2.0"),
    ("public domain", "Unlicense"),
    ("zlib/libpng", "Zlib"),
];

fn normalize_single_id(token: &str) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    for id in KNOWN_LICENSE_IDS {
        if id.eq_ignore_ascii_case(trimmed) {
            return Some((*id).to_string());
        }
    }
    let lower = trimmed.to_lowercase();
    for (alias, id) in LICENSE_ID_ALIASES {
        if *alias == lower {
            return Some((*id).to_string());
        }
    }
    // LicenseRef- identifiers pass through untouched
    if trimmed.starts_with("LicenseRef-")
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Some(trimmed.to_string());
    }
    None
}

/// Best-effort parse of raw license text into an SPDX expression.
///
/// Handles single identifiers, the common aliases above, and simple
/// AND/OR compositions. Returns `None` when any operand is unrecognized.
pub fn parse_spdx_expression(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_start_matches('(').trim_end_matches(')');
    if trimmed.is_empty() {
        return None;
    }

    for op in [" AND ", " and ", " OR ", " or "] {
        if trimmed.contains(op) {
            let spdx_op = op.trim().to_uppercase();
            let mut parts = Vec::new();
            for token in trimmed.split(op) {
                parts.push(normalize_single_id(token)?);
            }
            return Some(parts.join(&format!(" {} ", spdx_op)));
        }
    }

    normalize_single_id(trimmed)
}
