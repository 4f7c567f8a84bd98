// src/filecatalog/license.rs

//! License classification over file contents
//!
//! Classification is pluggable: the file catalog consumes any
//! [`LicenseScanner`]. The built-in scanner is a phrase matcher over
//! canonical license texts, limited to conventional license file names; it
//! reports a confidence and the matched region as evidence.

use crate::file::{License, LicenseEvidence};
use regex::Regex;

/// Classifies file contents into license findings
pub trait LicenseScanner: Send + Sync {
    /// Scan one file's contents. An empty result means no license content
    /// was recognized.
    fn scan(&self, path: &str, content: &[u8]) -> Vec<License>;
}

struct Rule {
    pattern: Regex,
    spdx_id: &'static str,
    confidence: i32,
}

/// Phrase-matching scanner over conventional license files
pub struct BuiltinLicenseScanner {
    rules: Vec<Rule>,
}

impl BuiltinLicenseScanner {
    pub fn new() -> Self {
        let rule = |pattern: &str, spdx_id: &'static str, confidence: i32| Rule {
            pattern: Regex::new(pattern).expect("license rules are static"),
            spdx_id,
            confidence,
        };
        BuiltinLicenseScanner {
            rules: vec![
                rule(
                    r"Permission is hereby granted, free of charge",
                    "MIT",
                    90,
                ),
                rule(r"Apache License\s+Version 2\.0", "Apache-2.0", 95),
                rule(
                    r"GNU GENERAL PUBLIC LICENSE\s+Version 2",
                    "GPL-2.0-only",
                    95,
                ),
                rule(
                    r"GNU GENERAL PUBLIC LICENSE\s+Version 3",
                    "GPL-3.0-only",
                    95,
                ),
                rule(
                    r"GNU LESSER GENERAL PUBLIC LICENSE\s+Version 2\.1",
                    "LGPL-2.1-only",
                    95,
                ),
                rule(
                    r"Redistribution and use in source and binary forms",
                    "BSD-3-Clause",
                    75,
                ),
                rule(r"Mozilla Public License Version 2\.0", "MPL-2.0", 95),
                rule(
                    r"Permission to use, copy, modify, and/?or distribute this software",
                    "ISC",
                    85,
                ),
                rule(
                    r"This is free and unencumbered software released into the public domain",
                    "Unlicense",
                    95,
                ),
            ],
        }
    }
}

impl Default for BuiltinLicenseScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Conventional license file names the built-in scanner inspects
fn is_license_file(path: &str) -> bool {
    let base = path.rsplit('/').next().unwrap_or_default().to_uppercase();
    base.starts_with("LICENSE")
        || base.starts_with("LICENCE")
        || base.starts_with("COPYING")
        || base.starts_with("COPYRIGHT")
        || base.starts_with("NOTICE")
}

impl LicenseScanner for BuiltinLicenseScanner {
    fn scan(&self, path: &str, content: &[u8]) -> Vec<License> {
        if !is_license_file(path) {
            return Vec::new();
        }
        let text = String::from_utf8_lossy(content);

        let mut out = Vec::new();
        for rule in &self.rules {
            if let Some(found) = rule.pattern.find(&text) {
                out.push(
                    License::from_value(rule.spdx_id)
                        .concluded()
                        .with_evidence(LicenseEvidence {
                            confidence: rule.confidence,
                            offset: found.start() as i64,
                            extent: (found.end() - found.start()) as i64,
                        }),
                );
            }
        }
        out
    }
}

/// A scanner that finds nothing, for configurations with licenses disabled
pub struct NoopLicenseScanner;

impl LicenseScanner for NoopLicenseScanner {
    fn scan(&self, _path: &str, _content: &[u8]) -> Vec<License> {
        Vec::new()
    }
}
