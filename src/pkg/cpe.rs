// src/pkg/cpe.rs

//! Common Platform Enumeration identifiers
//!
//! CPEs attached to a package are kept in a total, deterministic order:
//! primary key is the source priority (dictionary lookups beat declared
//! values beat generated guesses), then a weighted specificity score, then
//! total field length, with the bound format string as the final tiebreak.

use crate::artifact;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Where a CPE assertion came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CpeSource {
    NvdDictionaryLookup,
    Declared,
    #[default]
    Generated,
    #[serde(untagged)]
    Other(String),
}

impl CpeSource {
    pub fn name(&self) -> &str {
        match self {
            Self::NvdDictionaryLookup => "nvd-dictionary-lookup",
            Self::Declared => "declared",
            Self::Generated => "generated",
            Self::Other(s) => s,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::NvdDictionaryLookup => 1,
            Self::Declared => 2,
            Self::Generated => 3,
            // unknown sources carry no special priority and tie with each other
            Self::Other(_) => 4,
        }
    }
}

/// The component fields of a CPE 2.3 name. Empty fields bind as `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CpeAttributes {
    pub part: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    pub update: String,
    pub edition: String,
    pub language: String,
    pub sw_edition: String,
    pub target_sw: String,
    pub target_hw: String,
    pub other: String,
}

impl CpeAttributes {
    pub fn application(vendor: &str, product: &str, version: &str) -> Self {
        CpeAttributes {
            part: "a".to_string(),
            vendor: vendor.to_string(),
            product: product.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    /// Render as a `cpe:2.3:` formatted string.
    pub fn bind_to_fmt_string(&self) -> String {
        let bind = |s: &String| {
            if s.is_empty() {
                "*".to_string()
            } else {
                s.clone()
            }
        };
        format!(
            "cpe:2.3:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            bind(&self.part),
            bind(&self.vendor),
            bind(&self.product),
            bind(&self.version),
            bind(&self.update),
            bind(&self.edition),
            bind(&self.language),
            bind(&self.sw_edition),
            bind(&self.target_sw),
            bind(&self.target_hw),
            bind(&self.other),
        )
    }

    /// Parse a `cpe:2.3:...` formatted string.
    pub fn parse(input: &str) -> Option<CpeAttributes> {
        let rest = input.strip_prefix("cpe:2.3:")?;
        let mut fields: Vec<String> = rest
            .split(':')
            .map(|f| if f == "*" { String::new() } else { f.to_string() })
            .collect();
        fields.resize(11, String::new());

        let mut it = fields.into_iter();
        Some(CpeAttributes {
            part: it.next()?,
            vendor: it.next()?,
            product: it.next()?,
            version: it.next()?,
            update: it.next()?,
            edition: it.next()?,
            language: it.next()?,
            sw_edition: it.next()?,
            target_sw: it.next()?,
            target_hw: it.next()?,
            other: it.next()?,
        })
    }

    fn specificity(&self) -> u32 {
        let mut score = 0;
        if !self.part.is_empty() {
            score += 2;
        }
        if !self.vendor.is_empty() {
            score += 3;
        }
        if !self.product.is_empty() {
            score += 4;
        }
        if !self.version.is_empty() {
            score += 1;
        }
        if !self.target_sw.is_empty() {
            score += 1;
        }
        score
    }

    fn field_length(&self) -> usize {
        self.part.len()
            + self.vendor.len()
            + self.product.len()
            + self.version.len()
            + self.target_sw.len()
    }
}

impl fmt::Display for CpeAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bind_to_fmt_string())
    }
}

/// A sourced CPE assertion for a package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cpe {
    #[serde(rename = "cpe")]
    pub attributes: CpeAttributes,
    #[serde(default)]
    pub source: CpeSource,
}

impl Cpe {
    pub fn new(attributes: CpeAttributes, source: CpeSource) -> Self {
        Cpe { attributes, source }
    }

    /// Deduplication key: two CPEs are identical when their source and
    /// bound string match.
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}\\{}",
            self.source.name(),
            self.attributes.bind_to_fmt_string()
        )
    }
}

impl Hash for Cpe {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dedupe_key().hash(state);
    }
}

/// True when `a` is strictly more specific than `b`.
fn is_more_specific(a: &CpeAttributes, b: &CpeAttributes) -> bool {
    let (a_score, b_score) = (a.specificity(), b.specificity());
    if a_score != b_score {
        return a_score > b_score;
    }
    if a.field_length() != b.field_length() {
        return a.field_length() > b.field_length();
    }
    a.bind_to_fmt_string() < b.bind_to_fmt_string()
}

/// Total order: source priority, then specificity.
pub fn by_source_then_specificity(a: &Cpe, b: &Cpe) -> Ordering {
    let (ra, rb) = (a.source.rank(), b.source.rank());
    if ra != rb {
        return ra.cmp(&rb);
    }
    if is_more_specific(&a.attributes, &b.attributes) {
        Ordering::Less
    } else if is_more_specific(&b.attributes, &a.attributes) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Sort a CPE list into its canonical order.
pub fn sort_cpes(cpes: &mut [Cpe]) {
    cpes.sort_by(by_source_then_specificity);
}

/// Merge two CPE lists: union deduplicated by `(source, bound string)` with
/// later entries winning on collision, sorted canonically.
pub fn merge(a: &[Cpe], b: &[Cpe]) -> Vec<Cpe> {
    let mut merged: Vec<Cpe> = Vec::new();
    for cpe in a.iter().chain(b.iter()) {
        if let Some(existing) = merged.iter_mut().find(|c| c.dedupe_key() == cpe.dedupe_key()) {
            *existing = cpe.clone();
        } else {
            merged.push(cpe.clone());
        }
    }
    sort_cpes(&mut merged);
    merged
}

/// Hash a CPE list as a set, ignoring order.
pub fn hash_cpe_set<H: Hasher>(cpes: &[Cpe], state: &mut H) {
    let keys: Vec<String> = cpes.iter().map(|c| c.dedupe_key()).collect();
    artifact::hash_unordered(&keys, state);
}
