// src/pkg/purl.rs

//! Package URL construction and parsing
//!
//! Builds canonical `pkg:` identifiers: lowercased type, percent-encoded
//! segments, qualifiers sorted by key. The string form is always rebuilt
//! from components so equal packages render identical purls regardless of
//! how their fields were populated.

use std::collections::BTreeMap;
use std::fmt;

pub const TYPE_RPM: &str = "rpm";
pub const TYPE_DEB: &str = "deb";
pub const TYPE_ALPM: &str = "alpm";
pub const TYPE_MAVEN: &str = "maven";
pub const TYPE_NPM: &str = "npm";
pub const TYPE_PYPI: &str = "pypi";
pub const TYPE_GOLANG: &str = "golang";
pub const TYPE_GENERIC: &str = "generic";

pub const QUALIFIER_ARCH: &str = "arch";
pub const QUALIFIER_EPOCH: &str = "epoch";
pub const QUALIFIER_UPSTREAM: &str = "upstream";
pub const QUALIFIER_DISTRO: &str = "distro";

/// A parsed or constructed package URL
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageUrl {
    pub package_type: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub qualifiers: BTreeMap<String, String>,
    pub subpath: String,
}

impl PackageUrl {
    pub fn new(package_type: &str, name: &str) -> Self {
        PackageUrl {
            package_type: package_type.to_lowercase(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_qualifier(mut self, key: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.qualifiers.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Parse a `pkg:` string back into components. Returns `None` when the
    /// scheme or required segments are missing.
    pub fn parse(input: &str) -> Option<PackageUrl> {
        let rest = input.strip_prefix("pkg:")?;

        let (rest, subpath) = match rest.rsplit_once('#') {
            Some((r, s)) => (r, percent_decode(s)),
            None => (rest, String::new()),
        };

        let (rest, qualifiers) = match rest.split_once('?') {
            Some((r, q)) => {
                let mut map = BTreeMap::new();
                for pair in q.split('&') {
                    if let Some((k, v)) = pair.split_once('=') {
                        if !v.is_empty() {
                            map.insert(k.to_lowercase(), percent_decode(v));
                        }
                    }
                }
                (r, map)
            }
            None => (rest, BTreeMap::new()),
        };

        let (rest, version) = match rest.rsplit_once('@') {
            Some((r, v)) => (r, percent_decode(v)),
            None => (rest, String::new()),
        };

        let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return None;
        }
        let package_type = segments.remove(0).to_lowercase();
        let name = percent_decode(segments.pop()?);
        let namespace = segments
            .iter()
            .map(|s| percent_decode(s))
            .collect::<Vec<_>>()
            .join("/");

        Some(PackageUrl {
            package_type,
            namespace,
            name,
            version,
            qualifiers,
            subpath,
        })
    }
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}", self.package_type)?;
        if !self.namespace.is_empty() {
            for segment in self.namespace.split('/') {
                write!(f, "/{}", percent_encode(segment))?;
            }
        }
        write!(f, "/{}", percent_encode(&self.name))?;
        if !self.version.is_empty() {
            write!(f, "@{}", percent_encode(&self.version))?;
        }
        if !self.qualifiers.is_empty() {
            let mut sep = '?';
            for (key, value) in &self.qualifiers {
                write!(f, "{}{}={}", sep, key, percent_encode(value))?;
                sep = '&';
            }
        }
        if !self.subpath.is_empty() {
            write!(f, "#{}", percent_encode(&self.subpath))?;
        }
        Ok(())
    }
}

// Characters that survive un-encoded inside a purl segment.
fn is_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'.' | b'-' | b'_' | b'~')
}

fn percent_encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_purl_with_qualifiers() {
        let purl = PackageUrl::new(TYPE_RPM, "coreutils")
            .with_namespace("rocky")
            .with_version("9.0-1.el9")
            .with_qualifier(QUALIFIER_ARCH, "x86_64");
        assert_eq!(
            purl.to_string(),
            "pkg:rpm/rocky/coreutils@9.0-1.el9?arch=x86_64"
        );
    }

    #[test]
    fn test_qualifiers_sorted_by_key() {
        let purl = PackageUrl::new(TYPE_RPM, "zlib")
            .with_qualifier("upstream", "zlib-1.2.src.rpm")
            .with_qualifier("arch", "noarch")
            .with_qualifier("distro", "fedora-40");
        let rendered = purl.to_string();
        let q = rendered.split('?').nth(1).unwrap();
        assert_eq!(q, "arch=noarch&distro=fedora-40&upstream=zlib-1.2.src.rpm");
    }

    #[test]
    fn test_empty_qualifier_dropped() {
        let purl = PackageUrl::new(TYPE_DEB, "bash").with_qualifier(QUALIFIER_ARCH, "");
        assert_eq!(purl.to_string(), "pkg:deb/bash");
    }

    #[test]
    fn test_namespace_segments_encoded() {
        let purl = PackageUrl::new(TYPE_GOLANG, "cobra")
            .with_namespace("github.com/spf13")
            .with_version("v1.8.0");
        assert_eq!(
            purl.to_string(),
            "pkg:golang/github.com/spf13/cobra@v1.8.0"
        );
    }

    #[test]
    fn test_scoped_npm_name_encoding() {
        let purl = PackageUrl::new(TYPE_NPM, "core")
            .with_namespace("@babel")
            .with_version("7.24.0");
        assert_eq!(purl.to_string(), "pkg:npm/%40babel/core@7.24.0");
    }

    #[test]
    fn test_parse_roundtrip() {
        let original = "pkg:rpm/rocky/coreutils@9.0-1.el9?arch=x86_64&distro=rocky-9.3";
        let purl = PackageUrl::parse(original).unwrap();
        assert_eq!(purl.package_type, "rpm");
        assert_eq!(purl.namespace, "rocky");
        assert_eq!(purl.name, "coreutils");
        assert_eq!(purl.version, "9.0-1.el9");
        assert_eq!(purl.qualifiers.get("arch").unwrap(), "x86_64");
        assert_eq!(purl.to_string(), original);
    }

    #[test]
    fn test_parse_scoped_npm() {
        let purl = PackageUrl::parse("pkg:npm/%40babel/core@7.24.0").unwrap();
        assert_eq!(purl.namespace, "@babel");
        assert_eq!(purl.name, "core");
    }

    #[test]
    fn test_parse_rejects_non_purl() {
        assert!(PackageUrl::parse("http://example.com").is_none());
        assert!(PackageUrl::parse("pkg:only-type").is_none());
    }
}
