// src/linux.rs

//! Linux distribution identification
//!
//! Parses `os-release` data found within the cataloged source. The resolved
//! release feeds distro-qualified package URLs for OS package catalogers.

use serde::{Deserialize, Serialize};

/// Paths probed for release information, in priority order.
pub const OS_RELEASE_PATHS: &[&str] = &["/etc/os-release", "/usr/lib/os-release"];

/// An identified Linux distribution release
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Release {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "idLike", default, skip_serializing_if = "Vec::is_empty")]
    pub id_like: Vec<String>,

    #[serde(rename = "versionID", default, skip_serializing_if = "String::is_empty")]
    pub version_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(rename = "prettyName", default, skip_serializing_if = "String::is_empty")]
    pub pretty_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl Release {
    /// Parse the `KEY=value` lines of an os-release file.
    ///
    /// Unknown keys are ignored; values may be quoted with single or double
    /// quotes. Returns `None` when no recognized key is present.
    pub fn parse(content: &str) -> Option<Release> {
        let mut release = Release::default();
        let mut any = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw_value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(raw_value.trim());

            match key.trim() {
                "ID" => release.id = value,
                "ID_LIKE" => {
                    release.id_like = value.split_whitespace().map(str::to_string).collect()
                }
                "VERSION_ID" => release.version_id = value,
                "VERSION" => release.version = value,
                "PRETTY_NAME" => release.pretty_name = value,
                "NAME" => release.name = value,
                _ => continue,
            }
            any = true;
        }

        if any {
            Some(release)
        } else {
            None
        }
    }

    /// The `<id>-<version_id>` string used as a purl `distro` qualifier.
    pub fn distro_qualifier(&self) -> Option<String> {
        if self.id.is_empty() {
            return None;
        }
        if self.version_id.is_empty() {
            Some(self.id.clone())
        } else {
            Some(format!("{}-{}", self.id, self.version_id))
        }
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROCKY: &str = r#"
NAME="Rocky Linux"
VERSION="9.3 (Blue Onyx)"
ID="rocky"
ID_LIKE="rhel centos fedora"
VERSION_ID="9.3"
PRETTY_NAME="Rocky Linux 9.3 (Blue Onyx)"
"#;

    #[test]
    fn test_parse_os_release() {
        let release = Release::parse(ROCKY).unwrap();
        assert_eq!(release.id, "rocky");
        assert_eq!(release.version_id, "9.3");
        assert_eq!(release.id_like, vec!["rhel", "centos", "fedora"]);
        assert_eq!(release.pretty_name, "Rocky Linux 9.3 (Blue Onyx)");
    }

    #[test]
    fn test_distro_qualifier() {
        let release = Release::parse(ROCKY).unwrap();
        assert_eq!(release.distro_qualifier().unwrap(), "rocky-9.3");

        let bare = Release {
            id: "alpine".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.distro_qualifier().unwrap(), "alpine");
        assert!(Release::default().distro_qualifier().is_none());
    }

    #[test]
    fn test_parse_ignores_comments_and_garbage() {
        let release = Release::parse("# comment\nnot a pair\nID=debian\n").unwrap();
        assert_eq!(release.id, "debian");
        assert!(Release::parse("# only comments\n").is_none());
    }

    #[test]
    fn test_single_quoted_values() {
        let release = Release::parse("ID='arch'\n").unwrap();
        assert_eq!(release.id, "arch");
    }
}
