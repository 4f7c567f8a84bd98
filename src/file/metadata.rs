// src/file/metadata.rs

//! Per-file metadata captured during indexing

use serde::{Deserialize, Serialize};

/// The kind of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FileType {
    #[default]
    RegularFile,
    Directory,
    SymbolicLink,
    HardLink,
    Socket,
    CharacterDevice,
    BlockDevice,
    #[serde(rename = "FIFONode")]
    Fifo,
    IrregularFile,
}

impl FileType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegularFile => "RegularFile",
            Self::Directory => "Directory",
            Self::SymbolicLink => "SymbolicLink",
            Self::HardLink => "HardLink",
            Self::Socket => "Socket",
            Self::CharacterDevice => "CharacterDevice",
            Self::BlockDevice => "BlockDevice",
            Self::Fifo => "FIFONode",
            Self::IrregularFile => "IrregularFile",
        }
    }
}

/// Metadata for a single indexed file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "type")]
    pub file_type: FileType,

    /// Unix permission and type bits
    pub mode: u32,

    /// For symlinks, the raw link target
    #[serde(rename = "linkDestination", default, skip_serializing_if = "String::is_empty")]
    pub link_destination: String,

    /// Size in bytes (zero for non-regular files)
    pub size: i64,

    #[serde(rename = "mimeType", default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
}

impl Metadata {
    pub fn regular_file(size: i64, mode: u32) -> Self {
        Metadata {
            file_type: FileType::RegularFile,
            mode,
            size,
            ..Default::default()
        }
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        Metadata {
            file_type: FileType::SymbolicLink,
            link_destination: target.into(),
            ..Default::default()
        }
    }

    pub fn directory(mode: u32) -> Self {
        Metadata {
            file_type: FileType::Directory,
            mode,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&FileType::SymbolicLink).unwrap(),
            "\"SymbolicLink\""
        );
        assert_eq!(serde_json::to_string(&FileType::Fifo).unwrap(), "\"FIFONode\"");
    }

    #[test]
    fn test_metadata_roundtrip() {
        let metadata = Metadata {
            file_type: FileType::RegularFile,
            mode: 0o644,
            size: 1234,
            mime_type: "text/plain".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&metadata).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, back);
    }
}
