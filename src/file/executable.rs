// src/file/executable.rs

//! Executable file classification and ELF hardening features

use serde::{Deserialize, Serialize};

/// Recognized executable container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutableFormat {
    Elf,
    #[serde(rename = "macho")]
    MachO,
    Pe,
}

impl ExecutableFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Elf => "elf",
            Self::MachO => "macho",
            Self::Pe => "pe",
        }
    }
}

/// GOT/relocation write protection level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocationReadOnly {
    #[default]
    None,
    Partial,
    Full,
}

/// An analyzed executable file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executable {
    pub format: ExecutableFormat,

    /// Present only for ELF binaries; formats without feature extraction
    /// carry no feature set.
    #[serde(rename = "elfSecurityFeatures", skip_serializing_if = "Option::is_none")]
    pub security_features: Option<ElfSecurityFeatures>,
}

/// Hardening features detected on an ELF binary
///
/// Each optional field is left unset where detection was not possible.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElfSecurityFeatures {
    #[serde(rename = "symbolTableStripped")]
    pub symbol_table_stripped: bool,

    #[serde(rename = "stackCanary", skip_serializing_if = "Option::is_none")]
    pub stack_canary: Option<bool>,

    /// The stack is marked non-executable
    #[serde(rename = "nx")]
    pub no_executable: bool,

    #[serde(rename = "relRO")]
    pub relocation_read_only: RelocationReadOnly,

    #[serde(rename = "pie")]
    pub position_independent_executable: bool,

    #[serde(rename = "dso")]
    pub dynamic_shared_object: bool,

    #[serde(rename = "safeStack", skip_serializing_if = "Option::is_none")]
    pub llvm_safe_stack: Option<bool>,

    #[serde(rename = "cfi", skip_serializing_if = "Option::is_none")]
    pub llvm_control_flow_integrity: Option<bool>,

    #[serde(rename = "fortify", skip_serializing_if = "Option::is_none")]
    pub clang_fortify_source: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_serde_shape() {
        let exe = Executable {
            format: ExecutableFormat::Elf,
            security_features: Some(ElfSecurityFeatures {
                no_executable: true,
                relocation_read_only: RelocationReadOnly::Full,
                position_independent_executable: true,
                stack_canary: Some(true),
                ..Default::default()
            }),
        };
        let json = serde_json::to_value(&exe).unwrap();
        assert_eq!(json["format"], "elf");
        assert_eq!(json["elfSecurityFeatures"]["relRO"], "full");
        assert_eq!(json["elfSecurityFeatures"]["nx"], true);

        let back: Executable = serde_json::from_value(json).unwrap();
        assert_eq!(exe, back);
    }

    #[test]
    fn test_non_elf_has_no_feature_set() {
        let exe = Executable {
            format: ExecutableFormat::Pe,
            security_features: None,
        };
        let json = serde_json::to_value(&exe).unwrap();
        assert!(json.get("elfSecurityFeatures").is_none());
    }
}
