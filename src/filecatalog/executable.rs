// src/filecatalog/executable.rs

//! Executable format identification and ELF hardening analysis
//!
//! Format identification works off the first sector: `MZ` is PE, the
//! `CAFEBABE` magic is a fat Mach-O when byte 7 is a small architecture
//! count (Java class files share the magic and carry their major version
//! there), the `FEEDFACE` family is Mach-O, and `\x7fELF` is ELF. Only ELF
//! gets a security-feature set; other formats yield none.

use crate::file::{ElfSecurityFeatures, Executable, ExecutableFormat, RelocationReadOnly};
use goblin::elf::dynamic::{DF_1_NOW, DF_1_PIE, DF_BIND_NOW, DT_BIND_NOW, DT_FLAGS, DT_FLAGS_1};
use goblin::elf::program_header::{PF_X, PT_GNU_RELRO, PT_GNU_STACK};
use goblin::elf::Elf;
use tracing::debug;

/// Identify the executable format from leading bytes.
pub fn identify_format(head: &[u8]) -> Option<ExecutableFormat> {
    if head.len() < 8 {
        return None;
    }
    if head.starts_with(b"MZ") {
        return Some(ExecutableFormat::Pe);
    }
    if head.starts_with(&[0xCA, 0xFE, 0xBA, 0xBE]) {
        // disambiguate from Java class files by the fat architecture count
        if head[7] < 20 {
            return Some(ExecutableFormat::MachO);
        }
        return None;
    }
    if head.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || head.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || head.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || head.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
    {
        return Some(ExecutableFormat::MachO);
    }
    if head.starts_with(b"\x7fELF") {
        return Some(ExecutableFormat::Elf);
    }
    None
}

/// Analyze an executable's full contents.
///
/// Failures are non-fatal: an unparseable ELF still reports its format,
/// just without a feature set.
pub fn analyze(path: &str, data: &[u8]) -> Option<Executable> {
    let format = identify_format(data)?;

    let security_features = match format {
        ExecutableFormat::Elf => match Elf::parse(data) {
            Ok(elf) => Some(elf_security_features(&elf)),
            Err(e) => {
                debug!(path, error = %e, "unable to parse ELF for security features");
                None
            }
        },
        // unsupported formats carry no feature set
        _ => None,
    };

    Some(Executable {
        format,
        security_features,
    })
}

fn elf_security_features(elf: &Elf) -> ElfSecurityFeatures {
    let mut dynamic_flags: u64 = 0;
    let mut dynamic_flags_1: u64 = 0;
    let mut bind_now = false;
    if let Some(dynamic) = &elf.dynamic {
        for dyn_entry in &dynamic.dyns {
            match dyn_entry.d_tag {
                DT_FLAGS => dynamic_flags = dyn_entry.d_val,
                DT_FLAGS_1 => dynamic_flags_1 = dyn_entry.d_val,
                DT_BIND_NOW => bind_now = true,
                _ => {}
            }
        }
    }

    let mut gnu_stack_executable = true;
    let mut has_relro_segment = false;
    for header in &elf.program_headers {
        match header.p_type {
            PT_GNU_STACK => gnu_stack_executable = header.p_flags & PF_X != 0,
            PT_GNU_RELRO => has_relro_segment = true,
            _ => {}
        }
    }

    let relocation_read_only = if !has_relro_segment {
        RelocationReadOnly::None
    } else if bind_now || dynamic_flags & DF_BIND_NOW != 0 || dynamic_flags_1 & DF_1_NOW != 0 {
        RelocationReadOnly::Full
    } else {
        RelocationReadOnly::Partial
    };

    let symbol_names: Vec<&str> = elf
        .dynsyms
        .iter()
        .filter_map(|sym| elf.dynstrtab.get_at(sym.st_name))
        .chain(
            elf.syms
                .iter()
                .filter_map(|sym| elf.strtab.get_at(sym.st_name)),
        )
        .collect();

    // feature probes are undetectable without any symbol information
    let probe = |check: fn(&str) -> bool| -> Option<bool> {
        if symbol_names.is_empty() {
            None
        } else {
            Some(symbol_names.iter().any(|name| check(name)))
        }
    };

    let is_dyn = elf.header.e_type == goblin::elf::header::ET_DYN;
    let pie = is_dyn && dynamic_flags_1 & DF_1_PIE != 0;

    ElfSecurityFeatures {
        symbol_table_stripped: elf.syms.is_empty(),
        stack_canary: probe(|name| name == "__stack_chk_fail" || name == "__stack_chk_guard"),
        no_executable: !gnu_stack_executable,
        relocation_read_only,
        position_independent_executable: pie,
        dynamic_shared_object: is_dyn && !pie,
        llvm_safe_stack: probe(|name| name == "__safestack_init"),
        llvm_control_flow_integrity: probe(|name| name.ends_with(".cfi")),
        clang_fortify_source: probe(|name| name.starts_with("__") && name.ends_with("_chk")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(head: &[u8]) -> Vec<u8> {
        let mut out = head.to_vec();
        out.resize(64, 0);
        out
    }

    #[test]
    fn test_identify_pe() {
        assert_eq!(
            identify_format(&padded(b"MZ\x90\x00")),
            Some(ExecutableFormat::Pe)
        );
    }

    #[test]
    fn test_identify_macho_family() {
        assert_eq!(
            identify_format(&padded(&[0xFE, 0xED, 0xFA, 0xCE])),
            Some(ExecutableFormat::MachO)
        );
        assert_eq!(
            identify_format(&padded(&[0xCF, 0xFA, 0xED, 0xFE])),
            Some(ExecutableFormat::MachO)
        );
    }

    #[test]
    fn test_cafebabe_fat_vs_java_class() {
        let mut fat = padded(&[0xCA, 0xFE, 0xBA, 0xBE]);
        fat[7] = 3;
        assert_eq!(identify_format(&fat), Some(ExecutableFormat::MachO));

        let mut class = padded(&[0xCA, 0xFE, 0xBA, 0xBE]);
        class[7] = 52;
        assert_eq!(identify_format(&class), None);
    }

    #[test]
    fn test_identify_elf() {
        assert_eq!(
            identify_format(&padded(b"\x7fELF\x02\x01\x01")),
            Some(ExecutableFormat::Elf)
        );
    }

    #[test]
    fn test_unknown_format() {
        assert_eq!(identify_format(&padded(b"#!able")), None);
        assert_eq!(identify_format(b"\x7fE"), None);
    }

    #[test]
    fn test_pe_analysis_has_no_feature_set() {
        let exe = analyze("/app.exe", &padded(b"MZ\x90\x00")).unwrap();
        assert_eq!(exe.format, ExecutableFormat::Pe);
        assert!(exe.security_features.is_none());
    }

    #[test]
    fn test_malformed_elf_still_reports_format() {
        // valid magic, garbage body
        let exe = analyze("/bin/bad", &padded(b"\x7fELF\xff\xff\xff")).unwrap();
        assert_eq!(exe.format, ExecutableFormat::Elf);
        assert!(exe.security_features.is_none());
    }
}
