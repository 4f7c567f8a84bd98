// src/file/mime.rs

//! MIME classification from leading file bytes
//!
//! Classification reads the first 512 bytes and consults a magic-number
//! table. When fewer than 512 bytes are available the result falls back to
//! extension-based classification and executable analysis is disabled for
//! that file (short reads cannot be trusted to carry a full magic region).

/// Number of leading bytes consulted for classification
pub const HEAD_LENGTH: usize = 512;

pub const MIME_ELF_EXECUTABLE: &str = "application/x-executable";
pub const MIME_ELF_SHARED_LIB: &str = "application/x-sharedlib";
pub const MIME_MACH_BINARY: &str = "application/x-mach-binary";
pub const MIME_PE: &str = "application/vnd.microsoft.portable-executable";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// MIME types subject to executable analysis
pub fn executable_mime_types() -> &'static [&'static str] {
    &[
        MIME_ELF_EXECUTABLE,
        MIME_ELF_SHARED_LIB,
        MIME_MACH_BINARY,
        MIME_PE,
    ]
}

/// Classify a file from its leading bytes and path.
pub fn classify(head: &[u8], path: &str) -> String {
    if head.len() < HEAD_LENGTH {
        return classify_by_extension(path, head);
    }
    classify_by_magic(head).unwrap_or_else(|| classify_text(head))
}

fn classify_by_magic(head: &[u8]) -> Option<String> {
    if head.starts_with(b"\x7fELF") {
        // e_type distinguishes executables from shared objects
        let e_type = u16::from_le_bytes([head[16], head[17]]);
        return Some(match e_type {
            3 => MIME_ELF_SHARED_LIB.to_string(),
            _ => MIME_ELF_EXECUTABLE.to_string(),
        });
    }
    if head.starts_with(b"MZ") {
        return Some(MIME_PE.to_string());
    }
    if head.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || head.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || head.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || head.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
    {
        return Some(MIME_MACH_BINARY.to_string());
    }
    if head.starts_with(&[0xCA, 0xFE, 0xBA, 0xBE]) {
        // Java class files share the fat Mach-O magic; byte 7 disambiguates
        // (fat binaries have a small architecture count here)
        return Some(if head[7] < 20 {
            MIME_MACH_BINARY.to_string()
        } else {
            "application/x-java-applet".to_string()
        });
    }
    if head.starts_with(&[0x1F, 0x8B]) {
        return Some("application/gzip".to_string());
    }
    if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        return Some("application/zip".to_string());
    }
    if head.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]) {
        return Some("application/x-xz".to_string());
    }
    if head.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
        return Some("application/zstd".to_string());
    }
    if head.starts_with(b"BZh") {
        return Some("application/x-bzip2".to_string());
    }
    if head.starts_with(&[0xED, 0xAB, 0xEE, 0xDB]) {
        return Some("application/x-rpm".to_string());
    }
    if head.len() > 262 && &head[257..262] == b"ustar" {
        return Some("application/x-tar".to_string());
    }
    if head.starts_with(b"%PDF") {
        return Some("application/pdf".to_string());
    }
    if head.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png".to_string());
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg".to_string());
    }
    if head.starts_with(b"#!") {
        return Some("text/x-shellscript".to_string());
    }
    if head.starts_with(b"<?xml") {
        return Some("text/xml".to_string());
    }
    None
}

fn classify_text(head: &[u8]) -> String {
    let trimmed: &[u8] = {
        let mut slice = head;
        while let Some((first, rest)) = slice.split_first() {
            if first.is_ascii_whitespace() {
                slice = rest;
            } else {
                break;
            }
        }
        slice
    };
    if (trimmed.starts_with(b"{") || trimmed.starts_with(b"[")) && looks_textual(head) {
        return "application/json".to_string();
    }
    if looks_textual(head) {
        return "text/plain".to_string();
    }
    MIME_OCTET_STREAM.to_string()
}

fn looks_textual(head: &[u8]) -> bool {
    if head.is_empty() {
        return false;
    }
    let sample = &head[..head.len().min(HEAD_LENGTH)];
    let suspicious = sample
        .iter()
        .filter(|b| **b == 0 || (**b < 0x09 && **b != 0x07))
        .count();
    suspicious == 0
}

fn classify_by_extension(path: &str, head: &[u8]) -> String {
    let lower = path.to_lowercase();
    let table: &[(&str, &str)] = &[
        (".json", "application/json"),
        (".xml", "text/xml"),
        (".txt", "text/plain"),
        (".md", "text/plain"),
        (".gz", "application/gzip"),
        (".tgz", "application/gzip"),
        (".zip", "application/zip"),
        (".jar", "application/zip"),
        (".war", "application/zip"),
        (".ear", "application/zip"),
        (".tar", "application/x-tar"),
        (".rpm", "application/x-rpm"),
        (".sh", "text/x-shellscript"),
        (".py", "text/x-python"),
        (".pdf", "application/pdf"),
        (".png", "image/png"),
        (".jpg", "image/jpeg"),
        (".jpeg", "image/jpeg"),
    ];
    for (extension, mime) in table {
        if lower.ends_with(extension) {
            return (*mime).to_string();
        }
    }
    if head.is_empty() {
        return "application/x-empty".to_string();
    }
    if looks_textual(head) {
        "text/plain".to_string()
    } else {
        MIME_OCTET_STREAM.to_string()
    }
}
