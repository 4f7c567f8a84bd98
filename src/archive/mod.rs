// src/archive/mod.rs

//! Archive reading utilities

pub mod zip;

pub use zip::{find_archive_start_offset, ZipArchive, ZipEntry};
