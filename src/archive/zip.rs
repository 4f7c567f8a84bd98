// src/archive/zip.rs

//! ZIP reading with prepended-byte tolerance
//!
//! Some archives carry bytes before the first local header, most commonly
//! self-extracting JARs with a shell prefix. The reader discovers the true
//! archive start by scanning the last 1 KiB, then the last 64 KiB, for the
//! end-of-central-directory signature, then computes
//! `start = eocd_offset - directory_size - directory_offset`. ZIP64
//! archives are handled through the ZIP64 locator and end records.
//!
//! Extraction defends against path traversal: joined paths are cleaned and
//! entries escaping the target root are rejected.

use crate::error::{Error, Result};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

const DIRECTORY_END_SIGNATURE: u32 = 0x0605_4b50;
const DIRECTORY64_LOC_SIGNATURE: u32 = 0x0706_4b50;
const DIRECTORY64_END_SIGNATURE: u32 = 0x0606_4b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

const DIRECTORY_END_LEN: usize = 22;
const DIRECTORY64_LOC_LEN: u64 = 20;
const DIRECTORY64_END_LEN: u64 = 56;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

/// A single entry from the central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub method: u16,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Local header offset, relative to the archive start
    pub header_offset: u64,
}

impl ZipEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// A ZIP archive opened from disk, tolerant of prepended bytes
pub struct ZipArchive {
    path: PathBuf,
    start_offset: u64,
    entries: Vec<ZipEntry>,
}

/// Little-endian field reader over a byte slice
struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        FieldReader { buf }
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.buf[0], self.buf[1]]);
        self.buf = &self.buf[2..];
        v
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        self.buf = &self.buf[4..];
        v
    }

    fn u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[..8]);
        self.buf = &self.buf[8..];
        u64::from_le_bytes(bytes)
    }

    fn skip(&mut self, n: usize) {
        self.buf = &self.buf[n..];
    }
}

/// Locate the byte offset where ZIP data actually begins.
///
/// Scans the last 1 KiB, then the last 64 KiB, for the end-of-central-
/// directory record; the archive start is the directory end position minus
/// the directory size and its recorded offset.
pub fn find_archive_start_offset<R: Read + Seek>(reader: &mut R, size: u64) -> Result<u64> {
    let mut found: Option<(Vec<u8>, u64)> = None;

    for block_len in [1024u64, 65 * 1024] {
        let block_len = block_len.min(size);
        let block_start = size - block_len;
        reader.seek(SeekFrom::Start(block_start))?;
        let mut buf = vec![0u8; block_len as usize];
        reader.read_exact(&mut buf)?;

        if let Some(offset_in_block) = find_signature_in_block(&buf) {
            let record = buf[offset_in_block..].to_vec();
            found = Some((record, block_start + offset_in_block as u64));
            break;
        }
    }

    let (record, directory_end_offset) = found.ok_or_else(|| Error::Archive {
        path: String::new(),
        reason: "end of central directory signature not found".to_string(),
    })?;

    let mut fields = FieldReader::new(&record[4..]);
    fields.skip(6); // disk numbers and per-disk record count
    let directory_records = fields.u16() as u64;
    let mut directory_size = fields.u32() as u64;
    let mut directory_offset = fields.u32() as u64;

    // sentinel values indicate the real numbers live in the ZIP64 records
    if directory_records == 0xFFFF
        || directory_size == 0xFFFF_FFFF
        || directory_offset == 0xFFFF_FFFF
    {
        let locator_offset = directory_end_offset
            .checked_sub(DIRECTORY64_LOC_LEN)
            .ok_or_else(|| invalid("zip64 locator out of bounds"))?;
        reader.seek(SeekFrom::Start(locator_offset))?;
        let mut locator = [0u8; DIRECTORY64_LOC_LEN as usize];
        reader.read_exact(&mut locator)?;
        let mut fields = FieldReader::new(&locator);
        if fields.u32() != DIRECTORY64_LOC_SIGNATURE {
            return Err(invalid("zip64 locator signature mismatch"));
        }

        // with prepended bytes the locator's recorded offset is relative to
        // the (yet unknown) archive start, so read the record adjacent to
        // the locator instead
        let end64_offset = locator_offset
            .checked_sub(DIRECTORY64_END_LEN)
            .ok_or_else(|| invalid("zip64 end record out of bounds"))?;
        reader.seek(SeekFrom::Start(end64_offset))?;
        let mut end64 = [0u8; DIRECTORY64_END_LEN as usize];
        reader.read_exact(&mut end64)?;
        let mut fields = FieldReader::new(&end64);
        if fields.u32() != DIRECTORY64_END_SIGNATURE {
            return Err(invalid("zip64 end of central directory signature mismatch"));
        }
        fields.skip(8 + 2 + 2 + 4 + 4 + 8 + 8); // size, versions, disks, record counts
        directory_size = fields.u64();
        directory_offset = fields.u64();

        return end64_offset
            .checked_sub(directory_size)
            .and_then(|v| v.checked_sub(directory_offset))
            .ok_or_else(|| invalid("zip64 directory extends past start of file"));
    }

    directory_end_offset
        .checked_sub(directory_size)
        .and_then(|v| v.checked_sub(directory_offset))
        .ok_or_else(|| invalid("directory extends past start of file"))
}

fn invalid(reason: &str) -> Error {
    Error::Archive {
        path: String::new(),
        reason: reason.to_string(),
    }
}

/// Scan a block backwards for the directory end signature, validating the
/// trailing comment length against the block end.
fn find_signature_in_block(buf: &[u8]) -> Option<usize> {
    if buf.len() < DIRECTORY_END_LEN {
        return None;
    }
    for i in (0..=buf.len() - DIRECTORY_END_LEN).rev() {
        if u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]])
            == DIRECTORY_END_SIGNATURE
        {
            let comment_len =
                u16::from_le_bytes([buf[i + DIRECTORY_END_LEN - 2], buf[i + DIRECTORY_END_LEN - 1]])
                    as usize;
            if i + DIRECTORY_END_LEN + comment_len <= buf.len() {
                return Some(i);
            }
        }
    }
    None
}

impl ZipArchive {
    /// Open a ZIP file, discovering any prepended-byte offset and indexing
    /// the central directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let size = file.metadata()?.len();

        let start_offset =
            find_archive_start_offset(&mut file, size).map_err(|e| Error::Archive {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let entries = Self::read_central_directory(&mut file, size, start_offset)
            .map_err(|e| Error::Archive {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(ZipArchive {
            path,
            start_offset,
            entries,
        })
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn read_central_directory(
        file: &mut File,
        size: u64,
        start_offset: u64,
    ) -> Result<Vec<ZipEntry>> {
        // re-discover the directory position from the end record
        let mut end_block_len = (65 * 1024u64).min(size);
        let mut buf = vec![0u8; end_block_len as usize];
        file.seek(SeekFrom::Start(size - end_block_len))?;
        file.read_exact(&mut buf)?;
        let sig_at = find_signature_in_block(&buf)
            .ok_or_else(|| invalid("end of central directory signature not found"))?;
        let mut fields = FieldReader::new(&buf[sig_at + 4..]);
        fields.skip(6);
        let mut records = fields.u16() as u64;
        let directory_size = fields.u32() as u64;
        let mut directory_offset = fields.u32() as u64;
        end_block_len -= sig_at as u64;

        if records == 0xFFFF || directory_size == 0xFFFF_FFFF || directory_offset == 0xFFFF_FFFF {
            let eocd_pos = size - end_block_len;
            let end64_offset = eocd_pos
                .checked_sub(DIRECTORY64_LOC_LEN + DIRECTORY64_END_LEN)
                .ok_or_else(|| invalid("zip64 end record out of bounds"))?;
            file.seek(SeekFrom::Start(end64_offset))?;
            let mut end64 = [0u8; DIRECTORY64_END_LEN as usize];
            file.read_exact(&mut end64)?;
            let mut fields = FieldReader::new(&end64);
            if fields.u32() != DIRECTORY64_END_SIGNATURE {
                return Err(invalid("zip64 end of central directory signature mismatch"));
            }
            fields.skip(8 + 2 + 2 + 4 + 4 + 8);
            records = fields.u64();
            fields.skip(8); // directory size
            directory_offset = fields.u64();
        }

        file.seek(SeekFrom::Start(start_offset + directory_offset))?;
        let mut entries = Vec::new();
        let mut header = [0u8; 46];
        for _ in 0..records {
            file.read_exact(&mut header)?;
            let mut fields = FieldReader::new(&header);
            if fields.u32() != CENTRAL_DIRECTORY_SIGNATURE {
                return Err(invalid("central directory entry signature mismatch"));
            }
            fields.skip(2 + 2 + 2); // versions, flags
            let method = fields.u16();
            fields.skip(2 + 2 + 4); // mod time/date, crc32
            let mut compressed_size = fields.u32() as u64;
            let mut uncompressed_size = fields.u32() as u64;
            let name_len = fields.u16() as usize;
            let extra_len = fields.u16() as usize;
            let comment_len = fields.u16() as usize;
            fields.skip(2 + 2 + 4); // disk, internal attrs, external attrs
            let mut header_offset = fields.u32() as u64;

            let mut name = vec![0u8; name_len];
            file.read_exact(&mut name)?;
            let mut extra = vec![0u8; extra_len];
            file.read_exact(&mut extra)?;
            file.seek(SeekFrom::Current(comment_len as i64))?;

            // ZIP64 extended information overrides sentinel fields
            let mut rest = extra.as_slice();
            while rest.len() >= 4 {
                let id = u16::from_le_bytes([rest[0], rest[1]]);
                let data_len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
                if rest.len() < 4 + data_len {
                    break;
                }
                if id == 0x0001 {
                    let mut fields = FieldReader::new(&rest[4..4 + data_len]);
                    if uncompressed_size == 0xFFFF_FFFF && data_len >= 8 {
                        uncompressed_size = fields.u64();
                    }
                    if compressed_size == 0xFFFF_FFFF && data_len >= 16 {
                        compressed_size = fields.u64();
                    }
                    if header_offset == 0xFFFF_FFFF && data_len >= 24 {
                        header_offset = fields.u64();
                    }
                }
                rest = &rest[4 + data_len..];
            }

            entries.push(ZipEntry {
                name: String::from_utf8_lossy(&name).into_owned(),
                method,
                compressed_size,
                uncompressed_size,
                header_offset,
            });
        }

        Ok(entries)
    }

    /// Read and decompress a single entry's contents.
    pub fn read_entry(&self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.start_offset + entry.header_offset))?;

        let mut header = [0u8; 30];
        file.read_exact(&mut header)?;
        let mut fields = FieldReader::new(&header);
        if fields.u32() != LOCAL_HEADER_SIGNATURE {
            return Err(Error::Archive {
                path: self.path.display().to_string(),
                reason: format!("local header signature mismatch for {:?}", entry.name),
            });
        }
        fields.skip(2 + 2 + 2 + 2 + 2 + 4 + 4 + 4);
        let name_len = fields.u16() as u64;
        let extra_len = fields.u16() as u64;
        file.seek(SeekFrom::Current((name_len + extra_len) as i64))?;

        let mut compressed = vec![0u8; entry.compressed_size as usize];
        file.read_exact(&mut compressed)?;

        match entry.method {
            METHOD_STORED => Ok(compressed),
            METHOD_DEFLATED => {
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut out)?;
                Ok(out)
            }
            other => Err(Error::Archive {
                path: self.path.display().to_string(),
                reason: format!("unsupported compression method {} for {:?}", other, entry.name),
            }),
        }
    }

    /// Read an entry's contents by name.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.entry(name).ok_or_else(|| Error::Archive {
            path: self.path.display().to_string(),
            reason: format!("no such entry {:?}", name),
        })?;
        self.read_entry(entry)
    }

    /// Extract all entries beneath `root`, rejecting entries whose cleaned
    /// path would escape it.
    pub fn extract_to(&self, root: &Path) -> Result<()> {
        for entry in &self.entries {
            let target = safe_join(root, &entry.name).ok_or_else(|| Error::Archive {
                path: self.path.display().to_string(),
                reason: format!("entry {:?} escapes the extraction root", entry.name),
            })?;

            if entry.is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = self.read_entry(entry)?;
            File::create(&target)?.write_all(&contents)?;
        }
        Ok(())
    }
}

/// Join an archive entry name onto a root, cleaning the path and refusing
/// any result that does not remain prefixed by the root.
fn safe_join(root: &Path, name: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            // parent traversal and absolute prefixes are rejected outright
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let joined = root.join(clean);
    if joined.starts_with(root) {
        Some(joined)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Hand-built ZIP fixtures for archive tests

    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    pub struct FixtureEntry {
        pub name: &'static str,
        pub data: Vec<u8>,
        pub deflate: bool,
    }

    /// Build a ZIP byte stream with `prepend` junk bytes before the first
    /// local header. Recorded offsets are relative to the archive start,
    /// matching self-extracting archives in the wild.
    pub fn build_zip(entries: &[FixtureEntry], prepend: usize) -> Vec<u8> {
        let mut archive: Vec<u8> = Vec::new();
        let mut central: Vec<u8> = Vec::new();

        for entry in entries {
            let offset = archive.len() as u32;
            let compressed = if entry.deflate {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&entry.data).unwrap();
                encoder.finish().unwrap()
            } else {
                entry.data.clone()
            };
            let method: u16 = if entry.deflate { 8 } else { 0 };

            // local header
            archive.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            archive.extend_from_slice(&20u16.to_le_bytes()); // version needed
            archive.extend_from_slice(&0u16.to_le_bytes()); // flags
            archive.extend_from_slice(&method.to_le_bytes());
            archive.extend_from_slice(&[0; 4]); // mod time/date
            archive.extend_from_slice(&[0; 4]); // crc32 (unchecked by the reader)
            archive.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            archive.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            archive.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            archive.extend_from_slice(&0u16.to_le_bytes()); // extra len
            archive.extend_from_slice(entry.name.as_bytes());
            archive.extend_from_slice(&compressed);

            // central directory entry
            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes()); // version made by
            central.extend_from_slice(&20u16.to_le_bytes()); // version needed
            central.extend_from_slice(&0u16.to_le_bytes()); // flags
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&[0; 4]); // mod time/date
            central.extend_from_slice(&[0; 4]); // crc32
            central.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            central.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // extra len
            central.extend_from_slice(&0u16.to_le_bytes()); // comment len
            central.extend_from_slice(&0u16.to_le_bytes()); // disk
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            central.extend_from_slice(&[0; 4]); // external attrs
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(entry.name.as_bytes());
        }

        let directory_offset = archive.len() as u32;
        let directory_size = central.len() as u32;
        archive.extend_from_slice(&central);

        // end of central directory
        archive.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        archive.extend_from_slice(&0u16.to_le_bytes()); // disk
        archive.extend_from_slice(&0u16.to_le_bytes()); // cd disk
        archive.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        archive.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        archive.extend_from_slice(&directory_size.to_le_bytes());
        archive.extend_from_slice(&directory_offset.to_le_bytes());
        archive.extend_from_slice(&0u16.to_le_bytes()); // comment len

        let mut out = vec![0x23u8; prepend]; // '#' filler, shell-prefix-like
        out.extend_from_slice(&archive);
        out
    }
}
