//! Reading and writing of compressed archives and data streams.
//!
//! The read side understands tarballs and standalone streams compressed with
//! gzip, xz, zstd or bzip2 (plain input passes through). Decompression is
//! selected by sniffing magic bytes, so misnamed index files still work.
//! The write side produces gzip/xz/zstd output, always writing to a
//! `<target>.new` file that is renamed into place on a successful close.

use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::warn;

/// Maximum number of in-archive link hops `read_data` will follow before
/// declaring a cycle.
const MAX_LINK_DEPTH: u32 = 8;

/// Errors produced by archive operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The requested member does not exist in the archive.
    #[error("file '{0}' was not found in the archive")]
    NotFound(String),
    /// The requested member is a directory and cannot be extracted as data.
    #[error("path '{0}' is a directory and can not be extracted")]
    IsDirectory(String),
    /// A symlink chain did not terminate within [`MAX_LINK_DEPTH`] hops.
    #[error("too many levels of links while resolving '{0}' in the archive")]
    LinkLoop(String),
    /// The archive or one of its members could not be read.
    #[error("archive read error: {0}")]
    Io(#[from] io::Error),
    /// Anything else that went wrong while handling the archive.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias for archive results.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Compression formats supported by the write side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveType {
    /// gzip (`.gz`)
    Gzip,
    /// xz / LZMA2 (`.xz`)
    Xz,
    /// zstandard (`.zst`)
    Zstd,
}

impl ArchiveType {
    /// Conventional file extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Xz => "xz",
            Self::Zstd => "zst",
        }
    }
}

/// Normalize an archive member path to an absolute form with `.`/`..`
/// segments resolved. All member lookups go through this, so `./usr/bin/foo`
/// and `/usr/bin/foo` refer to the same entry.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let mut out = String::with_capacity(path.len() + 1);
    for p in &parts {
        out.push('/');
        out.push_str(p);
    }
    if out.is_empty() { "/".to_string() } else { out }
}

/// Wrap a reader in the right decompressor based on leading magic bytes.
///
/// Unknown data is passed through unchanged, which covers plain-text index
/// files that are served uncompressed.
fn decompress_stream<'a, R: Read + 'a>(mut reader: R) -> io::Result<Box<dyn Read + 'a>> {
    let mut magic = [0u8; 6];
    let mut have = 0;
    while have < magic.len() {
        match reader.read(&mut magic[have..])? {
            0 => break,
            n => have += n,
        }
    }
    let head = Cursor::new(magic[..have].to_vec());
    let chained = head.chain(reader);

    Ok(match &magic[..have] {
        [0x1f, 0x8b, ..] => Box::new(flate2::read::MultiGzDecoder::new(chained)),
        [0xfd, b'7', b'z', b'X', b'Z', 0x00] => Box::new(xz2::read::XzDecoder::new(chained)),
        [0x28, 0xb5, 0x2f, 0xfd, ..] => Box::new(zstd::stream::read::Decoder::new(chained)?),
        [b'B', b'Z', b'h', ..] => Box::new(bzip2::read::BzDecoder::new(chained)),
        _ => Box::new(chained),
    })
}

/// What: Decompress a standalone compressed file into memory.
///
/// Inputs:
/// - `fname`: Path to a gz/xz/zstd/bz2 (or plain) file
///
/// Output:
/// - The decompressed bytes
///
/// Details:
/// - This is for single-stream files like `Packages.xz`, not for tarballs.
pub fn decompress_file(fname: &Path) -> Result<Vec<u8>> {
    let file = File::open(fname).map_err(|e| {
        ArchiveError::Other(format!("unable to open compressed file '{}': {e}", fname.display()))
    })?;
    let mut reader = decompress_stream(BufReader::new(file))?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}

/// Decompress an in-memory compressed buffer. Plain data is returned as-is.
pub fn decompress_data(data: &[u8]) -> Result<Vec<u8>> {
    let mut reader = decompress_stream(Cursor::new(data))?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// The payload of a single archive entry.
#[derive(Clone, Debug)]
pub enum EntryData {
    /// A regular file with its contents.
    Regular(Vec<u8>),
    /// A symbolic or hard link carrying its target path.
    Link(String),
    /// Any other member kind (device, fifo, socket); skipped by consumers.
    Other,
}

/// A single member streamed out of a tarball.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    /// Normalized absolute member path (always starts with `/`).
    pub fname: String,
    /// The member payload.
    pub data: EntryData,
}

/// A tarball opened for sequential reading. The underlying file handle is
/// owned by this reader and released on drop.
pub struct ArchiveReader {
    archive: tar::Archive<Box<dyn Read>>,
}

impl ArchiveReader {
    /// Iterate over all non-directory members of the archive in order.
    pub fn entries(&mut self) -> Result<impl Iterator<Item = Result<ArchiveEntry>> + '_> {
        let entries = self.archive.entries()?;
        Ok(entries.filter_map(|res| match res {
            Err(e) => Some(Err(ArchiveError::Io(e))),
            Ok(mut entry) => {
                let path = match entry.path() {
                    Ok(p) => p.to_string_lossy().into_owned(),
                    Err(e) => return Some(Err(ArchiveError::Io(e))),
                };
                if path.ends_with('/') || entry.header().entry_type().is_dir() {
                    return None;
                }
                let fname = normalize_path(&path);
                let etype = entry.header().entry_type();

                let data = if etype.is_symlink() || etype.is_hard_link() {
                    match entry.link_name() {
                        Ok(Some(target)) => EntryData::Link(target.to_string_lossy().into_owned()),
                        _ => {
                            return Some(Err(ArchiveError::Other(format!(
                                "unable to read destination of link for '{fname}'"
                            ))));
                        }
                    }
                } else if etype.is_file() {
                    let mut buf = Vec::with_capacity(entry.size() as usize);
                    if let Err(e) = entry.read_to_end(&mut buf) {
                        return Some(Err(ArchiveError::Io(e)));
                    }
                    EntryData::Regular(buf)
                } else {
                    EntryData::Other
                };

                Some(Ok(ArchiveEntry { fname, data }))
            }
        }))
    }
}

/// Lazily-opened reader for compressed tarballs.
///
/// `open` records the path only; every read operation opens a fresh handle,
/// scans from the start and closes again, so one decompressor can serve
/// many lookups without holding file descriptors between them.
#[derive(Clone, Debug, Default)]
pub struct ArchiveDecompressor {
    archive_fname: Option<PathBuf>,
}

impl ArchiveDecompressor {
    /// Create a reader with no archive attached yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an archive path. No I/O happens until the first read.
    pub fn open(&mut self, fname: &Path) {
        self.archive_fname = Some(fname.to_path_buf());
    }

    /// Whether an archive path is currently attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.archive_fname.is_some()
    }

    /// Detach from the archive.
    pub fn close(&mut self) {
        self.archive_fname = None;
    }

    fn open_archive(&self) -> Result<tar::Archive<Box<dyn Read>>> {
        let fname = self
            .archive_fname
            .as_ref()
            .ok_or_else(|| ArchiveError::Other("no archive was opened".to_string()))?;
        let file = File::open(fname).map_err(|e| {
            ArchiveError::Other(format!("unable to open archive '{}': {e}", fname.display()))
        })?;
        let stream = decompress_stream(BufReader::new(file))?;
        Ok(tar::Archive::new(stream))
    }

    /// Open the tarball for sequential entry iteration.
    pub fn read(&self) -> Result<ArchiveReader> {
        Ok(ArchiveReader {
            archive: self.open_archive()?,
        })
    }

    /// What: List all non-directory member paths of the archive.
    ///
    /// Inputs: none beyond the attached archive.
    ///
    /// Output:
    /// - Normalized absolute paths, in archive order
    pub fn read_contents(&self) -> Result<Vec<String>> {
        let mut archive = self.open_archive()?;
        let mut contents = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let path = entry.path()?.to_string_lossy().into_owned();
            if path.ends_with('/') {
                continue;
            }
            contents.push(normalize_path(&path));
        }
        Ok(contents)
    }

    /// What: Extract a single member by name.
    ///
    /// Inputs:
    /// - `fname`: Member path; leading `/` optional
    ///
    /// Output:
    /// - The member bytes, or a typed error ([`ArchiveError::NotFound`],
    ///   [`ArchiveError::IsDirectory`])
    ///
    /// Details:
    /// - Symbolic and hard links are chased inside the archive, relative
    ///   targets resolve against the link's parent directory. Chains longer
    ///   than [`MAX_LINK_DEPTH`] produce [`ArchiveError::LinkLoop`].
    pub fn read_data(&self, fname: &str) -> Result<Vec<u8>> {
        self.read_data_depth(fname, 0)
    }

    fn read_data_depth(&self, fname: &str, depth: u32) -> Result<Vec<u8>> {
        if depth > MAX_LINK_DEPTH {
            return Err(ArchiveError::LinkLoop(fname.to_string()));
        }

        let wanted = normalize_path(fname);
        let mut archive = self.open_archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            if normalize_path(&path) != wanted {
                continue;
            }

            let etype = entry.header().entry_type();
            if etype.is_dir() || path.ends_with('/') {
                return Err(ArchiveError::IsDirectory(fname.to_string()));
            }

            if etype.is_symlink() || etype.is_hard_link() {
                let Some(target) = entry.link_name()? else {
                    return Err(ArchiveError::Other(format!(
                        "unable to read destination of link for '{fname}'"
                    )));
                };
                let target = target.to_string_lossy().into_owned();
                let resolved = if target.starts_with('/') {
                    target
                } else if etype.is_hard_link() {
                    // hard link targets are archive-relative
                    normalize_path(&target)
                } else {
                    let parent = match wanted.rfind('/') {
                        Some(idx) => &wanted[..idx],
                        None => "",
                    };
                    normalize_path(&format!("{parent}/{target}"))
                };
                return self.read_data_depth(&resolved, depth + 1);
            }

            if !etype.is_file() {
                // special files shouldn't be present in packages at all
                warn!(member = %fname, "tried to extract non-regular file from archive");
                return Ok(Vec::new());
            }

            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            return Ok(buf);
        }

        Err(ArchiveError::NotFound(fname.to_string()))
    }

    /// What: Materialize regular files and directories below `dest`.
    ///
    /// Inputs:
    /// - `dest`: Existing destination directory
    ///
    /// Output:
    /// - `Ok(())` after all regular members were written
    ///
    /// Details:
    /// - Non-regular entries (devices, fifos, sockets, links) are skipped
    ///   silently. Members that would escape `dest` are rejected.
    pub fn extract_archive(&self, dest: &Path) -> Result<()> {
        if !dest.is_dir() {
            return Err(ArchiveError::Other(format!(
                "destination is not a directory: {}",
                dest.display()
            )));
        }

        let mut archive = self.open_archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let rel = normalize_path(&path);
            let target = dest.join(rel.trim_start_matches('/'));

            let etype = entry.header().entry_type();
            if etype.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if !etype.is_file() {
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut f = File::create(&target)?;
            io::copy(&mut entry, &mut f)?;
        }
        Ok(())
    }

    /// What: Extract members whose path matches a regex.
    ///
    /// Inputs:
    /// - `re`: Pattern searched against the raw member path
    /// - `destdir`: Existing directory receiving the files
    ///
    /// Output:
    /// - Paths of all written files, leaf names only below `destdir`
    pub fn extract_files_by_regex(&self, re: &Regex, destdir: &Path) -> Result<Vec<PathBuf>> {
        let mut matches = Vec::new();
        let mut archive = self.open_archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            if !re.is_match(&path) {
                continue;
            }
            let leaf = crate::utils::path_basename(&path).to_string();
            let fdest = destdir.join(leaf);
            let mut f = File::create(&fdest)?;
            io::copy(&mut entry, &mut f)?;
            matches.push(fdest);
        }
        Ok(matches)
    }
}

/// What: Save a buffer as a standalone compressed file.
///
/// Inputs:
/// - `data`: Raw bytes to compress
/// - `fname`: Final file name
/// - `atype`: Compression format
///
/// Output:
/// - `Ok(())` once the file is in place
///
/// Details:
/// - Data is written to `<fname>.new` and renamed over the target only
///   after a successful flush, so readers never observe partial output.
/// - The gzip stream carries no timestamp, keeping output reproducible.
pub fn compress_and_save(data: &[u8], fname: &Path, atype: ArchiveType) -> Result<()> {
    let tmp_fname = fname.with_extension(match fname.extension() {
        Some(ext) => format!("{}.new", ext.to_string_lossy()),
        None => "new".to_string(),
    });
    if let Some(parent) = fname.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(&tmp_fname)?;
    match atype {
        ArchiveType::Gzip => {
            // flate2 writes mtime 0 unless told otherwise
            let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            enc.write_all(data)?;
            enc.finish()?;
        }
        ArchiveType::Xz => {
            let mut enc = xz2::write::XzEncoder::new(file, 6);
            enc.write_all(data)?;
            enc.finish()?;
        }
        ArchiveType::Zstd => {
            let mut enc = zstd::stream::write::Encoder::new(file, 0)?;
            enc.write_all(data)?;
            enc.finish()?;
        }
    }

    if fname.exists() {
        fs::remove_file(fname)?;
    }
    fs::rename(&tmp_fname, fname)?;
    Ok(())
}

enum CompressorSink {
    Gzip(tar::Builder<flate2::write::GzEncoder<File>>),
    Xz(tar::Builder<xz2::write::XzEncoder<File>>),
    Zstd(tar::Builder<zstd::stream::write::Encoder<'static, File>>),
}

/// Writer for compressed tarballs (icon tarballs and similar artifacts).
///
/// Files are staged into `<target>.new`; `close` finalizes the stream and
/// renames it into place. Member timestamps are zeroed for reproducible
/// output.
pub struct ArchiveCompressor {
    atype: ArchiveType,
    target: Option<PathBuf>,
    sink: Option<CompressorSink>,
}

impl ArchiveCompressor {
    /// Create a compressor producing the given format.
    #[must_use]
    pub fn new(atype: ArchiveType) -> Self {
        Self {
            atype,
            target: None,
            sink: None,
        }
    }

    /// Open the target file for writing (staged as `<fname>.new`).
    pub fn open(&mut self, fname: &Path) -> Result<()> {
        if let Some(parent) = fname.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = PathBuf::from(format!("{}.new", fname.display()));
        let file = File::create(&tmp)?;
        self.sink = Some(match self.atype {
            ArchiveType::Gzip => CompressorSink::Gzip(tar::Builder::new(
                flate2::write::GzEncoder::new(file, flate2::Compression::default()),
            )),
            ArchiveType::Xz => {
                CompressorSink::Xz(tar::Builder::new(xz2::write::XzEncoder::new(file, 6)))
            }
            ArchiveType::Zstd => CompressorSink::Zstd(tar::Builder::new(
                zstd::stream::write::Encoder::new(file, 0)?,
            )),
        });
        self.target = Some(fname.to_path_buf());
        Ok(())
    }

    /// Whether a target is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// What: Append a file from disk to the archive.
    ///
    /// Inputs:
    /// - `fname`: Source file on disk
    /// - `dest`: Member name inside the archive; the source leaf name when `None`
    ///
    /// Details:
    /// - Member mtime is set to 0 and permissions to 0755.
    pub fn add_file(&mut self, fname: &Path, dest: Option<&str>) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| ArchiveError::Other("archive compressor is not open".to_string()))?;

        let data = fs::read(fname)?;
        let dest_name = match dest {
            Some(d) => d.to_string(),
            None => fname
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_mtime(0);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        match sink {
            CompressorSink::Gzip(b) => b.append_data(&mut header, &dest_name, data.as_slice())?,
            CompressorSink::Xz(b) => b.append_data(&mut header, &dest_name, data.as_slice())?,
            CompressorSink::Zstd(b) => b.append_data(&mut header, &dest_name, data.as_slice())?,
        }
        Ok(())
    }

    /// Finalize the stream and rename `<target>.new` over the target.
    pub fn close(&mut self) -> Result<()> {
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };
        match sink {
            CompressorSink::Gzip(b) => {
                b.into_inner()?.finish()?;
            }
            CompressorSink::Xz(b) => {
                b.into_inner()?.finish()?;
            }
            CompressorSink::Zstd(b) => {
                b.into_inner()?.finish()?;
            }
        }
        if let Some(target) = self.target.take() {
            let tmp = PathBuf::from(format!("{}.new", target.display()));
            if target.exists() {
                fs::remove_file(&target)?;
            }
            fs::rename(&tmp, &target)?;
        }
        Ok(())
    }
}

impl Drop for ArchiveCompressor {
    fn drop(&mut self) {
        // a compressor dropped without close() leaves only the .new file
        if self.sink.is_some() {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path("./usr/bin/foo"), "/usr/bin/foo");
        assert_eq!(normalize_path("usr/bin/foo"), "/usr/bin/foo");
        assert_eq!(normalize_path("/usr//bin/../lib/x"), "/usr/lib/x");
        assert_eq!(normalize_path("."), "/");
    }

    #[test]
    fn decompress_data_roundtrip_gzip() {
        let mut enc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"hello world\n").expect("write");
        let compressed = enc.finish().expect("finish");

        let plain = decompress_data(&compressed).expect("decompress");
        assert_eq!(plain, b"hello world\n");
    }

    #[test]
    fn decompress_data_passes_plain_through() {
        let plain = decompress_data(b"not compressed").expect("plain data");
        assert_eq!(plain, b"not compressed");
    }

    #[test]
    fn decompress_data_roundtrip_zstd() {
        let compressed = zstd::stream::encode_all(Cursor::new(b"zstd payload"), 0).expect("encode");
        let plain = decompress_data(&compressed).expect("decompress");
        assert_eq!(plain, b"zstd payload");
    }
}
