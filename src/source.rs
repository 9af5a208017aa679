//! Byte sources behind an opened database
//!
//! Three backends serve the same positional reads:
//!
//! - **Buffered**: every query opens its own file handle and reads with
//!   seek + read. Nothing is shared between concurrent queries.
//! - **Memory-mapped**: the IPv4 table, IPv6 table and string heap are each
//!   mapped read-only at load time; reads are slices into those maps.
//! - **Memory**: the whole file is held as shared bytes (see
//!   [`ProxyDatabase::from_bytes`](crate::ProxyDatabase::from_bytes)).
//!
//! All reads use absolute 0-based file offsets, so query code is identical
//! across backends.
//!
//! # Safety
//!
//! Mapped regions are read-only. The file must not be truncated or rewritten
//! while it is open in memory-mapped mode.

use crate::error::{ProxyError, Result};
use crate::header::DatabaseInfo;
use memmap2::{Mmap, MmapOptions};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// How an opened database reads its file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IoMode {
    /// Positional reads through a per-query file handle
    #[default]
    Buffered,
    /// Read-only memory maps of the row tables and string heap
    MemoryMapped,
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoMode::Buffered => write!(f, "buffered"),
            IoMode::MemoryMapped => write!(f, "mmap"),
        }
    }
}

impl FromStr for IoMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buffered" | "file" => Ok(IoMode::Buffered),
            "mmap" | "memory-mapped" => Ok(IoMode::MemoryMapped),
            other => Err(format!("unknown I/O mode '{}' (expected buffered or mmap)", other)),
        }
    }
}

/// Positional reads at absolute file offsets
pub(crate) trait RowReader {
    /// Fill `buf` from `offset`. Short data is an `UnexpectedEof` error.
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn read_u8(&mut self, offset: u64) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.read_bytes(offset, &mut byte)?;
        Ok(byte[0])
    }
}

/// Where a database was loaded from, kept so a closed handle can reload
#[derive(Clone)]
pub(crate) enum Origin {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Origin::Bytes(data) => f.debug_struct("Bytes").field("len", &data.len()).finish(),
        }
    }
}

/// Open a database file, mapping failure to [`ProxyError::MissingFile`].
pub(crate) fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ProxyError::MissingFile {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) struct FileReader {
    file: File,
}

impl FileReader {
    pub(crate) fn new(file: File) -> Self {
        FileReader { file }
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }
}

impl RowReader for FileReader {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }
}

pub(crate) struct SliceReader<'a> {
    data: &'a [u8],
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        SliceReader { data }
    }
}

impl RowReader for SliceReader<'_> {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let src = usize::try_from(offset)
            .ok()
            .and_then(|start| self.data.get(start..start.checked_add(buf.len())?))
            .ok_or_else(|| out_of_range(offset, buf.len()))?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

fn out_of_range(offset: u64, len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at offset {} is past the end of the database", len, offset),
    )
}

/// A mapped slice of the file and where it starts
struct MappedRegion {
    offset: u64,
    map: Mmap,
}

/// Read-only maps of the IPv4 table, IPv6 table and string heap
pub(crate) struct MappedRegions {
    regions: Vec<MappedRegion>,
}

impl MappedRegions {
    /// Map the regions described by `info`. Zero-length regions are skipped.
    pub(crate) fn map(file: &File, info: &DatabaseInfo) -> Result<Self> {
        let file_len = file.metadata()?.len();

        let heap_start = info.heap_offset();
        if heap_start > file_len {
            return Err(ProxyError::InvalidHeader(format!(
                "row tables end at {} but the file is {} bytes",
                heap_start, file_len
            )));
        }

        let spans = [
            (info.ipv4.offset(), info.ipv4.len_bytes()),
            (info.ipv6.offset(), info.ipv6.len_bytes()),
            (heap_start, file_len - heap_start),
        ];

        let mut regions = Vec::with_capacity(spans.len());
        for (offset, len) in spans {
            if len == 0 {
                continue;
            }
            let len = usize::try_from(len)
                .map_err(|_| ProxyError::InvalidHeader(format!("region of {} bytes cannot be mapped", len)))?;
            // SAFETY: read-only map of a file we keep open for the map's lifetime
            let map = unsafe { MmapOptions::new().offset(offset).len(len).map(file) }.map_err(ProxyError::Mmap)?;
            regions.push(MappedRegion { offset, map });
        }

        tracing::debug!(regions = regions.len(), file_len, "mapped database regions");
        Ok(MappedRegions { regions })
    }

    fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        self.regions.iter().find_map(|region| {
            let start = usize::try_from(offset.checked_sub(region.offset)?).ok()?;
            region.map.get(start..start.checked_add(len)?)
        })
    }

    /// Total mapped bytes
    pub(crate) fn mapped_len(&self) -> usize {
        self.regions.iter().map(|r| r.map.len()).sum()
    }
}

pub(crate) struct MappedView<'a> {
    regions: &'a MappedRegions,
}

impl RowReader for MappedView<'_> {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let src = self
            .regions
            .slice(offset, buf.len())
            .ok_or_else(|| out_of_range(offset, buf.len()))?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Storage of a loaded database
pub(crate) enum Backend {
    Buffered(PathBuf),
    Mapped(MappedRegions),
    Memory(Arc<[u8]>),
}

impl Backend {
    /// A reader private to one query
    pub(crate) fn reader(&self) -> Result<Reader<'_>> {
        Ok(match self {
            Backend::Buffered(path) => Reader::File(FileReader::new(open_file(path)?)),
            Backend::Mapped(regions) => Reader::Mapped(MappedView { regions }),
            Backend::Memory(data) => Reader::Memory(SliceReader::new(data)),
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Backend::Buffered(_) => "buffered",
            Backend::Mapped(_) => "mmap",
            Backend::Memory(_) => "memory",
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Buffered(path) => f.debug_tuple("Buffered").field(path).finish(),
            Backend::Mapped(regions) => f.debug_struct("Mapped").field("bytes", &regions.mapped_len()).finish(),
            Backend::Memory(data) => f.debug_struct("Memory").field("bytes", &data.len()).finish(),
        }
    }
}

pub(crate) enum Reader<'a> {
    File(FileReader),
    Mapped(MappedView<'a>),
    Memory(SliceReader<'a>),
}

impl RowReader for Reader<'_> {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        match self {
            Reader::File(r) => r.read_bytes(offset, buf),
            Reader::Mapped(r) => r.read_bytes(offset, buf),
            Reader::Memory(r) => r.read_bytes(offset, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slice_reader_bounds() {
        let data = [1u8, 2, 3, 4];
        let mut reader = SliceReader::new(&data);
        let mut buf = [0u8; 2];
        reader.read_bytes(2, &mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
        assert_eq!(reader.read_u8(0).unwrap(), 1);

        let err = reader.read_bytes(3, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(reader.read_u8(u64::MAX).is_err());
    }

    #[test]
    fn test_file_reader_positional() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abcdefgh").unwrap();
        let mut reader = FileReader::new(File::open(tmp.path()).unwrap());
        let mut buf = [0u8; 3];
        reader.read_bytes(5, &mut buf).unwrap();
        assert_eq!(&buf, b"fgh");
        reader.read_bytes(0, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        assert!(reader.read_bytes(7, &mut buf).is_err());
    }

    #[test]
    fn test_open_file_missing() {
        let err = open_file(Path::new("/nonexistent/ip2proxy/PX1.BIN")).unwrap_err();
        assert!(err.is_missing_file());
    }

    #[test]
    fn test_io_mode_parse() {
        assert_eq!("mmap".parse::<IoMode>().unwrap(), IoMode::MemoryMapped);
        assert_eq!("Buffered".parse::<IoMode>().unwrap(), IoMode::Buffered);
        assert!("shared".parse::<IoMode>().is_err());
        assert_eq!(IoMode::default(), IoMode::Buffered);
    }
}
