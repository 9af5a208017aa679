//! BIN header and bucket index
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────────────────┐ 0
//! │ Header (64 bytes)            │
//! ├──────────────────────────────┤ ipv4_index_base - 1
//! │ IPv4 index: 65536 × (lo, hi) │
//! │ IPv6 index: 65536 × (lo, hi) │ (only when ipv6_index_base > 0)
//! ├──────────────────────────────┤ ipv4_base - 1
//! │ IPv4 rows                    │
//! ├──────────────────────────────┤ ipv6_base - 1
//! │ IPv6 rows                    │
//! ├──────────────────────────────┤
//! │ String heap                  │
//! └──────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Base addresses in the header are 1-based.
//! Index entries give the first and last row whose range can contain an
//! address with a given top 16 bits.

use crate::address::AddressFamily;
use crate::error::{ProxyError, Result};
use crate::schema::{schema_for, FieldLayout};
use crate::source::RowReader;
use serde::Serialize;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// Size of the fixed header
pub const HEADER_LEN: usize = 64;

/// Buckets per index table (one per value of the top 16 address bits)
pub const INDEX_BUCKETS: usize = 65536;

/// Bytes in one index table
pub const INDEX_TABLE_LEN: usize = INDEX_BUCKETS * std::mem::size_of::<RawIndexEntry>();

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
struct RawHeader {
    db_type: u8,
    column_count: u8,
    year: u8,
    month: u8,
    day: u8,
    ipv4_count: U32,
    ipv4_base: U32,
    ipv6_count: U32,
    ipv6_base: U32,
    ipv4_index_base: U32,
    ipv6_index_base: U32,
    reserved: [u8; 35],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
struct RawIndexEntry {
    low: U32,
    high: U32,
}

/// One row table of a BIN file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Table {
    /// Number of rows, including the terminal row
    pub rows: u32,
    /// 1-based file position of the first row, 0 if absent
    pub base: u32,
    /// Bytes per row
    pub row_width: usize,
}

impl Table {
    /// 0-based file offset of the first row
    pub fn offset(&self) -> u64 {
        u64::from(self.base.saturating_sub(1))
    }

    /// 0-based file offset of a row
    pub fn row_offset(&self, row: u32) -> u64 {
        self.offset() + u64::from(row) * self.row_width as u64
    }

    /// Total size of the table in bytes
    pub fn len_bytes(&self) -> u64 {
        u64::from(self.rows) * self.row_width as u64
    }

    /// 0-based offset one past the last row
    pub fn end(&self) -> u64 {
        self.offset() + self.len_bytes()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Decoded database header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    /// Database type (PX1..PX12)
    pub db_type: u8,
    /// Columns per row, counting `ip_from`
    pub column_count: u8,
    /// Two-digit publication year
    pub year: u8,
    /// Publication month
    pub month: u8,
    /// Publication day
    pub day: u8,
    /// IPv4 row table
    pub ipv4: Table,
    /// IPv6 row table
    pub ipv6: Table,
    /// 1-based file position of the IPv4 index
    pub ipv4_index_base: u32,
    /// 1-based file position of the IPv6 index, 0 if absent
    pub ipv6_index_base: u32,
    /// Column offsets for this database type
    #[serde(skip)]
    pub layout: FieldLayout,
}

impl DatabaseInfo {
    /// Parse and validate the 64-byte header.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnsupportedDatabaseType`] for types outside 1..=12 and
    /// [`ProxyError::InvalidHeader`] when the header fields cannot describe a
    /// readable file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (raw, _) = RawHeader::read_from_prefix(bytes)
            .map_err(|_| ProxyError::InvalidHeader(format!("header shorter than {} bytes", HEADER_LEN)))?;

        let schema = schema_for(raw.db_type).ok_or(ProxyError::UnsupportedDatabaseType(raw.db_type))?;
        if raw.column_count < schema.column_count() {
            return Err(ProxyError::InvalidHeader(format!(
                "PX{} needs {} columns, header declares {}",
                raw.db_type,
                schema.column_count(),
                raw.column_count
            )));
        }

        let cols = usize::from(raw.column_count);
        let ipv4 = Table {
            rows: raw.ipv4_count.get(),
            base: raw.ipv4_base.get(),
            row_width: 4 * cols,
        };
        let ipv6 = Table {
            rows: raw.ipv6_count.get(),
            base: raw.ipv6_base.get(),
            row_width: 16 + 4 * (cols - 1),
        };

        if raw.ipv4_index_base.get() == 0 {
            return Err(ProxyError::InvalidHeader("IPv4 index base is zero".to_string()));
        }
        for (name, table) in [("IPv4", &ipv4), ("IPv6", &ipv6)] {
            if !table.is_empty() && table.base == 0 {
                return Err(ProxyError::InvalidHeader(format!(
                    "{} table has {} rows but no base address",
                    name, table.rows
                )));
            }
        }

        let info = DatabaseInfo {
            db_type: raw.db_type,
            column_count: raw.column_count,
            year: raw.year,
            month: raw.month,
            day: raw.day,
            ipv4,
            ipv6,
            ipv4_index_base: raw.ipv4_index_base.get(),
            ipv6_index_base: raw.ipv6_index_base.get(),
            layout: schema.layout(),
        };

        let room = u64::from(info.ipv4.base).saturating_sub(u64::from(info.ipv4_index_base));
        if !info.ipv4.is_empty() && room < info.index_len() as u64 {
            return Err(ProxyError::InvalidHeader(format!(
                "index block needs {} bytes, only {} before the IPv4 table",
                info.index_len(),
                room
            )));
        }

        Ok(info)
    }

    /// Row table for an address family
    pub fn table(&self, family: AddressFamily) -> &Table {
        match family {
            AddressFamily::V4 => &self.ipv4,
            AddressFamily::V6 => &self.ipv6,
        }
    }

    /// Whether the file has an IPv6 bucket index
    pub fn has_ipv6_index(&self) -> bool {
        self.ipv6_index_base > 0
    }

    /// Bytes occupied by the index block
    pub fn index_len(&self) -> usize {
        if self.has_ipv6_index() {
            2 * INDEX_TABLE_LEN
        } else {
            INDEX_TABLE_LEN
        }
    }

    /// 0-based offset where the string heap begins
    pub fn heap_offset(&self) -> u64 {
        if self.ipv6.is_empty() {
            self.ipv4.end()
        } else {
            self.ipv4.end().max(self.ipv6.end())
        }
    }

    /// Publication date as `20YY.M.D`, empty when the year is zero
    pub fn version_string(&self) -> String {
        if self.year == 0 {
            return String::new();
        }
        format!("20{}.{}.{}", self.year, self.month, self.day)
    }
}

/// Bounds of one index bucket, as row numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    /// First candidate row
    pub low: u32,
    /// Last candidate row
    pub high: u32,
}

impl IndexEntry {
    /// `(0, 0)` entries carry no narrowing information
    pub fn is_unset(&self) -> bool {
        self.low == 0 && self.high == 0
    }
}

/// Bucket index for both families, held in memory for the lifetime of a load
#[derive(Debug, Clone)]
pub struct Index {
    ipv4: Box<[IndexEntry]>,
    ipv6: Option<Box<[IndexEntry]>>,
}

impl Index {
    /// Decode the index block that starts at `ipv4_index_base`.
    pub fn parse(info: &DatabaseInfo, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < info.index_len() {
            return Err(ProxyError::InvalidHeader(format!(
                "index block truncated: {} of {} bytes",
                bytes.len(),
                info.index_len()
            )));
        }

        let ipv4 = decode_entries(&bytes[..INDEX_TABLE_LEN])?;
        let ipv6 = if info.has_ipv6_index() {
            Some(decode_entries(&bytes[INDEX_TABLE_LEN..2 * INDEX_TABLE_LEN])?)
        } else {
            None
        };

        Ok(Index { ipv4, ipv6 })
    }

    /// Bucket bounds, `None` when the family has no index
    pub fn bounds(&self, family: AddressFamily, bucket: usize) -> Option<IndexEntry> {
        let entries = match family {
            AddressFamily::V4 => &self.ipv4,
            AddressFamily::V6 => self.ipv6.as_ref()?,
        };
        entries.get(bucket).copied()
    }
}

fn decode_entries(bytes: &[u8]) -> Result<Box<[IndexEntry]>> {
    let raw = <[RawIndexEntry]>::ref_from_bytes(bytes)
        .map_err(|_| ProxyError::InvalidHeader("index table size is not a whole number of entries".to_string()))?;
    Ok(raw
        .iter()
        .map(|e| IndexEntry {
            low: e.low.get(),
            high: e.high.get(),
        })
        .collect())
}

/// Read the header and index through any row reader.
pub(crate) fn load<R: RowReader>(reader: &mut R) -> Result<(DatabaseInfo, Index)> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_bytes(0, &mut header)?;
    let info = DatabaseInfo::parse(&header)?;

    let mut block = vec![0u8; info.index_len()];
    reader.read_bytes(u64::from(info.ipv4_index_base - 1), &mut block)?;
    let index = Index::parse(&info, &block)?;

    Ok((info, index))
}
