//! Row search and attribute decoding
//!
//! An [`Engine`] is one successful load of a database: the parsed header,
//! the bucket index held in memory, and the storage backend. It is immutable
//! after load and shared between threads behind an `Arc`; each query gets its
//! own reader from the backend.
//!
//! # Search
//!
//! Rows are sorted by `ip_from` and a row covers `[ip_from, next ip_from)`.
//! The bucket index narrows the candidate rows for the address's top 16 bits,
//! then a binary search reads two consecutive `ip_from` values per probe.
//! The last row has no successor and never matches.

use crate::address::{AddressFamily, NormalizedAddress};
use crate::error::{ProxyError, Result};
use crate::header::{self, DatabaseInfo, Index};
use crate::result::{classify, Attribute, QueryResult, Request};
use crate::schema::Column;
use crate::source::{open_file, Backend, FileReader, IoMode, MappedRegions, Origin, RowReader, SliceReader};
use std::io;
use tracing::{debug, trace};

/// Columns decoded as a single heap string, with the attribute they fill
const TEXT_COLUMNS: [(Column, Attribute); 12] = [
    (Column::ProxyType, Attribute::ProxyType),
    (Column::Region, Attribute::Region),
    (Column::City, Attribute::City),
    (Column::Isp, Attribute::Isp),
    (Column::Domain, Attribute::Domain),
    (Column::UsageType, Attribute::UsageType),
    (Column::Asn, Attribute::Asn),
    (Column::AsName, Attribute::AsName),
    (Column::LastSeen, Attribute::LastSeen),
    (Column::Threat, Attribute::Threat),
    (Column::Provider, Attribute::Provider),
    (Column::FraudScore, Attribute::FraudScore),
];

/// Country name entry follows the 3-byte country code slot
const COUNTRY_LONG_SKIP: u64 = 3;

pub(crate) struct Engine {
    info: DatabaseInfo,
    index: Index,
    backend: Backend,
}

impl Engine {
    /// Load header and index, then set up the backend for `mode`.
    ///
    /// Byte origins always use the in-memory backend.
    pub(crate) fn load(origin: &Origin, mode: IoMode) -> Result<Self> {
        let engine = match origin {
            Origin::Path(path) => {
                let mut reader = FileReader::new(open_file(path)?);
                let (info, index) = header::load(&mut reader)?;
                let backend = match mode {
                    IoMode::Buffered => Backend::Buffered(path.clone()),
                    IoMode::MemoryMapped => Backend::Mapped(MappedRegions::map(reader.file(), &info)?),
                };
                Engine { info, index, backend }
            }
            Origin::Bytes(data) => {
                let (info, index) = header::load(&mut SliceReader::new(data))?;
                Engine {
                    info,
                    index,
                    backend: Backend::Memory(data.clone()),
                }
            }
        };

        debug!(
            db_type = engine.info.db_type,
            ipv4_rows = engine.info.ipv4.rows,
            ipv6_rows = engine.info.ipv6.rows,
            backend = engine.backend.name(),
            version = %engine.info.version_string(),
            "loaded database"
        );
        Ok(engine)
    }

    pub(crate) fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    /// Look up a normalized address.
    pub(crate) fn query(&self, addr: NormalizedAddress, request: Request) -> Result<QueryResult> {
        let table = self.info.table(addr.family);
        if addr.family == AddressFamily::V6 && table.is_empty() {
            return Ok(QueryResult::ipv6_unsupported());
        }

        let mut reader = self.backend.reader()?;
        match self.find_row(&mut reader, addr)? {
            Some(row) => self.decode(&mut reader, addr.family, row, request),
            None => {
                trace!(family = %addr.family, value = %addr.value, "no row covers address");
                Ok(QueryResult::invalid_address())
            }
        }
    }

    /// Binary search for the row covering `addr`, returning its file offset.
    fn find_row<R: RowReader>(&self, reader: &mut R, addr: NormalizedAddress) -> Result<Option<u64>> {
        let family = addr.family;
        let table = self.info.table(family);
        let Some(last_row) = table.rows.checked_sub(1) else {
            return Ok(None);
        };

        let (mut low, mut high) = match self.index.bounds(family, family.bucket(addr.value)) {
            Some(entry) if !entry.is_unset() => (entry.low, entry.high.min(last_row)),
            _ => (0, last_row),
        };

        // The top address sits on the terminal row's ip_from
        let mut ip = addr.value;
        if ip == family.max_value() {
            ip -= 1;
        }

        let mut probes = 0u32;
        while low <= high {
            let mid = low + (high - low) / 2;
            probes += 1;

            let row = table.row_offset(mid);
            let ip_from = read_address(reader, family, row)?;
            let ip_to = if mid >= last_row {
                0
            } else {
                read_address(reader, family, row + table.row_width as u64)?
            };

            if ip_from <= ip && ip < ip_to {
                trace!(row = mid, probes, "matched row");
                return Ok(Some(row));
            }

            if ip < ip_from {
                match mid.checked_sub(1) {
                    Some(h) => high = h,
                    None => break,
                }
            } else {
                low = mid + 1;
            }
        }

        Ok(None)
    }

    fn decode<R: RowReader>(
        &self,
        reader: &mut R,
        family: AddressFamily,
        row: u64,
        request: Request,
    ) -> Result<QueryResult> {
        let table = self.info.table(family);
        let width = family.address_width();
        let mut data = vec![0u8; table.row_width - width];
        reader.read_bytes(row + width as u64, &mut data)?;

        let layout = &self.info.layout;
        let pointer = |column: Column| -> Result<Option<u64>> {
            let Some(offset) = layout.offset(column) else {
                return Ok(None);
            };
            let bytes = data
                .get(offset..offset + 4)
                .ok_or_else(|| ProxyError::InvalidHeader(format!("{:?} column lies outside the row", column)))?;
            Ok(Some(u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))))
        };

        let mut result = QueryResult::unresolved();

        if request.wants(Attribute::CountryShort) || request.wants(Attribute::CountryLong) {
            if let Some(country) = pointer(Column::Country)? {
                if request.wants(Attribute::CountryShort) {
                    result.country_short = read_string(reader, country)?;
                }
                if request.wants(Attribute::CountryLong) {
                    result.country_long = read_string(reader, country + COUNTRY_LONG_SKIP)?;
                }
            }
        }

        for (column, attr) in TEXT_COLUMNS {
            if !request.wants(attr) {
                continue;
            }
            if let (Some(offset), Some(slot)) = (pointer(column)?, result.field_mut(attr)) {
                *slot = read_string(reader, offset)?;
            }
        }

        result.is_proxy = classify(&result.country_short, &result.proxy_type);
        Ok(result)
    }
}

fn read_address<R: RowReader>(reader: &mut R, family: AddressFamily, offset: u64) -> io::Result<u128> {
    match family {
        AddressFamily::V4 => {
            let mut buf = [0u8; 4];
            reader.read_bytes(offset, &mut buf)?;
            Ok(u128::from(u32::from_le_bytes(buf)))
        }
        AddressFamily::V6 => {
            let mut buf = [0u8; 16];
            reader.read_bytes(offset, &mut buf)?;
            Ok(u128::from_le_bytes(buf))
        }
    }
}

/// Length-prefixed heap string. Bytes map one-to-one onto Latin-1 chars.
fn read_string<R: RowReader>(reader: &mut R, offset: u64) -> io::Result<String> {
    let len = reader.read_u8(offset)?;
    let mut buf = vec![0u8; usize::from(len)];
    reader.read_bytes(offset + 1, &mut buf)?;
    Ok(buf.into_iter().map(char::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_string_latin1() {
        let data = [5u8, b'Z', 0xfc, b'r', b'i', b'c', 0];
        let mut reader = SliceReader::new(&data);
        assert_eq!(read_string(&mut reader, 0).unwrap(), "Z\u{fc}rich");
        assert_eq!(read_string(&mut reader, 6).unwrap(), "");
    }

    #[test]
    fn test_read_string_truncated() {
        let data = [9u8, b'a', b'b'];
        let mut reader = SliceReader::new(&data);
        assert!(read_string(&mut reader, 0).is_err());
    }

    #[test]
    fn test_read_address_little_endian() {
        let mut data = vec![0x04, 0x03, 0x02, 0x01];
        data.extend_from_slice(&(0x2001_0db8u128 << 96).to_le_bytes());
        let mut reader = SliceReader::new(&data);
        assert_eq!(read_address(&mut reader, AddressFamily::V4, 0).unwrap(), 0x0102_0304);
        assert_eq!(read_address(&mut reader, AddressFamily::V6, 4).unwrap(), 0x2001_0db8u128 << 96);
    }
}
