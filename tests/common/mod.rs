//! BIN file writer for tests and benchmarks
//!
//! Produces files in the same layout as vendor databases: 64-byte header,
//! bucket index, IPv4 rows, IPv6 rows, then the string heap. Each table ends
//! with a terminal row starting at the family's maximum address.

#![allow(dead_code)]

use ip2proxy::schema::{schema_for, Column};
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

const HEADER_LEN: usize = 64;
const INDEX_TABLE_LEN: usize = 65536 * 8;

/// Attribute values for one range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub country_short: String,
    pub country_long: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    pub proxy_type: String,
    pub domain: String,
    pub usage_type: String,
    pub asn: String,
    pub as_name: String,
    pub last_seen: String,
    pub threat: String,
    pub provider: String,
    pub fraud_score: String,
}

impl Record {
    /// A range with no proxy data: every attribute is "-"
    pub fn blank() -> Self {
        let dash = || "-".to_string();
        Record {
            country_short: dash(),
            country_long: dash(),
            region: dash(),
            city: dash(),
            isp: dash(),
            proxy_type: dash(),
            domain: dash(),
            usage_type: dash(),
            asn: dash(),
            as_name: dash(),
            last_seen: dash(),
            threat: dash(),
            provider: dash(),
            fraud_score: dash(),
        }
    }

    pub fn proxy(country_short: &str, country_long: &str, proxy_type: &str) -> Self {
        Record {
            country_short: country_short.to_string(),
            country_long: country_long.to_string(),
            proxy_type: proxy_type.to_string(),
            ..Record::blank()
        }
    }

    pub fn with(mut self, column: Column, value: &str) -> Self {
        let slot = match column {
            Column::Country => &mut self.country_short,
            Column::Region => &mut self.region,
            Column::City => &mut self.city,
            Column::Isp => &mut self.isp,
            Column::ProxyType => &mut self.proxy_type,
            Column::Domain => &mut self.domain,
            Column::UsageType => &mut self.usage_type,
            Column::Asn => &mut self.asn,
            Column::AsName => &mut self.as_name,
            Column::LastSeen => &mut self.last_seen,
            Column::Threat => &mut self.threat,
            Column::Provider => &mut self.provider,
            Column::FraudScore => &mut self.fraud_score,
        };
        *slot = value.to_string();
        self
    }

    fn text(&self, column: Column) -> &str {
        match column {
            Column::Country => &self.country_short,
            Column::Region => &self.region,
            Column::City => &self.city,
            Column::Isp => &self.isp,
            Column::ProxyType => &self.proxy_type,
            Column::Domain => &self.domain,
            Column::UsageType => &self.usage_type,
            Column::Asn => &self.asn,
            Column::AsName => &self.as_name,
            Column::LastSeen => &self.last_seen,
            Column::Threat => &self.threat,
            Column::Provider => &self.provider,
            Column::FraudScore => &self.fraud_score,
        }
    }
}

pub fn v4(text: &str) -> u32 {
    u32::from(text.parse::<Ipv4Addr>().unwrap())
}

pub fn v6(text: &str) -> u128 {
    u128::from(text.parse::<Ipv6Addr>().unwrap())
}

/// Builder for a BIN file of one database type
#[derive(Debug, Clone)]
pub struct BinBuilder {
    db_type: u8,
    date: (u8, u8, u8),
    ipv4: Vec<(u32, Record)>,
    ipv6: Vec<(u128, Record)>,
}

impl BinBuilder {
    pub fn new(db_type: u8) -> Self {
        BinBuilder {
            db_type,
            date: (21, 5, 17),
            ipv4: Vec::new(),
            ipv6: Vec::new(),
        }
    }

    pub fn date(mut self, year: u8, month: u8, day: u8) -> Self {
        self.date = (year, month, day);
        self
    }

    /// Add an IPv4 range starting at `from`. Ranges must be added in order.
    pub fn ipv4(mut self, from: &str, record: Record) -> Self {
        let from = v4(from);
        if let Some((last, _)) = self.ipv4.last() {
            assert!(from > *last, "IPv4 rows must be ascending");
        }
        self.ipv4.push((from, record));
        self
    }

    /// Add an IPv6 range starting at `from`. Ranges must be added in order.
    pub fn ipv6(mut self, from: &str, record: Record) -> Self {
        let from = v6(from);
        if let Some((last, _)) = self.ipv6.last() {
            assert!(from > *last, "IPv6 rows must be ascending");
        }
        self.ipv6.push((from, record));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let schema = schema_for(self.db_type).expect("known database type");
        let columns = usize::from(schema.column_count());
        let v4_width = 4 * columns;
        let v6_width = 16 + 4 * (columns - 1);

        let has_v6 = !self.ipv6.is_empty();
        let index_len = if has_v6 { 2 * INDEX_TABLE_LEN } else { INDEX_TABLE_LEN };

        let v4_from: Vec<u128> = self
            .ipv4
            .iter()
            .map(|(from, _)| u128::from(*from))
            .chain(std::iter::once(u128::from(u32::MAX)))
            .collect();
        let v6_from: Vec<u128> = if has_v6 {
            self.ipv6
                .iter()
                .map(|(from, _)| *from)
                .chain(std::iter::once(u128::MAX))
                .collect()
        } else {
            Vec::new()
        };

        let index_start = HEADER_LEN;
        let v4_start = index_start + index_len;
        let v6_start = v4_start + v4_from.len() * v4_width;
        let heap_start = v6_start + v6_from.len() * v6_width;

        let mut out = vec![0u8; HEADER_LEN];
        out[0] = self.db_type;
        out[1] = columns as u8;
        out[2] = self.date.0;
        out[3] = self.date.1;
        out[4] = self.date.2;
        let words = [
            v4_from.len() as u32,
            v4_start as u32 + 1,
            v6_from.len() as u32,
            if has_v6 { v6_start as u32 + 1 } else { 0 },
            index_start as u32 + 1,
            if has_v6 { (index_start + INDEX_TABLE_LEN) as u32 + 1 } else { 0 },
        ];
        for (i, word) in words.iter().enumerate() {
            out[5 + 4 * i..9 + 4 * i].copy_from_slice(&word.to_le_bytes());
        }

        write_index(&mut out, &v4_from, 16);
        if has_v6 {
            write_index(&mut out, &v6_from, 112);
        }

        let mut heap = Heap::new(heap_start);
        let sentinel = Record::blank();

        let v4_records = self.ipv4.iter().map(|(_, r)| r).chain(std::iter::once(&sentinel));
        for (from, record) in v4_from.iter().zip(v4_records) {
            out.extend_from_slice(&(*from as u32).to_le_bytes());
            write_columns(&mut out, &mut heap, record, schema.db_type, columns);
        }

        if has_v6 {
            let v6_records = self.ipv6.iter().map(|(_, r)| r).chain(std::iter::once(&sentinel));
            for (from, record) in v6_from.iter().zip(v6_records) {
                out.extend_from_slice(&from.to_le_bytes());
                write_columns(&mut out, &mut heap, record, schema.db_type, columns);
            }
        }

        assert_eq!(out.len(), heap_start);
        out.extend_from_slice(&heap.bytes);
        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Row containing `addr`: the last row whose ip_from is <= addr
fn containing_row(froms: &[u128], addr: u128) -> u32 {
    froms.partition_point(|&from| from <= addr).saturating_sub(1) as u32
}

fn write_index(out: &mut Vec<u8>, froms: &[u128], shift: u32) {
    let span = (1u128 << shift) - 1;
    for bucket in 0..65536u128 {
        let first = bucket << shift;
        let low = containing_row(froms, first);
        let high = containing_row(froms, first | span);
        out.extend_from_slice(&low.to_le_bytes());
        out.extend_from_slice(&high.to_le_bytes());
    }
}

fn write_columns(out: &mut Vec<u8>, heap: &mut Heap, record: &Record, db_type: u8, columns: usize) {
    let schema = schema_for(db_type).unwrap();
    for position in 2..=columns {
        let column = Column::ALL
            .into_iter()
            .find(|&c| schema.position(c) == Some(position as u8));
        let pointer = match column {
            Some(Column::Country) => heap.country(&record.country_short, &record.country_long),
            Some(column) => heap.string(record.text(column)),
            None => heap.string(""),
        };
        out.extend_from_slice(&pointer.to_le_bytes());
    }
}

struct Heap {
    start: usize,
    bytes: Vec<u8>,
    strings: HashMap<String, u32>,
    countries: HashMap<(String, String), u32>,
}

impl Heap {
    fn new(start: usize) -> Self {
        Heap {
            start,
            bytes: Vec::new(),
            strings: HashMap::new(),
            countries: HashMap::new(),
        }
    }

    fn offset(&self) -> u32 {
        (self.start + self.bytes.len()) as u32
    }

    /// Length-prefixed Latin-1 bytes
    fn push(&mut self, text: &str) {
        let encoded: Vec<u8> = text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).expect("Latin-1 text"))
            .collect();
        assert!(encoded.len() < 256);
        self.bytes.push(encoded.len() as u8);
        self.bytes.extend_from_slice(&encoded);
    }

    fn string(&mut self, text: &str) -> u32 {
        if let Some(&offset) = self.strings.get(text) {
            return offset;
        }
        let offset = self.offset();
        self.push(text);
        self.strings.insert(text.to_string(), offset);
        offset
    }

    /// Country code padded to a 3-byte slot, followed by the country name
    fn country(&mut self, short: &str, long: &str) -> u32 {
        let key = (short.to_string(), long.to_string());
        if let Some(&offset) = self.countries.get(&key) {
            return offset;
        }
        assert!(short.len() <= 2);
        let offset = self.offset();
        self.push(short);
        self.bytes.resize(self.bytes.len() + 2 - short.len(), 0);
        self.push(long);
        self.countries.insert(key, offset);
        offset
    }
}

/// PX4 database used across the integration tests
///
/// IPv4:
/// - 0.0.0.0    blank
/// - 1.2.3.0    VPN, US, California / Los Angeles, Example ISP
/// - 1.2.4.0    blank
/// - 8.8.8.0    DCH, US, Google LLC
/// - 8.8.9.0    blank
/// - 200.0.0.0  PUB, BR, Sao Paulo
///
/// IPv6:
/// - ::          blank
/// - 2001:db8::  TOR, DE, Berlin
/// - 2001:db9::  blank
/// - 2a00::      SES, FR
pub fn px4() -> BinBuilder {
    BinBuilder::new(4)
        .ipv4("0.0.0.0", Record::blank())
        .ipv4(
            "1.2.3.0",
            Record::proxy("US", "United States of America", "VPN")
                .with(Column::Region, "California")
                .with(Column::City, "Los Angeles")
                .with(Column::Isp, "Example ISP"),
        )
        .ipv4("1.2.4.0", Record::blank())
        .ipv4(
            "8.8.8.0",
            Record::proxy("US", "United States of America", "DCH")
                .with(Column::Region, "California")
                .with(Column::City, "Mountain View")
                .with(Column::Isp, "Google LLC"),
        )
        .ipv4("8.8.9.0", Record::blank())
        .ipv4(
            "200.0.0.0",
            Record::proxy("BR", "Brazil", "PUB")
                .with(Column::Region, "Sao Paulo")
                .with(Column::City, "Sao Paulo")
                .with(Column::Isp, "Example Telecom"),
        )
        .ipv6("::", Record::blank())
        .ipv6(
            "2001:db8::",
            Record::proxy("DE", "Germany", "TOR")
                .with(Column::Region, "Berlin")
                .with(Column::City, "Berlin")
                .with(Column::Isp, "Tor Relay Hosting"),
        )
        .ipv6("2001:db9::", Record::blank())
        .ipv6(
            "2a00::",
            Record::proxy("FR", "France", "SES")
                .with(Column::Region, "Ile-de-France")
                .with(Column::City, "Paris")
                .with(Column::Isp, "Example Search"),
        )
}

/// PX12 database with a single fully populated range at 45.0.0.0
pub fn px12() -> BinBuilder {
    BinBuilder::new(12)
        .date(24, 11, 1)
        .ipv4("0.0.0.0", Record::blank())
        .ipv4(
            "45.0.0.0",
            Record::proxy("SG", "Singapore", "RES")
                .with(Column::Region, "Singapore")
                .with(Column::City, "Singapore")
                .with(Column::Isp, "Example Residential")
                .with(Column::Domain, "example.sg")
                .with(Column::UsageType, "ISP/MOB")
                .with(Column::Asn, "64500")
                .with(Column::AsName, "Example AS")
                .with(Column::LastSeen, "7")
                .with(Column::Threat, "SPAM")
                .with(Column::Provider, "ExampleVPN")
                .with(Column::FraudScore, "88"),
        )
        .ipv4("45.0.1.0", Record::blank())
}
