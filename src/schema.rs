//! Column layouts for the twelve BIN database types
//!
//! Each database type (PX1 through PX12) carries a fixed set of columns at
//! fixed positions. Position 1 is always the `ip_from` address; the rest are
//! 32-bit pointers into the string heap. Every type is a superset of the one
//! before it, except PX10 which repeats the PX9 layout.

/// Logical data columns a BIN file can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Country code and name pair
    Country,
    /// Region or state name
    Region,
    /// City name
    City,
    /// Internet service provider
    Isp,
    /// Proxy type code (VPN, TOR, DCH, ...)
    ProxyType,
    /// Domain name
    Domain,
    /// Usage type code
    UsageType,
    /// Autonomous system number
    Asn,
    /// Autonomous system name
    AsName,
    /// Days since the address was last seen as a proxy
    LastSeen,
    /// Threat classification
    Threat,
    /// VPN provider name
    Provider,
    /// Fraud score
    FraudScore,
}

impl Column {
    /// Number of logical columns
    pub const COUNT: usize = 13;

    /// All columns in table order
    pub const ALL: [Column; Column::COUNT] = [
        Column::Country,
        Column::Region,
        Column::City,
        Column::Isp,
        Column::ProxyType,
        Column::Domain,
        Column::UsageType,
        Column::Asn,
        Column::AsName,
        Column::LastSeen,
        Column::Threat,
        Column::Provider,
        Column::FraudScore,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Column positions for one database type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    /// Database type, 1..=12
    pub db_type: u8,
    /// 1-based positions, 0 when the column is absent
    positions: [u8; Column::COUNT],
}

const fn schema(db_type: u8, positions: [u8; Column::COUNT]) -> Schema {
    Schema { db_type, positions }
}

//                    cc  rg  ct isp  px dom use asn  as  ls thr prv frd
static SCHEMAS: [Schema; 12] = [
    schema(1, [2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
    schema(2, [3, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]),
    schema(3, [3, 4, 5, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]),
    schema(4, [3, 4, 5, 6, 2, 0, 0, 0, 0, 0, 0, 0, 0]),
    schema(5, [3, 4, 5, 6, 2, 7, 0, 0, 0, 0, 0, 0, 0]),
    schema(6, [3, 4, 5, 6, 2, 7, 8, 0, 0, 0, 0, 0, 0]),
    schema(7, [3, 4, 5, 6, 2, 7, 8, 9, 10, 0, 0, 0, 0]),
    schema(8, [3, 4, 5, 6, 2, 7, 8, 9, 10, 11, 0, 0, 0]),
    schema(9, [3, 4, 5, 6, 2, 7, 8, 9, 10, 11, 12, 0, 0]),
    schema(10, [3, 4, 5, 6, 2, 7, 8, 9, 10, 11, 12, 0, 0]),
    schema(11, [3, 4, 5, 6, 2, 7, 8, 9, 10, 11, 12, 13, 0]),
    schema(12, [3, 4, 5, 6, 2, 7, 8, 9, 10, 11, 12, 13, 14]),
];

/// Look up the schema for a database type.
///
/// Returns `None` for types outside 1..=12.
pub fn schema_for(db_type: u8) -> Option<&'static Schema> {
    SCHEMAS.get(usize::from(db_type).checked_sub(1)?)
}

impl Schema {
    /// 1-based column position, `None` when the type lacks the column
    pub fn position(&self, column: Column) -> Option<u8> {
        match self.positions[column.slot()] {
            0 => None,
            pos => Some(pos),
        }
    }

    /// Whether the type carries a column
    pub fn has(&self, column: Column) -> bool {
        self.position(column).is_some()
    }

    /// Columns per row this type needs, counting `ip_from`
    pub fn column_count(&self) -> u8 {
        self.positions.iter().copied().max().unwrap_or(1).max(1)
    }

    /// Columns present in this type, in table order
    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        Column::ALL.into_iter().filter(move |&c| self.has(c))
    }

    /// Byte offsets of each column inside a row, measured from the end of
    /// the `ip_from` column.
    pub fn layout(&self) -> FieldLayout {
        let mut offsets = [None; Column::COUNT];
        for column in Column::ALL {
            if let Some(pos) = self.position(column) {
                offsets[column.slot()] = Some((usize::from(pos) - 2) * 4);
            }
        }
        FieldLayout { offsets }
    }
}

/// Precomputed column offsets within a row's data part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    offsets: [Option<usize>; Column::COUNT],
}

impl FieldLayout {
    /// Byte offset of a column after the `ip_from` column
    pub fn offset(&self, column: Column) -> Option<usize> {
        self.offsets[column.slot()]
    }

    /// Whether the column is present
    pub fn is_enabled(&self, column: Column) -> bool {
        self.offsets[column.slot()].is_some()
    }
}
