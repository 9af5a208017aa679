//! ip2proxy - Offline reader for IP2Proxy BIN databases
//!
//! Answers proxy, geolocation and network questions about an IPv4 or IPv6
//! address from a local IP2Proxy BIN file (PX1 through PX12), without any
//! network access.
//!
//! # Quick Start
//!
//! ```no_run
//! use ip2proxy::{IoMode, ProxyDatabase, Request, Attribute};
//!
//! let db = ProxyDatabase::from_path("IP2PROXY-LITE-PX4.BIN", IoMode::Buffered)?;
//!
//! let all = db.lookup("1.2.3.4")?;
//! if all.is_found() {
//!     println!("{} via {} ({})", all.country_long, all.proxy_type, all.is_proxy);
//! }
//!
//! // Read a single attribute
//! let only = db.query("::ffff:1.2.3.4", Request::Only(Attribute::Isp))?;
//! println!("{}", only.isp);
//! # Ok::<(), ip2proxy::ProxyError>(())
//! ```
//!
//! # Lookups
//!
//! - Address text is normalized first. IPv6 forms that embed an IPv4
//!   address (IPv4-mapped, 6to4, Teredo) are searched in the IPv4 table.
//! - A 65536-bucket index narrows the rows, then a binary search finds the
//!   row whose range covers the address.
//! - Data problems (bad address, no IPv6 data, no file) come back as
//!   sentinel results rather than errors. See [`LookupStatus`].
//!
//! # I/O Modes
//!
//! ```text
//! Buffered      one file handle per query, positional reads
//! MemoryMapped  row tables and string heap mapped read-only at open
//! from_bytes    whole file held in memory
//! ```
//!
//! A [`ProxyDatabase`] may be shared across threads. Closing it releases the
//! loaded state; the next query loads it again.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Address text normalization
pub mod address;
/// Public database handle
pub mod database;
/// Error types
pub mod error;
/// BIN header and bucket index
pub mod header;
/// Query results and request selection
pub mod result;
/// Column layouts per database type
pub mod schema;
/// I/O backends
pub mod source;

mod query;

// Re-exports for Rust consumers

/// Database handle
pub use crate::database::ProxyDatabase;

/// Error type and result alias
pub use crate::error::{ProxyError, Result};

/// Lookup results
pub use crate::result::{Attribute, LookupStatus, QueryResult, Request};

/// Header information
pub use crate::header::DatabaseInfo;

/// I/O mode selection
pub use crate::source::IoMode;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
