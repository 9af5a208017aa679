//! Public database handle
//!
//! [`ProxyDatabase`] owns the lifecycle of a loaded BIN file: open, query,
//! close, and transparent reload on the next query after a close. The handle
//! is `Send + Sync`; lookups from many threads share one loaded state and
//! never serialize on a shared file cursor.

use crate::address;
use crate::error::{ProxyError, Result};
use crate::header::DatabaseInfo;
use crate::query::Engine;
use crate::result::{Attribute, QueryResult, Request};
use crate::source::{IoMode, Origin};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

#[derive(Default)]
struct State {
    origin: Option<Origin>,
    mode: IoMode,
    engine: Option<Arc<Engine>>,
}

/// Reader for an IP2Proxy BIN database
///
/// # Examples
///
/// ```no_run
/// use ip2proxy::{IoMode, ProxyDatabase};
///
/// let db = ProxyDatabase::from_path("IP2PROXY-LITE-PX4.BIN", IoMode::MemoryMapped)?;
///
/// let result = db.lookup("8.8.8.8")?;
/// println!("{} {} {}", result.is_proxy, result.proxy_type, result.country_short);
///
/// // Single attribute
/// let isp = db.isp("2001:4860:4860::8888")?;
/// # Ok::<(), ip2proxy::ProxyError>(())
/// ```
pub struct ProxyDatabase {
    state: RwLock<State>,
}

macro_rules! text_accessors {
    ($($(#[$doc:meta])* $name:ident => $attr:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self, ip: &str) -> Result<String> {
                Ok(self.query(ip, Request::Only(Attribute::$attr))?.value(Attribute::$attr))
            }
        )*
    };
}

impl ProxyDatabase {
    /// An unopened handle. Queries return `MISSING FILE` until it is opened.
    pub fn new() -> Self {
        ProxyDatabase {
            state: RwLock::new(State::default()),
        }
    }

    /// Open a database file.
    ///
    /// # Errors
    ///
    /// See [`ProxyDatabase::open`].
    pub fn from_path(path: impl AsRef<Path>, mode: IoMode) -> Result<Self> {
        let db = ProxyDatabase::new();
        db.open(path, mode)?;
        Ok(db)
    }

    /// Load a database from bytes already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let db = ProxyDatabase::new();
        db.open_bytes(data)?;
        Ok(db)
    }

    /// Open a database file with the given I/O mode.
    ///
    /// Does nothing when a database is already loaded. The path is
    /// remembered even if loading fails, so later queries retry it.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::InvalidArgument`] for an empty path
    /// - [`ProxyError::MissingFile`] if the file cannot be opened
    /// - [`ProxyError::UnsupportedDatabaseType`] / [`ProxyError::InvalidHeader`]
    ///   for headers that cannot be read
    pub fn open(&self, path: impl AsRef<Path>, mode: IoMode) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ProxyError::InvalidArgument);
        }

        let mut state = self.write();
        if state.engine.is_some() {
            debug!(path = %path.display(), "database already open");
            return Ok(());
        }

        let origin = Origin::Path(path.to_path_buf());
        state.origin = Some(origin.clone());
        state.mode = mode;
        let engine = Engine::load(&origin, mode)?;
        state.engine = Some(Arc::new(engine));
        Ok(())
    }

    /// Load a database from bytes. Does nothing when a database is already loaded.
    pub fn open_bytes(&self, data: Vec<u8>) -> Result<()> {
        let mut state = self.write();
        if state.engine.is_some() {
            debug!("database already open");
            return Ok(());
        }

        let origin = Origin::Bytes(Arc::from(data));
        let engine = Engine::load(&origin, IoMode::Buffered)?;
        state.origin = Some(origin);
        state.engine = Some(Arc::new(engine));
        Ok(())
    }

    /// Release the loaded state.
    ///
    /// The source is kept; the next query loads it again. Queries already
    /// running finish against the state they started with.
    pub fn close(&self) {
        if self.write().engine.take().is_some() {
            debug!("database closed");
        }
    }

    /// Whether a database is currently loaded
    pub fn is_open(&self) -> bool {
        self.read().engine.is_some()
    }

    /// I/O mode of the most recent open
    pub fn io_mode(&self) -> IoMode {
        self.read().mode
    }

    /// Look up every attribute for an address.
    pub fn lookup(&self, ip: &str) -> Result<QueryResult> {
        self.query(ip, Request::All)
    }

    /// Look up an address, reading only what `request` selects.
    ///
    /// Data problems come back as sentinel results (see
    /// [`LookupStatus`](crate::LookupStatus)). Address text is checked before
    /// the database is loaded.
    ///
    /// # Errors
    ///
    /// Read failures on a loaded database, or a reload that fails for a
    /// reason other than a missing file.
    pub fn query(&self, ip: &str, request: Request) -> Result<QueryResult> {
        let addr = match address::normalize(ip) {
            Ok(addr) => addr,
            Err(err) => {
                debug!(error = %err, "rejected address");
                return Ok(QueryResult::invalid_address());
            }
        };

        match self.engine()? {
            Some(engine) => engine.query(addr, request),
            None => Ok(QueryResult::missing_file()),
        }
    }

    text_accessors! {
        /// ISO 3166 country code
        country_short => CountryShort;
        /// Country name
        country_long => CountryLong;
        /// Region or state name
        region => Region;
        /// City name
        city => City;
        /// Internet service provider
        isp => Isp;
        /// Proxy type (VPN, TOR, DCH, PUB, WEB, SES, RES, ...)
        proxy_type => ProxyType;
        /// Domain name
        domain => Domain;
        /// Usage type code
        usage_type => UsageType;
        /// Autonomous system number
        asn => Asn;
        /// Autonomous system name
        as_name => AsName;
        /// Days since last seen as a proxy
        last_seen => LastSeen;
        /// Threat classification
        threat => Threat;
        /// VPN provider name
        provider => Provider;
        /// Fraud score
        fraud_score => FraudScore;
    }

    /// Proxy flag: 0 no, 1 yes, 2 data center or search engine, -1 no data
    pub fn is_proxy(&self, ip: &str) -> Result<i8> {
        Ok(self.query(ip, Request::Only(Attribute::IsProxy))?.is_proxy)
    }

    /// Version of this library
    pub fn module_version(&self) -> &'static str {
        crate::VERSION
    }

    /// Database type as text (`"4"` for PX4), `"0"` when nothing is loaded
    pub fn package_version(&self) -> String {
        self.loaded()
            .map(|engine| engine.info().db_type.to_string())
            .unwrap_or_else(|| "0".to_string())
    }

    /// Publication date as `20YY.M.D`, empty when nothing is loaded
    pub fn database_version(&self) -> String {
        self.loaded()
            .map(|engine| engine.info().version_string())
            .unwrap_or_default()
    }

    /// Header of the loaded database
    pub fn info(&self) -> Option<DatabaseInfo> {
        self.loaded().map(|engine| *engine.info())
    }

    fn loaded(&self) -> Option<Arc<Engine>> {
        self.read().engine.clone()
    }

    /// Current engine, loading from the remembered source if closed.
    ///
    /// `None` when there is no source or the file has gone missing.
    fn engine(&self) -> Result<Option<Arc<Engine>>> {
        if let Some(engine) = self.loaded() {
            return Ok(Some(engine));
        }

        let mut state = self.write();
        if let Some(engine) = &state.engine {
            return Ok(Some(Arc::clone(engine)));
        }
        let Some(origin) = state.origin.clone() else {
            return Ok(None);
        };

        match Engine::load(&origin, state.mode) {
            Ok(engine) => {
                debug!("database reloaded");
                let engine = Arc::new(engine);
                state.engine = Some(Arc::clone(&engine));
                Ok(Some(engine))
            }
            Err(err) if err.is_missing_file() => {
                warn!(error = %err, "database reload failed");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ProxyDatabase {
    fn default() -> Self {
        ProxyDatabase::new()
    }
}

impl fmt::Debug for ProxyDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("ProxyDatabase")
            .field("origin", &state.origin)
            .field("mode", &state.mode)
            .field("open", &state.engine.is_some())
            .finish()
    }
}
