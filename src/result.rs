//! Query results and request selection
//!
//! A [`QueryResult`] always carries every attribute. Attributes that were
//! not requested, or that the database type lacks, read `"NOT SUPPORTED"`.
//! Lookups that could not run at all fill every attribute with one message
//! and set `is_proxy` to `-1`; [`QueryResult::status`] says which.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Attribute absent from the database type, or not requested
pub const NOT_SUPPORTED: &str = "NOT SUPPORTED";
/// Address text was rejected, or no row covers the address
pub const INVALID_IP_ADDRESS: &str = "INVALID IP ADDRESS";
/// No database could be loaded
pub const MISSING_FILE: &str = "MISSING FILE";
/// IPv6 query against a database with no IPv6 rows
pub const IPV6_UNSUPPORTED: &str = "IPV6 ADDRESS MISSING IN IPV4 BIN";

/// Outcome of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    /// A row was found and decoded
    Found,
    /// See [`INVALID_IP_ADDRESS`]
    InvalidAddress,
    /// See [`MISSING_FILE`]
    MissingFile,
    /// See [`IPV6_UNSUPPORTED`]
    Ipv6Unsupported,
}

impl LookupStatus {
    /// Sentinel text written into every attribute, `None` for `Found`
    pub fn message(self) -> Option<&'static str> {
        match self {
            LookupStatus::Found => None,
            LookupStatus::InvalidAddress => Some(INVALID_IP_ADDRESS),
            LookupStatus::MissingFile => Some(MISSING_FILE),
            LookupStatus::Ipv6Unsupported => Some(IPV6_UNSUPPORTED),
        }
    }
}

/// A single queryable attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Derived proxy flag (0, 1 or 2)
    IsProxy,
    /// Proxy type code
    ProxyType,
    /// ISO 3166 country code
    CountryShort,
    /// Country name
    CountryLong,
    /// Region or state
    Region,
    /// City
    City,
    /// Internet service provider
    Isp,
    /// Domain name
    Domain,
    /// Usage type code
    UsageType,
    /// Autonomous system number
    Asn,
    /// Autonomous system name
    AsName,
    /// Days since last seen as a proxy
    LastSeen,
    /// Threat classification
    Threat,
    /// VPN provider name
    Provider,
    /// Fraud score
    FraudScore,
}

impl Attribute {
    /// Every attribute, in output order
    pub const ALL: [Attribute; 15] = [
        Attribute::IsProxy,
        Attribute::ProxyType,
        Attribute::CountryShort,
        Attribute::CountryLong,
        Attribute::Region,
        Attribute::City,
        Attribute::Isp,
        Attribute::Domain,
        Attribute::UsageType,
        Attribute::Asn,
        Attribute::AsName,
        Attribute::LastSeen,
        Attribute::Threat,
        Attribute::Provider,
        Attribute::FraudScore,
    ];

    /// Name used on the command line and in JSON output
    pub fn name(self) -> &'static str {
        match self {
            Attribute::IsProxy => "isProxy",
            Attribute::ProxyType => "proxyType",
            Attribute::CountryShort => "countryCode",
            Attribute::CountryLong => "countryName",
            Attribute::Region => "regionName",
            Attribute::City => "cityName",
            Attribute::Isp => "isp",
            Attribute::Domain => "domain",
            Attribute::UsageType => "usageType",
            Attribute::Asn => "asn",
            Attribute::AsName => "as",
            Attribute::LastSeen => "lastSeen",
            Attribute::Threat => "threat",
            Attribute::Provider => "provider",
            Attribute::FraudScore => "fraudScore",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown attribute name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown attribute '{0}'")]
pub struct ParseAttributeError(String);

impl FromStr for Attribute {
    type Err = ParseAttributeError;

    /// Accepts the JSON names plus snake_case aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let attr = match key.as_str() {
            "isproxy" => Attribute::IsProxy,
            "proxytype" => Attribute::ProxyType,
            "countrycode" | "countryshort" => Attribute::CountryShort,
            "countryname" | "countrylong" => Attribute::CountryLong,
            "regionname" | "region" => Attribute::Region,
            "cityname" | "city" => Attribute::City,
            "isp" => Attribute::Isp,
            "domain" => Attribute::Domain,
            "usagetype" | "usage" => Attribute::UsageType,
            "asn" => Attribute::Asn,
            "as" | "asname" => Attribute::AsName,
            "lastseen" => Attribute::LastSeen,
            "threat" => Attribute::Threat,
            "provider" => Attribute::Provider,
            "fraudscore" => Attribute::FraudScore,
            _ => return Err(ParseAttributeError(s.to_string())),
        };
        Ok(attr)
    }
}

/// Which attributes a query should read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Request {
    /// Every attribute the database carries
    #[default]
    All,
    /// A single attribute; the rest stay `NOT SUPPORTED`
    Only(Attribute),
}

impl Request {
    /// Whether decoding should read `attr`.
    ///
    /// `IsProxy` needs the proxy type and country code to be derived, so
    /// requesting it pulls those two in as well.
    pub fn wants(self, attr: Attribute) -> bool {
        match self {
            Request::All => true,
            Request::Only(only) if only == attr => true,
            Request::Only(Attribute::IsProxy) => {
                matches!(attr, Attribute::ProxyType | Attribute::CountryShort)
            }
            Request::Only(_) => false,
        }
    }
}

/// Attributes for one looked-up address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// How the lookup ended
    #[serde(skip)]
    pub status: LookupStatus,
    /// 0 not a proxy, 1 proxy, 2 data center or search engine range, -1 no data
    pub is_proxy: i8,
    /// Proxy type code
    pub proxy_type: String,
    /// ISO 3166 country code
    #[serde(rename = "countryCode")]
    pub country_short: String,
    /// Country name
    #[serde(rename = "countryName")]
    pub country_long: String,
    /// Region or state
    #[serde(rename = "regionName")]
    pub region: String,
    /// City
    #[serde(rename = "cityName")]
    pub city: String,
    /// Internet service provider
    pub isp: String,
    /// Domain name
    pub domain: String,
    /// Usage type code
    pub usage_type: String,
    /// Autonomous system number
    pub asn: String,
    /// Autonomous system name
    #[serde(rename = "as")]
    pub as_name: String,
    /// Days since last seen as a proxy
    pub last_seen: String,
    /// Threat classification
    pub threat: String,
    /// VPN provider name
    pub provider: String,
    /// Fraud score
    pub fraud_score: String,
}

impl QueryResult {
    fn filled(status: LookupStatus, text: &str, is_proxy: i8) -> Self {
        QueryResult {
            status,
            is_proxy,
            proxy_type: text.to_string(),
            country_short: text.to_string(),
            country_long: text.to_string(),
            region: text.to_string(),
            city: text.to_string(),
            isp: text.to_string(),
            domain: text.to_string(),
            usage_type: text.to_string(),
            asn: text.to_string(),
            as_name: text.to_string(),
            last_seen: text.to_string(),
            threat: text.to_string(),
            provider: text.to_string(),
            fraud_score: text.to_string(),
        }
    }

    fn sentinel(status: LookupStatus) -> Self {
        QueryResult::filled(status, status.message().unwrap_or(NOT_SUPPORTED), -1)
    }

    /// A found row before any attribute is decoded
    pub(crate) fn unresolved() -> Self {
        QueryResult::filled(LookupStatus::Found, NOT_SUPPORTED, -1)
    }

    pub(crate) fn invalid_address() -> Self {
        QueryResult::sentinel(LookupStatus::InvalidAddress)
    }

    pub(crate) fn missing_file() -> Self {
        QueryResult::sentinel(LookupStatus::MissingFile)
    }

    pub(crate) fn ipv6_unsupported() -> Self {
        QueryResult::sentinel(LookupStatus::Ipv6Unsupported)
    }

    /// Whether a row was found
    pub fn is_found(&self) -> bool {
        self.status == LookupStatus::Found
    }

    /// Attribute value as text
    pub fn value(&self, attr: Attribute) -> String {
        match attr {
            Attribute::IsProxy => self.is_proxy.to_string(),
            _ => self.text(attr).map(str::to_string).unwrap_or_default(),
        }
    }

    fn text(&self, attr: Attribute) -> Option<&str> {
        let field = match attr {
            Attribute::IsProxy => return None,
            Attribute::ProxyType => &self.proxy_type,
            Attribute::CountryShort => &self.country_short,
            Attribute::CountryLong => &self.country_long,
            Attribute::Region => &self.region,
            Attribute::City => &self.city,
            Attribute::Isp => &self.isp,
            Attribute::Domain => &self.domain,
            Attribute::UsageType => &self.usage_type,
            Attribute::Asn => &self.asn,
            Attribute::AsName => &self.as_name,
            Attribute::LastSeen => &self.last_seen,
            Attribute::Threat => &self.threat,
            Attribute::Provider => &self.provider,
            Attribute::FraudScore => &self.fraud_score,
        };
        Some(field)
    }

    /// Mutable text slot for an attribute, `None` for `IsProxy`
    pub(crate) fn field_mut(&mut self, attr: Attribute) -> Option<&mut String> {
        let field = match attr {
            Attribute::IsProxy => return None,
            Attribute::ProxyType => &mut self.proxy_type,
            Attribute::CountryShort => &mut self.country_short,
            Attribute::CountryLong => &mut self.country_long,
            Attribute::Region => &mut self.region,
            Attribute::City => &mut self.city,
            Attribute::Isp => &mut self.isp,
            Attribute::Domain => &mut self.domain,
            Attribute::UsageType => &mut self.usage_type,
            Attribute::Asn => &mut self.asn,
            Attribute::AsName => &mut self.as_name,
            Attribute::LastSeen => &mut self.last_seen,
            Attribute::Threat => &mut self.threat,
            Attribute::Provider => &mut self.provider,
            Attribute::FraudScore => &mut self.fraud_score,
        };
        Some(field)
    }
}

/// Derive the proxy flag from a decoded country code and proxy type.
///
/// `"-"` in either means no proxy. `DCH` and `SES` ranges get 2, anything
/// else 1. The inputs are used as-is, so a database without a proxy type
/// column yields 1 for any listed country.
pub fn classify(country_short: &str, proxy_type: &str) -> i8 {
    if country_short == "-" || proxy_type == "-" {
        0
    } else if proxy_type == "DCH" || proxy_type == "SES" {
        2
    } else {
        1
    }
}
