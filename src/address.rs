//! Address normalization
//!
//! Turns query text into the numeric key used by the range tables, together
//! with the table family that key belongs to. IPv6 forms that carry an IPv4
//! address (IPv4-mapped, 6to4, Teredo, `::a.b.c.d` and the legacy
//! two-hextet notation) are folded onto the IPv4 table.
//!
//! Parsing is deliberately narrow: only literal addresses are accepted, and a
//! handful of numeric shapes that other parsers read in surprising ways
//! (`"16909060"`, `"1.2"`, `"1.2.3"`) are rejected outright.
//!
//! ```
//! use ip2proxy::address::{normalize, AddressFamily};
//!
//! let addr = normalize("2002:808:808::1")?;
//! assert_eq!(addr.family, AddressFamily::V4);
//! assert_eq!(addr.value, 0x0808_0808);
//! # Ok::<(), ip2proxy::address::AddressError>(())
//! ```

use std::fmt;
use std::iter;
use thiserror::Error;

const IPV4_MASK: u128 = u32::MAX as u128;

/// `2002::/16`
const SIX_TO_FOUR_FIRST: u128 = 0x2002 << 112;
const SIX_TO_FOUR_LAST: u128 = SIX_TO_FOUR_FIRST | ((1 << 112) - 1);

/// `2001:0000::/32`
const TEREDO_FIRST: u128 = 0x2001_0000 << 96;
const TEREDO_LAST: u128 = TEREDO_FIRST | ((1 << 96) - 1);

/// Address family, which doubles as the choice of row table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// 32-bit addresses, IPv4 table
    V4,
    /// 128-bit addresses, IPv6 table
    V6,
}

impl AddressFamily {
    /// Largest address of this family
    pub fn max_value(self) -> u128 {
        match self {
            AddressFamily::V4 => IPV4_MASK,
            AddressFamily::V6 => u128::MAX,
        }
    }

    /// Width in bytes of the `ip_from` column
    pub fn address_width(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }

    /// Index bucket for an address: its top 16 bits
    pub fn bucket(self, value: u128) -> usize {
        match self {
            AddressFamily::V4 => ((value >> 16) & 0xffff) as usize,
            AddressFamily::V6 => (value >> 112) as usize,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Result of normalizing address text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalizedAddress {
    /// Table to search, after unwrapping embedded IPv4 forms
    pub family: AddressFamily,
    /// Numeric address, big-endian interpretation
    pub value: u128,
    /// Family as written: `V4` only for a plain dotted quad
    pub syntactic_family: AddressFamily,
}

/// Why address text was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Empty input
    #[error("empty address")]
    Empty,

    /// A numeric shape that is refused rather than guessed at
    #[error("ambiguous address form: {0}")]
    Ambiguous(String),

    /// Neither a dotted quad nor an IPv6 literal
    #[error("malformed address: {0}")]
    Malformed(String),
}

/// Normalize address text into a table key.
///
/// # Errors
///
/// Returns an [`AddressError`] for empty, ambiguous or malformed input.
pub fn normalize(text: &str) -> Result<NormalizedAddress, AddressError> {
    if text.is_empty() {
        return Err(AddressError::Empty);
    }

    if let Some(v4) = parse_dotted_quad(text) {
        return Ok(NormalizedAddress {
            family: AddressFamily::V4,
            value: u128::from(v4),
            syntactic_family: AddressFamily::V4,
        });
    }

    if is_ambiguous(text) {
        return Err(AddressError::Ambiguous(text.to_string()));
    }

    let parsed = Ipv6Text::parse(text).ok_or_else(|| AddressError::Malformed(text.to_string()))?;
    let (family, value) = parsed.resolve();

    Ok(NormalizedAddress {
        family,
        value,
        syntactic_family: AddressFamily::V6,
    })
}

/// Four decimal octets of 1-3 digits, each at most 255. Leading zeros are
/// read as decimal.
fn parse_dotted_quad(text: &str) -> Option<u32> {
    let mut value = 0u32;
    let mut octets = 0;

    for part in text.split('.') {
        if octets == 4 || part.is_empty() || part.len() > 3 {
            return None;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let octet: u32 = part.parse().ok()?;
        if octet > 255 {
            return None;
        }
        value = (value << 8) | octet;
        octets += 1;
    }

    (octets == 4).then_some(value)
}

fn is_ambiguous(text: &str) -> bool {
    let bytes = text.as_bytes();

    // Bare integers ("16909060")
    if bytes.iter().all(u8::is_ascii_digit) {
        return true;
    }

    // Short dotted forms ("1.2", "1.2.3")
    let dots = bytes.iter().filter(|&&b| b == b'.').count();
    let dotted_digits = text
        .split('.')
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if dotted_digits && (1..=2).contains(&dots) {
        return true;
    }

    has_zero_padded_ipv4_tail(text)
}

/// Six explicit hextets followed by a dotted part with a zero-padded octet,
/// e.g. `1:2:3:4:5:6:01.2.3.4`.
fn has_zero_padded_ipv4_tail(text: &str) -> bool {
    let mut rest = text;
    for _ in 0..6 {
        let Some(colon) = rest.find(':') else {
            return false;
        };
        let group = &rest[..colon];
        if !is_hex_group(group) {
            return false;
        }
        rest = &rest[colon + 1..];
    }

    let tail = rest.as_bytes();
    let leading = tail.first() == Some(&b'0') && {
        let digits = tail[1..].iter().take_while(|b| b.is_ascii_digit()).count();
        digits > 0 && tail.get(1 + digits) == Some(&b'.')
    };
    let inner = tail
        .windows(3)
        .any(|w| w[0] == b'.' && w[1] == b'0' && w[2].is_ascii_digit());

    leading || inner
}

fn is_hex_group(group: &str) -> bool {
    (1..=4).contains(&group.len()) && group.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Tokenized IPv6 literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ipv6Text {
    value: u128,
    /// Groups written out, a dotted-quad tail counting as two
    explicit_groups: usize,
    /// Contains `::`
    compressed: bool,
    /// Ends in a dotted quad
    dotted_tail: bool,
    /// Ends in `::`
    open_tail: bool,
}

impl Ipv6Text {
    fn parse(text: &str) -> Option<Self> {
        if !text.contains(':') {
            return None;
        }

        let mut left = Vec::with_capacity(8);
        let mut right = Vec::with_capacity(8);

        let (compressed, dotted_tail, open_tail) = match text.find("::") {
            Some(pos) => {
                let head = &text[..pos];
                let tail = &text[pos + 2..];
                if tail.starts_with(':') || tail.contains("::") {
                    return None;
                }
                parse_groups(head, false, &mut left)?;
                let dotted = parse_groups(tail, true, &mut right)?;
                (true, dotted, tail.is_empty())
            }
            None => (false, parse_groups(text, true, &mut left)?, false),
        };

        let explicit_groups = left.len() + right.len();
        if (compressed && explicit_groups > 7) || (!compressed && explicit_groups != 8) {
            return None;
        }

        let zero_fill = 8 - explicit_groups;
        let value = left
            .iter()
            .copied()
            .chain(iter::repeat(0u16).take(zero_fill))
            .chain(right.iter().copied())
            .fold(0u128, |acc, group| (acc << 16) | u128::from(group));

        Some(Ipv6Text {
            value,
            explicit_groups,
            compressed,
            dotted_tail,
            open_tail,
        })
    }

    /// Pick the table and key for a parsed literal.
    fn resolve(&self) -> (AddressFamily, u128) {
        let v = self.value;

        // ::ffff:a.b.c.d
        if v >> 32 == 0xffff {
            return (AddressFamily::V4, v & IPV4_MASK);
        }
        if (SIX_TO_FOUR_FIRST..=SIX_TO_FOUR_LAST).contains(&v) {
            return (AddressFamily::V4, (v >> 80) & IPV4_MASK);
        }
        // Teredo stores the client address one's-complemented
        if (TEREDO_FIRST..=TEREDO_LAST).contains(&v) {
            return (AddressFamily::V4, !v & IPV4_MASK);
        }

        if self.compressed && self.explicit_groups == 0 {
            return (AddressFamily::V4, v);
        }

        let embedded_v4 = if self.dotted_tail {
            self.compressed && self.explicit_groups == 2
        } else {
            v >> 32 == 0 && !self.open_tail
        };
        if embedded_v4 {
            return (AddressFamily::V4, v);
        }

        (AddressFamily::V6, v)
    }
}

/// Parse one side of a `::` split into 16-bit groups. Returns whether the
/// side ended in a dotted quad.
fn parse_groups(side: &str, allow_dotted_tail: bool, out: &mut Vec<u16>) -> Option<bool> {
    if side.is_empty() {
        return Some(false);
    }

    let mut tokens = side.split(':').peekable();
    let mut dotted = false;
    while let Some(token) = tokens.next() {
        let last = tokens.peek().is_none();
        if last && allow_dotted_tail && token.contains('.') {
            let v4 = parse_dotted_quad(token)?;
            out.push((v4 >> 16) as u16);
            out.push(v4 as u16);
            dotted = true;
        } else if is_hex_group(token) {
            out.push(u16::from_str_radix(token, 16).ok()?);
        } else {
            return None;
        }
        if out.len() > 8 {
            return None;
        }
    }

    Some(dotted)
}
