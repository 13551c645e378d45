//! Validated numeric source addresses.
//!
//! Upstream capture hands addresses over as plain numeric strings. Parsing
//! is done once at that boundary; a malformed address is rejected with an
//! explicit error instead of being folded into a shared fallback key, so
//! unrelated flows can never alias onto one record.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use thiserror::Error;

/// Error returned when a source address cannot be validated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrError {
    #[error("source address is not in numeric form: {0:?}")]
    NotNumeric(String),
}

/// A source address already validated into its numeric form.
///
/// The inner value is the address as a host-order integer, the same form
/// the correlation key packs into its upper bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumericAddr(u32);

impl NumericAddr {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl FromStr for NumericAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(Self)
            .map_err(|_| AddrError::NotNumeric(s.to_string()))
    }
}

impl From<Ipv4Addr> for NumericAddr {
    fn from(addr: Ipv4Addr) -> Self {
        Self(u32::from(addr))
    }
}

impl From<NumericAddr> for u32 {
    fn from(addr: NumericAddr) -> u32 {
        addr.0
    }
}

impl fmt::Display for NumericAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
