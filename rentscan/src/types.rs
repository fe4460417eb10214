// rentscan/src/types.rs
//! Small value types shared across the crate.

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use derive_more::{Display, From};

use crate::Error;
use crate::constants::MAX_TAG_ID_LEN;

/// GATT attribute handle - Newtype Pattern (u16)
#[derive(Debug, Display, From, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{:#06x}", _0)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Handle(u16);

impl Handle {
    pub const FIRST: Self = Self(0x0001);
    pub const LAST: Self = Self(0xffff);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Handle `offset` attributes further on, `None` past the end of the table.
    pub fn offset(&self, offset: u16) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }

    pub fn next(&self) -> Option<Self> {
        self.offset(1)
    }
}

/// Connection identity as assigned by the transport.
#[derive(Debug, Display, From, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "conn#{}", _0)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnHandle(u16);

impl ConnHandle {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

/// BLE address type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressKind {
    Public,
    #[default]
    Random,
}

/// BLE device address, stored most significant byte first (display order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    bytes: [u8; 6],
    kind: AddressKind,
}

impl Address {
    pub const fn new(bytes: [u8; 6], kind: AddressKind) -> Self {
        Self { bytes, kind }
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )?;
        match self.kind {
            AddressKind::Public => write!(f, " (public)"),
            AddressKind::Random => write!(f, " (random)"),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Accepts `AA:BB:CC:DD:EE:FF`, optionally followed by `random`/`public`
    /// (bare or in parentheses). Defaults to a random address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let addr = parts
            .next()
            .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;

        let kind = match parts.next().map(|k| k.trim_matches(|c| c == '(' || c == ')')) {
            None | Some("random") => AddressKind::Random,
            Some("public") => AddressKind::Public,
            Some(_) => return Err(Error::InvalidAddress(s.to_string())),
        };
        if parts.next().is_some() {
            return Err(Error::InvalidAddress(s.to_string()));
        }

        let octets: Vec<&str> = addr.split(':').collect();
        if octets.len() != 6 {
            return Err(Error::InvalidAddress(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (slot, octet) in bytes.iter_mut().zip(octets) {
            if octet.len() != 2 {
                return Err(Error::InvalidAddress(s.to_string()));
            }
            let parsed =
                crate::utils::parse_hex(octet).map_err(|_| Error::InvalidAddress(s.to_string()))?;
            *slot = parsed[0];
        }
        Ok(Self { bytes, kind })
    }
}

/// Notification vs indication on the subscribed characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NotifyKind {
    #[default]
    Notify,
    Indicate,
}

impl NotifyKind {
    /// Value written to the CCC descriptor to enable this kind.
    pub fn ccc_value(&self) -> u16 {
        match self {
            NotifyKind::Notify => 0x0001,
            NotifyKind::Indicate => 0x0002,
        }
    }
}

/// Raw NFC tag identifier (at most 16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TagId {
    bytes: [u8; MAX_TAG_ID_LEN],
    len: u8,
}

impl TagId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lowercase hex of the tag bytes.
    pub fn to_hex(&self) -> String {
        crate::utils::bytes_to_hex(self.as_bytes())
    }
}

impl TryFrom<&[u8]> for TagId {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() > MAX_TAG_ID_LEN {
            return Err(Error::FieldTooLong {
                field: "tag_id",
                max: MAX_TAG_ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; MAX_TAG_ID_LEN];
        arr[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: arr,
            len: bytes.len() as u8,
        })
    }
}
