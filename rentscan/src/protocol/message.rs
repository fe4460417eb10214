// rentscan/src/protocol/message.rs
//! Rental message carried over the RX/TX characteristics.
//!
//! Layout is the peer firmware's packed-by-alignment C struct, little-endian:
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 1    | cmd          |
//! | 1      | 1    | status       |
//! | 2      | 16   | tag_id       |
//! | 18     | 1    | tag_id_len   |
//! | 20     | 4    | timestamp    |
//! | 24     | 4    | duration     |
//! | 28     | 128  | payload      |
//! | 156    | 1    | payload_len  |
//!
//! Bytes 19 and 157..160 are padding and written as zero.

use std::convert::TryFrom;

use crate::constants::{MAX_MSG_PAYLOAD, MAX_TAG_ID_LEN};
use crate::protocol::parser::{bounded_len_at, byte_at, ensure_len, le_u32_at, slice_at};
use crate::types::TagId;
use crate::{Error, Result};

/// Encoded size of one message.
pub const MESSAGE_LEN: usize = 160;

const OFF_CMD: usize = 0;
const OFF_STATUS: usize = 1;
const OFF_TAG_ID: usize = 2;
const OFF_TAG_ID_LEN: usize = 18;
const OFF_TIMESTAMP: usize = 20;
const OFF_DURATION: usize = 24;
const OFF_PAYLOAD: usize = 28;
const OFF_PAYLOAD_LEN: usize = 156;

/// Command byte of a [`RentalMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    RentalStart,
    RentalEnd,
    StatusRequest,
    StatusResponse,
    Error,
}

impl Command {
    pub fn code(&self) -> u8 {
        match self {
            Command::RentalStart => 0x01,
            Command::RentalEnd => 0x02,
            Command::StatusRequest => 0x03,
            Command::StatusResponse => 0x04,
            Command::Error => 0xFF,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0x01 => Ok(Command::RentalStart),
            0x02 => Ok(Command::RentalEnd),
            0x03 => Ok(Command::StatusRequest),
            0x04 => Ok(Command::StatusResponse),
            0xFF => Ok(Command::Error),
            other => Err(Error::UnknownCommand(other)),
        }
    }
}

/// Rental state carried in the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RentalStatus {
    #[default]
    Available,
    Rented,
    Expired,
    Error,
}

impl RentalStatus {
    pub fn code(&self) -> u8 {
        match self {
            RentalStatus::Available => 0x00,
            RentalStatus::Rented => 0x01,
            RentalStatus::Expired => 0x02,
            RentalStatus::Error => 0xFF,
        }
    }
}

impl TryFrom<u8> for RentalStatus {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(RentalStatus::Available),
            0x01 => Ok(RentalStatus::Rented),
            0x02 => Ok(RentalStatus::Expired),
            0xFF => Ok(RentalStatus::Error),
            other => Err(Error::UnknownStatus(other)),
        }
    }
}

/// One rental protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalMessage {
    pub cmd: Command,
    pub status: RentalStatus,
    pub tag_id: TagId,
    /// Unix seconds.
    pub timestamp: u32,
    /// Rental duration in seconds.
    pub duration: u32,
    payload: Vec<u8>,
}

impl RentalMessage {
    /// Message with empty tag, timing and payload.
    pub fn new(cmd: Command, status: RentalStatus) -> Self {
        Self {
            cmd,
            status,
            tag_id: TagId::default(),
            timestamp: 0,
            duration: 0,
            payload: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag_id: TagId) -> Self {
        self.tag_id = tag_id;
        self
    }

    pub fn with_timing(mut self, timestamp: u32, duration: u32) -> Self {
        self.timestamp = timestamp;
        self.duration = duration;
        self
    }

    /// Fails with [`Error::FieldTooLong`] past the payload capacity.
    pub fn with_payload(mut self, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_MSG_PAYLOAD {
            return Err(Error::FieldTooLong {
                field: "payload",
                max: MAX_MSG_PAYLOAD,
                actual: payload.len(),
            });
        }
        self.payload = payload.to_vec();
        Ok(self)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Fixed-size little-endian wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; MESSAGE_LEN];
        buf[OFF_CMD] = self.cmd.code();
        buf[OFF_STATUS] = self.status.code();
        let tag = self.tag_id.as_bytes();
        buf[OFF_TAG_ID..OFF_TAG_ID + tag.len()].copy_from_slice(tag);
        buf[OFF_TAG_ID_LEN] = tag.len() as u8;
        buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[OFF_DURATION..OFF_DURATION + 4].copy_from_slice(&self.duration.to_le_bytes());
        buf[OFF_PAYLOAD..OFF_PAYLOAD + self.payload.len()].copy_from_slice(&self.payload);
        buf[OFF_PAYLOAD_LEN] = self.payload.len() as u8;
        buf
    }

    /// Decode one message. Bytes past [`MESSAGE_LEN`] are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, MESSAGE_LEN)?;
        let cmd = Command::try_from(byte_at(data, OFF_CMD)?)?;
        let status = RentalStatus::try_from(byte_at(data, OFF_STATUS)?)?;

        let tag_len = bounded_len_at(data, OFF_TAG_ID_LEN, MAX_TAG_ID_LEN, "tag_id")?;
        let tag_id = TagId::try_from(slice_at(data, OFF_TAG_ID, tag_len)?)?;

        let payload_len = bounded_len_at(data, OFF_PAYLOAD_LEN, MAX_MSG_PAYLOAD, "payload")?;
        let payload = slice_at(data, OFF_PAYLOAD, payload_len)?.to_vec();

        Ok(Self {
            cmd,
            status,
            tag_id,
            timestamp: le_u32_at(data, OFF_TIMESTAMP)?,
            duration: le_u32_at(data, OFF_DURATION)?,
            payload,
        })
    }
}

impl TryFrom<&[u8]> for RentalMessage {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::decode(data)
    }
}
