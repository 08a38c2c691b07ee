//! # Frame codec for the PWA controller UART protocol
//!
//! Every request is a short fixed-size frame: a command byte, a 16-bit
//! parameter id, an optional 32-bit value and a one-byte checksum. The
//! checksum is the wrapping sum of every other byte of the frame, seeded with
//! [`CHECKSUM_SEED`].
//!
//! Two controller revisions disagree on byte order. [`WireOrder::HeaderFirst`]
//! puts the command byte first and the checksum last, with big-endian fields:
//!
//! ```text
//!  GET   [cmd, id_hi, id_lo, cs]
//!  PUT   [cmd, id_hi, id_lo, v3, v2, v1, v0, cs]
//!  DATA  [0x33, id_hi, id_lo, v3, v2, v1, v0, cs]
//!  SHORT [status, cs]
//! ```
//!
//! [`WireOrder::TrailerFirst`] is the exact byte reversal of the above, so the
//! checksum leads and multi-byte fields are little-endian.
//!
//! Field positions are kept in [`FrameLayout`] tables indexed by wire order;
//! encode and decode never branch on the order themselves.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::warn;

use crate::constants::{
    CHECKSUM_SEED, CMD_DATA, CMD_GET1, CMD_PUT1, DATA_REPLY_LEN, GET_FRAME_LEN, SET_FRAME_LEN, SHORT_REPLY_LEN,
    VALUE_LEN,
};
use crate::error::DecodeError;
use crate::status::DeviceStatus;

/// Byte-position convention of a controller revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum WireOrder {
    #[default]
    HeaderFirst,
    TrailerFirst,
}

/// Offsets of each field inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub len: usize,
    pub command: usize,
    pub param_high: usize,
    pub param_low: usize,
    /// First byte of the 4-byte value field, if the frame carries one
    pub value: Option<usize>,
    pub checksum: usize,
    pub value_big_endian: bool,
}

#[rustfmt::skip]
const HEADER_FIRST_SHORT: FrameLayout = FrameLayout {
    len: GET_FRAME_LEN, command: 0, param_high: 1, param_low: 2, value: None, checksum: 3, value_big_endian: true,
};
#[rustfmt::skip]
const HEADER_FIRST_LONG: FrameLayout = FrameLayout {
    len: SET_FRAME_LEN, command: 0, param_high: 1, param_low: 2, value: Some(3), checksum: 7, value_big_endian: true,
};
#[rustfmt::skip]
const TRAILER_FIRST_SHORT: FrameLayout = FrameLayout {
    len: GET_FRAME_LEN, command: 3, param_high: 2, param_low: 1, value: None, checksum: 0, value_big_endian: false,
};
#[rustfmt::skip]
const TRAILER_FIRST_LONG: FrameLayout = FrameLayout {
    len: SET_FRAME_LEN, command: 7, param_high: 6, param_low: 5, value: Some(1), checksum: 0, value_big_endian: false,
};

impl WireOrder {
    /// Layout of a frame without a value field (GET requests)
    pub const fn short_layout(self) -> FrameLayout {
        match self {
            WireOrder::HeaderFirst => HEADER_FIRST_SHORT,
            WireOrder::TrailerFirst => TRAILER_FIRST_SHORT,
        }
    }

    /// Layout of a frame with a value field (PUT requests, DATA replies)
    pub const fn long_layout(self) -> FrameLayout {
        match self {
            WireOrder::HeaderFirst => HEADER_FIRST_LONG,
            WireOrder::TrailerFirst => TRAILER_FIRST_LONG,
        }
    }

    fn layout_for(self, len: usize) -> Option<FrameLayout> {
        match len {
            GET_FRAME_LEN => Some(self.short_layout()),
            SET_FRAME_LEN => Some(self.long_layout()),
            _ => None,
        }
    }

    /// Index of the status byte inside a 2-byte short reply
    pub const fn status_index(self) -> usize {
        match self {
            WireOrder::HeaderFirst => 0,
            WireOrder::TrailerFirst => 1,
        }
    }

    /// Index of the checksum byte inside a 2-byte short reply
    pub const fn short_checksum_index(self) -> usize {
        SHORT_REPLY_LEN - 1 - self.status_index()
    }

    /// Short-reply statuses this revision defines.
    ///
    /// NOT_ALLOWED (0x36) only exists in the header-first constant table.
    pub fn defines(self, status: DeviceStatus) -> bool {
        match status {
            DeviceStatus::Data => false,
            DeviceStatus::NotAllowed => self == WireOrder::HeaderFirst,
            _ => true,
        }
    }

    /// Map a raw byte to a short-reply status, if this revision defines it
    pub fn status_of(self, byte: u8) -> Option<DeviceStatus> {
        DeviceStatus::try_from(byte).ok().filter(|s| self.defines(*s))
    }
}

/// Seeded 8-bit sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(CHECKSUM_SEED, |acc, b| acc.wrapping_add(*b))
}

/// Seeded 8-bit sum of every byte of `frame` except the one at `skip`.
pub fn checksum_excluding(frame: &[u8], skip: usize) -> u8 {
    frame
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .fold(CHECKSUM_SEED, |acc, (_, b)| acc.wrapping_add(*b))
}

fn read_value(frame: &[u8], layout: &FrameLayout) -> Option<i32> {
    let at = layout.value?;
    let mut raw = [0u8; VALUE_LEN];
    raw.copy_from_slice(&frame[at..at + VALUE_LEN]);
    Some(if layout.value_big_endian {
        i32::from_be_bytes(raw)
    } else {
        i32::from_le_bytes(raw)
    })
}

fn read_param_id(frame: &[u8], layout: &FrameLayout) -> u16 {
    u16::from_be_bytes([frame[layout.param_high], frame[layout.param_low]])
}

/// An outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: u8,
    pub param_id: u16,
    pub payload: Option<i32>,
}

impl CommandFrame {
    pub fn get(param_id: u16) -> Self {
        Self {
            command: CMD_GET1,
            param_id,
            payload: None,
        }
    }

    pub fn put(param_id: u16, value: i32) -> Self {
        Self {
            command: CMD_PUT1,
            param_id,
            payload: Some(value),
        }
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        self.layout(WireOrder::HeaderFirst).len
    }

    fn layout(&self, order: WireOrder) -> FrameLayout {
        if self.payload.is_some() {
            order.long_layout()
        } else {
            order.short_layout()
        }
    }

    pub fn encode(&self, order: WireOrder) -> Bytes {
        let layout = self.layout(order);
        let mut frame = BytesMut::zeroed(layout.len);

        frame[layout.command] = self.command;
        let [high, low] = self.param_id.to_be_bytes();
        frame[layout.param_high] = high;
        frame[layout.param_low] = low;

        if let (Some(value), Some(at)) = (self.payload, layout.value) {
            let raw = if layout.value_big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            frame[at..at + VALUE_LEN].copy_from_slice(&raw);
        }

        frame[layout.checksum] = checksum_excluding(&frame, layout.checksum);
        frame.freeze()
    }

    /// Parse and checksum-verify an encoded request
    pub fn decode(bytes: &[u8], order: WireOrder) -> Result<Self, DecodeError> {
        // anything longer than a GET frame is measured against a PUT frame
        let layout = order.layout_for(bytes.len()).ok_or(DecodeError::InvalidLength {
            expected: if bytes.len() > GET_FRAME_LEN {
                SET_FRAME_LEN
            } else {
                GET_FRAME_LEN
            },
            actual: bytes.len(),
        })?;

        let expected = checksum_excluding(bytes, layout.checksum);
        let actual = bytes[layout.checksum];
        if expected != actual {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            command: bytes[layout.command],
            param_id: read_param_id(bytes, &layout),
            payload: read_value(bytes, &layout),
        })
    }
}

/// A decoded DATA reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataReply {
    /// Parameter id echoed by the device
    pub param_id: u16,
    pub value: i32,
    pub status: DeviceStatus,
}

/// Stateless encoder/decoder bound to one wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCodec {
    wire_order: WireOrder,
    enforce_param_id_match: bool,
    verify_reply_checksum: bool,
}

impl FrameCodec {
    pub fn new(wire_order: WireOrder) -> Self {
        Self {
            wire_order,
            ..Self::default()
        }
    }

    /// Reject DATA replies whose echoed id differs from the requested one.
    ///
    /// Off by default: the controller link historically accepted any echo.
    pub fn with_param_id_check(mut self, enforce: bool) -> Self {
        self.enforce_param_id_match = enforce;
        self
    }

    /// Verify the trailing checksum byte of replies
    pub fn with_reply_checksum(mut self, verify: bool) -> Self {
        self.verify_reply_checksum = verify;
        self
    }

    pub fn wire_order(&self) -> WireOrder {
        self.wire_order
    }

    pub fn enforces_param_id_match(&self) -> bool {
        self.enforce_param_id_match
    }

    pub fn verifies_reply_checksum(&self) -> bool {
        self.verify_reply_checksum
    }

    pub fn encode_get(&self, param_id: u16) -> [u8; GET_FRAME_LEN] {
        let mut out = [0u8; GET_FRAME_LEN];
        out.copy_from_slice(&CommandFrame::get(param_id).encode(self.wire_order));
        out
    }

    pub fn encode_set(&self, param_id: u16, value: i32) -> [u8; SET_FRAME_LEN] {
        let mut out = [0u8; SET_FRAME_LEN];
        out.copy_from_slice(&CommandFrame::put(param_id, value).encode(self.wire_order));
        out
    }

    /// Byte that identifies a DATA reply (the command echo)
    pub fn data_command_byte(&self, frame: &[u8]) -> Option<u8> {
        frame.get(self.wire_order.long_layout().command).copied()
    }

    /// True when `frame` has the length and command echo of a DATA reply
    pub fn is_data_reply(&self, frame: &[u8]) -> bool {
        frame.len() == DATA_REPLY_LEN && self.data_command_byte(frame) == Some(CMD_DATA)
    }

    /// Status carried by a complete 2-byte short reply, if it is one
    pub fn short_reply_status(&self, frame: &[u8]) -> Option<DeviceStatus> {
        if frame.len() != SHORT_REPLY_LEN {
            return None;
        }
        self.wire_order.status_of(frame[self.wire_order.status_index()])
    }

    /// True when the trailer of a 2-byte short reply is the seeded sum of its status
    pub fn short_reply_checksum_ok(&self, frame: &[u8]) -> bool {
        frame.len() == SHORT_REPLY_LEN
            && frame[self.wire_order.short_checksum_index()] == checksum(&[frame[self.wire_order.status_index()]])
    }

    pub fn decode_data_reply(&self, frame: &[u8], expected_param_id: u16) -> Result<DataReply, DecodeError> {
        if frame.len() != DATA_REPLY_LEN {
            return Err(DecodeError::InvalidLength {
                expected: DATA_REPLY_LEN,
                actual: frame.len(),
            });
        }

        let layout = self.wire_order.long_layout();
        let command = frame[layout.command];
        if command != CMD_DATA {
            return Err(match self.wire_order.status_of(command) {
                Some(status) => DecodeError::DeviceStatus(status),
                None => DecodeError::UnexpectedCommand(command),
            });
        }

        if self.verify_reply_checksum {
            let expected = checksum_excluding(frame, layout.checksum);
            let actual = frame[layout.checksum];
            if expected != actual {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }

        let received = read_param_id(frame, &layout);
        if received != expected_param_id {
            if self.enforce_param_id_match {
                return Err(DecodeError::ParamIdMismatch {
                    expected: expected_param_id,
                    received,
                });
            }
            warn!(expected = expected_param_id, received, "DATA reply echoed a different parameter id");
        }

        let value = read_value(frame, &layout).unwrap_or_default();
        Ok(DataReply {
            param_id: received,
            value,
            status: DeviceStatus::Data,
        })
    }

    /// Map a 1- or 2-byte short reply to its device status
    pub fn decode_error_reply(&self, frame: &[u8]) -> Result<DeviceStatus, DecodeError> {
        let status_byte = match frame.len() {
            1 => frame[0],
            SHORT_REPLY_LEN => {
                if self.verify_reply_checksum && !self.short_reply_checksum_ok(frame) {
                    return Err(DecodeError::ChecksumMismatch {
                        expected: checksum(&[frame[self.wire_order.status_index()]]),
                        actual: frame[self.wire_order.short_checksum_index()],
                    });
                }
                frame[self.wire_order.status_index()]
            }
            actual => {
                return Err(DecodeError::InvalidLength {
                    expected: SHORT_REPLY_LEN,
                    actual,
                });
            }
        };

        self.wire_order
            .status_of(status_byte)
            .ok_or(DecodeError::UnknownStatus(status_byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_mirror_each_other() {
        for (a, b) in [
            (HEADER_FIRST_SHORT, TRAILER_FIRST_SHORT),
            (HEADER_FIRST_LONG, TRAILER_FIRST_LONG),
        ] {
            let last = a.len - 1;
            assert_eq!(a.command, last - b.command);
            assert_eq!(a.param_high, last - b.param_high);
            assert_eq!(a.param_low, last - b.param_low);
            assert_eq!(a.checksum, last - b.checksum);
        }
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[]), 0xA5);
        assert_eq!(checksum(&[0x5B]), 0x00);
        assert_eq!(checksum(&[0xFF, 0xFF]), 0xA3);
    }

    #[test]
    fn short_reply_indices() {
        assert_eq!(WireOrder::HeaderFirst.status_index(), 0);
        assert_eq!(WireOrder::HeaderFirst.short_checksum_index(), 1);
        assert_eq!(WireOrder::TrailerFirst.status_index(), 1);
        assert_eq!(WireOrder::TrailerFirst.short_checksum_index(), 0);
    }

    #[test]
    fn not_allowed_is_header_first_only() {
        assert_eq!(WireOrder::HeaderFirst.status_of(0x36), Some(DeviceStatus::NotAllowed));
        assert_eq!(WireOrder::TrailerFirst.status_of(0x36), None);
        assert_eq!(WireOrder::TrailerFirst.status_of(0x37), Some(DeviceStatus::Done));
        assert_eq!(WireOrder::HeaderFirst.status_of(CMD_DATA), None);
    }

    #[test]
    fn wire_order_names() {
        assert_eq!(WireOrder::TrailerFirst.to_string(), "trailer-first");
        assert_eq!(WireOrder::default(), WireOrder::HeaderFirst);
    }
}
