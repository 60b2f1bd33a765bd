//!# CAN Message
//! This library supports both CAN2.0 (up to 8 data bytes per CAN Frame)
//! and CAN FD (up to 64 data bytes per CAN frame)
//! formats with both standard and extended frame ID formats.
//!
//! The data length code is always derived from the payload: byte counts without a
//! defined CAN FD length are rounded up to the next one.
//!
//! ## CAN 2.0 message construction example
//! ```
//!# use bytes::Bytes;
//!# use canapi::message::{Message, MessageFlags, DLC};
//!# use embedded_can::{Id, StandardId};
//!#
//! let message_id = Id::Standard(StandardId::new(0x123).unwrap());
//! let message = Message::new(message_id, MessageFlags::STANDARD, Bytes::from_static(&[1, 2, 3])).unwrap();
//!
//! assert_eq!(message.dlc(), DLC::Three);
//! ```
//! ## CAN FD message construction example
//! ```
//!# use bytes::Bytes;
//!# use canapi::message::{Message, MessageFlags, DLC};
//!# use embedded_can::{Id, ExtendedId};
//!#
//! let message_id = Id::Extended(ExtendedId::new(0x1ABC_DEF0).unwrap());
//! // 22 bytes is not a defined CAN FD length, DLC will be 24 bytes
//! let flags = MessageFlags::FD_LONG | MessageFlags::FD_FAST;
//! let message = Message::new(message_id, flags, Bytes::from(vec![0u8; 22])).unwrap();
//!
//! assert_eq!(message.dlc(), DLC::TwentyFour);
//! assert!(message.flags().is_extended_frame());
//! assert_eq!(message.to_frame().payload().len(), 24);
//! ```

use crate::error::Error;
use bitflags::bitflags;
use bytes::Bytes;
use core::time::Duration;
use embedded_can::{ExtendedId, Frame, Id, StandardId};
use log::debug;
use serde::{Deserialize, Serialize};

/// Highest 11-bit identifier
pub const CAN_MAX_STD_ID: u32 = 0x7FF;

/// Highest 29-bit identifier
pub const CAN_MAX_XTD_ID: u32 = 0x1FFF_FFFF;

pub const MAX_PAYLOAD_CAN_2_0: usize = 8;

pub const MAX_PAYLOAD_CAN_FD: usize = 64;

/// Data length code
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum DLC {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Twelve,
    Sixteen,
    Twenty,
    TwentyFour,
    ThirtyTwo,
    FortyEight,
    SixtyFour,
}

/// Possible errors when creating a [Message]
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MessageError {
    /// Payload length invalid for the frame format
    #[error("invalid payload length ({0} bytes)")]
    InvalidLength(usize),
    /// Identifier out of range for the frame format
    #[error("invalid identifier ({0:#x})")]
    InvalidIdentifier(u32),
    /// Data length code above 15
    #[error("invalid data length code ({0})")]
    InvalidCode(u8),
}

impl From<MessageError> for Error {
    fn from(_error: MessageError) -> Self {
        Error::IllegalParameter
    }
}

impl DLC {
    /// Canonical DLC for the given payload length. Without `fd` only 0-8 bytes are accepted,
    /// with `fd` lengths between two defined values are rounded up.
    pub fn from_length(length: usize, fd: bool) -> Result<Self, MessageError> {
        let max = if fd { MAX_PAYLOAD_CAN_FD } else { MAX_PAYLOAD_CAN_2_0 };

        if length > max {
            debug!("Maximum of {max} bytes allowed. Current size: {length} bytes");
            return Err(MessageError::InvalidLength(length));
        }

        let mut length = length;

        // length used to choose the next supported DLC
        while Self::exact(length).is_none() {
            length += 1;
        }

        Self::exact(length).ok_or(MessageError::InvalidLength(length))
    }

    /// DLC for a length that has a code of its own
    fn exact(length: usize) -> Option<Self> {
        let dlc = match length {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Three,
            4 => Self::Four,
            5 => Self::Five,
            6 => Self::Six,
            7 => Self::Seven,
            8 => Self::Eight,
            12 => Self::Twelve,
            16 => Self::Sixteen,
            20 => Self::Twenty,
            24 => Self::TwentyFour,
            32 => Self::ThirtyTwo,
            48 => Self::FortyEight,
            64 => Self::SixtyFour,
            _ => return None,
        };

        Some(dlc)
    }

    /// Decodes the 4-bit wire code. Classic frames carry at most 8 bytes,
    /// so codes above 8 decode to [DLC::Eight] unless `fd` is set.
    pub fn from_code(code: u8, fd: bool) -> Result<Self, MessageError> {
        let dlc = match code {
            0x0 => Self::Zero,
            0x1 => Self::One,
            0x2 => Self::Two,
            0x3 => Self::Three,
            0x4 => Self::Four,
            0x5 => Self::Five,
            0x6 => Self::Six,
            0x7 => Self::Seven,
            0x8 => Self::Eight,
            0x9..=0xF if !fd => Self::Eight,
            0x9 => Self::Twelve,
            0xA => Self::Sixteen,
            0xB => Self::Twenty,
            0xC => Self::TwentyFour,
            0xD => Self::ThirtyTwo,
            0xE => Self::FortyEight,
            0xF => Self::SixtyFour,
            code => return Err(MessageError::InvalidCode(code)),
        };

        Ok(dlc)
    }

    /// 4-bit wire code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Number of payload bytes
    pub fn len(&self) -> usize {
        match self {
            Self::Twelve => 12,
            Self::Sixteen => 16,
            Self::Twenty => 20,
            Self::TwentyFour => 24,
            Self::ThirtyTwo => 32,
            Self::FortyEight => 48,
            Self::SixtyFour => 64,
            classic => *classic as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::Zero
    }
}

bitflags! {
    /// CAN message flags
    #[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MessageFlags: u8 {
        /// Extended format (29-bit identifier)
        const EXTENDED = 0x01;
        /// Remote frame
        const REMOTE = 0x02;
        /// CAN FD format (long frame)
        const FD_LONG = 0x04;
        /// CAN FD bit-rate switching (fast frame)
        const FD_FAST = 0x08;
        /// Error state indicator
        const ERROR_STATE_INDICATOR = 0x10;
        /// Status message
        const STATUS = 0x80;
    }
}

impl MessageFlags {
    /// Standard frame is the absence of all flags
    pub const STANDARD: Self = Self::empty();

    pub fn is_standard_frame(&self) -> bool {
        self.is_empty()
    }

    pub fn is_extended_frame(&self) -> bool {
        self.contains(Self::EXTENDED)
    }

    pub fn is_remote_frame(&self) -> bool {
        self.contains(Self::REMOTE)
    }

    pub fn is_fd_long_frame(&self) -> bool {
        self.contains(Self::FD_LONG)
    }

    pub fn is_fd_fast_frame(&self) -> bool {
        self.contains(Self::FD_FAST)
    }

    pub fn is_error_state_indicator(&self) -> bool {
        self.contains(Self::ERROR_STATE_INDICATOR)
    }

    pub fn is_status_message(&self) -> bool {
        self.contains(Self::STATUS)
    }
}

/// Wire representation exchanged with the transport: one contiguous payload buffer
/// of which the first `DLC.len()` bytes are valid.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RawFrame {
    /// 11-bit or 29-bit identifier
    pub id: u32,
    /// Raw [MessageFlags] bits
    pub flags: u8,
    /// 4-bit data length code
    pub dlc: u8,
    /// Payload buffer, zero padded
    pub data: [u8; MAX_PAYLOAD_CAN_FD],
    /// Reception time stamp
    pub timestamp: Duration,
}

impl Default for RawFrame {
    fn default() -> Self {
        Self {
            id: 0,
            flags: 0,
            dlc: 0,
            data: [0; MAX_PAYLOAD_CAN_FD],
            timestamp: Duration::ZERO,
        }
    }
}

impl RawFrame {
    pub fn flags(&self) -> MessageFlags {
        MessageFlags::from_bits_retain(self.flags)
    }

    /// Payload view as implied by the data length code
    pub fn payload(&self) -> &[u8] {
        let len = match DLC::from_code(self.dlc, self.flags().is_fd_long_frame()) {
            Ok(dlc) => dlc.len(),
            Err(_) => MAX_PAYLOAD_CAN_FD,
        };

        &self.data[..len]
    }
}

/// CAN message
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    /// 11-bit or 29-bit identifier
    pub(crate) id: Id,
    /// Frame flags, [MessageFlags::EXTENDED] always matches the identifier format
    pub(crate) flags: MessageFlags,
    /// Data length code, canonical for the payload length
    pub(crate) dlc: DLC,
    /// Payload bytes
    pub(crate) data: Bytes,
    /// Reception time stamp, zero for messages built locally
    pub(crate) timestamp: Duration,
}

impl Message {
    /// Create new CAN message. The extended flag is taken from the identifier.
    pub fn new(id: Id, flags: MessageFlags, data: Bytes) -> Result<Self, MessageError> {
        let flags = Self::flags_for(id, flags);
        let dlc = DLC::from_length(data.len(), flags.is_fd_long_frame())?;

        Ok(Self {
            id,
            flags,
            dlc,
            data,
            timestamp: Duration::ZERO,
        })
    }

    /// Create new CAN message from a raw identifier, [MessageFlags::EXTENDED] selects the format
    pub fn from_raw_id(raw_id: u32, flags: MessageFlags, data: &[u8]) -> Result<Self, MessageError> {
        let id = raw_identifier(raw_id, flags.is_extended_frame())?;

        Self::new(id, flags, Bytes::copy_from_slice(data))
    }

    /// Create a classic remote frame requesting `dlc` bytes
    pub fn new_remote(id: Id, dlc: DLC) -> Result<Self, MessageError> {
        if dlc.len() > MAX_PAYLOAD_CAN_2_0 {
            return Err(MessageError::InvalidLength(dlc.len()));
        }

        Ok(Self {
            id,
            flags: Self::flags_for(id, MessageFlags::REMOTE),
            dlc,
            data: Bytes::new(),
            timestamp: Duration::ZERO,
        })
    }

    /// Decodes a received frame, copying exactly the bytes implied by its DLC
    pub fn from_frame(frame: &RawFrame) -> Result<Self, MessageError> {
        let flags = frame.flags();
        let id = raw_identifier(frame.id, flags.is_extended_frame())?;
        let dlc = DLC::from_code(frame.dlc, flags.is_fd_long_frame())?;

        let data = if flags.is_remote_frame() {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(&frame.data[..dlc.len()])
        };

        Ok(Self {
            id,
            flags,
            dlc,
            data,
            timestamp: frame.timestamp,
        })
    }

    /// Encodes the message into its wire representation, padding the payload up to the DLC length
    pub fn to_frame(&self) -> RawFrame {
        let mut frame = RawFrame {
            id: self.raw_id(),
            flags: self.flags.bits(),
            dlc: self.dlc.code(),
            timestamp: self.timestamp,
            ..Default::default()
        };
        frame.data[..self.data.len()].copy_from_slice(&self.data);
        frame
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Identifier as raw 11-bit or 29-bit value
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(sid) => sid.as_raw() as u32,
            Id::Extended(eid) => eid.as_raw(),
        }
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    pub fn dlc(&self) -> DLC {
        self.dlc
    }

    /// Returns payload as a `&[u8]`
    pub fn payload(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    fn flags_for(id: Id, flags: MessageFlags) -> MessageFlags {
        match id {
            Id::Standard(_) => flags.difference(MessageFlags::EXTENDED),
            Id::Extended(_) => flags.union(MessageFlags::EXTENDED),
        }
    }
}

fn raw_identifier(raw_id: u32, extended: bool) -> Result<Id, MessageError> {
    let id = if extended {
        ExtendedId::new(raw_id).map(Id::Extended)
    } else if raw_id <= CAN_MAX_STD_ID {
        StandardId::new(raw_id as u16).map(Id::Standard)
    } else {
        None
    };

    id.ok_or(MessageError::InvalidIdentifier(raw_id))
}

impl Frame for Message {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let flags = if data.len() > MAX_PAYLOAD_CAN_2_0 {
            MessageFlags::FD_LONG
        } else {
            MessageFlags::STANDARD
        };

        Message::new(id.into(), flags, Bytes::copy_from_slice(data)).ok()
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_PAYLOAD_CAN_2_0 {
            return None;
        }

        let dlc = DLC::from_length(dlc, false).ok()?;
        Message::new_remote(id.into(), dlc).ok()
    }

    fn is_extended(&self) -> bool {
        self.flags.is_extended_frame()
    }

    fn is_remote_frame(&self) -> bool {
        self.flags.is_remote_frame()
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc.code() as usize
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}
