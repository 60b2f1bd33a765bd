//!# Properties
//! Status, bit-rate, counters and device/library metadata are exchanged with the
//! transport as property buffers keyed by a fixed set of identifiers.
//! Numbers are encoded little-endian, strings NUL-terminated.
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Maximum size of a property buffer (strings included)
pub const MAX_BUFFER_SIZE: usize = 256;

/// Property identifiers
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum Property {
    /// Version of the wrapper specification (u16, major << 8 | minor)
    Spec = 0,
    /// Version of the library (u16, major << 8 | minor)
    Version = 1,
    /// Patch number of the library (u8)
    PatchNo = 2,
    /// Build number of the library (u32)
    BuildNo = 3,
    /// Library id (i32)
    LibraryId = 4,
    /// Library vendor name (string)
    LibraryVendor = 5,
    /// Library file name (string)
    LibraryDllName = 6,
    /// Device type (i32)
    DeviceType = 10,
    /// Device name (string)
    DeviceName = 11,
    /// Device vendor name (string)
    DeviceVendor = 12,
    /// Device driver name (string)
    DeviceDllName = 13,
    /// Supported operation modes (u8)
    OpCapability = 15,
    /// Active operation mode (u8)
    OpMode = 16,
    /// Bit-rate registers (see [crate::bitrate::Bitrate::to_bytes])
    Bitrate = 17,
    /// Transmission speed (see [crate::bitrate::Speed::to_bytes])
    Speed = 18,
    /// Status register (u8)
    Status = 19,
    /// Bus load in percent (u8)
    BusLoad = 20,
    /// Transmitted frames counter (u64)
    TxCounter = 24,
    /// Received frames counter (u64)
    RxCounter = 25,
    /// Received error frames counter (u64)
    ErrCounter = 26,
    /// Hardware version (string)
    HardwareVersion = 30,
    /// Firmware version (string)
    FirmwareVersion = 31,
    /// Rewind the channel list (library, no value)
    SetFirstChannel = 32,
    /// Advance in the channel list (library, no value)
    SetNextChannel = 33,
    /// Channel number of the current list entry (i32)
    ChannelNo = 34,
    /// Channel name of the current list entry (string)
    ChannelName = 35,
    /// Driver name of the current list entry (string)
    ChannelDllName = 36,
    /// Vendor name of the current list entry (string)
    ChannelVendorName = 38,
}

impl Property {
    pub const ALL: [Property; 28] = [
        Self::Spec,
        Self::Version,
        Self::PatchNo,
        Self::BuildNo,
        Self::LibraryId,
        Self::LibraryVendor,
        Self::LibraryDllName,
        Self::DeviceType,
        Self::DeviceName,
        Self::DeviceVendor,
        Self::DeviceDllName,
        Self::OpCapability,
        Self::OpMode,
        Self::Bitrate,
        Self::Speed,
        Self::Status,
        Self::BusLoad,
        Self::TxCounter,
        Self::RxCounter,
        Self::ErrCounter,
        Self::HardwareVersion,
        Self::FirmwareVersion,
        Self::SetFirstChannel,
        Self::SetNextChannel,
        Self::ChannelNo,
        Self::ChannelName,
        Self::ChannelDllName,
        Self::ChannelVendorName,
    ];

    pub fn id(&self) -> u16 {
        *self as u16
    }

    /// Property for a raw identifier, `None` if unknown
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|property| property.id() == id)
    }
}

/// Statistical counters, reset on start
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub transmitted: u64,
    pub received: u64,
    pub errors: u64,
}

/// Device information
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: i32,
    pub name: String,
    pub vendor: String,
}

/// Library information
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub id: i32,
    pub name: String,
    pub vendor: String,
}

/// Entry of the channel list
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel: i32,
    pub name: String,
    pub vendor: String,
    pub driver: String,
}

/// Version triple
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    /// Decodes a `major << 8 | minor` word
    pub fn from_word(word: u16, patch: u8) -> Self {
        Self {
            major: (word >> 8) as u8,
            minor: (word & 0xFF) as u8,
            patch,
        }
    }

    pub fn as_word(&self) -> u16 {
        ((self.major as u16) << 8) | self.minor as u16
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Decodes a NUL-terminated string, invalid UTF-8 is replaced
pub fn decode_string(buffer: &[u8]) -> String {
    let end = buffer.iter().position(|b| *b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}

/// Encodes a string into a NUL-terminated property buffer, `None` if it doesn't fit
pub fn encode_string(value: &str, buffer: &mut [u8]) -> Option<()> {
    let bytes = value.as_bytes();
    if bytes.len() >= buffer.len() {
        return None;
    }

    buffer[..bytes.len()].copy_from_slice(bytes);
    buffer[bytes.len()] = 0;
    Some(())
}

pub(crate) fn read_u16(buffer: &[u8]) -> u16 {
    LittleEndian::read_u16(buffer)
}

pub(crate) fn read_i32(buffer: &[u8]) -> i32 {
    LittleEndian::read_i32(buffer)
}

pub(crate) fn read_u64(buffer: &[u8]) -> u64 {
    LittleEndian::read_u64(buffer)
}
