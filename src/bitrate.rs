//!# Bit-rate settings
//! A controller is started either with explicit bit-timing register values ([Bitrate])
//! or with an index into the CiA bit-timing table ([CiaIndex]). The two forms never mix.
//!
//! ```
//!# use canapi::bitrate::{Baudrate, BitrateSetting, CiaIndex};
//! let baudrate = Baudrate::Index(CiaIndex::Index250kbps);
//!
//! assert_eq!(BitrateSetting::from(&baudrate), BitrateSetting::Index(-3));
//! ```
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Nominal (arbitration phase) bit-timing registers
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Nominal {
    /// Bit-rate prescaler
    pub brp: u16,
    /// Time segment 1
    pub tseg1: u16,
    /// Time segment 2
    pub tseg2: u16,
    /// Synchronization jump width
    pub sjw: u16,
    /// Number of samples (SJA1000): 0 = single, otherwise triple sampling
    pub sam: u8,
}

/// Data phase bit-timing registers
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataPhase {
    /// Bit-rate prescaler
    pub brp: u16,
    /// Time segment 1
    pub tseg1: u16,
    /// Time segment 2
    pub tseg2: u16,
    /// Synchronization jump width
    pub sjw: u16,
}

/// Bit-timing register form. Register ranges are not checked here, the transport
/// rejects combinations it can't apply.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bitrate {
    /// Controller clock frequency in Hz
    pub frequency: i32,
    pub nominal: Nominal,
    pub data: DataPhase,
}

impl Bitrate {
    /// Encoded size in bytes
    pub const SIZE: usize = 21;

    /// Little-endian encoding used for the bit-rate property
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buffer = [0u8; Self::SIZE];

        LittleEndian::write_i32(&mut buffer[0..4], self.frequency);
        LittleEndian::write_u16(&mut buffer[4..6], self.nominal.brp);
        LittleEndian::write_u16(&mut buffer[6..8], self.nominal.tseg1);
        LittleEndian::write_u16(&mut buffer[8..10], self.nominal.tseg2);
        LittleEndian::write_u16(&mut buffer[10..12], self.nominal.sjw);
        buffer[12] = self.nominal.sam;
        LittleEndian::write_u16(&mut buffer[13..15], self.data.brp);
        LittleEndian::write_u16(&mut buffer[15..17], self.data.tseg1);
        LittleEndian::write_u16(&mut buffer[17..19], self.data.tseg2);
        LittleEndian::write_u16(&mut buffer[19..21], self.data.sjw);

        buffer
    }

    /// Decodes [Bitrate::to_bytes] output, `None` if the buffer is too short
    pub fn from_bytes(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            frequency: LittleEndian::read_i32(&buffer[0..4]),
            nominal: Nominal {
                brp: LittleEndian::read_u16(&buffer[4..6]),
                tseg1: LittleEndian::read_u16(&buffer[6..8]),
                tseg2: LittleEndian::read_u16(&buffer[8..10]),
                sjw: LittleEndian::read_u16(&buffer[10..12]),
                sam: buffer[12],
            },
            data: DataPhase {
                brp: LittleEndian::read_u16(&buffer[13..15]),
                tseg1: LittleEndian::read_u16(&buffer[15..17]),
                tseg2: LittleEndian::read_u16(&buffer[17..19]),
                sjw: LittleEndian::read_u16(&buffer[19..21]),
            },
        })
    }
}

/// CAN 2.0 predefined bit-rates (CiA 301 bit-timing table)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CiaIndex {
    /// 1000 kbit/s with sample-point at 75.0%
    Index1000kbps = 0,
    /// 800 kbit/s with sample-point at 80.0%
    Index800kbps = 1,
    /// 500 kbit/s with sample-point at 87.5%
    Index500kbps = 2,
    /// 250 kbit/s with sample-point at 87.5%
    Index250kbps = 3,
    /// 125 kbit/s with sample-point at 87.5%
    Index125kbps = 4,
    /// 100 kbit/s with sample-point at 87.5%
    Index100kbps = 5,
    /// 50 kbit/s with sample-point at 87.5%
    Index50kbps = 6,
    /// 20 kbit/s with sample-point at 87.5%
    Index20kbps = 7,
    /// 10 kbit/s with sample-point at 87.5%
    Index10kbps = 8,
}

impl CiaIndex {
    pub const ALL: [CiaIndex; 9] = [
        Self::Index1000kbps,
        Self::Index800kbps,
        Self::Index500kbps,
        Self::Index250kbps,
        Self::Index125kbps,
        Self::Index100kbps,
        Self::Index50kbps,
        Self::Index20kbps,
        Self::Index10kbps,
    ];

    /// Transport-level index constant (0 for 1 Mbit/s down to -8 for 10 kbit/s)
    pub fn transport_index(&self) -> i32 {
        -(*self as i32)
    }

    /// Inverse of [CiaIndex::transport_index]
    pub fn from_transport_index(index: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|cia| cia.transport_index() == index)
    }

    /// Nominal bit-rate in kbit/s
    pub fn kbps(&self) -> u32 {
        match self {
            Self::Index1000kbps => 1000,
            Self::Index800kbps => 800,
            Self::Index500kbps => 500,
            Self::Index250kbps => 250,
            Self::Index125kbps => 125,
            Self::Index100kbps => 100,
            Self::Index50kbps => 50,
            Self::Index20kbps => 20,
            Self::Index10kbps => 10,
        }
    }

    pub fn from_kbps(kbps: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|cia| cia.kbps() == kbps)
    }
}

/// Bit-rate argument of the start operation
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baudrate {
    /// Explicit bit-timing registers
    Timing(Bitrate),
    /// Index to the CiA bit-timing table
    Index(CiaIndex),
}

impl Default for Baudrate {
    fn default() -> Self {
        Self::Index(CiaIndex::Index250kbps)
    }
}

impl From<Bitrate> for Baudrate {
    fn from(bitrate: Bitrate) -> Self {
        Self::Timing(bitrate)
    }
}

impl From<CiaIndex> for Baudrate {
    fn from(index: CiaIndex) -> Self {
        Self::Index(index)
    }
}

/// Bit-rate as handed over to the transport
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BitrateSetting {
    /// Transport-level index constant
    Index(i32),
    /// Register values, passed through unchanged
    Timing(Bitrate),
}

impl From<&Baudrate> for BitrateSetting {
    fn from(baudrate: &Baudrate) -> Self {
        match baudrate {
            Baudrate::Timing(bitrate) => Self::Timing(*bitrate),
            Baudrate::Index(index) => Self::Index(index.transport_index()),
        }
    }
}

/// Nominal bus speed as resolved by the controller
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NominalSpeed {
    /// CAN FD operation enabled
    pub fd_operation_enabled: bool,
    /// Bus speed in bit/s
    pub bus_speed: f32,
    /// Sample point in percent
    pub sample_point: f32,
}

/// Data phase bus speed as resolved by the controller
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPhaseSpeed {
    /// Bit-rate switching enabled
    pub bitrate_switching_enabled: bool,
    /// Bus speed in bit/s
    pub bus_speed: f32,
    /// Sample point in percent
    pub sample_point: f32,
}

/// Effective transmission rate, only available from the transport after start
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Speed {
    pub nominal: NominalSpeed,
    pub data: DataPhaseSpeed,
}

impl Speed {
    /// Encoded size in bytes
    pub const SIZE: usize = 18;

    /// Little-endian encoding used for the speed property
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buffer = [0u8; Self::SIZE];

        buffer[0] = self.nominal.fd_operation_enabled as u8;
        LittleEndian::write_f32(&mut buffer[1..5], self.nominal.bus_speed);
        LittleEndian::write_f32(&mut buffer[5..9], self.nominal.sample_point);
        buffer[9] = self.data.bitrate_switching_enabled as u8;
        LittleEndian::write_f32(&mut buffer[10..14], self.data.bus_speed);
        LittleEndian::write_f32(&mut buffer[14..18], self.data.sample_point);

        buffer
    }

    /// Decodes [Speed::to_bytes] output, `None` if the buffer is too short
    pub fn from_bytes(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            nominal: NominalSpeed {
                fd_operation_enabled: buffer[0] != 0,
                bus_speed: LittleEndian::read_f32(&buffer[1..5]),
                sample_point: LittleEndian::read_f32(&buffer[5..9]),
            },
            data: DataPhaseSpeed {
                bitrate_switching_enabled: buffer[9] != 0,
                bus_speed: LittleEndian::read_f32(&buffer[10..14]),
                sample_point: LittleEndian::read_f32(&buffer[14..18]),
            },
        })
    }
}
