#![allow(unused_braces)]
use modular_bitfield_msb::prelude::*;
use serde::{Deserialize, Serialize};

#[bitfield]
#[derive(Default)]
#[repr(u8)]
/// CAN status register byte
pub(crate) struct StatusRegister {
    /// Controller stopped
    pub can_stopped: bool,
    /// Busoff status
    pub bus_off: bool,
    /// Error warning level reached
    pub warning_level: bool,
    /// Bus error (LEC)
    pub bus_error: bool,
    /// Transmitter busy
    pub transmitter_busy: bool,
    /// Receiver empty
    pub receiver_empty: bool,
    /// Message lost
    pub message_lost: bool,
    /// Receive queue overrun
    pub queue_overrun: bool,
}

/// Status snapshot decoded from the status register
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Bit 7: controller stopped
    pub is_can_stopped: bool,

    /// Bit 6: busoff status
    pub is_bus_off: bool,

    /// Bit 5: error warning level
    pub is_warning_level: bool,

    /// Bit 4: bus error (LEC)
    pub is_bus_error: bool,

    /// Bit 3: transmitter busy
    pub is_transmitter_busy: bool,

    /// Bit 2: receiver empty
    pub is_receiver_empty: bool,

    /// Bit 1: message lost
    pub is_message_lost: bool,

    /// Bit 0: queue overrun
    pub is_queue_overrun: bool,
}

impl Status {
    /// Status register value after reset: controller stopped, everything else cleared
    pub const RESET: u8 = 0x80;

    pub fn from_register(register: u8) -> Self {
        let reg = StatusRegister::from(register);

        Self {
            is_can_stopped: reg.can_stopped(),
            is_bus_off: reg.bus_off(),
            is_warning_level: reg.warning_level(),
            is_bus_error: reg.bus_error(),
            is_transmitter_busy: reg.transmitter_busy(),
            is_receiver_empty: reg.receiver_empty(),
            is_message_lost: reg.message_lost(),
            is_queue_overrun: reg.queue_overrun(),
        }
    }

    pub fn as_register(&self) -> u8 {
        StatusRegister::new()
            .with_can_stopped(self.is_can_stopped)
            .with_bus_off(self.is_bus_off)
            .with_warning_level(self.is_warning_level)
            .with_bus_error(self.is_bus_error)
            .with_transmitter_busy(self.is_transmitter_busy)
            .with_receiver_empty(self.is_receiver_empty)
            .with_message_lost(self.is_message_lost)
            .with_queue_overrun(self.is_queue_overrun)
            .into()
    }
}

/// Channel state reported by probing, without creating a handle
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChannelState {
    /// CAN interface available, but occupied
    Occupied = 1,
    /// CAN interface available
    Available = 0,
    /// CAN interface not available
    NotAvailable = -1,
    /// CAN interface not testable (or legacy API)
    NotTestable = -2,
}

impl ChannelState {
    /// Maps the raw probe result, unknown values are not testable
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Occupied,
            0 => Self::Available,
            -1 => Self::NotAvailable,
            _ => Self::NotTestable,
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// True if hardware and driver are present
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Available | Self::Occupied)
    }
}

impl core::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Self::Occupied => "CAN interface available, but occupied",
            Self::Available => "CAN interface available",
            Self::NotAvailable => "CAN interface not available",
            Self::NotTestable => "CAN interface not testable",
        };
        f.write_str(text)
    }
}
