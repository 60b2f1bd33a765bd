//!# CAN operation mode
//! Operation mode is a set of eight independent flags. Any combination is structurally
//! valid, the transport decides which combinations the controller supports.
//!
//! ```
//!# use canapi::mode::OperationMode;
//! let mode = OperationMode::FD_OPERATION | OperationMode::BITRATE_SWITCHING;
//!
//! assert_eq!(mode.bits(), 0xC0);
//! assert!(mode.is_fd_operation_enabled());
//! assert_eq!(OperationMode::from_bits_retain(0xC0), mode);
//! ```
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// CAN operation mode flags (one byte)
    #[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct OperationMode: u8 {
        /// CAN FD operation enabled
        const FD_OPERATION = 0x80;
        /// Bit-rate switching enabled
        const BITRATE_SWITCHING = 0x40;
        /// Non-ISO CAN FD enabled
        const NON_ISO_OPERATION = 0x20;
        /// Shared access enabled
        const SHARED_ACCESS = 0x10;
        /// Extended format disabled
        const EXTENDED_FRAMES_DISABLED = 0x08;
        /// Remote frames disabled
        const REMOTE_FRAMES_DISABLED = 0x04;
        /// Error frames enabled
        const ERROR_FRAMES_ENABLED = 0x02;
        /// Monitor mode (listen-only) enabled
        const MONITOR_MODE = 0x01;
    }
}

impl OperationMode {
    /// Classic CAN 2.0 operation, all frame formats
    pub const DEFAULT: Self = Self::empty();

    pub fn is_fd_operation_enabled(&self) -> bool {
        self.contains(Self::FD_OPERATION)
    }

    pub fn is_bitrate_switching_enabled(&self) -> bool {
        self.contains(Self::BITRATE_SWITCHING)
    }

    pub fn is_non_iso_operation_enabled(&self) -> bool {
        self.contains(Self::NON_ISO_OPERATION)
    }

    pub fn is_shared_access_enabled(&self) -> bool {
        self.contains(Self::SHARED_ACCESS)
    }

    pub fn is_extended_frames_disabled(&self) -> bool {
        self.contains(Self::EXTENDED_FRAMES_DISABLED)
    }

    pub fn is_remote_frames_disabled(&self) -> bool {
        self.contains(Self::REMOTE_FRAMES_DISABLED)
    }

    pub fn is_error_frames_enabled(&self) -> bool {
        self.contains(Self::ERROR_FRAMES_ENABLED)
    }

    pub fn is_monitor_mode_enabled(&self) -> bool {
        self.contains(Self::MONITOR_MODE)
    }

    /// Bit-rate switching and non-ISO operation require CAN FD operation
    pub fn is_consistent(&self) -> bool {
        self.is_fd_operation_enabled()
            || !self.intersects(Self::BITRATE_SWITCHING | Self::NON_ISO_OPERATION)
    }
}
