use crate::bitrate::Baudrate;
use crate::mode::OperationMode;
use serde::{Deserialize, Serialize};

/// Everything needed to bring a channel from uninitialized to running
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel number of the CAN interface
    pub channel: i32,

    /// Requested operation mode
    pub mode: OperationMode,

    /// Bit-rate used when starting the controller
    pub baudrate: Baudrate,
}

impl ChannelConfig {
    pub fn new(channel: i32, mode: OperationMode, baudrate: Baudrate) -> Self {
        Self {
            channel,
            mode,
            baudrate,
        }
    }
}
