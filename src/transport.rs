//!# Transport contract
//! The driver layer performing the actual hardware I/O. Every call reports a signed
//! return code on failure (see [crate::error::Error::from_code]); the controller
//! resolves it and never retries on its own.
use crate::bitrate::BitrateSetting;
use crate::message::RawFrame;
use crate::mode::OperationMode;
use core::fmt;
use core::time::Duration;
use embedded_time::duration::Milliseconds;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of a transport call, `Err` holds the non-zero return code
pub type RawResult<T> = Result<T, i32>;

/// Raw timeout value for blocking until completion
pub const TIMEOUT_INFINITE: u16 = 65535;

/// Opaque non-negative channel handle issued by the transport
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Handle(i32);

impl Handle {
    /// Wraps a raw handle, negative values are no valid handles
    pub fn new(raw: i32) -> Option<Self> {
        if raw < 0 {
            return None;
        }

        Some(Self(raw))
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Time to wait in read and write operations
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeout {
    /// Return immediately
    #[default]
    Polling,
    /// Wait up to the given number of milliseconds (1..=65534)
    Millis(u16),
    /// Wait until completion or signal
    Infinite,
}

impl Timeout {
    /// Raw value as passed to the transport
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Polling => 0,
            Self::Millis(ms) => (*ms).min(TIMEOUT_INFINITE - 1),
            Self::Infinite => TIMEOUT_INFINITE,
        }
    }

    /// Wait duration, `None` for [Timeout::Infinite]
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            other => Some(Duration::from_millis(other.as_raw() as u64)),
        }
    }

    /// True unless the raw value is 0 (polling)
    pub fn is_blocking(&self) -> bool {
        self.as_raw() != 0
    }
}

impl From<u16> for Timeout {
    fn from(raw: u16) -> Self {
        match raw {
            0 => Self::Polling,
            TIMEOUT_INFINITE => Self::Infinite,
            ms => Self::Millis(ms),
        }
    }
}

/// Values above the 16-bit range are clamped to the longest finite timeout
impl From<Milliseconds<u32>> for Timeout {
    fn from(duration: Milliseconds<u32>) -> Self {
        match duration.0 {
            0 => Self::Polling,
            ms => Self::Millis(ms.min((TIMEOUT_INFINITE - 1) as u32) as u16),
        }
    }
}

/// Cancellation token observed by blocking transport calls.
///
/// Once signalled, blocking reads and writes return [crate::error::Error::Timeout]
/// instead of waiting, until the token is cleared again on the next start.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    signalled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.signalled.store(true, Ordering::SeqCst);
    }

    pub fn is_signalled(&self) -> bool {
        self.signalled.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.signalled.store(false, Ordering::SeqCst);
    }
}

/// Driver layer performing the hardware operations on behalf of a channel controller.
///
/// Implementations are shared between controllers (one per channel), therefore all
/// methods take `&self`.
pub trait Transport {
    /// Non-mutating availability check, returns the raw channel state
    fn probe(&self, channel: i32, mode: OperationMode) -> RawResult<i32>;

    /// Opens the channel in the given mode, controller stopped
    fn open(&self, channel: i32, mode: OperationMode) -> RawResult<Handle>;

    /// Stops all operation and releases the handle
    fn close(&self, handle: Handle) -> RawResult<()>;

    /// Applies the bit-rate and starts the controller
    fn start(&self, handle: Handle, bitrate: &BitrateSetting) -> RawResult<()>;

    /// Stops the controller
    fn stop(&self, handle: Handle) -> RawResult<()>;

    /// Transmits one frame. `timeout` is the raw millisecond value, see [Timeout::as_raw].
    fn send(&self, handle: Handle, frame: &RawFrame, timeout: u16, cancel: &CancelToken) -> RawResult<()>;

    /// Receives one frame. An empty queue is reported as receiver-empty return code.
    fn receive(&self, handle: Handle, timeout: u16, cancel: &CancelToken) -> RawResult<RawFrame>;

    /// Wakes all threads blocked in [Transport::send] or [Transport::receive] on that handle
    fn interrupt(&self, handle: Handle) -> RawResult<()>;

    /// Reads a property into `buffer`. Library properties are queried without handle.
    fn get_property(&self, handle: Option<Handle>, property: u16, buffer: &mut [u8]) -> RawResult<()>;

    /// Writes a property
    fn set_property(&self, handle: Option<Handle>, property: u16, value: &[u8]) -> RawResult<()>;

    /// Version string of the driver library
    fn version(&self) -> String;
}
