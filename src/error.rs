//!# Error taxonomy
//! Every transport call reports a signed return code, `0` meaning success.
//! Non-zero codes are resolved to exactly one [Error] variant by table lookup.
//!
//! ```
//!# use canapi::error::Error;
//! assert_eq!(Error::from_code(0), None);
//! assert_eq!(Error::from_code(-30), Some(Error::ReceiverEmpty));
//! assert_eq!(Error::from_code(-123), Some(Error::VendorSpecific(-123)));
//! assert_eq!(Error::from_code(-42), Some(Error::Fatal));
//! ```

/// Return code of a successful transport call
pub const NO_ERROR: i32 = 0;

/// Upper bound of the vendor-specific code range
pub const VENDOR_SPECIFIC: i32 = -100;

/// CAN API errors (V1 & V2 compatible numbering)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Error {
    /// Controller is bus-off
    #[error("busoff status")]
    BusOff,
    /// Error warning level reached
    #[error("error warning status")]
    ErrorWarning,
    /// Bus error (LEC)
    #[error("bus error")]
    BusError,
    /// Controller already started
    #[error("already started")]
    ControllerOnline,
    /// Controller not started
    #[error("not started")]
    ControllerOffline,
    #[error("message lost")]
    MessageLost,
    #[error("transmitter busy")]
    TransmitterBusy,
    #[error("receiver empty")]
    ReceiverEmpty,
    #[error("error frame")]
    ErrorFrame,
    /// Timed out, or a blocking call was released by a signal
    #[error("timed out")]
    Timeout,
    #[error("resource allocation")]
    ResourceError,
    #[error("illegal baudrate")]
    InvalidBaudrate,
    #[error("illegal handle")]
    InvalidHandle,
    #[error("illegal parameter")]
    IllegalParameter,
    #[error("null-pointer assignment")]
    NullPointer,
    #[error("not initialized")]
    NotInitialized,
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("illegal library")]
    InvalidLibrary,
    #[error("not supported")]
    NotSupported,
    /// Fatal error, also used for unrecognized return codes
    #[error("fatal error")]
    Fatal,
    /// Vendor-specific error code (<= -100)
    #[error("vendor-specific error ({0})")]
    VendorSpecific(i32),
}

impl Error {
    /// Resolves a transport return code. Returns `None` for [NO_ERROR].
    pub fn from_code(code: i32) -> Option<Self> {
        let error = match code {
            NO_ERROR => return None,
            -1 => Self::BusOff,
            -2 => Self::ErrorWarning,
            -3 => Self::BusError,
            -8 => Self::ControllerOnline,
            -9 => Self::ControllerOffline,
            -10 => Self::MessageLost,
            -20 => Self::TransmitterBusy,
            -30 => Self::ReceiverEmpty,
            -40 => Self::ErrorFrame,
            -50 => Self::Timeout,
            -90 => Self::ResourceError,
            -91 => Self::InvalidBaudrate,
            -92 => Self::InvalidHandle,
            -93 => Self::IllegalParameter,
            -94 => Self::NullPointer,
            -95 => Self::NotInitialized,
            -96 => Self::AlreadyInitialized,
            -97 => Self::InvalidLibrary,
            -98 => Self::NotSupported,
            -99 => Self::Fatal,
            code if code <= VENDOR_SPECIFIC => Self::VendorSpecific(code),
            _ => Self::Fatal,
        };

        Some(error)
    }

    /// Stable numeric code of the error
    pub fn code(&self) -> i32 {
        match self {
            Self::BusOff => -1,
            Self::ErrorWarning => -2,
            Self::BusError => -3,
            Self::ControllerOnline => -8,
            Self::ControllerOffline => -9,
            Self::MessageLost => -10,
            Self::TransmitterBusy => -20,
            Self::ReceiverEmpty => -30,
            Self::ErrorFrame => -40,
            Self::Timeout => -50,
            Self::ResourceError => -90,
            Self::InvalidBaudrate => -91,
            Self::InvalidHandle => -92,
            Self::IllegalParameter => -93,
            Self::NullPointer => -94,
            Self::NotInitialized => -95,
            Self::AlreadyInitialized => -96,
            Self::InvalidLibrary => -97,
            Self::NotSupported => -98,
            Self::Fatal => -99,
            Self::VendorSpecific(code) => *code,
        }
    }

    /// True for bus-state errors (bus-off, warning level, bus error)
    pub fn is_bus_state(&self) -> bool {
        matches!(self, Self::BusOff | Self::ErrorWarning | Self::BusError)
    }
}

/// A failing transport call that nevertheless reports `0` is treated as fatal.
impl From<i32> for Error {
    fn from(code: i32) -> Self {
        Self::from_code(code).unwrap_or(Self::Fatal)
    }
}

/// Checks a raw return code
pub fn check(code: i32) -> Result<()> {
    match Error::from_code(code) {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

pub type Result<T> = core::result::Result<T, Error>;
