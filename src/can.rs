//!# CAN channel controller
//!
//!```
//!# use std::sync::Arc;
//!# use bytes::Bytes;
//!# use canapi::bitrate::CiaIndex;
//!# use canapi::can::{ChannelController, ControllerState};
//!# use canapi::loopback::LoopbackBus;
//!# use canapi::message::{Message, MessageFlags};
//!# use canapi::mode::OperationMode;
//!# use canapi::transport::Timeout;
//!# use embedded_can::{Id, StandardId};
//!#
//! let bus = Arc::new(LoopbackBus::new(2));
//!
//! // Initialize controller object
//! let mut controller = ChannelController::new(bus);
//! controller.initialize(0, OperationMode::DEFAULT).unwrap();
//! controller.start(CiaIndex::Index250kbps.into()).unwrap();
//! assert_eq!(controller.state(), ControllerState::Running);
//!
//! let id = Id::Standard(StandardId::new(0x100).unwrap());
//! let message = Message::new(id, MessageFlags::STANDARD, Bytes::from_static(&[1, 2, 3])).unwrap();
//! controller.write(&message, Timeout::Polling).unwrap();
//!
//! // The loopback bus delivers to the sender as well
//! let received = controller.read(Timeout::Infinite).unwrap().unwrap();
//! assert_eq!(received.payload(), &[1, 2, 3]);
//!
//! controller.reset().unwrap();
//! controller.teardown().unwrap();
//! ```

use crate::bitrate::{Baudrate, Bitrate, BitrateSetting, Speed};
use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::mode::OperationMode;
use crate::property::{
    decode_string, read_i32, read_u16, read_u64, ChannelInfo, DeviceInfo, LibraryInfo, Property, Statistics, Version,
    MAX_BUFFER_SIZE,
};
use crate::status::{ChannelState, Status};
use crate::transport::{CancelToken, Handle, Timeout, Transport};
use log::{debug, trace, warn};
use std::sync::Arc;

/// Operation state of a channel controller
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerState {
    /// No handle, initial state
    Uninitialized,
    /// Handle acquired, no communication possible
    Stopped,
    /// Controller started, frames can be exchanged
    Running,
}

/// Channel owned by a controller
#[derive(Copy, Clone, Debug)]
struct OpenChannel {
    number: i32,
    handle: Handle,
    mode: OperationMode,
}

/// Owns one channel handle and sequences its lifecycle.
///
/// The handle is released on drop if [ChannelController::teardown] wasn't called.
pub struct ChannelController<T: Transport> {
    /// Driver layer, shared with the controllers of other channels
    transport: Arc<T>,

    /// Open channel, `None` while uninitialized
    channel: Option<OpenChannel>,

    state: ControllerState,

    /// Released by [ChannelController::signal] or a [Canceller]
    cancel: CancelToken,
}

impl<T: Transport> ChannelController<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            channel: None,
            state: ControllerState::Uninitialized,
            cancel: CancelToken::new(),
        }
    }

    /// Initializes and starts a channel. If starting fails, the channel is torn down again
    /// and the start error is returned.
    pub fn open(transport: Arc<T>, config: &ChannelConfig) -> Result<Self> {
        let mut controller = Self::new(transport);
        controller.initialize(config.channel, config.mode)?;

        if let Err(error) = controller.start(config.baudrate) {
            if let Err(teardown) = controller.teardown() {
                warn!("Releasing channel {} failed: {teardown}", config.channel);
            }
            return Err(error);
        }

        Ok(controller)
    }

    /// Probes if the channel is present and the mode is supported, without creating a handle.
    /// A missing channel is a valid state, not an error.
    pub fn probe(transport: &T, channel: i32, mode: OperationMode) -> Result<ChannelState> {
        let state = transport
            .probe(channel, mode)
            .map(ChannelState::from_code)
            .map_err(|code| resolve("probe", code))?;

        if !mode.is_consistent() {
            debug!("Operation mode {mode:?} requires CAN FD operation");
            return Err(Error::IllegalParameter);
        }

        Ok(state)
    }

    /// Lists the channels known to the transport
    pub fn channels(transport: &T) -> Result<Vec<ChannelInfo>> {
        let mut channels = Vec::new();
        let mut step = Property::SetFirstChannel;

        loop {
            match transport.set_property(None, step.id(), &[]) {
                Ok(()) => channels.push(Self::channel_info(transport)?),
                Err(code) => match resolve("channels", code) {
                    // end of the list
                    Error::ResourceError => return Ok(channels),
                    error => return Err(error),
                },
            }
            step = Property::SetNextChannel;
        }
    }

    /// Version string of the driver library
    pub fn version(transport: &T) -> String {
        transport.version()
    }

    /// Opens the channel in the given operation mode, controller is stopped afterward
    pub fn initialize(&mut self, channel: i32, mode: OperationMode) -> Result<()> {
        if self.channel.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        if !mode.is_consistent() {
            debug!("Operation mode {mode:?} requires CAN FD operation");
            return Err(Error::IllegalParameter);
        }

        let handle = self.transport.open(channel, mode).map_err(|code| resolve("initialize", code))?;

        self.channel = Some(OpenChannel {
            number: channel,
            handle,
            mode,
        });
        self.state = ControllerState::Stopped;
        debug!("Channel {channel} initialized with handle {handle}, mode {:#04x}", mode.bits());

        Ok(())
    }

    /// Applies the bit-rate and starts the controller
    pub fn start(&mut self, baudrate: Baudrate) -> Result<()> {
        let handle = match self.state {
            ControllerState::Uninitialized => return Err(Error::ControllerOffline),
            ControllerState::Running => return Err(Error::ControllerOnline),
            ControllerState::Stopped => self.handle()?,
        };

        self.transport
            .start(handle, &BitrateSetting::from(&baudrate))
            .map_err(|code| resolve("start", code))?;

        self.cancel.clear();
        self.state = ControllerState::Running;
        debug!("Controller {handle} started with {baudrate:?}");

        Ok(())
    }

    /// Stops the controller, no communication is possible afterward
    pub fn reset(&mut self) -> Result<()> {
        let handle = self.running_handle()?;

        self.transport.stop(handle).map_err(|code| resolve("reset", code))?;

        self.state = ControllerState::Stopped;
        debug!("Controller {handle} stopped");

        Ok(())
    }

    /// Stops any operation and releases the handle. The controller can be initialized again.
    pub fn teardown(&mut self) -> Result<()> {
        let handle = self.handle()?;

        self.transport.close(handle).map_err(|code| resolve("teardown", code))?;

        self.channel = None;
        self.state = ControllerState::Uninitialized;
        debug!("Channel handle {handle} released");

        Ok(())
    }

    /// Releases threads blocked in [ChannelController::read] or [ChannelController::write].
    /// Released calls fail with [Error::Timeout].
    pub fn signal(&self) -> Result<()> {
        self.canceller()?.signal()
    }

    /// Returns a handle for signalling this channel from another thread
    pub fn canceller(&self) -> Result<Canceller<T>> {
        Ok(Canceller {
            transport: Arc::clone(&self.transport),
            handle: self.handle()?,
            token: self.cancel.clone(),
        })
    }

    /// Transmits one message. Frame formats the operation mode excludes are rejected.
    pub fn write(&mut self, message: &Message, timeout: Timeout) -> Result<()> {
        let handle = self.running_handle()?;
        self.check_message(message)?;

        trace!("Write {:#x} [{}] {:02X?}", message.raw_id(), message.dlc().len(), message.payload());

        self.transport
            .send(handle, &message.to_frame(), timeout.as_raw(), &self.cancel)
            .map_err(|code| resolve("write", code))
    }

    /// Reads one message from the receive queue. Returns `None` if no message
    /// arrived within the timeout.
    pub fn read(&mut self, timeout: Timeout) -> Result<Option<Message>> {
        let handle = self.running_handle()?;

        match self.transport.receive(handle, timeout.as_raw(), &self.cancel) {
            Ok(frame) => {
                let message = Message::from_frame(&frame).map_err(|error| {
                    debug!("Received frame can't be decoded: {error}");
                    Error::from(error)
                })?;
                trace!("Read {:#x} [{}] {:02X?}", message.raw_id(), message.dlc().len(), message.payload());
                Ok(Some(message))
            }
            Err(code) => match resolve("read", code) {
                Error::ReceiverEmpty => Ok(None),
                error => Err(error),
            },
        }
    }

    /// Like [ChannelController::read], but an empty queue is reported as [Error::ReceiverEmpty]
    pub fn read_message(&mut self, timeout: Timeout) -> Result<Message> {
        self.read(timeout)?.ok_or(Error::ReceiverEmpty)
    }

    /// Current operation state
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Channel handle, [Error::InvalidHandle] if not initialized
    pub fn handle(&self) -> Result<Handle> {
        self.channel.map(|channel| channel.handle).ok_or(Error::InvalidHandle)
    }

    /// Channel number, `None` if not initialized
    pub fn channel(&self) -> Option<i32> {
        self.channel.map(|channel| channel.number)
    }

    /// Reads and returns the status register
    pub fn status(&self) -> Result<Status> {
        let mut buffer = [0u8; 1];
        self.device_property(Property::Status, &mut buffer)?;

        Ok(Status::from_register(buffer[0]))
    }

    /// Active operation mode as reported by the transport
    pub fn mode(&self) -> Result<OperationMode> {
        let mut buffer = [0u8; 1];
        self.device_property(Property::OpMode, &mut buffer)?;

        Ok(OperationMode::from_bits_retain(buffer[0]))
    }

    /// Operation modes supported by the controller
    pub fn capability(&self) -> Result<OperationMode> {
        let mut buffer = [0u8; 1];
        self.device_property(Property::OpCapability, &mut buffer)?;

        Ok(OperationMode::from_bits_retain(buffer[0]))
    }

    /// Bit-rate registers in use
    pub fn bitrate(&self) -> Result<Bitrate> {
        let mut buffer = [0u8; Bitrate::SIZE];
        self.device_property(Property::Bitrate, &mut buffer)?;

        Bitrate::from_bytes(&buffer).ok_or(Error::Fatal)
    }

    /// Effective bus speed and sample points, as resolved by the transport
    pub fn speed(&self) -> Result<Speed> {
        let mut buffer = [0u8; Speed::SIZE];
        self.device_property(Property::Speed, &mut buffer)?;

        Speed::from_bytes(&buffer).ok_or(Error::Fatal)
    }

    /// Bus load in percent
    pub fn bus_load(&self) -> Result<u8> {
        let mut buffer = [0u8; 1];
        self.device_property(Property::BusLoad, &mut buffer)?;

        Ok(buffer[0])
    }

    /// Transmit, receive and error counters
    pub fn statistics(&self) -> Result<Statistics> {
        Ok(Statistics {
            transmitted: self.counter(Property::TxCounter)?,
            received: self.counter(Property::RxCounter)?,
            errors: self.counter(Property::ErrCounter)?,
        })
    }

    pub fn device_info(&self) -> Result<DeviceInfo> {
        let mut buffer = [0u8; 4];
        self.device_property(Property::DeviceType, &mut buffer)?;

        Ok(DeviceInfo {
            device_type: read_i32(&buffer),
            name: self.device_string(Property::DeviceName)?,
            vendor: self.device_string(Property::DeviceVendor)?,
        })
    }

    pub fn hardware_version(&self) -> Result<String> {
        self.device_string(Property::HardwareVersion)
    }

    pub fn firmware_version(&self) -> Result<String> {
        self.device_string(Property::FirmwareVersion)
    }

    /// Library information, available without handle
    pub fn library_info(&self) -> Result<LibraryInfo> {
        let handle = self.handle().ok();
        let mut buffer = [0u8; 4];
        query(&*self.transport, handle, Property::LibraryId, &mut buffer)?;

        Ok(LibraryInfo {
            id: read_i32(&buffer),
            name: query_string(&*self.transport, handle, Property::LibraryDllName)?,
            vendor: query_string(&*self.transport, handle, Property::LibraryVendor)?,
        })
    }

    /// Library version, available without handle
    pub fn library_version(&self) -> Result<Version> {
        let handle = self.handle().ok();
        let mut word = [0u8; 2];
        let mut patch = [0u8; 1];
        query(&*self.transport, handle, Property::Version, &mut word)?;
        query(&*self.transport, handle, Property::PatchNo, &mut patch)?;

        Ok(Version::from_word(read_u16(&word), patch[0]))
    }

    /// Version of the CAN API specification implemented by the library
    pub fn api_version(&self) -> Result<Version> {
        let mut word = [0u8; 2];
        query(&*self.transport, self.handle().ok(), Property::Spec, &mut word)?;

        Ok(Version::from_word(read_u16(&word), 0))
    }

    fn channel_info(transport: &T) -> Result<ChannelInfo> {
        let mut buffer = [0u8; 4];
        query(transport, None, Property::ChannelNo, &mut buffer)?;

        Ok(ChannelInfo {
            channel: read_i32(&buffer),
            name: query_string(transport, None, Property::ChannelName)?,
            vendor: query_string(transport, None, Property::ChannelVendorName)?,
            driver: query_string(transport, None, Property::ChannelDllName)?,
        })
    }

    /// Handle of a running controller, [Error::ControllerOffline] otherwise
    fn running_handle(&self) -> Result<Handle> {
        match self.state {
            ControllerState::Running => self.handle(),
            _ => Err(Error::ControllerOffline),
        }
    }

    /// Rejects frame formats excluded by the operation mode
    fn check_message(&self, message: &Message) -> Result<()> {
        let mode = self.channel.map(|channel| channel.mode).unwrap_or_default();
        let flags = message.flags();

        let violation = if flags.is_extended_frame() && mode.is_extended_frames_disabled() {
            Some("extended frames suppressed")
        } else if flags.is_remote_frame() && mode.is_remote_frames_disabled() {
            Some("remote frames suppressed")
        } else if flags.is_fd_long_frame() && !mode.is_fd_operation_enabled() {
            Some("long frames only with CAN FD")
        } else if flags.is_fd_fast_frame() && !mode.is_bitrate_switching_enabled() {
            Some("fast frames only with bit-rate switching")
        } else if flags.is_fd_fast_frame() && !flags.is_fd_long_frame() {
            Some("bit-rate switching only with CAN FD frames")
        } else if flags.is_status_message() {
            Some("status messages cannot be sent")
        } else {
            None
        };

        match violation {
            Some(reason) => {
                debug!("Message {:#x} rejected: {reason}", message.raw_id());
                Err(Error::IllegalParameter)
            }
            None => Ok(()),
        }
    }

    fn device_property(&self, property: Property, buffer: &mut [u8]) -> Result<()> {
        query(&*self.transport, Some(self.handle()?), property, buffer)
    }

    fn device_string(&self, property: Property) -> Result<String> {
        query_string(&*self.transport, Some(self.handle()?), property)
    }

    fn counter(&self, property: Property) -> Result<u64> {
        let mut buffer = [0u8; 8];
        self.device_property(property, &mut buffer)?;

        Ok(read_u64(&buffer))
    }
}

impl<T: Transport> Drop for ChannelController<T> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(code) = self.transport.close(channel.handle) {
                warn!("Releasing channel {} failed: {}", channel.number, Error::from(code));
            }
        }
    }
}

/// Signals a channel from any thread, e.g. an interrupt handler
pub struct Canceller<T: Transport> {
    transport: Arc<T>,
    handle: Handle,
    token: CancelToken,
}

impl<T: Transport> Canceller<T> {
    /// Releases threads blocked in a read or write of the channel
    pub fn signal(&self) -> Result<()> {
        self.token.signal();
        self.transport
            .interrupt(self.handle)
            .map_err(|code| resolve("signal", code))
    }
}

impl<T: Transport> Clone for Canceller<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            handle: self.handle,
            token: self.token.clone(),
        }
    }
}

fn resolve(operation: &str, code: i32) -> Error {
    let error = Error::from(code);
    debug!("{operation} failed: {error} ({code})");
    error
}

fn query<T: Transport + ?Sized>(transport: &T, handle: Option<Handle>, property: Property, buffer: &mut [u8]) -> Result<()> {
    transport
        .get_property(handle, property.id(), buffer)
        .map_err(|code| resolve("property", code))
}

fn query_string<T: Transport + ?Sized>(transport: &T, handle: Option<Handle>, property: Property) -> Result<String> {
    let mut buffer = [0u8; MAX_BUFFER_SIZE];
    query(transport, handle, property, &mut buffer)?;

    Ok(decode_string(&buffer))
}
