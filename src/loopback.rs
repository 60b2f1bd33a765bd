//!# Loopback transport
//! Software CAN bus connecting a fixed number of channels inside one process.
//! Frames written on any channel are delivered to every running channel, the sender
//! included. A full queue of the sender holds the writer back until there is room
//! again, frames for any other full queue are lost and flagged as overrun.
//!
//! The bus runs with an 80 MHz controller clock and resolves the CiA indices to
//! fixed bit-timing values.
//!
//! ```
//!# use std::sync::Arc;
//!# use canapi::can::ChannelController;
//!# use canapi::loopback::LoopbackBus;
//!# use canapi::mode::OperationMode;
//!# use canapi::status::ChannelState;
//!#
//! let bus = Arc::new(LoopbackBus::new(2));
//!
//! assert_eq!(ChannelController::probe(&*bus, 1, OperationMode::DEFAULT).unwrap(), ChannelState::Available);
//! assert_eq!(ChannelController::probe(&*bus, 2, OperationMode::DEFAULT).unwrap(), ChannelState::NotAvailable);
//! assert_eq!(ChannelController::channels(&*bus).unwrap().len(), 2);
//! ```
use crate::bitrate::{Bitrate, BitrateSetting, CiaIndex, DataPhase, DataPhaseSpeed, Nominal, NominalSpeed, Speed};
use crate::error::Error;
use crate::message::RawFrame;
use crate::mode::OperationMode;
use crate::property::{encode_string, Property, Statistics, Version};
use crate::status::{ChannelState, Status};
use crate::transport::{CancelToken, Handle, RawResult, Transport, TIMEOUT_INFINITE};
use log::{debug, trace};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Controller clock frequency in Hz
pub const FREQUENCY: i32 = 80_000_000;

/// Default number of frames a receive queue holds
pub const QUEUE_CAPACITY: usize = 256;

/// Library id reported through the library properties
pub const LIBRARY_ID: i32 = 0x4C42;

/// Device type reported through the device properties
pub const DEVICE_TYPE: i32 = 0x4C42_0000;

/// Version of the CAN API specification served by the bus
pub const API_VERSION: Version = Version {
    major: 3,
    minor: 0,
    patch: 0,
};

const VENDOR: &str = "canapi";

/// Operation modes the loopback controller supports
pub const CAPABILITY: OperationMode = OperationMode::FD_OPERATION
    .union(OperationMode::BITRATE_SWITCHING)
    .union(OperationMode::SHARED_ACCESS)
    .union(OperationMode::EXTENDED_FRAMES_DISABLED)
    .union(OperationMode::REMOTE_FRAMES_DISABLED)
    .union(OperationMode::ERROR_FRAMES_ENABLED)
    .union(OperationMode::MONITOR_MODE);

/// Bit-timing register limits
mod limits {
    use core::ops::RangeInclusive;

    pub const NOMINAL_BRP: RangeInclusive<u16> = 1..=1024;
    pub const NOMINAL_TSEG1: RangeInclusive<u16> = 1..=256;
    pub const NOMINAL_TSEG2: RangeInclusive<u16> = 1..=128;
    pub const NOMINAL_SJW: RangeInclusive<u16> = 1..=128;
    pub const DATA_BRP: RangeInclusive<u16> = 1..=1024;
    pub const DATA_TSEG1: RangeInclusive<u16> = 1..=32;
    pub const DATA_TSEG2: RangeInclusive<u16> = 1..=16;
    pub const DATA_SJW: RangeInclusive<u16> = 1..=16;
}

/// Bit-timing of a CiA index at 80 MHz
pub fn cia_timing(index: CiaIndex) -> Bitrate {
    let (brp, tseg1, tseg2) = match index {
        CiaIndex::Index1000kbps => (2, 29, 10),
        CiaIndex::Index800kbps => (2, 39, 10),
        CiaIndex::Index500kbps => (4, 34, 5),
        CiaIndex::Index250kbps => (8, 34, 5),
        CiaIndex::Index125kbps => (16, 34, 5),
        CiaIndex::Index100kbps => (20, 34, 5),
        CiaIndex::Index50kbps => (40, 34, 5),
        CiaIndex::Index20kbps => (100, 34, 5),
        CiaIndex::Index10kbps => (200, 34, 5),
    };

    let nominal = Nominal {
        brp,
        tseg1,
        tseg2,
        sjw: tseg2,
        sam: 0,
    };

    Bitrate {
        frequency: FREQUENCY,
        nominal,
        data: DataPhase {
            brp,
            tseg1,
            tseg2,
            sjw: tseg2,
        },
    }
}

/// One opened handle
#[derive(Debug)]
struct Port {
    channel: i32,
    mode: OperationMode,
    running: bool,
    bitrate: Bitrate,
    queue: VecDeque<RawFrame>,
    statistics: Statistics,
    transmitter_busy: bool,
    message_lost: bool,
    queue_overrun: bool,
}

impl Port {
    fn new(channel: i32, mode: OperationMode) -> Self {
        Self {
            channel,
            mode,
            running: false,
            bitrate: Bitrate::default(),
            queue: VecDeque::new(),
            statistics: Statistics::default(),
            transmitter_busy: false,
            message_lost: false,
            queue_overrun: false,
        }
    }

    fn status(&self) -> Status {
        Status {
            is_can_stopped: !self.running,
            is_transmitter_busy: self.transmitter_busy,
            is_receiver_empty: self.queue.is_empty(),
            is_message_lost: self.message_lost,
            is_queue_overrun: self.queue_overrun,
            ..Default::default()
        }
    }

    /// True if the port is running and its mode lets the frame through
    fn accepts(&self, frame: &RawFrame) -> bool {
        let flags = frame.flags();

        self.running
            && !(flags.is_extended_frame() && self.mode.is_extended_frames_disabled())
            && !(flags.is_remote_frame() && self.mode.is_remote_frames_disabled())
            && !(flags.is_fd_long_frame() && !self.mode.is_fd_operation_enabled())
            && !(flags.is_status_message() && !self.mode.is_error_frames_enabled())
    }

    /// Queues the frame. A full queue loses it and flags the overrun.
    fn deliver(&mut self, frame: RawFrame, capacity: usize) -> bool {
        if self.queue.len() >= capacity {
            self.message_lost = true;
            self.queue_overrun = true;
            return false;
        }

        if frame.flags().is_status_message() {
            self.statistics.errors += 1;
        } else {
            self.statistics.received += 1;
        }
        self.queue.push_back(frame);
        true
    }

    fn speed(&self) -> Speed {
        let bitrate = &self.bitrate;
        let nominal = bus_speed(bitrate.frequency, bitrate.nominal.brp, bitrate.nominal.tseg1, bitrate.nominal.tseg2);
        let data = if self.mode.is_bitrate_switching_enabled() {
            bus_speed(bitrate.frequency, bitrate.data.brp, bitrate.data.tseg1, bitrate.data.tseg2)
        } else {
            nominal
        };

        Speed {
            nominal: NominalSpeed {
                fd_operation_enabled: self.mode.is_fd_operation_enabled(),
                bus_speed: nominal.0,
                sample_point: nominal.1,
            },
            data: DataPhaseSpeed {
                bitrate_switching_enabled: self.mode.is_bitrate_switching_enabled(),
                bus_speed: data.0,
                sample_point: data.1,
            },
        }
    }
}

/// Bus speed in bit/s and sample point in percent
fn bus_speed(frequency: i32, brp: u16, tseg1: u16, tseg2: u16) -> (f32, f32) {
    let quanta = 1.0 + tseg1 as f32 + tseg2 as f32;
    if brp == 0 {
        return (0.0, 0.0);
    }

    (frequency as f32 / (brp as f32 * quanta), (1.0 + tseg1 as f32) * 100.0 / quanta)
}

#[derive(Debug, Default)]
struct Bus {
    ports: BTreeMap<Handle, Port>,
    next_handle: i32,
    /// Position in the channel list
    cursor: Option<i32>,
}

impl Bus {
    fn port(&self, handle: Handle) -> RawResult<&Port> {
        self.ports.get(&handle).ok_or(Error::InvalidHandle.code())
    }

    fn port_mut(&mut self, handle: Handle) -> RawResult<&mut Port> {
        self.ports.get_mut(&handle).ok_or(Error::InvalidHandle.code())
    }

    fn is_occupied(&self, channel: i32) -> bool {
        self.ports.values().any(|port| port.channel == channel)
    }
}

/// In-process software bus implementing [Transport]
#[derive(Debug)]
pub struct LoopbackBus {
    channels: i32,
    capacity: usize,
    epoch: Instant,
    bus: Mutex<Bus>,
    changed: Condvar,
}

impl LoopbackBus {
    /// Creates a bus with channels `0..channels`
    pub fn new(channels: u8) -> Self {
        Self::with_capacity(channels, QUEUE_CAPACITY)
    }

    /// Creates a bus whose receive queues hold at most `capacity` frames
    pub fn with_capacity(channels: u8, capacity: usize) -> Self {
        Self {
            channels: channels as i32,
            capacity: capacity.max(1),
            epoch: Instant::now(),
            bus: Mutex::new(Bus::default()),
            changed: Condvar::new(),
        }
    }

    /// Delivers a frame from an outside node to all running handles of the channel.
    /// Frames not fitting into a full queue are lost. Returns the number of receivers.
    pub fn inject(&self, channel: i32, frame: RawFrame) -> RawResult<usize> {
        let mut bus = self.lock()?;
        let frame = RawFrame {
            timestamp: self.epoch.elapsed(),
            ..frame
        };
        let receivers = bus
            .ports
            .values_mut()
            .filter(|port| port.channel == channel && port.accepts(&frame))
            .map(|port| port.deliver(frame, self.capacity))
            .filter(|delivered| *delivered)
            .count();

        self.changed.notify_all();
        Ok(receivers)
    }

    fn lock(&self) -> RawResult<MutexGuard<'_, Bus>> {
        self.bus.lock().map_err(|_| Error::Fatal.code())
    }

    /// Waits for a change on the bus. Returns `None` once the deadline has passed.
    fn wait<'a>(
        &self,
        bus: MutexGuard<'a, Bus>,
        deadline: Option<Instant>,
    ) -> RawResult<Option<MutexGuard<'a, Bus>>> {
        match deadline {
            None => self.changed.wait(bus).map(Some).map_err(|_| Error::Fatal.code()),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }

                self.changed
                    .wait_timeout(bus, remaining)
                    .map(|(bus, _)| Some(bus))
                    .map_err(|_| Error::Fatal.code())
            }
        }
    }

    fn is_valid_channel(&self, channel: i32) -> bool {
        (0..self.channels).contains(&channel)
    }

    fn resolve_bitrate(mode: OperationMode, setting: &BitrateSetting) -> RawResult<Bitrate> {
        match setting {
            BitrateSetting::Index(_) if mode.is_fd_operation_enabled() => {
                debug!("CAN FD operation requires bit-timing registers");
                Err(Error::InvalidBaudrate.code())
            }
            BitrateSetting::Index(index) => CiaIndex::from_transport_index(*index)
                .map(cia_timing)
                .ok_or(Error::InvalidBaudrate.code()),
            BitrateSetting::Timing(bitrate) => {
                let nominal = &bitrate.nominal;
                let data = &bitrate.data;

                let nominal_valid = limits::NOMINAL_BRP.contains(&nominal.brp)
                    && limits::NOMINAL_TSEG1.contains(&nominal.tseg1)
                    && limits::NOMINAL_TSEG2.contains(&nominal.tseg2)
                    && limits::NOMINAL_SJW.contains(&nominal.sjw);
                let data_valid = !mode.is_bitrate_switching_enabled()
                    || (limits::DATA_BRP.contains(&data.brp)
                        && limits::DATA_TSEG1.contains(&data.tseg1)
                        && limits::DATA_TSEG2.contains(&data.tseg2)
                        && limits::DATA_SJW.contains(&data.sjw));

                if bitrate.frequency <= 0 || !nominal_valid || !data_valid {
                    debug!("Bit-timing registers out of range: {bitrate:?}");
                    return Err(Error::InvalidBaudrate.code());
                }

                Ok(*bitrate)
            }
        }
    }

    fn channel_property(&self, bus: &Bus, property: Property, buffer: &mut [u8]) -> RawResult<()> {
        let channel = bus.cursor.ok_or(Error::ResourceError.code())?;

        match property {
            Property::ChannelNo => put(buffer, &channel.to_le_bytes()),
            Property::ChannelName => put_string(buffer, &format!("Loopback Channel {channel}")),
            Property::ChannelDllName => put_string(buffer, "loopback"),
            Property::ChannelVendorName => put_string(buffer, VENDOR),
            _ => Err(Error::NotSupported.code()),
        }
    }

    fn device_property(&self, port: &Port, property: Property, buffer: &mut [u8]) -> RawResult<()> {
        match property {
            Property::DeviceType => put(buffer, &DEVICE_TYPE.to_le_bytes()),
            Property::DeviceName => put_string(buffer, &format!("Loopback Channel {}", port.channel)),
            Property::DeviceVendor => put_string(buffer, VENDOR),
            Property::DeviceDllName => put_string(buffer, "loopback"),
            Property::OpCapability => put(buffer, &[CAPABILITY.bits()]),
            Property::OpMode => put(buffer, &[port.mode.bits()]),
            Property::Bitrate if port.running => put(buffer, &port.bitrate.to_bytes()),
            Property::Speed if port.running => put(buffer, &port.speed().to_bytes()),
            Property::Bitrate | Property::Speed => Err(Error::ControllerOffline.code()),
            Property::Status => put(buffer, &[port.status().as_register()]),
            Property::BusLoad => put(buffer, &[0]),
            Property::TxCounter => put(buffer, &port.statistics.transmitted.to_le_bytes()),
            Property::RxCounter => put(buffer, &port.statistics.received.to_le_bytes()),
            Property::ErrCounter => put(buffer, &port.statistics.errors.to_le_bytes()),
            Property::HardwareVersion => put_string(buffer, "Loopback hardware 1.0"),
            Property::FirmwareVersion => put_string(buffer, &format!("Loopback firmware {}", env!("CARGO_PKG_VERSION"))),
            _ => Err(Error::NotSupported.code()),
        }
    }
}

impl Transport for LoopbackBus {
    fn probe(&self, channel: i32, mode: OperationMode) -> RawResult<i32> {
        if !self.is_valid_channel(channel) {
            return Ok(ChannelState::NotAvailable.code());
        }

        if !CAPABILITY.contains(mode) {
            return Err(Error::IllegalParameter.code());
        }

        let bus = self.lock()?;
        let state = if bus.is_occupied(channel) {
            ChannelState::Occupied
        } else {
            ChannelState::Available
        };

        Ok(state.code())
    }

    fn open(&self, channel: i32, mode: OperationMode) -> RawResult<Handle> {
        if !self.is_valid_channel(channel) {
            return Err(Error::InvalidHandle.code());
        }

        if !CAPABILITY.contains(mode) {
            return Err(Error::IllegalParameter.code());
        }

        let mut bus = self.lock()?;
        let shared = mode.is_shared_access_enabled()
            && bus
                .ports
                .values()
                .filter(|port| port.channel == channel)
                .all(|port| port.mode.is_shared_access_enabled());
        if bus.is_occupied(channel) && !shared {
            debug!("Loopback channel {channel} occupied");
            return Err(Error::ResourceError.code());
        }

        let handle = Handle::new(bus.next_handle).ok_or(Error::ResourceError.code())?;
        bus.next_handle = bus.next_handle.checked_add(1).ok_or(Error::ResourceError.code())?;
        bus.ports.insert(handle, Port::new(channel, mode));
        debug!("Loopback channel {channel} opened as {handle}");

        Ok(handle)
    }

    fn close(&self, handle: Handle) -> RawResult<()> {
        let mut bus = self.lock()?;
        bus.ports.remove(&handle).ok_or(Error::InvalidHandle.code())?;
        self.changed.notify_all();

        Ok(())
    }

    fn start(&self, handle: Handle, bitrate: &BitrateSetting) -> RawResult<()> {
        let mut bus = self.lock()?;
        let port = bus.port_mut(handle)?;

        if port.running {
            return Err(Error::ControllerOnline.code());
        }

        port.bitrate = Self::resolve_bitrate(port.mode, bitrate)?;
        port.queue.clear();
        port.statistics = Statistics::default();
        port.transmitter_busy = false;
        port.message_lost = false;
        port.queue_overrun = false;
        port.running = true;

        Ok(())
    }

    fn stop(&self, handle: Handle) -> RawResult<()> {
        let mut bus = self.lock()?;
        let port = bus.port_mut(handle)?;

        if !port.running {
            return Err(Error::ControllerOffline.code());
        }

        port.running = false;
        self.changed.notify_all();

        Ok(())
    }

    fn send(&self, handle: Handle, frame: &RawFrame, timeout: u16, cancel: &CancelToken) -> RawResult<()> {
        let deadline = deadline(timeout);
        let mut bus = self.lock()?;

        loop {
            let sender = bus.port(handle)?;
            if !sender.running {
                return Err(Error::ControllerOffline.code());
            }
            if sender.mode.is_monitor_mode_enabled() {
                return Err(Error::IllegalParameter.code());
            }

            // a full queue of the sender holds the write back, other full queues overrun
            let ready = !sender.accepts(frame) || sender.queue.len() < self.capacity;

            if ready {
                let frame = RawFrame {
                    timestamp: self.epoch.elapsed(),
                    ..*frame
                };
                let capacity = self.capacity;
                let receivers = bus
                    .ports
                    .values_mut()
                    .filter(|port| port.accepts(&frame))
                    .map(|port| port.deliver(frame, capacity))
                    .filter(|delivered| *delivered)
                    .count();

                let sender = bus.port_mut(handle)?;
                sender.statistics.transmitted += 1;
                sender.transmitter_busy = false;
                trace!("Loopback {handle} delivered {:#x} to {receivers} receivers", frame.id);

                self.changed.notify_all();
                return Ok(());
            }

            bus.port_mut(handle)?.transmitter_busy = true;

            if timeout == 0 {
                return Err(Error::TransmitterBusy.code());
            }
            if cancel.is_signalled() {
                return Err(Error::Timeout.code());
            }

            bus = match self.wait(bus, deadline)? {
                Some(bus) => bus,
                None => return Err(Error::TransmitterBusy.code()),
            };
        }
    }

    fn receive(&self, handle: Handle, timeout: u16, cancel: &CancelToken) -> RawResult<RawFrame> {
        let deadline = deadline(timeout);
        let mut bus = self.lock()?;

        loop {
            let port = bus.port_mut(handle)?;
            if !port.running {
                return Err(Error::ControllerOffline.code());
            }

            if let Some(frame) = port.queue.pop_front() {
                // room for a held back writer
                self.changed.notify_all();
                return Ok(frame);
            }

            if timeout == 0 {
                return Err(Error::ReceiverEmpty.code());
            }
            if cancel.is_signalled() {
                return Err(Error::Timeout.code());
            }

            bus = match self.wait(bus, deadline)? {
                Some(bus) => bus,
                None => return Err(Error::ReceiverEmpty.code()),
            };
        }
    }

    fn interrupt(&self, handle: Handle) -> RawResult<()> {
        let bus = self.lock()?;
        bus.port(handle)?;
        self.changed.notify_all();

        Ok(())
    }

    fn get_property(&self, handle: Option<Handle>, property: u16, buffer: &mut [u8]) -> RawResult<()> {
        let property = Property::from_id(property).ok_or(Error::NotSupported.code())?;
        let bus = self.lock()?;

        match property {
            Property::Spec => put(buffer, &API_VERSION.as_word().to_le_bytes()),
            Property::Version => put(buffer, &library_version().as_word().to_le_bytes()),
            Property::PatchNo => put(buffer, &[library_version().patch]),
            Property::BuildNo => put(buffer, &0u32.to_le_bytes()),
            Property::LibraryId => put(buffer, &LIBRARY_ID.to_le_bytes()),
            Property::LibraryVendor => put_string(buffer, VENDOR),
            Property::LibraryDllName => put_string(buffer, env!("CARGO_PKG_NAME")),
            Property::ChannelNo | Property::ChannelName | Property::ChannelDllName | Property::ChannelVendorName => {
                self.channel_property(&bus, property, buffer)
            }
            Property::SetFirstChannel | Property::SetNextChannel => Err(Error::NotSupported.code()),
            device => {
                let handle = handle.ok_or(Error::InvalidHandle.code())?;
                self.device_property(bus.port(handle)?, device, buffer)
            }
        }
    }

    fn set_property(&self, _handle: Option<Handle>, property: u16, _value: &[u8]) -> RawResult<()> {
        let property = Property::from_id(property).ok_or(Error::NotSupported.code())?;
        let mut bus = self.lock()?;

        let next = match property {
            Property::SetFirstChannel => 0,
            Property::SetNextChannel => bus.cursor.map_or(self.channels, |channel| channel + 1),
            _ => return Err(Error::NotSupported.code()),
        };

        if !self.is_valid_channel(next) {
            bus.cursor = None;
            return Err(Error::ResourceError.code());
        }

        bus.cursor = Some(next);
        Ok(())
    }

    fn version(&self) -> String {
        format!("CAN API V3 loopback driver, version {}", library_version())
    }
}

fn library_version() -> Version {
    Version {
        major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or_default(),
        minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or_default(),
        patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or_default(),
    }
}

/// Deadline of a blocking call, `None` waits forever
fn deadline(timeout: u16) -> Option<Instant> {
    match timeout {
        TIMEOUT_INFINITE => None,
        ms => Some(Instant::now() + Duration::from_millis(ms as u64)),
    }
}

fn put(buffer: &mut [u8], value: &[u8]) -> RawResult<()> {
    buffer
        .get_mut(..value.len())
        .ok_or(Error::IllegalParameter.code())?
        .copy_from_slice(value);

    Ok(())
}

fn put_string(buffer: &mut [u8], value: &str) -> RawResult<()> {
    encode_string(value, buffer).ok_or(Error::IllegalParameter.code())
}
