use crate::bitrate::{Baudrate, Bitrate, CiaIndex, DataPhase, Nominal};
use crate::can::{ChannelController, ControllerState};
use crate::config::ChannelConfig;
use crate::error::Error;
use crate::loopback::{cia_timing, LoopbackBus, CAPABILITY, FREQUENCY};
use crate::message::{Message, MessageFlags, RawFrame, DLC};
use crate::mode::OperationMode;
use crate::status::ChannelState;
use crate::transport::Timeout;
use bytes::Bytes;
use embedded_can::{ExtendedId, Id, StandardId};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_write_read_scenario() {
    let bus = Arc::new(LoopbackBus::new(1));
    let mut controller = ChannelController::new(bus.clone());

    controller.initialize(0, OperationMode::DEFAULT).unwrap();
    controller.start(CiaIndex::Index250kbps.into()).unwrap();
    controller.write(&message(0x100, &[1, 2, 3]), Timeout::Polling).unwrap();

    let received = controller.read(Timeout::Infinite).unwrap().unwrap();
    assert_eq!(0x100, received.raw_id());
    assert_eq!(DLC::Three, received.dlc());
    assert_eq!(&[1, 2, 3], received.payload());

    controller.reset().unwrap();
    controller.teardown().unwrap();

    assert_eq!(ControllerState::Uninitialized, controller.state());
    assert_eq!(Error::InvalidHandle, controller.handle().unwrap_err());
    assert_eq!(
        ChannelState::Available,
        ChannelController::probe(&*bus, 0, OperationMode::DEFAULT).unwrap()
    );
}

#[test]
fn test_read_polling_empty() {
    let mut controller = running(&Arc::new(LoopbackBus::new(1)), 0);

    assert_eq!(None, controller.read(Timeout::Polling).unwrap());
}

#[test]
fn test_read_timeout_expires() {
    let mut controller = running(&Arc::new(LoopbackBus::new(1)), 0);

    let start = Instant::now();
    assert_eq!(None, controller.read(Timeout::Millis(20)).unwrap());
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn test_blocking_read_released_by_signal() {
    let mut controller = running(&Arc::new(LoopbackBus::new(1)), 0);
    let canceller = controller.canceller().unwrap();

    let thread = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.signal().unwrap();
    });

    assert_eq!(Error::Timeout, controller.read(Timeout::Infinite).unwrap_err());
    thread.join().unwrap();

    // signal stays active until the next start
    assert_eq!(Error::Timeout, controller.read(Timeout::Infinite).unwrap_err());
    controller.reset().unwrap();
    controller.start(CiaIndex::Index250kbps.into()).unwrap();
    assert_eq!(None, controller.read(Timeout::Millis(1)).unwrap());
}

#[test]
fn test_blocking_read_woken_by_other_channel() {
    let bus = Arc::new(LoopbackBus::new(2));
    let mut receiver = running(&bus, 1);
    let writer_bus = bus.clone();

    let thread = thread::spawn(move || {
        let mut writer = running(&writer_bus, 0);
        thread::sleep(Duration::from_millis(20));
        writer.write(&message(0x22, &[0xAA]), Timeout::Infinite).unwrap();
    });

    let received = receiver.read(Timeout::Millis(5000)).unwrap().unwrap();
    assert_eq!(0x22, received.raw_id());
    assert_eq!(&[0xAA], received.payload());
    thread.join().unwrap();
}

#[test]
fn test_delivery_to_running_channels_only() {
    let bus = Arc::new(LoopbackBus::new(3));
    let mut sender = running(&bus, 0);
    let mut receiver = running(&bus, 1);
    let mut stopped = ChannelController::new(bus.clone());
    stopped.initialize(2, OperationMode::DEFAULT).unwrap();

    sender.write(&message(0x10, &[1]), Timeout::Polling).unwrap();
    sender.write(&message(0x11, &[2]), Timeout::Polling).unwrap();

    // FIFO order
    assert_eq!(0x10, receiver.read_message(Timeout::Polling).unwrap().raw_id());
    assert_eq!(0x11, receiver.read_message(Timeout::Polling).unwrap().raw_id());
    assert_eq!(Error::ReceiverEmpty, receiver.read_message(Timeout::Polling).unwrap_err());

    stopped.start(CiaIndex::Index250kbps.into()).unwrap();
    assert_eq!(None, stopped.read(Timeout::Polling).unwrap());

    let statistics = sender.statistics().unwrap();
    assert_eq!(2, statistics.transmitted);
    assert_eq!(2, statistics.received);
}

#[test]
fn test_timestamps_increase() {
    let mut controller = running(&Arc::new(LoopbackBus::new(1)), 0);

    controller.write(&message(0x1, &[]), Timeout::Polling).unwrap();
    thread::sleep(Duration::from_millis(2));
    controller.write(&message(0x2, &[]), Timeout::Polling).unwrap();

    let first = controller.read_message(Timeout::Polling).unwrap();
    let second = controller.read_message(Timeout::Polling).unwrap();
    assert!(second.timestamp() > first.timestamp());
}

#[test]
fn test_channel_occupied() {
    let bus = Arc::new(LoopbackBus::new(1));
    let _first = running(&bus, 0);

    assert_eq!(
        ChannelState::Occupied,
        ChannelController::probe(&*bus, 0, OperationMode::DEFAULT).unwrap()
    );

    let mut second = ChannelController::new(bus.clone());
    assert_eq!(
        Error::ResourceError,
        second.initialize(0, OperationMode::DEFAULT).unwrap_err()
    );
    assert_eq!(ControllerState::Uninitialized, second.state());
}

#[test]
fn test_shared_access() {
    let bus = Arc::new(LoopbackBus::new(1));
    let config = ChannelConfig::new(0, OperationMode::SHARED_ACCESS, CiaIndex::Index125kbps.into());

    let mut first = ChannelController::open(bus.clone(), &config).unwrap();
    let mut second = ChannelController::open(bus.clone(), &config).unwrap();
    assert_ne!(first.handle().unwrap(), second.handle().unwrap());

    first.write(&message(0x7FF, &[9]), Timeout::Polling).unwrap();
    assert_eq!(0x7FF, second.read_message(Timeout::Polling).unwrap().raw_id());
    assert_eq!(0x7FF, first.read_message(Timeout::Polling).unwrap().raw_id());

    let mut exclusive = ChannelController::new(bus);
    assert_eq!(
        Error::ResourceError,
        exclusive.initialize(0, OperationMode::DEFAULT).unwrap_err()
    );
}

#[test]
fn test_drop_releases_channel() {
    let bus = Arc::new(LoopbackBus::new(1));
    let controller = running(&bus, 0);
    drop(controller);

    assert_eq!(
        ChannelState::Available,
        ChannelController::probe(&*bus, 0, OperationMode::DEFAULT).unwrap()
    );
}

#[test]
fn test_probe_unknown_channel() {
    let bus = LoopbackBus::new(1);

    assert_eq!(
        ChannelState::NotAvailable,
        ChannelController::probe(&bus, 5, OperationMode::DEFAULT).unwrap()
    );
    assert_eq!(
        ChannelState::NotAvailable,
        ChannelController::probe(&bus, -1, OperationMode::DEFAULT).unwrap()
    );
}

#[test]
fn test_unsupported_mode() {
    let bus = Arc::new(LoopbackBus::new(1));
    let mode = OperationMode::FD_OPERATION | OperationMode::NON_ISO_OPERATION;
    assert!(!CAPABILITY.contains(mode));

    assert_eq!(
        Error::IllegalParameter,
        ChannelController::probe(&*bus, 0, mode).unwrap_err()
    );
    assert_eq!(
        Error::IllegalParameter,
        ChannelController::new(bus).initialize(0, mode).unwrap_err()
    );
}

#[test]
fn test_open_start_failure_releases_channel() {
    let bus = Arc::new(LoopbackBus::new(1));
    // CAN FD needs bit-timing registers
    let config = ChannelConfig::new(0, OperationMode::FD_OPERATION, CiaIndex::Index500kbps.into());

    let result = ChannelController::open(bus.clone(), &config);

    assert_eq!(Error::InvalidBaudrate, result.err().unwrap());
    assert_eq!(
        ChannelState::Available,
        ChannelController::probe(&*bus, 0, OperationMode::DEFAULT).unwrap()
    );
}

#[test]
fn test_invalid_bitrate_registers() {
    let bus = Arc::new(LoopbackBus::new(1));
    let mut controller = ChannelController::new(bus);
    controller.initialize(0, OperationMode::DEFAULT).unwrap();

    let mut bitrate = cia_timing(CiaIndex::Index250kbps);
    bitrate.nominal.brp = 0;

    assert_eq!(
        Error::InvalidBaudrate,
        controller.start(Baudrate::Timing(bitrate)).unwrap_err()
    );
    assert_eq!(ControllerState::Stopped, controller.state());

    bitrate.nominal.brp = 8;
    bitrate.nominal.tseg2 = 129;
    assert_eq!(
        Error::InvalidBaudrate,
        controller.start(Baudrate::Timing(bitrate)).unwrap_err()
    );
}

#[test]
fn test_cia_timing_speed() {
    let bus = Arc::new(LoopbackBus::new(1));

    for (index, sample_point) in [
        (CiaIndex::Index1000kbps, 75.0),
        (CiaIndex::Index800kbps, 80.0),
        (CiaIndex::Index500kbps, 87.5),
        (CiaIndex::Index10kbps, 87.5),
    ] {
        let config = ChannelConfig::new(0, OperationMode::DEFAULT, index.into());
        let controller = ChannelController::open(bus.clone(), &config).unwrap();

        let speed = controller.speed().unwrap();
        assert_eq!(index.kbps() as f32 * 1000.0, speed.nominal.bus_speed);
        assert_eq!(sample_point, speed.nominal.sample_point);
        assert!(!speed.nominal.fd_operation_enabled);
        assert_eq!(cia_timing(index), controller.bitrate().unwrap());
    }
}

#[test]
fn test_fd_frames() {
    let bus = Arc::new(LoopbackBus::new(2));
    let mode = OperationMode::FD_OPERATION | OperationMode::BITRATE_SWITCHING;
    let config = ChannelConfig::new(0, mode, Baudrate::Timing(fd_bitrate()));
    let mut controller = ChannelController::open(bus.clone(), &config).unwrap();
    let mut classic = running(&bus, 1);

    let speed = controller.speed().unwrap();
    assert!(speed.nominal.fd_operation_enabled);
    assert!(speed.data.bitrate_switching_enabled);
    assert_eq!(500_000.0, speed.nominal.bus_speed);
    assert_eq!(2_000_000.0, speed.data.bus_speed);
    assert_eq!(80.0, speed.data.sample_point);

    let id = Id::Extended(ExtendedId::new(0x1234_5678).unwrap());
    let flags = MessageFlags::FD_LONG | MessageFlags::FD_FAST;
    let message = Message::new(id, flags, Bytes::from(vec![0x5A; 22])).unwrap();
    controller.write(&message, Timeout::Polling).unwrap();

    let received = controller.read_message(Timeout::Polling).unwrap();
    assert_eq!(DLC::TwentyFour, received.dlc());
    assert_eq!(&[0x5A; 22], &received.payload()[..22]);
    assert_eq!(&[0u8; 2], &received.payload()[22..]);
    assert!(received.flags().is_fd_fast_frame());
    assert!(received.flags().is_extended_frame());

    // classic controllers don't see CAN FD frames
    assert_eq!(None, classic.read(Timeout::Polling).unwrap());
}

#[test]
fn test_extended_frames_disabled() {
    let bus = Arc::new(LoopbackBus::new(2));
    let config = ChannelConfig::new(1, OperationMode::EXTENDED_FRAMES_DISABLED, Baudrate::default());
    let mut filtered = ChannelController::open(bus.clone(), &config).unwrap();
    let mut sender = running(&bus, 0);

    let id = Id::Extended(ExtendedId::new(0x1FFF_FFFF).unwrap());
    let message = Message::new(id, MessageFlags::STANDARD, Bytes::from_static(&[1])).unwrap();
    sender.write(&message, Timeout::Polling).unwrap();

    assert_eq!(None, filtered.read(Timeout::Polling).unwrap());
    assert_eq!(Error::IllegalParameter, filtered.write(&message, Timeout::Polling).unwrap_err());
    assert!(sender.read(Timeout::Polling).unwrap().is_some());
}

#[test]
fn test_monitor_mode_cannot_transmit() {
    let bus = Arc::new(LoopbackBus::new(1));
    let config = ChannelConfig::new(0, OperationMode::MONITOR_MODE, Baudrate::default());
    let mut controller = ChannelController::open(bus, &config).unwrap();

    assert_eq!(
        Error::IllegalParameter,
        controller.write(&message(0x1, &[]), Timeout::Polling).unwrap_err()
    );
}

#[test]
fn test_back_pressure() {
    let bus = Arc::new(LoopbackBus::with_capacity(1, 2));
    let mut controller = running(&bus, 0);

    controller.write(&message(0x1, &[1]), Timeout::Polling).unwrap();
    controller.write(&message(0x2, &[2]), Timeout::Polling).unwrap();

    assert_eq!(
        Error::TransmitterBusy,
        controller.write(&message(0x3, &[3]), Timeout::Polling).unwrap_err()
    );
    assert!(controller.status().unwrap().is_transmitter_busy);

    let start = Instant::now();
    assert_eq!(
        Error::TransmitterBusy,
        controller.write(&message(0x3, &[3]), Timeout::Millis(20)).unwrap_err()
    );
    assert!(start.elapsed() >= Duration::from_millis(20));

    assert_eq!(0x1, controller.read_message(Timeout::Polling).unwrap().raw_id());
    controller.write(&message(0x3, &[3]), Timeout::Polling).unwrap();
    assert!(!controller.status().unwrap().is_transmitter_busy);
}

#[test]
fn test_idle_channel_overruns_without_blocking_writer() {
    let bus = Arc::new(LoopbackBus::with_capacity(2, 4));
    let mut writer = running(&bus, 0);
    let idle = running(&bus, 1);

    for id in 1..=8 {
        writer.write(&message(id, &[id as u8]), Timeout::Polling).unwrap();
        assert_eq!(id, writer.read_message(Timeout::Polling).unwrap().raw_id() as u16);
    }

    let status = idle.status().unwrap();
    assert!(status.is_message_lost);
    assert!(status.is_queue_overrun);
    assert!(!status.is_receiver_empty);
    assert_eq!(4, idle.statistics().unwrap().received);
    assert_eq!(8, writer.statistics().unwrap().transmitted);

    let writer_status = writer.status().unwrap();
    assert!(!writer_status.is_queue_overrun);
    assert!(!writer_status.is_transmitter_busy);
}

#[test]
fn test_blocking_write_released_by_signal() {
    let bus = Arc::new(LoopbackBus::with_capacity(1, 1));
    let mut controller = running(&bus, 0);
    controller.write(&message(0x1, &[1]), Timeout::Polling).unwrap();

    let canceller = controller.canceller().unwrap();
    let thread = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.signal().unwrap();
    });

    assert_eq!(
        Error::Timeout,
        controller.write(&message(0x2, &[2]), Timeout::Infinite).unwrap_err()
    );
    thread.join().unwrap();
}

#[test]
fn test_status_messages() {
    let bus = Arc::new(LoopbackBus::new(1));
    let config = ChannelConfig::new(0, OperationMode::ERROR_FRAMES_ENABLED, Baudrate::default());
    let mut controller = ChannelController::open(bus.clone(), &config).unwrap();

    let mut frame = RawFrame {
        id: 0,
        flags: MessageFlags::STATUS.bits(),
        dlc: 1,
        ..Default::default()
    };
    frame.data[0] = 0x40;
    assert_eq!(1, bus.inject(0, frame).unwrap());

    let received = controller.read_message(Timeout::Polling).unwrap();
    assert!(received.flags().is_status_message());
    assert_eq!(&[0x40], received.payload());
    assert_eq!(1, controller.statistics().unwrap().errors);

    // dropped without error frames enabled
    let mut plain = running(&Arc::new(LoopbackBus::new(1)), 0);
    assert_eq!(None, plain.read(Timeout::Polling).unwrap());
}

#[test]
fn test_inject_overrun() {
    let bus = Arc::new(LoopbackBus::with_capacity(1, 1));
    let mut controller = running(&bus, 0);
    let frame = RawFrame {
        id: 0x42,
        dlc: 2,
        ..Default::default()
    };

    assert_eq!(1, bus.inject(0, frame).unwrap());
    assert_eq!(0, bus.inject(0, frame).unwrap());

    let status = controller.status().unwrap();
    assert!(status.is_message_lost);
    assert!(status.is_queue_overrun);
    assert!(!status.is_receiver_empty);
    assert!(!status.is_can_stopped);

    let received = controller.read_message(Timeout::Polling).unwrap();
    assert_eq!(&[0, 0], received.payload());
    assert!(controller.status().unwrap().is_receiver_empty);
}

#[test]
fn test_restart_clears_queue_and_counters() {
    let bus = Arc::new(LoopbackBus::new(1));
    let mut controller = running(&bus, 0);
    controller.write(&message(0x1, &[1]), Timeout::Polling).unwrap();

    controller.reset().unwrap();
    assert!(controller.status().unwrap().is_can_stopped);
    assert_eq!(Error::ControllerOffline, controller.read(Timeout::Polling).unwrap_err());

    controller.start(CiaIndex::Index250kbps.into()).unwrap();
    assert_eq!(None, controller.read(Timeout::Polling).unwrap());
    assert_eq!(0, controller.statistics().unwrap().transmitted);
}

#[test]
fn test_channel_list() {
    let bus = LoopbackBus::new(3);
    let channels = ChannelController::channels(&bus).unwrap();

    assert_eq!(3, channels.len());
    assert_eq!(2, channels[2].channel);
    assert_eq!("Loopback Channel 2", channels[2].name);
    assert_eq!("canapi", channels[0].vendor);
    assert_eq!("loopback", channels[0].driver);

    assert!(ChannelController::channels(&LoopbackBus::new(0)).unwrap().is_empty());
}

#[test]
fn test_properties() {
    let bus = Arc::new(LoopbackBus::new(1));
    let mut controller = ChannelController::new(bus.clone());

    // library properties without handle
    assert_eq!("3.0.0", controller.api_version().unwrap().to_string());
    assert_eq!("canapi", controller.library_info().unwrap().name);
    assert_eq!(Error::InvalidHandle, controller.device_info().unwrap_err());

    controller.initialize(0, OperationMode::DEFAULT).unwrap();
    assert_eq!("Loopback Channel 0", controller.device_info().unwrap().name);
    assert_eq!(CAPABILITY, controller.capability().unwrap());
    assert_eq!(OperationMode::DEFAULT, controller.mode().unwrap());
    assert_eq!(0, controller.bus_load().unwrap());
    assert!(controller.hardware_version().unwrap().starts_with("Loopback"));
    assert_eq!(Error::ControllerOffline, controller.speed().unwrap_err());
    assert!(ChannelController::version(&*bus).contains("loopback"));
}

fn running(bus: &Arc<LoopbackBus>, channel: i32) -> ChannelController<LoopbackBus> {
    let config = ChannelConfig::new(channel, OperationMode::DEFAULT, CiaIndex::Index250kbps.into());
    ChannelController::open(bus.clone(), &config).unwrap()
}

fn message(id: u16, data: &[u8]) -> Message {
    let id = Id::Standard(StandardId::new(id).unwrap());
    Message::new(id, MessageFlags::STANDARD, Bytes::copy_from_slice(data)).unwrap()
}

/// 500 kbit/s nominal and 2 Mbit/s data phase, both at 80%
fn fd_bitrate() -> Bitrate {
    Bitrate {
        frequency: FREQUENCY,
        nominal: Nominal {
            brp: 2,
            tseg1: 63,
            tseg2: 16,
            sjw: 16,
            sam: 0,
        },
        data: DataPhase {
            brp: 2,
            tseg1: 15,
            tseg2: 4,
            sjw: 4,
        },
    }
}
