#![cfg_attr(feature = "strict", deny(warnings))]
#![allow(clippy::identity_op)]

//! # Vendor-neutral CAN API
//!
//! Drives a CAN channel through its operation states and exchanges frames with it,
//! independent of the driver underneath. The driver is plugged in through the
//! [transport::Transport] trait.
//!
//! Crate currently offer the following features:
//! * CAN2.0 and CAN FD format support
//! * Standard and extended ID formats for CAN frames
//! * Bit-rate setup by bit-timing registers or CiA index
//! * Blocking reads and writes with timeout, cancellable from another thread
//! * Status, statistics and device/library properties
//! * In-process [loopback] bus for testing without hardware
//!
//!## CAN Tx/Rx example
//!
//!```
//!use std::sync::Arc;
//!use canapi::bitrate::CiaIndex;
//!use canapi::can::ChannelController;
//!use canapi::config::ChannelConfig;
//!use canapi::loopback::LoopbackBus;
//!use canapi::message::{Message, MessageFlags};
//!use canapi::mode::OperationMode;
//!use canapi::transport::Timeout;
//!use bytes::Bytes;
//!use embedded_can::{Id, StandardId};
//!
//!let bus = Arc::new(LoopbackBus::new(1));
//!
//! // Initialize and start the channel
//!let config = ChannelConfig::new(0, OperationMode::DEFAULT, CiaIndex::Index500kbps.into());
//!let mut controller = ChannelController::open(bus, &config).unwrap();
//!
//! // Create message frame
//!let can_id = Id::Standard(StandardId::new(0x55).unwrap());
//!let payload = Bytes::copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
//!let message = Message::new(can_id, MessageFlags::STANDARD, payload).unwrap();
//!
//! // Transmit CAN message
//!controller.write(&message, Timeout::Polling).unwrap();
//!
//! // Receive CAN message
//!let received = controller.read(Timeout::Millis(100)).unwrap().unwrap();
//!assert_eq!(received.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
//!
//! // Nothing left in the queue
//!assert!(controller.read(Timeout::Polling).unwrap().is_none());
//!
//!controller.reset().unwrap();
//!controller.teardown().unwrap();
//!```

pub mod bitrate;
pub mod can;
pub mod config;
pub mod error;
pub mod loopback;
pub mod message;
pub mod mode;
pub mod property;
pub mod status;
pub mod transport;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod mocks;
#[cfg(test)]
mod tests;
