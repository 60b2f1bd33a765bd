use crate::bitrate::BitrateSetting;
use crate::message::RawFrame;
use crate::mode::OperationMode;
use crate::transport::{CancelToken, Handle, RawResult, Transport};
use mockall::mock;

mock! {
    pub Transport {}

    impl Transport for Transport {
        fn probe(&self, channel: i32, mode: OperationMode) -> RawResult<i32>;
        fn open(&self, channel: i32, mode: OperationMode) -> RawResult<Handle>;
        fn close(&self, handle: Handle) -> RawResult<()>;
        fn start(&self, handle: Handle, bitrate: &BitrateSetting) -> RawResult<()>;
        fn stop(&self, handle: Handle) -> RawResult<()>;
        fn send(&self, handle: Handle, frame: &RawFrame, timeout: u16, cancel: &CancelToken) -> RawResult<()>;
        fn receive(&self, handle: Handle, timeout: u16, cancel: &CancelToken) -> RawResult<RawFrame>;
        fn interrupt(&self, handle: Handle) -> RawResult<()>;
        fn get_property(&self, handle: Option<Handle>, property: u16, buffer: &mut [u8]) -> RawResult<()>;
        fn set_property(&self, handle: Option<Handle>, property: u16, value: &[u8]) -> RawResult<()>;
        fn version(&self) -> String;
    }
}
