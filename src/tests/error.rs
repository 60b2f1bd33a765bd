use crate::error::{check, Error};

#[test]
fn test_error_from_code() {
    assert_eq!(None, Error::from_code(0));
    assert_eq!(Some(Error::BusOff), Error::from_code(-1));
    assert_eq!(Some(Error::ErrorWarning), Error::from_code(-2));
    assert_eq!(Some(Error::BusError), Error::from_code(-3));
    assert_eq!(Some(Error::ControllerOnline), Error::from_code(-8));
    assert_eq!(Some(Error::ControllerOffline), Error::from_code(-9));
    assert_eq!(Some(Error::MessageLost), Error::from_code(-10));
    assert_eq!(Some(Error::TransmitterBusy), Error::from_code(-20));
    assert_eq!(Some(Error::ReceiverEmpty), Error::from_code(-30));
    assert_eq!(Some(Error::ErrorFrame), Error::from_code(-40));
    assert_eq!(Some(Error::Timeout), Error::from_code(-50));
    assert_eq!(Some(Error::ResourceError), Error::from_code(-90));
    assert_eq!(Some(Error::InvalidBaudrate), Error::from_code(-91));
    assert_eq!(Some(Error::InvalidHandle), Error::from_code(-92));
    assert_eq!(Some(Error::IllegalParameter), Error::from_code(-93));
    assert_eq!(Some(Error::NullPointer), Error::from_code(-94));
    assert_eq!(Some(Error::NotInitialized), Error::from_code(-95));
    assert_eq!(Some(Error::AlreadyInitialized), Error::from_code(-96));
    assert_eq!(Some(Error::InvalidLibrary), Error::from_code(-97));
    assert_eq!(Some(Error::NotSupported), Error::from_code(-98));
    assert_eq!(Some(Error::Fatal), Error::from_code(-99));
}

#[test]
fn test_error_code_stable() {
    for code in (-200..=-1).chain([1, 42, i32::MAX, i32::MIN]) {
        let error = Error::from(code);

        match error {
            Error::Fatal if code != -99 => assert!(code > -100),
            Error::VendorSpecific(vendor) => assert_eq!(code, vendor),
            _ => assert_eq!(code, error.code()),
        }
    }
}

#[test]
fn test_unknown_codes() {
    assert_eq!(Error::Fatal, Error::from(-42));
    assert_eq!(Error::Fatal, Error::from(17));
    assert_eq!(Error::Fatal, Error::from(0));
    assert_eq!(Error::VendorSpecific(-100), Error::from(-100));
    assert_eq!(Error::VendorSpecific(-2000), Error::from(-2000));
    assert_eq!(-2000, Error::VendorSpecific(-2000).code());
}

#[test]
fn test_check() {
    assert_eq!(Ok(()), check(0));
    assert_eq!(Err(Error::ReceiverEmpty), check(-30));
}

#[test]
fn test_bus_state() {
    assert!(Error::BusOff.is_bus_state());
    assert!(Error::ErrorWarning.is_bus_state());
    assert!(Error::BusError.is_bus_state());
    assert!(!Error::Timeout.is_bus_state());
}

#[test]
fn test_display() {
    assert_eq!("receiver empty", Error::ReceiverEmpty.to_string());
    assert_eq!("vendor-specific error (-123)", Error::VendorSpecific(-123).to_string());
}
