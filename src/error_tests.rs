use crate::error::*;
use crate::protocol::crypto::CryptoError;
use std::io;

#[test]
fn test_error_display() {
    let err = RaopError::FrameInFlight { remaining: 600 };
    assert_eq!(err.to_string(), "frame in flight: 600 bytes still pending");

    let err = RaopError::Disconnected { channel: "data" };
    assert_eq!(err.to_string(), "data channel disconnected");
}

#[test]
fn test_error_is_recoverable() {
    assert!(RaopError::FrameInFlight { remaining: 1 }.is_recoverable());
    assert!(!RaopError::NotConnected.is_recoverable());
}

#[test]
fn test_error_is_connection_error() {
    assert!(RaopError::Disconnected { channel: "timing" }.is_connection_error());
    assert!(!RaopError::InvalidVolume(101).is_connection_error());
}

#[test]
fn test_error_from_io() {
    let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
    let err: RaopError = io_err.into();

    assert!(matches!(err, RaopError::Io(_)));
}

#[test]
fn test_error_from_crypto() {
    let err: RaopError = CryptoError::InvalidPublicKey.into();
    assert!(matches!(err, RaopError::Crypto(_)));
}

#[test]
fn test_error_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RaopError>();
}
