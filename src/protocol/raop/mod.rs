//! RAOP (`AirPlay` 1) protocol implementation

pub mod encryption;
mod key_exchange;
pub mod session;

#[cfg(test)]
mod encryption_tests;
#[cfg(test)]
mod session_tests;

pub use encryption::{IvPolicy, PartialBlockPolicy, RaopDecryptor, RaopEncryptor};
pub use key_exchange::{AES_IV_SIZE, AES_KEY_SIZE, RaopSessionKeys, wrap_key_for_exchange};
pub use session::{
    RaopRtspSession, RaopSessionState, RaopTransport, SessionIdentifiers, TransportOffer,
};
