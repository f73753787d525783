//! Core types module

mod config;
mod receiver;


pub use config::{RaopConfig, RaopConfigBuilder, TransportMode};
pub use receiver::{JackKind, JackStatus};
