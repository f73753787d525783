//! Test doubles for exercising a session without a real receiver

pub mod mock_control;
pub mod mock_receiver;

pub use mock_control::{ControlCall, MockControlChannel};
pub use mock_receiver::MockReceiver;
