//! Descriptor readiness for the session's single-threaded main flow

mod reactor;


pub use reactor::{EventHandler, Interest, Reactor, Registry, SharedHandler, is_readable};
