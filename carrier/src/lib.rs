//! Service wiring for carrier: configuration loading and the controller
//! that runs the queue processor until shutdown.

pub mod config;
pub mod controller;

pub use controller::{Carrier, SHUTDOWN_BROADCAST};
