//! Relay: dispatcher plus the loop that feeds it from a messaging adapter

pub mod dispatcher;
pub mod runner;

pub use dispatcher::Dispatcher;
pub use runner::{handle_event, run};
