//! Worker brokering engine.
//!
//! Tracks connected worker clients and the tasks dispatched to them,
//! assigns jobs round-robin to idle workers, interprets the worker wire
//! protocol and reaps timed-out tasks and dead connections. Transport
//! agnostic: a worker connection is just an outbound frame channel.

pub mod dispatcher;
pub mod hub;
pub mod ledger;
pub mod messages;
pub mod processor;
pub mod reaper;
pub mod registry;

pub use dispatcher::{DispatchError, Dispatcher, GenerationRequest};
pub use hub::{HubSnapshot, WorkerHub};
