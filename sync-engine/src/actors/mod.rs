//! Actor implementations for the sync engine
//!
//! - PollerActor: per-view polling of version chains while generation jobs run

pub mod poller;

pub use poller::{PollerActor, PollerArguments, PollerError, PollerMsg, PollingController};
