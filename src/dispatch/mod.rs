//! Queue consumer that turns upload notifications into worker task launches.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, MessageOutcome, PollOutcome, SkipReason};
