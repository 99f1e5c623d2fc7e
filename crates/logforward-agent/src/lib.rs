//! Discovery and supervision for logforward
//!
//! The [`Agent`] polls every target's glob patterns, keeps exactly one
//! tailer per matched path, and owns the shutdown sequence: stop tailers,
//! close the queue, wait for the writer.

mod agent;
mod discovery;
mod strategy;

pub use agent::{Agent, QUEUE_CAPACITY};
pub use discovery::expand;
pub use strategy::{FileTailer, StdoutWriter, TailStrategy, WriteStrategy};
