//! Thread synchronization helpers

mod latch;

pub use latch::{AutoResetEvent, CountDownLatch};
