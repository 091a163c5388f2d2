pub mod common;
pub mod config;
pub mod device;
pub mod queue;
pub mod sync;
pub mod timer;
