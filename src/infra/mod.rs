//! Process-lifetime background tasks.

pub mod sweeper;

pub use sweeper::SessionSweeper;
