pub mod catalog;
pub mod config;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod report;
pub mod retry;
pub mod select;
pub mod throughput;
pub mod transport;
