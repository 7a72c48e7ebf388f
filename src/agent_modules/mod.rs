pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod parser;
pub mod scheduler;
pub mod stats;
pub mod writer;
