//! Port traits the domain talks to; adapters provide the implementations.

pub mod config_port;
pub mod history_port;
pub mod report_port;
