//! Library crate for camscan-rs: bulk IPv4 range scanning for camera web UIs.
pub mod config;
pub mod control;
pub mod countries;
pub mod error;
pub mod expand;
pub mod probe;
pub mod ranges;
pub mod registry;
pub mod scanner;
pub mod server;
pub mod sink;
pub mod types;
