//! Threatgalaxy - Local MISP Galaxy Cache
//!
//! Maintains a local snapshot of the public MISP galaxy cluster corpus and
//! serves identifier, tag and wildcard-keyword lookups over it, expanding one
//! hop of cluster relations and normalizing records for graph-rendering
//! consumers.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod sink;
pub mod store;

pub use error::{GalaxyError, Result};
