//! FDSN web-service adapters for the discovery collaborators.

pub mod client;
pub mod mseed;
pub mod text;

pub use client::{EventQuery, FdsnClient, FdsnConfig};
