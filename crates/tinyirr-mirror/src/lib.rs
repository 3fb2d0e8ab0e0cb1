//! Per-registry synchronization against IRR mirrors.
//!
//! Each configured registry gets one supervisor task that brings the
//! registry up from its last snapshot (or a fresh dump when the snapshot
//! is missing or corrupt) and then keeps it current over the NRTM
//! realtime stream. Registries share nothing but configuration and the
//! map handed to the query layer.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod nrtm;
pub mod stream;
pub mod supervisor;

pub use config::RegistryConfig;
pub use error::MirrorError;
pub use supervisor::{Registries, SharedIndex};

/// Result type for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
