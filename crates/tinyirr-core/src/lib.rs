//! Core types for the tinyirr IRR cache.
//!
//! This crate is the pure data plane, free of any network I/O:
//!
//! - **Prefixes**: parsing, rendering and canonicalization ([`prefix`])
//! - **RPSL**: object parsing for `route`, `route6` and `as-set` ([`rpsl`])
//! - **Index**: the per-registry in-memory tables ([`index`])
//! - **Snapshots**: the framed binary on-disk format ([`snapshot`])
//! - **Expansion**: as-set macro resolution with cycle handling ([`expand`])

pub mod error;
pub mod expand;
pub mod index;
pub mod prefix;
pub mod rpsl;
pub mod snapshot;

pub use error::CoreError;
pub use index::RegistryIndex;
pub use prefix::{Family, Prefix, Prefix4, Prefix6};

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
