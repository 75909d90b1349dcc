//! Adapters for the domain ports: stores, clocks and confirmation oracles.

pub mod clock;
pub mod in_memory;
pub mod oracle;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
