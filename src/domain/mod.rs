//! Domain layer: the payment-string codec, purchase and subscription entities,
//! and the ports the application layer consumes.

pub mod amount;
pub mod checksum;
pub mod payload;
pub mod plan;
pub mod ports;
pub mod purchase;
pub mod subscription;
