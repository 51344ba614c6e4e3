//! Domain layer: entities, value objects and the ports the rest of the
//! crate is written against.

pub mod account;
pub mod bill;
pub mod otp;
pub mod ports;
pub mod transaction;
