//! Money-movement engine behind a voice banking agent.
//!
//! The crate is split hexagonally: `domain` holds the entities and the
//! store ports, `application` the use-case engines, `infrastructure`
//! the store backends and `interfaces` the adapters that speak to the
//! outside world. Anything a caller can be told is a [`error::Rejection`]
//! whose `Display` text is the sentence to read out; infrastructure
//! faults stay errors and never reach the caller's ear.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
