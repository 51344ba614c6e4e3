//! Adapters at the edge of the engine.
//!
//! Inbound: the tool dispatcher and the JSONL call-log reader.
//! Outbound: CSV seed fixtures in, CSV account summary out.

pub mod csv;
pub mod dispatcher;
pub mod replay;
