//! Application layer containing the core business logic orchestration.
//!
//! Three engines cover the money-movement surface: `AccountRegistry` for
//! account lifecycle, `TransferEngine` for immediate and OTP-confirmed
//! transfers, and `BillPaymentEngine` for settling obligations. Each one
//! validates against the ledger port and delegates the actual state
//! changes to the store's atomic operations.

pub mod accounts;
pub mod bills;
pub mod transfers;
