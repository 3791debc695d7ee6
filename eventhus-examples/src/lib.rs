//! Example implementations using the eventhus event sourcing runtime
//!
//! The banking example models accounts as aggregates driven through the
//! command buses. Run the `bank-demo` binary to see the worker-pool bus
//! handle several accounts at once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Banking example: accounts, deposits, withdrawals and ownership changes
pub mod banking;
