//! querygate - gated query execution for an assistant-facing document store
//!
//! An assistant describes what it wants as a structured request. The
//! gateway validates it against fixed safety rules, promotes identifiers
//! and dates to native values, and runs at most one bounded store call.

pub mod cli;
pub mod gateway;
pub mod observability;
