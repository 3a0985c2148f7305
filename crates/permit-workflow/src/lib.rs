//! Permit review workflow core.
//!
//! Hosts the role-gated review state machine, the fee calculator, and the invoice/payment
//! tracker, together with the configuration, telemetry, and error plumbing shared with the
//! HTTP service.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
