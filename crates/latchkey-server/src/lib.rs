//! Latchkey server
//!
//! HTTP shell over `latchkey_core::LockService`: configuration loading,
//! logging setup, routes and the Prometheus exporter.

pub mod api;
pub mod model;
pub mod startup;
