//! Ride and profile synchronisation layer for the carpool client.
//!
//! The [`domain`] module owns the query cache, the optimistic mutation
//! protocol and the ride/profile services. [`outbound`] binds the domain
//! ports to the hosted backend and [`inbound`] drives the services from a
//! terminal.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{ClientSettings, SettingsError};
