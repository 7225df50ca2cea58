//! Harvest API client.
//!
//! `service` is the entry point; the other modules are its building blocks.

pub mod accumulator;
pub mod api_types;
pub mod auth;
pub mod cache;
pub mod client;
pub mod service;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use auth::Authorized;
pub use client::HttpTransport;
pub use service::HarvestService;
