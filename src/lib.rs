//! Versioned mod-development documentation served from local git mirrors.
//!
//! [`provider::ProviderRegistry`] is the entry point: build it from a
//! [`config::Config`], then call providers directly or send typed
//! [`protocol::Request`]s through [`protocol::dispatch`].

pub mod cache;
pub mod config;
pub mod docs;
pub mod protocol;
pub mod provider;
pub mod types;
