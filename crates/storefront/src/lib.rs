//! Bazaar Storefront library.
//!
//! The JSON API behind the shop frontend: catalog, blog, accounts and image
//! uploads. It is a library so the binary, the CLI and the integration tests
//! share one router and one set of services.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
