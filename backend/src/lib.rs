//! # Marine Monitor Backend
//!
//! Monitoring and reporting backend for marine sensor data: tide, wave,
//! wind and current readings, each stored in an observed (`obs`) and a
//! predicted (`pre`) table.
//!
//! ## Features
//!
//! - **Live data**: latest readings per stream with a last-known-value fallback
//! - **Data health**: per-field presence percentages, descriptive statistics
//!   and time-bucketed health charts
//! - **Merged views**: the four streams joined on timestamp and station,
//!   four-times-daily snapshots and hourly/6-hour averages
//! - **Administration**: roles, users, login sessions and application logs
//! - **HTTP API**: axum REST endpoints for the dashboard
//!
//! ## Architecture
//!
//! - [`models`]: observation, aggregate and user types
//! - [`db`]: repository traits, the SQL query builder and the local/Postgres backends
//! - [`services`]: domain logic on top of the repository traits
//! - [`config`]: TOML + environment configuration
//! - [`http`]: router, handlers and error mapping

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod config;
pub mod db;
pub mod models;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
#[cfg(feature = "http-server")]
pub mod logging;
