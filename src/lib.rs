#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

pub mod access;
pub mod cli;
pub mod config;
pub mod csv;
pub mod domain;
pub mod engine;
pub mod logging;
pub mod payments;
pub mod query;
pub mod store;
