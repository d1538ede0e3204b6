//! GEM PROFIT: gem levelling profit estimator
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod config;
pub mod data;
pub mod engine;
pub mod storage;
pub mod types;
