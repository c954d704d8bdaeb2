//! # SageSync Common Library
//!
//! Shared code for the SAGE synchronization services including:
//! - Domain model (LSM images, samples, tiles, data sets)
//! - Error types
//! - Configuration loading
//! - Database pool and schema bootstrap

pub mod config;
pub mod db;
pub mod error;
pub mod model;

pub use error::{Error, Result};
