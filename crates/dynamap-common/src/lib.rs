//! dynamap Common - Shared types for the dynamap object mapper
//!
//! This crate provides functionality shared by every dynamap component:
//! - Error types and handling
//! - Configuration management
//! - The native attribute value type

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod value;

pub use config::Config;
pub use error::{CancellationReason, Error, Result, TransportError};
pub use value::Value;
