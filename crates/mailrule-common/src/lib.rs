//! MailRule Common - Shared types and utilities
//!
//! This crate provides the envelope context model, service configuration
//! and the error type shared across all MailRule components.

pub mod config;
pub mod error;
pub mod types;

pub use self::config::Config;
pub use error::{Error, Result};
pub use types::{Envelope, EnvelopeKey, EnvelopeValue, KeyLookup};
