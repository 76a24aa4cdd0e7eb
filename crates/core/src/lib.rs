//! Core types for relevel: errors, resource metadata and configuration loading.
//!
//! Every other crate in the workspace depends on this one for the
//! [`Resource`] accessor trait and the shared [`Error`] type.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod meta;

pub use config::{load_toml, parse_toml};
pub use error::{Error, Result};
pub use meta::{ObjectKey, ObjectMeta, Resource};
