//! TOML loading helpers shared by every configuration type.

use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

/// Parse a TOML document into `T`.
///
/// # Errors
///
/// Returns [`Error::TomlParseFailed`] when the document is not valid TOML or
/// does not match `T`.
pub fn parse_toml<T: DeserializeOwned>(input: &str) -> Result<T> {
    toml::from_str(input).map_err(|e| Error::toml_parse_failed(e.to_string()))
}

/// Read and parse a TOML file into `T`.
///
/// # Errors
///
/// Returns [`Error::FileReadFailed`] when the file cannot be read and
/// [`Error::TomlParseFailed`] when it cannot be parsed.
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading TOML configuration");
    let contents =
        std::fs::read_to_string(path).map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    parse_toml(&contents)
}
