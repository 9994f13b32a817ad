//! In-memory block device signature probing.
//!
//! Given the leading bytes of a device or image, identify which filesystem
//! (or swap / suspend area) it holds and report the block size the format
//! records. Nothing here performs I/O; callers hand in a byte slice.
//!
//! ```
//! use libmemblockid::{ProbeResult, probe_buffer};
//!
//! let result = probe_buffer(&[0u8; 4096], None).unwrap();
//! assert_eq!(result, ProbeResult::NoMatch);
//! ```

pub mod checksum;
pub mod extract;
pub mod filesystems;
pub mod matcher;
pub mod probe;
pub mod reader;
pub mod registry;
pub mod util;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use crate::{
    extract::{BlockSizeRule, ExtractError, MAX_BLOCK_SIZE},
    probe::{ConfigError, FormatMatch, Probe, ProbeConfig, ProbeConfigBuilder, ProbeResult},
    reader::{Endianness, Field, FieldWidth, ProbeBuffer, ReadError},
    registry::{
        BlockType, FormatDescriptor, REGISTRY, RegistryError, SignatureRule, UsageType,
        list_formats, lookup,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockidError {
    #[error("Invalid probe configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Registry lookup failed: {0}")]
    Registry(#[from] RegistryError),
}

/// Probe `buffer` against every registered format, or only those named in `filter`.
///
/// # Errors
/// Returns [`BlockidError::Config`] if `filter` is empty or names an
/// unregistered format.
pub fn probe_buffer(buffer: &[u8], filter: Option<&[&str]>) -> Result<ProbeResult, BlockidError> {
    let config = match filter {
        Some(names) => ProbeConfig::builder()
            .formats(names.iter().copied())
            .build()?,
        None => ProbeConfig::all(),
    };

    return Ok(probe::run(buffer, &config));
}

/// Names of every registered format, in registration order.
pub fn supported_formats() -> Vec<&'static str> {
    return list_formats();
}

/// Block size the named format records in `buffer`, `None` when unknown.
///
/// # Errors
/// Returns [`BlockidError::Registry`] if `name` is not a registered format.
pub fn block_size(name: &str, buffer: &[u8]) -> Result<Option<u64>, BlockidError> {
    return Ok(extract::block_size(name, buffer)?);
}
