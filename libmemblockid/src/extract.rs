use thiserror::Error;

use crate::{
    matcher::magic_present,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{FormatDescriptor, RegistryError, SignatureRule, lookup},
    util::is_power_2,
};

/// Largest block size ever reported. Anything above is treated as garbage.
pub const MAX_BLOCK_SIZE: u64 = 1 << 20;

pub type ComputeFn = fn(&ProbeBuffer<'_>, &SignatureRule) -> Result<u64, ExtractError>;

/// How a format encodes its block size.
#[derive(Debug, Copy, Clone)]
pub enum BlockSizeRule {
    /// Integer field holding the size in bytes.
    Direct { field: Field, max: u64 },
    /// Exponent field `e`, block size is `base << e`.
    Shift { field: Field, base: u64, max: u64 },
    /// Format with a single block size.
    Fixed(u64),
    /// Size derived from several fields or from the matching signature.
    Computed(ComputeFn),
    /// Format records no block size.
    Unencoded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Unable to read block size field: {0}")]
    Read(#[from] ReadError),
    #[error("Block size field is zero")]
    Zero,
    #[error("Block size {0} is not a power of two")]
    NotPowerOfTwo(u64),
    #[error("Block size {size} exceeds limit of {max}")]
    TooLarge { size: u64, max: u64 },
    #[error("Block size exponent {0} overflows")]
    ExponentOverflow(u64),
    #[error("Invalid block size encoding: {0}")]
    InvalidEncoding(&'static str),
    #[error("Format does not encode a block size")]
    Unencoded,
}

fn shifted(base: u64, exponent: u64) -> Result<u64, ExtractError> {
    if exponent >= u64::from(u64::BITS) {
        return Err(ExtractError::ExponentOverflow(exponent));
    }

    let size = base
        .checked_mul(1u64 << exponent)
        .ok_or(ExtractError::ExponentOverflow(exponent))?;

    return Ok(size);
}

fn sanitize(size: u64, max: u64) -> Result<u64, ExtractError> {
    let max = max.min(MAX_BLOCK_SIZE);

    if size == 0 {
        return Err(ExtractError::Zero);
    }
    if !is_power_2(size) {
        return Err(ExtractError::NotPowerOfTwo(size));
    }
    if size > max {
        return Err(ExtractError::TooLarge { size, max });
    }

    return Ok(size);
}

/// Decode the block size of `desc` using the signature that matched.
///
/// # Errors
/// Returns [`ExtractError`] when the field can't be read or decodes to an
/// implausible value.
pub fn extract_block_size(
    desc: &FormatDescriptor,
    buffer: &ProbeBuffer<'_>,
    rule: &SignatureRule,
) -> Result<u64, ExtractError> {
    let (size, max) = match desc.block_size {
        BlockSizeRule::Direct { field, max } => (buffer.read_uint(field)?, max),
        BlockSizeRule::Shift { field, base, max } => {
            (shifted(base, buffer.read_uint(field)?)?, max)
        }
        BlockSizeRule::Fixed(size) => (size, MAX_BLOCK_SIZE),
        BlockSizeRule::Computed(compute) => (compute(buffer, rule)?, MAX_BLOCK_SIZE),
        BlockSizeRule::Unencoded => return Err(ExtractError::Unencoded),
    };

    return sanitize(size, max);
}

/// Block size of the named format as encoded in `buffer`.
///
/// The signature used for decoding is the first rule whose magic is present,
/// or the format's first rule when none is. Decoding failures are reported as
/// `Ok(None)`.
///
/// # Errors
/// Returns [`RegistryError::NotFound`] if `name` is not a registered format.
pub fn block_size(name: &str, buffer: &[u8]) -> Result<Option<u64>, RegistryError> {
    let desc = lookup(name)?;
    let buf = ProbeBuffer::new(buffer);

    let Some(rule) = desc
        .rules
        .iter()
        .find(|rule| magic_present(rule, &buf))
        .or_else(|| desc.rules.first())
    else {
        return Ok(None);
    };

    match extract_block_size(desc, &buf, rule) {
        Ok(size) => return Ok(Some(size)),
        Err(e) => {
            log::debug!("block_size - {name}: {e}");
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_bounds() {
        assert_eq!(shifted(1024, 0), Ok(1024));
        assert_eq!(shifted(1024, 2), Ok(4096));
        assert_eq!(shifted(1, 63), Ok(1 << 63));
        assert_eq!(shifted(1024, 60), Err(ExtractError::ExponentOverflow(60)));
        assert_eq!(shifted(1, 64), Err(ExtractError::ExponentOverflow(64)));
        assert_eq!(
            shifted(1, u64::from(u32::MAX)),
            Err(ExtractError::ExponentOverflow(u64::from(u32::MAX)))
        );
    }

    #[test]
    fn sanitize_rejects_implausible_sizes() {
        assert_eq!(sanitize(4096, 65536), Ok(4096));
        assert_eq!(sanitize(0, 65536), Err(ExtractError::Zero));
        assert_eq!(sanitize(3000, 65536), Err(ExtractError::NotPowerOfTwo(3000)));
        assert_eq!(
            sanitize(131072, 65536),
            Err(ExtractError::TooLarge {
                size: 131072,
                max: 65536
            })
        );
        assert_eq!(
            sanitize(1 << 21, u64::MAX),
            Err(ExtractError::TooLarge {
                size: 1 << 21,
                max: MAX_BLOCK_SIZE
            })
        );
    }

    #[test]
    fn unknown_format_name() {
        assert_eq!(
            block_size("reiserfs", &[0u8; 4096]),
            Err(RegistryError::NotFound("reiserfs".to_string()))
        );
    }
}
