use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32},
};

use crate::{
    checksum::{CsumAlgorium, crc32c},
    extract::{BlockSizeRule, MAX_BLOCK_SIZE},
    filesystems::FsError,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
    util::in_range_inclusive,
};

#[derive(Debug, Error)]
pub enum ErofsError {
    #[error("Unable to read superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("Invalid block size bits: {0}")]
    InvalidBlockSizeBits(u8),
    #[error("EROFS checksum failed, expected: \"{expected}\" and got: \"{got}\"")]
    ChecksumError {
        expected: CsumAlgorium,
        got: CsumAlgorium,
    },
}

const EROFS_SUPER_OFFSET: u64 = 1024;
const EROFS_FEATURE_SB_CSUM: u32 = 0x0000_0001;

pub const EROFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Erofs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(
        &[0xE2, 0xE1, 0xF5, 0xE0],
        EROFS_SUPER_OFFSET,
        Some(validate_erofs),
    )],
    block_size: BlockSizeRule::Shift {
        field: Field::u8(EROFS_SUPER_OFFSET + 12),
        base: 1,
        max: MAX_BLOCK_SIZE,
    },
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ErofsSuperBlock {
    pub magic: U32<LittleEndian>,
    pub checksum: U32<LittleEndian>,
    pub feature_compat: U32<LittleEndian>,
    pub blkszbits: u8,
    pub sb_extslots: u8,
}

fn verify_erofs_checksum(buf: &ProbeBuffer<'_>, sb: &ErofsSuperBlock) -> Result<(), ErofsError> {
    // crc covers the rest of the first block, starting at the superblock
    let len = (1usize << sb.blkszbits)
        .checked_sub(EROFS_SUPER_OFFSET as usize)
        .filter(|len| *len >= size_of::<ErofsSuperBlock>())
        .ok_or(ErofsError::InvalidBlockSizeBits(sb.blkszbits))?;
    let region = buf.read_at(EROFS_SUPER_OFFSET, len)?;

    let got = !crc32c(&[&region[..4], &[0u8; 4], &region[8..]]);
    let expected = sb.checksum.get();

    if got != expected {
        return Err(ErofsError::ChecksumError {
            expected: CsumAlgorium::Crc32c(expected),
            got: CsumAlgorium::Crc32c(got),
        });
    }

    return Ok(());
}

pub fn probe_erofs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ErofsError> {
    let sb: ErofsSuperBlock = buf.map_at(EROFS_SUPER_OFFSET)?;

    if !in_range_inclusive(sb.blkszbits, 9, 16) {
        return Err(ErofsError::InvalidBlockSizeBits(sb.blkszbits));
    }

    if sb.feature_compat.get() & EROFS_FEATURE_SB_CSUM != 0 {
        verify_erofs_checksum(buf, &sb)?;
    }

    return Ok(());
}

fn validate_erofs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_erofs(buf, rule)?);
}
