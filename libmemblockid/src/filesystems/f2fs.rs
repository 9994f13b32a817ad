use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32},
};

use crate::{
    extract::{BlockSizeRule, MAX_BLOCK_SIZE},
    filesystems::FsError,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
    util::in_range_inclusive,
};

#[derive(Debug, Error)]
pub enum F2fsError {
    #[error("Unable to read superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("Invalid log sector size: {0}")]
    InvalidSectorSize(u32),
    #[error("Block size geometry inconsistent: sector {sector} + per_block {per_block} != block {block}")]
    InconsistentGeometry { sector: u32, per_block: u32, block: u32 },
}

const F2FS_SUPER_OFFSET: u64 = 0x400;

pub const F2FS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::F2fs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(
        &[0x10, 0x20, 0xF5, 0xF2],
        F2FS_SUPER_OFFSET,
        Some(validate_f2fs),
    )],
    block_size: BlockSizeRule::Shift {
        field: Field::le32(F2FS_SUPER_OFFSET + 0x10),
        base: 1,
        max: MAX_BLOCK_SIZE,
    },
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct F2fsSuperBlock {
    pub magic: U32<LittleEndian>,
    pub major_ver: U16<LittleEndian>,
    pub minor_ver: U16<LittleEndian>,
    pub log_sectorsize: U32<LittleEndian>,
    pub log_sectors_per_block: U32<LittleEndian>,
    pub log_blocksize: U32<LittleEndian>,
    pub log_blocks_per_seg: U32<LittleEndian>,
}

pub fn probe_f2fs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), F2fsError> {
    let sb: F2fsSuperBlock = buf.map_at(F2FS_SUPER_OFFSET)?;

    let sector = sb.log_sectorsize.get();
    let per_block = sb.log_sectors_per_block.get();
    let block = sb.log_blocksize.get();

    if !in_range_inclusive(sector, 9, 12) {
        return Err(F2fsError::InvalidSectorSize(sector));
    }

    if sector.checked_add(per_block) != Some(block) {
        return Err(F2fsError::InconsistentGeometry {
            sector,
            per_block,
            block,
        });
    }

    return Ok(());
}

fn validate_f2fs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_f2fs(buf, rule)?);
}
