use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    extract::{BlockSizeRule, MAX_BLOCK_SIZE},
    filesystems::FsError,
    reader::{Endianness, Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

#[derive(Debug, Error)]
pub enum SquashError {
    #[error("Unable to read superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("Invalid SquashFS version: {0}")]
    InvalidSquashVersion(u16),
}

const SQUASHFS_MAGIC_LE: &[u8] = b"hsqs";
const SQUASHFS_MAGIC_BE: &[u8] = b"sqsh";

pub const SQUASHFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Squashfs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(SQUASHFS_MAGIC_LE, 0, Some(validate_squashfs))],
    block_size: BlockSizeRule::Direct {
        field: Field::le32(12),
        max: MAX_BLOCK_SIZE,
    },
};

pub const SQUASHFS3_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Squashfs3,
    usage: UsageType::Filesystem,
    rules: &[
        SignatureRule::new(SQUASHFS_MAGIC_BE, 0, Some(validate_squashfs3)),
        SignatureRule::new(SQUASHFS_MAGIC_LE, 0, Some(validate_squashfs3)),
    ],
    block_size: BlockSizeRule::Fixed(1024),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct SquashBlock {
    pub magic: [u8; 4],
    pub inode_count: [u8; 4],
    pub mod_time: [u8; 4],
    pub block_size: [u8; 4],
    pub frag_count: [u8; 4],
    pub compressor: [u8; 2],
    pub block_log: [u8; 2],
    pub flags: [u8; 2],
    pub id_count: [u8; 2],
    pub version_major: [u8; 2],
    pub version_minor: [u8; 2],
}

impl SquashBlock {
    pub fn version_major(&self, endianness: Endianness) -> u16 {
        match endianness {
            Endianness::Little => return u16::from_le_bytes(self.version_major),
            Endianness::Big => return u16::from_be_bytes(self.version_major),
        }
    }
}

pub fn probe_squashfs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), SquashError> {
    let sb: SquashBlock = buf.map_at(0)?;

    let vermaj = sb.version_major(Endianness::Little);
    if vermaj < 4 {
        return Err(SquashError::InvalidSquashVersion(vermaj));
    }

    return Ok(());
}

pub fn probe_squashfs3(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), SquashError> {
    let sb: SquashBlock = buf.map_at(0)?;

    let endianness = if rule.magic == SQUASHFS_MAGIC_BE {
        Endianness::Big
    } else {
        Endianness::Little
    };

    let vermaj = sb.version_major(endianness);
    if vermaj > 3 {
        return Err(SquashError::InvalidSquashVersion(vermaj));
    }

    return Ok(());
}

fn validate_squashfs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_squashfs(buf, rule)?);
}

fn validate_squashfs3(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_squashfs3(buf, rule)?);
}
