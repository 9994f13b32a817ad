use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    checksum::{CsumAlgorium, crc32c, sha256, xxh64},
    extract::BlockSizeRule,
    filesystems::FsError,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

#[derive(Debug, Error)]
pub enum BtrfsError {
    #[error("Unable to read superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("Btrfs checksum failed, expected: \"{expected}\" and got: \"{got}\"")]
    ChecksumError {
        expected: CsumAlgorium,
        got: CsumAlgorium,
    },
}

/// Primary superblock copy.
const BTRFS_SUPER_OFFSET: u64 = 0x10000;
const BTRFS_SUPER_SIZE: usize = 4096;
/// Checksummed bytes start right after the csum field.
const BTRFS_CSUM_SIZE: usize = 32;

const BTRFS_CSUM_TYPE_CRC32: u16 = 0;
const BTRFS_CSUM_TYPE_XXHASH: u16 = 1;
const BTRFS_CSUM_TYPE_SHA256: u16 = 2;

pub const BTRFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Btrfs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(
        b"_BHRfS_M",
        BTRFS_SUPER_OFFSET + 0x40,
        Some(validate_btrfs),
    )],
    block_size: BlockSizeRule::Direct {
        field: Field::le32(BTRFS_SUPER_OFFSET + 0x90),
        max: 65536,
    },
};

/// Fixed leading part of the superblock, up to the checksum type.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct BtrfsSuperBlock {
    pub csum: [u8; 32],
    pub fsid: [u8; 16],
    pub bytenr: U64<LittleEndian>,
    pub flags: U64<LittleEndian>,
    pub magic: [u8; 8],
    pub generation: U64<LittleEndian>,
    pub root: U64<LittleEndian>,
    pub chunk_root: U64<LittleEndian>,
    pub log_root: U64<LittleEndian>,
    pub log_root_transid: U64<LittleEndian>,
    pub total_bytes: U64<LittleEndian>,
    pub bytes_used: U64<LittleEndian>,
    pub root_dir_objectid: U64<LittleEndian>,
    pub num_devices: U64<LittleEndian>,
    pub sectorsize: U32<LittleEndian>,
    pub nodesize: U32<LittleEndian>,
    pub leafsize: U32<LittleEndian>,
    pub stripesize: U32<LittleEndian>,
    pub sys_chunk_array_size: U32<LittleEndian>,
    pub chunk_root_generation: U64<LittleEndian>,
    pub compat_flags: U64<LittleEndian>,
    pub compat_ro_flags: U64<LittleEndian>,
    pub incompat_flags: U64<LittleEndian>,
    pub csum_type: U16<LittleEndian>,
}

const _: () = assert!(size_of::<BtrfsSuperBlock>() == 0xC6);

fn verify_btrfs_checksum(sb: &BtrfsSuperBlock, block: &[u8]) -> Result<(), BtrfsError> {
    let data = &block[BTRFS_CSUM_SIZE..];

    let (expected, got) = match sb.csum_type.get() {
        BTRFS_CSUM_TYPE_CRC32 => (
            CsumAlgorium::Crc32c(u32::from_le_bytes([
                sb.csum[0], sb.csum[1], sb.csum[2], sb.csum[3],
            ])),
            CsumAlgorium::Crc32c(crc32c(&[data])),
        ),
        BTRFS_CSUM_TYPE_XXHASH => {
            let mut stored = [0u8; 8];
            stored.copy_from_slice(&sb.csum[..8]);

            (
                CsumAlgorium::Xxh64(u64::from_le_bytes(stored)),
                CsumAlgorium::Xxh64(xxh64(data, 0)),
            )
        }
        BTRFS_CSUM_TYPE_SHA256 => (CsumAlgorium::Sha256(sb.csum), CsumAlgorium::Sha256(sha256(data))),
        other => {
            log::debug!("verify_btrfs_checksum - unsupported csum_type {other}, skipping");
            return Ok(());
        }
    };

    if expected != got {
        return Err(BtrfsError::ChecksumError { expected, got });
    }

    return Ok(());
}

pub fn probe_btrfs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), BtrfsError> {
    let sb: BtrfsSuperBlock = buf.map_at(BTRFS_SUPER_OFFSET)?;
    let block = buf.read_at(BTRFS_SUPER_OFFSET, BTRFS_SUPER_SIZE)?;

    verify_btrfs_checksum(&sb, block)?;

    return Ok(());
}

fn validate_btrfs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_btrfs(buf, rule)?);
}
