use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::LittleEndian,
    byteorder::U16, byteorder::U32, byteorder::U64,
};

use crate::{
    checksum::{CsumAlgorium, fletcher64},
    extract::{BlockSizeRule, MAX_BLOCK_SIZE},
    filesystems::FsError,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

#[derive(Debug, Error)]
pub enum ApfsError {
    #[error("Unable to read container superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("APFS checksum failed, expected: \"{expected}\" and got: \"{got}\"")]
    ChecksumError {
        expected: CsumAlgorium,
        got: CsumAlgorium,
    },
    #[error("APFS header error: {0}")]
    ApfsHeaderError(&'static str),
}

const APFS_OBJECT_TYPE_NX_SUPERBLOCK: u16 = 1;
const APFS_STANDARD_BLOCK_SIZE: u32 = 4096;
const APFS_MAGIC: [u8; 4] = *b"NXSB";

pub const APFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Apfs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(&APFS_MAGIC, 32, Some(validate_apfs))],
    block_size: BlockSizeRule::Direct {
        field: Field::le32(36),
        max: MAX_BLOCK_SIZE,
    },
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ApfsSuperBlock {
    pub checksum: U64<LittleEndian>,
    pub oid: U64<LittleEndian>,
    pub xid: U64<LittleEndian>,
    pub apfs_type: U16<LittleEndian>,
    pub flags: U16<LittleEndian>,
    pub subtype: U16<LittleEndian>,
    pub pad: U16<LittleEndian>,

    pub magic: [u8; 4],
    pub block_size: U32<LittleEndian>,
    pub block_count: U64<LittleEndian>,
    pub features: U64<LittleEndian>,
    pub read_only_features: U64<LittleEndian>,
    pub incompatible_features: U64<LittleEndian>,
    pub uuid: [u8; 16],
    pub padding: [u8; 4008],
}

const _: () = assert!(size_of::<ApfsSuperBlock>() == APFS_STANDARD_BLOCK_SIZE as usize);

pub fn probe_apfs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ApfsError> {
    let sb: ApfsSuperBlock = buf.map_at(0)?;

    // object header checksum covers everything after itself
    let csum = fletcher64(&sb.as_bytes()[size_of::<u64>()..]);
    if sb.checksum.get() != csum {
        return Err(ApfsError::ChecksumError {
            expected: CsumAlgorium::Fletcher64(sb.checksum.get()),
            got: CsumAlgorium::Fletcher64(csum),
        });
    }

    if sb.apfs_type.get() != APFS_OBJECT_TYPE_NX_SUPERBLOCK || sb.subtype.get() != 0 {
        return Err(ApfsError::ApfsHeaderError("not a container superblock object"));
    }

    if sb.pad.get() != 0 {
        return Err(ApfsError::ApfsHeaderError("object header padding is not zero"));
    }

    if sb.block_size.get() != APFS_STANDARD_BLOCK_SIZE {
        return Err(ApfsError::ApfsHeaderError("block size is not 4096"));
    }

    if sb.uuid == [0u8; 16] {
        return Err(ApfsError::ApfsHeaderError("container uuid is empty"));
    }

    return Ok(());
}

fn validate_apfs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_apfs(buf, rule)?);
}
