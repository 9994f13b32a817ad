use std::mem::offset_of;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32, U64},
};

use crate::{
    checksum::{CsumAlgorium, crc32},
    extract::BlockSizeRule,
    filesystems::FsError,
    reader::{ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

#[derive(Debug, Error)]
pub enum ZoneFsError {
    #[error("Unable to read superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("zonefs checksum failed, expected: \"{expected}\" and got: \"{got}\"")]
    HeaderChecksumInvalid {
        expected: CsumAlgorium,
        got: CsumAlgorium,
    },
}

pub const ZONEFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::ZoneFs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(b"SFOZ", 0, Some(validate_zonefs))],
    block_size: BlockSizeRule::Fixed(4096),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ZoneFsBlock {
    pub s_magic: U32<LittleEndian>,
    pub s_crc: U32<LittleEndian>,
    pub s_label: [u8; 32],
    pub s_uuid: [u8; 16],
    pub s_features: U64<LittleEndian>,
    pub s_uid: U32<LittleEndian>,
    pub s_gid: U32<LittleEndian>,
    pub s_perm: U32<LittleEndian>,
    pub s_reserved: [u8; 4020],
}

const _: () = assert!(size_of::<ZoneFsBlock>() == 4096);

pub fn probe_zonefs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ZoneFsError> {
    let sb: ZoneFsBlock = buf.map_at(0)?;
    let bytes = sb.as_bytes();

    // the kernel seeds with ~0 and never inverts the result
    let csum = !crc32(&[
        &bytes[..offset_of!(ZoneFsBlock, s_crc)],
        &[0u8; 4],
        &bytes[offset_of!(ZoneFsBlock, s_label)..],
    ]);

    if csum != sb.s_crc.get() {
        return Err(ZoneFsError::HeaderChecksumInvalid {
            expected: CsumAlgorium::Crc32(sb.s_crc.get()),
            got: CsumAlgorium::Crc32(csum),
        });
    }

    return Ok(());
}

fn validate_zonefs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_zonefs(buf, rule)?);
}
