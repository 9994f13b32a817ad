use std::mem::offset_of;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::BigEndian,
    byteorder::LittleEndian, byteorder::U16, byteorder::U32, byteorder::U64,
};

use crate::{
    checksum::{CsumAlgorium, crc32c},
    extract::BlockSizeRule,
    filesystems::FsError,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
    util::in_range_inclusive,
};

#[derive(Debug, Error)]
pub enum XfsError {
    #[error("Unable to read superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("Invalid XFS header ranges")]
    InvalidHeaderRanges,
    #[error("Invalid XFS header version number")]
    InvalidHeaderVersion,
    #[error("Invalid XFS header features")]
    InvalidHeaderFeatures,
    #[error("XFS checksum failed, expected: \"{expected}\" and got: \"{got}\"")]
    ChecksumError {
        expected: CsumAlgorium,
        got: CsumAlgorium,
    },
}

pub const XFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Xfs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(b"XFSB", 0, Some(validate_xfs))],
    block_size: BlockSizeRule::Direct {
        field: Field::be32(4),
        max: XFS_MAX_BLOCKSIZE as u64,
    },
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct XfsSuperBlock {
    pub magicnum: U32<BigEndian>,
    pub blocksize: U32<BigEndian>,
    pub dblocks: U64<BigEndian>,
    pub rblocks: U64<BigEndian>,
    pub rextents: U64<BigEndian>,
    pub uuid: [u8; 16],
    pub logstart: U64<BigEndian>,
    pub rootino: U64<BigEndian>,
    pub rbmino: U64<BigEndian>,
    pub rsumino: U64<BigEndian>,
    pub rextsize: U32<BigEndian>,
    pub agblocks: U32<BigEndian>,
    pub agcount: U32<BigEndian>,
    pub rbmblocks: U32<BigEndian>,
    pub logblocks: U32<BigEndian>,

    pub versionnum: U16<BigEndian>,
    pub sectsize: U16<BigEndian>,
    pub inodesize: U16<BigEndian>,
    pub inopblock: U16<BigEndian>,
    pub fname: [u8; 12],
    pub blocklog: u8,
    pub sectlog: u8,
    pub inodelog: u8,
    pub inopblog: u8,
    pub agblklog: u8,
    pub rextslog: u8,
    pub inprogress: u8,
    pub imax_pct: u8,

    pub icount: U64<BigEndian>,
    pub ifree: U64<BigEndian>,
    pub fdblocks: U64<BigEndian>,
    pub frextents: U64<BigEndian>,
    pub uquotino: U64<BigEndian>,
    pub gquotino: U64<BigEndian>,
    pub qflags: U16<BigEndian>,
    pub flags: u8,
    pub shared_vn: u8,
    pub inoalignmt: U32<BigEndian>,
    pub unit: U32<BigEndian>,
    pub width: U32<BigEndian>,
    pub dirblklog: u8,
    pub logsectlog: u8,
    pub logsectsize: U16<BigEndian>,
    pub logsunit: U32<BigEndian>,
    pub features2: U32<BigEndian>,
    pub bad_features2: U32<BigEndian>,

    pub features_compat: U32<BigEndian>,
    pub features_ro_compat: U32<BigEndian>,
    pub features_incompat: U32<BigEndian>,
    pub features_log_incompat: U32<BigEndian>,
    /// Stored little-endian, unlike every other field.
    pub crc: U32<LittleEndian>,
    pub spino_align: U32<BigEndian>,
    pub pquotino: U64<BigEndian>,
    pub lsn: U64<BigEndian>,
    pub meta_uuid: [u8; 16],
    pub rrmapino: U64<BigEndian>,
}

const XFS_MIN_BLOCKSIZE_LOG: u8 = 9;
const XFS_MAX_BLOCKSIZE_LOG: u8 = 16;
const XFS_MIN_BLOCKSIZE: u32 = 1 << XFS_MIN_BLOCKSIZE_LOG;
const XFS_MAX_BLOCKSIZE: u32 = 1 << XFS_MAX_BLOCKSIZE_LOG;
const XFS_MIN_SECTORSIZE_LOG: u8 = 9;
const XFS_MAX_SECTORSIZE_LOG: u8 = 15;
const XFS_MIN_SECTORSIZE: u16 = 1 << XFS_MIN_SECTORSIZE_LOG;
const XFS_MAX_SECTORSIZE: u16 = 1 << XFS_MAX_SECTORSIZE_LOG;
const XFS_DINODE_MIN_LOG: u8 = 8;
const XFS_DINODE_MAX_LOG: u8 = 11;
const XFS_DINODE_MIN_SIZE: u16 = 1 << XFS_DINODE_MIN_LOG;
const XFS_DINODE_MAX_SIZE: u16 = 1 << XFS_DINODE_MAX_LOG;

const XFS_MAX_RTEXTSIZE: u64 = 1024 * 1024 * 1024;
const XFS_MIN_RTEXTSIZE: u64 = 4 * 1024;
const XFS_MIN_AG_BLOCKS: u64 = 64;

const XFS_SB_VERSION_NUMBITS: u16 = 0x000f;
const XFS_SB_VERSION_5: u16 = 5;
const XFS_SB_VERSION_MOREBITSBIT: u16 = 0x8000;
const XFS_SB_VERSION2_CRCBIT: u32 = 0x00000100;

fn xfs_max_dblocks(sb: &XfsSuperBlock) -> u64 {
    return u64::from(sb.agcount.get()) * u64::from(sb.agblocks.get());
}

fn xfs_min_dblocks(sb: &XfsSuperBlock) -> u64 {
    return u64::from(sb.agcount.get().saturating_sub(1)) * u64::from(sb.agblocks.get())
        + XFS_MIN_AG_BLOCKS;
}

fn xfs_ranges_valid(sb: &XfsSuperBlock) -> bool {
    let sectsize = sb.sectsize.get();
    let blocksize = sb.blocksize.get();
    let inodesize = sb.inodesize.get();
    let rtextsize = u64::from(sb.rextsize.get()) * u64::from(blocksize);
    let dblocks = sb.dblocks.get();

    return sb.agcount.get() != 0
        && in_range_inclusive(sectsize, XFS_MIN_SECTORSIZE, XFS_MAX_SECTORSIZE)
        && in_range_inclusive(sb.sectlog, XFS_MIN_SECTORSIZE_LOG, XFS_MAX_SECTORSIZE_LOG)
        && sectsize == 1 << sb.sectlog
        && in_range_inclusive(blocksize, XFS_MIN_BLOCKSIZE, XFS_MAX_BLOCKSIZE)
        && in_range_inclusive(sb.blocklog, XFS_MIN_BLOCKSIZE_LOG, XFS_MAX_BLOCKSIZE_LOG)
        && blocksize == 1 << sb.blocklog
        && in_range_inclusive(inodesize, XFS_DINODE_MIN_SIZE, XFS_DINODE_MAX_SIZE)
        && in_range_inclusive(sb.inodelog, XFS_DINODE_MIN_LOG, XFS_DINODE_MAX_LOG)
        && inodesize == 1 << sb.inodelog
        && sb.blocklog.checked_sub(sb.inodelog) == Some(sb.inopblog)
        && in_range_inclusive(rtextsize, XFS_MIN_RTEXTSIZE, XFS_MAX_RTEXTSIZE)
        && sb.imax_pct <= 100
        && dblocks != 0
        && dblocks <= xfs_max_dblocks(sb)
        && dblocks >= xfs_min_dblocks(sb);
}

/// Sanity check an XFS superblock, `sector` holding its first `sectsize` bytes.
pub fn xfs_verify(sb: &XfsSuperBlock, sector: &[u8]) -> Result<(), XfsError> {
    if !xfs_ranges_valid(sb) || sector.len() < size_of::<XfsSuperBlock>() {
        return Err(XfsError::InvalidHeaderRanges);
    }

    if (sb.versionnum.get() & XFS_SB_VERSION_NUMBITS) == XFS_SB_VERSION_5 {
        if (sb.versionnum.get() & XFS_SB_VERSION_MOREBITSBIT) == 0 {
            return Err(XfsError::InvalidHeaderVersion);
        }

        if (sb.features2.get() & XFS_SB_VERSION2_CRCBIT) == 0 {
            return Err(XfsError::InvalidHeaderFeatures);
        }

        let crc_offset = offset_of!(XfsSuperBlock, crc);
        let rest = crc_offset + 4;

        let csum = crc32c(&[&sector[..crc_offset], &[0u8; 4], &sector[rest..]]);

        if csum != sb.crc.get() {
            return Err(XfsError::ChecksumError {
                expected: CsumAlgorium::Crc32c(sb.crc.get()),
                got: CsumAlgorium::Crc32c(csum),
            });
        }
    }

    return Ok(());
}

pub fn probe_xfs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), XfsError> {
    let sb: XfsSuperBlock = buf.map_at(0)?;

    let sector = if xfs_ranges_valid(&sb) {
        buf.read_at(0, usize::from(sb.sectsize.get()))?
    } else {
        &[]
    };

    xfs_verify(&sb, sector)?;

    return Ok(());
}

fn validate_xfs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_xfs(buf, rule)?);
}
