use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    extract::{BlockSizeRule, ExtractError},
    filesystems::FsError,
    reader::{ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
    util::is_power_2,
};

#[derive(Debug, Error)]
pub enum NtfsError {
    #[error("Unable to read boot sector: {0}")]
    ReadError(#[from] ReadError),
    #[error("NTFS header error: {0}")]
    NtfsHeaderError(&'static str),
}

pub const NTFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Ntfs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(b"NTFS    ", 3, Some(validate_ntfs))],
    block_size: BlockSizeRule::Computed(ntfs_cluster_size),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct NtfsSuperBlock {
    pub bootjmp: [u8; 3],
    pub oem_id: [u8; 8],

    pub sector_size: U16<LittleEndian>,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: U16<LittleEndian>,
    pub fats: u8,
    pub root_entries: U16<LittleEndian>,
    pub sectors: U16<LittleEndian>,
    pub media_type: u8,
    pub sectors_per_fat: U16<LittleEndian>,
    pub sectors_per_track: U16<LittleEndian>,
    pub heads: U16<LittleEndian>,
    pub hidden_sectors: U32<LittleEndian>,
    pub large_sectors: U32<LittleEndian>,

    pub unused: [U16<LittleEndian>; 2],
    pub number_of_sectors: U64<LittleEndian>,
    pub mft_cluster_location: U64<LittleEndian>,
    pub mft_mirror_cluster_location: U64<LittleEndian>,
    pub clusters_per_mft_record: i8,
    pub reserved1: [u8; 3],
    pub cluster_per_index_record: i8,
    pub reserved2: [u8; 3],
    pub volume_serial: [u8; 8],
    pub checksum: U32<LittleEndian>,
}

const NTFS_MAX_CLUSTER_SIZE: u64 = 2 * 1024 * 1024;

/// Cluster geometry of a boot sector, as (sector_size, sectors_per_cluster).
fn ntfs_geometry(ns: &NtfsSuperBlock) -> Result<(u64, u64), NtfsError> {
    let sector_size = u64::from(ns.sector_size.get());

    if !(256..=4096).contains(&sector_size) || !is_power_2(sector_size) {
        return Err(NtfsError::NtfsHeaderError("invalid sector size"));
    }

    // values above 128 encode a negative power of two
    let sectors_per_cluster: u64 = match ns.sectors_per_cluster {
        1 | 2 | 4 | 8 | 16 | 32 | 64 | 128 => u64::from(ns.sectors_per_cluster),
        240..=249 => 1 << (256 - u32::from(ns.sectors_per_cluster)),
        _ => return Err(NtfsError::NtfsHeaderError("invalid sectors per cluster")),
    };

    if sector_size * sectors_per_cluster > NTFS_MAX_CLUSTER_SIZE {
        return Err(NtfsError::NtfsHeaderError("cluster size too large"));
    }

    return Ok((sector_size, sectors_per_cluster));
}

pub fn check_ntfs(ns: &NtfsSuperBlock) -> Result<(), NtfsError> {
    let (_, sectors_per_cluster) = ntfs_geometry(ns)?;

    if ns.reserved_sectors.get() != 0
        || ns.root_entries.get() != 0
        || ns.sectors.get() != 0
        || ns.sectors_per_fat.get() != 0
        || ns.large_sectors.get() != 0
        || ns.fats != 0
    {
        return Err(NtfsError::NtfsHeaderError("unused fields must be zero"));
    }

    // either a negative shift (0xe1..=0xf7) or a small power of two cluster count
    let mft_record = ns.clusters_per_mft_record as u8;
    if !(0xe1..=0xf7).contains(&mft_record) && !matches!(mft_record, 1 | 2 | 4 | 8 | 16 | 32 | 64)
    {
        return Err(NtfsError::NtfsHeaderError("invalid clusters per MFT record"));
    }

    let nr_clusters = ns.number_of_sectors.get() / sectors_per_cluster;

    if ns.mft_cluster_location.get() > nr_clusters
        || ns.mft_mirror_cluster_location.get() > nr_clusters
    {
        return Err(NtfsError::NtfsHeaderError("MFT lies outside the volume"));
    }

    return Ok(());
}

pub fn probe_ntfs(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), NtfsError> {
    let ns: NtfsSuperBlock = buf.map_at(0)?;

    check_ntfs(&ns)?;

    return Ok(());
}

fn validate_ntfs(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_ntfs(buf, rule)?);
}

fn ntfs_cluster_size(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<u64, ExtractError> {
    let ns: NtfsSuperBlock = buf.map_at(0)?;

    let Ok((sector_size, sectors_per_cluster)) = ntfs_geometry(&ns) else {
        return Err(ExtractError::InvalidEncoding("NTFS cluster geometry"));
    };

    return Ok(sector_size * sectors_per_cluster);
}
