use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::LittleEndian,
    byteorder::U16, byteorder::U32, byteorder::U64,
};

use crate::{
    checksum::{CsumAlgorium, exfat_boot_checksum},
    extract::{BlockSizeRule, ExtractError},
    filesystems::FsError,
    reader::{ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
    util::in_range_inclusive,
};

#[derive(Debug, Error)]
pub enum ExFatError {
    #[error("Unable to read boot region: {0}")]
    ReadError(#[from] ReadError),
    #[error("Not an exFAT boot sector: {0}")]
    UnknownFilesystem(&'static str),
    #[error("exFAT header error: {0}")]
    ExfatHeaderError(&'static str),
    #[error("exFAT checksum failed, expected: \"{expected}\" and got: \"{got}\"")]
    ChecksumError {
        expected: CsumAlgorium,
        got: CsumAlgorium,
    },
}

pub const EXFAT_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Exfat,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(b"EXFAT   ", 3, Some(validate_exfat))],
    block_size: BlockSizeRule::Computed(exfat_cluster_size),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ExFatSuperBlock {
    pub bootjmp: [u8; 3],
    pub fs_name: [u8; 8],
    pub must_be_zero: [u8; 53],
    pub partition_offset: U64<LittleEndian>,
    pub volume_length: U64<LittleEndian>,
    pub fat_offset: U32<LittleEndian>,
    pub fat_length: U32<LittleEndian>,
    pub cluster_heap_offset: U32<LittleEndian>,
    pub cluster_count: U32<LittleEndian>,
    pub first_cluster_of_root: U32<LittleEndian>,
    pub volume_serial: [u8; 4],
    pub vermin: u8,
    pub vermaj: u8,
    pub volume_flags: U16<LittleEndian>,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    pub number_of_fats: u8,
    pub drive_select: u8,
    pub percent_in_use: u8,
    pub reserved: [u8; 7],
    pub boot_code: [u8; 390],
    pub boot_signature: U16<LittleEndian>,
}

const _: () = assert!(size_of::<ExFatSuperBlock>() == 512);

/// Main boot sector, 8 extended boot sectors, OEM and reserved sectors.
const EXFAT_CHECKSUMMED_SECTORS: usize = 11;

impl ExFatSuperBlock {
    /// Sector size in bytes, `None` for shifts no real volume uses.
    pub fn sector_size(&self) -> Option<u64> {
        if self.bytes_per_sector_shift < 32 {
            return Some(1u64 << self.bytes_per_sector_shift);
        } else {
            return None;
        }
    }

    pub fn cluster_size(&self) -> Option<u64> {
        let shift = u32::from(self.bytes_per_sector_shift)
            .checked_add(u32::from(self.sectors_per_cluster_shift))?;

        if shift < 64 {
            return Some(1u64 << shift);
        } else {
            return None;
        }
    }
}

fn verify_exfat_checksum(buf: &ProbeBuffer<'_>, sb: &ExFatSuperBlock) -> Result<(), ExFatError> {
    let Some(sector_size) = sb.sector_size().and_then(|s| usize::try_from(s).ok()) else {
        return Err(ExFatError::ExfatHeaderError("invalid sector size"));
    };

    let region = buf.read_at(0, sector_size * (EXFAT_CHECKSUMMED_SECTORS + 1))?;
    let checksum = exfat_boot_checksum(region, sector_size);

    // the twelfth sector repeats the checksum as a u32 array
    let checksum_sector = &region[sector_size * EXFAT_CHECKSUMMED_SECTORS..];
    for entry in checksum_sector.chunks_exact(4) {
        let expected = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);

        if checksum != expected {
            return Err(ExFatError::ChecksumError {
                expected: CsumAlgorium::Exfat(expected),
                got: CsumAlgorium::Exfat(checksum),
            });
        }
    }

    return Ok(());
}

fn valid_exfat(buf: &ProbeBuffer<'_>, sb: &ExFatSuperBlock) -> Result<(), ExFatError> {
    if sb.boot_signature.get() != 0xAA55 {
        return Err(ExFatError::UnknownFilesystem("missing boot signature"));
    }

    if sb.bootjmp != [0xEB, 0x76, 0x90] {
        return Err(ExFatError::ExfatHeaderError("invalid boot jump"));
    }

    if sb.must_be_zero != [0u8; 53] {
        return Err(ExFatError::ExfatHeaderError("must_be_zero region is not all zero"));
    }

    if !in_range_inclusive(sb.number_of_fats, 1, 2) {
        return Err(ExFatError::ExfatHeaderError("number of FATs must be 1 or 2"));
    }

    if !in_range_inclusive(sb.bytes_per_sector_shift, 9, 12) {
        return Err(ExFatError::ExfatHeaderError("bytes_per_sector_shift out of range"));
    }

    if !in_range_inclusive(
        sb.sectors_per_cluster_shift,
        0,
        25 - sb.bytes_per_sector_shift,
    ) {
        return Err(ExFatError::ExfatHeaderError("sectors_per_cluster_shift out of range"));
    }

    let fat_offset = u64::from(sb.fat_offset.get());
    let heap_offset = u64::from(sb.cluster_heap_offset.get());
    let fats_end = fat_offset + u64::from(sb.fat_length.get()) * u64::from(sb.number_of_fats);

    if fat_offset < 24 || fats_end > heap_offset {
        return Err(ExFatError::ExfatHeaderError("FAT region overlaps the cluster heap"));
    }

    if heap_offset > 1 << 31 {
        return Err(ExFatError::ExfatHeaderError("cluster_heap_offset out of range"));
    }

    if !in_range_inclusive(
        u64::from(sb.first_cluster_of_root.get()),
        2,
        u64::from(sb.cluster_count.get()) + 1,
    ) {
        return Err(ExFatError::ExfatHeaderError("first_cluster_of_root out of range"));
    }

    verify_exfat_checksum(buf, sb)?;

    return Ok(());
}

pub fn probe_exfat(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ExFatError> {
    let sb: ExFatSuperBlock = buf.map_at(0)?;

    valid_exfat(buf, &sb)?;

    return Ok(());
}

fn validate_exfat(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_exfat(buf, rule)?);
}

fn exfat_cluster_size(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<u64, ExtractError> {
    let sb: ExFatSuperBlock = buf.map_at(0)?;

    return sb
        .cluster_size()
        .ok_or(ExtractError::InvalidEncoding("exFAT cluster shift"));
}
