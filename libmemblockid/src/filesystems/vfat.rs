use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::LittleEndian,
    byteorder::U16, byteorder::U32,
};

use crate::{
    extract::{BlockSizeRule, ExtractError},
    filesystems::FsError,
    reader::{ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
    util::is_power_2,
};

#[derive(Debug, Error)]
pub enum FatError {
    #[error("Unable to read boot sector: {0}")]
    ReadError(#[from] ReadError),
    #[error("Not a FAT boot sector: {0}")]
    UnknownFilesystem(&'static str),
    #[error("FAT header error: {0}")]
    FatHeaderError(&'static str),
}

pub const VFAT_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Vfat,
    usage: UsageType::Filesystem,
    rules: &[
        SignatureRule::new(b"MSWIN", 0x52, Some(validate_vfat)),
        SignatureRule::new(b"FAT32   ", 0x52, Some(validate_vfat)),
        SignatureRule::new(b"MSDOS", 0x36, Some(validate_vfat)),
        SignatureRule::new(b"FAT16   ", 0x36, Some(validate_vfat)),
        SignatureRule::new(b"FAT12   ", 0x36, Some(validate_vfat)),
        SignatureRule::new(b"FAT     ", 0x36, Some(validate_vfat)),
        SignatureRule::new(&[0x55, 0xAA], 0x1fe, Some(validate_vfat)),
    ],
    block_size: BlockSizeRule::Computed(fat_cluster_size),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct VFatSuperBlock {
    pub vs_ignored: [u8; 3],
    pub vs_sysid: [u8; 8],
    pub vs_sector_size: U16<LittleEndian>,
    pub vs_cluster_size: u8,
    pub vs_reserved: U16<LittleEndian>,
    pub vs_fats: u8,
    pub vs_dir_entries: U16<LittleEndian>,
    pub vs_sectors: U16<LittleEndian>,
    pub vs_media: u8,
    pub vs_fat_length: U16<LittleEndian>,
    pub vs_secs_track: U16<LittleEndian>,
    pub vs_heads: U16<LittleEndian>,
    pub vs_hidden: U32<LittleEndian>,
    pub vs_total_sect: U32<LittleEndian>,

    pub vs_fat32_length: U32<LittleEndian>,
    pub vs_flags: U16<LittleEndian>,
    pub vs_version: U16<LittleEndian>,
    pub vs_root_cluster: U32<LittleEndian>,
    pub vs_fsinfo_sector: U16<LittleEndian>,
    pub vs_backup_boot: U16<LittleEndian>,
    pub vs_reserved2: [u8; 12],
    pub vs_drive_number: u8,
    pub vs_boot_flags: u8,
    /// 0x28 without vs_label/vs_magic, 0x29 with.
    pub vs_ext_boot_sign: u8,
    pub vs_serno: [u8; 4],
    pub vs_label: [u8; 11],
    pub vs_magic: [u8; 8],
    pub vs_dummy2: [u8; 420],
    pub vs_pmagic: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct MsDosSuperBlock {
    /* DOS 2.0 BPB */
    pub ms_ignored: [u8; 3],
    pub ms_sysid: [u8; 8],
    pub ms_sector_size: U16<LittleEndian>,
    pub ms_cluster_size: u8,
    pub ms_reserved: U16<LittleEndian>,
    pub ms_fats: u8,
    pub ms_dir_entries: U16<LittleEndian>,
    /// Zero on DOS 3.31 and later, see ms_total_sect.
    pub ms_sectors: U16<LittleEndian>,
    pub ms_media: u8,
    pub ms_fat_length: U16<LittleEndian>,
    /* DOS 3.0 BPB */
    pub ms_secs_track: U16<LittleEndian>,
    pub ms_heads: U16<LittleEndian>,
    pub ms_hidden: U32<LittleEndian>,
    /* DOS 3.31 BPB */
    pub ms_total_sect: U32<LittleEndian>,
    /* DOS 3.4 EBPB */
    pub ms_drive_number: u8,
    pub ms_boot_flags: u8,
    pub ms_ext_boot_sign: u8,
    pub ms_serno: [u8; 4],
    /* DOS 4.0 EBPB */
    pub ms_label: [u8; 11],
    pub ms_magic: [u8; 8],
    pub ms_dummy2: [u8; 448],
    pub ms_pmagic: [u8; 2],
}

const _: () = assert!(size_of::<VFatSuperBlock>() == 512);
const _: () = assert!(size_of::<MsDosSuperBlock>() == 512);

const FAT12_MAX: u32 = 0xFF4;
const FAT16_MAX: u32 = 0xFFF4;
const FAT32_MAX: u32 = 0x0FFFFFF6;

const FAT_DIR_ENTRY_SIZE: u32 = 32;

pub fn get_fat_size(ms: &MsDosSuperBlock, vs: &VFatSuperBlock) -> u64 {
    let fat_length = if ms.ms_fat_length.get() == 0 {
        vs.vs_fat32_length.get()
    } else {
        u32::from(ms.ms_fat_length.get())
    };

    return u64::from(fat_length) * u64::from(ms.ms_fats);
}

pub fn get_sect_count(ms: &MsDosSuperBlock) -> u32 {
    if ms.ms_sectors.get() == 0 {
        return ms.ms_total_sect.get();
    } else {
        return u32::from(ms.ms_sectors.get());
    }
}

/// Number of data clusters, `None` when the metadata claims more sectors than
/// the volume has.
pub fn get_cluster_count(ms: &MsDosSuperBlock, vs: &VFatSuperBlock) -> Option<u64> {
    let sector_size = u32::from(ms.ms_sector_size.get());
    if sector_size == 0 || ms.ms_cluster_size == 0 {
        return None;
    }

    let dir_size = (u32::from(ms.ms_dir_entries.get()) * FAT_DIR_ENTRY_SIZE + (sector_size - 1))
        / sector_size;

    let meta = u64::from(ms.ms_reserved.get()) + get_fat_size(ms, vs) + u64::from(dir_size);

    let data = u64::from(get_sect_count(ms)).checked_sub(meta)?;

    return Some(data / u64::from(ms.ms_cluster_size));
}

pub fn valid_fat(
    ms: &MsDosSuperBlock,
    vs: &VFatSuperBlock,
    rule: &SignatureRule,
) -> Result<(), FatError> {
    if rule.len() <= 2 {
        if ms.ms_pmagic != [0x55, 0xAA] {
            return Err(FatError::UnknownFilesystem("missing boot signature"));
        }

        /*
         * OS/2 and DFSee place a FAT12/16-like pseudo-superblock in the
         * first 512 bytes of JFS and HPFS volumes.
         */
        if &ms.ms_magic == b"JFS     " || &ms.ms_magic == b"HPFS    " {
            return Err(FatError::UnknownFilesystem("JFS/HPFS pseudo-superblock"));
        }
    }

    if ms.ms_fats == 0 {
        return Err(FatError::FatHeaderError("no FAT tables"));
    }

    if ms.ms_reserved.get() == 0 {
        return Err(FatError::FatHeaderError("no reserved sectors"));
    }

    if !(ms.ms_media >= 0xf8 || ms.ms_media == 0xf0) {
        return Err(FatError::FatHeaderError("invalid media descriptor"));
    }

    if !is_power_2(u64::from(ms.ms_cluster_size)) {
        return Err(FatError::FatHeaderError("sectors per cluster is not a power of two"));
    }

    let sector_size = u64::from(ms.ms_sector_size.get());
    if !is_power_2(sector_size) || !(512..=4096).contains(&sector_size) {
        return Err(FatError::FatHeaderError("invalid sector size"));
    }

    let Some(cluster_count) = get_cluster_count(ms, vs) else {
        return Err(FatError::FatHeaderError("metadata larger than volume"));
    };

    let max_count = if ms.ms_fat_length.get() == 0 && vs.vs_fat32_length.get() > 0 {
        FAT32_MAX
    } else if cluster_count > u64::from(FAT12_MAX) {
        FAT16_MAX
    } else {
        FAT12_MAX
    };

    if cluster_count > u64::from(max_count) {
        return Err(FatError::FatHeaderError("too many clusters"));
    }

    return Ok(());
}

pub fn probe_vfat(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FatError> {
    let ms: MsDosSuperBlock = buf.map_at(0)?;
    let vs: VFatSuperBlock = buf.map_at(0)?;

    valid_fat(&ms, &vs, rule)?;

    return Ok(());
}

fn validate_vfat(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_vfat(buf, rule)?);
}

fn fat_cluster_size(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<u64, ExtractError> {
    let ms: MsDosSuperBlock = buf.map_at(0)?;

    return Ok(u64::from(ms.ms_sector_size.get()) * u64::from(ms.ms_cluster_size));
}
