use bitflags::bitflags;
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::LittleEndian,
    byteorder::U16, byteorder::U32,
};

use crate::{
    checksum::{CsumAlgorium, crc32c},
    extract::BlockSizeRule,
    filesystems::FsError,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

#[derive(Debug, Error)]
pub enum ExtError {
    #[error("Unable to read superblock: {0}")]
    ReadError(#[from] ReadError),
    #[error("EXT checksum failed, expected: \"{expected}\" and got: \"{got}\"")]
    ChecksumError {
        expected: CsumAlgorium,
        got: CsumAlgorium,
    },
    #[error("Block is an external journal device")]
    JournalDevice,
    #[error("Block is not an external journal device")]
    NotJournalDevice,
    #[error("Filesystem has a journal")]
    HasJournal,
    #[error("Filesystem has no journal")]
    NoJournal,
    #[error("Filesystem uses features unsupported by {0}")]
    UnsupportedFeatures(&'static str),
    #[error("Filesystem features are all supported by ext3")]
    Ext3Compatible,
    #[error("Test filesystem flag is set")]
    TestFilesystem,
    #[error("Test filesystem flag is not set")]
    NotTestFilesystem,
}

const EXT_SB_OFFSET: u64 = 0x400;
const EXT_MAGIC: [u8; 2] = [0x53, 0xEF];

const EXT_BLOCK_SIZE: BlockSizeRule = BlockSizeRule::Shift {
    field: Field::le32(EXT_SB_OFFSET + 0x18),
    base: 1024,
    max: 65536,
};

pub const EXT4DEV_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Ext4Dev,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(&EXT_MAGIC, 0x438, Some(validate_ext4dev))],
    block_size: EXT_BLOCK_SIZE,
};

pub const EXT4_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Ext4,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(&EXT_MAGIC, 0x438, Some(validate_ext4))],
    block_size: EXT_BLOCK_SIZE,
};

pub const EXT3_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Ext3,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(&EXT_MAGIC, 0x438, Some(validate_ext3))],
    block_size: EXT_BLOCK_SIZE,
};

pub const EXT2_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Ext2,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(&EXT_MAGIC, 0x438, Some(validate_ext2))],
    block_size: EXT_BLOCK_SIZE,
};

pub const JBD_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Jbd,
    usage: UsageType::Other("jbd"),
    rules: &[SignatureRule::new(&EXT_MAGIC, 0x438, Some(validate_jbd))],
    block_size: EXT_BLOCK_SIZE,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Ext2SuperBlock {
    pub s_inodes_count: U32<LittleEndian>,
    pub s_blocks_count: U32<LittleEndian>,
    pub s_r_blocks_count: U32<LittleEndian>,
    pub s_free_blocks_count: U32<LittleEndian>,
    pub s_free_inodes_count: U32<LittleEndian>,
    pub s_first_data_block: U32<LittleEndian>,
    pub s_log_block_size: U32<LittleEndian>,
    pub s_log_cluster_size: U32<LittleEndian>,
    pub s_blocks_per_group: U32<LittleEndian>,
    pub s_clusters_per_group: U32<LittleEndian>,
    pub s_inodes_per_group: U32<LittleEndian>,
    pub s_mtime: U32<LittleEndian>,
    pub s_wtime: U32<LittleEndian>,
    pub s_mnt_count: U16<LittleEndian>,
    pub s_max_mnt_count: U16<LittleEndian>,
    pub s_magic: U16<LittleEndian>,
    pub s_state: U16<LittleEndian>,
    pub s_errors: U16<LittleEndian>,
    pub s_minor_rev_level: U16<LittleEndian>,
    pub s_lastcheck: U32<LittleEndian>,
    pub s_checkinterval: U32<LittleEndian>,
    pub s_creator_os: U32<LittleEndian>,
    pub s_rev_level: U32<LittleEndian>,
    pub s_def_resuid: U16<LittleEndian>,
    pub s_def_resgid: U16<LittleEndian>,

    pub s_first_ino: U32<LittleEndian>,
    pub s_inode_size: U16<LittleEndian>,
    pub s_block_group_nr: U16<LittleEndian>,
    pub s_feature_compat: U32<LittleEndian>,
    pub s_feature_incompat: U32<LittleEndian>,
    pub s_feature_ro_compat: U32<LittleEndian>,
    pub s_uuid: [u8; 16],
    pub s_volume_name: [u8; 16],
    pub s_last_mounted: [u8; 64],
    pub s_algorithm_usage_bitmap: U32<LittleEndian>,
    pub s_prealloc_blocks: u8,
    pub s_prealloc_dir_blocks: u8,
    pub s_reserved_gdt_blocks: U16<LittleEndian>,
    pub s_journal_uuid: [u8; 16],
    pub s_journal_inum: U32<LittleEndian>,
    pub s_journal_dev: U32<LittleEndian>,
    pub s_last_orphan: U32<LittleEndian>,
    pub s_hash_seed: [U32<LittleEndian>; 4],
    pub s_def_hash_version: u8,
    pub s_jnl_backup_type: u8,
    pub s_desc_size: U16<LittleEndian>,
    pub s_default_mount_opts: U32<LittleEndian>,
    pub s_first_meta_bg: U32<LittleEndian>,
    pub s_mkfs_time: U32<LittleEndian>,
    pub s_jnl_blocks: [U32<LittleEndian>; 17],

    pub s_blocks_count_hi: U32<LittleEndian>,
    pub s_r_blocks_count_hi: U32<LittleEndian>,
    pub s_free_blocks_hi: U32<LittleEndian>,
    pub s_min_extra_isize: U16<LittleEndian>,
    pub s_want_extra_isize: U16<LittleEndian>,
    pub s_flags: U32<LittleEndian>,
    pub s_reserved: [u8; 664],
    pub s_checksum: U32<LittleEndian>,
}

const _: () = assert!(size_of::<Ext2SuperBlock>() == 1024);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExtCompat: u32 {
        const DIR_PREALLOC = 0x0001;
        const IMAGIC_INODES = 0x0002;
        const HAS_JOURNAL = 0x0004;
        const EXT_ATTR = 0x0008;
        const RESIZE_INODE = 0x0010;
        const DIR_INDEX = 0x0020;
        const SPARSE_SUPER2 = 0x0200;
        const FAST_COMMIT = 0x0400;
        const STABLE_INODES = 0x0800;
        const ORPHAN_FILE = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExtIncompat: u32 {
        const COMPRESSION = 0x0001;
        const FILETYPE = 0x0002;
        const RECOVER = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG = 0x0010;
        const EXTENTS = 0x0040;
        const IS_64BIT = 0x0080;
        const MMP = 0x0100;
        const FLEX_BG = 0x0200;
        const EA_INODE = 0x0400;
        const DIRDATA = 0x1000;
        const CSUM_SEED = 0x2000;
        const LARGEDIR = 0x4000;
        const INLINE_DATA = 0x8000;
        const ENCRYPT = 0x10000;
        const CASEFOLD = 0x20000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExtRoCompat: u32 {
        const SPARSE_SUPER = 0x0001;
        const LARGE_FILE = 0x0002;
        const BTREE_DIR = 0x0004;
        const HUGE_FILE = 0x0008;
        const GDT_CSUM = 0x0010;
        const DIR_NLINK = 0x0020;
        const EXTRA_ISIZE = 0x0040;
        const QUOTA = 0x0100;
        const BIGALLOC = 0x0200;
        const METADATA_CSUM = 0x0400;
        const READONLY = 0x1000;
        const PROJECT = 0x2000;
        const VERITY = 0x8000;
        const ORPHAN_PRESENT = 0x10000;
    }
}

const EXT2_FLAGS_TEST_FILESYS: u32 = 0x0004;

const EXT2_RO_COMPAT_SUPP: ExtRoCompat = ExtRoCompat::SPARSE_SUPER
    .union(ExtRoCompat::LARGE_FILE)
    .union(ExtRoCompat::BTREE_DIR);
const EXT2_INCOMPAT_SUPP: ExtIncompat = ExtIncompat::FILETYPE.union(ExtIncompat::META_BG);

const EXT3_RO_COMPAT_SUPP: ExtRoCompat = EXT2_RO_COMPAT_SUPP;
const EXT3_INCOMPAT_SUPP: ExtIncompat = ExtIncompat::FILETYPE
    .union(ExtIncompat::RECOVER)
    .union(ExtIncompat::META_BG);

#[derive(Debug, Clone, Copy)]
struct ExtFeatures {
    compat: ExtCompat,
    incompat: ExtIncompat,
    ro_compat: ExtRoCompat,
    flags: u32,
}

impl ExtFeatures {
    fn from_sb(sb: &Ext2SuperBlock) -> ExtFeatures {
        return ExtFeatures {
            compat: ExtCompat::from_bits_retain(sb.s_feature_compat.get()),
            incompat: ExtIncompat::from_bits_retain(sb.s_feature_incompat.get()),
            ro_compat: ExtRoCompat::from_bits_retain(sb.s_feature_ro_compat.get()),
            flags: sb.s_flags.get(),
        };
    }

    fn ext2_supported(&self) -> bool {
        return self.ro_compat.difference(EXT2_RO_COMPAT_SUPP).is_empty()
            && self.incompat.difference(EXT2_INCOMPAT_SUPP).is_empty();
    }

    fn ext3_supported(&self) -> bool {
        return self.ro_compat.difference(EXT3_RO_COMPAT_SUPP).is_empty()
            && self.incompat.difference(EXT3_INCOMPAT_SUPP).is_empty();
    }

    fn is_test_fs(&self) -> bool {
        return self.flags & EXT2_FLAGS_TEST_FILESYS != 0;
    }
}

/// Map the superblock and verify its metadata checksum when the filesystem
/// declares one.
fn ext_get_super(buf: &ProbeBuffer<'_>) -> Result<(Ext2SuperBlock, ExtFeatures), ExtError> {
    let sb: Ext2SuperBlock = buf.map_at(EXT_SB_OFFSET)?;
    let features = ExtFeatures::from_sb(&sb);

    if features.ro_compat.contains(ExtRoCompat::METADATA_CSUM) {
        let bytes = sb.as_bytes();
        let csum = !crc32c(&[&bytes[..size_of::<Ext2SuperBlock>() - 4]]);

        if csum != sb.s_checksum.get() {
            return Err(ExtError::ChecksumError {
                expected: CsumAlgorium::Crc32c(sb.s_checksum.get()),
                got: CsumAlgorium::Crc32c(csum),
            });
        }
    }

    return Ok((sb, features));
}

pub fn probe_jbd(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ExtError> {
    let (_, features) = ext_get_super(buf)?;

    if !features.incompat.contains(ExtIncompat::JOURNAL_DEV) {
        return Err(ExtError::NotJournalDevice);
    }

    return Ok(());
}

pub fn probe_ext2(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ExtError> {
    let (_, features) = ext_get_super(buf)?;

    if features.compat.contains(ExtCompat::HAS_JOURNAL) {
        return Err(ExtError::HasJournal);
    }

    if !features.ext2_supported() {
        return Err(ExtError::UnsupportedFeatures("ext2"));
    }

    return Ok(());
}

pub fn probe_ext3(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ExtError> {
    let (_, features) = ext_get_super(buf)?;

    if !features.compat.contains(ExtCompat::HAS_JOURNAL) {
        return Err(ExtError::NoJournal);
    }

    if !features.ext3_supported() {
        return Err(ExtError::UnsupportedFeatures("ext3"));
    }

    return Ok(());
}

pub fn probe_ext4(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ExtError> {
    let (_, features) = ext_get_super(buf)?;

    if features.incompat.contains(ExtIncompat::JOURNAL_DEV) {
        return Err(ExtError::JournalDevice);
    }

    if features.ext3_supported() {
        return Err(ExtError::Ext3Compatible);
    }

    if features.is_test_fs() {
        return Err(ExtError::TestFilesystem);
    }

    return Ok(());
}

pub fn probe_ext4dev(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), ExtError> {
    let (_, features) = ext_get_super(buf)?;

    if features.incompat.contains(ExtIncompat::JOURNAL_DEV) {
        return Err(ExtError::JournalDevice);
    }

    if !features.is_test_fs() {
        return Err(ExtError::NotTestFilesystem);
    }

    return Ok(());
}

fn validate_jbd(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_jbd(buf, rule)?);
}

fn validate_ext2(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_ext2(buf, rule)?);
}

fn validate_ext3(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_ext3(buf, rule)?);
}

fn validate_ext4(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_ext4(buf, rule)?);
}

fn validate_ext4dev(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_ext4dev(buf, rule)?);
}
