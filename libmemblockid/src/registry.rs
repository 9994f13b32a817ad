use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{
    extract::BlockSizeRule,
    filesystems::{
        FsError,
        apfs::APFS_ID_INFO,
        btrfs::BTRFS_ID_INFO,
        cramfs::{CRAMFS_ID_INFO, ROMFS_ID_INFO},
        erofs::EROFS_ID_INFO,
        exfat::EXFAT_ID_INFO,
        ext::{EXT2_ID_INFO, EXT3_ID_INFO, EXT4_ID_INFO, EXT4DEV_ID_INFO, JBD_ID_INFO},
        f2fs::F2FS_ID_INFO,
        iso9660::ISO9660_ID_INFO,
        linux_swap::{LINUX_SWAP_ID_INFO, SWSUSPEND_ID_INFO},
        ntfs::NTFS_ID_INFO,
        squashfs::{SQUASHFS_ID_INFO, SQUASHFS3_ID_INFO},
        vfat::VFAT_ID_INFO,
        xfs::XFS_ID_INFO,
        zonefs::ZONEFS_ID_INFO,
    },
    reader::ProbeBuffer,
};

/// Longest magic any rule may declare.
pub const MAX_MAGIC_LEN: usize = 16;

/// Detection table. Position in this table is the tie-break priority between
/// equally ranked hits.
///
/// Byte-identical (offset, magic) pairs are rejected across formats, except
/// where both rules carry a validator (the ext family, squashfs versions).
#[rustfmt::skip]
pub const REGISTRY: &[FormatDescriptor] = &[
    VFAT_ID_INFO,
    SWSUSPEND_ID_INFO,
    LINUX_SWAP_ID_INFO,
    XFS_ID_INFO,
    EXT4DEV_ID_INFO,
    EXT4_ID_INFO,
    EXT3_ID_INFO,
    EXT2_ID_INFO,
    JBD_ID_INFO,
    ISO9660_ID_INFO,
    NTFS_ID_INFO,
    EXFAT_ID_INFO,
    BTRFS_ID_INFO,
    SQUASHFS_ID_INFO,
    SQUASHFS3_ID_INFO,
    CRAMFS_ID_INFO,
    ROMFS_ID_INFO,
    F2FS_ID_INFO,
    EROFS_ID_INFO,
    APFS_ID_INFO,
    ZONEFS_ID_INFO,
];

const _: () = assert!(
    registry_is_consistent(REGISTRY),
    "format registry has an invalid or duplicated signature rule"
);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown filesystem format: \"{0}\"")]
    NotFound(String),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BlockType {
    Vfat,
    SwapSuspend,
    LinuxSwap,
    Xfs,
    Ext4Dev,
    Ext4,
    Ext3,
    Ext2,
    Jbd,
    Iso9660,
    Ntfs,
    Exfat,
    Btrfs,
    Squashfs,
    Squashfs3,
    Cramfs,
    Romfs,
    F2fs,
    Erofs,
    Apfs,
    ZoneFs,
}

impl BlockType {
    /// Canonical lowercase name, as accepted by filters and reported in results.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Vfat => "vfat",
            Self::SwapSuspend => "swsuspend",
            Self::LinuxSwap => "swap",
            Self::Xfs => "xfs",
            Self::Ext4Dev => "ext4dev",
            Self::Ext4 => "ext4",
            Self::Ext3 => "ext3",
            Self::Ext2 => "ext2",
            Self::Jbd => "jbd",
            Self::Iso9660 => "iso9660",
            Self::Ntfs => "ntfs",
            Self::Exfat => "exfat",
            Self::Btrfs => "btrfs",
            Self::Squashfs => "squashfs",
            Self::Squashfs3 => "squashfs3",
            Self::Cramfs => "cramfs",
            Self::Romfs => "romfs",
            Self::F2fs => "f2fs",
            Self::Erofs => "erofs",
            Self::Apfs => "apfs",
            Self::ZoneFs => "zonefs",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vfat => write!(f, "VFAT"),
            Self::SwapSuspend => write!(f, "Swap Suspend"),
            Self::LinuxSwap => write!(f, "Linux Swap"),
            Self::Xfs => write!(f, "XFS"),
            Self::Ext4Dev => write!(f, "EXT4DEV"),
            Self::Ext4 => write!(f, "EXT4"),
            Self::Ext3 => write!(f, "EXT3"),
            Self::Ext2 => write!(f, "EXT2"),
            Self::Jbd => write!(f, "JBD"),
            Self::Iso9660 => write!(f, "ISO9660"),
            Self::Ntfs => write!(f, "NTFS"),
            Self::Exfat => write!(f, "EXFAT"),
            Self::Btrfs => write!(f, "BTRFS"),
            Self::Squashfs => write!(f, "SquashFS"),
            Self::Squashfs3 => write!(f, "SquashFS3"),
            Self::Cramfs => write!(f, "CramFS"),
            Self::Romfs => write!(f, "ROMFS"),
            Self::F2fs => write!(f, "F2FS"),
            Self::Erofs => write!(f, "EROFS"),
            Self::Apfs => write!(f, "APFS"),
            Self::ZoneFs => write!(f, "ZoneFS"),
        }
    }
}

impl FromStr for BlockType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return Ok(lookup(s)?.btype);
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum UsageType {
    Filesystem,
    Other(&'static str),
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::Other(t) => write!(f, "{t}"),
        }
    }
}

/// Secondary check run after a rule's magic matched.
pub type ValidateFn = fn(&ProbeBuffer<'_>, &SignatureRule) -> Result<(), FsError>;

/// A single candidate superblock signature.
#[derive(Debug, Copy, Clone)]
pub struct SignatureRule {
    /// Expected bytes, at most [`MAX_MAGIC_LEN`] long.
    pub magic: &'static [u8],
    /// Absolute offset of the magic from the start of the buffer.
    pub b_offset: u64,
    pub validator: Option<ValidateFn>,
}

impl SignatureRule {
    pub const fn new(
        magic: &'static [u8],
        b_offset: u64,
        validator: Option<ValidateFn>,
    ) -> SignatureRule {
        return SignatureRule {
            magic,
            b_offset,
            validator,
        };
    }

    pub const fn len(&self) -> usize {
        return self.magic.len();
    }

    pub const fn is_empty(&self) -> bool {
        return self.magic.is_empty();
    }
}

#[derive(Debug, Copy, Clone)]
pub struct FormatDescriptor {
    pub btype: BlockType,
    pub usage: UsageType,
    /// Candidate signatures, tried in declaration order.
    pub rules: &'static [SignatureRule],
    pub block_size: BlockSizeRule,
}

impl FormatDescriptor {
    pub const fn name(&self) -> &'static str {
        return self.btype.name();
    }
}

/// Canonical names of every registered format, in registration order.
pub fn list_formats() -> Vec<&'static str> {
    return REGISTRY.iter().map(FormatDescriptor::name).collect();
}

pub(crate) fn position(name: &str) -> Option<usize> {
    return REGISTRY.iter().position(|desc| desc.name() == name);
}

/// Find a format by canonical name.
///
/// # Errors
/// Returns [`RegistryError::NotFound`] if no registered format has that name.
pub fn lookup(name: &str) -> Result<&'static FormatDescriptor, RegistryError> {
    return REGISTRY
        .iter()
        .find(|desc| desc.name() == name)
        .ok_or_else(|| RegistryError::NotFound(name.to_string()));
}

const fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    return true;
}

const fn rule_is_valid(rule: &SignatureRule) -> bool {
    return !rule.magic.is_empty()
        && rule.magic.len() <= MAX_MAGIC_LEN
        && rule.b_offset.checked_add(rule.magic.len() as u64).is_some();
}

/// Formats sharing an on-disk magic (the ext family, squashfs versions) are
/// only distinguishable by their validators, so an identical (offset, magic)
/// pair across formats is rejected unless both sides carry one.
const fn rules_conflict(a: &SignatureRule, b: &SignatureRule) -> bool {
    return a.b_offset == b.b_offset
        && bytes_eq(a.magic, b.magic)
        && (a.validator.is_none() || b.validator.is_none());
}

const fn formats_conflict(a: &FormatDescriptor, b: &FormatDescriptor) -> bool {
    if a.btype as usize == b.btype as usize {
        return true;
    }
    let mut i = 0;
    while i < a.rules.len() {
        let mut j = 0;
        while j < b.rules.len() {
            if rules_conflict(&a.rules[i], &b.rules[j]) {
                return true;
            }
            j += 1;
        }
        i += 1;
    }
    return false;
}

/// Compile-time consistency check over a detection table.
pub const fn registry_is_consistent(registry: &[FormatDescriptor]) -> bool {
    let mut i = 0;
    while i < registry.len() {
        if registry[i].rules.is_empty() {
            return false;
        }
        let mut r = 0;
        while r < registry[i].rules.len() {
            if !rule_is_valid(&registry[i].rules[r]) {
                return false;
            }
            r += 1;
        }
        let mut j = i + 1;
        while j < registry.len() {
            if formats_conflict(&registry[i], &registry[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    return true;
}
