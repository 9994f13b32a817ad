use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::BigEndian,
    byteorder::LittleEndian, byteorder::U16, byteorder::U32,
};

use crate::{
    extract::{BlockSizeRule, MAX_BLOCK_SIZE},
    filesystems::FsError,
    reader::{Field, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

#[derive(Debug, Error)]
pub enum IsoError {
    #[error("Unable to read volume descriptor: {0}")]
    ReadError(#[from] ReadError),
    #[error("Invalid volume descriptor type: {0}")]
    InvalidDescriptorType(u8),
    #[error("Invalid volume descriptor version: {0}")]
    InvalidDescriptorVersion(u8),
    #[error("Both-endian logical block size disagrees: {le} != {be}")]
    BlockSizeMismatch { le: u16, be: u16 },
}

/// First volume descriptor, sector 16 of 2048 byte sectors.
const ISO_VD_OFFSET: u64 = 0x8000;

const ISO_VD_BOOT_RECORD: u8 = 0;
const ISO_VD_PRIMARY: u8 = 1;
const ISO_VD_SUPPLEMENTARY: u8 = 2;
const ISO_VD_PARTITION: u8 = 3;
const ISO_VD_END: u8 = 255;

pub const ISO9660_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Iso9660,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(b"CD001", ISO_VD_OFFSET + 1, Some(validate_iso9660))],
    block_size: BlockSizeRule::Direct {
        field: Field::le16(ISO_VD_OFFSET + 128),
        max: MAX_BLOCK_SIZE,
    },
};

/// Leading part of a volume descriptor, up to the logical block size.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct IsoVolumeDescriptor {
    pub vd_type: u8,
    pub vd_id: [u8; 5],
    pub vd_version: u8,
    pub flags: u8,
    pub system_id: [u8; 32],
    pub volume_id: [u8; 32],
    pub unused: [u8; 8],
    pub space_size_le: U32<LittleEndian>,
    pub space_size_be: U32<BigEndian>,
    pub escape_sequences: [u8; 32],
    pub set_size_le: U16<LittleEndian>,
    pub set_size_be: U16<BigEndian>,
    pub vol_seq_num_le: U16<LittleEndian>,
    pub vol_seq_num_be: U16<BigEndian>,
    pub logical_block_size_le: U16<LittleEndian>,
    pub logical_block_size_be: U16<BigEndian>,
}

pub fn probe_iso9660(buf: &ProbeBuffer<'_>, _rule: &SignatureRule) -> Result<(), IsoError> {
    let vd: IsoVolumeDescriptor = buf.map_at(ISO_VD_OFFSET)?;

    match vd.vd_type {
        ISO_VD_BOOT_RECORD | ISO_VD_PRIMARY | ISO_VD_SUPPLEMENTARY | ISO_VD_PARTITION
        | ISO_VD_END => {}
        other => return Err(IsoError::InvalidDescriptorType(other)),
    }

    if vd.vd_version != 1 {
        return Err(IsoError::InvalidDescriptorVersion(vd.vd_version));
    }

    // only primary and supplementary descriptors carry the volume geometry
    if vd.vd_type != ISO_VD_PRIMARY && vd.vd_type != ISO_VD_SUPPLEMENTARY {
        return Ok(());
    }

    let le = vd.logical_block_size_le.get();
    let be = vd.logical_block_size_be.get();
    if le != be {
        return Err(IsoError::BlockSizeMismatch { le, be });
    }

    return Ok(());
}

fn validate_iso9660(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_iso9660(buf, rule)?);
}
